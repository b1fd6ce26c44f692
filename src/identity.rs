use std::sync::atomic::{AtomicUsize, Ordering};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Number of random bytes behind a session id (20 base64 characters).
const SESSION_ID_BYTES: usize = 15;
/// Token length before the hyphen is inserted.
const SESSION_TOKEN_LEN: usize = 20;
/// The hyphen goes after this many token characters.
const SESSION_HYPHEN_AT: usize = 11;
const SESSION_FILLER: char = 'A';

const COMPLETION_SUFFIX_LEN: usize = 10;
const COMPLETION_SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Fixed set of backend user identities handed out round-robin.
///
/// The only mutable state is the counter; concurrent callers each observe a distinct
/// pre-increment value, so selection never takes a lock.
#[derive(Debug)]
pub struct IdentityPool {
    identities: Vec<String>,
    counter: AtomicUsize,
}

impl IdentityPool {
    /// Build a pool starting at a random offset so restarts do not always hit the first identity.
    pub fn new(identities: Vec<String>) -> anyhow::Result<Self> {
        if identities.is_empty() {
            anyhow::bail!("identity pool is empty");
        }
        let offset = rand::thread_rng().gen_range(0..identities.len());
        Self::with_offset(identities, offset)
    }

    /// Build a pool whose first selection is `identities[offset % len]`.
    pub fn with_offset(identities: Vec<String>, offset: usize) -> anyhow::Result<Self> {
        if identities.is_empty() {
            anyhow::bail!("identity pool is empty");
        }
        Ok(Self {
            identities,
            counter: AtomicUsize::new(offset),
        })
    }

    pub fn next_identity(&self) -> &str {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        &self.identities[n % self.identities.len()]
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Generate a backend chat session id: 20 URL-safe characters with a hyphen after the 11th.
///
/// The id doubles as a backend resource key, so it is drawn from the OS CSPRNG.
pub fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format_session_token(&URL_SAFE_NO_PAD.encode(bytes))
}

fn format_session_token(encoded: &str) -> String {
    // base64 output is ASCII, so byte offsets are char offsets
    // the separator must be the only hyphen, so alphabet hyphens become underscores
    let mut token: String = encoded
        .chars()
        .take(SESSION_TOKEN_LEN)
        .map(|c| if c == '-' { '_' } else { c })
        .collect();
    while token.len() < SESSION_TOKEN_LEN {
        token.push(SESSION_FILLER);
    }
    token.insert(SESSION_HYPHEN_AT, '-');
    token
}

/// Response id shared by every chunk of one outbound response:
/// `chatcmpl-<UTC YYYYMMDDhhmmss><10 random [a-z0-9]>`.
pub fn new_completion_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..COMPLETION_SUFFIX_LEN)
        .map(|_| {
            let i = rng.gen_range(0..COMPLETION_SUFFIX_CHARSET.len());
            COMPLETION_SUFFIX_CHARSET[i] as char
        })
        .collect();
    format!(
        "chatcmpl-{}{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        suffix
    )
}
