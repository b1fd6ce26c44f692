use crate::backend::{Backend, ByteStream};
use crate::conversion::to_backend_request;
use crate::error::BackendError;
use crate::identity::{new_session_id, IdentityPool};
use crate::models::backend::BackendChatRequest;
use crate::models::chat::ChatCompletionRequest;

/// Everything that varies between attempts, built fresh each time.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub number: u32,
    pub session_id: String,
    pub identity: String,
    pub payload: BackendChatRequest,
}

impl Attempt {
    fn prepare(number: u32, pool: &IdentityPool, req: &ChatCompletionRequest) -> Self {
        let session_id = new_session_id();
        let identity = pool.next_identity().to_string();
        let payload = to_backend_request(req, &req.model, &session_id, &identity);
        Self {
            number,
            session_id,
            identity,
            payload,
        }
    }
}

/// The successful attempt's body plus the ids needed for cleanup.
pub struct Invocation {
    pub body: ByteStream,
    pub session_id: String,
    pub identity: String,
    pub attempts: u32,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("session_id", &self.session_id)
            .field("identity", &self.identity)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Send the request, retrying transport failures with a new session id and the next identity.
///
/// HTTP error statuses are not retried. `max_attempts` below 1 is treated as 1. When every
/// attempt fails the last error is returned.
pub async fn invoke(
    backend: &dyn Backend,
    pool: &IdentityPool,
    req: &ChatCompletionRequest,
    max_attempts: u32,
) -> Result<Invocation, BackendError> {
    let max_attempts = max_attempts.max(1);
    let mut last_err = None;

    for number in 1..=max_attempts {
        let attempt = Attempt::prepare(number, pool, req);
        tracing::info!(
            attempt = attempt.number,
            identity = %attempt.identity,
            session_id = %attempt.session_id,
            "sending backend chat request"
        );
        match backend.post_chat(&attempt.session_id, &attempt.payload).await {
            Ok(body) => {
                return Ok(Invocation {
                    body,
                    session_id: attempt.session_id,
                    identity: attempt.identity,
                    attempts: number,
                })
            }
            Err(e) => {
                tracing::warn!(
                    attempt = attempt.number,
                    identity = %attempt.identity,
                    session_id = %attempt.session_id,
                    error = %e,
                    "backend chat attempt failed"
                );
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| BackendError::Transport("no attempt was made".into())))
}
