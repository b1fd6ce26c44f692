use anyhow::{bail, Context, Result};

pub const DEFAULT_BASE_URL: &str = "https://mcp.scira.ai";
pub const DEFAULT_MODELS: &str = "gpt-4.1-mini,claude-3-7-sonnet,grok-3-mini,qwen-qwq";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: String,
    /// Explicit bind address; overrides `0.0.0.0:{port}` when set.
    pub bind_addr: Option<String>,
    /// Inbound bearer key. Empty disables the check.
    pub api_key: String,
    pub identities: Vec<String>,
    pub proxy_url: Option<String>,
    pub models: Vec<String>,
    /// Attempt ceiling for the backend call, always >= 1.
    pub retry: u32,
    pub cleanup_enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Config {
    /// Load from the process environment.
    ///
    /// Environment:
    /// - PORT (default 8080), BIND_ADDR (optional full address)
    /// - APIKEY                       -> inbound bearer key (optional)
    /// - USERIDS                      -> comma-separated backend identities (required)
    /// - http_proxy / HTTP_PROXY      -> outbound proxy (lowercase wins)
    /// - MODELS                       -> comma-separated served models
    /// - RETRY                        -> attempt ceiling (default 1, clamped to >= 1)
    /// - CHAT_DELETE                  -> delete backend chats after answering (default false)
    /// - BACKEND_BASE_URL             -> backend origin (default https://mcp.scira.ai)
    /// - HTTP_TIMEOUT_SECONDS         -> outbound request timeout (default 300)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = get("PORT").unwrap_or_else(|| DEFAULT_PORT.into());
        let bind_addr = get("BIND_ADDR");
        let api_key = get("APIKEY").unwrap_or_default();

        let identities = split_list(&get("USERIDS").unwrap_or_default());
        if identities.is_empty() {
            bail!("USERIDS is empty");
        }

        let proxy_url = get("http_proxy").or_else(|| get("HTTP_PROXY"));
        let models = split_list(&get("MODELS").unwrap_or_else(|| DEFAULT_MODELS.into()));

        let retry = match get("RETRY") {
            Some(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("RETRY is not a number: {raw}"))?,
            None => 1,
        };
        let retry = retry.clamp(1, u32::MAX as i64) as u32;

        let cleanup_enabled = match get("CHAT_DELETE") {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("CHAT_DELETE should be true or false, got {raw}"))?,
            None => false,
        };

        let base_url = get("BACKEND_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();

        let timeout_secs = match get("HTTP_TIMEOUT_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("HTTP_TIMEOUT_SECONDS is not a number: {raw}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            port,
            bind_addr,
            api_key,
            identities,
            proxy_url,
            models,
            retry,
            cleanup_enabled,
            base_url,
            timeout_secs,
        })
    }

    pub fn bind_addr(&self) -> String {
        self.bind_addr
            .clone()
            .unwrap_or_else(|| format!("0.0.0.0:{}", self.port))
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = load(&[("USERIDS", "u1")]).unwrap();
        assert_eq!(cfg.port, "8080");
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.api_key, "");
        assert_eq!(cfg.identities, vec!["u1"]);
        assert_eq!(cfg.proxy_url, None);
        assert_eq!(cfg.models.len(), 4);
        assert!(cfg.supports_model("qwen-qwq"));
        assert_eq!(cfg.retry, 1);
        assert!(!cfg.cleanup_enabled);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.timeout_secs, 300);
    }

    #[test]
    fn identities_are_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("USERIDS", " , ")]).is_err());
    }

    #[test]
    fn lists_are_trimmed() {
        let cfg = load(&[("USERIDS", "a, b ,,c"), ("MODELS", "m1 , m2")]).unwrap();
        assert_eq!(cfg.identities, vec!["a", "b", "c"]);
        assert_eq!(cfg.models, vec!["m1", "m2"]);
        assert!(!cfg.supports_model("gpt-4.1-mini"));
    }

    #[test]
    fn retry_is_clamped_and_validated() {
        assert_eq!(load(&[("USERIDS", "u"), ("RETRY", "0")]).unwrap().retry, 1);
        assert_eq!(load(&[("USERIDS", "u"), ("RETRY", "-3")]).unwrap().retry, 1);
        assert_eq!(load(&[("USERIDS", "u"), ("RETRY", "4")]).unwrap().retry, 4);
        assert!(load(&[("USERIDS", "u"), ("RETRY", "many")]).is_err());
    }

    #[test]
    fn chat_delete_flag() {
        assert!(load(&[("USERIDS", "u"), ("CHAT_DELETE", "true")]).unwrap().cleanup_enabled);
        assert!(!load(&[("USERIDS", "u"), ("CHAT_DELETE", "0")]).unwrap().cleanup_enabled);
        assert!(load(&[("USERIDS", "u"), ("CHAT_DELETE", "maybe")]).is_err());
    }

    #[test]
    fn proxy_reads_either_case() {
        let cfg = load(&[("USERIDS", "u"), ("http_proxy", "http://127.0.0.1:3128")]).unwrap();
        assert_eq!(cfg.proxy_url.as_deref(), Some("http://127.0.0.1:3128"));
        let cfg = load(&[("USERIDS", "u"), ("HTTP_PROXY", "http://127.0.0.1:8118")]).unwrap();
        assert_eq!(cfg.proxy_url.as_deref(), Some("http://127.0.0.1:8118"));
    }

    #[test]
    fn lowercase_proxy_wins_when_both_set() {
        let cfg = load(&[
            ("USERIDS", "u"),
            ("http_proxy", "http://127.0.0.1:3128"),
            ("HTTP_PROXY", "http://127.0.0.1:8118"),
        ])
        .unwrap();
        assert_eq!(cfg.proxy_url.as_deref(), Some("http://127.0.0.1:3128"));
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let cfg = load(&[
            ("USERIDS", "u"),
            ("BACKEND_BASE_URL", "http://localhost:9000/"),
        ])
        .unwrap();
        assert_eq!(cfg.base_url, "http://localhost:9000");
    }
}
