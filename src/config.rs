use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "wss://pubsub-edge.twitch.tv";
const HEARTBEAT_INTERVAL: u64 = 60;
const HEARTBEAT_TIMEOUT: u64 = 10;
const MAX_RETRY_DELAY: u64 = 120;
const RESPONSE_TIMEOUT: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub max_retry_delay: Duration,
    /// How long a listen/unlisten waits for its RESPONSE. `None` waits forever.
    pub response_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL),
            heartbeat_timeout: Duration::from_secs(HEARTBEAT_TIMEOUT),
            max_retry_delay: Duration::from_secs(MAX_RETRY_DELAY),
            response_timeout: Some(Duration::from_secs(RESPONSE_TIMEOUT)),
        }
    }
}

impl Config {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Self::default() }
    }

    /// Reads `PUBSUB_ENDPOINT` and `PUBSUB_RESPONSE_TIMEOUT_SECS` (0 disables the timeout).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(endpoint) = lookup("PUBSUB_ENDPOINT").filter(|e| !e.trim().is_empty()) {
            config.endpoint = endpoint;
        }
        if let Some(raw) = lookup("PUBSUB_RESPONSE_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.response_timeout = None,
                Ok(secs) => config.response_timeout = Some(Duration::from_secs(secs)),
                Err(error) => {
                    tracing::warn!(%raw, %error, "ignoring invalid PUBSUB_RESPONSE_TIMEOUT_SECS");
                }
            }
        }
        config
    }

    #[cfg(test)]
    pub fn new_test(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            heartbeat_interval: Duration::from_millis(200),
            heartbeat_timeout: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(MAX_RETRY_DELAY),
            response_timeout: Some(Duration::from_secs(2)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_edge_service() {
        let cfg = Config::default();
        assert_eq!(cfg.endpoint, "wss://pubsub-edge.twitch.tv");
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_retry_delay, Duration::from_secs(120));
    }

    #[test]
    fn env_overrides_endpoint_and_timeout() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("PUBSUB_ENDPOINT", "ws://127.0.0.1:9000"),
            ("PUBSUB_RESPONSE_TIMEOUT_SECS", "5"),
        ]));
        assert_eq!(cfg.endpoint, "ws://127.0.0.1:9000");
        assert_eq!(cfg.response_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let cfg = Config::from_lookup(lookup_from(&[("PUBSUB_RESPONSE_TIMEOUT_SECS", "0")]));
        assert_eq!(cfg.response_timeout, None);
    }

    #[test]
    fn garbage_is_ignored() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("PUBSUB_ENDPOINT", "  "),
            ("PUBSUB_RESPONSE_TIMEOUT_SECS", "soon"),
        ]));
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.response_timeout, Some(Duration::from_secs(30)));
    }
}
