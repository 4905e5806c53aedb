//! Adapter configuration

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::{
    constants::{
        DEFAULT_ACTION_TTL_MS, DEFAULT_AMI_PORT, DEFAULT_CONNECT_TIMEOUT_MS,
        DEFAULT_RECONNECT_DELAY_MS, MAX_EVENT_QUEUE_SIZE,
    },
    encoding::TransportEncoding,
    error::{AmiError, AmiResult},
};

/// Connection settings for one [`AmiAdapter`](crate::AmiAdapter).
///
/// Missing fields take their [`Default`] values when deserialized, so a config
/// file only needs the credentials:
///
/// ```
/// let config: asterisk_ami_tokio::AmiConfig =
///     serde_json::from_str(r#"{"username": "admin", "secret": "s3cret"}"#).unwrap();
/// assert_eq!(config.port, 5038);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AmiConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    /// Encoding of the socket byte stream.
    pub encoding: TransportEncoding,
    /// Sent as `Events: on|off` in the login action.
    pub events: bool,
    /// Reconnect after the socket closes. Cleared by `disconnect()`.
    pub reconnect: bool,
    pub reconnect_delay_ms: u64,
    /// Lifetime of a pending request. Must be greater than zero.
    pub action_ttl_ms: u64,
    pub connect_timeout_ms: u64,
    /// Publish `SocketTimeout` after this long without inbound bytes (0 = disabled).
    pub idle_timeout_ms: u64,
    /// Per-subscriber notification queue capacity.
    pub event_queue_size: usize,
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_AMI_PORT,
            username: String::new(),
            secret: String::new(),
            encoding: TransportEncoding::default(),
            events: false,
            reconnect: false,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            action_ttl_ms: DEFAULT_ACTION_TTL_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            idle_timeout_ms: 0,
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
        }
    }
}

impl fmt::Debug for AmiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("encoding", &self.encoding)
            .field("events", &self.events)
            .field("reconnect", &self.reconnect)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("action_ttl_ms", &self.action_ttl_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .field("event_queue_size", &self.event_queue_size)
            .finish()
    }
}

impl AmiConfig {
    /// Config for `host:port` with credentials, everything else defaulted.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Read `AMI_HOST`, `AMI_PORT`, `AMI_USER` and `AMI_PASSWORD`, falling back
    /// to the defaults for unset variables.
    pub fn from_env() -> AmiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AmiResult<Self> {
        let mut config = Self::default();
        if let Some(host) = lookup("AMI_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("AMI_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| AmiError::configuration(format!("invalid AMI_PORT '{}'", port)))?;
        }
        if let Some(user) = lookup("AMI_USER") {
            config.username = user;
        }
        if let Some(secret) = lookup("AMI_PASSWORD") {
            config.secret = secret;
        }
        Ok(config)
    }

    /// Reject settings the adapter cannot run with.
    pub fn validate(&self) -> AmiResult<()> {
        if self.action_ttl_ms == 0 {
            return Err(AmiError::configuration(
                "action_ttl_ms must be greater than zero",
            ));
        }
        if self
            .host
            .trim()
            .is_empty()
        {
            return Err(AmiError::configuration("host must not be empty"));
        }
        if self.event_queue_size == 0 {
            return Err(AmiError::configuration(
                "event_queue_size must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn action_ttl(&self) -> Duration {
        Duration::from_millis(self.action_ttl_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = AmiConfig::default();
        assert_eq!(config.port, 5038);
        assert_eq!(config.action_ttl_ms, 10_000);
        assert!(!config.reconnect);
        assert!(config
            .validate()
            .is_ok());
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn zero_ttl_rejected() {
        let config = AmiConfig {
            action_ttl_ms: 0,
            ..AmiConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AmiError::Configuration { .. })
        ));
    }

    #[test]
    fn empty_host_rejected() {
        let config = AmiConfig::new(" ", 5038, "admin", "secret");
        assert!(config
            .validate()
            .is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let config = AmiConfig::new("pbx", 5038, "admin", "hunter2");
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn deserialize_partial_document() {
        let config: AmiConfig = serde_json::from_str(
            r#"{"host":"10.0.0.5","username":"u","secret":"s","encoding":"ascii","reconnect":true,"reconnect_delay_ms":250}"#,
        )
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.encoding, TransportEncoding::Ascii);
        assert!(config.reconnect);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(config.action_ttl_ms, DEFAULT_ACTION_TTL_MS);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("AMI_HOST", "pbx.local"),
            ("AMI_PORT", "15038"),
            ("AMI_USER", "monitor"),
        ]
        .into();
        let config = AmiConfig::from_lookup(|k| env
            .get(k)
            .map(|v| v.to_string()))
        .unwrap();
        assert_eq!(config.host, "pbx.local");
        assert_eq!(config.port, 15038);
        assert_eq!(config.username, "monitor");
        assert_eq!(config.secret, "");
    }

    #[test]
    fn lookup_bad_port() {
        let err = AmiConfig::from_lookup(|k| (k == "AMI_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, AmiError::Configuration { .. }));
    }
}
