//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Parley server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Per-connection outbound queue depth; a client that lags behind this
    /// many events is dropped from the room.
    pub send_buffer: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect clients silent for this long.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound WebSocket frame accepted; bigger frames are dropped
    /// with an error acknowledgment to the sender.
    pub max_frame_bytes: usize,
    /// Messages returned by the history endpoint when no limit is given.
    pub default_history_limit: usize,
    /// Hard cap for the history endpoint `limit` parameter.
    pub max_history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_buffer: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_frame_bytes: 32 * 1024,
            default_history_limit: 50,
            max_history_limit: 500,
        }
    }
}

impl ServerConfig {
    /// The `host:port` string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.send_buffer, 256);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
        assert_eq!(cfg.max_frame_bytes, 32 * 1024);
        assert_eq!(cfg.default_history_limit, 50);
    }

    #[test]
    fn bind_addr_formats() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port": 4000}"#).unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.heartbeat_interval_secs, 30);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.send_buffer, cfg.send_buffer);
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(ServerConfig::default()).unwrap();
        assert!(json.get("sendBuffer").is_some());
        assert!(json.get("heartbeatIntervalSecs").is_some());
        assert!(json.get("send_buffer").is_none());
    }
}
