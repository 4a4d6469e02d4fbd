use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration for both the relay server and the subscription
/// client.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub client: ClientSettings,
    pub log: LogSettings,
}

/// Address the relay binds to.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Connections beyond this are closed right after the handshake.
    pub max_connections: usize,
}

/// Subscription client behaviour: where to connect, how to back off when
/// the connection drops, and how long a query may wait for its answer.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub url: String,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub backoff_multiplier: f64,
    pub query_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
}

impl ClientSettings {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Settings::default().client
        }
    }

    /// Never shorter than one second.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

/// Every field optional, so a file or environment can set any subset.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub client: Option<PartialClientSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRelaySettings {
    pub max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialClientSettings {
    pub url: Option<String>,
    pub reconnect_initial_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub query_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            relay: RelaySettings {
                max_connections: 1000,
            },
            client: ClientSettings {
                url: "ws://127.0.0.1:8080".to_string(),
                reconnect_initial_ms: 500,
                reconnect_max_ms: 30_000,
                backoff_multiplier: 2.0,
                query_timeout_secs: 10,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fill every unset field of `partial` from the defaults.
    pub fn merged(partial: PartialSettings) -> Self {
        let default = Self::default();
        let server = partial.server.unwrap_or_default();
        let relay = partial.relay.unwrap_or_default();
        let client = partial.client.unwrap_or_default();
        let log = partial.log.unwrap_or_default();

        Self {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            relay: RelaySettings {
                max_connections: relay
                    .max_connections
                    .unwrap_or(default.relay.max_connections),
            },
            client: ClientSettings {
                url: client.url.unwrap_or(default.client.url),
                reconnect_initial_ms: client
                    .reconnect_initial_ms
                    .unwrap_or(default.client.reconnect_initial_ms),
                reconnect_max_ms: client
                    .reconnect_max_ms
                    .unwrap_or(default.client.reconnect_max_ms),
                backoff_multiplier: client
                    .backoff_multiplier
                    .unwrap_or(default.client.backoff_multiplier),
                query_timeout_secs: client
                    .query_timeout_secs
                    .unwrap_or(default.client.query_timeout_secs),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
