//! Configuration schema definitions.
//!
//! All sections default, so an empty file is a valid (listener-less) config.

use serde::{Deserialize, Serialize};

/// Root configuration for a server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name recorded on the server's log span.
    pub name: String,

    /// `[[listeners]]` entries; each becomes one binding.
    pub listeners: Vec<ListenerConfig>,

    pub http: HttpConfig,

    pub session: SessionConfig,

    pub logging: LoggingConfig,

    pub metrics: MetricsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "switchyard".to_string(),
            listeners: Vec::new(),
            http: HttpConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// One bound address.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host name or IP address.
    pub address: String,

    /// Port; 0 picks an ephemeral port.
    pub port: u16,

    /// Bind with `SO_REUSEPORT` so several workers share the port.
    pub multi: bool,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
            multi: false,
            max_connections: 10_000,
            tls: None,
        }
    }
}

/// TLS material for a listener.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// HTTP/1.1 keep-alive.
    pub keep_alive: bool,

    /// Largest request body buffered before answering 413.
    pub max_body_bytes: usize,

    /// Include fault messages in 500 bodies. Development only.
    pub expose_fault_details: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_body_bytes: 2 * 1024 * 1024,
            expose_fault_details: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session id for the in-memory session manager.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,

    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "switchyard=info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Prometheus scrape address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9090".to_string(),
        }
    }
}
