//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (data plane and control plane addresses).
    pub listener: ListenerConfig,

    /// Route table settings.
    pub routing: RoutingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Backend instruction protocol settings.
    pub protocol: ProtocolConfig,

    /// Cookie signing settings.
    pub cookies: CookieConfig,

    /// Response decoration.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Public data-plane bind address (e.g., "0.0.0.0:8888").
    pub external_address: String,

    /// Internal control-plane bind address (route registration).
    pub internal_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            external_address: "0.0.0.0:8888".to_string(),
            internal_address: "127.0.0.1:8889".to_string(),
        }
    }
}

/// Route table configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// File the route table is persisted to after every mutation.
    pub snapshot_path: String,

    /// Domain suffix stripped from the request host before matching,
    /// e.g. "example.com" turns "api.example.com" into "api".
    pub primary_domain: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            snapshot_path: ".routes.json".to_string(),
            primary_domain: None,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time allowed for one backend round-trip, streaming included.
    pub request_secs: u64,

    /// Request timeout for control-plane calls in seconds.
    pub control_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 60,
            control_secs: 10,
        }
    }
}

/// Limits applied to inbound client requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum buffered body size in bytes (JSON and other non-upload bodies).
    pub max_body_bytes: usize,

    /// Maximum multipart upload size in bytes. Uploads are streamed, not buffered.
    pub max_upload_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Backend instruction protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Media type prefix that marks a backend response as an instruction stream.
    pub instruction_media_type: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            instruction_media_type: "application/stream+json".to_string(),
        }
    }
}

/// Cookie signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CookieConfig {
    /// Secret used to sign secure cookies. A random per-process secret is
    /// generated when absent, so signed cookies do not survive restarts.
    pub secret: Option<String>,
}

/// Response decoration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Value of the `Server` header set on every data-plane response.
    pub header_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            header_name: "gateway".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
