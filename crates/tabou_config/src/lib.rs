use serde::Deserialize;

mod parent;
mod tabou;
mod validation;

pub use parent::ParentProxy;
pub use tabou::ProxyConfig;
pub use validation::{validate, ConfigIssue, ConfigReport, Severity};

/// Port the proxy listens on when neither the config file nor `-p` sets one.
pub const DEFAULT_PROXY_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading config: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid parent proxy URL '{url}': {reason}")]
    InvalidParentProxy { url: String, reason: String },
}

// =======================================================
// GLOBAL CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Upper bound on connections served at the same time.
    pub max_connections: u32,
    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            log_level: "info".into(),
        }
    }
}

impl GlobalConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &GlobalConfig) {
        if self.max_connections == 0 {
            self.max_connections = defaults.max_connections;
        }
        if self.log_level.is_empty() {
            self.log_level = defaults.log_level.clone();
        }
    }
}

// =======================================================
// LISTEN CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_PROXY_PORT,
        }
    }
}

impl ListenConfig {
    /// "bind:port", bracketing IPv6 literals.
    pub fn addr(&self) -> String {
        if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &ListenConfig) {
        if self.bind.is_empty() {
            self.bind = defaults.bind.clone();
        }
    }
}

// =======================================================
// UPSTREAM CONFIG
// =======================================================
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Parent proxy URL. Absent means direct mode.
    pub parent_proxy: Option<String>,
}

impl UpstreamConfig {
    pub fn parent_proxy(&self) -> Option<&str> {
        self.parent_proxy.as_deref()
    }
}

// =======================================================
// HTTP CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    // Timeouts (seconds)
    /// Idle timeout applied to every read on client and upstream sockets.
    pub read_timeout_secs: u64,
    pub connect_timeout_secs: u64,

    // Limits (bytes)
    /// Longest request line or request header line accepted from clients.
    pub max_line_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 100,
            connect_timeout_secs: 30,
            max_line_bytes: 64 * 1024,
        }
    }
}

impl HttpConfig {
    pub(crate) fn apply_defaults_from(&mut self, defaults: &HttpConfig) {
        if self.read_timeout_secs == 0 {
            self.read_timeout_secs = defaults.read_timeout_secs;
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = defaults.connect_timeout_secs;
        }
        if self.max_line_bytes == 0 {
            self.max_line_bytes = defaults.max_line_bytes;
        }
    }
}
