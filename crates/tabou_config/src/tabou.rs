use serde::Deserialize;

use crate::validation::{validate, ConfigReport};
use crate::{ConfigError, GlobalConfig, HttpConfig, ListenConfig, ParentProxy, UpstreamConfig};

// =======================================================
// PROXY CONFIG — main config
// =======================================================
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let mut cfg = Self {
            global: GlobalConfig::default(),
            listen: ListenConfig::default(),
            upstream: UpstreamConfig::default(),
            http: HttpConfig::default(),
        };
        cfg.apply_defaults();
        cfg
    }
}

impl ProxyConfig {
    /// Parsed parent proxy, or `None` in direct mode.
    pub fn parent_proxy(&self) -> Result<Option<ParentProxy>, ConfigError> {
        self.upstream
            .parent_proxy()
            .map(ParentProxy::parse)
            .transpose()
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Ini).required(false))
            .build()?;

        let mut cfg: ProxyConfig = built.try_deserialize()?;

        cfg.apply_defaults();
        Ok(cfg)
    }

    /// Loads `file_name`, falling back to built-in defaults when it cannot
    /// be read or has validation errors. Findings go to stderr since
    /// tracing is configured from the result.
    pub fn from_file_or_default(file_name: &str) -> Self {
        let cfg = match Self::from_file(file_name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("tabou: {e}; using built-in defaults");
                return ProxyConfig::default();
            }
        };

        let report = cfg.validate();
        if report.is_empty() {
            return cfg;
        }
        eprint!("tabou: config '{file_name}':\n{report}");
        if report.has_errors() {
            eprintln!("tabou: '{file_name}' rejected; using built-in defaults");
            return ProxyConfig::default();
        }
        cfg
    }

    /// Command-line flags win over the file.
    pub fn apply_overrides(&mut self, port: Option<u16>, parent_proxy: Option<&ParentProxy>) {
        if let Some(port) = port {
            self.listen.port = port;
        }
        if let Some(parent) = parent_proxy {
            self.upstream.parent_proxy = Some(parent.url().to_string());
        }
    }

    fn apply_defaults(&mut self) {
        let def_global = GlobalConfig::default();
        self.global.apply_defaults_from(&def_global);

        let def_listen = ListenConfig::default();
        self.listen.apply_defaults_from(&def_listen);

        let def_http = HttpConfig::default();
        self.http.apply_defaults_from(&def_http);

        if self
            .upstream
            .parent_proxy
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            self.upstream.parent_proxy = None;
        }
    }

    pub fn print(&self) {
        println!("================ TABOU CONFIG ================");

        println!("\n[global]");
        println!("  max_connections      = {}", self.global.max_connections);
        println!("  log_level            = {}", self.global.log_level);

        println!("\n[listen]");
        println!("  bind                 = {}", self.listen.bind);
        println!("  port                 = {}", self.listen.port);

        println!("\n[upstream]");
        match &self.upstream.parent_proxy {
            Some(parent) => println!("  parent_proxy         = {parent}"),
            None => println!("  parent_proxy         = (direct)"),
        }

        println!("\n[http]");
        println!("  read_timeout_secs    = {}", self.http.read_timeout_secs);
        println!("  connect_timeout_secs = {}", self.http.connect_timeout_secs);
        println!("  max_line_bytes       = {}", self.http.max_line_bytes);

        println!("==============================================");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::ProxyConfig;
    use crate::{ParentProxy, DEFAULT_PROXY_PORT};

    fn write_conf(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("tabou-{}-{name}.ini", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_select_direct_mode_on_8080() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.listen.port, DEFAULT_PROXY_PORT);
        assert!(cfg.parent_proxy().unwrap().is_none());
        assert_eq!(cfg.http.read_timeout_secs, 100);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let cfg = ProxyConfig::from_file("/nonexistent/tabou-test.conf").unwrap();
        assert_eq!(cfg.listen.port, DEFAULT_PROXY_PORT);
    }

    #[test]
    fn loads_ini_sections() {
        let path = write_conf(
            "sections",
            "[listen]\nport = 3129\n\n[upstream]\nparent_proxy = http://parent.test:3128\n\n[http]\nread_timeout_secs = 5\n",
        );
        let cfg = ProxyConfig::from_file(path.to_str().unwrap()).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(cfg.listen.port, 3129);
        assert_eq!(cfg.http.read_timeout_secs, 5);
        assert_eq!(cfg.http.connect_timeout_secs, 30);
        let parent = cfg.parent_proxy().unwrap().unwrap();
        assert_eq!(parent.host(), "parent.test");
        assert_eq!(parent.port(), 3128);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = write_conf("invalid", "[listen]\nbind = localhost\nport = 3129\n");
        let cfg = ProxyConfig::from_file_or_default(path.to_str().unwrap());
        let _ = std::fs::remove_file(&path);

        assert_eq!(cfg.listen.port, DEFAULT_PROXY_PORT);
        assert_eq!(cfg.listen.bind, "0.0.0.0");
    }

    #[test]
    fn warnings_keep_file_values() {
        let path = write_conf("warned", "[http]\nmax_line_bytes = 100\n");
        let cfg = ProxyConfig::from_file_or_default(path.to_str().unwrap());
        let _ = std::fs::remove_file(&path);

        assert_eq!(cfg.http.max_line_bytes, 100);
    }

    #[test]
    fn cli_overrides_win() {
        let mut cfg = ProxyConfig::default();
        let parent = ParentProxy::parse("parent.test:3128").unwrap();
        cfg.apply_overrides(Some(9000), Some(&parent));

        assert_eq!(cfg.listen.port, 9000);
        assert_eq!(cfg.parent_proxy().unwrap(), Some(parent));
    }

    #[test]
    fn no_overrides_keep_file_values() {
        let mut cfg = ProxyConfig::default();
        cfg.apply_overrides(None, None);
        assert_eq!(cfg.listen.port, DEFAULT_PROXY_PORT);
        assert!(cfg.upstream.parent_proxy.is_none());
    }
}
