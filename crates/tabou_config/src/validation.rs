use std::{fmt, net::IpAddr};

use crate::{ParentProxy, ProxyConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Startup continues with the value as written.
    Warning,
    /// The file is rejected and defaults are used instead.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One finding, tied to the `section.key` it is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub key: &'static str,
    pub message: String,
}

/// What `validate` found, plus where relayed requests will go.
#[derive(Debug, Default)]
pub struct ConfigReport {
    issues: Vec<ConfigIssue>,
    parent: Option<String>,
}

impl ConfigReport {
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// `host:port` of the parent proxy when one is configured and parses.
    pub fn parent_endpoint(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Nothing worth telling the operator.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.parent.is_none()
    }

    fn push(&mut self, severity: Severity, key: &'static str, message: impl Into<String>) {
        self.issues.push(ConfigIssue {
            severity,
            key,
            message: message.into(),
        });
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "  {:<7} {}: {}", issue.severity, issue.key, issue.message)?;
        }
        match &self.parent {
            Some(endpoint) => writeln!(f, "  relaying through parent proxy {endpoint}"),
            None => Ok(()),
        }
    }
}

/// Validate a proxy configuration and return a report of issues.
pub fn validate(cfg: &ProxyConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_listen(cfg, &mut report);
    validate_upstream(cfg, &mut report);
    validate_http(cfg, &mut report);

    report
}

fn validate_listen(cfg: &ProxyConfig, report: &mut ConfigReport) {
    if cfg.listen.bind.parse::<IpAddr>().is_err() {
        report.push(
            Severity::Error,
            "listen.bind",
            format!("'{}' is not an IP address", cfg.listen.bind),
        );
    }
    if cfg.listen.port == 0 {
        report.push(Severity::Warning, "listen.port", "0 lets the OS pick an ephemeral port");
    }
}

fn validate_upstream(cfg: &ProxyConfig, report: &mut ConfigReport) {
    let Some(raw) = cfg.upstream.parent_proxy.as_deref() else {
        return;
    };
    match ParentProxy::parse(raw) {
        Ok(parent) => {
            if parent.url().scheme() != "http" {
                report.push(
                    Severity::Warning,
                    "upstream.parent_proxy",
                    format!(
                        "scheme '{}' is ignored; requests are sent as plain HTTP",
                        parent.url().scheme()
                    ),
                );
            }
            report.parent = Some(parent.to_string());
        }
        Err(e) => report.push(Severity::Error, "upstream.parent_proxy", e.to_string()),
    }
}

fn validate_http(cfg: &ProxyConfig, report: &mut ConfigReport) {
    if cfg.http.read_timeout_secs > 3600 {
        report.push(
            Severity::Warning,
            "http.read_timeout_secs",
            format!("{}s lets idle sockets linger for over an hour", cfg.http.read_timeout_secs),
        );
    }
    if cfg.http.max_line_bytes < 1024 {
        report.push(
            Severity::Warning,
            "http.max_line_bytes",
            format!("{} will reject many ordinary requests", cfg.http.max_line_bytes),
        );
    }
}
