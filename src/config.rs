//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use gateway_core::{ContextSource, StripContextAndPrefix, rewrite::DEFAULT_PARTS};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// X.509 trust policy
    pub x509: X509Config,
    /// Paths that bypass the trust pipeline (default: `["/health"]`)
    pub public_paths: Vec<String>,
    /// Backend routes
    pub routes: Vec<RouteConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            x509: X509Config::default(),
            public_paths: default_public_paths(),
            routes: Vec::new(),
        }
    }
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

impl Config {
    /// Load configuration from an optional YAML file, then `API_GATEWAY_`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("API_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.server.tls.enabled {
            let tls = &self.server.tls;
            for (field, value) in [
                ("server_cert", &tls.server_cert),
                ("server_key", &tls.server_key),
                ("ca_cert", &tls.ca_cert),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "server.tls.{field} is required when TLS is enabled"
                    )));
                }
            }
        }

        if self.x509.max_certificate_bytes == 0 {
            return Err(Error::Config(
                "x509.max_certificate_bytes must be greater than zero".to_string(),
            ));
        }

        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(Error::Config(format!(
                    "Route '{}' path must start with '/': {}",
                    route.id, route.path
                )));
            }
            url::Url::parse(&route.uri).map_err(|e| {
                Error::Config(format!("Route '{}' has invalid uri '{}': {e}", route.id, route.uri))
            })?;
        }

        Ok(())
    }

    /// Expand `${VAR}` references in route URIs.
    fn expand_env_vars(&mut self) {
        let Ok(re) = Regex::new(r"\$\{([^}]+)\}") else {
            return;
        };

        for route in &mut self.routes {
            route.uri = Self::expand_string(&re, &route.uri);
        }
    }

    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures<'_>| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Upstream request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// TLS listener settings
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8443,
            request_timeout: Duration::from_secs(30),
            tls: TlsConfig::default(),
        }
    }
}

/// TLS listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Terminate TLS in the gateway.
    ///
    /// When `false` (default) the gateway listens on plain HTTP and expects a
    /// TLS-terminating proxy in front of it.
    pub enabled: bool,

    /// Path to the PEM-encoded server certificate chain.
    pub server_cert: String,

    /// Path to the PEM-encoded server private key.
    pub server_key: String,

    /// Path to the PEM-encoded CA bundle used to verify client certificates.
    pub ca_cert: String,

    /// Reject handshakes without a client certificate.
    ///
    /// Left `false` so forwarding proxies and public paths can still connect.
    pub require_client_cert: bool,
}

/// X.509 trust policy.
///
/// Loaded once at startup and shared read-only by every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct X509Config {
    /// Forwarded certificate handling
    pub forwarding: ForwardingConfig,
    /// Organisation constraint
    pub organisation: OrganisationConfig,
    /// Largest certificate header payload accepted, in bytes
    pub max_certificate_bytes: usize,
}

impl Default for X509Config {
    fn default() -> Self {
        Self {
            forwarding: ForwardingConfig::default(),
            organisation: OrganisationConfig::default(),
            max_certificate_bytes: 16 * 1024,
        }
    }
}

/// Header set a TLS-terminating proxy is expected to send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardingMode {
    /// `X-SSL-Forwarded` marker, certificate required, subject DN optional.
    #[default]
    Strict,
    /// `X-SSL-Verify: SUCCESS` plus certificate and subject DN, all required.
    Simplified,
}

/// Forwarded certificate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Accept client identities forwarded in headers
    pub enabled: bool,
    /// Header scheme used by the upstream proxy
    pub mode: ForwardingMode,
    /// Hosts allowed to forward client certificates
    pub hosts: Vec<String>,
    /// In simplified mode, require `X-SSL-CERT` next to `X-SSL-SDN`
    pub require_certificate: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ForwardingMode::default(),
            hosts: Vec::new(),
            require_certificate: true,
        }
    }
}

/// Allowed organisation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrganisationConfig {
    /// Organisation MRN prefix the subject `O` attribute must start with.
    /// Blank accepts any organisation.
    pub mrn: String,
}

/// Backend route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Route identifier used in logs
    pub id: String,
    /// Path prefix matched against the request path
    pub path: String,
    /// Backend base URI
    pub uri: String,
    /// Leading segments removed before forwarding
    #[serde(default = "default_strip_parts")]
    pub strip_parts: usize,
    /// Path the context path is computed from
    #[serde(default)]
    pub context_source: ContextSource,
    /// Reject requests without an authenticated client certificate
    #[serde(default = "default_true")]
    pub require_authentication: bool,
}

impl RouteConfig {
    /// Build the rewrite filter for this route.
    #[must_use]
    pub fn rewrite_filter(&self) -> StripContextAndPrefix {
        StripContextAndPrefix::new(self.strip_parts).with_context_source(self.context_source)
    }
}

fn default_strip_parts() -> usize {
    DEFAULT_PARTS
}

fn default_true() -> bool {
    true
}

/// Durations as `"250ms"`, `"30s"`, `"5m"`, `"1h"` or bare seconds.
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Whole seconds when exact, milliseconds otherwise.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Parse a duration with an optional `ms`, `s`, `m` or `h` suffix.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let value = raw.trim();

        let (digits, unit_ms) = if let Some(n) = value.strip_suffix("ms") {
            (n, 1)
        } else if let Some(n) = value.strip_suffix('s') {
            (n, 1_000)
        } else if let Some(n) = value.strip_suffix('m') {
            (n, 60_000)
        } else if let Some(n) = value.strip_suffix('h') {
            (n, 3_600_000)
        } else {
            (value, 1_000)
        };

        digits
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(unit_ms))
            .map(Duration::from_millis)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{raw}'")))
    }
}
