//! Configuration resolution: defaults < YAML file < environment < CLI flags.
//!
//! Environment variables use the `HTTP_SERVER__` hierarchical convention:
//! the dotted setting path is upper-cased and joined with a double
//! underscore (`service.port` → `HTTP_SERVER__SERVICE__PORT`), matched
//! case-insensitively. Validation failure aggregates every violation rather
//! than failing on the first.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::value::Dict;
use figment::{Figment, Provider};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// One violation surfaced by [`Settings::validate`].
#[derive(Debug, Clone)]
pub struct Violation {
    /// Dotted path of the offending field, e.g. `service.port`.
    pub path: String,
    /// What was received.
    pub received: String,
    /// What was expected.
    pub expected: String,
    /// The environment-variable override that targets this field.
    pub env_override: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: received {}, expected {} (override with {})",
            self.path, self.received, self.expected, self.env_override
        )
    }
}

/// Configuration failures. All are fatal: the process exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file named by `--config` does not exist.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Absolute path that was expected to exist.
        path: PathBuf,
    },

    /// The YAML file failed to parse.
    #[error("failed to parse config: {0}")]
    Parse(#[from] figment::Error),

    /// One or more settings failed validation.
    #[error("{} configuration violation(s):\n{}", .0.len(), format_violations(.0))]
    Aggregate(Vec<Violation>),
}

fn format_violations(violations: &[Violation]) -> String {
    violations.iter().map(|v| format!("  - {v}")).collect::<Vec<_>>().join("\n")
}

/// Top-level validated settings tree. Constructed once at startup via
/// [`Settings::load`], immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Service identity settings.
    pub service: ServiceSettings,
    /// Server-level runtime settings.
    pub server: ServerSettings,
    /// Monitoring and observability toggles.
    pub monitoring: MonitoringSettings,
    /// Security-adjacent settings. Enforcement is partial; see `security.rate_limit`.
    pub security: SecuritySettings,
    /// Per-dependency connection settings, keyed by dependency name (e.g. `memgraph`).
    pub dependencies: HashMap<String, DependencySettings>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut dependencies = HashMap::new();
        dependencies.insert("memgraph".to_string(), DependencySettings::default());
        Self {
            service: ServiceSettings::default(),
            server: ServerSettings::default(),
            monitoring: MonitoringSettings::default(),
            security: SecuritySettings::default(),
            dependencies,
        }
    }
}

/// `service.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name, must match `^[a-z][a-z0-9-]*$`.
    pub name: String,
    /// Port to bind, 1024-65535.
    pub port: u16,
    /// Host/IP to bind.
    pub host: String,
    /// Semantic version string reported by `/tools`.
    pub version: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "code-graph-rag".to_string(),
            port: 8080,
            host: "127.0.0.1".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `server.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Worker thread count, must be >= 1.
    pub workers: u32,
    /// Per-tool-call hard deadline, seconds, 1-300.
    pub timeout: u64,
    /// Graceful shutdown drain budget, seconds, 1-60.
    pub graceful_shutdown_seconds: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout: 30,
            graceful_shutdown_seconds: 30,
        }
    }
}

/// `monitoring.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Seconds between dependency probes, must be >= 10.
    pub health_check_interval: u64,
    /// Reserved for future metrics export; currently unused (no `/metrics` endpoint).
    pub metrics_enabled: bool,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            health_check_interval: 30,
            metrics_enabled: false,
        }
    }
}

/// `security.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Reserved; API-key auth is not implemented (Non-goal).
    pub api_keys_enabled: bool,
    /// Requests per minute per client. Validated but not enforced.
    pub rate_limit: u32,
    /// CORS configuration.
    pub cors: CorsSettings,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            api_keys_enabled: false,
            rate_limit: 60,
            cors: CorsSettings::default(),
        }
    }
}

/// `security.cors.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Whether CORS headers are emitted at all.
    pub enabled: bool,
    /// Allowed origin patterns; each may carry a single trailing `*` wildcard
    /// on the port component, e.g. `http://localhost:*`.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
        }
    }
}

/// `dependencies.<name>.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySettings {
    /// Dependency host/IP.
    pub host: String,
    /// Dependency port.
    pub port: u16,
    /// Per-probe timeout, milliseconds, >= 100.
    pub timeout: u64,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7687,
            timeout: 2_000,
        }
    }
}

fn service_name_re() -> Regex {
    Regex::new(r"^[a-z][a-z0-9-]*$").unwrap()
}

fn is_valid_host(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() || host.parse::<Ipv4Addr>().is_ok() {
        return true;
    }
    !host.is_empty() && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

fn is_valid_cors_origin(origin: &str) -> bool {
    let wildcards = origin.matches('*').count();
    wildcards <= 1
}

const TOP_LEVEL_KEYS: &[&str] = &["service", "server", "monitoring", "security", "dependencies"];
const SERVICE_KEYS: &[&str] = &["name", "port", "host", "version"];
const SERVER_KEYS: &[&str] = &["workers", "timeout", "graceful_shutdown_seconds"];
const MONITORING_KEYS: &[&str] = &["health_check_interval", "metrics_enabled"];
const SECURITY_KEYS: &[&str] = &["api_keys_enabled", "rate_limit", "cors"];
const CORS_KEYS: &[&str] = &["enabled", "allowed_origins"];
const DEPENDENCY_KEYS: &[&str] = &["host", "port", "timeout"];

/// Diff the fully-merged (defaults < file < env) figment dict against the
/// known field names of each section, surfacing a typo'd top-level section
/// or leaf key as a `Violation` instead of letting it vanish silently.
fn unknown_key_violations(figment: &Figment) -> Result<Vec<Violation>, ConfigError> {
    let data = figment.data()?;
    let dict = data.get(figment.profile()).cloned().unwrap_or_default();

    let mut violations = Vec::new();
    push_unknown(&mut violations, "", &dict, TOP_LEVEL_KEYS);

    if let Some(section) = dict.get("service").and_then(|v| v.as_dict()) {
        push_unknown(&mut violations, "service", section, SERVICE_KEYS);
    }
    if let Some(section) = dict.get("server").and_then(|v| v.as_dict()) {
        push_unknown(&mut violations, "server", section, SERVER_KEYS);
    }
    if let Some(section) = dict.get("monitoring").and_then(|v| v.as_dict()) {
        push_unknown(&mut violations, "monitoring", section, MONITORING_KEYS);
    }
    if let Some(section) = dict.get("security").and_then(|v| v.as_dict()) {
        push_unknown(&mut violations, "security", section, SECURITY_KEYS);
        if let Some(cors) = section.get("cors").and_then(|v| v.as_dict()) {
            push_unknown(&mut violations, "security.cors", cors, CORS_KEYS);
        }
    }
    if let Some(deps) = dict.get("dependencies").and_then(|v| v.as_dict()) {
        for (name, value) in deps {
            if let Some(dep) = value.as_dict() {
                push_unknown(&mut violations, &format!("dependencies.{name}"), dep, DEPENDENCY_KEYS);
            }
        }
    }

    Ok(violations)
}

fn push_unknown(violations: &mut Vec<Violation>, prefix: &str, dict: &Dict, known: &[&str]) {
    for key in dict.keys() {
        if known.contains(&key.as_str()) {
            continue;
        }
        let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        let env_override = format!("HTTP_SERVER__{}", path.to_uppercase().replace('.', "__"));
        violations.push(Violation {
            path,
            received: format!("unknown key `{key}`"),
            expected: format!("one of: {}", known.join(", ")),
            env_override,
        });
    }
}

impl Settings {
    /// `Load(file_path, env, argv) → Settings`.
    ///
    /// Precedence: defaults < YAML file < environment < CLI flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if `file_path` is `Some` and does
    /// not exist, [`ConfigError::Parse`] if the YAML or environment layer
    /// cannot be extracted, or [`ConfigError::Aggregate`] if validation fails.
    pub fn load(file_path: Option<&Path>, cli: &Cli) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = file_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound { path: path.to_path_buf() });
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed("HTTP_SERVER__").split("__"));

        let mut settings: Self = figment.extract()?;
        cli.apply_overrides(&mut settings);

        // `figment.extract()` silently drops keys no target field claims, so a
        // typo'd YAML/env key never reaches `Self`'s fields at all and
        // `#[serde(deny_unknown_fields)]` would have nothing to reject. Walk
        // the merged dict directly and fold any unrecognized key in as a
        // violation alongside the usual range/format checks below.
        let mut violations = unknown_key_violations(&figment)?;
        if let Err(ConfigError::Aggregate(more)) = settings.validate() {
            violations.extend(more);
        }

        if violations.is_empty() {
            Ok(settings)
        } else {
            Err(ConfigError::Aggregate(violations))
        }
    }

    /// `Validate(Settings) → ok | AggregateError`.
    ///
    /// Checks every leaf in the settings tree and collects *all* violations
    /// rather than stopping at the first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Aggregate`] listing every violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        if !service_name_re().is_match(&self.service.name) {
            violations.push(Violation {
                path: "service.name".to_string(),
                received: self.service.name.clone(),
                expected: "a string matching ^[a-z][a-z0-9-]*$".to_string(),
                env_override: "HTTP_SERVER__SERVICE__NAME".to_string(),
            });
        }
        if !(1024..=65535).contains(&self.service.port) {
            violations.push(Violation {
                path: "service.port".to_string(),
                received: self.service.port.to_string(),
                expected: "an integer in 1024..=65535".to_string(),
                env_override: "HTTP_SERVER__SERVICE__PORT".to_string(),
            });
        }
        if !is_valid_host(&self.service.host) {
            violations.push(Violation {
                path: "service.host".to_string(),
                received: self.service.host.clone(),
                expected: "a valid IP address or hostname".to_string(),
                env_override: "HTTP_SERVER__SERVICE__HOST".to_string(),
            });
        }

        if self.server.workers < 1 {
            violations.push(Violation {
                path: "server.workers".to_string(),
                received: self.server.workers.to_string(),
                expected: "an integer >= 1".to_string(),
                env_override: "HTTP_SERVER__SERVER__WORKERS".to_string(),
            });
        }
        if !(1..=300).contains(&self.server.timeout) {
            violations.push(Violation {
                path: "server.timeout".to_string(),
                received: self.server.timeout.to_string(),
                expected: "an integer in 1..=300 (seconds)".to_string(),
                env_override: "HTTP_SERVER__SERVER__TIMEOUT".to_string(),
            });
        }
        if !(1..=60).contains(&self.server.graceful_shutdown_seconds) {
            violations.push(Violation {
                path: "server.graceful_shutdown_seconds".to_string(),
                received: self.server.graceful_shutdown_seconds.to_string(),
                expected: "an integer in 1..=60".to_string(),
                env_override: "HTTP_SERVER__SERVER__GRACEFUL_SHUTDOWN_SECONDS".to_string(),
            });
        }

        if self.monitoring.health_check_interval < 10 {
            violations.push(Violation {
                path: "monitoring.health_check_interval".to_string(),
                received: self.monitoring.health_check_interval.to_string(),
                expected: "an integer >= 10 (seconds)".to_string(),
                env_override: "HTTP_SERVER__MONITORING__HEALTH_CHECK_INTERVAL".to_string(),
            });
        }

        if self.security.rate_limit < 10 {
            violations.push(Violation {
                path: "security.rate_limit".to_string(),
                received: self.security.rate_limit.to_string(),
                expected: "an integer >= 10 (requests per minute)".to_string(),
                env_override: "HTTP_SERVER__SECURITY__RATE_LIMIT".to_string(),
            });
        }
        for (i, origin) in self.security.cors.allowed_origins.iter().enumerate() {
            if !is_valid_cors_origin(origin) {
                violations.push(Violation {
                    path: format!("security.cors.allowed_origins[{i}]"),
                    received: origin.clone(),
                    expected: "an origin pattern with at most one trailing '*' wildcard".to_string(),
                    env_override: "HTTP_SERVER__SECURITY__CORS__ALLOWED_ORIGINS".to_string(),
                });
            }
        }

        for (name, dep) in &self.dependencies {
            if !is_valid_host(&dep.host) {
                violations.push(Violation {
                    path: format!("dependencies.{name}.host"),
                    received: dep.host.clone(),
                    expected: "a valid IP address or hostname".to_string(),
                    env_override: format!("HTTP_SERVER__DEPENDENCIES__{}__HOST", name.to_uppercase()),
                });
            }
            if dep.port == 0 {
                violations.push(Violation {
                    path: format!("dependencies.{name}.port"),
                    received: dep.port.to_string(),
                    expected: "a nonzero port number".to_string(),
                    env_override: format!("HTTP_SERVER__DEPENDENCIES__{}__PORT", name.to_uppercase()),
                });
            }
            if dep.timeout < 100 {
                violations.push(Violation {
                    path: format!("dependencies.{name}.timeout"),
                    received: dep.timeout.to_string(),
                    expected: "an integer >= 100 (milliseconds)".to_string(),
                    env_override: format!("HTTP_SERVER__DEPENDENCIES__{}__TIMEOUT", name.to_uppercase()),
                });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Aggregate(violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_validate_cleanly() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_service_name() {
        let mut settings = Settings::default();
        settings.service.name = "Not_Valid".to_string();
        let err = settings.validate().unwrap_err();
        match err {
            ConfigError::Aggregate(v) => assert!(v.iter().any(|x| x.path == "service.name")),
            _ => panic!("expected aggregate error"),
        }
    }

    #[test]
    fn aggregates_multiple_violations() {
        let mut settings = Settings::default();
        settings.service.port = 80;
        settings.server.workers = 0;
        settings.monitoring.health_check_interval = 1;
        let err = settings.validate().unwrap_err();
        match err {
            ConfigError::Aggregate(v) => assert_eq!(v.len(), 3),
            _ => panic!("expected aggregate error"),
        }
    }

    #[test]
    fn load_from_yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "service:\n  name: my-service\n  port: 9000\n").unwrap();
        drop(f);

        let cli = Cli::parse_from_slice(&["bin"]);
        let settings = Settings::load(Some(&path), &cli).unwrap();
        assert_eq!(settings.service.name, "my-service");
        assert_eq!(settings.service.port, 9000);
    }

    #[test]
    fn rejects_unknown_top_level_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "sevrice:\n  name: typo'd-section\n").unwrap();
        drop(f);

        let cli = Cli::parse_from_slice(&["bin"]);
        let err = Settings::load(Some(&path), &cli).unwrap_err();
        match err {
            ConfigError::Aggregate(v) => assert!(v.iter().any(|x| x.path == "sevrice")),
            _ => panic!("expected aggregate error"),
        }
    }

    #[test]
    fn rejects_unknown_leaf_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "service:\n  naem: typo'd-key\n").unwrap();
        drop(f);

        let cli = Cli::parse_from_slice(&["bin"]);
        let err = Settings::load(Some(&path), &cli).unwrap_err();
        match err {
            ConfigError::Aggregate(v) => assert!(v.iter().any(|x| x.path == "service.naem")),
            _ => panic!("expected aggregate error"),
        }
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::parse_from_slice(&["bin"]);
        let err = Settings::load(Some(Path::new("/nonexistent/config.yaml")), &cli).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn cli_flags_override_file_and_defaults() {
        let cli = Cli::parse_from_slice(&["bin", "--port", "9999", "--host", "0.0.0.0"]);
        let settings = Settings::load(None, &cli).unwrap();
        assert_eq!(settings.service.port, 9999);
        assert_eq!(settings.service.host, "0.0.0.0");
    }
}
