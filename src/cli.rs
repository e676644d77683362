//! Command-line interface.
//!
//! Carries exactly the fixed flag set from the wire contract: `--host`,
//! `--port`, `--config`, `--log-level`, `--reload`. Precedence: flags > env >
//! file > defaults.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::Settings;

/// Code-graph-rag HTTP server façade.
#[derive(Parser, Debug)]
#[command(name = "code-graph-rag-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML).
    #[arg(short, long, env = "HTTP_SERVER__CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long, env = "HTTP_SERVER__SERVICE__PORT")]
    pub port: Option<u16>,

    /// Host to bind to.
    #[arg(long, env = "HTTP_SERVER__SERVICE__HOST")]
    pub host: Option<String>,

    /// Log level.
    #[arg(long, value_enum, default_value = "info", env = "HTTP_SERVER__LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Enable development hot-reload watching. Parsed and logged; currently
    /// inert, since hot configuration reload is out of scope for this version.
    #[arg(long)]
    pub reload: bool,
}

/// Accepted `--log-level` values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose developer diagnostics.
    Debug,
    /// Normal operational messages.
    Info,
    /// Recoverable anomalies.
    Warning,
    /// Failures that affect a single request.
    Error,
    /// Failures that affect the whole process.
    Critical,
}

impl LogLevel {
    /// Map to a `tracing`/`EnvFilter` directive.
    #[must_use]
    pub fn as_tracing_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

impl Cli {
    /// Parse from an explicit argument slice. Used by tests and by `main`.
    #[must_use]
    pub fn parse_from_slice(args: &[&str]) -> Self {
        Self::parse_from(args)
    }

    /// Apply this CLI's overrides onto an already-loaded [`Settings`].
    /// CLI flags take precedence over file and environment values.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(port) = self.port {
            settings.service.port = port;
        }
        if let Some(host) = &self.host {
            settings.service.host = host.clone();
        }
    }
}
