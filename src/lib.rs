//! HTTP and JSON-RPC façade over a code-structure knowledge graph tool registry.
//!
//! This crate implements the HTTP server façade, tool-dispatch layer, and
//! dependency-aware health subsystem that turn a fixed registry of in-process
//! tool handlers into a uniform, correlatable, bounded, gracefully-shutting-down
//! HTTP service. The graph store, the parser/ingester that populates it, the
//! individual tool algorithms, and the stdio-framed companion transport are
//! external collaborators this crate only exposes interfaces for.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod health;
pub mod lifecycle;
pub mod registry;

pub use error::{Error, Result};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::LogLevel;

/// Set up the process-wide `tracing` subscriber. Called once at startup from
/// `main`. JSON output (for production log aggregation) is selected by
/// setting `HTTP_SERVER__LOG_FORMAT=json`; any other value uses
/// human-readable text. This is not one of the fixed CLI flags, since the
/// wire contract's `--log-level`/`--reload` set is exhaustive.
///
/// # Errors
///
/// This never fails in practice; it returns `Result` so subscriber-install
/// errors surface through the same error type as the rest of startup.
pub fn setup_tracing(level: LogLevel) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_tracing_directive()));

    let subscriber = tracing_subscriber::registry().with(filter);

    if std::env::var("HTTP_SERVER__LOG_FORMAT").as_deref() == Ok("json") {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    Ok(())
}
