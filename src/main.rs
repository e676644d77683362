//! Entry point: parse flags, load configuration, run the lifecycle
//! controller to completion.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use code_graph_rag_server::cli::Cli;
use code_graph_rag_server::config::Settings;
use code_graph_rag_server::gateway::Server;
use code_graph_rag_server::setup_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(cli.log_level) {
        eprintln!("failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }

    if cli.reload {
        info!("--reload requested; hot configuration reload is not implemented in this version");
    }

    // 1. Parse flags -> load file -> apply env overrides -> validate.
    let settings = match Settings::load(cli.config.as_deref(), &cli) {
        Ok(settings) => settings,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        service = %settings.service.name,
        host = %settings.service.host,
        port = settings.service.port,
        dependencies = settings.dependencies.len(),
        "starting up"
    );

    let server = Server::new(settings);

    if let Err(e) = server.run().await {
        error!("server exited with an error: {e}");
        return ExitCode::FAILURE;
    }

    info!("shutdown complete");
    ExitCode::SUCCESS
}
