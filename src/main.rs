//! API Gateway - edge-trust layer for SECOM services

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use api_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::CheckConfig) => match check_config(&cli) {
            Ok(summary) => {
                println!("{summary}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Configuration invalid: {e:#}");
                ExitCode::FAILURE
            }
        },
        Some(Command::Serve) | None => run_server(&cli).await,
    }
}

/// Load the configuration and apply CLI overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host.clone_from(host);
    }
    Ok(config)
}

fn check_config(cli: &Cli) -> anyhow::Result<String> {
    let config = load_config(cli)?;
    Gateway::new(config.clone()).context("Failed to build gateway")?;
    if config.server.tls.enabled {
        api_gateway::gateway::tls::build_server_config(&config.server.tls)
            .context("Failed to load TLS material")?;
    }
    Ok(format!(
        "Configuration OK: {} route(s), forwarding {}, TLS {}",
        config.routes.len(),
        if config.x509.forwarding.enabled { "enabled" } else { "disabled" },
        if config.server.tls.enabled { "enabled" } else { "disabled" },
    ))
}

async fn run_server(cli: &Cli) -> ExitCode {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        routes = config.routes.len(),
        "Starting API Gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
