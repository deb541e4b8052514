//! db-router/src/bin/main.rs
//! Thin CLI host on top of `db_router_core`: parse flags, load a
//! `[routing.<name>]` TOML document, start every configured route, and
//! wait for a shutdown signal. Mirrors the teacher's split between an
//! embeddable library and the process that drives it, except here the
//! host is this binary instead of a JS/Bun embedder.

use clap::Parser;
use db_router_core::config::RouterConfig;
use db_router_core::logging;
use db_router_core::router::Router;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "db-router", about = "Connection routing core for a database proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Overrides the `log_level` configured in the file, e.g. "debug".
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RouterConfig::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration from {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    // The metadata-cache implementation is an external collaborator (see
    // crate docs); this host only drives statically-configured routes. A
    // `metadata-cache://` destination in the config file fails validation
    // here rather than being silently ignored.
    let route_configs = match config.validate(None) {
        Ok(routes) => routes,
        Err(e) => {
            tracing::error!(error = %e, "configuration is invalid");
            return ExitCode::FAILURE;
        }
    };

    let router = Router::new();
    for route_config in route_configs {
        let name = route_config.name.clone();
        if let Err(e) = router.add_route(route_config).await {
            tracing::error!(route = %name, error = %e, "failed to register route");
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = router.start_all().await {
        tracing::error!(error = %e, "failed to start routes");
        return ExitCode::FAILURE;
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
    }

    router.stop_all().await;
    ExitCode::SUCCESS
}
