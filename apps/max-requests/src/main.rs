use max_requests::cli::Cli;
use max_requests::error::MaxRequestsError;
use max_requests::logger::initialize as LoggerInitialize;

use server_core::application::ApplicationRegistry;
use server_core::config::ServerConfig;
use server_core::error::CoreError;
use server_core::server::{Server, ServerOptions, open_listeners};
use server_core::succession::{Successor, SuccessorCommand};

use common::ErrorLocation;

use std::panic::Location;
use std::process::exit;

use clap::Parser;
use log::{error, info};
use tokio::runtime::Builder as RuntimeBuilder;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = LoggerInitialize(cli.log_file.as_deref(), cli.log_level) {
        eprintln!("{e}");
        exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("{e}");
        exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), MaxRequestsError> {
    let config = cli.resolve().map_err(CoreError::from)?;

    // One thread: the request that reaches the quota stops every acceptor
    // before any other task can accept again. Applications run on the
    // blocking pool.
    let runtime = RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| MaxRequestsError::MaxRequests {
            message: format!("Failed to build tokio runtime: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let successor = runtime.block_on(serve(&config))?;

    info!(
        "Handed off to PID {}; PID {} exiting",
        successor.pid,
        std::process::id()
    );
    Ok(())
}

async fn serve(config: &ServerConfig) -> Result<Successor, CoreError> {
    let options = ServerOptions::from_config(
        config,
        &ApplicationRegistry::default(),
        SuccessorCommand::current_process()?,
    )?;
    let listeners = open_listeners(config)?;

    Server::new(listeners, options).run().await
}
