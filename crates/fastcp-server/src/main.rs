//! fastcp server binary entry point.

use clap::Parser;
use tracing::{error, info};

use fastcp_server::{Cli, Listener};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = fastcp_core::init_logging(cli.verbose.saturating_add(2), None, log_format) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = cli.validate() {
        error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        root = %cli.root.display(),
        workers = cli.workers,
        "fastcp-server starting"
    );

    let listener = match Listener::bind(cli.socket_addr(), cli.mptcp, cli.session_config()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %cli.socket_addr(), error = %e, "could not bind listening socket");
            std::process::exit(1);
        }
    };

    if let Err(e) = listener.run().await {
        error!(error = %e, "server terminated");
        std::process::exit(1);
    }
}
