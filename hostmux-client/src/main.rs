//! hostmux client - command line front end for the session mux backend

use clap::Parser;
use hostmux_utils::{init_logging_with_config, LogConfig, Result};

mod cli;
mod commands;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout is reserved for command output
    init_logging_with_config(LogConfig::cli().with_verbosity(args.verbose))?;
    tracing::debug!("CLI args: {:?}", args);

    match commands::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("hostmux error: {}", e);
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}
