//! CLI entry point.

use clap::Parser;
use tracing::error;

use lpp_relay_cli::{Cli, child_exit_code, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before parsing so it can provide flag values
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_file.as_deref())?;

    let code = match lpp_relay_cli::run(&cli).await {
        Ok(code) => child_exit_code(code),
        Err(e) => {
            error!(error = %e, "relay failed");
            e.exit_code()
        }
    };
    std::process::exit(code)
}
