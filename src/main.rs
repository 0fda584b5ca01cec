mod bus;
mod cli;
mod config;
mod diagnostics;
mod error;
mod fanout;
mod hierarchy;
mod logging;
mod mail;
mod model;
mod pipeline;
mod render;
mod store;
mod tracking;
mod util;
mod validation;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = cli::parse_args(&args)?;

    if cli.command == cli::Command::Help {
        cli::print_help();
        return Ok(());
    }

    // Load and validate config once; everything below gets values passed in.
    let path = config::config_path(cli.config.as_deref());
    let config = config::load_config(&path)?;
    config::validate(&config)?;

    logging::init(&config.logging)?;
    tracing::debug!(config = %path.display(), "configuration loaded");

    cli::handle(cli.command, &config).await
}
