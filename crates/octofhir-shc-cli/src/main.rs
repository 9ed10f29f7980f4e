mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;
use octofhir_shc::BatchPolicy;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref()).map_err(anyhow::Error::msg)?;

    let level = cli.log_level.as_deref().unwrap_or(&cfg.logging.level);
    observability::init_tracing_with_level(level);
    let format = cli.format.unwrap_or_default();

    match &cli.command {
        Commands::Scan(args) => {
            if args.first {
                cfg.scan.batch_policy = BatchPolicy::FirstSuccess;
            }
            let scanner = commands::build_scanner(&cfg)?;
            commands::scan::scan(&scanner, args, format).await?;
        }
        Commands::Decode(args) => {
            let scanner = commands::build_scanner(&cfg)?;
            commands::decode::decode(&scanner, &args.code)?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&cfg)?);
        }
    }

    Ok(())
}
