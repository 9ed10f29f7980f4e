use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "octofhir-shc")]
#[command(about = "OctoFHIR SMART Health Card scanner: decode, verify and inspect shc:/ codes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./octofhir-shc.toml, then ~/.octofhir/shc.toml)
    #[arg(short, long, global = true, env = "OCTOFHIR_SHC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log level (overrides config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan one or more shc:/ codes and report the verified result
    Scan(ScanArgs),
    /// Decode a shc:/ code and print the credential JSON (no verification)
    Decode(DecodeArgs),
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args)]
pub struct ScanArgs {
    /// Raw codes; read from --input or stdin (one per line) when omitted
    pub codes: Vec<String>,
    /// File with one code per line
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Report every code instead of reducing the batch to one result
    #[arg(long)]
    pub each: bool,
    /// Stop at the first successful code
    #[arg(long)]
    pub first: bool,
}

#[derive(clap::Args)]
pub struct DecodeArgs {
    /// Raw shc:/ code
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan() {
        let cli = Cli::parse_from(["octofhir-shc", "scan", "shc:/56", "shc:/57", "--format", "json"]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.codes, vec!["shc:/56", "shc:/57"]);
                assert!(!args.each);
                assert!(args.input.is_none());
            }
            _ => panic!("expected scan"),
        }
    }
}
