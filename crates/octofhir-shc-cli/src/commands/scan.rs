use std::fs;
use std::io::{self, BufRead};

use anyhow::{Context, Result};
use octofhir_shc::{ScanError, Scanner};
use tokio_util::sync::CancellationToken;

use crate::cli::{OutputFormat, ScanArgs};
use crate::output::{print_scan_outcomes, print_scan_result};

pub async fn scan(scanner: &Scanner, args: &ScanArgs, format: OutputFormat) -> Result<()> {
    let codes = collect_codes(args)?;
    tracing::debug!(count = codes.len(), "Scanning codes");

    if args.each {
        if codes.is_empty() {
            return Err(ScanError::NoCodes.into());
        }
        let outcomes = scanner.scan_each(&codes).await;
        print_scan_outcomes(&outcomes, format)?;
        if outcomes.iter().all(|o| o.is_err()) {
            anyhow::bail!("No code could be read");
        }
        return Ok(());
    }

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = scanner.scan_batch_cancellable(&codes, &token).await;

    print_scan_result(&result?, format)
}

fn collect_codes(args: &ScanArgs) -> Result<Vec<String>> {
    if !args.codes.is_empty() {
        return Ok(args.codes.clone());
    }
    let lines: Vec<String> = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?
            .lines()
            .map(str::to_string)
            .collect(),
        None => io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<_>>()
            .context("Cannot read codes from stdin")?,
    };
    Ok(non_empty_lines(lines))
}

fn non_empty_lines(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(codes: Vec<&str>, input: Option<PathBuf>) -> ScanArgs {
        ScanArgs {
            codes: codes.into_iter().map(str::to_string).collect(),
            input,
            each: false,
            first: false,
        }
    }

    #[test]
    fn test_codes_from_arguments() {
        let codes = collect_codes(&args(vec!["shc:/56"], None)).unwrap();
        assert_eq!(codes, vec!["shc:/56"]);
    }

    #[test]
    fn test_codes_from_file_skip_blank_lines() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("codes.txt");
        fs::write(&path, "shc:/56\n\n  shc:/57  \n").expect("write codes");

        let codes = collect_codes(&args(vec![], Some(path))).unwrap();
        assert_eq!(codes, vec!["shc:/56", "shc:/57"]);
    }
}
