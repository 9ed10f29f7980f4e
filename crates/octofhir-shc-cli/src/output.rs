use anyhow::Result;
use colored::Colorize;
use octofhir_shc::{ScanError, ScanResult, VerificationStatus};
use serde::Serialize;
use serde_json::{Value, json};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_scan_result(result: &ScanResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Table => {
            print_as_table(result);
            Ok(())
        }
    }
}

/// Prints one line per code for `scan --each`.
pub fn print_scan_outcomes(
    outcomes: &[octofhir_shc::Result<ScanResult>],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let values: Vec<Value> = outcomes
                .iter()
                .map(|outcome| match outcome {
                    Ok(result) => serde_json::to_value(result).map(|r| json!({ "result": r })),
                    Err(e) => Ok(json!({ "error": e.to_string() })),
                })
                .collect::<std::result::Result<_, _>>()?;
            print_json(&values)
        }
        OutputFormat::Table => {
            for (i, outcome) in outcomes.iter().enumerate() {
                println!("{}", format!("Code #{}", i + 1).bold());
                match outcome {
                    Ok(result) => print_as_table(result),
                    Err(e) => print_scan_error(e),
                }
                println!();
            }
            Ok(())
        }
    }
}

pub fn print_scan_error(err: &ScanError) {
    print_error(&err.to_string());
}

fn status_label(status: VerificationStatus) -> String {
    match status {
        VerificationStatus::Verified => format!("{} Verified", "✓".green()),
        VerificationStatus::Unverified => format!("{} Unverified issuer", "!".yellow()),
        VerificationStatus::Invalid => format!("{} Invalid", "✗".red()),
    }
}

fn print_as_table(result: &ScanResult) {
    let verification = &result.verification;
    println!("{}: {}", "Status".cyan(), status_label(verification.status()));
    println!("{}: {}", "Issuer".cyan(), verification.issuer());
    println!("{}: {}", "Issued".cyan(), verification.issued_at().date());

    match &result.patient {
        Some(patient) => {
            println!("{}: {}", "Patient".cyan(), patient.name);
            println!("{}: {}", "Born".cyan(), patient.birth_date);
        }
        None => println!("{}: -", "Patient".cyan()),
    }

    if result.doses.is_empty() {
        println!("No immunizations found.");
    } else {
        let mut builder = Builder::default();
        builder.push_record(["#", "Date", "Vaccine", "Manufacturer", "Lot", "Performer"]);
        for (i, dose) in result.doses.iter().enumerate() {
            let vaccine = dose
                .vaccine
                .as_deref()
                .or(dose.cvx.as_deref())
                .or(dose.snomed.as_deref())
                .unwrap_or("-");
            let manufacturer = dose
                .manufacturer
                .as_deref()
                .or(dose.mvx.as_deref())
                .unwrap_or("-");
            builder.push_record([
                (i + 1).to_string(),
                dose.date.to_string(),
                vaccine.to_string(),
                manufacturer.to_string(),
                dose.lot_number.clone().unwrap_or_else(|| "-".to_string()),
                dose.performer.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }
        let table = builder.build().with(Style::rounded()).to_string();
        println!("{table}");
    }

    for skipped in &result.skipped {
        print_warning(&format!("Skipped {skipped}"));
    }
}
