pub mod decode;
pub mod scan;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use octofhir_shc::{CodeLabels, JwksCache, Scanner, TrustedIssuers};

use crate::config::AppConfig;

/// Builds a scanner from the loaded configuration.
pub fn build_scanner(cfg: &AppConfig) -> Result<Scanner> {
    let issuers = match &cfg.registry.issuers_file {
        Some(path) => TrustedIssuers::from_json(&read(path)?)
            .with_context(|| format!("Invalid issuer directory {}", path.display()))?,
        None => {
            tracing::warn!("No trusted issuer directory configured; no issuer will be verified");
            TrustedIssuers::empty()
        }
    };
    let labels = match &cfg.registry.labels_file {
        Some(path) => CodeLabels::from_json(&read(path)?)
            .with_context(|| format!("Invalid code label file {}", path.display()))?,
        None => CodeLabels::builtin(),
    };
    tracing::debug!(issuers = issuers.len(), "Loaded registries");

    let key_sets = JwksCache::new(cfg.trust.cache_config())?;
    Ok(Scanner::new(
        Arc::new(issuers),
        Arc::new(labels),
        Arc::new(key_sets),
        cfg.scanner_config(),
    ))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_shc::BatchPolicy;

    #[test]
    fn test_build_scanner_with_registry_files() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let issuers = dir.path().join("issuers.json");
        fs::write(
            &issuers,
            r#"{"participating_issuers": [{"iss": "https://issuer.example.org", "name": "Example"}]}"#,
        )
        .expect("write issuers");

        let mut cfg = AppConfig::default();
        cfg.registry.issuers_file = Some(issuers);
        cfg.scan.batch_policy = BatchPolicy::FirstSuccess;

        let scanner = build_scanner(&cfg).expect("scanner");
        assert_eq!(scanner.config().batch_policy, BatchPolicy::FirstSuccess);
    }

    #[test]
    fn test_missing_registry_file_is_an_error() {
        let mut cfg = AppConfig::default();
        cfg.registry.labels_file = Some("/nonexistent/labels.json".into());
        let err = build_scanner(&cfg).err().expect("should fail");
        assert!(err.to_string().contains("Cannot read"));
    }
}
