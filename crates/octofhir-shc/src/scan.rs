//! Scan orchestration: decode, verify and extract one code or a batch.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::credential::Credential;
use crate::error::{PayloadError, Result, ScanError};
use crate::extract::{Dose, Patient, extract};
use crate::inflate::{DEFAULT_MAX_PAYLOAD_SIZE, InflatedCard, inflate};
use crate::jwks::KeySetSource;
use crate::jws::CompactJws;
use crate::numeric::decode_numeric;
use crate::registry::{CodeLabels, TrustedIssuers};
use crate::trust::{DEFAULT_FETCH_TIMEOUT, TrustEvaluator, VerificationResult};

/// How a batch of codes is reduced to a single result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Every code is processed; the last successful result wins.
    #[default]
    LastSuccess,
    /// Processing stops at the first successful result.
    FirstSuccess,
}

/// Scanner settings.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Cap on the inflated payload size (default: 1 MB).
    pub max_payload_size: usize,
    /// Upper bound on the issuer key-set fetch (default: 10 seconds).
    pub fetch_timeout: Duration,
    /// Batch reduction (default: last success).
    pub batch_policy: BatchPolicy,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            batch_policy: BatchPolicy::default(),
        }
    }
}

impl ScannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.batch_policy = policy;
        self
    }
}

/// The outcome of scanning one code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub verification: VerificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<Patient>,
    /// Doses sorted by date, ties in bundle order.
    pub doses: Vec<Dose>,
    /// Resources that could not be extracted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<PayloadError>,
}

impl ScanResult {
    /// Returns `true` if some bundle resources were skipped.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// A decoded but unverified card.
#[derive(Debug, Clone)]
pub struct DecodedCard {
    pub jws: CompactJws,
    pub card: InflatedCard,
}

impl DecodedCard {
    pub fn credential(&self) -> &Credential {
        &self.card.credential
    }
}

/// Runs the decode, verify and extract pipeline.
#[derive(Clone)]
pub struct Scanner {
    evaluator: TrustEvaluator,
    labels: Arc<CodeLabels>,
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(
        issuers: Arc<TrustedIssuers>,
        labels: Arc<CodeLabels>,
        key_sets: Arc<dyn KeySetSource>,
        config: ScannerConfig,
    ) -> Self {
        let evaluator =
            TrustEvaluator::new(issuers, key_sets).with_fetch_timeout(config.fetch_timeout);
        Self {
            evaluator,
            labels,
            config,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Decodes a raw code without verifying it.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Format`] or [`ScanError::Decode`].
    pub fn decode(&self, raw: &str) -> Result<DecodedCard> {
        let jws = CompactJws::parse(decode_numeric(raw)?)?;
        let card = inflate(&jws, self.config.max_payload_size)?;
        Ok(DecodedCard { jws, card })
    }

    /// Scans one raw code.
    ///
    /// Verification problems do not fail the scan; they show up as an
    /// `Invalid` status on the result.
    #[instrument(skip_all)]
    pub async fn scan(&self, raw: &str) -> Result<ScanResult> {
        let decoded = self.decode(raw)?;
        let credential = decoded.credential();

        let mut extraction = extract(credential.entries(), &self.labels);
        let verification = self.evaluator.evaluate(&decoded.jws, credential).await?;

        extraction.doses.sort_by_key(|dose| dose.date);

        tracing::debug!(
            iss = %credential.iss,
            status = %verification.status(),
            doses = extraction.doses.len(),
            "Scanned SMART health card"
        );

        Ok(ScanResult {
            verification,
            patient: extraction.patient,
            doses: extraction.doses,
            skipped: extraction.skipped,
        })
    }

    /// Scans every code in order and returns each outcome.
    pub async fn scan_each<S: AsRef<str>>(&self, codes: &[S]) -> Vec<Result<ScanResult>> {
        let mut outcomes = Vec::with_capacity(codes.len());
        for code in codes {
            outcomes.push(self.scan(code.as_ref()).await);
        }
        outcomes
    }

    /// Reduces a batch using the configured [`BatchPolicy`].
    pub async fn scan_batch<S: AsRef<str>>(&self, codes: &[S]) -> Result<ScanResult> {
        self.scan_batch_with(codes, self.config.batch_policy).await
    }

    /// Reduces a batch to one result.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NoCodes`] for an empty batch, otherwise the last
    /// error if no code succeeded.
    pub async fn scan_batch_with<S: AsRef<str>>(
        &self,
        codes: &[S],
        policy: BatchPolicy,
    ) -> Result<ScanResult> {
        let mut success = None;
        let mut last_error = ScanError::NoCodes;

        for (index, code) in codes.iter().enumerate() {
            match self.scan(code.as_ref()).await {
                Ok(result) => {
                    success = Some(result);
                    if policy == BatchPolicy::FirstSuccess {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(index, error = %e, "Code in batch failed");
                    last_error = e;
                }
            }
        }

        success.ok_or(last_error)
    }

    /// Like [`Scanner::scan_batch`], abandoning the batch when `token` is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Cancelled`] if the token fires first. No partial
    /// result is returned.
    pub async fn scan_batch_cancellable<S: AsRef<str>>(
        &self,
        codes: &[S],
        token: &CancellationToken,
    ) -> Result<ScanResult> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!("Scan batch cancelled");
                Err(ScanError::Cancelled)
            }
            result = self.scan_batch(codes) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::StaticKeySets;

    fn scanner(policy: BatchPolicy) -> Scanner {
        Scanner::new(
            Arc::new(TrustedIssuers::empty()),
            Arc::new(CodeLabels::builtin()),
            Arc::new(StaticKeySets::new()),
            ScannerConfig::new().with_batch_policy(policy),
        )
    }

    #[test]
    fn test_default_policy_is_last_success() {
        assert_eq!(BatchPolicy::default(), BatchPolicy::LastSuccess);
        assert_eq!(ScannerConfig::default().batch_policy, BatchPolicy::LastSuccess);
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: BatchPolicy = serde_json::from_str(r#""first_success""#).unwrap();
        assert_eq!(policy, BatchPolicy::FirstSuccess);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let codes: [&str; 0] = [];
        let err = scanner(BatchPolicy::LastSuccess)
            .scan_batch(&codes)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::NoCodes);
        assert_eq!(err.to_string(), "No QR codes");
    }

    #[tokio::test]
    async fn test_all_failures_report_last_error() {
        let err = scanner(BatchPolicy::LastSuccess)
            .scan_batch(&["", "not a card"])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "QR code does not look like a SMART health card"
        );
    }

    #[tokio::test]
    async fn test_scan_each_keeps_order() {
        let outcomes = scanner(BatchPolicy::LastSuccess)
            .scan_each(&["", "shc:/"])
            .await;
        let messages: Vec<_> = outcomes
            .into_iter()
            .map(|r| r.unwrap_err().to_string())
            .collect();
        assert_eq!(
            messages,
            vec!["QR code data is empty", "Missing SMART health card data"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let err = scanner(BatchPolicy::LastSuccess)
            .scan_batch_cancellable(&["shc:/56"], &token)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::Cancelled);
    }
}
