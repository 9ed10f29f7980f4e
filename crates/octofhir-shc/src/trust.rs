//! Issuer trust and signature evaluation.
//!
//! The verification status is derived from two independent facts:
//!
//! | signature          | issuer trusted | status     |
//! |--------------------|----------------|------------|
//! | valid              | yes            | Verified   |
//! | valid              | no             | Unverified |
//! | invalid            | -              | Invalid    |
//! | could not be checked | -            | Invalid    |
//!
//! "Could not be checked" covers every fetch, key import and decoding
//! failure. It is kept as a distinct [`SignatureCheck::Unavailable`] case so
//! callers can tell it apart from a signature that was checked and rejected.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use serde::Serialize;
use time::OffsetDateTime;

use crate::credential::Credential;
use crate::error::{Result, TrustError};
use crate::jws::{CompactJws, ES256, decode_segment};
use crate::jwks::{KeySetSource, jwks_uri};
use crate::registry::TrustedIssuers;

/// Default upper bound on the key-set fetch (10 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Trust classification of a scanned card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// The signature is missing, wrong, or could not be checked.
    Invalid,
    /// The signature is valid but the issuer is not in the trusted directory.
    Unverified,
    /// The signature is valid and the issuer is trusted.
    Verified,
}

impl VerificationStatus {
    /// Applies the decision table.
    pub fn decide(check: &SignatureCheck, issuer_trusted: bool) -> Self {
        match (check, issuer_trusted) {
            (SignatureCheck::Valid, true) => Self::Verified,
            (SignatureCheck::Valid, false) => Self::Unverified,
            (SignatureCheck::Invalid | SignatureCheck::Unavailable(_), _) => Self::Invalid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Unverified => "unverified",
            Self::Verified => "verified",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the signature check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum SignatureCheck {
    /// The signature verified against the issuer key.
    Valid,
    /// The signature was checked and does not match.
    Invalid,
    /// The signature could not be checked.
    Unavailable(TrustError),
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Verification outcome for one credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    issuer: String,
    #[serde(with = "time::serde::rfc3339")]
    issued_at: OffsetDateTime,
    status: VerificationStatus,
    signature: SignatureCheck,
}

impl VerificationResult {
    /// Builds a result; the status is always derived from its inputs.
    pub fn new(
        issuer: impl Into<String>,
        issued_at: OffsetDateTime,
        signature: SignatureCheck,
        issuer_trusted: bool,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            issued_at,
            status: VerificationStatus::decide(&signature, issuer_trusted),
            signature,
        }
    }

    /// Registry display name when trusted, else the raw issuer identifier.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn issued_at(&self) -> OffsetDateTime {
        self.issued_at
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn signature(&self) -> &SignatureCheck {
        &self.signature
    }
}

/// Resolves issuer keys, checks signatures and classifies trust.
#[derive(Clone)]
pub struct TrustEvaluator {
    issuers: Arc<TrustedIssuers>,
    key_sets: Arc<dyn KeySetSource>,
    fetch_timeout: Duration,
}

impl TrustEvaluator {
    pub fn new(issuers: Arc<TrustedIssuers>, key_sets: Arc<dyn KeySetSource>) -> Self {
        Self {
            issuers,
            key_sets,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Sets the upper bound on the key-set fetch.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn issuers(&self) -> &TrustedIssuers {
        &self.issuers
    }

    /// Evaluates a credential and the compact JWS it was read from.
    ///
    /// Verification problems never fail this call; they yield
    /// [`VerificationStatus::Invalid`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::ScanError::Decode`] only if `nbf` is unusable.
    pub async fn evaluate(
        &self,
        jws: &CompactJws,
        credential: &Credential,
    ) -> Result<VerificationResult> {
        let issued_at = credential.issued_at()?;
        let trusted = self.issuers.get(&credential.iss);
        let signature = self.check_signature(jws, &credential.iss).await;

        let issuer = trusted.map_or(credential.iss.as_str(), |t| t.name.as_str());
        let result = VerificationResult::new(issuer, issued_at, signature, trusted.is_some());

        tracing::debug!(
            iss = %credential.iss,
            trusted = trusted.is_some(),
            status = %result.status(),
            "Evaluated SMART health card trust"
        );
        Ok(result)
    }

    /// Checks the JWS signature against the issuer's published key.
    pub async fn check_signature(&self, jws: &CompactJws, iss: &str) -> SignatureCheck {
        match self.try_check_signature(jws, iss).await {
            Ok(true) => SignatureCheck::Valid,
            Ok(false) => {
                tracing::warn!(iss, "SMART health card signature does not verify");
                SignatureCheck::Invalid
            }
            Err(e) => {
                tracing::warn!(iss, error = %e, "Could not verify SMART health card signature");
                SignatureCheck::Unavailable(e)
            }
        }
    }

    async fn try_check_signature(
        &self,
        jws: &CompactJws,
        iss: &str,
    ) -> std::result::Result<bool, TrustError> {
        let header = jws
            .header()
            .map_err(|e| TrustError::MalformedHeader(e.to_string()))?;
        match header.alg.as_deref() {
            Some(ES256) => {}
            Some(other) => return Err(TrustError::UnsupportedAlgorithm(other.to_string())),
            None => return Err(TrustError::UnsupportedAlgorithm("none".to_string())),
        }

        let uri = jwks_uri(iss)?;
        let jwks = tokio::time::timeout(self.fetch_timeout, self.key_sets.key_set(&uri))
            .await
            .map_err(|_| TrustError::Timeout(self.fetch_timeout.as_millis()))??;

        let jwk = select_key(&jwks, header.kid.as_deref())?;
        verify_es256(jws, jwk)
    }
}

/// Picks the key whose `kid` matches the header, falling back to the first key.
pub fn select_key<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> std::result::Result<&'a Jwk, TrustError> {
    kid.and_then(|kid| {
        jwks.keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
    })
    .or_else(|| jwks.keys.first())
    .ok_or(TrustError::NoKeys)
}

/// Imports a JWK as a P-256 verifying key.
pub fn import_p256_key(jwk: &Jwk) -> std::result::Result<VerifyingKey, TrustError> {
    if let Some(alg) = &jwk.common.key_algorithm
        && !matches!(alg, KeyAlgorithm::ES256)
    {
        return Err(TrustError::KeyImport(format!("key algorithm {alg:?} is not ES256")));
    }

    let AlgorithmParameters::EllipticCurve(params) = &jwk.algorithm else {
        return Err(TrustError::KeyImport("expected an EC key".to_string()));
    };
    if !matches!(params.curve, EllipticCurve::P256) {
        return Err(TrustError::KeyImport(format!(
            "expected curve P-256, found {:?}",
            params.curve
        )));
    }

    let x = decode_coordinate(&params.x, "x")?;
    let y = decode_coordinate(&params.y, "y")?;
    let point = EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(&x),
        FieldBytes::from_slice(&y),
        false,
    );

    VerifyingKey::from_encoded_point(&point)
        .map_err(|e| TrustError::KeyImport(format!("point is not on P-256: {e}")))
}

fn decode_coordinate(value: &str, name: &str) -> std::result::Result<Vec<u8>, TrustError> {
    let bytes = decode_segment(value)
        .map_err(|e| TrustError::KeyImport(format!("invalid {name} coordinate: {e}")))?;
    if bytes.len() != 32 {
        return Err(TrustError::KeyImport(format!(
            "{name} coordinate must be 32 bytes, found {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Verifies an ES256 compact JWS signature with the given JWK.
///
/// Returns `Ok(false)` when the signature is well-formed but does not match.
pub fn verify_es256(jws: &CompactJws, jwk: &Jwk) -> std::result::Result<bool, TrustError> {
    let key = import_p256_key(jwk)?;

    let signature_bytes = jws
        .signature_bytes()
        .map_err(|e| TrustError::MalformedSignature(e.to_string()))?;
    let signature = Signature::from_slice(&signature_bytes).map_err(|_| {
        TrustError::MalformedSignature(format!(
            "expected 64 byte r||s signature, found {} bytes",
            signature_bytes.len()
        ))
    })?;

    Ok(key.verify(jws.signing_input(), &signature).is_ok())
}
