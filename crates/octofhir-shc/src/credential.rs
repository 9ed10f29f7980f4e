//! The decompressed SMART Health Card payload.
//!
//! Only the fields the pipeline relies on are typed. Bundle resources stay as
//! raw JSON so that one malformed resource can be skipped without rejecting
//! the whole card.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{Result, ScanError};

/// A SMART Health Card JWT payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Issuer identifier; the key set lives under `{iss}/.well-known/jwks.json`.
    pub iss: String,
    /// Issuance time in seconds since the Unix epoch (may be fractional).
    pub nbf: f64,
    /// The verifiable credential claim.
    pub vc: VerifiableCredential,
}

/// The `vc` claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiableCredential {
    /// Credential type URIs, e.g. `https://smarthealth.cards#health-card`.
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(rename = "credentialSubject")]
    pub credential_subject: CredentialSubject,
}

/// The `vc.credentialSubject` claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSubject {
    #[serde(rename = "fhirVersion", default, skip_serializing_if = "Option::is_none")]
    pub fhir_version: Option<String>,
    #[serde(rename = "fhirBundle")]
    pub fhir_bundle: FhirBundle,
}

/// The embedded FHIR `Bundle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FhirBundle {
    #[serde(rename = "resourceType", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<String>,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

/// A single `Bundle.entry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl", default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
}

impl BundleEntry {
    /// The entry's `resource.resourceType`, if any.
    pub fn resource_type(&self) -> Option<&str> {
        self.resource.as_ref()?.get("resourceType")?.as_str()
    }
}

impl Credential {
    /// The issuance instant (`nbf`) in UTC.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Decode`] if `nbf` is not a finite, representable
    /// timestamp.
    pub fn issued_at(&self) -> Result<OffsetDateTime> {
        if !self.nbf.is_finite() {
            return Err(ScanError::decode(format!("Invalid nbf: {}", self.nbf)));
        }
        let nanos = (self.nbf * 1_000_000_000.0).round() as i128;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|e| ScanError::decode(format!("Invalid nbf {}: {e}", self.nbf)))
    }

    /// The bundle entries in document order.
    pub fn entries(&self) -> &[BundleEntry] {
        &self.vc.credential_subject.fhir_bundle.entry
    }
}
