//! Read-only lookup data supplied by the embedding application.
//!
//! - [`TrustedIssuers`] - the trusted-issuer directory (VCI format)
//! - [`CodeLabels`] - CVX / MVX code to display label tables
//!
//! Both are immutable once built and are shared behind `Arc` by the scanner.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading registry data.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to parse registry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single trusted issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedIssuer {
    /// Issuer identifier, matched exactly against the credential `iss`.
    pub iss: String,
    /// Friendly name shown instead of the identifier.
    pub name: String,
}

#[derive(Deserialize)]
struct IssuerDirectory {
    participating_issuers: Vec<TrustedIssuer>,
}

/// Trusted-issuer directory keyed by exact issuer identifier.
#[derive(Debug, Clone, Default)]
pub struct TrustedIssuers {
    issuers: Vec<TrustedIssuer>,
    by_iss: HashMap<String, usize>,
}

impl TrustedIssuers {
    /// Builds a directory from issuer entries, preserving their order.
    ///
    /// When an identifier repeats, lookups resolve to its first entry.
    pub fn new(issuers: Vec<TrustedIssuer>) -> Self {
        let mut by_iss = HashMap::with_capacity(issuers.len());
        for (i, issuer) in issuers.iter().enumerate() {
            if let Entry::Vacant(slot) = by_iss.entry(issuer.iss.clone()) {
                slot.insert(i);
            } else {
                tracing::warn!(
                    iss = %issuer.iss,
                    name = %issuer.name,
                    "Ignoring repeated trusted issuer"
                );
            }
        }
        Self { issuers, by_iss }
    }

    /// An empty directory: every issuer is untrusted.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the VCI directory document
    /// `{"participating_issuers": [{"iss": "...", "name": "..."}]}`.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let directory: IssuerDirectory = serde_json::from_str(json)?;
        Ok(Self::new(directory.participating_issuers))
    }

    /// Looks up an issuer by exact identifier.
    pub fn get(&self, iss: &str) -> Option<&TrustedIssuer> {
        self.by_iss.get(iss).map(|&i| &self.issuers[i])
    }

    pub fn is_trusted(&self, iss: &str) -> bool {
        self.by_iss.contains_key(iss)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustedIssuer> {
        self.issuers.iter()
    }

    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}

/// CVX and MVX label tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLabels {
    /// CVX vaccine code -> vaccine trade name.
    #[serde(default)]
    pub cvx: HashMap<String, String>,
    /// MVX manufacturer code -> manufacturer name.
    #[serde(default)]
    pub mvx: HashMap<String, String>,
}

impl CodeLabels {
    /// Parses `{"cvx": {...}, "mvx": {...}}`.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Labels for the COVID-19 vaccines most commonly found on health cards.
    pub fn builtin() -> Self {
        let cvx = [
            ("207", "Moderna"),
            ("208", "Pfizer"),
            ("210", "AstraZeneca"),
            ("211", "Novavax"),
            ("212", "Johnson & Johnson"),
            ("213", "COVID-19 vaccine, unspecified"),
            ("217", "Pfizer"),
            ("218", "Pfizer (pediatric)"),
            ("219", "Pfizer (pediatric)"),
            ("221", "Moderna"),
            ("228", "Moderna (pediatric)"),
            ("229", "Moderna Bivalent"),
            ("300", "Pfizer Bivalent"),
            ("510", "Sinopharm"),
            ("511", "Sinovac"),
        ];
        let mvx = [
            ("ASZ", "AstraZeneca"),
            ("JSN", "Janssen"),
            ("MOD", "Moderna US, Inc."),
            ("NVX", "Novavax, Inc."),
            ("PFR", "Pfizer, Inc"),
            ("SNV", "Sinovac"),
        ];

        Self {
            cvx: cvx
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            mvx: mvx
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn vaccine_label(&self, cvx: &str) -> Option<&str> {
        self.cvx.get(cvx).map(String::as_str)
    }

    pub fn manufacturer_label(&self, mvx: &str) -> Option<&str> {
        self.mvx.get(mvx).map(String::as_str)
    }
}
