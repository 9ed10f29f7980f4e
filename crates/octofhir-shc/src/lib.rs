//! SMART Health Card scanning for OctoFHIR.
//!
//! Decodes the numeric `shc:/` QR payload of a SMART Health Card, verifies
//! its ES256 signature against the issuer's published key set, classifies
//! the issuer against a trusted-issuer directory and extracts the patient and
//! immunization records from the embedded FHIR bundle.
//!
//! # Pipeline
//!
//! ```text
//! raw code -> numeric -> jws -> inflate -> credential
//!                                   |-> trust   (key set fetch, signature)
//!                                   |-> extract (Patient, Immunization)
//!                                   `-> ScanResult
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use octofhir_shc::{CodeLabels, JwksCache, Scanner, ScannerConfig, TrustedIssuers};
//!
//! # async fn run(raw: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = Scanner::new(
//!     Arc::new(TrustedIssuers::empty()),
//!     Arc::new(CodeLabels::builtin()),
//!     Arc::new(JwksCache::with_defaults()?),
//!     ScannerConfig::default(),
//! );
//! let result = scanner.scan(raw).await?;
//! println!("{}: {}", result.verification.issuer(), result.verification.status());
//! # Ok(())
//! # }
//! ```

pub mod credential;
pub mod date;
pub mod error;
pub mod extract;
pub mod inflate;
pub mod jwks;
pub mod jws;
pub mod numeric;
pub mod registry;
pub mod scan;
pub mod trust;

pub use credential::{BundleEntry, Credential, FhirBundle};
pub use error::{PayloadError, Result, ScanError, TrustError};
pub use extract::{Dose, Extraction, IdentityAssuranceLevel, Patient};
pub use inflate::InflatedCard;
pub use jwks::{JwksCache, KeySetCacheConfig, KeySetSource, StaticKeySets};
pub use jws::CompactJws;
pub use numeric::{decode_numeric, encode_numeric};
pub use registry::{CodeLabels, RegistryError, TrustedIssuer, TrustedIssuers};
pub use scan::{BatchPolicy, DecodedCard, ScanResult, Scanner, ScannerConfig};
pub use trust::{SignatureCheck, TrustEvaluator, VerificationResult, VerificationStatus};
