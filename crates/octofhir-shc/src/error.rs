//! Error types for SMART Health Card scanning.
//!
//! Errors fall into three groups:
//!
//! - [`ScanError`] aborts processing of a single raw code (or a whole batch).
//! - [`PayloadError`] describes one bundle resource that could not be
//!   extracted. It never aborts a scan; it is reported on the result.
//! - [`TrustError`] describes why a signature could not be checked. It never
//!   aborts a scan either; it downgrades the verification status to Invalid.

use serde::Serialize;

/// Errors that abort processing of a raw code or a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// The raw input is not a well-formed SHC numeric code or compact JWS.
    #[error("{message}")]
    Format {
        /// Human-readable description.
        message: String,
    },

    /// The payload could not be base64-decoded, inflated or parsed.
    #[error("{message}")]
    Decode {
        /// Human-readable description.
        message: String,
    },

    /// The batch contained no codes at all.
    #[error("No QR codes")]
    NoCodes,

    /// The caller abandoned the batch before it completed.
    #[error("Scan cancelled")]
    Cancelled,
}

impl ScanError {
    /// Create a new Format error
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a new Decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by the scanned input itself.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Format { .. } | Self::Decode { .. })
    }
}

/// A bundle resource that was skipped during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{resource_type} at entry {index}: {message}")]
pub struct PayloadError {
    /// Position of the entry in `fhirBundle.entry`.
    pub index: usize,
    /// The `resourceType` of the skipped resource.
    pub resource_type: String,
    /// Why the resource was skipped.
    pub message: String,
}

impl PayloadError {
    pub fn new(index: usize, resource_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index,
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }
}

/// Reasons a signature check could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    /// The issuer identifier does not form a valid key-set URL.
    #[error("Invalid issuer URL: {0}")]
    InvalidIssuerUrl(String),

    /// The key-set URL scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// A network error occurred while fetching the key set.
    #[error("Network error: {0}")]
    Network(String),

    /// The key-set request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// The key-set fetch did not complete in time.
    #[error("Key set fetch timed out after {0} ms")]
    Timeout(u128),

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },

    /// The key-set document could not be parsed.
    #[error("Failed to parse JWKS: {0}")]
    KeySetParse(String),

    /// The key set contains no keys.
    #[error("No keys found in JWKS")]
    NoKeys,

    /// The selected key could not be imported as a P-256 verifying key.
    #[error("Invalid key: {0}")]
    KeyImport(String),

    /// The protected header could not be decoded.
    #[error("Malformed JWS header: {0}")]
    MalformedHeader(String),

    /// The protected header names an algorithm other than ES256.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature segment is not a valid ES256 signature encoding.
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
}

impl Serialize for TrustError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Type alias for scan results.
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_display_is_bare_message() {
        assert_eq!(
            ScanError::format("QR code data is empty").to_string(),
            "QR code data is empty"
        );
        assert_eq!(
            ScanError::decode("Invalid payload").to_string(),
            "Invalid payload"
        );
        assert_eq!(ScanError::NoCodes.to_string(), "No QR codes");
    }

    #[test]
    fn test_is_input_error() {
        assert!(ScanError::format("x").is_input_error());
        assert!(ScanError::decode("x").is_input_error());
        assert!(!ScanError::NoCodes.is_input_error());
        assert!(!ScanError::Cancelled.is_input_error());
    }

    #[test]
    fn test_payload_error_display() {
        let err = PayloadError::new(3, "Immunization", "missing occurrenceDateTime");
        assert_eq!(
            err.to_string(),
            "Immunization at entry 3: missing occurrenceDateTime"
        );
    }

    #[test]
    fn test_trust_error_display() {
        assert_eq!(
            TrustError::HttpStatus(404).to_string(),
            "HTTP error: status 404"
        );
        assert_eq!(
            TrustError::InvalidScheme.to_string(),
            "Invalid URL scheme: only HTTPS is allowed"
        );
        assert_eq!(
            TrustError::ResponseTooLarge { max_size: 1024 }.to_string(),
            "Response exceeds maximum size of 1024 bytes"
        );
        assert_eq!(TrustError::Timeout(250).to_string(), "Key set fetch timed out after 250 ms");
    }
}
