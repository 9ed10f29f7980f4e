//! Compact JWS handling.
//!
//! SMART Health Cards are compact JWS objects: `header.payload.signature`,
//! each segment base64url. The payload is raw-deflated JSON, so it cannot be
//! handed to a general JWT library; this module exposes the pieces the
//! inflator and the trust evaluator need.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{Result, ScanError};

/// The only signing algorithm SMART Health Cards use.
pub const ES256: &str = "ES256";

/// A compact JWS split into its three segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactJws {
    raw: String,
    payload_start: usize,
    signature_start: usize,
}

/// The JWS protected header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JwsHeader {
    /// Signing algorithm, `ES256` for SHC.
    #[serde(default)]
    pub alg: Option<String>,
    /// Key ID (base64url SHA-256 JWK thumbprint for SHC).
    #[serde(default)]
    pub kid: Option<String>,
    /// Payload compression, `DEF` for SHC.
    #[serde(default)]
    pub zip: Option<String>,
}

impl CompactJws {
    /// Splits a compact JWS string.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Format`] unless there are exactly three
    /// dot-separated segments. Segment contents are not inspected here.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let dots: Vec<usize> = raw.match_indices('.').map(|(i, _)| i).collect();

        let &[first, second] = dots.as_slice() else {
            return Err(ScanError::format(format!(
                "SMART health card must have 3 segments, found {}",
                dots.len() + 1
            )));
        };

        Ok(Self {
            raw,
            payload_start: first + 1,
            signature_start: second + 1,
        })
    }

    /// The full compact serialization.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The base64url header segment.
    pub fn header_segment(&self) -> &str {
        &self.raw[..self.payload_start - 1]
    }

    /// The base64url payload segment.
    pub fn payload_segment(&self) -> &str {
        &self.raw[self.payload_start..self.signature_start - 1]
    }

    /// The base64url signature segment.
    pub fn signature_segment(&self) -> &str {
        &self.raw[self.signature_start..]
    }

    /// The bytes covered by the signature: `header.payload`.
    pub fn signing_input(&self) -> &[u8] {
        self.raw[..self.signature_start - 1].as_bytes()
    }

    /// Decodes the protected header.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Decode`] if the header is not base64 JSON.
    pub fn header(&self) -> Result<JwsHeader> {
        let bytes = decode_segment(self.header_segment())
            .map_err(|e| ScanError::decode(format!("Invalid JWS header encoding: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ScanError::decode(format!("Invalid JWS header: {e}")))
    }

    /// Decodes the raw signature bytes.
    pub fn signature_bytes(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        decode_segment(self.signature_segment())
    }
}

impl std::fmt::Display for CompactJws {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Decodes a base64 segment, accepting either alphabet and optional padding.
pub fn decode_segment(segment: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = segment
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    URL_SAFE_NO_PAD.decode(normalized)
}

/// Encodes bytes as an unpadded base64url segment.
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jws(header: &str, payload: &[u8], signature: &[u8]) -> String {
        format!(
            "{}.{}.{}",
            encode_segment(header.as_bytes()),
            encode_segment(payload),
            encode_segment(signature)
        )
    }

    #[test]
    fn test_parse_segments() {
        let parsed = CompactJws::parse("aGVhZA.cGF5bG9hZA.c2ln").unwrap();
        assert_eq!(parsed.header_segment(), "aGVhZA");
        assert_eq!(parsed.payload_segment(), "cGF5bG9hZA");
        assert_eq!(parsed.signature_segment(), "c2ln");
        assert_eq!(parsed.signing_input(), b"aGVhZA.cGF5bG9hZA");
        assert_eq!(parsed.to_string(), "aGVhZA.cGF5bG9hZA.c2ln");
    }

    #[test]
    fn test_parse_wrong_segment_count() {
        for raw in ["", "abc", "a.b", "a.b.c.d"] {
            let err = CompactJws::parse(raw).unwrap_err();
            assert!(matches!(err, ScanError::Format { .. }), "{raw}");
        }
    }

    #[test]
    fn test_empty_payload_is_structurally_valid() {
        let parsed = CompactJws::parse("a..c").unwrap();
        assert_eq!(parsed.payload_segment(), "");
    }

    #[test]
    fn test_empty_signature_is_structurally_valid() {
        let parsed = CompactJws::parse("a.b.").unwrap();
        assert_eq!(parsed.signature_segment(), "");
    }

    #[test]
    fn test_header_decoding() {
        let raw = jws(r#"{"zip":"DEF","alg":"ES256","kid":"k1"}"#, b"p", b"s");
        let header = CompactJws::parse(raw).unwrap().header().unwrap();
        assert_eq!(header.alg.as_deref(), Some(ES256));
        assert_eq!(header.kid.as_deref(), Some("k1"));
        assert_eq!(header.zip.as_deref(), Some("DEF"));
    }

    #[test]
    fn test_header_not_json() {
        let raw = jws("not json", b"p", b"s");
        let err = CompactJws::parse(raw).unwrap().header().unwrap_err();
        assert!(matches!(err, ScanError::Decode { .. }));
    }

    #[test]
    fn test_decode_segment_accepts_both_alphabets() {
        let bytes = [0xfb, 0xff, 0xbf];
        assert_eq!(decode_segment("-_-_").unwrap(), bytes);
        assert_eq!(decode_segment("+/+/").unwrap(), bytes);
        assert_eq!(decode_segment("aGk=").unwrap(), b"hi");
        assert_eq!(decode_segment("aGk").unwrap(), b"hi");
        assert!(decode_segment("a*b").is_err());
    }
}
