//! Payload inflation: compact JWS payload segment -> credential JSON.

use std::io::Read;

use flate2::read::DeflateDecoder;

use crate::credential::Credential;
use crate::error::{Result, ScanError};
use crate::jws::{CompactJws, decode_segment};

/// Default cap on the inflated payload size (1 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Compression marker SHC puts in the protected header.
const DEFLATE_ZIP: &str = "DEF";

/// The inflated payload together with its parsed form.
#[derive(Debug, Clone)]
pub struct InflatedCard {
    /// The decompressed JSON text, exactly as signed.
    pub json: String,
    /// The parsed credential.
    pub credential: Credential,
}

/// Base64-decodes and raw-inflates the payload segment.
///
/// # Errors
///
/// Returns [`ScanError::Decode`] if the payload segment is empty or not
/// base64, the data is not raw deflate, the output exceeds `max_size` bytes,
/// or a readable header declares a compression other than `DEF`.
///
/// An unreadable header is left to signature verification.
pub fn inflate_payload(jws: &CompactJws, max_size: usize) -> Result<Vec<u8>> {
    if let Ok(header) = jws.header()
        && let Some(zip) = header.zip.as_deref()
        && zip != DEFLATE_ZIP
    {
        return Err(ScanError::decode(format!("Unsupported payload compression: {zip}")));
    }

    if jws.payload_segment().is_empty() {
        return Err(ScanError::decode("SMART health card payload is empty"));
    }

    let compressed = decode_segment(jws.payload_segment())
        .map_err(|e| ScanError::decode(format!("Invalid payload encoding: {e}")))?;

    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(max_size as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| ScanError::decode(format!("Failed to decompress payload: {e}")))?;

    if inflated.len() > max_size {
        return Err(ScanError::decode(format!(
            "Decompressed payload exceeds maximum size of {max_size} bytes"
        )));
    }

    tracing::trace!(
        compressed = compressed.len(),
        inflated = inflated.len(),
        "Inflated SHC payload"
    );
    Ok(inflated)
}

/// Parses inflated payload bytes into a [`Credential`].
///
/// # Errors
///
/// Returns [`ScanError::Decode`] if the bytes are not UTF-8 JSON, lack `iss`,
/// `nbf` or `vc.credentialSubject.fhirBundle`, or carry an unusable `nbf`.
pub fn parse_credential(bytes: &[u8]) -> Result<Credential> {
    let credential: Credential = serde_json::from_slice(bytes)
        .map_err(|e| ScanError::decode(format!("Invalid SMART health card payload: {e}")))?;
    credential.issued_at()?;
    Ok(credential)
}

/// Inflates and parses the payload of a compact JWS.
pub fn inflate(jws: &CompactJws, max_size: usize) -> Result<InflatedCard> {
    let bytes = inflate_payload(jws, max_size)?;
    let credential = parse_credential(&bytes)?;
    let json = String::from_utf8(bytes)
        .map_err(|e| ScanError::decode(format!("Payload is not valid UTF-8: {e}")))?;
    Ok(InflatedCard { json, credential })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::DeflateEncoder;

    use super::*;
    use crate::jws::encode_segment;

    const HEADER: &str = r#"{"zip":"DEF","alg":"ES256","kid":"k1"}"#;

    fn deflate(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn jws_with_payload(header: &str, payload: &[u8]) -> CompactJws {
        CompactJws::parse(format!(
            "{}.{}.{}",
            encode_segment(header.as_bytes()),
            encode_segment(payload),
            encode_segment(b"sig")
        ))
        .unwrap()
    }

    const CARD: &str = r#"{"iss":"https://issuer.example.org","nbf":1620000000,"vc":{"type":["https://smarthealth.cards#health-card"],"credentialSubject":{"fhirVersion":"4.0.1","fhirBundle":{"resourceType":"Bundle","type":"collection","entry":[]}}}}"#;

    #[test]
    fn test_inflate_round_trip_is_byte_identical() {
        let jws = jws_with_payload(HEADER, &deflate(CARD.as_bytes()));
        let card = inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
        assert_eq!(card.json, CARD);
        assert_eq!(card.credential.iss, "https://issuer.example.org");
        assert!(card.credential.entries().is_empty());
    }

    #[test]
    fn test_inflate_standard_alphabet_payload() {
        use base64::Engine;
        let payload = base64::engine::general_purpose::STANDARD.encode(deflate(CARD.as_bytes()));
        let jws = CompactJws::parse(format!(
            "{}.{}.c2ln",
            encode_segment(HEADER.as_bytes()),
            payload
        ))
        .unwrap();
        assert_eq!(inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap().json, CARD);
    }

    #[test]
    fn test_invalid_base64() {
        let jws = CompactJws::parse(format!("{}.***.c2ln", encode_segment(HEADER.as_bytes())))
            .unwrap();
        let err = inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert!(matches!(err, ScanError::Decode { .. }));
    }

    #[test]
    fn test_not_deflate() {
        // Zlib-wrapped data is not raw deflate.
        let jws = jws_with_payload(HEADER, &[0x78, 0x9c, 0xff, 0xff, 0xff, 0xff]);
        let err = inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert!(matches!(err, ScanError::Decode { .. }));
    }

    #[test]
    fn test_not_json() {
        let jws = jws_with_payload(HEADER, &deflate(b"hello"));
        let err = inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert!(err.to_string().starts_with("Invalid SMART health card payload"));
    }

    #[test]
    fn test_missing_required_fields() {
        for json in [
            r#"{"nbf":1,"vc":{"credentialSubject":{"fhirBundle":{}}}}"#,
            r#"{"iss":"x","vc":{"credentialSubject":{"fhirBundle":{}}}}"#,
            r#"{"iss":"x","nbf":1,"vc":{"credentialSubject":{}}}"#,
            r#"{"iss":"x","nbf":1}"#,
        ] {
            let jws = jws_with_payload(HEADER, &deflate(json.as_bytes()));
            let err = inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
            assert!(matches!(err, ScanError::Decode { .. }), "{json}");
        }
    }

    #[test]
    fn test_payload_size_limit() {
        let jws = jws_with_payload(HEADER, &deflate(CARD.as_bytes()));
        let err = inflate(&jws, 16).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum size of 16 bytes"));
    }

    #[test]
    fn test_empty_payload() {
        let jws = CompactJws::parse(format!("{}..c2ln", encode_segment(HEADER.as_bytes())))
            .unwrap();
        let err = inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert_eq!(err, ScanError::decode("SMART health card payload is empty"));
    }

    #[test]
    fn test_unreadable_header_still_inflates() {
        let jws = jws_with_payload("not json", &deflate(CARD.as_bytes()));
        let card = inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
        assert_eq!(card.json, CARD);
    }

    #[test]
    fn test_unsupported_zip() {
        let jws = jws_with_payload(r#"{"zip":"GZ","alg":"ES256"}"#, &deflate(CARD.as_bytes()));
        let err = inflate(&jws, DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported payload compression: GZ");
    }
}
