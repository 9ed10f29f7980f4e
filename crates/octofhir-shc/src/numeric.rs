//! SHC numeric QR encoding.
//!
//! A SMART Health Card QR code carries `shc:/` followed by pairs of decimal
//! digits. Each pair is a character of the compact JWS minus 45, so `-`
//! (45) encodes as `00` and `z` (122) as `77`.

use crate::error::{Result, ScanError};

/// Scheme prefix of every SMART Health Card QR payload.
pub const SHC_PREFIX: &str = "shc:/";

const CHAR_OFFSET: u8 = 45;
const MAX_PAIR_VALUE: u8 = b'z' - CHAR_OFFSET;

/// Decodes a raw QR string into the compact JWS it encodes.
///
/// # Errors
///
/// Returns [`ScanError::Format`] if the input is empty, lacks the `shc:/`
/// prefix, carries no digits, has an odd digit count, or contains a group
/// that is not a pair of digits in `00..=77`.
pub fn decode_numeric(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(ScanError::format("QR code data is empty"));
    }

    let digits = raw
        .strip_prefix(SHC_PREFIX)
        .ok_or_else(|| ScanError::format("QR code does not look like a SMART health card"))?;

    if digits.is_empty() {
        return Err(ScanError::format("Missing SMART health card data"));
    }

    if digits.len() % 2 != 0 {
        return Err(ScanError::format(format!(
            "SMART health card data has an odd number of digits ({})",
            digits.len()
        )));
    }

    digits
        .as_bytes()
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| decode_pair(pair).ok_or_else(|| malformed_pair(i, pair)))
        .collect()
}

/// Encodes a compact JWS as an SHC numeric QR string (with prefix).
///
/// # Errors
///
/// Returns [`ScanError::Format`] if the input contains a character outside
/// the `-`..=`z` range the numeric mode can represent.
pub fn encode_numeric(jws: &str) -> Result<String> {
    let mut out = String::with_capacity(SHC_PREFIX.len() + jws.len() * 2);
    out.push_str(SHC_PREFIX);

    for (i, c) in jws.chars().enumerate() {
        let value = u32::from(c)
            .checked_sub(u32::from(CHAR_OFFSET))
            .filter(|v| *v <= u32::from(MAX_PAIR_VALUE))
            .ok_or_else(|| {
                ScanError::format(format!("Character {c:?} at position {i} cannot be encoded"))
            })?;
        out.push_str(&format!("{value:02}"));
    }

    Ok(out)
}

fn decode_pair(pair: &[u8]) -> Option<char> {
    let [hi, lo] = pair else { return None };
    if !hi.is_ascii_digit() || !lo.is_ascii_digit() {
        return None;
    }
    let value = (hi - b'0') * 10 + (lo - b'0');
    (value <= MAX_PAIR_VALUE).then(|| char::from(value + CHAR_OFFSET))
}

fn malformed_pair(index: usize, pair: &[u8]) -> ScanError {
    ScanError::format(format!(
        "Malformed SMART health card data at position {}: {:?}",
        index * 2,
        String::from_utf8_lossy(pair)
    ))
}
