//! Strict CBOR decode layer.
//!
//! Attestation objects and the structures embedded in authenticator data
//! use the CTAP2 restricted CBOR profile: definite lengths only, minimal
//! length arguments, no tags, no `undefined`. `ciborium` builds the value
//! tree but does not report how many bytes one item occupies and accepts
//! encodings the profile forbids, so a header scan runs first: it computes
//! the exact encoded length of the leading item and rejects profile
//! violations. Map key ordering is not enforced here; consumers that care
//! about byte-for-byte round-trips re-encode the order-preserving tree.

use ciborium::value::{Integer, Value};

use crate::errors::VerificationError;

/// Nesting bound for the scanner; crafted deep arrays fail fast instead
/// of exhausting the stack.
const MAX_NESTING_DEPTH: u32 = 64;

/// Decode the first CBOR item in `bytes`, returning the value and the
/// number of bytes it occupied.
pub(crate) fn decode_first(bytes: &[u8]) -> Result<(Value, usize), VerificationError> {
    let len = item_length(bytes, 0)?;
    let value: Value = ciborium::de::from_reader(&bytes[..len])
        .map_err(|e| VerificationError::CborDecode(e.to_string()))?;
    Ok((value, len))
}

/// Decode a buffer that must contain exactly one CBOR item.
pub(crate) fn decode(bytes: &[u8]) -> Result<Value, VerificationError> {
    let (value, consumed) = decode_first(bytes)?;
    if consumed != bytes.len() {
        return Err(VerificationError::CborLeftoverBytes);
    }
    Ok(value)
}

/// Canonical re-encode of a decoded tree. Order-preserving, so values
/// decoded from canonical input round-trip byte-for-byte.
pub(crate) fn encode(value: &Value) -> Result<Vec<u8>, VerificationError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| VerificationError::CborDecode(e.to_string()))?;
    Ok(out)
}

/// Narrow a CBOR integer to i64 (COSE labels and algorithm identifiers
/// all fit).
pub(crate) fn integer_to_i64(i: &Integer) -> Option<i64> {
    i64::try_from(i128::from(*i)).ok()
}

/// Total encoded length of the item starting at `bytes[0]`, validating
/// the restricted profile along the way.
fn item_length(bytes: &[u8], depth: u32) -> Result<usize, VerificationError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(VerificationError::CborDepthExceeded);
    }
    let initial = *bytes.first().ok_or(VerificationError::CborTruncated)?;
    let major = initial >> 5;
    let additional = initial & 0x1F;

    // Major type 7 carries simple values and floats in the additional
    // bits; 24 (one-byte simple) and break are outside the profile.
    if major == 7 {
        return match additional {
            20 | 21 | 22 => Ok(1),
            25 => ensure_present(bytes, 3),
            26 => ensure_present(bytes, 5),
            27 => ensure_present(bytes, 9),
            _ => Err(VerificationError::CborDecode(format!(
                "unsupported simple value or float encoding {additional}"
            ))),
        };
    }

    let (argument, header_len) = read_argument(bytes, additional)?;

    match major {
        0 | 1 => Ok(header_len),
        2 | 3 => {
            let len = usize::try_from(argument).map_err(|_| VerificationError::CborTruncated)?;
            let total = header_len
                .checked_add(len)
                .ok_or(VerificationError::CborTruncated)?;
            ensure_present(bytes, total)
        }
        4 => nested_items(bytes, header_len, argument, 1, depth),
        5 => nested_items(bytes, header_len, argument, 2, depth),
        6 => Err(VerificationError::CborDecode(
            "tagged values are not allowed".to_string(),
        )),
        _ => unreachable!("major type is three bits"),
    }
}

/// Read the length argument for `additional`, enforcing minimal encoding.
fn read_argument(bytes: &[u8], additional: u8) -> Result<(u64, usize), VerificationError> {
    match additional {
        0..=23 => Ok((additional as u64, 1)),
        24 => {
            let arg = *bytes.get(1).ok_or(VerificationError::CborTruncated)? as u64;
            if arg < 24 {
                return Err(VerificationError::CborNonCanonical);
            }
            Ok((arg, 2))
        }
        25 => {
            let raw = bytes.get(1..3).ok_or(VerificationError::CborTruncated)?;
            let arg = u16::from_be_bytes([raw[0], raw[1]]) as u64;
            if arg <= u8::MAX as u64 {
                return Err(VerificationError::CborNonCanonical);
            }
            Ok((arg, 3))
        }
        26 => {
            let raw = bytes.get(1..5).ok_or(VerificationError::CborTruncated)?;
            let arg = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64;
            if arg <= u16::MAX as u64 {
                return Err(VerificationError::CborNonCanonical);
            }
            Ok((arg, 5))
        }
        27 => {
            let raw = bytes.get(1..9).ok_or(VerificationError::CborTruncated)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            let arg = u64::from_be_bytes(buf);
            if arg <= u32::MAX as u64 {
                return Err(VerificationError::CborNonCanonical);
            }
            Ok((arg, 9))
        }
        28..=30 => Err(VerificationError::CborDecode(format!(
            "reserved additional information {additional}"
        ))),
        31 => Err(VerificationError::CborIndefiniteLength),
        _ => unreachable!("additional information is five bits"),
    }
}

/// Length of an array/map: header plus `count * per_entry` nested items.
fn nested_items(
    bytes: &[u8],
    header_len: usize,
    count: u64,
    per_entry: u64,
    depth: u32,
) -> Result<usize, VerificationError> {
    let items = count
        .checked_mul(per_entry)
        .ok_or(VerificationError::CborTruncated)?;
    let mut offset = header_len;
    for _ in 0..items {
        let rest = bytes.get(offset..).ok_or(VerificationError::CborTruncated)?;
        let item = item_length(rest, depth + 1)?;
        offset = offset
            .checked_add(item)
            .ok_or(VerificationError::CborTruncated)?;
    }
    ensure_present(bytes, offset)
}

fn ensure_present(bytes: &[u8], total: usize) -> Result<usize, VerificationError> {
    if bytes.len() < total {
        return Err(VerificationError::CborTruncated);
    }
    Ok(total)
}
