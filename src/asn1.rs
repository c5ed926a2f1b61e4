//! Minimal ASN.1/DER element decoder.
//!
//! Not a general certificate parser (x509-parser does that); this walks
//! statically-known paths inside extension OCTET STRINGs (the Android
//! key-attestation authorization lists, the Apple nonce envelope, CRL
//! distribution points and revoked-serial lists) and pulls R/S out of
//! DER ECDSA signatures. Definite lengths only, minimal length encoding,
//! bounded tag numbers.

use crate::errors::VerificationError;

/// One decoded DER element: identifier octets split into class,
/// constructed bit and tag number, plus the content octets.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Asn1Element<'a> {
    class: u8,
    constructed: bool,
    tag: u32,
    content: &'a [u8],
}

const CLASS_UNIVERSAL: u8 = 0;
const CLASS_CONTEXT: u8 = 2;

const TAG_INTEGER: u32 = 2;
const TAG_BIT_STRING: u32 = 3;
const TAG_OCTET_STRING: u32 = 4;
const TAG_SEQUENCE: u32 = 16;

impl<'a> Asn1Element<'a> {
    /// Decode the element starting at `bytes[0]`; the second value is the
    /// number of bytes the element occupied.
    pub(crate) fn parse(bytes: &'a [u8]) -> Result<(Self, usize), VerificationError> {
        let b0 = *bytes
            .first()
            .ok_or(VerificationError::Asn1Decode("truncated identifier"))?;
        let class = b0 >> 6;
        let constructed = b0 & 0x20 != 0;
        let mut pos = 1;

        let mut tag = (b0 & 0x1F) as u32;
        if tag == 0x1F {
            // high tag number form, base-128
            tag = 0;
            loop {
                let b = *bytes
                    .get(pos)
                    .ok_or(VerificationError::Asn1Decode("truncated identifier"))?;
                pos += 1;
                tag = tag
                    .checked_mul(128)
                    .and_then(|t| t.checked_add((b & 0x7F) as u32))
                    .ok_or(VerificationError::Asn1Decode("tag number too large"))?;
                if b & 0x80 == 0 {
                    break;
                }
                if pos > 5 {
                    return Err(VerificationError::Asn1Decode("tag number too large"));
                }
            }
        }

        let (len, len_octets) = parse_length(&bytes[pos..])?;
        pos += len_octets;
        let end = pos
            .checked_add(len)
            .ok_or(VerificationError::Asn1Decode("length overflow"))?;
        let content = bytes
            .get(pos..end)
            .ok_or(VerificationError::Asn1Decode("truncated content"))?;

        Ok((
            Self {
                class,
                constructed,
                tag,
                content,
            },
            end,
        ))
    }

    /// Decode a buffer holding exactly one element.
    pub(crate) fn parse_single(bytes: &'a [u8]) -> Result<Self, VerificationError> {
        let (element, consumed) = Self::parse(bytes)?;
        if consumed != bytes.len() {
            return Err(VerificationError::Asn1Decode("trailing bytes"));
        }
        Ok(element)
    }

    pub(crate) fn tag(&self) -> u32 {
        self.tag
    }

    pub(crate) fn is_context(&self) -> bool {
        self.class == CLASS_CONTEXT
    }

    pub(crate) fn content(&self) -> &'a [u8] {
        self.content
    }

    /// Child elements of a constructed node, in order.
    pub(crate) fn children(&self) -> Result<Vec<Asn1Element<'a>>, VerificationError> {
        if !self.constructed {
            return Err(VerificationError::Asn1Decode("primitive has no children"));
        }
        let mut out = Vec::new();
        let mut rest = self.content;
        while !rest.is_empty() {
            let (child, consumed) = Asn1Element::parse(rest)?;
            out.push(child);
            rest = &rest[consumed..];
        }
        Ok(out)
    }

    pub(crate) fn child(&self, index: usize) -> Result<Asn1Element<'a>, VerificationError> {
        self.children()?
            .get(index)
            .copied()
            .ok_or(VerificationError::Asn1Decode("child index out of range"))
    }

    /// First child carrying the given context-specific tag, if any.
    pub(crate) fn find_context(
        &self,
        tag: u32,
    ) -> Result<Option<Asn1Element<'a>>, VerificationError> {
        Ok(self
            .children()?
            .into_iter()
            .find(|c| c.class == CLASS_CONTEXT && c.tag == tag))
    }

    /// Content octets of an INTEGER, two's-complement big-endian as
    /// encoded (sign padding included).
    pub(crate) fn integer_bytes(&self) -> Result<&'a [u8], VerificationError> {
        if self.class != CLASS_UNIVERSAL || self.tag != TAG_INTEGER || self.constructed {
            return Err(VerificationError::Asn1Decode("expected INTEGER"));
        }
        if self.content.is_empty() {
            return Err(VerificationError::Asn1Decode("empty INTEGER"));
        }
        Ok(self.content)
    }

    /// INTEGER narrowed to u64; fails on negative or oversized values.
    pub(crate) fn integer_u64(&self) -> Result<u64, VerificationError> {
        let bytes = self.integer_bytes()?;
        if bytes[0] & 0x80 != 0 {
            return Err(VerificationError::Asn1Decode("negative INTEGER"));
        }
        let magnitude: &[u8] = if bytes[0] == 0 { &bytes[1..] } else { bytes };
        if magnitude.len() > 8 {
            return Err(VerificationError::Asn1Decode("INTEGER too large"));
        }
        let mut value = 0u64;
        for &b in magnitude {
            value = value << 8 | b as u64;
        }
        Ok(value)
    }

    pub(crate) fn octet_string(&self) -> Result<&'a [u8], VerificationError> {
        if self.class != CLASS_UNIVERSAL || self.tag != TAG_OCTET_STRING || self.constructed {
            return Err(VerificationError::Asn1Decode("expected OCTET STRING"));
        }
        Ok(self.content)
    }

    /// BIT STRING content with the unused-bits octet stripped; extension
    /// walks only ever meet whole-byte strings.
    pub(crate) fn bit_string(&self) -> Result<&'a [u8], VerificationError> {
        if self.class != CLASS_UNIVERSAL || self.tag != TAG_BIT_STRING || self.constructed {
            return Err(VerificationError::Asn1Decode("expected BIT STRING"));
        }
        match self.content.split_first() {
            Some((0, rest)) => Ok(rest),
            _ => Err(VerificationError::Asn1Decode("unsupported BIT STRING")),
        }
    }

    fn is_sequence(&self) -> bool {
        self.class == CLASS_UNIVERSAL && self.tag == TAG_SEQUENCE && self.constructed
    }
}

/// DER definite length: short form, or long form with a minimal big-endian
/// value. Indefinite form is a hard failure.
fn parse_length(bytes: &[u8]) -> Result<(usize, usize), VerificationError> {
    let b0 = *bytes
        .first()
        .ok_or(VerificationError::Asn1Decode("truncated length"))?;
    if b0 < 0x80 {
        return Ok((b0 as usize, 1));
    }
    if b0 == 0x80 {
        return Err(VerificationError::Asn1Decode("indefinite length"));
    }
    let octets = (b0 & 0x7F) as usize;
    if octets > 4 {
        return Err(VerificationError::Asn1Decode("length too large"));
    }
    let raw = bytes
        .get(1..1 + octets)
        .ok_or(VerificationError::Asn1Decode("truncated length"))?;
    if raw[0] == 0 {
        return Err(VerificationError::Asn1Decode("non-minimal length"));
    }
    let mut len = 0usize;
    for &b in raw {
        len = len << 8 | b as usize;
    }
    if len < 0x80 {
        return Err(VerificationError::Asn1Decode("non-minimal length"));
    }
    Ok((len, 1 + octets))
}

/// Convert a DER `SEQUENCE { INTEGER r, INTEGER s }` ECDSA signature to
/// fixed-width IEEE P1363 `r ‖ s`. `coefficient_size` is the curve
/// coordinate width in bytes (32 for P-256, 48 for P-384, 66 for P-521).
pub fn der_to_p1363(
    signature: &[u8],
    coefficient_size: usize,
) -> Result<Vec<u8>, VerificationError> {
    let root = Asn1Element::parse_single(signature)?;
    if !root.is_sequence() {
        return Err(VerificationError::Asn1Decode("expected SEQUENCE"));
    }
    let children = root.children()?;
    if children.len() != 2 {
        return Err(VerificationError::Asn1Decode(
            "ECDSA signature must hold two INTEGERs",
        ));
    }

    let mut out = vec![0u8; 2 * coefficient_size];
    for (i, child) in children.iter().enumerate() {
        let bytes = child.integer_bytes()?;
        // drop the sign-padding octet DER adds when the high bit is set
        let magnitude = match bytes.split_first() {
            Some((0, rest)) if !rest.is_empty() && rest[0] & 0x80 != 0 => rest,
            _ => bytes,
        };
        if magnitude.len() > coefficient_size {
            return Err(VerificationError::Asn1Decode(
                "ECDSA coordinate wider than coefficient size",
            ));
        }
        let start = (i + 1) * coefficient_size - magnitude.len();
        out[start..(i + 1) * coefficient_size].copy_from_slice(magnitude);
    }
    Ok(out)
}

/// Inverse of [`der_to_p1363`]: wrap fixed-width `r ‖ s` back into a DER
/// SEQUENCE of two INTEGERs with minimal magnitudes.
pub fn p1363_to_der(signature: &[u8]) -> Result<Vec<u8>, VerificationError> {
    if signature.is_empty() || signature.len() % 2 != 0 {
        return Err(VerificationError::Asn1Decode(
            "P1363 signature must split into two equal halves",
        ));
    }
    let (r, s) = signature.split_at(signature.len() / 2);

    let mut body = Vec::new();
    for half in [r, s] {
        let mut magnitude = half;
        while magnitude.len() > 1 && magnitude[0] == 0 {
            magnitude = &magnitude[1..];
        }
        let pad = magnitude[0] & 0x80 != 0;
        body.push(0x02);
        push_der_length(&mut body, magnitude.len() + usize::from(pad));
        if pad {
            body.push(0x00);
        }
        body.extend_from_slice(magnitude);
    }

    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(0x30);
    push_der_length(&mut out, body.len());
    out.extend_from_slice(&body);
    Ok(out)
}

pub(crate) fn push_der_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    }
}
