//! Hashing and low-level signature plumbing shared by the COSE model,
//! the attestation verifiers, and the assertion path.

use ring::digest;
use ring::signature::{self, UnparsedPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::asn1;

/// Hash algorithms the protocol structures can name. SHA-1 appears only
/// for RS1 statements and TPM name algorithms from older parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    pub(crate) fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlg::Sha1 => {
                digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data)
                    .as_ref()
                    .to_vec()
            }
            HashAlg::Sha256 => Sha256::digest(data).to_vec(),
            HashAlg::Sha384 => Sha384::digest(data).to_vec(),
            HashAlg::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    pub(crate) fn output_len(&self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }
}

/// SHA-256 of `data`; the protocol's default binding hash.
pub(crate) fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// `true` when `signature` over `message` verifies under `key_bytes`
/// with the given ring algorithm. Key bytes are whatever the algorithm
/// expects: an uncompressed point for ECDSA, `RSAPublicKey` DER for RSA,
/// the raw 32 bytes for Ed25519.
pub(crate) fn verify_with_key(
    alg: &'static dyn signature::VerificationAlgorithm,
    key_bytes: &[u8],
    message: &[u8],
    sig: &[u8],
) -> bool {
    UnparsedPublicKey::new(alg, key_bytes)
        .verify(message, sig)
        .is_ok()
}

/// Assemble PKCS#1 `RSAPublicKey ::= SEQUENCE { modulus, publicExponent }`
/// from raw big-endian magnitudes, for ring's RSA verifiers.
pub(crate) fn rsa_public_key_der(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(modulus.len() + exponent.len() + 10);
    push_der_integer(&mut body, modulus);
    push_der_integer(&mut body, exponent);

    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(0x30);
    asn1::push_der_length(&mut out, body.len());
    out.extend_from_slice(&body);
    out
}

fn push_der_integer(out: &mut Vec<u8>, magnitude: &[u8]) {
    let mut m = magnitude;
    while m.len() > 1 && m[0] == 0 {
        m = &m[1..];
    }
    let m = if m.is_empty() { &[0u8][..] } else { m };
    let pad = m[0] & 0x80 != 0;

    out.push(0x02);
    asn1::push_der_length(out, m.len() + usize::from(pad));
    if pad {
        out.push(0x00);
    }
    out.extend_from_slice(m);
}
