/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! Digest and signature primitives, kept behind narrow types so the
//! signing/verification engines never reach into `rsa`/`ed25519-dalek`/`sha1`/
//! `sha2` directly.

use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::decoders::base64::decode_base64;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn parse(s: &str) -> Option<DigestAlgorithm> {
        match s {
            "sha1" => Some(DigestAlgorithm::Sha1),
            "sha256" => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

/// Incremental digest accumulator, fed by the streaming body canonicalizer.
pub enum DigestContext {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl DigestContext {
    pub fn new(alg: DigestAlgorithm) -> Self {
        match alg {
            DigestAlgorithm::Sha1 => DigestContext::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => DigestContext::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            DigestContext::Sha1(h) => h.update(bytes),
            DigestContext::Sha256(h) => h.update(bytes),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            DigestContext::Sha1(h) => h.finalize().to_vec(),
            DigestContext::Sha256(h) => h.finalize().to_vec(),
        }
    }
}

impl crate::canonicalize::DigestSink for DigestContext {
    fn update(&mut self, bytes: &[u8]) {
        DigestContext::update(self, bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Rsa,
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Rsa => "rsa",
            SignatureAlgorithm::Ed25519 => "ed25519",
        }
    }
}

/// A signer's private key material, independent of wire encoding.
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ed25519(SigningKey),
}

impl PrivateKey {
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PrivateKey::Rsa(_) => SignatureAlgorithm::Rsa,
            PrivateKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// Signs `digest` (the finalized header-hash bytes — for Ed25519 this
    /// signs the SHA-256 digest itself, not the canonical message bytes, to
    /// preserve interoperability with the wider DKIM ecosystem).
    pub fn sign(&self, digest_alg: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            PrivateKey::Rsa(key) => {
                let scheme = match digest_alg {
                    DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
                    DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
                };
                key.sign(scheme, digest)
                    .map_err(|e| Error::permanent(format!("RSA signing failed: {e}")))
            }
            PrivateKey::Ed25519(key) => {
                if digest_alg != DigestAlgorithm::Sha256 {
                    return Err(Error::permanent(
                        "ed25519-sha1 is not a valid DKIM algorithm pairing",
                    ));
                }
                Ok(key.sign(digest).to_bytes().to_vec())
            }
        }
    }

    /// Loads private key material in any of the forms a signing operator is
    /// likely to hand this crate: a PEM-encoded PKCS#1/PKCS#8 block for RSA,
    /// base64 of the equivalent DER for RSA, or — for Ed25519 — a raw 32-byte
    /// seed, a raw 64-byte expanded secret key, or base64 of either.
    pub fn parse(material: &[u8], algorithm: SignatureAlgorithm) -> Result<PrivateKey, Error> {
        match algorithm {
            SignatureAlgorithm::Rsa => Ok(PrivateKey::Rsa(parse_rsa_private_key(material)?)),
            SignatureAlgorithm::Ed25519 => Ok(PrivateKey::Ed25519(parse_ed25519_private_key(material)?)),
        }
    }
}

fn parse_rsa_private_key(material: &[u8]) -> Result<RsaPrivateKey, Error> {
    if let Ok(text) = std::str::from_utf8(material) {
        if text.contains("-----BEGIN") {
            return RsaPrivateKey::from_pkcs1_pem(text)
                .or_else(|_| RsaPrivateKey::from_pkcs8_pem(text))
                .map_err(|e| Error::permanent(format!("invalid PEM RSA private key: {e}")));
        }
    }
    let der = decode_base64(material).ok_or_else(|| Error::permanent("RSA private key is neither PEM nor valid base64"))?;
    RsaPrivateKey::from_pkcs1_der(&der)
        .or_else(|_| RsaPrivateKey::from_pkcs8_der(&der))
        .map_err(|e| Error::permanent(format!("invalid DER RSA private key: {e}")))
}

fn parse_ed25519_private_key(material: &[u8]) -> Result<SigningKey, Error> {
    if let Some(seed) = ed25519_seed_from_raw(material) {
        return Ok(SigningKey::from_bytes(&seed));
    }
    if let Some(decoded) = decode_base64(material) {
        if let Some(seed) = ed25519_seed_from_raw(&decoded) {
            return Ok(SigningKey::from_bytes(&seed));
        }
    }
    Err(Error::permanent(
        "ed25519 private key must be a 32-byte seed or 64-byte expanded secret, raw or base64-encoded",
    ))
}

/// A 64-byte expanded secret is `seed || public-key` (the libsodium/RFC 8032
/// convention some key-generation tools export); only the seed is needed to
/// reconstruct the signing key.
fn ed25519_seed_from_raw(bytes: &[u8]) -> Option<[u8; 32]> {
    match bytes.len() {
        32 => bytes.try_into().ok(),
        64 => bytes[..32].try_into().ok(),
        _ => None,
    }
}

/// A verifier's public key material, as recovered from a DNS TXT record.
pub enum PublicKeyMaterial {
    Rsa(RsaPublicKey),
    Ed25519(VerifyingKey),
}

impl PublicKeyMaterial {
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PublicKeyMaterial::Rsa(_) => SignatureAlgorithm::Rsa,
            PublicKeyMaterial::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    pub fn verify(
        &self,
        digest_alg: DigestAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        match self {
            PublicKeyMaterial::Rsa(key) => {
                let scheme = match digest_alg {
                    DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
                    DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
                };
                key.verify(scheme, digest, signature)
                    .map_err(|_| Error::permanent_as("RSA signature did not verify", crate::error::AuthResult::Fail))
            }
            PublicKeyMaterial::Ed25519(key) => {
                if digest_alg != DigestAlgorithm::Sha256 {
                    return Err(Error::permanent(
                        "ed25519-sha1 is not a valid DKIM algorithm pairing",
                    ));
                }
                let sig = Ed25519Signature::from_slice(signature)
                    .map_err(|_| Error::permanent("malformed ed25519 signature"))?;
                key.verify(digest, &sig)
                    .map_err(|_| Error::permanent_as("ed25519 signature did not verify", crate::error::AuthResult::Fail))
            }
        }
    }
}

impl PublicKeyMaterial {
    /// Derives the public half of an RSA keypair, for self-verification tests
    /// and for embedders that keep only the private key on disk.
    pub fn from_rsa_private(key: &RsaPrivateKey) -> Self {
        PublicKeyMaterial::Rsa(key.to_public_key())
    }

    pub fn from_ed25519_private(key: &SigningKey) -> Self {
        PublicKeyMaterial::Ed25519(key.verifying_key())
    }
}
