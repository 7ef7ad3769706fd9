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

//! Verification engine: enumerates signature headers, checks body hashes,
//! resolves publishing keys and verifies header signatures.

use std::collections::HashMap;

use crate::canonicalize::{canon_body, canon_header, LengthCapPolicy};
use crate::crypto::DigestContext;
use crate::error::{AuthResult, Error};
use crate::header::{HeaderRecord, Message};
use crate::public_key::PublicKeyRecord;
use crate::resolver::{Resolver, TxtRecord};
use crate::signature::SignatureRecord;

/// Which signature header name a [`Validatory`] enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    Dkim,
    Arc,
}

impl SignatureKind {
    fn header_name(&self) -> &'static str {
        match self {
            SignatureKind::Dkim => "DKIM-Signature",
            SignatureKind::Arc => "ARC-Message-Signature",
        }
    }

    fn is_arc(&self) -> bool {
        matches!(self, SignatureKind::Arc)
    }
}

pub struct Validatory<'x> {
    message: Message<'x>,
    kind: SignatureKind,
}

impl<'x> Validatory<'x> {
    pub fn new(data: &'x [u8], kind: SignatureKind) -> Validatory<'x> {
        Validatory {
            message: Message::parse(data),
            kind,
        }
    }

    /// Signature headers present on the message, in source order.
    pub fn signatures(&self) -> impl Iterator<Item = &HeaderRecord<'x>> {
        self.message.headers_named(self.kind.header_name())
    }

    pub fn parse_signature(&self, header: &HeaderRecord<'x>) -> Result<SignatureRecord, Error> {
        SignatureRecord::parse(header, self.message.data, self.kind.is_arc())
    }

    #[tracing::instrument(skip(self, resolver), fields(domain = %sig.domain, selector = %sig.selector))]
    pub fn fetch_public_key(
        &self,
        sig: &SignatureRecord,
        resolver: &dyn Resolver,
    ) -> Result<PublicKeyRecord, Error> {
        let name = format!("{}._domainkey.{}", sig.selector, sig.domain);
        match resolver.lookup_txt(&name)? {
            TxtRecord::Found(txt) => {
                let key = PublicKeyRecord::parse(&txt)?;
                tracing::debug!(query = %name, "resolved public key");
                Ok(key)
            }
            TxtRecord::NoRecords | TxtRecord::NxDomain => {
                tracing::debug!(query = %name, "no public key record");
                Err(Error::permanent(format!("no public key record at {name}")))
            }
        }
    }

    /// Recomputes the body hash and compares it byte-for-byte against `sig.bh`.
    ///
    /// A `l=` cap larger than the true canonical body length is not treated
    /// as a parse error here: the canonicalizer clamps to whatever body
    /// exists, and any resulting mismatch surfaces as the same `fail`
    /// outcome as an ordinary tampered body (a legitimately signed message
    /// can never carry a `l=` larger than its own canonical length, since
    /// signing rejects that up front — see [`crate::signatory::sign`]).
    #[tracing::instrument(skip(self, sig), fields(domain = %sig.domain, selector = %sig.selector))]
    pub fn check_body_hash(&self, sig: &SignatureRecord) -> Result<(), Error> {
        let mut digest = DigestContext::new(sig.digest_algorithm);
        canon_body(
            sig.body_canon,
            self.message.body(),
            sig.body_length,
            LengthCapPolicy::ClampToAvailable,
            &mut digest,
        )?;
        if digest.finalize() == sig.body_hash {
            Ok(())
        } else {
            Err(Error::permanent_as("body hash does not match bh= tag", AuthResult::Fail))
        }
    }

    /// Verifies the header signature. `key` must already have been
    /// cross-validated against `sig` by the caller (see
    /// [`cross_validate`]).
    ///
    /// If `key` carries the `t=y` "testing" flag, any failure here (a
    /// cross-validation mismatch or a cryptographic verify failure) is
    /// reported as [`AuthResult::Neutral`] rather than `fail`/`permerror`
    /// (RFC 6376 §3.6.1).
    pub fn check_signature(
        &self,
        header: &HeaderRecord<'x>,
        sig: &SignatureRecord,
        key: &PublicKeyRecord,
    ) -> Result<(), Error> {
        let result = self.check_signature_strict(header, sig, key);
        if key.flags.testing {
            result.map_err(Error::soften_to_neutral)
        } else {
            result
        }
    }

    #[tracing::instrument(skip(self, header, sig, key), fields(domain = %sig.domain, selector = %sig.selector))]
    fn check_signature_strict(
        &self,
        header: &HeaderRecord<'x>,
        sig: &SignatureRecord,
        key: &PublicKeyRecord,
    ) -> Result<(), Error> {
        cross_validate(sig, key, self.kind)?;

        let mut digest = DigestContext::new(sig.digest_algorithm);

        let mut by_name: HashMap<String, Vec<&HeaderRecord<'x>>> = HashMap::new();
        for h in &self.message.headers {
            by_name.entry(h.name.to_ascii_lowercase()).or_default().push(h);
        }

        for name in &sig.signed_headers {
            let Some(candidates) = by_name.get_mut(&name.to_ascii_lowercase()) else {
                continue;
            };
            let Some(matched) = candidates.pop() else {
                continue;
            };
            let canon = canon_header(sig.header_canon, matched.raw(self.message.data))?;
            digest.update(&canon);
            digest.update(b"\r\n");
        }

        let erased = erase_signature_value(header.raw(self.message.data), header.raw_range.0, sig);
        let canon = canon_header(sig.header_canon, &erased)?;
        digest.update(&canon);

        let md = digest.finalize();
        key.key.verify(sig.digest_algorithm, &md, &sig.signature)
    }
}

/// Checks algorithm/domain constraints that must hold between a signature
/// and the key it claims to be verified by, before any cryptography runs.
fn cross_validate(sig: &SignatureRecord, key: &PublicKeyRecord, kind: SignatureKind) -> Result<(), Error> {
    if let Some(acceptable) = &key.acceptable_hashes {
        if !acceptable.iter().any(|h| h == sig.digest_algorithm.as_str()) {
            return Err(Error::permanent(format!(
                "key restricts digests to {acceptable:?}, signature uses {}",
                sig.digest_algorithm.as_str()
            )));
        }
    }
    if key.algorithm() != sig.signature_algorithm {
        return Err(Error::permanent("key algorithm does not match signature algorithm"));
    }
    if key.flags.strict_domain && kind == SignatureKind::Dkim {
        if let Some(identity) = &sig.identity {
            let ident_domain = identity.rsplit('@').next().unwrap_or_default();
            if !ident_domain.eq_ignore_ascii_case(&sig.domain) {
                return Err(Error::permanent("key requires i= domain to equal d= exactly"));
            }
        }
    }
    Ok(())
}

/// Returns a copy of `header_bytes` with the `b=` tag's value removed, given
/// `header_bytes` starts at absolute message offset `header_start`.
fn erase_signature_value(header_bytes: &[u8], header_start: usize, sig: &SignatureRecord) -> Vec<u8> {
    let (start, end) = sig.signature_value_range;
    let mut out = Vec::with_capacity(header_bytes.len());
    out.extend_from_slice(&header_bytes[..start - header_start]);
    out.extend_from_slice(&header_bytes[end - header_start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{DigestAlgorithm, PrivateKey, PublicKeyMaterial};
    use crate::canonicalize::Canon;
    use crate::signatory::{sign, SignatoryOptions};
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::RsaPrivateKey;

    const TEST_RSA_PEM: &str = include_str!("../tests/data/rsa_test_key.pem");

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs1_pem(TEST_RSA_PEM).unwrap()
    }

    fn resolver_for(key: &RsaPrivateKey, selector: &str, domain: &str) -> impl Resolver {
        use crate::decoders::base64::encode_base64;
        use rsa::pkcs8::EncodePublicKey;

        let der = key.to_public_key().to_public_key_der().unwrap();
        let p = encode_base64(der.as_bytes());
        let name = format!("{selector}._domainkey.{domain}");
        let record = format!("v=DKIM1; p={p}");
        move |query: &str| -> Result<TxtRecord, Error> {
            if query == name {
                Ok(TxtRecord::Found(record.clone()))
            } else {
                Ok(TxtRecord::NxDomain)
            }
        }
    }

    #[test]
    fn end_to_end_sign_then_verify() {
        let key = test_key();
        let resolver = resolver_for(&key, "s1", "example.com");

        let message = b"From: a@example.com\r\nSubject: hi\r\n\r\nbody\r\n";
        let options = SignatoryOptions::new(PrivateKey::Rsa(key), "example.com", "s1")
            .header_list(vec!["from".into(), "subject".into()])
            .canonicalization(Canon::Relaxed, Canon::Relaxed)
            .digest_algorithm(DigestAlgorithm::Sha256);
        let header_text = sign(message, &options).unwrap();
        let signed_message = [header_text.as_bytes(), message].concat();

        let validatory = Validatory::new(&signed_message, SignatureKind::Dkim);
        let header = validatory.signatures().next().unwrap().clone();
        let sig = validatory.parse_signature(&header).unwrap();
        validatory.check_body_hash(&sig).unwrap();
        let key = validatory.fetch_public_key(&sig, &resolver).unwrap();
        validatory.check_signature(&header, &sig, &key).unwrap();
    }

    #[test]
    fn tampered_body_fails_hash_check() {
        let key = test_key();
        let message = b"From: a@example.com\r\n\r\nbody\r\n";
        let options = SignatoryOptions::new(PrivateKey::Rsa(key), "example.com", "s1")
            .header_list(vec!["from".into()]);
        let header_text = sign(message, &options).unwrap();
        let mut signed_message = [header_text.as_bytes(), message].concat();
        let last = signed_message.len() - 1;
        signed_message[last - 1] = b'x';

        let validatory = Validatory::new(&signed_message, SignatureKind::Dkim);
        let header = validatory.signatures().next().unwrap().clone();
        let sig = validatory.parse_signature(&header).unwrap();
        assert!(validatory.check_body_hash(&sig).is_err());
    }

    #[test]
    fn missing_key_record_is_permanent_error() {
        let key = test_key();
        let message = b"From: a@example.com\r\n\r\nbody\r\n";
        let options = SignatoryOptions::new(PrivateKey::Rsa(key), "example.com", "nosuchselector");
        let header_text = sign(message, &options).unwrap();
        let signed_message = [header_text.as_bytes(), message as &[u8]].concat();

        let validatory = Validatory::new(&signed_message, SignatureKind::Dkim);
        let header = validatory.signatures().next().unwrap().clone();
        let sig = validatory.parse_signature(&header).unwrap();
        let resolver = |_: &str| -> Result<TxtRecord, Error> { Ok(TxtRecord::NxDomain) };
        assert!(validatory.fetch_public_key(&sig, &resolver).is_err());
    }

    #[test]
    fn rsa_public_key_derivation_helper() {
        let _ = PublicKeyMaterial::from_rsa_private(&test_key());
    }
}
