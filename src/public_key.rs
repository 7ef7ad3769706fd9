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

//! Typed projection of a `<selector>._domainkey.<domain>` TXT record
//! (RFC 6376 §3.6.1).

use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;

use crate::crypto::{PublicKeyMaterial, SignatureAlgorithm};
use crate::decoders::base64::decode_base64;
use crate::error::{AuthResult, Error};
use crate::tag_list::{parse_colon_list, TagList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFlags {
    /// `t=y`: the key is under test; verification failures should be reported
    /// but not treated as hard failures by policy layers above this crate.
    pub testing: bool,
    /// `t=s`: the domain in `i=` must equal (not merely be a subdomain of) `d=`.
    pub strict_domain: bool,
}

pub struct PublicKeyRecord {
    pub key: PublicKeyMaterial,
    pub acceptable_hashes: Option<Vec<String>>,
    pub service_types: Option<Vec<String>>,
    pub flags: KeyFlags,
}

impl PublicKeyRecord {
    pub fn parse(txt: &str) -> Result<PublicKeyRecord, Error> {
        let tags = TagList::parse(txt)?;

        if let Some(v) = tags.get("v") {
            if v != "DKIM1" {
                return Err(Error::permanent(format!("unsupported key record version {v:?}")));
            }
        }

        let key_type = tags.get("k").unwrap_or("rsa");
        let p = tags.get_required("p")?;

        if p.is_empty() {
            return Err(Error::permanent_as(
                "key has been revoked (empty p= tag)",
                AuthResult::PermError,
            ));
        }

        let der = decode_base64(p.as_bytes())
            .ok_or_else(|| Error::permanent("p= tag is not valid base64"))?;

        let key = match key_type {
            "rsa" => {
                let pk = RsaPublicKey::from_public_key_der(&der)
                    .map_err(|e| Error::permanent(format!("invalid RSA public key: {e}")))?;
                PublicKeyMaterial::Rsa(pk)
            }
            "ed25519" => {
                let bytes: [u8; 32] = der
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::permanent("ed25519 public key must be 32 bytes"))?;
                let vk = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| Error::permanent(format!("invalid ed25519 public key: {e}")))?;
                PublicKeyMaterial::Ed25519(vk)
            }
            other => return Err(Error::permanent(format!("unsupported key type {other:?}"))),
        };

        let acceptable_hashes = match tags.get("h") {
            Some(h) => Some(parse_colon_list(h)?),
            None => None,
        };

        let service_types = match tags.get("s") {
            Some(s) if s != "*" => Some(parse_colon_list(s)?),
            _ => None,
        };

        let flag_tokens = tags.get("t").map(parse_colon_list).transpose()?.unwrap_or_default();
        let flags = KeyFlags {
            testing: flag_tokens.iter().any(|t| t == "y"),
            strict_domain: flag_tokens.iter().any(|t| t == "s"),
        };

        Ok(PublicKeyRecord {
            key,
            acceptable_hashes,
            service_types,
            flags,
        })
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.key.algorithm()
    }
}
