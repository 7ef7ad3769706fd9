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

//! Typed projection of one `DKIM-Signature`/`ARC-Message-Signature` header's
//! tag list (RFC 6376 §3.5, RFC 8617 §4.1).

use crate::canonicalize::Canon;
use crate::crypto::{DigestAlgorithm, SignatureAlgorithm};
use crate::decoders::base64::decode_base64;
use crate::decoders::quoted_printable::quoted_printable_decode;
use crate::error::Error;
use crate::header::HeaderRecord;
use crate::tag_list::{parse_colon_list, TagList};

pub struct SignatureRecord {
    /// `v=1`, absent for ARC signatures.
    pub version: Option<String>,
    pub signature_algorithm: SignatureAlgorithm,
    pub digest_algorithm: DigestAlgorithm,
    pub signature: Vec<u8>,
    pub body_hash: Vec<u8>,
    pub header_canon: Canon,
    pub body_canon: Canon,
    pub domain: String,
    pub signed_headers: Vec<String>,
    /// `i=`, quoted-printable-decoded; `None` for ARC signatures (which reuse
    /// `i=` for the instance number instead).
    pub identity: Option<String>,
    pub body_length: Option<u64>,
    pub query: Option<String>,
    pub selector: String,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
    /// `i=` on an ARC signature: the 1..50 chain-link instance number.
    pub arc_instance: Option<u32>,
    /// Absolute byte range of the `b=` tag's *value* within the original
    /// message, so the verifier can erase it in place before hashing.
    pub signature_value_range: (usize, usize),
}

impl SignatureRecord {
    pub fn parse(
        header: &HeaderRecord<'_>,
        message: &[u8],
        is_arc: bool,
    ) -> Result<SignatureRecord, Error> {
        let value = header.value(message);
        let tags = TagList::parse(&value)?;

        let version = tags.get("v").map(|v| v.to_string());
        if is_arc {
            if version.is_some() {
                return Err(Error::permanent("v= is not valid on an ARC signature"));
            }
        } else if version.as_deref() != Some("1") {
            return Err(Error::permanent("missing or unsupported v= tag"));
        }

        let a = tags.get_required("a")?;
        let (signature_algorithm, digest_algorithm) = parse_algorithm(a)?;
        if signature_algorithm == SignatureAlgorithm::Ed25519 && digest_algorithm != DigestAlgorithm::Sha256 {
            return Err(Error::permanent("ed25519-sha1 is not a valid DKIM algorithm"));
        }

        let b_raw = tags.get_required("b")?;
        let signature = decode_base64(b_raw.as_bytes())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::permanent("b= tag is not valid non-empty base64"))?;
        let b_value_start = tags.offset("b").expect("checked by get_required");
        let b_value_len = tags.len_of("b").expect("checked by get_required");
        let signature_value_range = (
            header.value_offset + b_value_start,
            header.value_offset + b_value_start + b_value_len,
        );

        let bh_raw = tags.get_required("bh")?;
        let body_hash = decode_base64(bh_raw.as_bytes())
            .ok_or_else(|| Error::permanent("bh= tag is not valid base64"))?;

        let (header_canon, body_canon) = match tags.get("c") {
            None => (Canon::Simple, Canon::Simple),
            Some(c) => match c.split_once('/') {
                Some((h, b)) => (Canon::parse(h)?, Canon::parse(b)?),
                None => (Canon::parse(c)?, Canon::Simple),
            },
        };

        let domain = tags.get_required("d")?.to_ascii_lowercase();

        let signed_headers = parse_colon_list(tags.get_required("h")?)?;
        if !signed_headers.iter().any(|h| h.eq_ignore_ascii_case("from")) {
            return Err(Error::permanent("h= tag does not list From"));
        }

        let mut identity = None;
        let mut arc_instance = None;
        if let Some(i) = tags.get("i") {
            if is_arc {
                let n: u32 = i
                    .parse()
                    .map_err(|_| Error::permanent("i= is not a valid ARC instance number"))?;
                if !(1..=50).contains(&n) {
                    return Err(Error::permanent("ARC instance out of range 1..50"));
                }
                arc_instance = Some(n);
            } else {
                let decoded = quoted_printable_decode(i.as_bytes())
                    .ok_or_else(|| Error::permanent("i= is not valid quoted-printable"))?;
                let decoded = String::from_utf8_lossy(&decoded).into_owned();
                if let Some(ident_domain) = identity_domain(&decoded) {
                    if ident_domain != domain && !ident_domain.ends_with(&format!(".{domain}")) {
                        return Err(Error::permanent("i= domain is not d= or a subdomain of it"));
                    }
                }
                identity = Some(decoded);
            }
        } else if is_arc {
            return Err(Error::permanent("ARC signature missing i= instance tag"));
        }

        let body_length = match tags.get("l") {
            Some(l) => Some(
                l.parse::<u64>()
                    .map_err(|_| Error::permanent("l= is not a valid unsigned integer"))?,
            ),
            None => None,
        };

        let query = match tags.get("q") {
            Some(q) if q != "dns/txt" => {
                return Err(Error::permanent(format!("unsupported q= value {q:?}")))
            }
            other => other.map(|q| q.to_string()),
        };

        let selector = tags.get_required("s")?.to_string();

        let timestamp = match tags.get("t") {
            Some(t) => Some(
                t.parse::<u64>()
                    .map_err(|_| Error::permanent("t= is not a valid unsigned integer"))?,
            ),
            None => None,
        };

        let expiration = match tags.get("x") {
            Some(x) => Some(
                x.parse::<u64>()
                    .map_err(|_| Error::permanent("x= is not a valid unsigned integer"))?,
            ),
            None => None,
        };

        Ok(SignatureRecord {
            version,
            signature_algorithm,
            digest_algorithm,
            signature,
            body_hash,
            header_canon,
            body_canon,
            domain,
            signed_headers,
            identity,
            body_length,
            query,
            selector,
            timestamp,
            expiration,
            arc_instance,
            signature_value_range,
        })
    }

    /// Whether `x=` names a time strictly in the past relative to `now`
    /// (seconds since the Unix epoch).
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiration.is_some_and(|x| x < now)
    }
}

/// Domain part of an `i=` identity (`local-part@domain`, where unlike a
/// mailbox addr-spec the local part may be empty).
fn identity_domain(i: &str) -> Option<String> {
    let pos = i.rfind('@')?;
    if pos + 1 >= i.len() {
        return None;
    }
    Some(i[pos + 1..].to_ascii_lowercase())
}

fn parse_algorithm(a: &str) -> Result<(SignatureAlgorithm, DigestAlgorithm), Error> {
    let (alg, digest) = a
        .split_once('-')
        .ok_or_else(|| Error::permanent(format!("malformed a= value {a:?}")))?;
    let alg = match alg {
        "rsa" => SignatureAlgorithm::Rsa,
        "ed25519" => SignatureAlgorithm::Ed25519,
        other => return Err(Error::permanent(format!("unsupported signature algorithm {other:?}"))),
    };
    let digest = DigestAlgorithm::parse(digest)
        .ok_or_else(|| Error::permanent(format!("unsupported digest algorithm {digest:?}")))?;
    Ok((alg, digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Message;

    fn parse_one(raw: &[u8]) -> SignatureRecord {
        let msg = Message::parse(raw);
        let header = msg.headers_named("DKIM-Signature").next().unwrap();
        SignatureRecord::parse(header, msg.data, false).unwrap()
    }

    #[test]
    fn parses_typical_signature() {
        let raw = b"DKIM-Signature: v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com;\r\n s=s1; h=from:subject; bh=AAAA; b=AAAA\r\n\r\n";
        let sig = parse_one(raw);
        assert_eq!(sig.domain, "example.com");
        assert_eq!(sig.selector, "s1");
        assert_eq!(sig.header_canon, Canon::Relaxed);
        assert_eq!(sig.body_canon, Canon::Relaxed);
        assert_eq!(sig.signed_headers, vec!["from", "subject"]);
    }

    #[test]
    fn c_with_single_token_means_relaxed_over_simple() {
        let raw = b"DKIM-Signature: v=1; a=rsa-sha256; c=relaxed; d=example.com; s=s1;\r\n h=from; bh=AAAA; b=AAAA\r\n\r\n";
        let sig = parse_one(raw);
        assert_eq!(sig.header_canon, Canon::Relaxed);
        assert_eq!(sig.body_canon, Canon::Simple);
    }

    #[test]
    fn missing_from_in_h_fails() {
        let raw = b"DKIM-Signature: v=1; a=rsa-sha256; d=example.com; s=s1;\r\n h=subject; bh=AAAA; b=AAAA\r\n\r\n";
        let msg = Message::parse(raw);
        let header = msg.headers_named("DKIM-Signature").next().unwrap();
        assert!(SignatureRecord::parse(header, msg.data, false).is_err());
    }

    #[test]
    fn ed25519_sha1_pairing_rejected() {
        let raw = b"DKIM-Signature: v=1; a=ed25519-sha1; d=example.com; s=s1;\r\n h=from; bh=AAAA; b=AAAA\r\n\r\n";
        let msg = Message::parse(raw);
        let header = msg.headers_named("DKIM-Signature").next().unwrap();
        assert!(SignatureRecord::parse(header, msg.data, false).is_err());
    }

    #[test]
    fn arc_signature_requires_instance_and_forbids_version() {
        let raw = b"ARC-Message-Signature: i=1; a=rsa-sha256; d=example.com; s=s1;\r\n h=from; bh=AAAA; b=AAAA\r\n\r\n";
        let msg = Message::parse(raw);
        let header = msg.headers_named("ARC-Message-Signature").next().unwrap();
        let sig = SignatureRecord::parse(header, msg.data, true).unwrap();
        assert_eq!(sig.arc_instance, Some(1));
        assert!(sig.version.is_none());
    }

    #[test]
    fn identity_must_be_subdomain_of_d() {
        let raw = b"DKIM-Signature: v=1; a=rsa-sha256; d=example.com; s=s1; i=@evil.com;\r\n h=from; bh=AAAA; b=AAAA\r\n\r\n";
        let msg = Message::parse(raw);
        let header = msg.headers_named("DKIM-Signature").next().unwrap();
        assert!(SignatureRecord::parse(header, msg.data, false).is_err());
    }

    #[test]
    fn signature_value_range_points_at_b_value() {
        let raw = b"DKIM-Signature: v=1; a=rsa-sha256; d=example.com; s=s1;\r\n h=from; bh=AAAA; b=BBBB\r\n\r\n";
        let sig = parse_one(raw);
        let (start, end) = sig.signature_value_range;
        assert_eq!(&raw[start..end], b"BBBB");
    }
}
