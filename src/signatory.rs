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

//! Signing engine: drives canonicalization and the crypto primitives to
//! produce a new `DKIM-Signature`/`ARC-Message-Signature` header.

use crate::canonicalize::{canon_body, canon_header, Canon, LengthCapPolicy};
use crate::crypto::{DigestAlgorithm, DigestContext, PrivateKey};
use crate::decoders::base64::{encode_base64, wrap_base64};
use crate::decoders::quoted_printable::quoted_printable_encode_tag_value;
use crate::error::Error;
use crate::header::Message;

/// Configuration for one signature plan. There is no on-disk configuration
/// format — this is a plain builder populated programmatically by the
/// embedding application.
pub struct SignatoryOptions {
    pub private_key: PrivateKey,
    pub digest_algorithm: DigestAlgorithm,
    pub domain: String,
    pub selector: String,
    pub header_canon: Canon,
    pub body_canon: Canon,
    /// Header names to sign, lowercase. Empty means "sign every header
    /// present, once each, in reverse source order".
    pub headers: Vec<String>,
    /// Extra header names appended to the emitted `h=` list with no
    /// corresponding header fed into the digest (oversigning).
    pub oversign: Vec<String>,
    pub body_length: Option<u64>,
    pub identity: Option<String>,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
    /// `Some(n)` emits an `ARC-Message-Signature` header with instance `n`
    /// instead of a `DKIM-Signature` header.
    pub arc_instance: Option<u32>,
}

impl SignatoryOptions {
    pub fn new(private_key: PrivateKey, domain: impl Into<String>, selector: impl Into<String>) -> Self {
        SignatoryOptions {
            private_key,
            digest_algorithm: DigestAlgorithm::Sha256,
            domain: domain.into(),
            selector: selector.into(),
            header_canon: Canon::Relaxed,
            body_canon: Canon::Relaxed,
            headers: Vec::new(),
            oversign: Vec::new(),
            body_length: None,
            identity: None,
            timestamp: None,
            expiration: None,
            arc_instance: None,
        }
    }

    pub fn header_list(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn canonicalization(mut self, header: Canon, body: Canon) -> Self {
        self.header_canon = header;
        self.body_canon = body;
        self
    }

    pub fn digest_algorithm(mut self, alg: DigestAlgorithm) -> Self {
        self.digest_algorithm = alg;
        self
    }

    fn header_name(&self) -> &'static str {
        if self.arc_instance.is_some() {
            "ARC-Message-Signature"
        } else {
            "DKIM-Signature"
        }
    }
}

/// Signs `message` under `options`, returning the full new header field
/// (name, colon, folded value and terminating CRLF) ready to be prepended to
/// the message.
#[tracing::instrument(skip(message, options), fields(domain = %options.domain, selector = %options.selector))]
pub fn sign(message: &[u8], options: &SignatoryOptions) -> Result<String, Error> {
    let parsed = Message::parse(message);

    let mut body_digest = DigestContext::new(options.digest_algorithm);
    canon_body(
        options.body_canon,
        parsed.body(),
        options.body_length,
        LengthCapPolicy::RejectIfExceeded,
        &mut body_digest,
    )?;
    let bh = encode_base64(&body_digest.finalize());

    let sign_set: Vec<String> = options.headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    let sign_all = sign_set.is_empty();

    let mut header_digest = DigestContext::new(options.digest_algorithm);
    let mut signed_headers = Vec::new();
    for header in parsed.headers.iter().rev() {
        let lower = header.name.to_ascii_lowercase();
        if sign_all || sign_set.contains(&lower) {
            let canon = canon_header(options.header_canon, header.raw(parsed.data))?;
            header_digest.update(&canon);
            header_digest.update(b"\r\n");
            signed_headers.push(lower);
        }
    }
    signed_headers.extend(options.oversign.iter().cloned());

    let header_text = compose_header_text(options, &bh, &signed_headers);
    let canon_sig_header = canon_header(options.header_canon, header_text.as_bytes())?;
    header_digest.update(&canon_sig_header);

    let md = header_digest.finalize();
    let signature = options.private_key.sign(options.digest_algorithm, &md)?;
    let signature_b64 = wrap_base64(&encode_base64(&signature), 77);

    Ok(format!("{header_text}{signature_b64}\r\n"))
}

fn compose_header_text(options: &SignatoryOptions, bh: &str, signed_headers: &[String]) -> String {
    let mut text = format!("{}: ", options.header_name());

    if let Some(instance) = options.arc_instance {
        text.push_str(&format!("i={instance}; "));
    } else {
        text.push_str("v=1; ");
    }

    text.push_str(&format!(
        "a={}-{}; c={}/{};",
        options.private_key.algorithm().as_str(),
        options.digest_algorithm.as_str(),
        options.header_canon.as_str(),
        options.body_canon.as_str(),
    ));

    if let Some(t) = options.timestamp {
        text.push_str(&format!(" t={t};"));
    }
    if let Some(x) = options.expiration {
        text.push_str(&format!(" x={x};"));
    }

    text.push_str(&format!("\r\n\td={}; s={};", options.domain, options.selector));
    if options.arc_instance.is_none() {
        if let Some(identity) = &options.identity {
            text.push_str(&format!(" i={};", quoted_printable_encode_tag_value(identity)));
        }
    }
    if let Some(l) = options.body_length {
        text.push_str(&format!(" l={l};"));
    }

    text.push_str("\r\n\th=");
    text.push_str(&wrap_list(signed_headers, 80));
    text.push(';');

    text.push_str(&format!("\r\n\tbh={bh};"));
    text.push_str("\r\n\tb=");

    text
}

/// Joins `items` with `:` and inserts `"\r\n\t "` continuations so no line
/// exceeds `width` columns, matching the wrapping style used for `b=`.
fn wrap_list(items: &[String], width: usize) -> String {
    let mut out = String::new();
    let mut col = 0;
    for (i, item) in items.iter().enumerate() {
        let piece = if i == 0 { item.clone() } else { format!(":{item}") };
        if col + piece.len() > width && col > 0 {
            out.push_str("\r\n\t ");
            col = 0;
        }
        out.push_str(&piece);
        col += piece.len();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{DigestAlgorithm, PublicKeyMaterial};
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::RsaPrivateKey;

    const TEST_RSA_PEM: &str = include_str!("../tests/data/rsa_test_key.pem");

    #[test]
    fn signs_and_self_verifies() {
        let key = RsaPrivateKey::from_pkcs1_pem(TEST_RSA_PEM).unwrap();
        let pub_key = PublicKeyMaterial::from_rsa_private(&key);

        let message = b"From: a@example.com\r\nSubject: hi\r\n\r\nbody\r\n";
        let options = SignatoryOptions::new(PrivateKey::Rsa(key), "example.com", "s1")
            .header_list(vec!["from".into(), "subject".into()])
            .canonicalization(Canon::Relaxed, Canon::Relaxed)
            .digest_algorithm(DigestAlgorithm::Sha256);

        let header_text = sign(message, &options).unwrap();
        assert!(header_text.starts_with("DKIM-Signature: v=1;"));

        let signed_message = [header_text.as_bytes(), message].concat();
        let parsed = Message::parse(&signed_message);
        let header = parsed.headers_named("DKIM-Signature").next().unwrap();
        let sig = crate::signature::SignatureRecord::parse(header, parsed.data, false).unwrap();

        let mut body_digest = DigestContext::new(sig.digest_algorithm);
        canon_body(
            sig.body_canon,
            parsed.body(),
            sig.body_length,
            LengthCapPolicy::ClampToAvailable,
            &mut body_digest,
        )
        .unwrap();
        assert_eq!(body_digest.finalize(), sig.body_hash);

        pub_key.verify(sig.digest_algorithm, &recompute_md(&parsed, &sig), &sig.signature).unwrap();
    }

    fn recompute_md(parsed: &Message<'_>, sig: &crate::signature::SignatureRecord) -> Vec<u8> {
        let mut digest = DigestContext::new(sig.digest_algorithm);
        let mut remaining: std::collections::HashMap<String, Vec<&crate::header::HeaderRecord>> =
            std::collections::HashMap::new();
        for h in &parsed.headers {
            remaining
                .entry(h.name.to_ascii_lowercase())
                .or_default()
                .push(h);
        }
        for name in &sig.signed_headers {
            if let Some(list) = remaining.get_mut(&name.to_ascii_lowercase()) {
                if let Some(h) = list.pop() {
                    let canon = canon_header(sig.header_canon, h.raw(parsed.data)).unwrap();
                    digest.update(&canon);
                    digest.update(b"\r\n");
                }
            }
        }
        let sig_header = parsed.headers_named("DKIM-Signature").next().unwrap();
        let mut erased = sig_header.raw(parsed.data).to_vec();
        let (start, end) = sig.signature_value_range;
        let header_start = sig_header.raw_range.0;
        erased.splice((start - header_start)..(end - header_start), std::iter::empty());
        let canon = canon_header(sig.header_canon, &erased).unwrap();
        digest.update(&canon);
        digest.finalize()
    }

    #[test]
    fn oversigning_adds_extra_h_entries_without_extra_headers() {
        let key = RsaPrivateKey::from_pkcs1_pem(TEST_RSA_PEM).unwrap();
        let message = b"From: a@example.com\r\n\r\nbody\r\n";
        let options = SignatoryOptions::new(PrivateKey::Rsa(key), "example.com", "s1")
            .header_list(vec!["from".into()]);
        let mut options = options;
        options.oversign = vec!["from".into()];

        let header_text = sign(message, &options).unwrap();
        assert!(header_text.contains("h=from:from"));
    }
}
