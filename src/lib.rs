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

//! # dkim-auth
//!
//! _dkim-auth_ signs and verifies DomainKeys Identified Mail signatures
//! ([RFC 6376](https://datatracker.ietf.org/doc/html/rfc6376)), evaluates
//! Author Domain Signing Practices
//! ([RFC 5617](https://datatracker.ietf.org/doc/html/rfc5617)), and
//! understands the ARC message-signature extension
//! ([RFC 8617](https://datatracker.ietf.org/doc/html/rfc8617)) well enough to
//! sign and verify one chain link.
//!
//! The crate is a library, not a mail filter: it reports a classified
//! verdict for every signature it inspects and never itself decides to
//! accept, quarantine or drop a message. Two surfaces do the work:
//!
//! - [`signatory::sign`] drives the canonicalization engine and a pluggable
//!   signing primitive to produce a `DKIM-Signature` (or, given an ARC
//!   instance, an `ARC-Message-Signature`) header ready to prepend to a
//!   message.
//! - [`validatory::Validatory`] enumerates the signature headers already on
//!   a message, re-derives their canonical form, resolves the publishing key
//!   over a pluggable naming-service lookup, and verifies body hash and
//!   header signature independently.
//!
//! [`adsp`] layers RFC 5617 author-domain policy on top of a set of
//! per-signing-domain verification outcomes, for callers that want to know
//! what a domain's publishers expect of unsigned or failed mail claiming it.
//!
//! ## Usage example
//!
//! ```
//! use dkim_auth::crypto::{DigestAlgorithm, PrivateKey, PublicKeyMaterial, SignatureAlgorithm};
//! use dkim_auth::canonicalize::Canon;
//! use dkim_auth::resolver::TxtRecord;
//! use dkim_auth::signatory::{sign, SignatoryOptions};
//! use dkim_auth::validatory::{SignatureKind, Validatory};
//!
//! let seed = [7u8; 32];
//! let private_key = PrivateKey::parse(&seed, SignatureAlgorithm::Ed25519).unwrap();
//! let public_key = match &private_key {
//!     PrivateKey::Ed25519(k) => PublicKeyMaterial::from_ed25519_private(k),
//!     _ => unreachable!(),
//! };
//!
//! let message = b"From: a@example.com\r\nSubject: hi\r\n\r\nbody\r\n";
//! let options = SignatoryOptions::new(private_key, "example.com", "s1")
//!     .header_list(vec!["from".into(), "subject".into()])
//!     .canonicalization(Canon::Relaxed, Canon::Relaxed)
//!     .digest_algorithm(DigestAlgorithm::Sha256);
//! let header = sign(message, &options).unwrap();
//!
//! let signed = [header.as_bytes(), message].concat();
//! let validatory = Validatory::new(&signed, SignatureKind::Dkim);
//! let header_record = validatory.signatures().next().unwrap().clone();
//! let sig = validatory.parse_signature(&header_record).unwrap();
//! validatory.check_body_hash(&sig).unwrap();
//!
//! let resolver = move |_: &str| -> Result<TxtRecord, dkim_auth::error::Error> {
//!     let der = match &public_key {
//!         PublicKeyMaterial::Ed25519(vk) => vk.to_bytes(),
//!         _ => unreachable!(),
//!     };
//!     let p = dkim_auth::decoders::base64::encode_base64(&der);
//!     Ok(TxtRecord::Found(format!("v=DKIM1; k=ed25519; p={p}")))
//! };
//! let key = validatory.fetch_public_key(&sig, &resolver).unwrap();
//! validatory.check_signature(&header_record, &sig, &key).unwrap();
//! ```

pub mod adsp;
pub mod address;
pub mod canonicalize;
pub mod crypto;
pub mod decoders;
pub mod encoded_word;
pub mod error;
pub mod header;
pub mod message_stream;
pub mod public_key;
pub mod resolver;
pub mod signatory;
pub mod signature;
pub mod tag_list;
pub mod validatory;
