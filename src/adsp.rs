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

//! Author-domain signing practices (RFC 5617), evaluated after DKIM
//! verification has already produced a per-signature-domain outcome.
//!
//! Unlike [`crate::error::Error`], this module never raises an error: every
//! naming-service failure, parse failure or absent record becomes one of the
//! [`AdspOutcome`] variants instead, because a caller rendering an
//! `Authentication-Results` header needs a tag for every author-domain, not a
//! `Result` to unwrap.

use crate::address::{address_domain, parse_address_list};
use crate::encoded_word::decode_rfc2047;
use crate::error::Error;
use crate::header::Message;
use crate::resolver::{Resolver, TxtRecord};
use crate::tag_list::TagList;

/// Whether a DKIM signature binding a given `d=` domain verified.
///
/// This is the input ADSP correlates against: the caller runs
/// [`crate::validatory::Validatory`] over every signature on the message
/// first and reduces each to one of these three outcomes per `d=` domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// Body hash and header signature both verified.
    Success,
    /// The resolver returned a transient error while fetching the key.
    TempFail,
    /// Any other failure (parse error, permanent key error, verify mismatch).
    Other,
}

/// RFC 5617 §4.3 policy outcome for one author-domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdspOutcome {
    /// No ADSP record was published (empty TXT answer).
    None,
    /// A successful signature bound this author-domain.
    Pass,
    /// A record exists but does not assert `dkim=all` or `dkim=discardable`.
    Unknown,
    /// `dkim=all`: unsigned mail claiming this domain should be treated with
    /// suspicion.
    Fail,
    /// `dkim=discardable`: unsigned mail claiming this domain should be
    /// discarded outright.
    Discard,
    /// The domain name itself does not exist.
    NxDomain,
    /// Only a temporary-failure signature matched, or the resolver failed
    /// transiently.
    TempError,
    /// The resolver failed permanently, or the record could not be parsed.
    PermError,
}

impl AdspOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdspOutcome::None => "none",
            AdspOutcome::Pass => "pass",
            AdspOutcome::Unknown => "unknown",
            AdspOutcome::Fail => "fail",
            AdspOutcome::Discard => "discard",
            AdspOutcome::NxDomain => "nxdomain",
            AdspOutcome::TempError => "temperror",
            AdspOutcome::PermError => "permerror",
        }
    }
}

/// One author-domain's ADSP evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdspResult {
    pub domain: String,
    pub result: AdspOutcome,
    pub reason: String,
}

/// Extracts the distinct author-domains from every `From` header on
/// `message`, in first-seen order: RFC 2047-decodes the field value, then
/// parses it as an RFC 5322 address list and takes the domain part of every
/// mailbox.
pub fn author_domains(message: &Message<'_>) -> Vec<String> {
    let mut domains = Vec::new();
    for header in message.headers_named("From") {
        let decoded = decode_rfc2047(&header.value(message.data));
        for addr in parse_address_list(&decoded) {
            if let Some(domain) = address_domain(&addr) {
                if !domains.contains(&domain) {
                    domains.push(domain);
                }
            }
        }
    }
    domains
}

/// Evaluates ADSP for every author-domain found on `message`, given the
/// per-signing-domain DKIM outcomes already computed by the caller.
///
/// `signature_outcomes` need not cover every author-domain and may list a
/// domain more than once (e.g. dual signing); a domain counts as verified if
/// any entry for it is [`SignatureOutcome::Success`].
pub fn evaluate(
    message: &Message<'_>,
    signature_outcomes: &[(String, SignatureOutcome)],
    resolver: &dyn Resolver,
) -> Vec<AdspResult> {
    author_domains(message)
        .into_iter()
        .map(|domain| evaluate_one(&domain, signature_outcomes, resolver))
        .collect()
}

fn evaluate_one(
    domain: &str,
    signature_outcomes: &[(String, SignatureOutcome)],
    resolver: &dyn Resolver,
) -> AdspResult {
    let matching = || signature_outcomes.iter().filter(|(d, _)| d.eq_ignore_ascii_case(domain));

    if matching().any(|(_, o)| *o == SignatureOutcome::Success) {
        return AdspResult {
            domain: domain.to_string(),
            result: AdspOutcome::Pass,
            reason: "a signature bound to this author-domain verified".to_string(),
        };
    }

    let had_tempfail = matching().any(|(_, o)| *o == SignatureOutcome::TempFail);
    let had_match = matching().next().is_some();
    if had_match && had_tempfail {
        return AdspResult {
            domain: domain.to_string(),
            result: AdspOutcome::TempError,
            reason: "only a temporary-failure signature matched this author-domain".to_string(),
        };
    }

    query_policy(domain, resolver)
}

fn query_policy(domain: &str, resolver: &dyn Resolver) -> AdspResult {
    let name = format!("_adsp._domainkey.{domain}");
    match resolver.lookup_txt(&name) {
        Ok(TxtRecord::Found(txt)) => {
            tracing::debug!(query = %name, "resolved adsp record");
            match TagList::parse(&txt) {
                Ok(tags) => {
                    let (result, reason) = match tags.get("dkim") {
                        Some("all") => (AdspOutcome::Fail, "dkim=all"),
                        Some("discardable") => (AdspOutcome::Discard, "dkim=discardable"),
                        _ => (AdspOutcome::Unknown, "dkim= absent or unrecognized"),
                    };
                    AdspResult {
                        domain: domain.to_string(),
                        result,
                        reason: reason.to_string(),
                    }
                }
                Err(_) => AdspResult {
                    domain: domain.to_string(),
                    result: AdspOutcome::Unknown,
                    reason: "adsp record is not a well-formed tag-list".to_string(),
                },
            }
        }
        Ok(TxtRecord::NoRecords) => AdspResult {
            domain: domain.to_string(),
            result: AdspOutcome::None,
            reason: "no adsp record published".to_string(),
        },
        Ok(TxtRecord::NxDomain) => AdspResult {
            domain: domain.to_string(),
            result: AdspOutcome::NxDomain,
            reason: "author-domain does not exist".to_string(),
        },
        Err(e) => {
            tracing::debug!(query = %name, error = %e, "adsp lookup failed");
            let result = match e {
                Error::Transient { .. } => AdspOutcome::TempError,
                Error::Permanent { .. } => AdspOutcome::PermError,
            };
            AdspResult {
                domain: domain.to_string(),
                result,
                reason: e.reason().to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(from: &str) -> Vec<u8> {
        format!("From: {from}\r\nSubject: hi\r\n\r\nbody\r\n").into_bytes()
    }

    #[test]
    fn extracts_author_domain() {
        let raw = message("Art Vandelay <art@example.com>");
        let msg = Message::parse(&raw);
        assert_eq!(author_domains(&msg), vec!["example.com"]);
    }

    #[test]
    fn no_signature_and_dkim_all_yields_fail() {
        let raw = message("x@example.net");
        let msg = Message::parse(&raw);
        let resolver = |name: &str| -> Result<TxtRecord, Error> {
            if name == "_adsp._domainkey.example.net" {
                Ok(TxtRecord::Found("dkim=all".to_string()))
            } else {
                Ok(TxtRecord::NxDomain)
            }
        };
        let results = evaluate(&msg, &[], &resolver);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].domain, "example.net");
        assert_eq!(results[0].result, AdspOutcome::Fail);
    }

    #[test]
    fn successful_signature_short_circuits_dns_query() {
        let raw = message("x@example.net");
        let msg = Message::parse(&raw);
        let resolver = |_: &str| -> Result<TxtRecord, Error> {
            panic!("resolver should not be queried when a signature already passed")
        };
        let outcomes = vec![("example.net".to_string(), SignatureOutcome::Success)];
        let results = evaluate(&msg, &outcomes, &resolver);
        assert_eq!(results[0].result, AdspOutcome::Pass);
    }

    #[test]
    fn tempfail_only_short_circuits_to_temperror() {
        let raw = message("x@example.net");
        let msg = Message::parse(&raw);
        let resolver = |_: &str| -> Result<TxtRecord, Error> {
            panic!("resolver should not be queried when only a tempfail matched")
        };
        let outcomes = vec![("example.net".to_string(), SignatureOutcome::TempFail)];
        let results = evaluate(&msg, &outcomes, &resolver);
        assert_eq!(results[0].result, AdspOutcome::TempError);
    }

    #[test]
    fn absent_record_is_none() {
        let raw = message("x@example.net");
        let msg = Message::parse(&raw);
        let resolver = |_: &str| -> Result<TxtRecord, Error> { Ok(TxtRecord::NoRecords) };
        let results = evaluate(&msg, &[], &resolver);
        assert_eq!(results[0].result, AdspOutcome::None);
    }

    #[test]
    fn unrecognized_dkim_tag_is_unknown() {
        let raw = message("x@example.net");
        let msg = Message::parse(&raw);
        let resolver = |_: &str| -> Result<TxtRecord, Error> {
            Ok(TxtRecord::Found("dkim=unknown; t=y".to_string()))
        };
        let results = evaluate(&msg, &[], &resolver);
        assert_eq!(results[0].result, AdspOutcome::Unknown);
    }

    #[test]
    fn resolver_transient_error_propagates_as_temperror() {
        let raw = message("x@example.net");
        let msg = Message::parse(&raw);
        let resolver = |_: &str| -> Result<TxtRecord, Error> { Err(Error::transient("dns timeout")) };
        let results = evaluate(&msg, &[], &resolver);
        assert_eq!(results[0].result, AdspOutcome::TempError);
    }
}
