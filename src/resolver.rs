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

//! Pluggable naming-service lookup.
//!
//! Signing never needs this; verification and ADSP resolve two kinds of
//! record, both TXT: `<selector>._domainkey.<domain>` and
//! `_adsp._domainkey.<domain>`. The trait is deliberately narrow — one
//! method, one outcome type — so a test double is a three-line closure and
//! the default implementation is a thin wrapper over the system resolver.

use crate::error::Error;

/// Outcome of a single TXT-record lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxtRecord {
    /// The name exists and carries at least one TXT record. Multiple answer
    /// records are joined with a single space; the character-strings within
    /// one record are concatenated with no separator.
    Found(String),
    /// The name exists but carries no TXT data.
    NoRecords,
    /// The name does not exist at all (NXDOMAIN).
    NxDomain,
}

/// A naming-service TXT lookup, injected into [`crate::validatory::Validatory`]
/// and [`crate::adsp`]. Implement this directly for a test double, or enable
/// the `resolver` feature for [`SystemResolver`].
pub trait Resolver {
    fn lookup_txt(&self, name: &str) -> Result<TxtRecord, Error>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Result<TxtRecord, Error>,
{
    fn lookup_txt(&self, name: &str) -> Result<TxtRecord, Error> {
        self(name)
    }
}

#[cfg(feature = "resolver")]
pub use system::SystemResolver;

#[cfg(feature = "resolver")]
mod system {
    use super::{Resolver, TxtRecord};
    use crate::error::Error;
    use trust_dns_resolver::error::ResolveErrorKind;
    use trust_dns_resolver::proto::op::ResponseCode;
    use trust_dns_resolver::proto::rr::rdata::txt::TXT;
    use trust_dns_resolver::Resolver as DnsResolver;

    /// Default [`Resolver`] backed by the operating system's stub resolver.
    pub struct SystemResolver {
        inner: DnsResolver,
    }

    impl SystemResolver {
        pub fn new() -> Result<SystemResolver, Error> {
            let inner = DnsResolver::from_system_conf()
                .map_err(|e| Error::transient(format!("failed to read system resolver config: {e}")))?;
            Ok(SystemResolver { inner })
        }
    }

    impl Resolver for SystemResolver {
        fn lookup_txt(&self, name: &str) -> Result<TxtRecord, Error> {
            match self.inner.txt_lookup(name) {
                Ok(lookup) => {
                    let records: Vec<String> = lookup.iter().map(join_character_strings).collect();
                    if records.is_empty() {
                        Ok(TxtRecord::NoRecords)
                    } else {
                        Ok(TxtRecord::Found(records.join(" ")))
                    }
                }
                Err(e) => match e.kind() {
                    ResolveErrorKind::NoRecordsFound { response_code, .. } => {
                        if *response_code == ResponseCode::NXDomain {
                            Ok(TxtRecord::NxDomain)
                        } else {
                            Ok(TxtRecord::NoRecords)
                        }
                    }
                    _ => Err(Error::transient(format!("DNS lookup for {name} failed: {e}"))),
                },
            }
        }
    }

    fn join_character_strings(txt: &TXT) -> String {
        txt.txt_data()
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk))
            .collect::<Vec<_>>()
            .concat()
    }
}
