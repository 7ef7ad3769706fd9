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

//! Error taxonomy shared by signing, verification and policy resolution.
//!
//! Every fallible operation in this crate returns [`Result<T, Error>`](Result). `Error` has
//! exactly two shapes, distinguished by whether a retry could plausibly change the
//! outcome: [`Error::Permanent`] (malformed input, crypto mismatch, revoked key) and
//! [`Error::Transient`] (naming-service failure). Both carry an [`AuthResult`]
//! classification so callers can render an `Authentication-Results` tag without
//! re-deriving it from the reason string.

use std::fmt;

/// Closed set of authentication-result classifications.
///
/// Mirrors the tags used in `Authentication-Results` headers (RFC 8601) for the
/// subset this crate produces verdicts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthResult {
    /// No signature was present to evaluate.
    None,
    /// Verification succeeded.
    Pass,
    /// A signature was present and syntactically valid but did not verify.
    Fail,
    /// A local policy decision, not part of DKIM proper (used by ADSP `discard`).
    Policy,
    /// The outcome is inconclusive and should not be treated as a failure.
    Neutral,
    /// A transient condition, most often a naming-service failure; retry later.
    TempError,
    /// A permanent, non-retryable error (malformed input, unsupported algorithm).
    PermError,
}

impl fmt::Display for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthResult::None => "none",
            AuthResult::Pass => "pass",
            AuthResult::Fail => "fail",
            AuthResult::Policy => "policy",
            AuthResult::Neutral => "neutral",
            AuthResult::TempError => "temperror",
            AuthResult::PermError => "permerror",
        })
    }
}

/// Error type returned by every fallible operation in this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Not retryable: malformed input, unsupported algorithm, revoked key, verify
    /// mismatch, expired signature.
    #[error("{reason}")]
    Permanent {
        reason: String,
        class: AuthResult,
    },
    /// Retryable: naming-service failure or other transient resource exhaustion.
    #[error("{reason}")]
    Transient {
        reason: String,
        class: AuthResult,
    },
}

impl Error {
    pub fn permanent(reason: impl Into<String>) -> Self {
        Error::Permanent {
            reason: reason.into(),
            class: AuthResult::PermError,
        }
    }

    pub fn permanent_as(reason: impl Into<String>, class: AuthResult) -> Self {
        Error::Permanent {
            reason: reason.into(),
            class,
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Error::Transient {
            reason: reason.into(),
            class: AuthResult::TempError,
        }
    }

    /// The classification to surface in an `Authentication-Results` header.
    pub fn class(&self) -> AuthResult {
        match self {
            Error::Permanent { class, .. } => *class,
            Error::Transient { class, .. } => *class,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Error::Permanent { reason, .. } => reason,
            Error::Transient { reason, .. } => reason,
        }
    }

    /// Downgrades this error's classification to [`AuthResult::Neutral`],
    /// keeping the reason and the permanent/transient shape. Used when a
    /// verification failure occurs under a key published with the `t=y`
    /// "testing" flag (RFC 6376 §3.6.1): the failure is still reported, but
    /// must not be rendered as `fail` or `permerror`.
    pub fn soften_to_neutral(self) -> Error {
        match self {
            Error::Permanent { reason, .. } => Error::Permanent {
                reason,
                class: AuthResult::Neutral,
            },
            Error::Transient { reason, .. } => Error::Transient {
                reason,
                class: AuthResult::Neutral,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
