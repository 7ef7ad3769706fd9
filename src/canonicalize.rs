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

//! Two-plane canonicalization (RFC 6376 §3.4): header normalization is a pure
//! byte-to-byte function, body normalization is a streaming state machine fed
//! into a caller-provided digest sink so the whole body never has to be
//! materialized in memory.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canon {
    Simple,
    Relaxed,
}

impl Canon {
    pub fn parse(s: &str) -> Result<Canon, Error> {
        match s {
            "simple" => Ok(Canon::Simple),
            "relaxed" => Ok(Canon::Relaxed),
            other => Err(Error::permanent(format!(
                "unknown canonicalization {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Canon::Simple => "simple",
            Canon::Relaxed => "relaxed",
        }
    }
}

/// Canonicalizes one header field's raw bytes (no trailing CRLF).
pub fn canon_header(mode: Canon, raw: &[u8]) -> Result<Vec<u8>, Error> {
    match mode {
        Canon::Simple => Ok(raw.to_vec()),
        Canon::Relaxed => canon_header_relaxed(raw),
    }
}

fn canon_header_relaxed(raw: &[u8]) -> Result<Vec<u8>, Error> {
    let colon = raw
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| Error::permanent("header has no colon"))?;

    let mut name = raw[..colon].to_ascii_lowercase();
    let mut value = unfold(&raw[colon + 1..]);
    trim_trailing_wsp(&mut value);

    // Strip WSP immediately adjacent to the separating colon.
    trim_leading_wsp(&mut value);

    name.push(b':');
    name.extend_from_slice(&value);
    Ok(name)
}

/// Collapses `CRLF WSP` sequences and runs of WSP into a single space.
fn unfold(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut pending_space = false;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                i += 2;
                pending_space = true;
            }
            b' ' | b'\t' => {
                i += 1;
                pending_space = true;
            }
            ch => {
                if pending_space {
                    out.push(b' ');
                    pending_space = false;
                }
                out.push(ch);
                i += 1;
            }
        }
    }

    out
}

fn trim_trailing_wsp(buf: &mut Vec<u8>) {
    while matches!(buf.last(), Some(b' ')) {
        buf.pop();
    }
}

fn trim_leading_wsp(buf: &mut Vec<u8>) {
    let skip = buf.iter().take_while(|&&b| b == b' ').count();
    buf.drain(..skip);
}

/// Sink that receives canonicalized body bytes. Implemented by digest
/// accumulators in real use and by `Vec<u8>` in tests.
pub trait DigestSink {
    fn update(&mut self, bytes: &[u8]);
}

impl DigestSink for Vec<u8> {
    fn update(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// How `canon_body` should treat an `l=` length cap that exceeds the true
/// canonical body length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCapPolicy {
    /// Reject outright. Used when signing (RFC 6376 §3.4): a signer must
    /// never advertise a length it cannot back with real canonical bytes.
    RejectIfExceeded,
    /// Clamp silently to whatever canonical body exists, without error. Used
    /// when verifying: an attacker-controlled `l=` larger than the real body
    /// must not short-circuit verification with a distinct parse error — it
    /// degrades to an ordinary body-hash mismatch instead.
    ClampToAvailable,
}

/// Streams `body` through the body canonicalizer identified by `mode` into
/// `sink`, one line at a time, without ever materializing the full
/// canonical body. The state carried across the stream is just three
/// values: how many pending empty lines have not yet been emitted (they are
/// dropped if the body ends before a following non-empty line), whether any
/// non-empty line has been emitted yet, and (relaxed mode only, scoped to
/// the line currently being built) whether a run of whitespace is pending a
/// single collapsed space.
///
/// `length_cap` (the `l=` tag) truncates how much canonical output is fed to
/// the sink; `cap_policy` controls what happens if it exceeds the body's
/// true canonical length.
pub fn canon_body(
    mode: Canon,
    body: &[u8],
    length_cap: Option<u64>,
    cap_policy: LengthCapPolicy,
    sink: &mut dyn DigestSink,
) -> Result<(), Error> {
    let mut emitter = CappedEmitter::new(length_cap, sink);
    stream_body(mode, body, &mut emitter);

    if cap_policy == LengthCapPolicy::RejectIfExceeded {
        if let Some(cap) = length_cap {
            if emitter.total < cap {
                return Err(Error::permanent(format!(
                    "body length cap {cap} exceeds canonical body length {}",
                    emitter.total
                )));
            }
        }
    }

    Ok(())
}

/// Forwards pushed bytes to a `DigestSink`, truncating at an optional cap
/// while still tracking the untruncated total so the caller can tell
/// whether the cap was ever exceeded.
struct CappedEmitter<'a> {
    sink: &'a mut dyn DigestSink,
    remaining: Option<u64>,
    total: u64,
}

impl<'a> CappedEmitter<'a> {
    fn new(cap: Option<u64>, sink: &'a mut dyn DigestSink) -> Self {
        CappedEmitter {
            sink,
            remaining: cap,
            total: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.total += bytes.len() as u64;
        match &mut self.remaining {
            None => self.sink.update(bytes),
            Some(r) => {
                let take = (*r).min(bytes.len() as u64) as usize;
                if take > 0 {
                    self.sink.update(&bytes[..take]);
                }
                *r -= take as u64;
            }
        }
    }
}

/// Calls `f` with each logical line of `body` (terminator stripped), in
/// order, without collecting them into a buffer first. A trailing chunk
/// with no terminator still counts as a line, matching RFC 6376's "every
/// line ends in CRLF" canonical form.
fn for_each_line<'a>(body: &'a [u8], mut f: impl FnMut(&'a [u8])) {
    let mut start = 0;
    let mut i = 0;
    while i < body.len() {
        if body[i] == b'\n' {
            let end = if i > start && body[i - 1] == b'\r' {
                i - 1
            } else {
                i
            };
            f(&body[start..end]);
            start = i + 1;
        }
        i += 1;
    }
    if start < body.len() {
        f(&body[start..]);
    }
}

fn stream_body(mode: Canon, body: &[u8], emit: &mut CappedEmitter) {
    let mut pending_empty: u64 = 0;
    let mut any_emitted = false;

    for_each_line(body, |line| {
        let transformed: std::borrow::Cow<[u8]> = match mode {
            Canon::Simple => std::borrow::Cow::Borrowed(line),
            Canon::Relaxed => std::borrow::Cow::Owned(relax_line(line)),
        };

        if transformed.is_empty() {
            pending_empty += 1;
        } else {
            for _ in 0..pending_empty {
                emit.push(b"\r\n");
            }
            pending_empty = 0;
            emit.push(&transformed);
            emit.push(b"\r\n");
            any_emitted = true;
        }
    });

    // Simple canonicalization of an empty (or all-blank) body still yields a
    // single CRLF; relaxed canonicalization of the same yields nothing.
    if mode == Canon::Simple && !any_emitted {
        emit.push(b"\r\n");
    }
}

fn relax_line(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut pending_space = false;

    for &ch in line {
        if ch == b' ' || ch == b'\t' {
            pending_space = true;
        } else {
            if pending_space {
                out.push(b' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_relaxed_lowercases_name_and_unfolds() {
        let raw = b"Subject: \r\n\thello   world  ";
        let got = canon_header(Canon::Relaxed, raw).unwrap();
        assert_eq!(got, b"subject:hello world");
    }

    #[test]
    fn header_simple_is_identity() {
        let raw = b"Subject: hello\r\n world";
        assert_eq!(canon_header(Canon::Simple, raw).unwrap(), raw);
    }

    #[test]
    fn body_simple_empty() {
        let mut sink = Vec::new();
        canon_body(Canon::Simple, b"", None, LengthCapPolicy::RejectIfExceeded, &mut sink).unwrap();
        assert_eq!(sink, b"\r\n");
    }

    #[test]
    fn body_relaxed_empty_is_zero_bytes() {
        let mut sink = Vec::new();
        canon_body(Canon::Relaxed, b"", None, LengthCapPolicy::RejectIfExceeded, &mut sink).unwrap();
        assert_eq!(sink, b"");
    }

    #[test]
    fn rfc6376_a2_relaxed_body_example() {
        let body = b" C \r\nD \t E\r\n\r\n\r\n";
        let mut sink = Vec::new();
        canon_body(
            Canon::Relaxed,
            body,
            None,
            LengthCapPolicy::RejectIfExceeded,
            &mut sink,
        )
        .unwrap();
        assert_eq!(sink, b" C\r\nD E\r\n");
    }

    #[test]
    fn body_simple_elides_trailing_empty_lines() {
        let body = b"line1\r\nline2\r\n\r\n\r\n";
        let mut sink = Vec::new();
        canon_body(
            Canon::Simple,
            body,
            None,
            LengthCapPolicy::RejectIfExceeded,
            &mut sink,
        )
        .unwrap();
        assert_eq!(sink, b"line1\r\nline2\r\n");
    }

    #[test]
    fn canon_idempotent_header() {
        let raw = b"Subject: \r\n\thello   world  ";
        let once = canon_header(Canon::Relaxed, raw).unwrap();
        let twice = canon_header(Canon::Relaxed, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn length_cap_truncates() {
        let mut sink = Vec::new();
        canon_body(
            Canon::Simple,
            b"hello\r\n",
            Some(3),
            LengthCapPolicy::RejectIfExceeded,
            &mut sink,
        )
        .unwrap();
        assert_eq!(sink, b"hel");
    }

    #[test]
    fn length_cap_beyond_body_fails_when_rejecting() {
        let mut sink = Vec::new();
        assert!(canon_body(
            Canon::Simple,
            b"hi\r\n",
            Some(100),
            LengthCapPolicy::RejectIfExceeded,
            &mut sink
        )
        .is_err());
    }

    #[test]
    fn length_cap_beyond_body_clamps_when_verifying() {
        let mut sink = Vec::new();
        canon_body(
            Canon::Simple,
            b"hi\r\n",
            Some(100),
            LengthCapPolicy::ClampToAvailable,
            &mut sink,
        )
        .unwrap();
        assert_eq!(sink, b"hi\r\n");
    }
}
