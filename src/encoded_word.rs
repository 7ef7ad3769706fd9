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

//! RFC 2047 `=?charset?encoding?data?=` decoder, used only to extract plain-text
//! mailbox names out of a `From` header before RFC 5322 address-list parsing.
//!
//! This crate only needs the decoded text for domain-extraction purposes, so,
//! unlike a full MIME parser, no charset table is applied beyond UTF-8/ASCII:
//! any byte sequence that isn't valid UTF-8 is replaced per
//! [`String::from_utf8_lossy`].

use crate::decoders::base64::decode_base64_word;
use crate::decoders::quoted_printable::decode_quoted_printable_word;

#[derive(PartialEq)]
enum State {
    Init,
    Charset,
    Encoding,
    Data,
}

/// Decodes every encoded word in `text`, passing non-encoded runs through
/// verbatim. Adjacent encoded words separated only by folding whitespace are
/// joined without the intervening whitespace, per RFC 2047 §6.2.
pub fn decode_rfc2047(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut last_was_encoded_word = false;

    while i < bytes.len() {
        if bytes[i] == b'=' && bytes.get(i + 1) == Some(&b'?') {
            if let Some((consumed, decoded)) = try_decode_word(&bytes[i..]) {
                out.extend_from_slice(&decoded);
                i += consumed;
                last_was_encoded_word = true;
                continue;
            }
        }

        if bytes[i].is_ascii_whitespace() && last_was_encoded_word {
            // Peek past the whitespace run for another encoded word; if found,
            // swallow the whitespace instead of emitting it.
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j + 1 < bytes.len() && bytes[j] == b'=' && bytes[j + 1] == b'?' {
                i = j;
                continue;
            }
        }

        last_was_encoded_word = false;
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Attempts to parse and decode one `=?charset?enc?data?=` token starting at
/// the head of `bytes` (which must begin with `=?`). Returns the number of
/// input bytes consumed and the decoded bytes, or `None` if malformed.
fn try_decode_word(bytes: &[u8]) -> Option<(usize, Vec<u8>)> {
    let mut state = State::Init;
    let mut pos = 0usize;
    let mut encoding = 0u8;

    while pos < bytes.len() {
        let ch = bytes[pos];
        match state {
            State::Init => {
                if ch != b'=' {
                    return None;
                }
                state = State::Charset;
                pos += 1;
                if bytes.get(pos) != Some(&b'?') {
                    return None;
                }
                pos += 1;
            }
            State::Charset => {
                if ch == b'?' {
                    state = State::Encoding;
                }
                pos += 1;
            }
            State::Encoding => {
                encoding = ch.to_ascii_lowercase();
                pos += 1;
                if bytes.get(pos) != Some(&b'?') {
                    return None;
                }
                pos += 1;
                state = State::Data;
            }
            State::Data => {
                let rest = &bytes[pos..];
                let (consumed, decoded) = match encoding {
                    b'b' => decode_base64_word(rest),
                    b'q' => decode_quoted_printable_word(rest)?,
                    _ => return None,
                };
                if consumed == usize::MAX {
                    return None;
                }
                return Some((pos + consumed, decoded));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::decode_rfc2047;

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(decode_rfc2047("John Doe"), "John Doe");
    }

    #[test]
    fn single_encoded_word_q() {
        assert_eq!(
            decode_rfc2047("=?iso-8859-1?q?Andr=E9?= <andre@example.com>"),
            "Andr\u{e9} <andre@example.com>"
        );
    }

    #[test]
    fn single_encoded_word_b() {
        assert_eq!(decode_rfc2047("=?utf-8?B?VGVzdA==?="), "Test");
    }

    #[test]
    fn adjacent_encoded_words_collapse_whitespace() {
        assert_eq!(
            decode_rfc2047("=?utf-8?q?Hello=2C?= =?utf-8?q?_World?="),
            "Hello, World"
        );
    }

    #[test]
    fn malformed_word_is_passed_through() {
        assert_eq!(decode_rfc2047("=?broken"), "=?broken");
    }
}
