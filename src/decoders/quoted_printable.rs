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

//! Quoted-printable decoding, used for RFC 2047 encoded words and the
//! quoted-printable-encoded `i=` identity tag.

#[derive(PartialEq, Debug)]
enum QuotedPrintableState {
    None,
    Eq,
    Hex1,
}

/// Decodes a standalone quoted-printable byte run (no soft line breaks expected
/// beyond `=\r\n`/`=\n`), as used for the `i=` tag value.
pub fn quoted_printable_decode(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut buf = Vec::with_capacity(bytes.len());
    let mut state = QuotedPrintableState::None;
    let mut hex1 = 0i8;

    let mut iter = bytes.iter().peekable();
    while let Some(&ch) = iter.next() {
        match ch {
            b'=' => {
                if state != QuotedPrintableState::None {
                    return None;
                }
                match iter.peek() {
                    Some(b'\r') => {
                        iter.next();
                        if iter.next() != Some(&b'\n') {
                            return None;
                        }
                    }
                    Some(b'\n') => {
                        iter.next();
                    }
                    _ => state = QuotedPrintableState::Eq,
                }
            }
            _ => match state {
                QuotedPrintableState::None => buf.push(ch),
                QuotedPrintableState::Eq => {
                    hex1 = HEX_MAP[ch as usize];
                    if hex1 != -1 {
                        state = QuotedPrintableState::Hex1;
                    } else {
                        return None;
                    }
                }
                QuotedPrintableState::Hex1 => {
                    let hex2 = HEX_MAP[ch as usize];
                    state = QuotedPrintableState::None;
                    if hex2 != -1 {
                        buf.push(((hex1 as u8) << 4) | hex2 as u8);
                    } else {
                        return None;
                    }
                }
            },
        }
    }

    if state == QuotedPrintableState::None {
        buf.into()
    } else {
        None
    }
}

/// Decodes the `Q`-encoding form of an RFC 2047 encoded word (`_` maps to a
/// literal space), consuming up to and including the closing `?=`. Returns
/// `None` if the closing delimiter is never found.
pub fn decode_quoted_printable_word(bytes: &[u8]) -> Option<(usize, Vec<u8>)> {
    let mut buf = Vec::with_capacity(64);
    let mut state = QuotedPrintableState::None;
    let mut hex1 = 0i8;
    let mut iter = bytes.iter().enumerate();

    while let Some((i, &ch)) = iter.next() {
        match ch {
            b'=' => {
                if state == QuotedPrintableState::None {
                    state = QuotedPrintableState::Eq
                } else {
                    return None;
                }
            }
            b'?' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    return Some((i + 2, buf));
                } else {
                    buf.push(b'?');
                }
            }
            b'\n' => {
                // RFC 2047 encoded words never legitimately fold mid-word; treat
                // a literal newline as end of input.
                if !matches!(bytes.get(i + 1), Some(b' ' | b'\t')) {
                    return None;
                }
            }
            b'_' => buf.push(b' '),
            b'\r' => (),
            _ => match state {
                QuotedPrintableState::None => buf.push(ch),
                QuotedPrintableState::Eq => {
                    hex1 = HEX_MAP[ch as usize];
                    if hex1 != -1 {
                        state = QuotedPrintableState::Hex1;
                    } else {
                        return None;
                    }
                }
                QuotedPrintableState::Hex1 => {
                    let hex2 = HEX_MAP[ch as usize];
                    state = QuotedPrintableState::None;
                    if hex2 != -1 {
                        buf.push(((hex1 as u8) << 4) | hex2 as u8);
                    } else {
                        return None;
                    }
                }
            },
        }
    }

    None
}

/// Encodes `value` for use as a tag-list value, per RFC 6376 §2.11's
/// `dkim-quoted-printable`: every byte that isn't a printable, non-semicolon
/// ASCII character not participating in FWS is escaped as `=XX`.
pub fn quoted_printable_encode_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        let safe = matches!(b, 0x21..=0x3a | 0x3c..=0x7e) && b != b'=';
        if safe {
            out.push(b as char);
        } else {
            out.push_str(&format!("={b:02X}"));
        }
    }
    out
}

/*
 * Adapted from Daniel Lemire's source:
 * https://github.com/lemire/Code-used-on-Daniel-Lemire-s-blog/blob/master/2019/04/17/hexparse.cpp
 *
 */

pub static HEX_MAP: &[i8] = &[
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, -1, -1, -1, -1, -1, -1, -1, 10, 11, 12, 13, 14, 15, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, 10,
    11, 12, 13, 14, 15, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
];

#[cfg(test)]
mod tests {
    use super::{decode_quoted_printable_word, quoted_printable_decode, quoted_printable_encode_tag_value};

    #[test]
    fn decode_quoted_printable_basic() {
        for (encoded_str, expected_result) in [
            ("=E2=80=94Antoine de Saint-Exup=C3=A9ry", "\u{2014}Antoine de Saint-Exup\u{e9}ry"),
            ("no escapes here", "no escapes here"),
            ("soft=\r\nbreak", "softbreak"),
        ] {
            assert_eq!(
                String::from_utf8(quoted_printable_decode(encoded_str.as_bytes()).unwrap())
                    .unwrap(),
                expected_result,
            );
        }
        assert_eq!(quoted_printable_decode(b"=XX"), None);
    }

    #[test]
    fn decode_quoted_printable_word_basic() {
        for (encoded_str, expected_result) in [
            ("this=20is=20some=20text?=", "this is some text"),
            ("Keith_Moore?=", "Keith Moore"),
            ("????????=", "???????"),
        ] {
            let (_, result) = decode_quoted_printable_word(encoded_str.as_bytes()).unwrap();
            assert_eq!(result, expected_result.as_bytes());
        }
        assert!(decode_quoted_printable_word(b"=AX?=").is_none());
    }

    #[test]
    fn encode_escapes_semicolon_and_equals() {
        assert_eq!(quoted_printable_encode_tag_value("a;b=c"), "a=3Bb=3Dc");
    }

    #[test]
    fn encode_round_trips_through_decoder() {
        let original = "user@sub.example.com;weird=value";
        let encoded = quoted_printable_encode_tag_value(original);
        let decoded = quoted_printable_decode(encoded.as_bytes()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), original);
    }
}
