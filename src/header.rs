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

//! Streaming RFC 5322 header unfolder.
//!
//! Records each header field's raw byte range (including internal folds, but
//! not the terminating CRLF) and the byte offset just past the separating
//! colon, so downstream canonicalization and the surgical `b=` erasure in
//! [`crate::tag_list`] can slice the original message bytes directly instead
//! of re-serializing anything.

use crate::message_stream::MessageStream;

#[derive(Debug, Clone)]
pub struct HeaderRecord<'x> {
    pub name: &'x str,
    /// Byte range of the full header (name, colon and folded value), relative
    /// to the original message bytes. Does not include the terminating CRLF.
    pub raw_range: (usize, usize),
    /// Byte offset, within the message, of the first byte after the colon.
    pub value_offset: usize,
}

impl<'x> HeaderRecord<'x> {
    pub fn raw(&self, message: &'x [u8]) -> &'x [u8] {
        &message[self.raw_range.0..self.raw_range.1]
    }

    pub fn value(&self, message: &'x [u8]) -> std::borrow::Cow<'x, str> {
        String::from_utf8_lossy(&message[self.value_offset..self.raw_range.1])
    }

    pub fn name_eq_ignore_ascii_case(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

pub struct Message<'x> {
    pub data: &'x [u8],
    pub headers: Vec<HeaderRecord<'x>>,
    /// Byte offset of the first body byte, or `data.len()` if the message has
    /// no body separator (so the body canonicalizes as empty).
    pub body_offset: usize,
}

impl<'x> Message<'x> {
    /// Parses the header block of `data`. Lines are terminated by `LF`, with
    /// an optional trailing `CR` stripped; a line starting with SP or HTAB
    /// continues the previous header. The first empty line ends the header
    /// block; end-of-input before an empty line yields a bodyless message.
    pub fn parse(data: &'x [u8]) -> Message<'x> {
        let stream = MessageStream::new(data);
        let mut headers = Vec::new();

        let mut current_start: Option<usize> = None;
        let mut current_value_offset = 0usize;
        let mut current_end = 0usize;
        let mut body_offset = data.len();
        let mut found_body = false;

        loop {
            let line_start = stream.get_pos();
            let line = match stream.next_line() {
                Some(l) => l,
                None => break,
            };

            if line.is_empty() {
                if let Some(start) = current_start.take() {
                    headers.push(HeaderRecord {
                        name: header_name(data, start),
                        raw_range: (start, current_end),
                        value_offset: current_value_offset,
                    });
                }
                body_offset = stream.get_pos();
                found_body = true;
                break;
            }

            let is_continuation = matches!(line.first(), Some(b' ') | Some(b'\t'));
            let line_end = line_start + line.len();

            if is_continuation && current_start.is_some() {
                current_end = line_end;
            } else {
                if let Some(start) = current_start.take() {
                    headers.push(HeaderRecord {
                        name: header_name(data, start),
                        raw_range: (start, current_end),
                        value_offset: current_value_offset,
                    });
                }
                current_start = Some(line_start);
                current_end = line_end;
                current_value_offset = match line.iter().position(|&b| b == b':') {
                    Some(colon) => line_start + colon + 1,
                    None => line_end,
                };
            }
        }

        if !found_body {
            if let Some(start) = current_start.take() {
                headers.push(HeaderRecord {
                    name: header_name(data, start),
                    raw_range: (start, current_end),
                    value_offset: current_value_offset,
                });
            }
        }

        Message {
            data,
            headers,
            body_offset,
        }
    }

    /// All headers with the given (case-insensitive) name, in source order.
    pub fn headers_named(&self, name: &str) -> impl Iterator<Item = &HeaderRecord<'x>> {
        self.headers
            .iter()
            .filter(move |h| h.name_eq_ignore_ascii_case(name))
    }

    pub fn body(&self) -> &'x [u8] {
        &self.data[self.body_offset..]
    }
}

fn header_name(data: &[u8], start: usize) -> &str {
    let rest = &data[start..];
    let end = rest.iter().position(|&b| b == b':').unwrap_or(rest.len());
    let name = rest[..end].trim_ascii();
    std::str::from_utf8(name).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::Message;

    #[test]
    fn parses_simple_message() {
        let msg = Message::parse(b"From: a@example.com\r\nSubject: hi\r\n\r\nbody\r\n");
        assert_eq!(msg.headers.len(), 2);
        assert_eq!(msg.headers[0].name, "From");
        assert_eq!(msg.headers[1].name, "Subject");
        assert_eq!(msg.body(), b"body\r\n");
    }

    #[test]
    fn folds_continuation_lines() {
        let msg = Message::parse(b"Subject: hello\r\n world\r\n\r\nbody");
        assert_eq!(msg.headers.len(), 1);
        assert_eq!(msg.headers[0].raw(msg.data), b"Subject: hello\r\n world");
    }

    #[test]
    fn no_body_separator_yields_empty_body() {
        let msg = Message::parse(b"Subject: hi\r\n");
        assert_eq!(msg.body(), b"");
        assert_eq!(msg.headers.len(), 1);
    }

    #[test]
    fn preserves_duplicate_headers_in_order() {
        let msg = Message::parse(b"A: 1\r\nA: 2\r\n\r\n");
        let names: Vec<_> = msg.headers_named("a").map(|h| h.value(msg.data)).collect();
        assert_eq!(names.len(), 2);
    }
}
