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

//! `tag-list = tag-spec *(";" tag-spec) [";"]` parser (RFC 6376 §3.2).
//!
//! Tag names are case-sensitive and duplicates are rejected outright. Every
//! value records its own byte offset (and length) within the source text,
//! because the verifier must later erase the `b=` value from the original
//! signature-header bytes without reconstructing the header from this map —
//! see [`crate::signature`].

use indexmap::IndexMap;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValue {
    pub value: String,
    /// Byte offset of `value` within the text that was parsed.
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList {
    tags: IndexMap<String, TagValue>,
}

impl TagList {
    pub fn parse(text: &str) -> Result<TagList, Error> {
        let mut tags = IndexMap::new();
        let bytes = text.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            i = skip_fws(bytes, i);
            if i >= bytes.len() {
                break;
            }

            let name_start = i;
            while i < bytes.len() && is_tag_name_char(bytes[i], i == name_start) {
                i += 1;
            }
            if i == name_start {
                return Err(Error::permanent(format!(
                    "invalid tag name at offset {name_start}"
                )));
            }
            let name = text[name_start..i].to_string();

            i = skip_fws(bytes, i);
            if bytes.get(i) != Some(&b'=') {
                return Err(Error::permanent(format!("tag {name:?} missing '='")));
            }
            i += 1;
            i = skip_fws(bytes, i);

            let value_start = i;
            while i < bytes.len() && bytes[i] != b';' {
                let b = bytes[i];
                if !(b.is_ascii_whitespace() || matches!(b, 0x21..=0x3A | 0x3C..=0x7E)) {
                    return Err(Error::permanent(format!(
                        "invalid byte {b:#04x} in value for tag {name:?} at offset {i}"
                    )));
                }
                i += 1;
            }
            let mut value_end = i;
            while value_end > value_start && bytes[value_end - 1].is_ascii_whitespace() {
                value_end -= 1;
            }
            let value = text[value_start..value_end].to_string();

            if tags
                .insert(
                    name.clone(),
                    TagValue {
                        value,
                        offset: value_start,
                    },
                )
                .is_some()
            {
                return Err(Error::permanent(format!("duplicate tag {name:?}")));
            }

            if i < bytes.len() && bytes[i] == b';' {
                i += 1;
            }
        }

        Ok(TagList { tags })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|t| t.value.as_str())
    }

    pub fn get_required(&self, name: &str) -> Result<&str, Error> {
        self.get(name)
            .ok_or_else(|| Error::permanent(format!("missing required tag {name:?}")))
    }

    pub fn offset(&self, name: &str) -> Option<usize> {
        self.tags.get(name).map(|t| t.offset)
    }

    pub fn len_of(&self, name: &str) -> Option<usize> {
        self.tags.get(name).map(|t| t.value.len())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }
}

fn is_tag_name_char(ch: u8, is_first: bool) -> bool {
    if is_first {
        ch.is_ascii_alphabetic()
    } else {
        ch.is_ascii_alphanumeric() || ch == b'_'
    }
}

fn skip_fws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Parses a colon-separated list of tokens (as used by `h=` and `t=`), with
/// folding whitespace ignored around each token. Empty tokens are rejected.
pub fn parse_colon_list(value: &str) -> Result<Vec<String>, Error> {
    value
        .split(':')
        .map(|tok| {
            let tok = tok.trim();
            if tok.is_empty() {
                Err(Error::permanent("empty token in colon-separated list"))
            } else {
                Ok(tok.to_string())
            }
        })
        .collect()
}
