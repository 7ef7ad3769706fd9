#![no_main]
use libfuzzer_sys::fuzz_target;

use dkim_auth::address::parse_address_list;
use dkim_auth::canonicalize::{canon_body, canon_header, Canon, LengthCapPolicy};
use dkim_auth::encoded_word::decode_rfc2047;
use dkim_auth::header::Message;
use dkim_auth::public_key::PublicKeyRecord;
use dkim_auth::signature::SignatureRecord;
use dkim_auth::tag_list::TagList;

fuzz_target!(|data: &[u8]| {
    // Fuzz the header parser and, for every header found, both
    // canonicalizations and the DKIM/ARC signature tag-list grammar.
    let message = Message::parse(data);
    for header in &message.headers {
        let raw = header.raw(message.data);
        let _ = canon_header(Canon::Simple, raw);
        let _ = canon_header(Canon::Relaxed, raw);

        if header.name.eq_ignore_ascii_case("DKIM-Signature") {
            let _ = SignatureRecord::parse(header, message.data, false);
        }
        if header.name.eq_ignore_ascii_case("ARC-Message-Signature") {
            let _ = SignatureRecord::parse(header, message.data, true);
        }
    }

    let mut sink = Vec::new();
    let _ = canon_body(
        Canon::Simple,
        message.body(),
        None,
        LengthCapPolicy::ClampToAvailable,
        &mut sink,
    );
    sink.clear();
    let _ = canon_body(
        Canon::Relaxed,
        message.body(),
        None,
        LengthCapPolicy::ClampToAvailable,
        &mut sink,
    );

    // Fuzz the tag-list grammar and public-key record parser directly against
    // the raw bytes interpreted as text.
    let text = String::from_utf8_lossy(data);
    let _ = TagList::parse(&text);
    let _ = PublicKeyRecord::parse(&text);

    // Fuzz RFC 2047 encoded words and RFC 5322 address-list parsing.
    let decoded = decode_rfc2047(&text);
    let _ = parse_address_list(&decoded);
});
