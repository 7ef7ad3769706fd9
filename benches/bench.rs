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

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dkim_auth::canonicalize::Canon;
use dkim_auth::crypto::{DigestAlgorithm, PrivateKey};
use dkim_auth::resolver::TxtRecord;
use dkim_auth::signatory::{sign, SignatoryOptions};
use dkim_auth::validatory::{SignatureKind, Validatory};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;

const TEST_RSA_PEM: &str = include_str!("../tests/data/rsa_test_key.pem");

const MESSAGE: &[u8] = b"From: Art Vandelay <art@example.com>\r\n\
Subject: benchmarking dkim-auth\r\n\
To: kramer@example.net\r\n\
Date: Mon, 1 Jan 2024 00:00:00 +0000\r\n\
\r\n\
The quick brown fox jumps over the lazy dog.\r\n\
This body repeats a few times to give canonicalization something to do.\r\n\
The quick brown fox jumps over the lazy dog.\r\n\
This body repeats a few times to give canonicalization something to do.\r\n";

fn rsa_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(TEST_RSA_PEM).unwrap()
}

fn sign_rsa_bench(c: &mut Criterion) {
    c.bench_function("sign_rsa_sha256_relaxed", |b| {
        b.iter(|| {
            let options = SignatoryOptions::new(PrivateKey::Rsa(rsa_key()), "example.com", "s1")
                .canonicalization(Canon::Relaxed, Canon::Relaxed)
                .digest_algorithm(DigestAlgorithm::Sha256);
            black_box(sign(black_box(MESSAGE), &options).unwrap())
        })
    });
}

fn verify_rsa_bench(c: &mut Criterion) {
    let key = rsa_key();
    let public_der = {
        use rsa::pkcs8::EncodePublicKey;
        key.to_public_key().to_public_key_der().unwrap()
    };
    let p = dkim_auth::decoders::base64::encode_base64(public_der.as_bytes());
    let record = format!("v=DKIM1; p={p}");

    let options = SignatoryOptions::new(PrivateKey::Rsa(key), "example.com", "s1")
        .canonicalization(Canon::Relaxed, Canon::Relaxed)
        .digest_algorithm(DigestAlgorithm::Sha256);
    let header_text = sign(MESSAGE, &options).unwrap();
    let signed_message = [header_text.as_bytes(), MESSAGE].concat();

    let resolver = move |_: &str| -> Result<TxtRecord, dkim_auth::error::Error> {
        Ok(TxtRecord::Found(record.clone()))
    };

    c.bench_function("verify_rsa_sha256_relaxed", |b| {
        b.iter(|| {
            let validatory = Validatory::new(black_box(&signed_message), SignatureKind::Dkim);
            let header = validatory.signatures().next().unwrap().clone();
            let sig = validatory.parse_signature(&header).unwrap();
            validatory.check_body_hash(&sig).unwrap();
            let key = validatory.fetch_public_key(&sig, &resolver).unwrap();
            validatory.check_signature(&header, &sig, &key).unwrap();
        })
    });
}

criterion_group!(benches, sign_rsa_bench, verify_rsa_bench);
criterion_main!(benches);
