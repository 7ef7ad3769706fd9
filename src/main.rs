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

//! Illustrative CLI driver over the `dkim_auth` library: reads a message
//! from stdin, and either signs it (printing the new header followed by the
//! original message) or validates every signature header already present.
//!
//! This binary is not part of the library's public contract; embedders
//! wanting programmatic control should depend on the `dkim-auth` crate
//! directly rather than shelling out to this.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dkim_auth::canonicalize::Canon;
use dkim_auth::crypto::{DigestAlgorithm, PrivateKey, SignatureAlgorithm};
use dkim_auth::error::{AuthResult, Error};
use dkim_auth::header::HeaderRecord;
use dkim_auth::resolver::{Resolver, SystemResolver};
use dkim_auth::signatory::{sign, SignatoryOptions};
use dkim_auth::validatory::{SignatureKind, Validatory};

#[derive(Parser, Debug)]
#[command(name = "dkim-auth", version, about = "Sign or verify DKIM/ARC signatures on a message read from stdin")]
struct Cli {
    /// Produce a new signature header and print it followed by the original message.
    #[arg(long)]
    sign: bool,

    /// Verify every signature header already present on the message.
    #[arg(long)]
    validate: bool,

    /// Selector (the `s=` tag). Required with --sign.
    #[arg(long)]
    selector: Option<String>,

    /// Signing domain (the `d=` tag). Required with --sign.
    #[arg(long)]
    domain: Option<String>,

    /// Path to the private key used for --sign.
    #[arg(long)]
    keyfile: Option<PathBuf>,

    /// Key type used for --sign.
    #[arg(long, value_enum, default_value_t = KeyType::Rsa)]
    keytype: KeyType,

    /// Emit an ARC-Message-Signature instead of a DKIM-Signature.
    #[arg(long)]
    arc: bool,

    /// ARC chain instance number (1..50); required with --arc.
    #[arg(long)]
    arcinstance: Option<u32>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KeyType {
    Rsa,
    Ed25519,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = tracing_subscriber::fmt::try_init();

    if cli.sign == cli.validate {
        eprintln!("exactly one of --sign or --validate is required");
        return ExitCode::from(2);
    }

    let mut message = Vec::new();
    if let Err(e) = io::stdin().read_to_end(&mut message) {
        eprintln!("failed to read message from stdin: {e}");
        return ExitCode::from(1);
    }

    if cli.sign {
        run_sign(&cli, &message)
    } else {
        run_validate(&message)
    }
}

fn run_sign(cli: &Cli, message: &[u8]) -> ExitCode {
    let (domain, selector, keyfile) = match (&cli.domain, &cli.selector, &cli.keyfile) {
        (Some(d), Some(s), Some(k)) => (d, s, k),
        _ => {
            eprintln!("--sign requires --domain, --selector and --keyfile");
            return ExitCode::from(2);
        }
    };
    if cli.arc && cli.arcinstance.is_none() {
        eprintln!("--arc requires --arcinstance");
        return ExitCode::from(2);
    }

    let key_material = match fs::read(keyfile) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("failed to read {}: {e}", keyfile.display());
            return ExitCode::from(1);
        }
    };

    let algorithm = match cli.keytype {
        KeyType::Rsa => SignatureAlgorithm::Rsa,
        KeyType::Ed25519 => SignatureAlgorithm::Ed25519,
    };
    let private_key = match PrivateKey::parse(&key_material, algorithm) {
        Ok(k) => k,
        Err(e) => return report_error(&e),
    };

    let mut options = SignatoryOptions::new(private_key, domain.clone(), selector.clone())
        .canonicalization(Canon::Relaxed, Canon::Relaxed)
        .digest_algorithm(DigestAlgorithm::Sha256);
    if cli.arc {
        options.arc_instance = cli.arcinstance;
    }

    match sign(message, &options) {
        Ok(header) => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let _ = out.write_all(header.as_bytes());
            let _ = out.write_all(message);
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn run_validate(message: &[u8]) -> ExitCode {
    let resolver = match SystemResolver::new() {
        Ok(r) => r,
        Err(e) => return report_error(&e),
    };

    let validatory = Validatory::new(message, SignatureKind::Dkim);
    let mut saw_signature = false;
    let mut any_failed = false;

    for header in validatory.signatures() {
        saw_signature = true;
        let header = header.clone();
        match verify_one(&validatory, &header, &resolver) {
            Ok(()) => println!("dkim=pass"),
            Err(e) => {
                // A `neutral` verdict (e.g. a failure under a t=y "testing"
                // key) is inconclusive, not a hard failure — don't flip the
                // exit code for it.
                if e.class() != AuthResult::Neutral {
                    any_failed = true;
                }
                println!("dkim={} ({})", e.class(), e.reason());
            }
        }
    }

    if !saw_signature {
        println!("dkim=none");
    }

    if any_failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn verify_one(
    validatory: &Validatory<'_>,
    header: &HeaderRecord<'_>,
    resolver: &dyn Resolver,
) -> Result<(), Error> {
    let sig = validatory.parse_signature(header)?;
    validatory.check_body_hash(&sig)?;
    let key = validatory.fetch_public_key(&sig, resolver)?;
    validatory.check_signature(header, &sig, &key)
}

fn report_error(e: &Error) -> ExitCode {
    eprintln!("{}: {}", e.class(), e.reason());
    ExitCode::from(1)
}
