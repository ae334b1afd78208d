//! Deterministic column anonymization.
//!
//! Synthetic values are derived from a blake3 hash of the original, so a
//! re-run over the same dump produces the same output and the mapping is
//! not reversible.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Fixed placeholder written over every recognized password hash when
/// `reset_passwords` is set. Not a valid hash of anything.
pub const RESET_PASSWORD_HASH: &str = "$P$BresetResetResetResetResetRese0";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})'").expect("static pattern")
});

/// Literal values immediately following one of these column-name tokens
/// are treated as personal names.
static NAME_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'(first_name|last_name|display_name|nickname)'\s*,\s*'([^']*)'")
        .expect("static pattern")
});

static PASSWORD_HASH: LazyLock<Regex> = LazyLock::new(|| {
    // phpass portable hashes and bcrypt variants.
    Regex::new(r"\$(?:P|H)\$[./0-9A-Za-z]{31}|\$2[axy]\$\d{2}\$[./0-9A-Za-z]{53}")
        .expect("static pattern")
});

fn short_hash(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex()[..12].to_owned()
}

fn user_number(input: &str) -> u32 {
    let hash = blake3::hash(input.as_bytes());
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) % 100_000
}

/// Replace every email-bearing quoted literal with a synthetic address
/// derived from a hash of the original.
pub fn anonymize_emails(line: &str) -> String {
    EMAIL
        .replace_all(line, |caps: &Captures<'_>| {
            format!("'user-{}@anonymized.invalid'", short_hash(&caps[1]))
        })
        .into_owned()
}

/// Replace name values following known column tokens with "User N",
/// N keyed by a hash of the original value.
pub fn anonymize_names(line: &str) -> String {
    NAME_COLUMN
        .replace_all(line, |caps: &Captures<'_>| {
            if caps[2].is_empty() {
                caps[0].to_owned()
            } else {
                format!("'{}','User {}'", &caps[1], user_number(&caps[2]))
            }
        })
        .into_owned()
}

/// Replace every recognized password-hash pattern with the fixed placeholder.
pub fn reset_passwords(line: &str) -> String {
    PASSWORD_HASH
        .replace_all(line, RESET_PASSWORD_HASH)
        .into_owned()
}

/// Apply the enabled anonymization passes to one line.
pub fn anonymize_line(line: &str, emails: bool, names: bool, passwords: bool) -> String {
    let mut out = if emails {
        anonymize_emails(line)
    } else {
        line.to_owned()
    };
    if names {
        out = anonymize_names(&out);
    }
    if passwords {
        out = reset_passwords(&out);
    }
    out
}
