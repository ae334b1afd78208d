//! Pure, streaming transformation of textual database dumps.
//!
//! This crate rewrites a dump without a live database connection: table
//! prefix rewriting, serialized-string-safe search/replace, column
//! anonymization, and row truncation, applied in one pass over lines.
//! The engine is a deterministic function of (input, options); the
//! anonymizer derives synthetic values from blake3 hashes, never from
//! randomness.

pub mod anonymize;
pub mod engine;
pub mod options;
pub mod prefix;
pub mod serialized;

pub use anonymize::{anonymize_line, RESET_PASSWORD_HASH};
pub use engine::{TransformEngine, TransformStats};
pub use options::{SearchReplace, TransformOptions};
pub use prefix::PrefixRewriter;
pub use serialized::search_replace_line;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid table prefix '{0}': must match [A-Za-z0-9_]")]
    InvalidPrefix(String),
}
