//! Content fingerprints for wrapped frames.
//!
//! A fingerprint is the SHA-256 digest of the frame's canonical CSV
//! serialization (header row plus data rows, columns in frame order).
//! Identical content always yields the identical digest, so rewriting an
//! unchanged table can be detected without comparing timestamps.

use polars::prelude::*;
use sha2::{Digest as _, Sha256};

use crate::error::Result;

/// Hash algorithm identifier recorded alongside fingerprints.
pub const HASH_ALGORITHM: &str = "SHA-256";

/// Compute the SHA-256 fingerprint of a frame's current content.
///
/// Returns a lowercase hexadecimal string (64 characters).
pub fn compute(df: &DataFrame) -> Result<String> {
    let mut buffer = Vec::new();
    let mut df = df.clone();

    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut df)?;

    let mut hasher = Sha256::new();
    hasher.update(&buffer);
    let hash = hasher.finalize();

    Ok(format!("{hash:x}"))
}
