//! Document fingerprints
//!
//! An accepted document is identified by the SHA-256 of its canonical JSON,
//! so any downstream stage can confirm it is reading the exact bytes that
//! were accepted.

use crate::models::CrosswalkDocument;
use crate::Result;
use sha2::{Digest, Sha256};
use std::io::Write;

/// Hex SHA-256 of the canonical (pretty) JSON form of a document
pub fn document_fingerprint(document: &CrosswalkDocument) -> Result<String> {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    serde_json::to_writer_pretty(&mut HashWriter(&mut hasher), document)?;

    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of raw stored bytes
pub fn bytes_fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
