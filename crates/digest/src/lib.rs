//! Streaming digests and rsync-style signatures for upload payloads.
//!
//! Every file version pushed to the content service is content-addressed by
//! its MD5 digest and must ship an rsync-compatible signature so later
//! versions can be transmitted as deltas. Both operations stream from disk;
//! payloads may be gigabytes.

mod checksum;
mod signature;

pub use checksum::{FileDigest, md5_file};
pub use signature::{signature_block_len, signature_path, write_signature};

use std::path::{Path, PathBuf};

/// Errors produced by the digest engine.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("signature generation failed: {0}")]
    Signature(String),
}

impl DigestError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
