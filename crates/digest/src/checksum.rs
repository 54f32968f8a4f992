use std::io::Read;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};

use crate::DigestError;

/// Read buffer for streaming digests: 1 MiB.
const DIGEST_CHUNK_SIZE: usize = 1024 * 1024;

/// MD5 digest of a file, in the two encodings the service consumes.
///
/// API request bodies carry the hex form; the `Content-MD5` header on
/// pre-signed PUTs carries the Base64 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    bytes: [u8; 16],
    /// Size of the digested file in bytes.
    pub size: u64,
}

impl FileDigest {
    /// 32-char lowercase hex digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Base64 digest for the `Content-MD5` header.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

/// Computes the MD5 digest of the file at `path`.
///
/// The file is read in [`DIGEST_CHUNK_SIZE`] chunks and never loaded whole.
pub fn md5_file(path: &Path) -> Result<FileDigest, DigestError> {
    let mut file = std::fs::File::open(path).map_err(|e| DigestError::io(path, e))?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; DIGEST_CHUNK_SIZE];
    let mut size: u64 = 0;

    loop {
        let n = file.read(&mut buf).map_err(|e| DigestError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok(FileDigest {
        bytes: hasher.finalize().into(),
        size,
    })
}
