use std::path::{Path, PathBuf};

use librsync::{Signature, SignatureType};

use crate::DigestError;

/// Strong-hash length the service expects: MD4 truncated to 8 bytes.
const STRONG_LEN: usize = 8;

/// Smallest block length ever emitted.
const MIN_BLOCK_LEN: u64 = 256;

/// Block length for a file of `size` bytes: √size rounded up to a power of
/// two, never below [`MIN_BLOCK_LEN`].
pub fn signature_block_len(size: u64) -> usize {
    let root = (size as f64).sqrt().ceil() as u64;
    root.max(MIN_BLOCK_LEN).next_power_of_two() as usize
}

/// Conventional signature path for a payload: `{source}.sig`.
pub fn signature_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".sig");
    PathBuf::from(name)
}

/// Writes an rsync-compatible signature of `source` to `dest`.
///
/// Block length is derived from the source size; the strong hash is MD4
/// truncated to [`STRONG_LEN`] bytes, which is what the service verifies
/// against on later delta requests.
pub fn write_signature(source: &Path, dest: &Path) -> Result<(), DigestError> {
    let file = std::fs::File::open(source).map_err(|e| DigestError::io(source, e))?;
    let size = file
        .metadata()
        .map_err(|e| DigestError::io(source, e))?
        .len();
    let block_len = signature_block_len(size);

    tracing::debug!(
        source = %source.display(),
        size,
        block_len,
        "generating signature"
    );

    let mut signature = Signature::with_options(&file, block_len, STRONG_LEN, SignatureType::MD4)
        .map_err(|e| DigestError::Signature(e.to_string()))?;

    let mut out = std::fs::File::create(dest).map_err(|e| DigestError::io(dest, e))?;
    std::io::copy(&mut signature, &mut out)
        .map_err(|e| DigestError::Signature(e.to_string()))?;
    out.sync_all().map_err(|e| DigestError::io(dest, e))?;
    Ok(())
}
