//! Streaming upload driver for pre-signed URLs.
//!
//! The service hands out time-limited PUT URLs in two flavors: a single URL
//! for the whole file (`simple`) or one URL per fixed-size part
//! (`multipart`), finalized with the collected etags. Both paths stream file
//! bytes from disk; nothing buffers a whole payload in memory.

mod driver;

pub use driver::{PartUrlSource, UploadDriver, part_count};

/// Fixed part size of the service's multipart protocol: 10 MiB.
pub const PART_SIZE: u64 = 10 * 1024 * 1024;

/// Errors produced by the upload driver.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload failed with status {status}: {body}")]
    Failure { status: u16, body: String },

    #[error("part {0} returned no etag")]
    EtagMissing(u32),

    #[error("multipart upload collected {filled} of {total} etags")]
    PartsIncomplete { filled: usize, total: usize },

    #[error("pre-signed URL request failed: {0}")]
    Presign(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
