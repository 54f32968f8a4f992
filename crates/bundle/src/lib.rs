//! Avatar bundle archives and the asset-bundle transcoder.
//!
//! A `.3b` archive is a ZIP carrying `metadata.json`, `thumbnail.png`, and
//! one payload per declared platform — either the canonical `.vrca` asset
//! bundle or a `.vrcaz` compressed envelope that must be transcoded before
//! upload. The reader extracts into a per-invocation temp directory whose
//! lifetime is owned by [`UnpackedBundle`].

mod archive;
mod manifest;
mod transcode;

pub use archive::{PlatformPayload, UnpackedBundle, read_archive};
pub use manifest::{BundleEntry, Manifest, Performance, Platform};
pub use transcode::transcode;

/// Errors opening or validating a `.3b` archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive is corrupt: {0}")]
    Corrupt(String),

    #[error("archive has no metadata.json")]
    ManifestMissing,

    #[error("metadata.json is invalid: {0}")]
    ManifestInvalid(String),

    #[error("archive has no thumbnail.png")]
    ThumbnailMissing,

    #[error("no payload for declared platform {0}")]
    MissingPlatformPayload(Platform),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors decoding a `.vrcaz` compressed envelope.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("envelope header is invalid")]
    EnvelopeInvalid,

    #[error("unsupported codec tag {0:#04x}")]
    UnsupportedCodec(u8),

    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
