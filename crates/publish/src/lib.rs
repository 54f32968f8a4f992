//! Avatar publication orchestrator.
//!
//! Drives one publication end to end: thumbnail upload, avatar upsert,
//! per-platform transcode and bundle upload, and the final avatar updates.
//! Progress flows one way through an mpsc channel — the orchestrator owns
//! the sender, the front-end owns the receiver. The service seam is the
//! [`AvatarService`] trait so the whole pipeline runs against scripted
//! mocks in tests.

mod events;
mod publisher;
mod service;

pub use events::ProgressEvent;
pub use publisher::Publisher;
pub use service::{AvatarService, LiveAvatarService};

use third_bundle::{ArchiveError, CodecError};
use third_digest::DigestError;
use third_upload::UploadError;
use third_vrchat::ApiError;

/// Errors aborting a publication.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("file {0} has no usable version")]
    MissingVersion(String),

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
