//! Typed client for the VRChat file and avatar REST API.
//!
//! Covers session establishment (HTTP Basic + two-factor), the multi-step
//! file-version lifecycle (create file → create version → start upload →
//! finish upload), and avatar CRUD. Authentication is cookie-based: every
//! authenticated call carries the `auth` and `twoFactorAuth` cookie pair.

mod client;
mod cookies;
mod models;
mod session;
mod urls;

pub use client::ApiClient;
pub use cookies::{CookieJar, parse_set_cookie};
pub use models::{
    Avatar, AvatarPatch, CreateAvatarRequest, CreateFileRequest, CreateVersionRequest,
    FileSubresource, FileVersion, LoginResponse, RemoteFile, SubresourceInfo, TwoFactorKind,
    UnityPackage, UploadCategory, User, VersionStatus,
};
pub use session::{LoginFlow, PendingTwoFactor, Session, begin_login, resume_session};
pub use urls::parse_file_id;

/// Production API base.
pub const BASE_URL: &str = "https://api.vrchat.cloud/api/1";

/// User-Agent sent on every request, control plane and uploads alike.
pub const USER_AGENT: &str = concat!(
    "Third Uploader/",
    env!("CARGO_PKG_VERSION"),
    " third3dcom@gmail.com"
);

/// Errors from the API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Blueprint ID already in use")]
    BlueprintIdTaken,

    #[error("two-factor verification failed")]
    TwoFactorFailed,

    #[error("session expired")]
    SessionExpired,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
