//! Wire types for the file and avatar API. Field names follow the JSON
//! casing via serde renames.

use serde::{Deserialize, Serialize};

/// Authenticated user record. Only the fields the uploader reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Two-factor method offered by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorKind {
    EmailOtp,
    Totp,
}

impl TwoFactorKind {
    /// Path segment of the verify endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            TwoFactorKind::EmailOtp => "emailotp",
            TwoFactorKind::Totp => "totp",
        }
    }

    /// Parses the method names the login response lists.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "emailotp" => Some(TwoFactorKind::EmailOtp),
            "totp" | "otp" => Some(TwoFactorKind::Totp),
            _ => None,
        }
    }
}

/// Outcome of a login attempt against `/auth/user`.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginResponse {
    /// Fully authenticated; `auth_cookie` is set when the response refreshed it.
    Success {
        user: User,
        auth_cookie: Option<String>,
    },
    /// Credentials accepted but a second factor is pending.
    TwoFactorRequired {
        kinds: Vec<TwoFactorKind>,
        auth_cookie: String,
    },
    /// The service rejected the credentials (HTTP 401).
    InvalidCredentials,
}

/// Body shape of a login response that still needs a second factor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TwoFactorBody {
    pub requires_two_factor_auth: Vec<String>,
}

/// Upload mode the service assigns to a file version's subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadCategory {
    #[default]
    Simple,
    Multipart,
    Queued,
}

/// Lifecycle state of a file version or subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    #[default]
    Waiting,
    Complete,
    None,
    Queued,
}

/// The file, signature, or delta slot of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSubresource {
    File,
    Signature,
    Delta,
}

impl FileSubresource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSubresource::File => "file",
            FileSubresource::Signature => "signature",
            FileSubresource::Delta => "delta",
        }
    }
}

/// Per-subresource metadata within a file version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubresourceInfo {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub size_in_bytes: u64,
    #[serde(default)]
    pub status: VersionStatus,
    #[serde(default)]
    pub category: UploadCategory,
}

/// One write-slot on a service file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    pub version: u32,
    #[serde(default)]
    pub status: VersionStatus,
    #[serde(default)]
    pub file: Option<SubresourceInfo>,
    #[serde(default)]
    pub signature: Option<SubresourceInfo>,
    #[serde(default)]
    pub delta: Option<SubresourceInfo>,
}

/// A content-addressed file on the service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub versions: Vec<FileVersion>,
}

impl RemoteFile {
    /// The version currently being written, if any.
    pub fn latest_version(&self) -> Option<&FileVersion> {
        self.versions.last()
    }
}

/// Body of `POST /file`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    pub name: String,
    pub mime_type: String,
    pub extension: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Body of `POST /file/{id}`: digests and sizes of the next version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    /// Hex MD5 of the payload.
    pub file_md5: String,
    pub file_size_in_bytes: u64,
    /// Hex MD5 of the signature file.
    pub signature_md5: String,
    pub signature_size_in_bytes: u64,
}

/// A unity package entry on an avatar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnityPackage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub asset_url: Option<String>,
    #[serde(default)]
    pub asset_version: Option<u32>,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub unity_version: String,
    #[serde(default)]
    pub variant: Option<String>,
}

/// An avatar record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub thumbnail_image_url: String,
    #[serde(default)]
    pub release_status: String,
    #[serde(default)]
    pub unity_packages: Vec<UnityPackage>,
}

/// Body of `POST /avatars`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAvatarRequest {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub release_status: String,
    pub unity_version: String,
}

/// Partial body of `PUT /avatars/{id}`; unset fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unity_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_version: Option<u32>,
}

/// Response of `PUT /file/{id}/{version}/{subresource}/start`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PresignedUrl {
    pub url: String,
}

/// Body of `PUT /file/{id}/{version}/{subresource}/finish`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct FinishUploadRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etags: Option<Vec<String>>,
}
