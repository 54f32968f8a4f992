//! Session persistence.
//!
//! The `{auth, twoFactor}` cookie pair lives in the OS secret store keyed by
//! username; the only other persisted state is a small JSON config with the
//! last-used username, in the OS app-data directory.

mod config;
mod store;

pub use config::AppConfig;
pub use store::{StoredToken, delete_token, load_token, save_token};

/// Errors loading or saving persisted session state.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("secret store error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
