use keyring::Entry;
use serde::{Deserialize, Serialize};

use crate::CredentialError;

/// Secret-store service name.
const SERVICE_NAME: &str = "ThirdUploader";

/// The cookie pair persisted per username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub auth: String,
    pub two_factor: String,
}

/// Writes the cookie pair for `username` to the secret store.
pub fn save_token(username: &str, token: &StoredToken) -> Result<(), CredentialError> {
    let entry = Entry::new(SERVICE_NAME, username)?;
    entry.set_password(&serde_json::to_string(token)?)?;
    tracing::debug!(username, "session cookies stored");
    Ok(())
}

/// Reads the cookie pair for `username`. `None` when nothing is stored.
pub fn load_token(username: &str) -> Result<Option<StoredToken>, CredentialError> {
    let entry = Entry::new(SERVICE_NAME, username)?;
    match entry.get_password() {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Removes the stored cookie pair for `username`, if any.
pub fn delete_token(username: &str) -> Result<(), CredentialError> {
    let entry = Entry::new(SERVICE_NAME, username)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) => Err(err.into()),
    }
}
