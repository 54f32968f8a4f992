use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ArchiveError;

/// Target platform of an asset bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Android,
    Ios,
}

impl Platform {
    /// File stem of the platform's payload entry inside the archive.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    /// Platform identifier the service stores on unity packages.
    pub fn service_token(&self) -> &'static str {
        match self {
            Platform::Windows => "standalonewindows",
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Avatar performance rank declared per bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performance {
    Excellent,
    Good,
    Medium,
    Poor,
    VeryPoor,
}

/// One per-platform entry under `assetBundles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub performance: Performance,
    pub unity_version: String,
}

/// Parsed `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    pub blueprint_id: String,
    pub asset_bundles: BTreeMap<Platform, BundleEntry>,
}

impl Manifest {
    /// Checks the schema constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.name.is_empty() {
            return Err(ArchiveError::ManifestInvalid("name is empty".into()));
        }
        if self.blueprint_id.is_empty() {
            return Err(ArchiveError::ManifestInvalid("blueprintId is empty".into()));
        }
        if self.asset_bundles.is_empty() {
            return Err(ArchiveError::ManifestInvalid(
                "assetBundles declares no platform".into(),
            ));
        }
        for (platform, entry) in &self.asset_bundles {
            if entry.unity_version.is_empty() {
                return Err(ArchiveError::ManifestInvalid(format!(
                    "assetBundles.{platform} has an empty unityVersion"
                )));
            }
        }
        Ok(())
    }
}
