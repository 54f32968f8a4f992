use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use crate::manifest::{Manifest, Platform};
use crate::ArchiveError;

/// One platform payload extracted from an archive.
#[derive(Debug, Clone)]
pub struct PlatformPayload {
    pub platform: Platform,
    /// Path of the extracted payload inside the unpack directory.
    pub path: PathBuf,
    /// `true` when the payload is a `.vrcaz` envelope needing a transcode.
    pub compressed: bool,
}

/// An extracted and validated `.3b` archive.
///
/// Owns the unpack directory; dropping the bundle removes it. The directory
/// must outlive every upload reading from it, so the value is held for the
/// whole publication session.
#[derive(Debug)]
pub struct UnpackedBundle {
    dir: TempDir,
    pub manifest: Manifest,
    pub thumbnail: PathBuf,
    pub payloads: Vec<PlatformPayload>,
}

impl UnpackedBundle {
    /// The unpack directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Deletes the unpack directory now instead of at drop time.
    pub fn release(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

/// Opens a `.3b` archive, extracts it into a fresh temp directory, and
/// validates its contents against the manifest schema.
///
/// This touches every entry on disk and runs CPU-bound inflate work; callers
/// on an async runtime should wrap it in `spawn_blocking`.
pub fn read_archive(path: &Path) -> Result<UnpackedBundle, ArchiveError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut archive = ZipArchive::new(reader).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

    let dir = tempfile::Builder::new()
        .prefix("third-bundle-")
        .tempdir()?;
    archive
        .extract(dir.path())
        .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

    tracing::debug!(
        archive = %path.display(),
        unpack_dir = %dir.path().display(),
        "extracted avatar bundle"
    );

    let manifest_path = dir.path().join("metadata.json");
    if !manifest_path.is_file() {
        return Err(ArchiveError::ManifestMissing);
    }
    let manifest: Manifest = serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)
        .map_err(|e| ArchiveError::ManifestInvalid(e.to_string()))?;
    manifest.validate()?;

    let thumbnail = dir.path().join("thumbnail.png");
    if !thumbnail.is_file() {
        return Err(ArchiveError::ThumbnailMissing);
    }

    let mut payloads = Vec::with_capacity(manifest.asset_bundles.len());
    for platform in manifest.asset_bundles.keys().copied() {
        let envelope = dir.path().join(format!("{platform}.vrcaz"));
        let canonical = dir.path().join(format!("{platform}.vrca"));
        if envelope.is_file() {
            payloads.push(PlatformPayload {
                platform,
                path: envelope,
                compressed: true,
            });
        } else if canonical.is_file() {
            payloads.push(PlatformPayload {
                platform,
                path: canonical,
                compressed: false,
            });
        } else {
            return Err(ArchiveError::MissingPlatformPayload(platform));
        }
    }

    Ok(UnpackedBundle {
        dir,
        manifest,
        thumbnail,
        payloads,
    })
}
