use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use third_bundle::{Platform, UnpackedBundle, transcode};
use third_digest::{FileDigest, md5_file, signature_path, write_signature};
use third_upload::{PartUrlSource, UploadDriver, UploadError};
use third_vrchat::{
    AvatarPatch, CreateAvatarRequest, CreateFileRequest, CreateVersionRequest, FileSubresource,
    UploadCategory, VersionStatus, parse_file_id,
};

use crate::events::ProgressEvent;
use crate::service::AvatarService;
use crate::PublishError;

/// Engine version stamped on newly created avatars.
const DEFAULT_UNITY_VERSION: &str = "2022.3.6f1";

/// New avatars are never published publicly by the uploader.
const RELEASE_STATUS: &str = "private";

const SIGNATURE_MIME: &str = "application/x-rsync-signature";

/// Runs avatar publications and reports progress over a one-way channel.
///
/// The publisher owns the event sender; the front-end takes the receiver
/// once via [`take_events`](Self::take_events). Cancellation is cooperative
/// through the token from [`cancel_token`](Self::cancel_token).
pub struct Publisher {
    events_tx: mpsc::Sender<ProgressEvent>,
    events_rx: Option<mpsc::Receiver<ProgressEvent>>,
    cancel: CancellationToken,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ProgressEvent>> {
        self.events_rx.take()
    }

    /// Token that aborts the publication when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Publishes one unpacked bundle.
    ///
    /// The bundle stays loaded on failure so the caller can retry; its
    /// unpack directory is deleted when the caller drops it.
    pub async fn publish(
        &self,
        service: &dyn AvatarService,
        driver: &UploadDriver,
        bundle: &UnpackedBundle,
    ) -> Result<third_vrchat::Avatar, PublishError> {
        let result = self.run(service, driver, bundle).await;
        match &result {
            Ok(avatar) => {
                info!(avatar = %avatar.id, "publication complete");
                self.emit(ProgressEvent::Completed).await;
            }
            Err(PublishError::Cancelled) => {
                warn!("publication cancelled");
            }
            Err(err) => {
                error!(error = %err, "publication failed");
                self.emit(ProgressEvent::Error {
                    message: err.to_string(),
                })
                .await;
            }
        }
        result
    }

    async fn run(
        &self,
        service: &dyn AvatarService,
        driver: &UploadDriver,
        bundle: &UnpackedBundle,
    ) -> Result<third_vrchat::Avatar, PublishError> {
        let manifest = &bundle.manifest;

        self.emit(ProgressEvent::Init).await;
        self.check_cancelled()?;

        let existing = service.get_avatar(&manifest.blueprint_id).await?;
        if let Some(avatar) = &existing {
            debug!(avatar = %avatar.id, "avatar exists, new versions will be appended");
        }

        self.emit(ProgressEvent::Thumbnail).await;
        self.check_cancelled()?;

        let reuse_image = existing
            .as_ref()
            .and_then(|avatar| parse_file_id(&avatar.thumbnail_image_url));
        let image_url = self
            .upload_file(
                service,
                driver,
                &format!("Avatar {} image", manifest.name),
                &bundle.thumbnail,
                "image/png",
                ".png",
                reuse_image,
                &|_, _| {},
            )
            .await?;

        let mut avatar = match &existing {
            Some(avatar) => {
                service
                    .update_avatar(
                        &avatar.id,
                        &AvatarPatch {
                            name: Some(manifest.name.clone()),
                            image_url: Some(image_url),
                            ..Default::default()
                        },
                    )
                    .await?
            }
            None => {
                service
                    .create_avatar(&CreateAvatarRequest {
                        id: manifest.blueprint_id.clone(),
                        name: manifest.name.clone(),
                        image_url,
                        release_status: RELEASE_STATUS.into(),
                        unity_version: DEFAULT_UNITY_VERSION.into(),
                    })
                    .await?
            }
        };

        self.emit(ProgressEvent::Waiting).await;

        // Payloads surface here in completion order so a fast platform never
        // waits on a slow transcode.
        let total_platforms = bundle.payloads.len() as u32;
        let mut ready_rx = self.start_transcodes(bundle);

        for platform_index in 0..total_platforms {
            self.check_cancelled()?;
            let Some(ready) = ready_rx.recv().await else {
                return Err(PublishError::Task("transcode worker vanished".into()));
            };
            let (platform, payload_path) = ready?;
            let entry = &manifest.asset_bundles[&platform];
            let token = platform.service_token();

            let reuse_bundle = existing.as_ref().and_then(|avatar| {
                avatar
                    .unity_packages
                    .iter()
                    .find(|package| {
                        package.platform == token
                            && package.variant.as_deref() == Some("standard")
                    })
                    .and_then(|package| package.asset_url.as_deref())
                    .and_then(parse_file_id)
            });

            let events_tx = self.events_tx.clone();
            let progress = move |part: u32, total_parts: u32| {
                let _ = events_tx.try_send(ProgressEvent::Bundle {
                    part,
                    total_parts,
                    platform_index,
                    total_platforms,
                });
            };

            let asset_url = self
                .upload_file(
                    service,
                    driver,
                    &format!("Avatar {} {} bundle", manifest.name, platform),
                    &payload_path,
                    "application/x-avatar",
                    ".vrca",
                    reuse_bundle,
                    &progress,
                )
                .await?;

            avatar = service
                .update_avatar(
                    &avatar.id,
                    &AvatarPatch {
                        asset_url: Some(asset_url),
                        platform: Some(token.into()),
                        unity_version: Some(entry.unity_version.clone()),
                        asset_version: Some(1),
                        ..Default::default()
                    },
                )
                .await?;
            debug!(%platform, "platform bundle published");
        }

        Ok(avatar)
    }

    /// Spawns a blocking transcode per envelope payload and returns the
    /// completion queue. Uncompressed payloads are ready immediately.
    fn start_transcodes(
        &self,
        bundle: &UnpackedBundle,
    ) -> mpsc::Receiver<Result<(Platform, PathBuf), PublishError>> {
        let (ready_tx, ready_rx) = mpsc::channel(bundle.payloads.len().max(1));

        for payload in &bundle.payloads {
            if payload.compressed {
                let tx = ready_tx.clone();
                let platform = payload.platform;
                let source = payload.path.clone();
                let dest = bundle.dir().join(format!("{platform}.vrca"));
                tokio::task::spawn_blocking(move || {
                    let result = transcode(&source, &dest)
                        .map(|_| (platform, dest))
                        .map_err(PublishError::from);
                    let _ = tx.blocking_send(result);
                });
            } else {
                let _ = ready_tx.try_send(Ok((payload.platform, payload.path.clone())));
            }
        }

        ready_rx
    }

    /// Uploads one local file as a new version of a service file and returns
    /// the resulting asset URL.
    ///
    /// Digest and signature generation run on the blocking pool; the payload
    /// and signature subresources then upload concurrently, and the version
    /// is durable only once both finish.
    #[allow(clippy::too_many_arguments)]
    async fn upload_file(
        &self,
        service: &dyn AvatarService,
        driver: &UploadDriver,
        name: &str,
        path: &Path,
        mime: &str,
        extension: &str,
        reuse_file_id: Option<String>,
        progress: &(dyn Fn(u32, u32) + Send + Sync),
    ) -> Result<String, PublishError> {
        self.check_cancelled()?;

        let sig_path = signature_path(path);
        let (file_digest, sig_digest) = {
            let path = path.to_path_buf();
            let sig_path = sig_path.clone();
            tokio::task::spawn_blocking(
                move || -> Result<(FileDigest, FileDigest), PublishError> {
                    let file_digest = md5_file(&path)?;
                    write_signature(&path, &sig_path)?;
                    let sig_digest = md5_file(&sig_path)?;
                    Ok((file_digest, sig_digest))
                },
            )
            .await
            .map_err(|e| PublishError::Task(e.to_string()))??
        };

        let file_id = match reuse_file_id {
            Some(file_id) => {
                // A trailing non-complete version blocks the next create.
                let current = service.show_file(&file_id).await?;
                if let Some(latest) = current.latest_version()
                    && latest.status != VersionStatus::Complete
                    && latest.version > 0
                {
                    debug!(file = %file_id, version = latest.version, "deleting stale version");
                    service.delete_file_version(&file_id, latest.version).await?;
                }
                file_id
            }
            None => {
                service
                    .create_file(&CreateFileRequest {
                        name: name.into(),
                        mime_type: mime.into(),
                        extension: extension.into(),
                        tags: Vec::new(),
                    })
                    .await?
                    .id
            }
        };

        let file = service
            .create_file_version(
                &file_id,
                &CreateVersionRequest {
                    file_md5: file_digest.to_hex(),
                    file_size_in_bytes: file_digest.size,
                    signature_md5: sig_digest.to_hex(),
                    signature_size_in_bytes: sig_digest.size,
                },
            )
            .await?;
        let version = file
            .latest_version()
            .ok_or_else(|| PublishError::MissingVersion(file_id.clone()))?;
        let version_number = version.version;
        let category = version
            .file
            .as_ref()
            .map(|sub| sub.category)
            .unwrap_or_default();

        self.check_cancelled()?;

        let payload_upload = async {
            match category {
                UploadCategory::Multipart => {
                    let source = VersionPartSource {
                        service,
                        file_id: &file_id,
                        version: version_number,
                    };
                    let etags = driver.upload_multipart(&source, path, progress).await?;
                    service
                        .finish_file_upload(
                            &file_id,
                            version_number,
                            FileSubresource::File,
                            Some(etags),
                        )
                        .await?;
                }
                UploadCategory::Simple | UploadCategory::Queued => {
                    let url = service
                        .start_file_upload(&file_id, version_number, FileSubresource::File, None)
                        .await?;
                    driver
                        .upload_simple(&url, path, mime, &file_digest.to_base64(), progress)
                        .await?;
                    service
                        .finish_file_upload(&file_id, version_number, FileSubresource::File, None)
                        .await?;
                }
            }
            Ok::<(), PublishError>(())
        };

        let signature_upload = async {
            let url = service
                .start_file_upload(
                    &file_id,
                    version_number,
                    FileSubresource::Signature,
                    None,
                )
                .await?;
            driver
                .upload_simple(
                    &url,
                    &sig_path,
                    SIGNATURE_MIME,
                    &sig_digest.to_base64(),
                    &|_, _| {},
                )
                .await?;
            service
                .finish_file_upload(&file_id, version_number, FileSubresource::Signature, None)
                .await?;
            Ok::<(), PublishError>(())
        };

        tokio::try_join!(payload_upload, signature_upload)?;

        let done = service.show_file(&file_id).await?;
        done.latest_version()
            .and_then(|version| version.file.as_ref())
            .map(|sub| sub.url.clone())
            .filter(|url| !url.is_empty())
            .ok_or(PublishError::MissingVersion(file_id))
    }

    fn check_cancelled(&self) -> Result<(), PublishError> {
        if self.cancel.is_cancelled() {
            Err(PublishError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn emit(&self, event: ProgressEvent) {
        let _ = self.events_tx.send(event).await;
    }
}

/// Per-part pre-signed URLs for one file version.
struct VersionPartSource<'a> {
    service: &'a dyn AvatarService,
    file_id: &'a str,
    version: u32,
}

impl PartUrlSource for VersionPartSource<'_> {
    fn part_url(
        &self,
        part_number: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String, UploadError>> + Send + '_>> {
        Box::pin(async move {
            self.service
                .start_file_upload(
                    self.file_id,
                    self.version,
                    FileSubresource::File,
                    Some(part_number),
                )
                .await
                .map_err(|e| UploadError::Presign(Box::new(e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write as _;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use zip::write::SimpleFileOptions;

    use third_bundle::read_archive;
    use third_vrchat::{
        ApiError, Avatar, FileVersion, RemoteFile, SubresourceInfo, UnityPackage,
    };

    const BLUEPRINT: &str = "avtr_00000000-0000-0000-0000-000000000001";

    fn asset_url(file_id: &str, version: u32, sub: &str) -> String {
        format!("https://api.vrchat.cloud/api/1/file/{file_id}/{version}/{sub}")
    }

    // -----------------------------------------------------------------------
    // Mock service
    // -----------------------------------------------------------------------

    /// Scripted in-memory service recording every call in wire notation.
    struct MockService {
        calls: Mutex<Vec<String>>,
        avatar: Mutex<Option<Avatar>>,
        files: Mutex<HashMap<String, RemoteFile>>,
        patches: Mutex<Vec<serde_json::Value>>,
        finished_etags: Mutex<Vec<Vec<String>>>,
        next_file: AtomicUsize,
        category: UploadCategory,
        sink_url: String,
        create_avatar_fails: bool,
    }

    impl MockService {
        fn new(sink_url: &str, category: UploadCategory) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                avatar: Mutex::new(None),
                files: Mutex::new(HashMap::new()),
                patches: Mutex::new(Vec::new()),
                finished_etags: Mutex::new(Vec::new()),
                next_file: AtomicUsize::new(1),
                category,
                sink_url: sink_url.to_string(),
                create_avatar_fails: false,
            }
        }

        fn failing_create(mut self) -> Self {
            self.create_avatar_fails = true;
            self
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn seed_avatar(&self, avatar: Avatar) {
            *self.avatar.lock().unwrap() = Some(avatar);
        }

        fn seed_file(&self, file: RemoteFile) {
            self.files.lock().unwrap().insert(file.id.clone(), file);
        }
    }

    impl AvatarService for MockService {
        fn get_avatar(
            &self,
            avatar_id: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Avatar>, ApiError>> + Send + '_>> {
            self.record(format!("GET /avatars/{avatar_id}"));
            let result = self.avatar.lock().unwrap().clone();
            Box::pin(async move { Ok(result) })
        }

        fn create_avatar(
            &self,
            request: &CreateAvatarRequest,
        ) -> Pin<Box<dyn Future<Output = Result<Avatar, ApiError>> + Send + '_>> {
            self.record("POST /avatars".into());
            if self.create_avatar_fails {
                return Box::pin(async { Err(ApiError::BlueprintIdTaken) });
            }
            let avatar = Avatar {
                id: request.id.clone(),
                name: request.name.clone(),
                image_url: request.image_url.clone(),
                thumbnail_image_url: request.image_url.clone(),
                release_status: request.release_status.clone(),
                unity_packages: Vec::new(),
            };
            *self.avatar.lock().unwrap() = Some(avatar.clone());
            Box::pin(async move { Ok(avatar) })
        }

        fn update_avatar(
            &self,
            avatar_id: &str,
            patch: &AvatarPatch,
        ) -> Pin<Box<dyn Future<Output = Result<Avatar, ApiError>> + Send + '_>> {
            self.record(format!("PUT /avatars/{avatar_id}"));
            self.patches
                .lock()
                .unwrap()
                .push(serde_json::to_value(patch).unwrap());

            let mut guard = self.avatar.lock().unwrap();
            let avatar = guard.as_mut().expect("update on missing avatar");
            if let Some(name) = &patch.name {
                avatar.name = name.clone();
            }
            if let Some(url) = &patch.image_url {
                avatar.image_url = url.clone();
                avatar.thumbnail_image_url = url.clone();
            }
            if let (Some(asset_url), Some(platform)) = (&patch.asset_url, &patch.platform) {
                let existing = avatar.unity_packages.iter_mut().find(|package| {
                    package.platform == *platform
                        && package.variant.as_deref() == Some("standard")
                });
                match existing {
                    Some(package) => {
                        package.asset_url = Some(asset_url.clone());
                        package.unity_version = patch.unity_version.clone().unwrap_or_default();
                        package.asset_version = patch.asset_version;
                    }
                    None => avatar.unity_packages.push(UnityPackage {
                        id: format!("unp_{}", avatar.unity_packages.len() + 1),
                        asset_url: Some(asset_url.clone()),
                        asset_version: patch.asset_version,
                        platform: platform.clone(),
                        unity_version: patch.unity_version.clone().unwrap_or_default(),
                        variant: Some("standard".into()),
                    }),
                }
            }
            let result = avatar.clone();
            Box::pin(async move { Ok(result) })
        }

        fn create_file(
            &self,
            request: &CreateFileRequest,
        ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>> {
            self.record(format!("POST /file {}", request.extension));
            let id = format!("file_{}", self.next_file.fetch_add(1, Ordering::SeqCst));
            let file = RemoteFile {
                id: id.clone(),
                name: request.name.clone(),
                mime_type: request.mime_type.clone(),
                extension: request.extension.clone(),
                versions: Vec::new(),
            };
            self.files.lock().unwrap().insert(id, file.clone());
            Box::pin(async move { Ok(file) })
        }

        fn create_file_version(
            &self,
            file_id: &str,
            _request: &CreateVersionRequest,
        ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>> {
            self.record(format!("POST /file/{file_id}"));
            let mut files = self.files.lock().unwrap();
            let result = match files.get_mut(file_id) {
                Some(file) => {
                    let version = file
                        .versions
                        .last()
                        .map(|v| v.version + 1)
                        .unwrap_or(1);
                    file.versions.push(FileVersion {
                        version,
                        status: VersionStatus::Waiting,
                        file: Some(SubresourceInfo {
                            category: self.category,
                            ..Default::default()
                        }),
                        signature: Some(SubresourceInfo::default()),
                        delta: None,
                    });
                    Ok(file.clone())
                }
                None => Err(not_found(file_id)),
            };
            Box::pin(async move { result })
        }

        fn show_file(
            &self,
            file_id: &str,
        ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>> {
            self.record(format!("GET /file/{file_id}"));
            let result = self
                .files
                .lock()
                .unwrap()
                .get(file_id)
                .cloned()
                .ok_or_else(|| not_found(file_id));
            Box::pin(async move { result })
        }

        fn delete_file_version(
            &self,
            file_id: &str,
            version: u32,
        ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + '_>> {
            self.record(format!("DELETE /file/{file_id}/{version}"));
            if let Some(file) = self.files.lock().unwrap().get_mut(file_id) {
                file.versions.retain(|v| v.version != version);
            }
            Box::pin(async { Ok(()) })
        }

        fn start_file_upload(
            &self,
            file_id: &str,
            version: u32,
            subresource: FileSubresource,
            part_number: Option<u32>,
        ) -> Pin<Box<dyn Future<Output = Result<String, ApiError>> + Send + '_>> {
            let suffix = part_number
                .map(|p| format!("?partNumber={p}"))
                .unwrap_or_default();
            self.record(format!(
                "PUT /file/{file_id}/{version}/{}/start{suffix}",
                subresource.as_str()
            ));
            let url = format!("{}/{}", self.sink_url, subresource.as_str());
            Box::pin(async move { Ok(url) })
        }

        fn finish_file_upload(
            &self,
            file_id: &str,
            version: u32,
            subresource: FileSubresource,
            etags: Option<Vec<String>>,
        ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>> {
            self.record(format!(
                "PUT /file/{file_id}/{version}/{}/finish",
                subresource.as_str()
            ));
            if let Some(etags) = &etags {
                self.finished_etags.lock().unwrap().push(etags.clone());
            }

            let mut files = self.files.lock().unwrap();
            let result = match files.get_mut(file_id) {
                Some(file) => {
                    let url = asset_url(&file.id.clone(), version, subresource.as_str());
                    if let Some(slot) = file
                        .versions
                        .iter_mut()
                        .find(|v| v.version == version)
                    {
                        let sub = match subresource {
                            FileSubresource::File => slot.file.as_mut(),
                            FileSubresource::Signature => slot.signature.as_mut(),
                            FileSubresource::Delta => slot.delta.as_mut(),
                        };
                        if let Some(sub) = sub {
                            sub.url = url;
                            sub.status = VersionStatus::Complete;
                        }
                        let done = |s: &Option<SubresourceInfo>| {
                            s.as_ref().is_some_and(|s| !s.url.is_empty())
                        };
                        if done(&slot.file) && done(&slot.signature) {
                            slot.status = VersionStatus::Complete;
                        }
                    }
                    Ok(file.clone())
                }
                None => Err(not_found(file_id)),
            };
            Box::pin(async move { result })
        }
    }

    fn not_found(file_id: &str) -> ApiError {
        ApiError::Api {
            status: 404,
            body: format!("unknown file {file_id}"),
        }
    }

    // -----------------------------------------------------------------------
    // Upload sink and fixtures
    // -----------------------------------------------------------------------

    /// Accept-loop PUT sink answering every request with 200 and a fresh
    /// quoted etag.
    async fn sink_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

        let handle = tokio::spawn(async move {
            let mut counter = 0u32;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                counter += 1;
                read_put_request(&mut stream).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nETag: \"mock-etag-{counter}\"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, handle)
    }

    async fn read_put_request(stream: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        let mut header_end = 0usize;
        let mut content_len = 0usize;
        loop {
            let Ok(n) = stream.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if header_end == 0
                && let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n")
            {
                header_end = pos + 4;
                let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                content_len = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
            }
            if header_end > 0 && buf.len() >= header_end + content_len {
                return;
            }
        }
    }

    fn manifest_json(platforms: &[&str]) -> String {
        let bundles = platforms
            .iter()
            .map(|p| format!(r#""{p}": {{ "performance": "good", "unityVersion": "2022.3.6f1" }}"#))
            .collect::<Vec<_>>()
            .join(",");
        format!(r#"{{"name":"Alice","blueprintId":"{BLUEPRINT}","assetBundles":{{{bundles}}}}}"#)
    }

    fn build_bundle(dir: &Path, entries: &[(&str, Vec<u8>)]) -> UnpackedBundle {
        let path = dir.join("avatar.3b");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        read_archive(&path).unwrap()
    }

    fn simple_bundle(dir: &Path) -> UnpackedBundle {
        build_bundle(
            dir,
            &[
                ("metadata.json", manifest_json(&["windows"]).into_bytes()),
                ("thumbnail.png", vec![7u8; 123]),
                ("windows.vrca", vec![42u8; 4096]),
            ],
        )
    }

    fn complete_version(file_id: &str, version: u32) -> FileVersion {
        FileVersion {
            version,
            status: VersionStatus::Complete,
            file: Some(SubresourceInfo {
                url: asset_url(file_id, version, "file"),
                status: VersionStatus::Complete,
                ..Default::default()
            }),
            signature: Some(SubresourceInfo {
                url: asset_url(file_id, version, "signature"),
                status: VersionStatus::Complete,
                ..Default::default()
            }),
            delta: None,
        }
    }

    fn waiting_version(version: u32) -> FileVersion {
        FileVersion {
            version,
            status: VersionStatus::Waiting,
            file: Some(SubresourceInfo::default()),
            signature: Some(SubresourceInfo::default()),
            delta: None,
        }
    }

    fn pos(calls: &[String], needle: &str) -> usize {
        calls
            .iter()
            .position(|c| c.starts_with(needle))
            .unwrap_or_else(|| panic!("missing call {needle:?} in {calls:#?}"))
    }

    fn has(calls: &[String], needle: &str) -> bool {
        calls.iter().any(|c| c.starts_with(needle))
    }

    async fn run_publish(
        service: &MockService,
        driver: &UploadDriver,
        bundle: &UnpackedBundle,
    ) -> (
        Result<Avatar, PublishError>,
        Vec<ProgressEvent>,
    ) {
        let mut publisher = Publisher::new();
        let mut events_rx = publisher.take_events().unwrap();
        let result = publisher.publish(service, driver, bundle).await;
        drop(publisher);

        let mut events = Vec::new();
        while let Some(event) = events_rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn fresh_avatar_single_platform_simple_upload() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = simple_bundle(dir.path());
        let (sink, sink_handle) = sink_server().await;
        let service = MockService::new(&sink, UploadCategory::Simple);
        let driver = UploadDriver::new(third_vrchat::USER_AGENT).unwrap();

        let (result, events) = run_publish(&service, &driver, &bundle).await;
        let avatar = result.unwrap();
        assert_eq!(avatar.id, BLUEPRINT);

        let calls = service.calls();
        let lookup = pos(&calls, &format!("GET /avatars/{BLUEPRINT}"));
        let thumb_create = pos(&calls, "POST /file .png");
        let thumb_version = pos(&calls, "POST /file/file_1");
        let thumb_show = pos(&calls, "GET /file/file_1");
        let avatar_create = pos(&calls, "POST /avatars");
        let bundle_create = pos(&calls, "POST /file .vrca");
        let bundle_version = pos(&calls, "POST /file/file_2");
        let platform_update = pos(&calls, &format!("PUT /avatars/{BLUEPRINT}"));

        assert!(lookup < thumb_create);
        assert!(thumb_create < thumb_version);
        assert!(thumb_version < thumb_show);
        assert!(thumb_show < avatar_create);
        assert!(avatar_create < bundle_create);
        assert!(bundle_create < bundle_version);
        assert!(bundle_version < platform_update);

        // Both subresources of both files started and finished.
        for file in ["file_1", "file_2"] {
            assert!(has(&calls, &format!("PUT /file/{file}/1/file/start")));
            assert!(has(&calls, &format!("PUT /file/{file}/1/signature/start")));
            assert!(has(&calls, &format!("PUT /file/{file}/1/file/finish")));
            assert!(has(&calls, &format!("PUT /file/{file}/1/signature/finish")));
        }
        assert!(!has(&calls, "DELETE /file/"));
        assert_eq!(
            calls.iter().filter(|c| c.starts_with("PUT /avatars/")).count(),
            1
        );

        // The final update carries the platform metadata.
        let patches = service.patches.lock().unwrap();
        let last = patches.last().unwrap();
        assert_eq!(last["assetUrl"], asset_url("file_2", 1, "file"));
        assert_eq!(last["platform"], "standalonewindows");
        assert_eq!(last["unityVersion"], "2022.3.6f1");
        assert_eq!(last["assetVersion"], 1);

        assert_eq!(
            events,
            vec![
                ProgressEvent::Init,
                ProgressEvent::Thumbnail,
                ProgressEvent::Waiting,
                ProgressEvent::Bundle {
                    part: 0,
                    total_parts: 1,
                    platform_index: 0,
                    total_platforms: 1
                },
                ProgressEvent::Bundle {
                    part: 1,
                    total_parts: 1,
                    platform_index: 0,
                    total_platforms: 1
                },
                ProgressEvent::Completed,
            ]
        );
        sink_handle.abort();
    }

    #[tokio::test]
    async fn existing_avatar_reuses_files_and_reconciles_versions() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = simple_bundle(dir.path());
        let (sink, sink_handle) = sink_server().await;
        let service = MockService::new(&sink, UploadCategory::Simple);

        service.seed_avatar(Avatar {
            id: BLUEPRINT.into(),
            name: "Alice".into(),
            image_url: asset_url("file_img", 1, "file"),
            thumbnail_image_url: "https://api.vrchat.cloud/api/1/image/file_img/1/256".into(),
            release_status: "private".into(),
            unity_packages: vec![UnityPackage {
                id: "unp_1".into(),
                asset_url: Some(asset_url("file_bin", 3, "file")),
                asset_version: Some(1),
                platform: "standalonewindows".into(),
                unity_version: "2022.3.6f1".into(),
                variant: Some("standard".into()),
            }],
        });
        // Thumbnail file is complete; the bundle file has a stale version.
        service.seed_file(RemoteFile {
            id: "file_img".into(),
            versions: vec![complete_version("file_img", 1)],
            ..Default::default()
        });
        service.seed_file(RemoteFile {
            id: "file_bin".into(),
            versions: vec![waiting_version(3)],
            ..Default::default()
        });

        let driver = UploadDriver::new(third_vrchat::USER_AGENT).unwrap();
        let (result, _events) = run_publish(&service, &driver, &bundle).await;
        result.unwrap();

        let calls = service.calls();
        // Reuse: no new files, update instead of create.
        assert!(!has(&calls, "POST /file ."));
        assert!(!has(&calls, "POST /avatars"));
        assert_eq!(
            calls.iter().filter(|c| c.starts_with("PUT /avatars/")).count(),
            2
        );

        // The complete thumbnail version is appended to, not deleted.
        let img_show = pos(&calls, "GET /file/file_img");
        let img_version = pos(&calls, "POST /file/file_img");
        assert!(img_show < img_version);
        assert!(!has(&calls, "DELETE /file/file_img"));

        // The stale bundle version is deleted before the new create.
        let bin_delete = pos(&calls, "DELETE /file/file_bin/3");
        let bin_version = pos(&calls, "POST /file/file_bin");
        assert!(pos(&calls, "GET /file/file_bin") < bin_delete);
        assert!(bin_delete < bin_version);

        sink_handle.abort();
    }

    #[tokio::test]
    async fn multipart_bundle_collects_stripped_etags() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = build_bundle(
            dir.path(),
            &[
                ("metadata.json", manifest_json(&["windows"]).into_bytes()),
                ("thumbnail.png", vec![7u8; 3]),
                ("windows.vrca", b"0123456789".to_vec()),
            ],
        );
        let (sink, sink_handle) = sink_server().await;
        let service = MockService::new(&sink, UploadCategory::Multipart);
        // Part size shrunk so the 10-byte bundle spans three parts.
        let driver = UploadDriver::new(third_vrchat::USER_AGENT)
            .unwrap()
            .with_part_size(4);

        let (result, events) = run_publish(&service, &driver, &bundle).await;
        result.unwrap();

        let calls = service.calls();
        for part in 1..=3 {
            assert!(has(
                &calls,
                &format!("PUT /file/file_2/1/file/start?partNumber={part}")
            ));
        }
        assert!(!has(
            &calls,
            "PUT /file/file_2/1/file/start?partNumber=4"
        ));

        // finish carried one quote-stripped etag per part.
        let etags = service.finished_etags.lock().unwrap();
        let bundle_etags = etags.iter().find(|e| e.len() == 3).unwrap();
        for etag in bundle_etags {
            assert!(etag.starts_with("mock-etag-"), "etag not stripped: {etag}");
            assert!(!etag.contains('"'));
        }

        let bundle_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Bundle { .. }))
            .cloned()
            .collect();
        assert_eq!(
            bundle_events,
            (0..=3)
                .map(|part| ProgressEvent::Bundle {
                    part,
                    total_parts: 3,
                    platform_index: 0,
                    total_platforms: 1
                })
                .collect::<Vec<_>>()
        );
        sink_handle.abort();
    }

    #[tokio::test]
    async fn envelope_payload_is_transcoded_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..5000).map(|i| (i % 97) as u8).collect();
        let mut envelope = vec![0x03u8];
        envelope.extend(zstd::stream::encode_all(&payload[..], 3).unwrap());

        let bundle = build_bundle(
            dir.path(),
            &[
                ("metadata.json", manifest_json(&["windows"]).into_bytes()),
                ("thumbnail.png", vec![7u8; 16]),
                ("windows.vrcaz", envelope),
            ],
        );
        let (sink, sink_handle) = sink_server().await;
        let service = MockService::new(&sink, UploadCategory::Simple);
        let driver = UploadDriver::new(third_vrchat::USER_AGENT).unwrap();

        let (result, _events) = run_publish(&service, &driver, &bundle).await;
        result.unwrap();

        // The canonical bundle holds the decompressed payload; the original
        // envelope is untouched.
        let canonical = bundle.dir().join("windows.vrca");
        assert_eq!(std::fs::read(&canonical).unwrap(), payload);
        assert!(bundle.dir().join("windows.vrcaz").is_file());
        sink_handle.abort();
    }

    #[tokio::test]
    async fn blueprint_conflict_surfaces_named_error() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = simple_bundle(dir.path());
        let (sink, sink_handle) = sink_server().await;
        let service = MockService::new(&sink, UploadCategory::Simple).failing_create();
        let driver = UploadDriver::new(third_vrchat::USER_AGENT).unwrap();

        let (result, events) = run_publish(&service, &driver, &bundle).await;
        let err = result.unwrap_err();
        assert!(matches!(err, PublishError::Api(ApiError::BlueprintIdTaken)));

        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Error {
                message: "Blueprint ID already in use".into()
            })
        );
        sink_handle.abort();
    }

    #[tokio::test]
    async fn cancellation_before_start_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = simple_bundle(dir.path());
        let (sink, sink_handle) = sink_server().await;
        let service = MockService::new(&sink, UploadCategory::Simple);
        let driver = UploadDriver::new(third_vrchat::USER_AGENT).unwrap();

        let mut publisher = Publisher::new();
        let mut events_rx = publisher.take_events().unwrap();
        publisher.cancel_token().cancel();

        let result = publisher.publish(&service, &driver, &bundle).await;
        assert!(matches!(result, Err(PublishError::Cancelled)));
        assert!(service.calls().is_empty());

        drop(publisher);
        let mut events = Vec::new();
        while let Some(event) = events_rx.recv().await {
            events.push(event);
        }
        // No error event on cancellation.
        assert_eq!(events, vec![ProgressEvent::Init]);
        sink_handle.abort();
    }

    #[tokio::test]
    async fn signatures_are_written_next_to_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = simple_bundle(dir.path());
        let (sink, sink_handle) = sink_server().await;
        let service = MockService::new(&sink, UploadCategory::Simple);
        let driver = UploadDriver::new(third_vrchat::USER_AGENT).unwrap();

        let (result, _events) = run_publish(&service, &driver, &bundle).await;
        result.unwrap();

        assert!(bundle.dir().join("thumbnail.png.sig").is_file());
        assert!(bundle.dir().join("windows.vrca.sig").is_file());
        sink_handle.abort();
    }

    #[tokio::test]
    async fn republish_reuses_files_from_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = simple_bundle(dir.path());
        let (sink, sink_handle) = sink_server().await;
        let service = MockService::new(&sink, UploadCategory::Simple);
        let driver = UploadDriver::new(third_vrchat::USER_AGENT).unwrap();

        let (first, _) = run_publish(&service, &driver, &bundle).await;
        let first = first.unwrap();
        service.clear_calls();

        let (second, _) = run_publish(&service, &driver, &bundle).await;
        let second = second.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, second.name);

        // Second run appends versions to the files created by the first.
        let calls = service.calls();
        assert!(!has(&calls, "POST /file ."));
        assert!(!has(&calls, "POST /avatars"));
        assert!(has(&calls, "POST /file/file_1"));
        assert!(has(&calls, "POST /file/file_2"));
        sink_handle.abort();
    }
}
