use std::future::Future;
use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;

use reqwest::Body;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::{PART_SIZE, UploadError};

/// Supplies the pre-signed URL for each part of a multipart upload.
///
/// Implemented over the service client by the orchestrator; a trait keeps
/// the driver transport-agnostic and testable with canned URLs.
pub trait PartUrlSource: Send + Sync {
    fn part_url(
        &self,
        part_number: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String, UploadError>> + Send + '_>>;
}

/// Number of parts needed for `size` bytes at the given part size. A zero
/// byte file still occupies one (empty) part.
pub fn part_count(size: u64, part_size: u64) -> u32 {
    size.div_ceil(part_size).max(1) as u32
}

/// Streams file bytes to pre-signed URLs.
///
/// Unlike the control-plane client this one carries no total request
/// timeout; a multi-gigabyte PUT is bounded only by the transport's
/// chunk-level timeouts.
pub struct UploadDriver {
    http: reqwest::Client,
    part_size: u64,
}

impl UploadDriver {
    pub fn new(user_agent: &'static str) -> Result<Self, UploadError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            part_size: PART_SIZE,
        })
    }

    /// Overrides the part size. The service protocol fixes it at
    /// [`PART_SIZE`]; smaller values are for exercising the part loop.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// PUTs the whole file to `url` in one request, streaming from disk.
    ///
    /// `content_md5` is the Base64 MD5 of the file. Progress is reported as
    /// a single part: `(0, 1)` at start, `(1, 1)` on completion.
    pub async fn upload_simple(
        &self,
        url: &str,
        path: &Path,
        mime: &str,
        content_md5: &str,
        progress: &(dyn Fn(u32, u32) + Send + Sync),
    ) -> Result<(), UploadError> {
        progress(0, 1);

        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let stream = ReaderStream::new(file);

        let response = self
            .http
            .put(url)
            .header(CONTENT_TYPE, mime)
            .header("Content-MD5", content_md5)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Failure {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        tracing::debug!(path = %path.display(), length, "simple upload complete");
        progress(1, 1);
        Ok(())
    }

    /// Uploads the file in parts, collecting one etag per part, and returns
    /// the etags in part order.
    ///
    /// Parts go up sequentially; the first failure aborts the remainder.
    /// Progress is `(completed, total)` at the start of each part and once
    /// more on completion.
    pub async fn upload_multipart(
        &self,
        source: &dyn PartUrlSource,
        path: &Path,
        progress: &(dyn Fn(u32, u32) + Send + Sync),
    ) -> Result<Vec<String>, UploadError> {
        let size = tokio::fs::metadata(path).await?.len();
        let total_parts = part_count(size, self.part_size);
        let mut etags: Vec<String> = Vec::with_capacity(total_parts as usize);

        for part in 1..=total_parts {
            progress(part - 1, total_parts);

            let url = source.part_url(part).await?;
            let start = u64::from(part - 1) * self.part_size;
            let length = self.part_size.min(size - start);

            let etag = self
                .put_range(&url, path, start, length)
                .await?
                .ok_or(UploadError::EtagMissing(part))?;
            etags.push(trim_etag(&etag));

            tracing::debug!(part, total_parts, length, "part uploaded");
        }
        progress(total_parts, total_parts);

        let filled = etags.iter().filter(|e| !e.is_empty()).count();
        if filled != total_parts as usize {
            return Err(UploadError::PartsIncomplete {
                filled,
                total: total_parts as usize,
            });
        }
        Ok(etags)
    }

    /// PUTs `length` bytes of the file starting at `start`, streamed from
    /// disk, and returns the response `ETag` if present.
    async fn put_range(
        &self,
        url: &str,
        path: &Path,
        start: u64,
        length: u64,
    ) -> Result<Option<String>, UploadError> {
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let stream = ReaderStream::new(file.take(length));

        let response = self
            .http
            .put(url)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Failure {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_owned());
        Ok(etag)
    }
}

/// Strips the quotes object stores wrap etags in.
fn trim_etag(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}
