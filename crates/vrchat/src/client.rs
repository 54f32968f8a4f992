use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue, SET_COOKIE, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::cookies::{CookieJar, parse_set_cookie};
use crate::models::{
    Avatar, AvatarPatch, CreateAvatarRequest, CreateFileRequest, CreateVersionRequest,
    FileSubresource, FinishUploadRequest, LoginResponse, PresignedUrl, RemoteFile, TwoFactorBody,
    TwoFactorKind, User,
};
use crate::ApiError;

/// Control-plane request timeout. Body-streaming uploads use their own
/// client without one.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Typed client for the service REST API.
///
/// Immutable after construction; authenticated calls take the cookie jar
/// explicitly so one client serves every session stage.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new() -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: crate::BASE_URL.to_string(),
        })
    }

    /// Points the client at a different base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    /// Fetches the current user.
    ///
    /// With `credentials`, sends HTTP Basic with percent-encoded username and
    /// password; otherwise relies on `cookies` alone. A 401 maps to
    /// [`LoginResponse::InvalidCredentials`] rather than an error, and any
    /// `auth` cookie in the response is captured.
    pub async fn get_user(
        &self,
        credentials: Option<(&str, &str)>,
        cookies: &CookieJar,
    ) -> Result<LoginResponse, ApiError> {
        let mut request = self.http.get(format!("{}/auth/user", self.base_url));
        if let Some((username, password)) = credentials {
            let token = basic_credentials(username, password);
            request = request.header(AUTHORIZATION, format!("Basic {token}"));
        }
        if !cookies.is_empty() {
            request = request.header(COOKIE, cookies.header_value());
        }

        let response = request.send().await?;
        let status = response.status();
        let new_auth = response_cookie(response.headers(), "auth");

        if status == StatusCode::UNAUTHORIZED {
            return Ok(LoginResponse::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }

        let body = response.text().await?;
        if let Ok(two_factor) = serde_json::from_str::<TwoFactorBody>(&body)
            && !two_factor.requires_two_factor_auth.is_empty()
        {
            let kinds = two_factor
                .requires_two_factor_auth
                .iter()
                .filter_map(|kind| TwoFactorKind::from_wire(kind))
                .collect();
            let auth_cookie = new_auth
                .or_else(|| (!cookies.auth.is_empty()).then(|| cookies.auth.clone()))
                .unwrap_or_default();
            return Ok(LoginResponse::TwoFactorRequired { kinds, auth_cookie });
        }

        let user: User = serde_json::from_str(&body)?;
        Ok(LoginResponse::Success {
            user,
            auth_cookie: new_auth,
        })
    }

    /// Verifies a second factor and returns the `twoFactorAuth` cookie.
    pub async fn verify_two_factor(
        &self,
        auth_cookie: &str,
        kind: TwoFactorKind,
        code: &str,
    ) -> Result<String, ApiError> {
        let url = format!(
            "{}/auth/twofactorauth/{}/verify",
            self.base_url,
            kind.endpoint()
        );
        let response = self
            .http
            .post(url)
            .header(COOKIE, format!("auth={auth_cookie}"))
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            return Err(ApiError::TwoFactorFailed);
        }
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }

        response_cookie(response.headers(), "twoFactorAuth").ok_or(ApiError::TwoFactorFailed)
    }

    /// Revalidates the session cookies against `GET /auth`.
    pub async fn check_auth(&self, cookies: &CookieJar) -> Result<bool, ApiError> {
        #[derive(Deserialize)]
        struct AuthCheck {
            #[serde(default)]
            ok: bool,
        }

        let response = self
            .http
            .get(format!("{}/auth", self.base_url))
            .header(COOKIE, cookies.header_value())
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(false);
        }
        let check: AuthCheck = json_or_error(response).await?;
        Ok(check.ok)
    }

    /// Ends the session server-side. Best-effort: failures are logged and
    /// swallowed.
    pub async fn logout(&self, cookies: &CookieJar) {
        let result = self
            .http
            .put(format!("{}/logout", self.base_url))
            .header(COOKIE, cookies.header_value())
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(status = %response.status(), "logout rejected");
            }
            Ok(_) => tracing::debug!("logged out"),
            Err(error) => tracing::warn!(%error, "logout request failed"),
        }
    }

    // -----------------------------------------------------------------------
    // File lifecycle
    // -----------------------------------------------------------------------

    /// Creates a new file shell with no versions.
    pub async fn create_file(
        &self,
        cookies: &CookieJar,
        request: &CreateFileRequest,
    ) -> Result<RemoteFile, ApiError> {
        let response = self
            .http
            .post(format!("{}/file", self.base_url))
            .header(COOKIE, cookies.header_value())
            .json(request)
            .send()
            .await?;
        json_or_error(response).await
    }

    /// Creates the next version on a file from the payload and signature
    /// digests.
    pub async fn create_file_version(
        &self,
        cookies: &CookieJar,
        file_id: &str,
        request: &CreateVersionRequest,
    ) -> Result<RemoteFile, ApiError> {
        let response = self
            .http
            .post(format!("{}/file/{file_id}", self.base_url))
            .header(COOKIE, cookies.header_value())
            .json(request)
            .send()
            .await?;
        json_or_error(response).await
    }

    /// Fetches a pre-signed PUT URL for one subresource of a version.
    ///
    /// `part_number` is supplied only for multipart file uploads.
    pub async fn start_file_upload(
        &self,
        cookies: &CookieJar,
        file_id: &str,
        version: u32,
        subresource: FileSubresource,
        part_number: Option<u32>,
    ) -> Result<String, ApiError> {
        let url = format!(
            "{}/file/{file_id}/{version}/{}/start",
            self.base_url,
            subresource.as_str()
        );
        let mut request = self.http.put(url).header(COOKIE, cookies.header_value());
        if let Some(part) = part_number {
            request = request.query(&[("partNumber", part.to_string())]);
        }
        let response = request.send().await?;
        let presigned: PresignedUrl = json_or_error(response).await?;
        Ok(presigned.url)
    }

    /// Marks one subresource of a version uploaded. `etags` is required iff
    /// the subresource was multipart.
    pub async fn finish_file_upload(
        &self,
        cookies: &CookieJar,
        file_id: &str,
        version: u32,
        subresource: FileSubresource,
        etags: Option<Vec<String>>,
    ) -> Result<RemoteFile, ApiError> {
        let url = format!(
            "{}/file/{file_id}/{version}/{}/finish",
            self.base_url,
            subresource.as_str()
        );
        let response = self
            .http
            .put(url)
            .header(COOKIE, cookies.header_value())
            .json(&FinishUploadRequest { etags })
            .send()
            .await?;
        json_or_error(response).await
    }

    /// Fetches the current state of a file.
    pub async fn show_file(
        &self,
        cookies: &CookieJar,
        file_id: &str,
    ) -> Result<RemoteFile, ApiError> {
        let response = self
            .http
            .get(format!("{}/file/{file_id}", self.base_url))
            .header(COOKIE, cookies.header_value())
            .send()
            .await?;
        json_or_error(response).await
    }

    /// Deletes a trailing non-complete version so a new one can be created.
    pub async fn delete_file_version(
        &self,
        cookies: &CookieJar,
        file_id: &str,
        version: u32,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(format!("{}/file/{file_id}/{version}", self.base_url))
            .header(COOKIE, cookies.header_value())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Avatar lifecycle
    // -----------------------------------------------------------------------

    /// Fetches an avatar; a 404 means it does not exist yet.
    pub async fn get_avatar(
        &self,
        cookies: &CookieJar,
        avatar_id: &str,
    ) -> Result<Option<Avatar>, ApiError> {
        let response = self
            .http
            .get(format!("{}/avatars/{avatar_id}", self.base_url))
            .header(COOKIE, cookies.header_value())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(json_or_error(response).await?))
    }

    /// Creates an avatar. The service answers a blueprint-id collision with
    /// a bare 500, surfaced as [`ApiError::BlueprintIdTaken`].
    pub async fn create_avatar(
        &self,
        cookies: &CookieJar,
        request: &CreateAvatarRequest,
    ) -> Result<Avatar, ApiError> {
        let response = self
            .http
            .post(format!("{}/avatars", self.base_url))
            .header(COOKIE, cookies.header_value())
            .json(request)
            .send()
            .await?;
        if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
            return Err(ApiError::BlueprintIdTaken);
        }
        json_or_error(response).await
    }

    /// Applies a partial update to an avatar.
    pub async fn update_avatar(
        &self,
        cookies: &CookieJar,
        avatar_id: &str,
        patch: &AvatarPatch,
    ) -> Result<Avatar, ApiError> {
        let response = self
            .http
            .put(format!("{}/avatars/{avatar_id}", self.base_url))
            .header(COOKIE, cookies.header_value())
            .json(patch)
            .send()
            .await?;
        json_or_error(response).await
    }
}

/// Basic-auth token with percent-encoded username and password.
pub(crate) fn basic_credentials(username: &str, password: &str) -> String {
    let user = utf8_percent_encode(username, NON_ALPHANUMERIC);
    let pass = utf8_percent_encode(password, NON_ALPHANUMERIC);
    STANDARD.encode(format!("{user}:{pass}"))
}

/// First value of `name` across all `Set-Cookie` response headers.
fn response_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(SET_COOKIE) {
        if let Ok(raw) = header.to_str() {
            for (cookie_name, value) in parse_set_cookie(raw) {
                if cookie_name == name && !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

async fn json_or_error<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(api_error(status, response).await);
    }
    Ok(response.json().await?)
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> ApiError {
    let body = response.text().await.unwrap_or_default();
    ApiError::Api {
        status: status.as_u16(),
        body,
    }
}
