//! The avatar-service seam.
//!
//! The orchestrator talks to the service through this trait rather than the
//! HTTP client directly; tests script a mock, the app binds
//! [`LiveAvatarService`] over the REST client and session cookies.

use std::future::Future;
use std::pin::Pin;

use third_vrchat::{
    ApiClient, ApiError, Avatar, AvatarPatch, CookieJar, CreateAvatarRequest, CreateFileRequest,
    CreateVersionRequest, FileSubresource, RemoteFile,
};

/// Everything the publication pipeline needs from the service.
pub trait AvatarService: Send + Sync {
    fn get_avatar(
        &self,
        avatar_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Avatar>, ApiError>> + Send + '_>>;

    fn create_avatar(
        &self,
        request: &CreateAvatarRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Avatar, ApiError>> + Send + '_>>;

    fn update_avatar(
        &self,
        avatar_id: &str,
        patch: &AvatarPatch,
    ) -> Pin<Box<dyn Future<Output = Result<Avatar, ApiError>> + Send + '_>>;

    fn create_file(
        &self,
        request: &CreateFileRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>>;

    fn create_file_version(
        &self,
        file_id: &str,
        request: &CreateVersionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>>;

    fn show_file(
        &self,
        file_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>>;

    fn delete_file_version(
        &self,
        file_id: &str,
        version: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + '_>>;

    fn start_file_upload(
        &self,
        file_id: &str,
        version: u32,
        subresource: FileSubresource,
        part_number: Option<u32>,
    ) -> Pin<Box<dyn Future<Output = Result<String, ApiError>> + Send + '_>>;

    fn finish_file_upload(
        &self,
        file_id: &str,
        version: u32,
        subresource: FileSubresource,
        etags: Option<Vec<String>>,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>>;
}

/// Production implementation: the REST client bound to a session's cookies.
pub struct LiveAvatarService {
    api: ApiClient,
    jar: CookieJar,
}

impl LiveAvatarService {
    pub fn new(api: ApiClient, jar: CookieJar) -> Self {
        Self { api, jar }
    }
}

impl AvatarService for LiveAvatarService {
    fn get_avatar(
        &self,
        avatar_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Avatar>, ApiError>> + Send + '_>> {
        let avatar_id = avatar_id.to_string();
        Box::pin(async move { self.api.get_avatar(&self.jar, &avatar_id).await })
    }

    fn create_avatar(
        &self,
        request: &CreateAvatarRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Avatar, ApiError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move { self.api.create_avatar(&self.jar, &request).await })
    }

    fn update_avatar(
        &self,
        avatar_id: &str,
        patch: &AvatarPatch,
    ) -> Pin<Box<dyn Future<Output = Result<Avatar, ApiError>> + Send + '_>> {
        let avatar_id = avatar_id.to_string();
        let patch = patch.clone();
        Box::pin(async move { self.api.update_avatar(&self.jar, &avatar_id, &patch).await })
    }

    fn create_file(
        &self,
        request: &CreateFileRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move { self.api.create_file(&self.jar, &request).await })
    }

    fn create_file_version(
        &self,
        file_id: &str,
        request: &CreateVersionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>> {
        let file_id = file_id.to_string();
        let request = request.clone();
        Box::pin(async move {
            self.api
                .create_file_version(&self.jar, &file_id, &request)
                .await
        })
    }

    fn show_file(
        &self,
        file_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>> {
        let file_id = file_id.to_string();
        Box::pin(async move { self.api.show_file(&self.jar, &file_id).await })
    }

    fn delete_file_version(
        &self,
        file_id: &str,
        version: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + '_>> {
        let file_id = file_id.to_string();
        Box::pin(async move {
            self.api
                .delete_file_version(&self.jar, &file_id, version)
                .await
        })
    }

    fn start_file_upload(
        &self,
        file_id: &str,
        version: u32,
        subresource: FileSubresource,
        part_number: Option<u32>,
    ) -> Pin<Box<dyn Future<Output = Result<String, ApiError>> + Send + '_>> {
        let file_id = file_id.to_string();
        Box::pin(async move {
            self.api
                .start_file_upload(&self.jar, &file_id, version, subresource, part_number)
                .await
        })
    }

    fn finish_file_upload(
        &self,
        file_id: &str,
        version: u32,
        subresource: FileSubresource,
        etags: Option<Vec<String>>,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteFile, ApiError>> + Send + '_>> {
        let file_id = file_id.to_string();
        Box::pin(async move {
            self.api
                .finish_file_upload(&self.jar, &file_id, version, subresource, etags)
                .await
        })
    }
}
