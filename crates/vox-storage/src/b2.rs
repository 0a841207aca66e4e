//! Backblaze B2 artifact store
//!
//! Native B2 API (v2). The account authorization is cached and refreshed once
//! whenever a call comes back 401. Files live in a private bucket and are only
//! ever served through the API's audio proxy.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vox_core::storage::{
    proxy_url, ArtifactKey, ArtifactStore, DownloadedArtifact, StorageError, StoredArtifact,
};
use vox_core::B2Config;

use crate::error::{Result, StorageBackendError};

const DEFAULT_API_URL: &str = "https://api.backblazeb2.com";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct B2Auth {
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct B2File {
    pub file_id: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<B2File>,
}

/// Percent-encode each path segment, keeping the separators
pub fn encode_file_name(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(StorageBackendError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| StorageBackendError::InvalidResponse(e.to_string()))
}

/// B2 client bound to one bucket
pub struct B2Client {
    client: Client,
    config: B2Config,
    auth: RwLock<Option<B2Auth>>,
}

impl B2Client {
    pub fn new(config: B2Config) -> Result<Self> {
        if config.key_id.is_empty() || config.application_key.is_empty() {
            return Err(StorageBackendError::Config(
                "B2 requires key_id and application_key".to_string(),
            ));
        }
        if config.bucket_id.is_empty() || config.bucket_name.is_empty() {
            return Err(StorageBackendError::Config(
                "B2 requires bucket_id and bucket_name".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| StorageBackendError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            auth: RwLock::new(None),
        })
    }

    fn auth_url(&self) -> String {
        let base = self.config.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        format!("{}/b2api/v2/b2_authorize_account", base.trim_end_matches('/'))
    }

    async fn authorization(&self) -> Result<B2Auth> {
        if let Some(auth) = self.auth.read().await.as_ref() {
            return Ok(auth.clone());
        }

        let mut slot = self.auth.write().await;
        if let Some(auth) = slot.as_ref() {
            return Ok(auth.clone());
        }

        let response = self
            .client
            .get(self.auth_url())
            .basic_auth(&self.config.key_id, Some(&self.config.application_key))
            .send()
            .await?;
        let auth: B2Auth = parse(check(response).await?).await?;
        info!("Authorized B2 account (api {})", auth.api_url);

        *slot = Some(auth.clone());
        Ok(auth)
    }

    async fn invalidate(&self) {
        *self.auth.write().await = None;
    }

    /// Run `op`, re-authorizing and retrying once on 401
    async fn with_reauth<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(B2Auth) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let auth = self.authorization().await?;
        match op(auth).await {
            Err(e) if e.is_unauthorized() => {
                warn!("B2 authorization rejected, re-authorizing");
                self.invalidate().await;
                let auth = self.authorization().await?;
                op(auth).await
            }
            other => other,
        }
    }

    fn api(&self, auth: &B2Auth, name: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/b2api/v2/{}", auth.api_url, name))
            .header("Authorization", &auth.authorization_token)
    }

    async fn api_call<T: DeserializeOwned>(&self, name: &str, body: serde_json::Value) -> Result<T> {
        let body = &body;
        self.with_reauth(|auth| async move {
            let response = self.api(&auth, name).json(body).send().await?;
            parse(check(response).await?).await
        })
        .await
    }

    /// Upload through a fresh upload URL
    pub async fn upload_file(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<B2File> {
        let bytes = &bytes;
        let file_name = encode_file_name(path);
        let file_name = &file_name;

        self.with_reauth(|auth| async move {
            let target: UploadTarget = {
                let response = self
                    .api(&auth, "b2_get_upload_url")
                    .json(&serde_json::json!({ "bucketId": self.config.bucket_id }))
                    .send()
                    .await?;
                parse(check(response).await?).await?
            };

            let response = self
                .client
                .post(&target.upload_url)
                .header("Authorization", &target.authorization_token)
                .header("X-Bz-File-Name", file_name.as_str())
                .header("Content-Type", content_type)
                .header("X-Bz-Content-Sha1", "do_not_verify")
                .body(bytes.clone())
                .send()
                .await?;
            parse(check(response).await?).await
        })
        .await
    }

    /// Download by name from the private bucket
    pub async fn download_file(&self, path: &str) -> Result<(Vec<u8>, String)> {
        let file_name = encode_file_name(path);
        let file_name = &file_name;

        self.with_reauth(|auth| async move {
            let url = format!(
                "{}/file/{}/{}",
                auth.download_url, self.config.bucket_name, file_name
            );
            let response = self
                .client
                .get(&url)
                .header("Authorization", &auth.authorization_token)
                .send()
                .await?;

            let response = match check(response).await {
                Err(StorageBackendError::Api { status: 404, .. }) => {
                    return Err(StorageBackendError::NotFound(path.to_string()));
                }
                other => other?,
            };

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = response.bytes().await?;
            Ok((bytes.to_vec(), content_type))
        })
        .await
    }

    /// Resolve the newest version's file id for `path`
    pub async fn find_file(&self, path: &str) -> Result<Option<B2File>> {
        let list: FileList = self
            .api_call(
                "b2_list_file_names",
                serde_json::json!({
                    "bucketId": self.config.bucket_id,
                    "startFileName": path,
                    "prefix": path,
                    "maxFileCount": 1,
                }),
            )
            .await?;
        Ok(list.files.into_iter().find(|f| f.file_name == path))
    }

    /// Delete one file version. A file that no longer exists counts as deleted.
    pub async fn delete_file(&self, path: &str, file_id: Option<&str>) -> Result<()> {
        let file_id = match file_id {
            Some(id) => id.to_string(),
            None => match self.find_file(path).await? {
                Some(file) => file.file_id,
                None => {
                    debug!("B2 file {} already absent", path);
                    return Ok(());
                }
            },
        };

        let deleted: Result<B2File> = self
            .api_call(
                "b2_delete_file_version",
                serde_json::json!({ "fileName": path, "fileId": file_id }),
            )
            .await;
        match deleted {
            Ok(_) => Ok(()),
            Err(StorageBackendError::Api { status: 404, .. }) => {
                debug!("B2 file {} already absent", path);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ArtifactStore for B2Client {
    async fn upload(
        &self,
        key: &ArtifactKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> std::result::Result<StoredArtifact, StorageError> {
        let path = key.path();
        let size = bytes.len();
        let file = self
            .upload_file(&path, bytes, content_type)
            .await
            .map_err(StorageBackendError::upload)?;
        info!("Uploaded {} to B2 ({} bytes)", path, size);

        Ok(StoredArtifact {
            url: proxy_url(&path),
            path,
            file_id: Some(file.file_id),
        })
    }

    async fn download(&self, path: &str) -> std::result::Result<DownloadedArtifact, StorageError> {
        let (bytes, content_type) = self
            .download_file(path)
            .await
            .map_err(StorageBackendError::download)?;
        debug!("Downloaded {} from B2 ({} bytes)", path, bytes.len());

        Ok(DownloadedArtifact {
            length: bytes.len(),
            bytes,
            content_type,
        })
    }

    async fn delete(&self, path: &str, file_id: Option<&str>) -> std::result::Result<(), StorageError> {
        self.delete_file(path, file_id)
            .await
            .map_err(StorageBackendError::delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vox_core::generation::RecordKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> B2Config {
        B2Config {
            key_id: "kid".to_string(),
            application_key: "appkey".to_string(),
            bucket_id: "bucket-1".to_string(),
            bucket_name: "vox-audio".to_string(),
            api_url: Some(server.uri()),
        }
    }

    async fn mount_authorize(server: &MockServer, expected: u64) {
        Mock::given(method("GET"))
            .and(path("/b2api/v2/b2_authorize_account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accountId": "acct",
                "authorizationToken": "acct-token",
                "apiUrl": server.uri(),
                "downloadUrl": server.uri(),
            })))
            .expect(expected)
            .mount(server)
            .await;
    }

    fn key() -> ArtifactKey {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        ArtifactKey::new(RecordKind::Speech, "u1", "g1", "mp3", at)
    }

    #[test]
    fn test_encode_file_name() {
        assert_eq!(encode_file_name("audio/u1/2026/03/g1.mp3"), "audio/u1/2026/03/g1.mp3");
        assert_eq!(encode_file_name("audio/user 1/x+y.mp3"), "audio/user%201/x%2By.mp3");
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = B2Config {
            key_id: "kid".to_string(),
            ..Default::default()
        };
        assert!(B2Client::new(config).is_err());
    }

    #[tokio::test]
    async fn test_upload() {
        let server = MockServer::start().await;
        mount_authorize(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_get_upload_url"))
            .and(header("Authorization", "acct-token"))
            .and(body_partial_json(serde_json::json!({ "bucketId": "bucket-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bucketId": "bucket-1",
                "uploadUrl": format!("{}/upload", server.uri()),
                "authorizationToken": "upload-token",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("Authorization", "upload-token"))
            .and(header("X-Bz-File-Name", "audio/u1/2026/03/g1.mp3"))
            .and(header("X-Bz-Content-Sha1", "do_not_verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fileId": "4_zfile",
                "fileName": "audio/u1/2026/03/g1.mp3",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = B2Client::new(config(&server)).unwrap();
        let stored = client.upload(&key(), b"audio".to_vec(), "audio/mpeg").await.unwrap();
        assert_eq!(stored.path, "audio/u1/2026/03/g1.mp3");
        assert_eq!(stored.file_id.as_deref(), Some("4_zfile"));
        assert_eq!(stored.url, "/api/audio/audio/u1/2026/03/g1.mp3");
    }

    #[tokio::test]
    async fn test_reauthorizes_once_on_401() {
        let server = MockServer::start().await;
        mount_authorize(&server, 2).await;
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_list_file_names"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired_auth_token"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_list_file_names"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "fileId": "fid-9", "fileName": "audio/u1/2026/03/g1.mp3" }]
            })))
            .mount(&server)
            .await;

        let client = B2Client::new(config(&server)).unwrap();
        let file = client.find_file("audio/u1/2026/03/g1.mp3").await.unwrap();
        assert_eq!(file.unwrap().file_id, "fid-9");
    }

    #[tokio::test]
    async fn test_delete_looks_up_file_id() {
        let server = MockServer::start().await;
        mount_authorize(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_list_file_names"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "fileId": "fid-1", "fileName": "music/u1/2026/03/g2.mp3" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_delete_file_version"))
            .and(body_partial_json(serde_json::json!({
                "fileName": "music/u1/2026/03/g2.mp3",
                "fileId": "fid-1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fileId": "fid-1",
                "fileName": "music/u1/2026/03/g2.mp3",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = B2Client::new(config(&server)).unwrap();
        client.delete("music/u1/2026/03/g2.mp3", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_ok() {
        let server = MockServer::start().await;
        mount_authorize(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_list_file_names"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "fileId": "other", "fileName": "music/u1/2026/03/g3.mp3" }]
            })))
            .mount(&server)
            .await;

        let client = B2Client::new(config(&server)).unwrap();
        assert!(client.delete("music/u1/2026/03/g2.mp3", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported() {
        let server = MockServer::start().await;
        mount_authorize(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_delete_file_version"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let client = B2Client::new(config(&server)).unwrap();
        let err = client.delete("audio/u1/2026/03/g1.mp3", Some("fid")).await.unwrap_err();
        assert!(matches!(err, StorageError::Delete(_)));
    }

    #[tokio::test]
    async fn test_download() {
        let server = MockServer::start().await;
        mount_authorize(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/file/vox-audio/audio/u1/2026/03/g1.mp3"))
            .and(header("Authorization", "acct-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(b"mp3".to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file/vox-audio/audio/u1/2026/03/missing.mp3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = B2Client::new(config(&server)).unwrap();
        let artifact = client.download("audio/u1/2026/03/g1.mp3").await.unwrap();
        assert_eq!(artifact.bytes, b"mp3");
        assert_eq!(artifact.content_type, "audio/mpeg");
        assert_eq!(artifact.length, 3);

        let err = client.download("audio/u1/2026/03/missing.mp3").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
