//! Remote artifact upload
//!
//! The pipeline hands every archive part to a [`RemoteUploader`] together with
//! a caption and stores the link it returns. Two uploaders ship with the crate:
//! [`HttpUploader`] posts parts to an HTTP endpoint, [`DirectoryUploader`]
//! copies them into a mirror directory (useful for local deployments and tests).

use crate::error::UploadError;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Destination for archive parts
#[async_trait]
pub trait RemoteUploader: Send + Sync {
    /// Upload one local file with a caption and return its remote link
    ///
    /// Fails with [`UploadError::NotAuthorized`] when the uploading identity
    /// is not established.
    async fn upload(&self, local_path: &Path, caption: &str) -> Result<String>;
}

/// Response body expected from the upload endpoint
#[derive(Debug, Deserialize)]
struct UploadResponse {
    link: String,
}

/// Uploads parts as `multipart/form-data` POSTs with a bearer token
///
/// The form carries a `caption` text field and a `file` part. The endpoint
/// must answer with JSON `{"link": "..."}`.
#[derive(Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUploader")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpUploader {
    /// Create an uploader for `url`; `None` token means not yet authorized
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
            timeout,
        }
    }

    /// Build an uploader from the upload settings, if an endpoint is configured
    pub fn from_config(config: &crate::config::Config) -> Option<Self> {
        let upload = &config.upload;
        upload.upload_url.as_ref().map(|url| {
            Self::new(url.clone(), upload.upload_token.clone(), upload.upload_timeout)
        })
    }

    async fn send(&self, local_path: &Path, caption: &str, token: &str) -> Result<String> {
        let fail = |reason: String| UploadError::Failed {
            path: local_path.to_path_buf(),
            reason,
        };

        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| fail(format!("failed to open part: {}", e)))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| fail(format!("failed to stat part: {}", e)))?
            .len();
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "part".to_string());

        let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(file));
        let part = reqwest::multipart::Part::stream_with_length(body, len)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| fail(format!("invalid mime type: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("caption", caption.to_string())
            .part("file", part);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(UploadError::NotAuthorized.into());
        }
        if !status.is_success() {
            return Err(fail(format!("server responded with {}", status)).into());
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| fail(format!("invalid response body: {}", e)))?;
        Ok(body.link)
    }
}

#[async_trait]
impl RemoteUploader for HttpUploader {
    async fn upload(&self, local_path: &Path, caption: &str) -> Result<String> {
        let Some(token) = self.token.as_deref() else {
            return Err(UploadError::NotAuthorized.into());
        };

        tracing::debug!(path = ?local_path, caption, "uploading part");

        match tokio::time::timeout(self.timeout, self.send(local_path, caption, token)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(path = ?local_path, timeout = ?self.timeout, "upload timed out");
                Err(UploadError::Failed {
                    path: local_path.to_path_buf(),
                    reason: format!("upload timed out after {:?}", self.timeout),
                }
                .into())
            }
        }
    }
}

/// Copies parts into a mirror directory and returns `file://` links
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    dir: PathBuf,
}

impl DirectoryUploader {
    /// Uploader mirroring into `dir` (created on first upload)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RemoteUploader for DirectoryUploader {
    async fn upload(&self, local_path: &Path, caption: &str) -> Result<String> {
        let fail = |reason: String| -> Error {
            UploadError::Failed {
                path: local_path.to_path_buf(),
                reason,
            }
            .into()
        };

        let file_name = local_path
            .file_name()
            .ok_or_else(|| fail("part has no file name".to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| fail(format!("failed to create mirror directory: {}", e)))?;

        let target = self.dir.join(file_name);
        tokio::fs::copy(local_path, &target)
            .await
            .map_err(|e| fail(format!("failed to copy part: {}", e)))?;

        let target = tokio::fs::canonicalize(&target).await.unwrap_or(target);
        tracing::debug!(path = ?target, caption, "part mirrored");
        Ok(format!("file://{}", target.display()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn part_file(dir: &TempDir) -> PathBuf {
        let part = dir.path().join("abc.7z.001");
        std::fs::write(&part, b"encrypted bytes").unwrap();
        part
    }

    #[tokio::test]
    async fn http_upload_returns_link() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"link": "https://cdn.example/abc/1"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = HttpUploader::new(
            format!("{}/upload", mock_server.uri()),
            Some("tok".to_string()),
            Duration::from_secs(10),
        );

        let link = uploader
            .upload(&part_file(&dir), "Base - Part 1/1")
            .await
            .unwrap();
        assert_eq!(link, "https://cdn.example/abc/1");
    }

    #[tokio::test]
    async fn http_upload_sends_caption_field() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"link": "l"})),
            )
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = HttpUploader::new(
            format!("{}/upload", mock_server.uri()),
            Some("tok".to_string()),
            Duration::from_secs(10),
        );
        uploader
            .upload(&part_file(&dir), "DLC - Part 2/3")
            .await
            .unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("DLC - Part 2/3"));
        assert!(body.contains("abc.7z.001"));
        assert!(body.contains("encrypted bytes"));
    }

    #[tokio::test]
    async fn http_forbidden_is_not_authorized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = HttpUploader::new(
            mock_server.uri(),
            Some("expired".to_string()),
            Duration::from_secs(10),
        );

        let err = uploader.upload(&part_file(&dir), "c").await.unwrap_err();
        assert!(matches!(err, Error::Upload(UploadError::NotAuthorized)));
    }

    #[tokio::test]
    async fn http_server_error_is_upload_failed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader =
            HttpUploader::new(mock_server.uri(), Some("t".into()), Duration::from_secs(10));

        let err = uploader.upload(&part_file(&dir), "c").await.unwrap_err();
        assert_eq!(err.error_code(), "upload_failed");
    }

    #[tokio::test]
    async fn missing_token_is_not_authorized_without_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = HttpUploader::new(mock_server.uri(), None, Duration::from_secs(10));
        let err = uploader.upload(&part_file(&dir), "c").await.unwrap_err();
        assert!(matches!(err, Error::Upload(UploadError::NotAuthorized)));
    }

    #[tokio::test]
    async fn directory_uploader_copies_and_links() {
        let src = TempDir::new().unwrap();
        let mirror = TempDir::new().unwrap();
        let uploader = DirectoryUploader::new(mirror.path().join("store"));

        let link = uploader
            .upload(&part_file(&src), "Update - Part 1/1")
            .await
            .unwrap();

        assert!(link.starts_with("file://"));
        assert!(link.ends_with("abc.7z.001"));
        let copied = std::fs::read(mirror.path().join("store").join("abc.7z.001")).unwrap();
        assert_eq!(copied, b"encrypted bytes");
    }

    #[test]
    fn debug_output_redacts_token() {
        let uploader = HttpUploader::new("http://x", Some("s3cret".into()), Duration::from_secs(1));
        assert!(!format!("{uploader:?}").contains("s3cret"));
    }
}
