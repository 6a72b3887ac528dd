//! External media storage.
//!
//! Uploaded files land in a local temporary file first (see the multipart
//! forms in `models`); the handler then hands the path to a [`MediaStore`],
//! which pushes it to the hosted service and returns a public URL.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("failed to read local file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("media request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("media service returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("media service response did not include a URL")]
    MissingUrl,

    #[error("not a media store URL: {0}")]
    UnrecognizedUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload the file at `local_path` and return where it can be fetched from.
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, MediaError>;

    /// Delete a previously uploaded file by its public URL.
    async fn remove(&self, url: &str) -> Result<(), MediaError>;
}

#[derive(Debug, Clone)]
pub struct CloudinarySettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Optional folder all uploads are placed under
    pub folder: Option<String>,
    pub api_base: String,
}

pub const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com";

/// Avatars and cover images are always stored as Cloudinary `image` resources.
const RESOURCE_TYPE: &str = "image";

/// Cloudinary upload API client using signed requests.
pub struct CloudinaryMedia {
    client: reqwest::Client,
    settings: CloudinarySettings,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: Option<String>,
    url: Option<String>,
}

impl CloudinaryMedia {
    pub fn new(settings: CloudinarySettings) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self { client, settings })
    }

    // Uploads and deletions must name the same resource type, or destroy
    // cannot find what upload created.
    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/{}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.cloud_name,
            RESOURCE_TYPE,
            action
        )
    }
}

#[async_trait]
impl MediaStore for CloudinaryMedia {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, MediaError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| MediaError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;

        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = Utc::now().timestamp().to_string();
        let mut signed: Vec<(&'static str, String)> = vec![("timestamp", timestamp.clone())];
        if let Some(folder) = &self.settings.folder {
            signed.push(("folder", folder.clone()));
        }
        let signature = sign_params(&signed, &self.settings.api_secret);

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("api_key", self.settings.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in signed {
            form = form.text(key, value);
        }

        log::debug!("Uploading {:?} to media store", local_path);
        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(MediaError::Rejected { status, body });
        }

        let uploaded: UploadResponse = response.json().await?;
        let url = uploaded
            .secure_url
            .or(uploaded.url)
            .ok_or(MediaError::MissingUrl)?;

        log::info!("Uploaded media: {}", uploaded.public_id);

        Ok(UploadedMedia {
            url,
            public_id: uploaded.public_id,
        })
    }

    async fn remove(&self, url: &str) -> Result<(), MediaError> {
        let public_id =
            public_id_from_url(url).ok_or_else(|| MediaError::UnrecognizedUrl(url.to_string()))?;

        let timestamp = Utc::now().timestamp().to_string();
        let signed = vec![("public_id", public_id.clone()), ("timestamp", timestamp)];
        let signature = sign_params(&signed, &self.settings.api_secret);

        let mut fields: Vec<(&'static str, String)> = signed;
        fields.push(("api_key", self.settings.api_key.clone()));
        fields.push(("signature", signature));
        fields.push(("signature_algorithm", "sha256".to_string()));

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&fields)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Rejected { status, body });
        }

        log::info!("Removed media: {}", public_id);
        Ok(())
    }
}

/// Cloudinary request signature: parameters sorted by key, joined as
/// `k=v&k=v`, suffixed with the API secret and hashed.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Recovers the public id from a delivery URL such as
/// `https://res.cloudinary.com/<cloud>/image/upload/v1712345/avatars/abc.png`.
pub fn public_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/upload/")?;
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);

    let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    if segments
        .first()
        .is_some_and(|s| s.len() > 1 && s.starts_with('v') && s[1..].bytes().all(|b| b.is_ascii_digit()))
    {
        segments.remove(0);
    }

    let last = segments.pop()?;
    let stem = match last.rfind('.') {
        Some(dot) if dot > 0 => &last[..dot],
        _ => last,
    };
    segments.push(stem);

    Some(segments.join("/"))
}

#[cfg(test)]
pub mod memory {
    //! Media store stand-in for handler tests: hands out fake URLs and records
    //! what was removed.

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryMediaStore {
        uploaded: AtomicUsize,
        fail_uploads: AtomicBool,
        removed: RwLock<Vec<String>>,
    }

    impl MemoryMediaStore {
        pub fn set_failing(&self, failing: bool) {
            self.fail_uploads.store(failing, Ordering::SeqCst);
        }

        pub fn upload_count(&self) -> usize {
            self.uploaded.load(Ordering::SeqCst)
        }

        pub async fn removed(&self) -> Vec<String> {
            self.removed.read().await.clone()
        }
    }

    #[async_trait]
    impl MediaStore for MemoryMediaStore {
        async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, MediaError> {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(MediaError::Rejected {
                    status: 500,
                    body: "upload disabled".to_string(),
                });
            }
            if !local_path.exists() {
                return Err(MediaError::Io {
                    path: local_path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }

            let n = self.uploaded.fetch_add(1, Ordering::SeqCst) + 1;
            let public_id = format!("test/media-{n}");
            Ok(UploadedMedia {
                url: format!("https://media.test/image/upload/{public_id}.png"),
                public_id,
            })
        }

        async fn remove(&self, url: &str) -> Result<(), MediaError> {
            self.removed.write().await.push(url.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_params_sorts_keys() {
        let signature = sign_params(
            &[
                ("timestamp", "1315060510".to_string()),
                ("public_id", "sample_image".to_string()),
            ],
            "abcd",
        );
        assert_eq!(
            signature,
            "e3c44b54e67a3ecc918f5d7236ca5faa36250ea8a8cd6cbabfd2d6bb2453acac"
        );
    }

    #[test]
    fn test_sign_params_with_folder() {
        let signature = sign_params(
            &[
                ("timestamp", "1700000000".to_string()),
                ("folder", "avatars".to_string()),
            ],
            "s3cret",
        );
        assert_eq!(
            signature,
            "b753371c65b8a041557fa7c75ff44d77cfa8ccdcd58846f7b6f05f739696c592"
        );
    }

    #[test]
    fn test_public_id_from_url() {
        assert_eq!(
            public_id_from_url(
                "https://res.cloudinary.com/demo/image/upload/v1712345/avatars/abc123.png"
            )
            .as_deref(),
            Some("avatars/abc123")
        );
        assert_eq!(
            public_id_from_url("http://res.cloudinary.com/demo/image/upload/sample.jpg?x=1")
                .as_deref(),
            Some("sample")
        );
        assert_eq!(public_id_from_url("https://example.com/avatar.png"), None);
    }

    fn offline_media() -> CloudinaryMedia {
        CloudinaryMedia::new(CloudinarySettings {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            folder: None,
            // Unroutable; nothing in these tests may reach the network.
            api_base: "http://127.0.0.1:9/".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_upload_and_destroy_share_resource_type() {
        let media = offline_media();
        assert_eq!(
            media.endpoint("upload"),
            "http://127.0.0.1:9/v1_1/demo/image/upload"
        );
        assert_eq!(
            media.endpoint("destroy"),
            "http://127.0.0.1:9/v1_1/demo/image/destroy"
        );
    }

    #[actix_web::test]
    async fn test_upload_missing_file_fails_before_any_request() {
        let media = offline_media();

        let err = media
            .upload(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Io { .. }));
    }
}
