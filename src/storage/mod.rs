//! File storage
//!
//! Uploads go to S3-compatible object storage through presigned PUT URLs.
//! Without storage credentials, direct uploads fall back to the local
//! `upload.path` directory, served under `/uploads`.

pub mod s3;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{StorageConfig, UploadConfig};

pub use s3::S3Presigner;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object storage is not configured")]
    NotConfigured,

    #[error("File type not allowed: {0}")]
    InvalidType(String),

    #[error("File too large, maximum is {max} bytes")]
    TooLarge { max: u64 },

    #[error("Upload to object storage failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Presigned upload handed to the client
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub key: String,
    pub public_url: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

pub struct StorageService {
    presigner: Option<S3Presigner>,
    presign_expiry_secs: u64,
    upload: UploadConfig,
    http: reqwest::Client,
}

impl StorageService {
    pub fn new(storage: &StorageConfig, upload: UploadConfig) -> Self {
        Self {
            presigner: S3Presigner::from_config(storage),
            presign_expiry_secs: storage.presign_expiry_secs,
            upload,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_s3_configured(&self) -> bool {
        self.presigner.is_some()
    }

    /// Presigned PUT URL for a new object owned by `user_id`
    pub fn presign_upload(&self, user_id: i64, content_type: &str) -> Result<PresignedUpload, StorageError> {
        let presigner = self.presigner.as_ref().ok_or(StorageError::NotConfigured)?;
        self.check_type(content_type)?;

        let key = self.object_key(user_id, content_type);
        Ok(PresignedUpload {
            upload_url: presigner.presign_put(&key, self.presign_expiry_secs, Utc::now()),
            public_url: presigner.public_url(&key),
            key,
            expires_in: self.presign_expiry_secs,
        })
    }

    /// Store an uploaded file body, in S3 when configured or on local disk
    pub async fn store(&self, user_id: i64, content_type: &str, data: &[u8]) -> Result<StoredFile, StorageError> {
        self.check_type(content_type)?;
        if data.len() as u64 > self.upload.max_file_size {
            return Err(StorageError::TooLarge {
                max: self.upload.max_file_size,
            });
        }

        let key = self.object_key(user_id, content_type);
        let url = match &self.presigner {
            Some(presigner) => {
                let upload_url = presigner.presign_put(&key, self.presign_expiry_secs, Utc::now());
                let response = self
                    .http
                    .put(&upload_url)
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .timeout(Duration::from_secs(60))
                    .body(data.to_vec())
                    .send()
                    .await
                    .map_err(|e| StorageError::Upstream(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(StorageError::Upstream(format!("status {}", response.status())));
                }
                presigner.public_url(&key)
            }
            None => {
                // `/uploads` serves the upload directory itself
                let relative = key.strip_prefix("uploads/").unwrap_or(&key);
                let path = self.upload.path.join(relative);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context("Failed to create upload directory")?;
                }
                tokio::fs::write(&path, data)
                    .await
                    .context("Failed to write uploaded file")?;
                format!("/{}", key)
            }
        };

        tracing::info!(user_id, key = %key, size = data.len(), "File stored");
        Ok(StoredFile {
            key,
            url,
            size: data.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    fn check_type(&self, content_type: &str) -> Result<(), StorageError> {
        if self.upload.is_type_allowed(content_type) {
            Ok(())
        } else {
            Err(StorageError::InvalidType(content_type.to_string()))
        }
    }

    /// `uploads/{user_id}/{uuid}.{ext}`
    fn object_key(&self, user_id: i64, content_type: &str) -> String {
        format!(
            "uploads/{}/{}.{}",
            user_id,
            Uuid::new_v4(),
            self.upload.get_extension(content_type)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_service(dir: &std::path::Path) -> StorageService {
        StorageService::new(
            &StorageConfig::default(),
            UploadConfig {
                path: dir.to_path_buf(),
                max_file_size: 16,
                ..UploadConfig::default()
            },
        )
    }

    #[test]
    fn test_presign_requires_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let service = local_service(dir.path());
        assert!(matches!(
            service.presign_upload(1, "image/png"),
            Err(StorageError::NotConfigured)
        ));
    }

    #[test]
    fn test_presign_builds_user_scoped_key() {
        let service = StorageService::new(
            &StorageConfig {
                endpoint: "https://s3.ap-south-1.amazonaws.com".into(),
                bucket: "kalpla".into(),
                access_key: "AKIA".into(),
                secret_key: "secret".into(),
                ..StorageConfig::default()
            },
            UploadConfig::default(),
        );

        let upload = service.presign_upload(42, "image/png").unwrap();
        assert!(upload.key.starts_with("uploads/42/"));
        assert!(upload.key.ends_with(".png"));
        assert!(upload.upload_url.contains(&upload.key));
        assert_eq!(upload.expires_in, 900);
        assert_eq!(
            upload.public_url,
            format!("https://s3.ap-south-1.amazonaws.com/kalpla/{}", upload.key)
        );

        assert!(matches!(
            service.presign_upload(42, "application/x-msdownload"),
            Err(StorageError::InvalidType(_))
        ));
    }

    #[tokio::test]
    async fn test_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let service = local_service(dir.path());

        let stored = service.store(3, "image/png", b"\x89PNG....").await.unwrap();
        assert!(stored.url.starts_with("/uploads/3/"));
        assert!(dir.path().join(stored.url.trim_start_matches("/uploads/")).exists());

        let too_big = service.store(3, "image/png", &[0u8; 17]).await;
        assert!(matches!(too_big, Err(StorageError::TooLarge { max: 16 })));
    }
}
