// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cold-storage destination for archived log files.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::info;

use crate::config::ArchiveTarget;
use crate::error::{ArchiveError, ConfigError};

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Stores `body` under `key`. Returning `Ok` confirms the upload.
    async fn put(&self, key: &str, body: Bytes) -> Result<(), ArchiveError>;
}

/// [`ArchiveStore`] backed by any `object_store` implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreArchive {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreArchive {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ArchiveStore for ObjectStoreArchive {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), ArchiveError> {
        let location = ObjectPath::from(key);
        self.store
            .put(&location, PutPayload::from(body))
            .await
            .map(|_| ())
            .map_err(|e| ArchiveError::Upload {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Builds the object store described by `target`.
pub fn create_object_store(target: &ArchiveTarget) -> Result<Arc<dyn ObjectStore>, ConfigError> {
    match target {
        ArchiveTarget::Local { path } => {
            std::fs::create_dir_all(path).map_err(|e| {
                ConfigError::ObjectStore(format!("Failed to create archive directory: {e}"))
            })?;
            let store = LocalFileSystem::new_with_prefix(path)
                .map_err(|e| ConfigError::ObjectStore(e.to_string()))?;
            info!("Archiving rotated logs to {}", path.display());
            Ok(Arc::new(store))
        }
        ArchiveTarget::S3 {
            bucket,
            region,
            endpoint,
        } => {
            use object_store::aws::AmazonS3Builder;

            // Credentials come from the standard AWS environment variables.
            let mut builder = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .with_region(region);
            if let Some(endpoint) = endpoint {
                builder = builder.with_endpoint(endpoint).with_allow_http(true);
            }
            let store = builder
                .build()
                .map_err(|e| ConfigError::ObjectStore(e.to_string()))?;
            info!(bucket = %bucket, region = %region, "Archiving rotated logs to S3");
            Ok(Arc::new(store))
        }
    }
}
