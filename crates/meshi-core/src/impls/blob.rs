//! Blob store の解決と共通ヘルパ

use std::fs;
use std::path::Path;
use std::sync::Arc;

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use thiserror::Error;

use crate::config::{BlobBackend, BlobConfig};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob store configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] object_store::Error),
}

/// 設定から ObjectStore を作る
pub fn resolve_object_store(config: &BlobConfig) -> Result<Arc<dyn ObjectStore>, BlobError> {
    match config.backend {
        BlobBackend::Memory => Ok(Arc::new(InMemory::new())),
        BlobBackend::Fs => {
            let root = Path::new(&config.root);
            if !root.exists() {
                fs::create_dir_all(root).map_err(|e| {
                    BlobError::Invalid(format!("failed to create fs root {}: {e}", config.root))
                })?;
            }
            // 相対パスのまま渡すと URL エンコードが揺れるので正規化してから使う
            let canonical = root.canonicalize().map_err(|e| {
                BlobError::Invalid(format!("failed to canonicalize {}: {e}", config.root))
            })?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(canonical)?))
        }
        BlobBackend::S3 => {
            let bucket = config
                .bucket
                .as_deref()
                .ok_or_else(|| BlobError::Invalid("s3 backend needs a bucket".to_string()))?;
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(region) = &config.region {
                builder = builder.with_region(region);
            }
            Ok(Arc::new(builder.build()?))
        }
    }
}

/// `prefix` 配下に名前を 1 つぶら下げたパス。名前中の `/` などはエンコードされる
pub fn child_path(prefix: &str, segments: &[&str]) -> ObjectPath {
    segments
        .iter()
        .fold(ObjectPath::from(prefix), |path, segment| path.child(*segment))
}
