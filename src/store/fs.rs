//! ローカルファイルシステム上のオブジェクトストア
//!
//! `<root>/<bucket>/<key>` にオブジェクトを置く。キーは '/' 区切り。

use super::{ObjectStore, StoreError};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// バケット + キーを実パスに変換
    ///
    /// 絶対パスや `..` を含むキーはルート外を指すので拒否する。
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let location = format!("{}/{}", bucket, key);
        if bucket.is_empty() || key.is_empty() {
            return Err(StoreError::AccessDenied(location));
        }

        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StoreError::AccessDenied(location));
        }

        Ok(self.root.join(relative))
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        let path = Path::new(bucket);
        if bucket.is_empty() || path.components().count() != 1 {
            return Err(StoreError::AccessDenied(bucket.to_string()));
        }
        Ok(self.root.join(path))
    }
}

fn read_error(location: String, e: std::io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound(location),
        ErrorKind::PermissionDenied => StoreError::AccessDenied(location),
        _ => StoreError::TransientIo(format!("{}: {}", location, e)),
    }
}

fn write_error(location: String, e: std::io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::PermissionDenied => StoreError::WriteDenied(location),
        _ => StoreError::TransientIo(format!("{}: {}", location, e)),
    }
}

impl ObjectStore for FsObjectStore {
    async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| read_error(format!("{}/{}", bucket, key), e))
    }

    async fn write(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        let location = format!("{}/{}", bucket, key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(location.clone(), e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| write_error(location.clone(), e))?;

        tracing::debug!(location = %location, content_type, size = bytes.len(), "object written");
        Ok(())
    }

    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError> {
        let source = self.object_path(bucket, source_key)?;
        let dest = self.object_path(bucket, dest_key)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(format!("{}/{}", bucket, dest_key), e))?;
        }
        tokio::fs::copy(&source, &dest)
            .await
            .map_err(|e| read_error(format!("{}/{}", bucket, source_key), e))?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| read_error(format!("{}/{}", bucket, key), e))
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| read_error(format!("{}/{}", bucket, key), e))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let bucket_dir = self.bucket_path(bucket)?;
        if !bucket_dir.is_dir() {
            return Err(StoreError::NotFound(bucket.to_string()));
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&bucket_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}
