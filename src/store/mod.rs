//! オブジェクトストア
//!
//! バケット + キーでオブジェクトを読み書きする。
//! 移動は「コピーしてから削除」で、途中失敗時の扱いは `move_object` を参照。

mod fs;

pub use fs::FsObjectStore;

use damage_report_common::is_processed_key;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("write denied: {0}")]
    WriteDenied(String),

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("move failed: {0}")]
    MoveFailure(String),
}

#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn write(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StoreError>;

    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// プレフィックスに一致するキー一覧（ソート済み）
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// 同じバケット内でオブジェクトを移動
    ///
    /// - 移動先に同じ内容が既にあればコピーを省いて元を削除する（再実行で完了できる）。
    ///   元が既に無ければ移動済みとみなす。
    /// - 移動先に別の内容があれば上書きする。
    /// - 新規に作った移動先は、元の削除が失敗したら消して `MoveFailure` を返す。
    async fn move_object(
        &self,
        bucket: &str,
        source_key: &str,
        dest_key: &str,
    ) -> Result<(), StoreError> {
        let dest_existed = self
            .exists(bucket, dest_key)
            .await
            .map_err(|e| StoreError::MoveFailure(format!("{}: {}", dest_key, e)))?;

        let needs_copy = if dest_existed {
            match self.read(bucket, source_key).await {
                Ok(source) => {
                    let dest = self
                        .read(bucket, dest_key)
                        .await
                        .map_err(|e| StoreError::MoveFailure(format!("{}: {}", dest_key, e)))?;
                    source != dest
                }
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!(bucket, source_key, dest_key, "source already moved");
                    return Ok(());
                }
                Err(e) => {
                    return Err(StoreError::MoveFailure(format!("{}: {}", source_key, e)));
                }
            }
        } else {
            true
        };

        if needs_copy {
            if dest_existed {
                tracing::warn!(
                    bucket,
                    source_key,
                    dest_key,
                    "destination holds a different object; overwriting"
                );
            }
            self.copy(bucket, source_key, dest_key)
                .await
                .map_err(|e| StoreError::MoveFailure(format!("copy {}: {}", source_key, e)))?;
        }

        if let Err(e) = self.delete(bucket, source_key).await {
            if !dest_existed {
                if let Err(rollback) = self.delete(bucket, dest_key).await {
                    tracing::error!(
                        bucket,
                        dest_key,
                        error = %rollback,
                        "failed to roll back copied object"
                    );
                }
            }
            return Err(StoreError::MoveFailure(format!("delete {}: {}", source_key, e)));
        }
        Ok(())
    }
}

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// JPEG画像かどうか（拡張子、大文字小文字を区別しない）
pub fn is_jpeg_key(key: &str) -> bool {
    key.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// 未処理のJPEG画像キー一覧
///
/// `processed/` 配下のキーは除外する。
pub async fn list_jpg_images<S: ObjectStore>(
    store: &S,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<String>, StoreError> {
    let keys = store.list(bucket, prefix).await?;
    Ok(keys
        .into_iter()
        .filter(|key| is_jpeg_key(key) && !is_processed_key(key))
        .collect())
}
