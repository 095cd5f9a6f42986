//! 保存先キーの生成
//!
//! - レポート: `reports/<ファイル名>_<YYYYMMDD_HHMMSS>.txt`
//! - 処理済み画像: 元キーと同じ階層の `processed/` 配下

use chrono::{DateTime, Utc};

pub const REPORTS_PREFIX: &str = "reports";
pub const PROCESSED_DIR: &str = "processed";

/// キーの末尾（ファイル名）
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

pub fn report_key(source_key: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "{}/{}_{}.txt",
        REPORTS_PREFIX,
        basename(source_key),
        generated_at.format("%Y%m%d_%H%M%S")
    )
}

/// 処理済み画像の移動先キー
///
/// `damage_images/car1.jpg` → `damage_images/processed/car1.jpg`
pub fn processed_key(source_key: &str) -> String {
    match source_key.rsplit_once('/') {
        Some((parent, name)) => format!("{}/{}/{}", parent, PROCESSED_DIR, name),
        None => format!("{}/{}", PROCESSED_DIR, source_key),
    }
}

/// 既に `processed/` 配下にあるキーか
pub fn is_processed_key(key: &str) -> bool {
    key.split('/')
        .rev()
        .skip(1)
        .any(|segment| segment == PROCESSED_DIR)
}
