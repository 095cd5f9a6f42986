//! 解析結果の型定義
//!
//! CLI・ライブラリで共有される型:
//! - DamageLabel: 分類器が返すラベル（名前と信頼度）
//! - ObjectRef: ストア内オブジェクトへの参照（バケット + キー）
//! - AnalysisResult: 1枚の画像に対する最終出力

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 分類器が出力したラベル
///
/// 信頼度は 0〜100 のパーセント値。分類器の出力形式
/// (`Name` / `Confidence`) もそのまま読み込める。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageLabel {
    #[serde(default, alias = "Name")]
    pub name: String,

    #[serde(default, alias = "Confidence")]
    pub confidence: f32,
}

impl DamageLabel {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// ストア内オブジェクトへの参照
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// "bucket/path/to/key" 形式をパース
    ///
    /// 先頭の "s3://" は読み飛ばす。バケットかキーが空なら None。
    pub fn parse(location: &str) -> Option<Self> {
        let trimmed = location.trim().trim_start_matches("s3://");
        let (bucket, key) = trimmed.split_once('/')?;
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(bucket, key))
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// 後処理ステップの成否
///
/// 2つのフラグは独立しており、片方の失敗がもう片方に影響しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatus {
    pub report_saved: bool,
    pub image_moved: bool,
}

/// 画像1枚分の解析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub source_key: String,

    /// 移動後のキー（移動失敗時は None）
    #[serde(default)]
    pub processed_key: Option<String>,

    #[serde(default)]
    pub damage_labels: Vec<DamageLabel>,

    #[serde(default)]
    pub report: String,

    /// レポートの保存先キー（保存失敗時は None）
    #[serde(default)]
    pub report_key: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub processing_status: ProcessingStatus,
}
