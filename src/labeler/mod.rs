//! 画像ラベル検出
//!
//! 画像を外部の分類器に渡し、(名前, 信頼度) のラベル列を得る。
//! ストア上の画像は参照で渡し、バイト列を二重に転送しない。

mod command;

pub use command::CommandLabeler;

use damage_report_common::{DamageLabel, ObjectRef};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelerError {
    #[error("invalid image format")]
    InvalidImageFormat,

    #[error("image too large")]
    ImageTooLarge,

    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("labeling service error: {0}")]
    ServiceError(String),
}

/// 分類器への入力
#[derive(Debug, Clone, Copy)]
pub enum LabelSource<'a> {
    Reference(&'a ObjectRef),
    Bytes(&'a [u8]),
}

/// 検出パラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    /// 最小信頼度（%）
    pub min_confidence: f32,
    pub max_labels: u32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            min_confidence: 70.0,
            max_labels: 20,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Labeler {
    /// ラベルを検出（分類器の出力順）
    ///
    /// 何も検出されなければ空の Vec を返す（エラーではない）。
    async fn detect(
        &self,
        source: LabelSource<'_>,
        options: &DetectOptions,
    ) -> Result<Vec<DamageLabel>, LabelerError>;
}

/// 信頼度の下限と件数上限を適用（順序は保つ）
pub fn apply_detect_options(labels: Vec<DamageLabel>, options: &DetectOptions) -> Vec<DamageLabel> {
    // NaN は損傷フィルタで MalformedLabel として検出させる
    labels
        .into_iter()
        .filter(|l| l.confidence.is_nan() || l.confidence >= options.min_confidence)
        .take(options.max_labels as usize)
        .collect()
}
