use crate::generator::InvokeError;
use crate::labeler::LabelerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DamageReportError {
    #[error("入力が不正: {0}")]
    InvalidInput(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("画像の取得に失敗: {location}: {reason}")]
    RetrievalFailure { location: String, reason: String },

    #[error("ラベル検出に失敗: {location}")]
    DetectionFailure {
        location: String,
        #[source]
        source: LabelerError,
    },

    #[error("入力が空: {0}")]
    EmptyInput(String),

    #[error("レポート生成に失敗 ({attempts}回試行): {source}")]
    GenerationFailure {
        attempts: u32,
        #[source]
        source: InvokeError,
    },

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] damage_report_common::Error),
}

impl DamageReportError {
    /// 呼び出し側の入力が原因のエラーか
    pub fn is_client_error(&self) -> bool {
        matches!(self, DamageReportError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, DamageReportError>;
