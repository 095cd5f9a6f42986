//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed label: {0}")]
    MalformedLabel(String),

    #[error("Unexpected response shape (keys: {})", .0.join(", "))]
    UnexpectedResponseShape(Vec<String>),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
