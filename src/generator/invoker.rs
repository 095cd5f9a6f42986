use thiserror::Error;

/// モデル呼び出しのエラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    /// レート制限（待ってから再試行してよい）
    #[error("throttled: {0}")]
    Throttled(String),

    #[error("model service error (status {status:?}): {message}")]
    Service { status: Option<u16>, message: String },

    /// 接続・タイムアウト等
    #[error("transport error: {0}")]
    Transport(String),
}

/// 生成モデルの呼び出し口
#[allow(async_fn_in_trait)]
pub trait ModelInvoker {
    /// リクエスト本文(JSON)を送り、レスポンス本文を返す
    async fn invoke(&self, model_id: &str, body: &str) -> Result<String, InvokeError>;
}
