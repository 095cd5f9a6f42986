//! モデルレスポンスパーサー
//!
//! APIバージョンによって返り値の形が異なるため、既知の2形式を受け付ける:
//! 1. `{"messages": [{"content": [{"text": ...}]}]}`
//! 2. `{"content": [{"text": ...}]}`
//!
//! どちらにも当てはまらなければ `UnexpectedResponseShape`。

use crate::error::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// 既知のレスポンス形式
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelReply {
    Messages { messages: Vec<ReplyMessage> },
    Content { content: Vec<ContentBlock> },
}

impl ModelReply {
    fn into_text(self) -> Option<String> {
        let blocks = match self {
            ModelReply::Messages { messages } => messages.into_iter().next()?.content,
            ModelReply::Content { content } => content,
        };
        blocks.into_iter().next()?.text
    }
}

/// レスポンス本文からレポートテキストを取り出す
///
/// # Returns
/// * `Ok(String)` - 先頭コンテンツブロックのテキスト
/// * `Err(UnexpectedResponseShape)` - 既知の形式ではない（JSONでない本文を含む）
pub fn parse_model_reply(body: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| Error::UnexpectedResponseShape(Vec::new()))?;

    let keys = || match &value {
        serde_json::Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let reply: ModelReply = serde_json::from_value(value.clone())
        .map_err(|_| Error::UnexpectedResponseShape(keys()))?;

    reply
        .into_text()
        .ok_or_else(|| Error::UnexpectedResponseShape(keys()))
}
