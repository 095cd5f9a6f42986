//! モデル呼び出しリクエストの組み立て
//!
//! 画像はBase64で埋め込み、画像パートとテキストパートの
//! マルチパートメッセージとして送る。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

/// リクエストの固定パラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            anthropic_version: "bedrock-2023-05-31".into(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelRequest {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: &'static str,
    pub data: String,
}

/// 先頭バイトから画像のMIMEタイプを推定（不明ならJPEG扱い）
pub fn sniff_media_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// 画像とプロンプトからリクエストを生成
pub fn build_model_request(image_bytes: &[u8], prompt: &str, params: &ModelParams) -> ModelRequest {
    ModelRequest {
        anthropic_version: params.anthropic_version.clone(),
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        messages: vec![Message {
            role: "user",
            content: vec![
                ContentPart::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: sniff_media_type(image_bytes),
                        data: STANDARD.encode(image_bytes),
                    },
                },
                ContentPart::Text {
                    text: prompt.to_string(),
                },
            ],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    #[test]
    fn test_request_body_shape() {
        let request = build_model_request(JPEG_HEADER, "assess", &ModelParams::default());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["messages"][0]["role"], "user");

        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[0]["source"]["data"], STANDARD.encode(JPEG_HEADER));
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "assess");
    }

    #[test]
    fn test_sniff_media_type() {
        assert_eq!(sniff_media_type(b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(sniff_media_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_media_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_media_type(JPEG_HEADER), "image/jpeg");
        assert_eq!(sniff_media_type(b"xx"), "image/jpeg");
    }
}
