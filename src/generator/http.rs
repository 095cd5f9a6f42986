//! HTTP経由のモデル呼び出し
//!
//! `POST <endpoint>/model/<model_id>/invoke` にJSON本文を送る。

use super::{InvokeError, ModelInvoker};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;

const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

#[derive(Debug, Clone)]
pub struct HttpModelInvoker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpModelInvoker {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InvokeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn invoke_url(&self, model_id: &str) -> String {
        format!("{}/model/{}/invoke", self.endpoint, model_id)
    }
}

/// ステータスとヘッダからエラーを分類
pub fn classify_response(status: StatusCode, headers: &HeaderMap, body: &str) -> InvokeError {
    let error_type = headers
        .get(ERROR_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS || error_type.starts_with("ThrottlingException") {
        return InvokeError::Throttled(format!("{} {}", status.as_u16(), body.trim()));
    }

    InvokeError::Service {
        status: Some(status.as_u16()),
        message: if error_type.is_empty() {
            body.trim().to_string()
        } else {
            format!("{}: {}", error_type, body.trim())
        },
    }
}

impl ModelInvoker for HttpModelInvoker {
    async fn invoke(&self, model_id: &str, body: &str) -> Result<String, InvokeError> {
        let mut request = self
            .client
            .post(self.invoke_url(model_id))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body.to_string());

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_response(status, &headers, &text));
        }

        Ok(text)
    }
}
