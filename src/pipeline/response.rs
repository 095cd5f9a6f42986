//! 呼び出し元への応答
//!
//! 成功・失敗どちらでもステータスコードと本文を1件返す。

use super::AnalysisRequest;
use crate::error::{DamageReportError, Result};
use damage_report_common::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,

    pub label_count: usize,

    pub processing_time_seconds: f64,

    pub source_bucket: String,

    pub output_bucket: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResponse {
    pub fn from_outcome(
        request: &AnalysisRequest,
        outcome: Result<AnalysisResult>,
        elapsed: Duration,
    ) -> Self {
        let processing_time_seconds = (elapsed.as_secs_f64() * 1000.0).round() / 1000.0;
        let source_bucket = request.source.bucket.clone();
        let output_bucket = request.output_bucket.clone();

        match outcome {
            Ok(result) => Self {
                status_code: 200,
                body: ResponseBody {
                    message: format!("Successfully processed {}", request.source),
                    label_count: result.damage_labels.len(),
                    analysis: Some(result),
                    processing_time_seconds,
                    source_bucket,
                    output_bucket,
                    error: None,
                },
            },
            Err(e) => Self {
                status_code: status_for(&e),
                body: ResponseBody {
                    message: format!("Failed to process {}", request.source),
                    analysis: None,
                    label_count: 0,
                    processing_time_seconds,
                    source_bucket,
                    output_bucket,
                    error: Some(error_chain(&e)),
                },
            },
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

fn status_for(error: &DamageReportError) -> u16 {
    if error.is_client_error() {
        400
    } else {
        500
    }
}

/// エラーと原因を ": " でつなげた文字列
fn error_chain(error: &DamageReportError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
