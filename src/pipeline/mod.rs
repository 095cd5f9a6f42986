//! 画像1枚の損傷解析パイプライン
//!
//! 取得 → ラベル検出 → 損傷フィルタ → レポート生成 → レポート保存 → 画像移動
//!
//! 取得・検出・生成の失敗はリクエスト全体を失敗させる。
//! 保存・移動の失敗はログに残し、結果のフラグに反映して処理を続ける。

mod response;

pub use response::{InvocationResponse, ResponseBody};

use crate::error::{DamageReportError, Result};
use crate::generator::{ModelInvoker, ReportGenerator};
use crate::labeler::{DetectOptions, LabelSource, Labeler};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use damage_report_common::{
    filter_damage_labels, processed_key, report_key, AnalysisResult, DamageLabel, ObjectRef,
    ProcessingStatus, SKIPPED_REPORT,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Instant;
use tracing::Instrument;

const REPORT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// 解析リクエスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub source: ObjectRef,
    pub output_bucket: String,
}

impl AnalysisRequest {
    pub fn new(source: ObjectRef, output_bucket: impl Into<String>) -> Self {
        Self {
            source,
            output_bucket: output_bucket.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.bucket.trim().is_empty() {
            return Err(DamageReportError::InvalidInput("source bucket is empty".into()));
        }
        if self.source.key.trim().is_empty() || self.source.key.ends_with('/') {
            return Err(DamageReportError::InvalidInput(format!(
                "source key '{}' does not name an object",
                self.source.key
            )));
        }
        if self.output_bucket.trim().is_empty() {
            return Err(DamageReportError::InvalidInput("output bucket is empty".into()));
        }
        Ok(())
    }
}

/// 損傷ラベルが1件もないときの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyLabelPolicy {
    /// そのままモデルに問い合わせる
    #[default]
    Generate,
    /// 生成せず定型文をレポートにする
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PipelineOptions {
    pub detect: DetectOptions,
    pub empty_labels: EmptyLabelPolicy,
}

/// ログ用のリクエストID（ソースと開始時刻のハッシュ先頭12桁）
pub fn request_id(source: &ObjectRef, started_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string().as_bytes());
    hasher.update(started_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

pub struct DamagePipeline<S, L, M> {
    store: S,
    labeler: L,
    generator: ReportGenerator<M>,
    options: PipelineOptions,
}

impl<S, L, M> DamagePipeline<S, L, M>
where
    S: ObjectStore,
    L: Labeler,
    M: ModelInvoker,
{
    pub fn new(
        store: S,
        labeler: L,
        generator: ReportGenerator<M>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            labeler,
            generator,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn labeler(&self) -> &L {
        &self.labeler
    }

    pub fn generator(&self) -> &ReportGenerator<M> {
        &self.generator
    }

    /// 画像1枚を処理
    ///
    /// 成功・失敗に関わらず、所要時間と結果を1件のログに残す。
    /// 処理中のログ（再試行を含む）は `request` スパンでリクエストIDと結びつく。
    pub async fn process(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let started = Instant::now();
        let id = request_id(&request.source, Utc::now());

        let outcome = self
            .run(&id, request)
            .instrument(tracing::info_span!("request", request_id = %id))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => tracing::info!(
                request_id = %id,
                source = %request.source,
                output_bucket = %request.output_bucket,
                duration_ms,
                label_count = result.damage_labels.len(),
                report_saved = result.processing_status.report_saved,
                image_moved = result.processing_status.image_moved,
                "image processed"
            ),
            Err(e) => tracing::error!(
                request_id = %id,
                source = %request.source,
                output_bucket = %request.output_bucket,
                duration_ms,
                error = %e,
                "image processing failed"
            ),
        }

        outcome
    }

    async fn run(&self, id: &str, request: &AnalysisRequest) -> Result<AnalysisResult> {
        request.validate()?;
        let source = &request.source;

        // 1. 取得
        let image_bytes = self
            .store
            .read(&source.bucket, &source.key)
            .await
            .map_err(|e| DamageReportError::RetrievalFailure {
                location: source.to_string(),
                reason: e.to_string(),
            })?;
        if image_bytes.is_empty() {
            return Err(DamageReportError::RetrievalFailure {
                location: source.to_string(),
                reason: "object is empty".into(),
            });
        }
        tracing::debug!(request_id = %id, size = image_bytes.len(), "image retrieved");

        // 2. 検出（ストア上の参照を渡す）
        let labels = self
            .labeler
            .detect(LabelSource::Reference(source), &self.options.detect)
            .await
            .map_err(|e| DamageReportError::DetectionFailure {
                location: source.to_string(),
                source: e,
            })?;

        // 3. フィルタ
        let damage_labels = filter_damage_labels(&labels)?;
        tracing::info!(
            request_id = %id,
            detected = labels.len(),
            damage = damage_labels.len(),
            "labels filtered"
        );

        // 4. 生成
        let report = self.generate_report(id, &image_bytes, &damage_labels).await?;

        // 5. レポート保存
        let generated_at = Utc::now();
        let report_key = self.save_report(id, request, &report, generated_at).await;

        // 6. 画像移動
        let processed_key = self.relocate(id, source).await;

        Ok(AnalysisResult {
            source_key: source.key.clone(),
            processing_status: ProcessingStatus {
                report_saved: report_key.is_some(),
                image_moved: processed_key.is_some(),
            },
            processed_key,
            damage_labels,
            report,
            report_key,
            timestamp: generated_at,
        })
    }

    async fn generate_report(
        &self,
        id: &str,
        image_bytes: &[u8],
        labels: &[DamageLabel],
    ) -> Result<String> {
        if labels.is_empty() && self.options.empty_labels == EmptyLabelPolicy::Skip {
            tracing::info!(request_id = %id, "no damage labels; report generation skipped");
            return Ok(SKIPPED_REPORT.to_string());
        }

        self.generator.generate(image_bytes, labels).await.inspect_err(|_| {
            let names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
            tracing::warn!(request_id = %id, labels = ?names, "detected labels kept for diagnosis");
        })
    }

    async fn save_report(
        &self,
        id: &str,
        request: &AnalysisRequest,
        report: &str,
        generated_at: DateTime<Utc>,
    ) -> Option<String> {
        let key = report_key(&request.source.key, generated_at);
        match self
            .store
            .write(&request.output_bucket, &key, report.as_bytes(), REPORT_CONTENT_TYPE)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    request_id = %id,
                    bucket = %request.output_bucket,
                    key = %key,
                    "report saved"
                );
                Some(key)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %id,
                    bucket = %request.output_bucket,
                    key = %key,
                    error = %e,
                    "failed to save report"
                );
                None
            }
        }
    }

    async fn relocate(&self, id: &str, source: &ObjectRef) -> Option<String> {
        let dest = processed_key(&source.key);
        match self.store.move_object(&source.bucket, &source.key, &dest).await {
            Ok(()) => {
                tracing::info!(request_id = %id, from = %source.key, to = %dest, "image moved");
                Some(dest)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %id,
                    from = %source.key,
                    to = %dest,
                    error = %e,
                    "failed to move processed image"
                );
                None
            }
        }
    }

    /// 処理して、呼び出し元に返す応答（ステータス + 本文）を組み立てる
    pub async fn handle(&self, request: &AnalysisRequest) -> InvocationResponse {
        let started = Instant::now();
        let outcome = self.process(request).await;
        InvocationResponse::from_outcome(request, outcome, started.elapsed())
    }
}
