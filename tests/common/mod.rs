//! 結合テスト用のモック
#![allow(dead_code)]

use damage_report::generator::{
    GeneratorSettings, InvokeError, ModelInvoker, ReportGenerator, RetryPolicy,
};
use damage_report::labeler::{DetectOptions, LabelSource, Labeler, LabelerError};
use damage_report::pipeline::{DamagePipeline, PipelineOptions};
use damage_report::store::{FsObjectStore, ObjectStore, StoreError};
use damage_report_common::DamageLabel;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SOURCE_BUCKET: &str = "damage-images";
pub const OUTPUT_BUCKET: &str = "damage-reports";
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// ストア上に画像を置く
pub fn put_object(root: &Path, bucket: &str, key: &str, bytes: &[u8]) {
    let path = root.join(bucket).join(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

pub fn object_exists(root: &Path, bucket: &str, key: &str) -> bool {
    root.join(bucket).join(key).is_file()
}

// =============================================
// Labeler
// =============================================

pub enum LabelBehavior {
    Labels(Vec<DamageLabel>),
    Fail(String),
}

/// 決まったラベルを返し、渡された入力を記録する
pub struct MockLabeler {
    behavior: LabelBehavior,
    pub seen: Mutex<Vec<String>>,
}

impl MockLabeler {
    pub fn returning(labels: Vec<DamageLabel>) -> Self {
        Self {
            behavior: LabelBehavior::Labels(labels),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            behavior: LabelBehavior::Fail(message.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Labeler for MockLabeler {
    async fn detect(
        &self,
        source: LabelSource<'_>,
        _options: &DetectOptions,
    ) -> Result<Vec<DamageLabel>, LabelerError> {
        let seen = match source {
            LabelSource::Reference(object) => format!("reference:{}", object),
            LabelSource::Bytes(bytes) => format!("bytes:{}", bytes.len()),
        };
        self.seen.lock().unwrap().push(seen);

        match &self.behavior {
            LabelBehavior::Labels(labels) => Ok(labels.clone()),
            LabelBehavior::Fail(message) => Err(LabelerError::ServiceError(message.clone())),
        }
    }
}

// =============================================
// ModelInvoker
// =============================================

/// 決められた順に結果を返す
pub struct MockInvoker {
    script: Mutex<VecDeque<Result<String, InvokeError>>>,
    pub bodies: Mutex<Vec<String>>,
}

impl MockInvoker {
    pub fn new(script: Vec<Result<String, InvokeError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![reply(text)])
    }

    pub fn call_count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

pub fn reply(text: &str) -> Result<String, InvokeError> {
    Ok(serde_json::json!({
        "id": "msg_test",
        "role": "assistant",
        "content": [{"type": "text", "text": text}]
    })
    .to_string())
}

pub fn throttled(attempt: u32) -> Result<String, InvokeError> {
    Err(InvokeError::Throttled(format!("ThrottlingException on attempt {}", attempt)))
}

impl ModelInvoker for MockInvoker {
    async fn invoke(&self, _model_id: &str, body: &str) -> Result<String, InvokeError> {
        self.bodies.lock().unwrap().push(body.to_string());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(InvokeError::Service {
                status: None,
                message: "no scripted response left".into(),
            })
        })
    }
}

// =============================================
// ObjectStore
// =============================================

/// 書き込み・削除を失敗させられるストア
pub struct FlakyStore {
    pub inner: FsObjectStore,
    pub fail_write: bool,
    pub fail_delete: bool,
}

impl FlakyStore {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: FsObjectStore::new(root),
            fail_write: false,
            fail_delete: false,
        }
    }
}

impl ObjectStore for FlakyStore {
    async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.read(bucket, key).await
    }

    async fn write(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StoreError> {
        if self.fail_write {
            return Err(StoreError::WriteDenied(format!("{}/{}", bucket, key)));
        }
        self.inner.write(bucket, key, bytes, content_type).await
    }

    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError> {
        self.inner.copy(bucket, source_key, dest_key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        // 移動元の削除だけ失敗させる（ロールバックの削除は通す）
        if self.fail_delete && !key.contains("/processed/") {
            return Err(StoreError::AccessDenied(format!("{}/{}", bucket, key)));
        }
        self.inner.delete(bucket, key).await
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(bucket, prefix).await
    }
}

// =============================================
// Pipeline
// =============================================

pub fn fast_settings(max_attempts: u32) -> GeneratorSettings {
    GeneratorSettings {
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            deadline: None,
        },
        ..GeneratorSettings::default()
    }
}

pub fn pipeline<S: ObjectStore>(
    store: S,
    labeler: MockLabeler,
    invoker: MockInvoker,
    options: PipelineOptions,
) -> DamagePipeline<S, MockLabeler, MockInvoker> {
    DamagePipeline::new(
        store,
        labeler,
        ReportGenerator::new(invoker, fast_settings(3)),
        options,
    )
}

// =============================================
// Logs
// =============================================

/// fmt レイヤーの出力先（テストで中身を確認する）
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// このスレッドのログを `LogBuffer` に集める
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
