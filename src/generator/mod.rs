//! 損傷評価レポート生成
//!
//! プロンプト構築 → リクエスト生成 → モデル呼び出し（レート制限時のみ再試行）→ レスポンス解析

mod http;
mod invoker;
pub mod retry;

pub use http::HttpModelInvoker;
pub use invoker::{InvokeError, ModelInvoker};
pub use retry::{is_retriable, AttemptState, RetryPolicy, RetryState};

use crate::error::{DamageReportError, Result};
use damage_report_common::{
    build_damage_prompt, build_model_request, parse_model_reply, DamageLabel, ModelParams,
};
use tokio::time::Instant;

/// 生成の固定設定
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub model_id: String,
    pub params: ModelParams,
    pub retry: RetryPolicy,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            model_id: "anthropic.claude-3-sonnet-20240229-v1:0".into(),
            params: ModelParams::default(),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct ReportGenerator<M> {
    invoker: M,
    settings: GeneratorSettings,
}

impl<M: ModelInvoker> ReportGenerator<M> {
    pub fn new(invoker: M, settings: GeneratorSettings) -> Self {
        Self { invoker, settings }
    }

    pub fn invoker(&self) -> &M {
        &self.invoker
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// 画像とラベルからレポートを生成
    ///
    /// ラベルが空でも生成する（プロンプトには "none detected" が入る）。
    ///
    /// # Errors
    /// * `EmptyInput` - 画像が空
    /// * `GenerationFailure` - レート制限で再試行を使い切った、またはそれ以外の呼び出しエラー
    /// * `Common(UnexpectedResponseShape)` - 既知の形式でないレスポンス
    pub async fn generate(&self, image_bytes: &[u8], labels: &[DamageLabel]) -> Result<String> {
        if image_bytes.is_empty() {
            return Err(DamageReportError::EmptyInput("image bytes".into()));
        }
        if labels.is_empty() {
            tracing::info!("no damage labels; generating with an empty indicator list");
        }

        let prompt = build_damage_prompt(labels);
        let request = build_model_request(image_bytes, &prompt, &self.settings.params);
        let body = serde_json::to_string(&request)?;

        self.invoke_with_retry(&body).await
    }

    async fn invoke_with_retry(&self, body: &str) -> Result<String> {
        let policy = &self.settings.retry;
        let max_attempts = policy.max_attempts.max(1);
        let started = Instant::now();
        let mut retry = RetryState::default();
        let mut state = AttemptState::Attempting(1);

        loop {
            state = match state {
                AttemptState::Attempting(attempt) => {
                    tracing::debug!(
                        attempt,
                        max_attempts,
                        model = %self.settings.model_id,
                        "invoking model"
                    );
                    match self.invoker.invoke(&self.settings.model_id, body).await {
                        Ok(reply) => match parse_model_reply(&reply) {
                            Ok(text) => AttemptState::Succeeded(text),
                            Err(e) => {
                                tracing::error!(attempt, error = %e, "unusable model response");
                                AttemptState::Failed(e.into())
                            }
                        },
                        Err(error) => {
                            retry.record_failure(attempt, error.clone());
                            self.next_state(attempt, max_attempts, error, started).await
                        }
                    }
                }
                AttemptState::Succeeded(text) => {
                    tracing::info!(
                        retries = retry.attempts,
                        chars = text.len(),
                        "report generated"
                    );
                    return Ok(text);
                }
                AttemptState::Failed(error) => {
                    if let Some(last) = &retry.last_error {
                        tracing::error!(
                            attempts = retry.attempts,
                            last_error = %last,
                            "report generation failed"
                        );
                    }
                    return Err(error);
                }
            };
        }
    }

    /// 失敗した試行の次の状態
    async fn next_state(
        &self,
        attempt: u32,
        max_attempts: u32,
        error: InvokeError,
        started: Instant,
    ) -> AttemptState<String, DamageReportError> {
        let policy = &self.settings.retry;
        let failed = |source: InvokeError| {
            AttemptState::Failed(DamageReportError::GenerationFailure {
                attempts: attempt,
                source,
            })
        };

        if !is_retriable(&error) {
            return failed(error);
        }
        if attempt >= max_attempts {
            tracing::error!(attempt, max_attempts, "throttled on every attempt");
            return failed(error);
        }

        let delay = policy.delay_for(attempt);
        if !policy.fits_deadline(started.elapsed(), delay) {
            tracing::error!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retry deadline would be exceeded"
            );
            return failed(error);
        }

        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "model throttled, retrying"
        );
        tokio::time::sleep(delay).await;
        AttemptState::Attempting(attempt + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::result::Result;
    use std::sync::Mutex;
    use std::time::Duration;

    const IMAGE: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

    fn ok_reply(text: &str) -> Result<String, InvokeError> {
        Ok(serde_json::json!({"content": [{"type": "text", "text": text}]}).to_string())
    }

    fn throttled(n: u32) -> Result<String, InvokeError> {
        Err(InvokeError::Throttled(format!("attempt {}", n)))
    }

    /// 決められた順に結果を返すモック
    struct ScriptedInvoker {
        script: Mutex<VecDeque<Result<String, InvokeError>>>,
        calls: Mutex<Vec<(Instant, String)>>,
    }

    impl ScriptedInvoker {
        fn new(script: Vec<Result<String, InvokeError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1].0 - w[0].0).collect()
        }
    }

    impl ModelInvoker for ScriptedInvoker {
        async fn invoke(&self, _model_id: &str, body: &str) -> Result<String, InvokeError> {
            self.calls.lock().unwrap().push((Instant::now(), body.to_string()));
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(InvokeError::Service {
                    status: None,
                    message: "unexpected call".into(),
                })
            })
        }
    }

    fn generator(
        script: Vec<Result<String, InvokeError>>,
        retry: RetryPolicy,
    ) -> ReportGenerator<ScriptedInvoker> {
        ReportGenerator::new(
            ScriptedInvoker::new(script),
            GeneratorSettings {
                retry,
                ..GeneratorSettings::default()
            },
        )
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            deadline: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let gen = generator(vec![ok_reply("Minor dent on door.")], fast_policy(3));
        let labels = vec![DamageLabel::new("Dent", 81.0)];

        let report = gen.generate(IMAGE, &labels).await.unwrap();

        assert_eq!(report, "Minor dent on door.");
        assert_eq!(gen.invoker().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_throttling_with_growing_backoff() {
        let gen = generator(
            vec![throttled(1), throttled(2), ok_reply("recovered")],
            fast_policy(3),
        );

        let report = gen.generate(IMAGE, &[]).await.unwrap();

        assert_eq!(report, "recovered");
        assert_eq!(gen.invoker().call_count(), 3);
        let gaps = gen.invoker().gaps();
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0] >= Duration::from_millis(100));
        assert!(gaps[1] > gaps[0], "backoff must grow: {:?}", gaps);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_calls_after_success() {
        let gen = generator(
            vec![throttled(1), ok_reply("done"), ok_reply("never used")],
            fast_policy(5),
        );

        assert_eq!(gen.generate(IMAGE, &[]).await.unwrap(), "done");
        assert_eq!(gen.invoker().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_last_error() {
        let gen = generator(
            vec![throttled(1), throttled(2), throttled(3), ok_reply("too late")],
            fast_policy(3),
        );

        let err = gen.generate(IMAGE, &[]).await.unwrap_err();

        assert_eq!(gen.invoker().call_count(), 3);
        match err {
            DamageReportError::GenerationFailure { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(source, InvokeError::Throttled("attempt 3".into()));
            }
            other => panic!("Expected GenerationFailure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_error_not_retried() {
        let gen = generator(
            vec![
                Err(InvokeError::Service {
                    status: Some(400),
                    message: "ValidationException".into(),
                }),
                ok_reply("never used"),
            ],
            fast_policy(3),
        );

        let err = gen.generate(IMAGE, &[]).await.unwrap_err();

        assert_eq!(gen.invoker().call_count(), 1);
        assert!(matches!(
            err,
            DamageReportError::GenerationFailure {
                attempts: 1,
                source: InvokeError::Service { .. }
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_not_retried() {
        let gen = generator(
            vec![Err(InvokeError::Transport("connection reset".into())), ok_reply("x")],
            fast_policy(3),
        );

        let err = gen.generate(IMAGE, &[]).await.unwrap_err();

        assert_eq!(gen.invoker().call_count(), 1);
        assert!(matches!(err, DamageReportError::GenerationFailure { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_shape_is_terminal() {
        let gen = generator(
            vec![Ok(r#"{"completion": "legacy"}"#.into()), ok_reply("x")],
            fast_policy(3),
        );

        let err = gen.generate(IMAGE, &[]).await.unwrap_err();

        assert_eq!(gen.invoker().call_count(), 1);
        assert!(matches!(
            err,
            DamageReportError::Common(damage_report_common::Error::UnexpectedResponseShape(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_json_reply_is_unexpected_shape() {
        let gen = generator(
            vec![Ok("<html>502 Bad Gateway</html>".into()), ok_reply("x")],
            fast_policy(3),
        );

        let err = gen.generate(IMAGE, &[]).await.unwrap_err();

        assert_eq!(gen.invoker().call_count(), 1);
        assert!(matches!(
            err,
            DamageReportError::Common(damage_report_common::Error::UnexpectedResponseShape(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_image_rejected_before_invoking() {
        let gen = generator(vec![ok_reply("x")], fast_policy(3));

        let err = gen.generate(&[], &[DamageLabel::new("Dent", 90.0)]).await.unwrap_err();

        assert!(matches!(err, DamageReportError::EmptyInput(_)));
        assert_eq!(gen.invoker().call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_labels_still_generate() {
        let gen = generator(vec![ok_reply("No visible damage.")], fast_policy(3));

        let report = gen.generate(IMAGE, &[]).await.unwrap();

        assert_eq!(report, "No visible damage.");
        let calls = gen.invoker().calls.lock().unwrap();
        assert!(calls[0].1.contains("none detected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_body_carries_labels_and_image() {
        let gen = generator(vec![ok_reply("ok")], fast_policy(1));

        gen.generate(IMAGE, &[DamageLabel::new("Car Damage", 92.3)]).await.unwrap();

        let calls = gen.invoker().calls.lock().unwrap();
        let body: serde_json::Value = serde_json::from_str(&calls[0].1).unwrap();
        assert_eq!(body["max_tokens"], 1000);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["source"]["data"], "/9j/4A==");
        assert!(content[1]["text"]
            .as_str()
            .unwrap()
            .contains("Car Damage (Confidence: 92.3%)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_total_retry_time() {
        let gen = generator(
            vec![throttled(1), throttled(2), throttled(3), ok_reply("x")],
            RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(100),
                deadline: Some(Duration::from_millis(150)),
            },
        );

        let err = gen.generate(IMAGE, &[]).await.unwrap_err();

        // 2回目の後は 100ms + 200ms > 150ms なので打ち切り
        assert_eq!(gen.invoker().call_count(), 2);
        match err {
            DamageReportError::GenerationFailure { attempts, source } => {
                assert_eq!(attempts, 2);
                assert_eq!(source, InvokeError::Throttled("attempt 2".into()));
            }
            other => panic!("Expected GenerationFailure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy_never_sleeps() {
        let gen = generator(vec![throttled(1), ok_reply("x")], fast_policy(1));

        let err = gen.generate(IMAGE, &[]).await.unwrap_err();

        assert_eq!(gen.invoker().call_count(), 1);
        assert!(matches!(err, DamageReportError::GenerationFailure { attempts: 1, .. }));
    }
}
