use crate::error::{DamageReportError, Result};
use crate::generator::{GeneratorSettings, RetryPolicy};
use crate::labeler::DetectOptions;
use crate::pipeline::{EmptyLabelPolicy, PipelineOptions};
use damage_report_common::ModelParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_ENV: &str = "DAMAGE_REPORT_API_KEY";

/// 待ち時間が倍増し続ける範囲に収める
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ローカルストアのルート（バケット = 直下のディレクトリ）
    pub store_root: PathBuf,
    pub source_bucket: String,
    pub output_bucket: String,
    /// `run` で対象にするキーのプレフィックス
    pub image_prefix: String,

    pub model_id: String,
    pub model_endpoint: String,
    pub api_key: Option<String>,
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,

    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub retry_deadline_secs: Option<u64>,

    pub min_confidence: f32,
    pub max_labels: u32,
    /// 分類コマンド（先頭がプログラム名）
    pub labeler_command: Vec<String>,
    pub empty_labels: EmptyLabelPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("."),
            source_bucket: "damage-images".into(),
            output_bucket: "damage-reports".into(),
            image_prefix: "damage_images/".into(),
            model_id: "anthropic.claude-3-sonnet-20240229-v1:0".into(),
            model_endpoint: "https://bedrock-runtime.us-east-1.amazonaws.com".into(),
            api_key: None,
            anthropic_version: "bedrock-2023-05-31".into(),
            max_tokens: 1000,
            temperature: 0.7,
            timeout_seconds: 120,
            max_attempts: 3,
            base_delay_ms: 2000,
            retry_deadline_secs: None,
            min_confidence: 70.0,
            max_labels: 20,
            labeler_command: vec!["detect-labels".into()],
            empty_labels: EmptyLabelPolicy::Generate,
        }
    }
}

impl Config {
    /// 設定を読み込む
    ///
    /// `path` 省略時は `~/.config/damage-report/config.json`。
    /// ファイルが無ければデフォルト値。APIキーは環境変数を優先する。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else if path.is_some() {
            return Err(DamageReportError::Config(format!(
                "設定ファイルが見つかりません: {}",
                config_path.display()
            )));
        } else {
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api_key = Some(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DamageReportError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("damage-report").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(DamageReportError::Config(msg.to_string())) };

        if self.source_bucket.trim().is_empty() || self.output_bucket.trim().is_empty() {
            return invalid("バケット名が空です");
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return invalid(&format!(
                "max_attempts は1〜{}の範囲にしてください",
                MAX_ATTEMPTS_LIMIT
            ));
        }
        if self.base_delay_ms == 0 {
            return invalid("base_delay_ms は1以上にしてください");
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return invalid("min_confidence は0〜100の範囲にしてください");
        }
        if self.max_labels == 0 {
            return invalid("max_labels は1以上にしてください");
        }
        if self.model_id.trim().is_empty() {
            return invalid("model_id が空です");
        }
        if self.labeler_command.is_empty() {
            return invalid("labeler_command が空です");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            deadline: self.retry_deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            model_id: self.model_id.clone(),
            params: ModelParams {
                anthropic_version: self.anthropic_version.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            retry: self.retry_policy(),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            detect: DetectOptions {
                min_confidence: self.min_confidence,
                max_labels: self.max_labels,
            },
            empty_labels: self.empty_labels,
        }
    }
}
