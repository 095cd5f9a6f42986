//! 外部コマンドによるラベル検出
//!
//! 分類コマンドを `<program> [args..] --min-confidence <f> --max-labels <n> <path|->`
//! の形で起動し、標準出力のJSONを読む:
//!
//! ```json
//! {"Labels": [{"Name": "Car Damage", "Confidence": 92.3}]}
//! ```
//!
//! バイト列入力の場合はパスの代わりに "-" を渡し、標準入力に画像を流す。

use super::{apply_detect_options, DetectOptions, LabelSource, Labeler, LabelerError};
use damage_report_common::DamageLabel;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

lazy_static! {
    static ref ERROR_CODE: Regex = Regex::new(
        r"(InvalidImageFormat|ImageTooLarge|InvalidS3Object|InvalidParameter)Exception"
    )
    .unwrap();
}

#[derive(Debug, Deserialize)]
struct LabelOutput {
    #[serde(alias = "Labels", default)]
    labels: Vec<DamageLabel>,
}

#[derive(Debug, Clone)]
pub struct CommandLabeler {
    program: String,
    args: Vec<String>,
    /// 参照入力を実パスに解決するためのストアのルート
    store_root: PathBuf,
}

impl CommandLabeler {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        store_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            store_root: store_root.into(),
        }
    }

    /// `["program", "arg1", ...]` 形式の設定から生成
    pub fn from_command_line(command: &[String], store_root: impl Into<PathBuf>) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), store_root))
    }

    fn resolve_path(&self, bucket: &str, key: &str) -> Result<PathBuf, LabelerError> {
        let location = format!("{}/{}", bucket, key);
        let relative = std::path::Path::new(bucket).join(key);
        if relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(LabelerError::InvalidReference(location));
        }

        let path = self.store_root.join(relative);
        if !path.is_file() {
            return Err(LabelerError::InvalidReference(location));
        }
        Ok(path)
    }

    async fn run(
        &self,
        target: &str,
        stdin_bytes: Option<&[u8]>,
        options: &DetectOptions,
    ) -> Result<String, LabelerError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--min-confidence")
            .arg(options.min_confidence.to_string())
            .arg("--max-labels")
            .arg(options.max_labels.to_string())
            .arg(target)
            .stdin(if stdin_bytes.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| LabelerError::ServiceError(format!("{}の起動に失敗: {}", self.program, e)))?;

        if let (Some(bytes), Some(mut stdin)) = (stdin_bytes, child.stdin.take()) {
            stdin
                .write_all(bytes)
                .await
                .map_err(|e| LabelerError::ServiceError(format!("標準入力への書き込みに失敗: {}", e)))?;
            // stdin を閉じてEOFを伝える
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| LabelerError::ServiceError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(output.status.code(), &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// 分類コマンドの失敗を標準エラーのエラーコードで分類
pub fn classify_failure(code: Option<i32>, stderr: &str) -> LabelerError {
    let Some(caps) = ERROR_CODE.captures(stderr) else {
        return LabelerError::ServiceError(format!(
            "classifier failed (code {:?}): {}",
            code,
            stderr.trim()
        ));
    };

    match &caps[1] {
        "InvalidImageFormat" => LabelerError::InvalidImageFormat,
        "ImageTooLarge" => LabelerError::ImageTooLarge,
        "InvalidS3Object" => LabelerError::InvalidReference(stderr.trim().to_string()),
        _ => LabelerError::ServiceError(format!("invalid parameter: {}", stderr.trim())),
    }
}

/// 分類コマンドの出力をパース
pub fn parse_label_output(stdout: &str) -> Result<Vec<DamageLabel>, LabelerError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let output: LabelOutput = serde_json::from_str(trimmed)
        .map_err(|e| LabelerError::ServiceError(format!("unparseable classifier output: {}", e)))?;
    Ok(output.labels)
}

impl Labeler for CommandLabeler {
    async fn detect(
        &self,
        source: LabelSource<'_>,
        options: &DetectOptions,
    ) -> Result<Vec<DamageLabel>, LabelerError> {
        let stdout = match source {
            LabelSource::Reference(object) => {
                let path = self.resolve_path(&object.bucket, &object.key)?;
                self.run(&path.to_string_lossy(), None, options).await?
            }
            LabelSource::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(LabelerError::InvalidImageFormat);
                }
                self.run("-", Some(bytes), options).await?
            }
        };

        let labels = apply_detect_options(parse_label_output(&stdout)?, options);
        tracing::info!(count = labels.len(), "labels detected");
        Ok(labels)
    }
}
