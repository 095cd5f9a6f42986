//! Damage Report Common Library
//!
//! 損傷レポート生成の入出力を持たない部分:
//! 型定義、損傷キーワード分類、プロンプト、リクエスト生成、レスポンス解析、キー生成

pub mod types;
pub mod error;
pub mod taxonomy;
pub mod prompts;
pub mod request;
pub mod parser;
pub mod keys;

pub use types::{AnalysisResult, DamageLabel, ObjectRef, ProcessingStatus};
pub use error::{Error, Result};
pub use taxonomy::{filter_damage_labels, is_damage_label, DAMAGE_KEYWORDS, TAXONOMY_VERSION};
pub use prompts::{build_damage_prompt, format_label, SKIPPED_REPORT};
pub use request::{build_model_request, ModelParams, ModelRequest};
pub use parser::parse_model_reply;
pub use keys::{basename, is_processed_key, processed_key, report_key};
