//! 損傷キーワード分類
//!
//! 分類器のラベル名に損傷キーワードが含まれるかで損傷ラベルを判定する。
//! キーワード一覧を変更すると検出結果が変わるため、
//! 変更時は `TAXONOMY_VERSION` を上げてテストを更新すること。

use crate::error::{Error, Result};
use crate::types::DamageLabel;

/// キーワード一覧のバージョン
pub const TAXONOMY_VERSION: u32 = 1;

/// 損傷キーワード（小文字、部分一致）
pub const DAMAGE_KEYWORDS: &[&str] = &[
    // 物理的損傷
    "damage",
    "crack",
    "scratch",
    "dent",
    "broken",
    "chip",
    "split",
    "tear",
    "puncture",
    "gouge",
    "rupture",
    "fissure",
    "fracture",
    "destroyed",
    // 表面の損傷
    "rust",
    "corrosion",
    "wear",
    "deterioration",
    "degradation",
    "erosion",
    "stain",
    "discoloration",
    "peeling",
    "chipped paint",
    "surface damage",
    // 構造的損傷
    "deformation",
    "warped",
    "bent",
    "misaligned",
    "collapsed",
    "buckled",
    "twisted",
    "structural failure",
    "compromised",
    // 素材別の損傷
    "shattered",
    "cracked glass",
    "metal fatigue",
    "material failure",
    "structural weakness",
    "fragmented",
    // 状況を示すもの
    "impact",
    "collision",
    "accident",
    "trauma",
    "stress",
    "strain",
    "mechanical failure",
    "structural compromise",
];

/// ラベル名に損傷キーワードが含まれるか
pub fn matched_keyword(name: &str) -> Option<&'static str> {
    let lowered = name.to_lowercase();
    DAMAGE_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| lowered.contains(keyword))
}

pub fn is_damage_label(label: &DamageLabel) -> bool {
    matched_keyword(&label.name).is_some()
}

/// 損傷ラベルのみを抽出
///
/// 入力順を保った部分列を返す。信頼度による再フィルタはしない
/// （閾値は分類器側の最小信頼度で適用済み）。
///
/// # Errors
/// 名前が空のラベル、または信頼度が数値でないラベルがあれば `MalformedLabel`
pub fn filter_damage_labels(labels: &[DamageLabel]) -> Result<Vec<DamageLabel>> {
    let mut matched = Vec::new();

    for (idx, label) in labels.iter().enumerate() {
        if label.name.trim().is_empty() {
            return Err(Error::MalformedLabel(format!("label #{} has no name", idx)));
        }
        if !label.confidence.is_finite() {
            return Err(Error::MalformedLabel(format!(
                "label '{}' has a non-numeric confidence",
                label.name
            )));
        }
        if is_damage_label(label) {
            matched.push(label.clone());
        }
    }

    Ok(matched)
}
