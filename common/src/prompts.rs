//! プロンプト生成モジュール
//!
//! 損傷ラベルから損傷評価用プロンプトを組み立てる。
//! 期待する回答は4部構成:
//! 損傷の種類と程度 / 修理の難易度 / 修理費用の目安 / 次の対応

use crate::types::DamageLabel;

/// ラベルが1つもないときに指標一覧の代わりに入れる文言
pub const NO_INDICATORS: &str = "none detected";

/// ラベルなしで生成をスキップしたときのレポート本文
pub const SKIPPED_REPORT: &str =
    "No damage indicators were detected in this image; report generation was skipped.";

/// ラベル1件を "名前 (Confidence: 92.3%)" 形式に整形
pub fn format_label(label: &DamageLabel) -> String {
    format!("{} (Confidence: {:.1}%)", label.name, label.confidence)
}

/// 損傷評価プロンプト生成
///
/// # Arguments
/// * `labels` - フィルタ済みの損傷ラベル（空でもよい）
pub fn build_damage_prompt(labels: &[DamageLabel]) -> String {
    let indicators = if labels.is_empty() {
        NO_INDICATORS.to_string()
    } else {
        labels
            .iter()
            .map(format_label)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"Analyze the following image for damage. Detected potential damage indicators: {indicators}

Provide a detailed damage assessment including:
1. Type and extent of damage
2. Estimated repair complexity
3. Potential repair cost range
4. Recommendations for next steps

Be specific and use the detected labels and their confidence levels as context."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_label_one_decimal() {
        assert_eq!(
            format_label(&DamageLabel::new("Car Damage", 92.34)),
            "Car Damage (Confidence: 92.3%)"
        );
        assert_eq!(
            format_label(&DamageLabel::new("Dent", 70.0)),
            "Dent (Confidence: 70.0%)"
        );
    }

    #[test]
    fn test_build_prompt_joins_labels() {
        let prompt = build_damage_prompt(&[
            DamageLabel::new("Car Damage", 92.3),
            DamageLabel::new("Scratch", 75.06),
        ]);
        assert!(prompt.contains(
            "Detected potential damage indicators: Car Damage (Confidence: 92.3%), Scratch (Confidence: 75.1%)"
        ));
    }

    #[test]
    fn test_build_prompt_has_four_sections() {
        let prompt = build_damage_prompt(&[DamageLabel::new("Dent", 80.0)]);
        assert!(prompt.contains("1. Type and extent of damage"));
        assert!(prompt.contains("2. Estimated repair complexity"));
        assert!(prompt.contains("3. Potential repair cost range"));
        assert!(prompt.contains("4. Recommendations for next steps"));
    }

    #[test]
    fn test_build_prompt_without_labels() {
        let prompt = build_damage_prompt(&[]);
        assert!(prompt.contains("Detected potential damage indicators: none detected"));
    }
}
