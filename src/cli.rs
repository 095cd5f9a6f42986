use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "damage-report")]
#[command(about = "画像損傷解析・損傷評価レポート生成ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ファイル（省略時は ~/.config/damage-report/config.json）
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像1枚を解析してレポートを保存
    Analyze {
        /// 画像のキー（"s3://bucket/key" 形式ならバケットも指定）
        #[arg(required = true)]
        key: String,

        /// 入力バケット（省略時は設定値）
        #[arg(long)]
        source_bucket: Option<String>,

        /// レポート出力バケット（省略時は設定値）
        #[arg(long)]
        output_bucket: Option<String>,
    },

    /// プレフィックス配下のJPEG画像をすべて処理
    Run {
        /// 対象プレフィックス（省略時は設定値）
        #[arg(short, long)]
        prefix: Option<String>,

        /// 入力バケット（省略時は設定値）
        #[arg(long)]
        source_bucket: Option<String>,

        /// レポート出力バケット（省略時は設定値）
        #[arg(long)]
        output_bucket: Option<String>,

        /// 各画像の応答JSONを出力するファイル
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
