use anyhow::{Context, Result};
use clap::Parser;
use damage_report::cli::{Cli, Commands};
use damage_report::config::Config;
use damage_report::generator::{HttpModelInvoker, ReportGenerator};
use damage_report::labeler::CommandLabeler;
use damage_report::logging;
use damage_report::pipeline::{AnalysisRequest, DamagePipeline, InvocationResponse};
use damage_report::store::{list_jpg_images, FsObjectStore};
use damage_report_common::ObjectRef;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

type Pipeline = DamagePipeline<FsObjectStore, CommandLabeler, HttpModelInvoker>;

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let store = FsObjectStore::new(&config.store_root);
    let labeler = CommandLabeler::from_command_line(&config.labeler_command, &config.store_root)
        .context("labeler_command が空です")?;
    let invoker = HttpModelInvoker::new(
        &config.model_endpoint,
        config.api_key.clone(),
        Duration::from_secs(config.timeout_seconds),
    )
    .context("HTTPクライアントの初期化に失敗")?;

    Ok(DamagePipeline::new(
        store,
        labeler,
        ReportGenerator::new(invoker, config.generator_settings()),
        config.pipeline_options(),
    ))
}

/// "s3://bucket/key" ならそのまま、それ以外は入力バケット内のキーとして扱う
fn source_ref(key: &str, bucket: &str) -> ObjectRef {
    if key.starts_with("s3://") {
        if let Some(object) = ObjectRef::parse(key) {
            return object;
        }
    }
    ObjectRef::new(bucket, key)
}

fn load_for_edit(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) if !p.exists() => Ok(Config::default()),
        _ => Ok(Config::load(path)?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Analyze { key, source_bucket, output_bucket } => {
            let config = Config::load(config_path).context("設定の読み込みに失敗")?;
            let pipeline = build_pipeline(&config)?;

            let bucket = source_bucket.as_deref().unwrap_or(&config.source_bucket);
            let source = source_ref(&key, bucket);
            let request = AnalysisRequest::new(
                source,
                output_bucket.unwrap_or_else(|| config.output_bucket.clone()),
            );

            let response = pipeline.handle(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if !response.is_success() {
                anyhow::bail!(
                    "{}",
                    response.body.error.unwrap_or(response.body.message)
                );
            }
        }

        Commands::Run { prefix, source_bucket, output_bucket, output } => {
            let config = Config::load(config_path).context("設定の読み込みに失敗")?;
            let pipeline = build_pipeline(&config)?;

            let bucket = source_bucket.unwrap_or_else(|| config.source_bucket.clone());
            let output_bucket = output_bucket.unwrap_or_else(|| config.output_bucket.clone());
            let prefix = prefix.unwrap_or_else(|| config.image_prefix.clone());

            let keys = list_jpg_images(pipeline.store(), &bucket, &prefix)
                .await
                .with_context(|| format!("画像一覧の取得に失敗: {}/{}", bucket, prefix))?;
            eprintln!("✔ {}枚の画像を検出 ({}/{})", keys.len(), bucket, prefix);

            let pb = ProgressBar::new(keys.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")?
                    .progress_chars("=> "),
            );

            // 1枚ずつ独立に処理し、失敗しても続行する
            let mut responses: Vec<InvocationResponse> = Vec::with_capacity(keys.len());
            for key in &keys {
                pb.set_message(key.clone());
                let request = AnalysisRequest::new(ObjectRef::new(&bucket, key), &output_bucket);
                responses.push(pipeline.handle(&request).await);
                pb.inc(1);
            }
            pb.finish_and_clear();

            let failed = responses.iter().filter(|r| !r.is_success()).count();
            let json = serde_json::to_string_pretty(&responses)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("結果の保存に失敗: {}", path.display()))?;
                    eprintln!("✔ 結果を保存: {}", path.display());
                }
                None => println!("{}", json),
            }
            eprintln!("\n✅ 完了: 成功 {} / 失敗 {}", responses.len() - failed, failed);
        }

        Commands::Config { set_api_key, show } => {
            let mut config = load_for_edit(config_path)?;

            if let Some(key) = set_api_key {
                config.api_key = Some(key);
                config.save(config_path)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  ストア: {}", config.store_root.display());
                println!("  入力バケット: {}", config.source_bucket);
                println!("  出力バケット: {}", config.output_bucket);
                println!("  プレフィックス: {}", config.image_prefix);
                println!("  モデル: {}", config.model_id);
                println!("  エンドポイント: {}", config.model_endpoint);
                println!("  最大試行回数: {}", config.max_attempts);
                println!("  基本待ち時間: {}ms", config.base_delay_ms);
                println!("  最小信頼度: {}%", config.min_confidence);
                println!("  最大ラベル数: {}", config.max_labels);
                println!("  分類コマンド: {}", config.labeler_command.join(" "));
                println!("  APIキー: {}", if config.api_key.is_some() { "設定済み" } else { "未設定" });
            }
        }
    }

    Ok(())
}
