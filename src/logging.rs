use std::env;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// ログレベルを指定する環境変数
pub const LEVEL_ENV: &str = "TRACING_LEVEL";

/// ログ出力を初期化（標準エラーへ出力、標準出力はJSON応答用に空けておく）
pub fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = env::var(LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());

    let result = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false),
        )
        .with(EnvFilter::new(filter))
        .try_init();

    if result.is_ok() {
        tracing::debug!("Tracing is configured for stderr logging.");
    }
}
