//! ログ初期化
//!
//! ログは stderr、ユーザー向けの進捗表示は stdout に分ける。

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// `TRIAGE_LOG_FORMAT=json` ならJSON行で出力
pub fn logs_are_json() -> bool {
    matches!(std::env::var("TRIAGE_LOG_FORMAT").as_deref(), Ok("json"))
}

/// `-v` の回数に応じた既定のフィルタ
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// tracing を初期化
///
/// `RUST_LOG` があればそれを優先し、なければ `-v` の回数で決める。
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let builder = tracing_subscriber::registry().with(filter);

    if logs_are_json() {
        let _ = builder.with(fmt_layer.json().flatten_event(true)).try_init();
    } else {
        let _ = builder.with(fmt_layer.compact()).try_init();
    }
}
