//! HTTP共通処理
//!
//! 既読管理APIクライアントとLLMクライアントが同じリトライ方針を使う。

pub mod retry;

pub use retry::{
    classify_status, execute, execute_with, parse_retry_after, Disposition, RetryPolicy,
};

use std::time::Duration;

/// リクエストタイムアウトのデフォルト
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// reqwestクライアントを生成
pub fn build_client(timeout: Duration) -> crate::error::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("inbox-triage/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}
