//! リトライ付きリクエスト実行
//!
//! - 通信エラー / 5xx: 線形バックオフ（attempt × base_delay）で再試行
//! - 429: `Retry-After`（秒）があればその秒数だけ待って再試行
//! - それ以外の4xx: 即座に終端エラー（再試行しない）
//! - その他: 呼び出し元へ返す（ステータス判定は呼び出し元）

use crate::error::{Result, TriageError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 最大試行回数
pub const MAX_ATTEMPTS: u32 = 3;

/// バックオフの基準間隔
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// エラー本文として残す最大文字数
const ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// `attempt` 回目の再試行前の待ち時間
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// レスポンスの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 呼び出し元へ返す
    Accept,
    /// 再試行（待ち時間の指定があればそれを使う）
    Retry(Option<Duration>),
    /// 再試行しない
    Terminal,
}

/// デフォルトの分類
pub fn classify_status(response: &Response) -> Disposition {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        Disposition::Retry(parse_retry_after(response.headers()))
    } else if status.is_server_error() {
        Disposition::Retry(None)
    } else if status.is_client_error() {
        Disposition::Terminal
    } else {
        Disposition::Accept
    }
}

/// `Retry-After` を秒数として読む（HTTP日付形式は扱わない）
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// デフォルトの分類でリクエストを実行
///
/// `send` は1回の試行ごとに呼ばれ、新しいリクエストを組み立てて送信する。
pub async fn execute<F, Fut>(policy: &RetryPolicy, label: &str, send: F) -> Result<Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<Response>>,
{
    execute_with(policy, label, send, classify_status).await
}

/// 分類関数を指定してリクエストを実行
pub async fn execute_with<F, Fut, C>(
    policy: &RetryPolicy,
    label: &str,
    mut send: F,
    classify: C,
) -> Result<Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<Response>>,
    C: Fn(&Response) -> Disposition,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<TriageError> = None;
    let mut pending_delay: Option<Duration> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = pending_delay
                .take()
                .unwrap_or_else(|| policy.backoff(attempt));
            debug!(label, attempt = attempt + 1, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match send().await {
            Err(err) => {
                warn!(label, attempt = attempt + 1, error = %err, "transport error");
                last_error = Some(TriageError::Http(err));
            }
            Ok(response) => match classify(&response) {
                Disposition::Accept => return Ok(response),
                Disposition::Terminal => {
                    let err = status_error(response).await;
                    debug!(label, error = %err, "terminal response");
                    return Err(err);
                }
                Disposition::Retry(hint) => {
                    pending_delay = hint;
                    let err = status_error(response).await;
                    warn!(label, attempt = attempt + 1, error = %err, "retryable response");
                    last_error = Some(err);
                }
            },
        }
    }

    Err(TriageError::RetriesExhausted {
        attempts,
        source: Box::new(
            last_error.unwrap_or_else(|| TriageError::Api(format!("{}: no attempt made", label))),
        ),
    })
}

/// レスポンスをステータスエラーに変換（本文は先頭のみ）
pub async fn status_error(response: Response) -> TriageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    TriageError::Status {
        status,
        body: body.chars().take(ERROR_BODY_CHARS).collect(),
    }
}
