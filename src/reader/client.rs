use super::types::{BatchUpdateResult, DocumentUpdate, ListResponse, UpdateFailure, UpdateProgress};
use crate::error::{Result, TriageError};
use crate::http::{self, retry, RetryPolicy};
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use triage_common::Item;

pub const DEFAULT_BASE_URL: &str = "https://readwise.io";

/// `days_ago` 未指定時の取得期間
pub const DEFAULT_DAYS_AGO: u32 = 7;

/// `location` 未指定時の取得先（受信箱）
pub const DEFAULT_LOCATION: &str = "new";

/// 一括更新の間隔（APIのレート制限に合わせる）
pub const BATCH_INTERVAL: Duration = Duration::from_secs(2);

const AUTH_PATH: &str = "/api/v2/auth/";
const LIST_PATH: &str = "/api/v3/list/";
const UPDATE_SEGMENTS: [&str; 3] = ["api", "v3", "update"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `updatedAfter` に渡す時刻（`now` から `days_ago` 日前、秒精度のUTC）
///
/// 表現できない過去になる日数は設定エラー。
pub fn updated_after(now: DateTime<Utc>, days_ago: u32) -> Result<String> {
    now.checked_sub_signed(ChronoDuration::days(i64::from(days_ago)))
        .map(|cutoff| cutoff.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| TriageError::Config(format!("取得期間が長すぎます: {}日", days_ago)))
}

#[derive(Clone)]
pub struct ReaderClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    retry: RetryPolicy,
    pacing: Duration,
}

impl ReaderClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(TriageError::MissingCredential("Readwiseトークン"));
        }

        Ok(Self {
            http: http::build_client(REQUEST_TIMEOUT)?,
            token: token.trim().to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            pacing: BATCH_INTERVAL,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 一括更新の間隔を変更
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/api/v3/update/<id>/`（IDはパスセグメントとしてエンコード）
    fn update_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TriageError::Config(format!("ReaderのベースURLが不正: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| TriageError::Config(format!("ReaderのベースURLが不正: {}", self.base_url)))?
            .pop_if_empty()
            .extend(UPDATE_SEGMENTS)
            .push(id)
            .push("");
        Ok(url)
    }

    fn auth_value(&self) -> String {
        format!("Token {}", self.token)
    }

    /// トークンが有効か確認（204なら有効）
    ///
    /// ステータスに関わらず `Ok(bool)` を返し、送信自体に失敗した場合のみエラー。
    pub async fn verify_token(&self) -> Result<bool> {
        let response = self
            .http
            .get(self.url(AUTH_PATH))
            .header(AUTHORIZATION, self.auth_value())
            .send()
            .await?;

        let valid = response.status() == StatusCode::NO_CONTENT;
        debug!(status = %response.status(), valid, "token check");
        Ok(valid)
    }

    /// 受信箱のアイテムを取得（カーソルでページを辿る）
    ///
    /// # Arguments
    /// * `days_ago` - 何日前以降に更新されたものを取るか（0なら7日）
    /// * `location` - 取得先（空なら "new"）
    ///
    /// どのページで失敗しても途中結果は返さずエラーにする。
    pub async fn fetch_inbox_items(&self, days_ago: u32, location: &str) -> Result<Vec<Item>> {
        let days_ago = if days_ago == 0 { DEFAULT_DAYS_AGO } else { days_ago };
        let location = if location.trim().is_empty() {
            DEFAULT_LOCATION
        } else {
            location.trim()
        };

        let since = updated_after(Utc::now(), days_ago)?;
        let url = self.url(LIST_PATH);

        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_count = 0usize;

        loop {
            let mut query: Vec<(&str, &str)> =
                vec![("location", location), ("updatedAfter", since.as_str())];
            if let Some(ref c) = cursor {
                query.push(("pageCursor", c.as_str()));
            }

            let response = retry::execute(&self.retry, "reader.list", || {
                self.http
                    .get(&url)
                    .header(AUTHORIZATION, self.auth_value())
                    .query(&query)
                    .send()
            })
            .await?;

            if !response.status().is_success() {
                return Err(retry::status_error(response).await);
            }

            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| TriageError::ApiParse(format!("一覧レスポンス: {}", e)))?;
            page_count += 1;
            debug!(
                page = page_count,
                results = page.results.len(),
                count = page.count,
                "fetched list page"
            );

            let next = page.next_cursor().map(str::to_string);
            items.extend(page.results);

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(items = items.len(), pages = page_count, location, days_ago, "fetched inbox");
        Ok(items)
    }

    /// 1件のドキュメントを更新（200以外はエラー）
    pub async fn update_document(&self, update: &DocumentUpdate) -> Result<()> {
        let url = self.update_url(&update.id)?;

        let response = retry::execute(&self.retry, "reader.update", || {
            self.http
                .patch(url.clone())
                .header(AUTHORIZATION, self.auth_value())
                .json(update)
                .send()
        })
        .await?;

        if response.status() != StatusCode::OK {
            return Err(retry::status_error(response).await);
        }
        Ok(())
    }

    /// 複数件を一定間隔で順に更新
    ///
    /// 失敗しても中断せず、結果に集計する。`progress` を渡すと1件ごとに進捗を送り、
    /// 終了時に送信側を破棄して受信ループを終わらせる。
    pub async fn batch_update(
        &self,
        updates: &[DocumentUpdate],
        progress: Option<mpsc::Sender<UpdateProgress>>,
    ) -> BatchUpdateResult {
        let mut result = BatchUpdateResult {
            total: updates.len(),
            ..Default::default()
        };

        for (index, update) in updates.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.pacing).await;
            }

            let success = match self.update_document(update).await {
                Ok(()) => {
                    result.success += 1;
                    true
                }
                Err(e) => {
                    warn!(id = %update.id, error = %e, "update failed");
                    result.failed += 1;
                    result.errors.push(UpdateFailure {
                        id: update.id.clone(),
                        error: e.to_string(),
                    });
                    false
                }
            };

            if let Some(tx) = &progress {
                let event = UpdateProgress {
                    current: index + 1,
                    total: updates.len(),
                    id: update.id.clone(),
                    success,
                };
                // 受信側が先に終わっていても処理は続ける
                let _ = tx.send(event).await;
            }
        }

        info!(
            total = result.total,
            success = result.success,
            failed = result.failed,
            "batch update finished"
        );
        result
    }
}
