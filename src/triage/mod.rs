//! トリアージのパイプライン
//!
//! 取得済みアイテム → ストアで未判定を絞り込み → LLM/手動/インポートで判定 →
//! ストアへ保存 → Readerへ一括反映、の各段をつなぐ。

pub mod manual;

use crate::error::Result;
use crate::llm::LlmClient;
use crate::reader::{BatchUpdateResult, DocumentUpdate, ReaderClient, UpdateProgress};
use crate::store::{TriageStore, TriageStoreEntry};
use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use triage_common::normalize::dedupe_tags;
use triage_common::{items_json, parse_triage_response_lenient, Action, Item, TriageResult, TriageSource};

/// LLMに一度に渡すアイテム数
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// 進捗チャネルのバッファ
const PROGRESS_BUFFER: usize = 32;

/// 未判定のアイテム（入力順を維持）
pub fn untriaged_items(items: &[Item], store: &TriageStore) -> Vec<Item> {
    items
        .iter()
        .filter(|item| !store.has_triaged(&item.id))
        .cloned()
        .collect()
}

/// LLMトリアージの集計
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LlmTriageSummary {
    /// ストアに書き込んだ件数
    pub applied: usize,
    /// 対象外IDなどで捨てた件数
    pub skipped: usize,
    pub batches: usize,
}

/// アイテムをバッチに分けてLLMで判定し、バッチごとに保存する
///
/// 途中で失敗した場合も、それまでのバッチの結果は保存済み。
///
/// # Arguments
/// * `on_batch` - 各バッチの送信前に `(バッチ番号(1始まり), バッチ総数)` で呼ばれる
pub async fn run_llm_triage<F>(
    client: &LlmClient,
    store: &mut TriageStore,
    items: &[Item],
    batch_size: usize,
    mut on_batch: F,
) -> Result<LlmTriageSummary>
where
    F: FnMut(usize, usize),
{
    let batch_size = batch_size.max(1);
    let total_batches = items.len().div_ceil(batch_size);
    let mut summary = LlmTriageSummary::default();

    for (index, chunk) in items.chunks(batch_size).enumerate() {
        on_batch(index + 1, total_batches);

        let json = items_json(chunk)?;
        let results = client.triage_items(&json).await?;

        let ids: HashSet<&str> = chunk.iter().map(|item| item.id.as_str()).collect();
        for result in &results {
            if !ids.contains(result.id.as_str()) {
                warn!(id = %result.id, "llm returned an id outside the batch, skipped");
                summary.skipped += 1;
                continue;
            }
            record_result(store, result, TriageSource::Llm);
            summary.applied += 1;
        }

        store.save()?;
        summary.batches += 1;
        info!(
            batch = index + 1,
            total_batches,
            results = results.len(),
            "llm batch saved"
        );
    }

    Ok(summary)
}

fn record_result(store: &mut TriageStore, result: &TriageResult, source: TriageSource) {
    store.set_item(
        &result.id,
        result.triage_decision.action,
        result.triage_decision.priority,
        source,
        result.suggested_tags(),
        Some(result.to_report()),
    );
}

/// インポート結果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub applied: usize,
    pub total: usize,
    pub warnings: Vec<String>,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "applied {}/{}", self.applied, self.total)?;
        if !self.warnings.is_empty() {
            write!(f, "; warnings: {}", self.warnings.join("; "))?;
        }
        Ok(())
    }
}

/// 判定結果テキスト（モデルの前後の文章を含んでよい）をストアに取り込む
///
/// 不正な要素は警告として残し、正しい要素だけ反映する。
pub fn apply_results(
    store: &mut TriageStore,
    text: &str,
    source: TriageSource,
) -> Result<ImportSummary> {
    let parsed = parse_triage_response_lenient(text)?;

    for result in &parsed.results {
        record_result(store, result, source);
    }
    store.save()?;

    let summary = ImportSummary {
        applied: parsed.results.len(),
        total: parsed.total,
        warnings: parsed.warnings,
    };
    info!(%summary, "results imported");
    Ok(summary)
}

/// 判定 → Readerの更新内容
///
/// - read_now → shortlist / later → later / archive → archive
/// - delete → archive + `to-delete` タグ
/// - needs_review → 場所はそのまま + `needs-review` タグ
/// - 優先度あり → `priority-<level>` タグ
///
/// Readerはタグを丸ごと置き換えるので、既存タグも含めて送る。
pub fn decision_to_update(item: &Item, entry: &TriageStoreEntry, with_notes: bool) -> DocumentUpdate {
    let mut update = DocumentUpdate::new(item.id.clone());
    let mut extra = Vec::new();

    match entry.action {
        Action::ReadNow => update.location = "shortlist".into(),
        Action::Later => update.location = "later".into(),
        Action::Archive => update.location = "archive".into(),
        Action::Delete => {
            update.location = "archive".into();
            extra.push("to-delete".to_string());
        }
        Action::NeedsReview => extra.push("needs-review".to_string()),
    }
    if let Some(priority) = entry.priority {
        extra.push(format!("priority-{}", priority));
    }

    update.tags = dedupe_tags(item.tags.iter().chain(&entry.tags).chain(&extra));

    if with_notes {
        if let Some(reason) = entry.reason() {
            update.notes = reason.to_string();
        }
    }
    update
}

/// 判定済みアイテムの更新内容を作る（未判定は含めない）
pub fn build_updates(items: &[Item], store: &TriageStore, with_notes: bool) -> Vec<DocumentUpdate> {
    items
        .iter()
        .filter_map(|item| {
            store
                .get_item(&item.id)
                .map(|entry| decision_to_update(item, entry, with_notes))
        })
        .filter(|update| !update.is_noop())
        .collect()
}

/// 一括更新をバックグラウンドで実行し、進捗の受信側を返す
///
/// 受信側は更新が全件終わると閉じる。
pub fn spawn_batch_update(
    client: ReaderClient,
    updates: Vec<DocumentUpdate>,
) -> (JoinHandle<BatchUpdateResult>, mpsc::Receiver<UpdateProgress>) {
    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    let handle = tokio::spawn(async move { client.batch_update(&updates, Some(tx)).await });
    (handle, rx)
}
