//! 対話式の手動トリアージ
//!
//! 未判定のアイテムを1件ずつ表示し、アクション・優先度・タグを選ばせる。
//! 1件決めるごとにストアを保存するので、途中で終了しても判定は残る。

use crate::error::{Result, TriageError};
use crate::store::TriageStore;
use dialoguer::{Input, Select};
use triage_common::normalize::dedupe_tags;
use triage_common::{Action, Item, Priority, TriageSource};

const SUMMARY_PREVIEW_CHARS: usize = 200;

/// 1件ごとの選択
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualChoice {
    Decide(Action),
    /// この記事を飛ばす
    Skip,
    /// 保存して終了
    Quit,
}

/// 選択肢の表示名（`choice_from_index` と同じ並び）
pub fn choice_labels() -> Vec<&'static str> {
    Action::ALL
        .iter()
        .map(Action::label)
        .chain(["スキップ", "保存して終了"])
        .collect()
}

pub fn choice_from_index(index: usize) -> ManualChoice {
    match Action::ALL.get(index) {
        Some(action) => ManualChoice::Decide(*action),
        None if index == Action::ALL.len() => ManualChoice::Skip,
        None => ManualChoice::Quit,
    }
}

/// 優先度の選択肢（先頭は「なし」）
pub fn priority_from_index(index: usize) -> Option<Priority> {
    index.checked_sub(1).and_then(|i| Priority::ALL.get(i).copied())
}

/// カンマ区切りのタグ入力を分解
pub fn parse_tag_input(input: &str) -> Vec<String> {
    dedupe_tags(input.split(','))
}

/// 手動トリアージの集計
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ManualSummary {
    pub decided: usize,
    pub skipped: usize,
    /// 途中で終了したか
    pub quit: bool,
}

/// 対話式で判定を入力
pub fn run_manual_triage(store: &mut TriageStore, items: &[Item]) -> Result<ManualSummary> {
    let mut summary = ManualSummary::default();

    if items.is_empty() {
        println!("✓ 未判定の記事はありません");
        return Ok(summary);
    }

    println!("📥 未判定の記事: {}件", items.len());
    println!("---\n");

    let labels = choice_labels();
    for (count, item) in items.iter().enumerate() {
        print_item(count + 1, items.len(), item);

        let index = Select::new()
            .with_prompt("アクション")
            .items(&labels)
            .default(0)
            .interact()
            .map_err(cli_error)?;

        let action = match choice_from_index(index) {
            ManualChoice::Decide(action) => action,
            ManualChoice::Skip => {
                println!("  → スキップ\n");
                summary.skipped += 1;
                continue;
            }
            ManualChoice::Quit => {
                println!("保存して終了します...");
                summary.quit = true;
                break;
            }
        };

        let priority = prompt_priority()?;
        let tags = prompt_tags(&item.tags)?;

        store.set_item(&item.id, action, priority, TriageSource::Manual, tags, None);
        store.save()?;
        summary.decided += 1;

        match priority {
            Some(p) => println!("  → {} / {}\n", action, p),
            None => println!("  → {}\n", action),
        }
    }

    Ok(summary)
}

fn print_item(position: usize, total: usize, item: &Item) {
    let site = if item.site_name.is_empty() {
        item.category.to_string()
    } else {
        item.site_name.clone()
    };
    println!("[{}/{}] {} ({})", position, total, item.title, site);
    if !item.url.is_empty() {
        println!("  {}", item.url);
    }
    let reading_time = item.reading_time_label();
    if !reading_time.is_empty() {
        println!("  読了目安: {}", reading_time);
    }
    if !item.tags.is_empty() {
        println!("  タグ: {}", item.tags.join(", "));
    }
    if !item.summary.is_empty() {
        let preview: String = item.summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
        println!("  {}", preview);
    }
}

fn prompt_priority() -> Result<Option<Priority>> {
    let labels: Vec<&str> = std::iter::once("なし")
        .chain(Priority::ALL.iter().map(Priority::as_str))
        .collect();

    let index = Select::new()
        .with_prompt("優先度")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(cli_error)?;
    Ok(priority_from_index(index))
}

fn prompt_tags(existing: &[String]) -> Result<Vec<String>> {
    let input: String = Input::new()
        .with_prompt("追加タグ（カンマ区切り、空でなし）")
        .allow_empty(true)
        .interact_text()
        .map_err(cli_error)?;

    let tags = parse_tag_input(&input);
    Ok(tags.into_iter().filter(|t| !existing.contains(t)).collect())
}

fn cli_error(e: dialoguer::Error) -> TriageError {
    TriageError::CliExecution(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_labels_match_indices() {
        let labels = choice_labels();
        assert_eq!(labels.len(), Action::ALL.len() + 2);
        assert_eq!(choice_from_index(0), ManualChoice::Decide(Action::ReadNow));
        assert_eq!(choice_from_index(4), ManualChoice::Decide(Action::NeedsReview));
        assert_eq!(choice_from_index(5), ManualChoice::Skip);
        assert_eq!(choice_from_index(6), ManualChoice::Quit);
    }

    #[test]
    fn test_priority_from_index() {
        assert_eq!(priority_from_index(0), None);
        assert_eq!(priority_from_index(1), Some(Priority::High));
        assert_eq!(priority_from_index(3), Some(Priority::Low));
        assert_eq!(priority_from_index(9), None);
    }

    #[test]
    fn test_parse_tag_input() {
        assert_eq!(
            parse_tag_input(" rust, machine learning ,,rust"),
            vec!["rust", "machine learning"]
        );
        assert!(parse_tag_input("   ").is_empty());
    }
}
