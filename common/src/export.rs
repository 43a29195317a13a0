//! LLM向けアイテムJSONの生成
//!
//! プロンプト埋め込みと手動エクスポートの両方で同じ形を使う。

use crate::error::Result;
use crate::types::{Category, Item};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// LLMに渡すアイテムの要約
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub url: String,
    pub category: Category,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub site_name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub author: String,
    pub word_count: u64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub reading_time: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl From<&Item> for ExportItem {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            category: item.category,
            site_name: item.site_name.clone(),
            author: item.author.clone(),
            word_count: item.word_count,
            reading_time: item.reading_time_label(),
            summary: item.summary.clone(),
            tags: item.tags.clone(),
            saved_at: item.saved_at,
        }
    }
}

/// アイテム一覧をJSON配列（整形済み）にする
pub fn items_json(items: &[Item]) -> Result<String> {
    let export: Vec<ExportItem> = items.iter().map(ExportItem::from).collect();
    Ok(serde_json::to_string_pretty(&export)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_json_shape() {
        let items = vec![Item {
            id: "1".into(),
            title: "Title".into(),
            word_count: 450,
            ..Default::default()
        }];

        let json = items_json(&items).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["id"], "1");
        assert_eq!(value[0]["reading_time"], "3 min");
        assert!(value[0].get("summary").is_none());
        assert!(value[0].get("saved_at").is_none());
    }

    #[test]
    fn test_items_json_empty() {
        assert_eq!(items_json(&[]).unwrap(), "[]");
    }
}
