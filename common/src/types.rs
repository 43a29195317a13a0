//! トリアージの型定義
//!
//! CLIとストアで共有される型:
//! - Item: 既読管理サービスから取得したドキュメント
//! - TriageDecision: アクション/優先度/理由
//! - TriageResult: LLMまたはインポートで得た1件分の判定結果

use crate::normalize::{deserialize_date, deserialize_tags, null_as_default};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 1分あたりの読了語数（読了時間の推定用）
const WORDS_PER_MINUTE: u64 = 200;

/// ドキュメントの種類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Article,
    Email,
    Rss,
    Highlight,
    Note,
    Pdf,
    Epub,
    Tweet,
    Video,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Article => "article",
            Category::Email => "email",
            Category::Rss => "rss",
            Category::Highlight => "highlight",
            Category::Note => "note",
            Category::Pdf => "pdf",
            Category::Epub => "epub",
            Category::Tweet => "tweet",
            Category::Video => "video",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 既読管理サービスのドキュメント
///
/// `id` は不変で、トリアージストアとの結合キー。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Item {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    /// 元記事のURL
    #[serde(default, rename = "source_url", deserialize_with = "null_as_default")]
    pub url: String,

    /// リーダー上のURL
    #[serde(default, rename = "url", deserialize_with = "null_as_default")]
    pub reader_url: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub category: Category,

    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub site_name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub word_count: u64,

    /// "5 min" 等の自由記述
    #[serde(default, deserialize_with = "null_as_default")]
    pub reading_time: String,

    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,

    #[serde(default, deserialize_with = "deserialize_date")]
    pub saved_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "deserialize_date")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "deserialize_date")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "deserialize_date")]
    pub published_date: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub reading_progress: f64,
}

impl Item {
    /// 読了時間の表示用文字列（未設定なら語数から推定）
    pub fn reading_time_label(&self) -> String {
        if !self.reading_time.trim().is_empty() {
            return self.reading_time.clone();
        }
        if self.word_count == 0 {
            return String::new();
        }
        let minutes = self.word_count.div_ceil(WORDS_PER_MINUTE).max(1);
        format!("{} min", minutes)
    }

    /// 読書進捗（0.0〜1.0に丸める）
    pub fn progress(&self) -> f64 {
        if self.reading_progress.is_nan() {
            0.0
        } else {
            self.reading_progress.clamp(0.0, 1.0)
        }
    }
}

/// トリアージのアクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ReadNow,
    Later,
    Archive,
    Delete,
    NeedsReview,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::ReadNow,
        Action::Later,
        Action::Archive,
        Action::Delete,
        Action::NeedsReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ReadNow => "read_now",
            Action::Later => "later",
            Action::Archive => "archive",
            Action::Delete => "delete",
            Action::NeedsReview => "needs_review",
        }
    }

    /// 対話入力用の表示名
    pub fn label(&self) -> &'static str {
        match self {
            Action::ReadNow => "今すぐ読む (read_now)",
            Action::Later => "あとで読む (later)",
            Action::Archive => "アーカイブ (archive)",
            Action::Delete => "削除候補 (delete)",
            Action::NeedsReview => "要確認 (needs_review)",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "read_now" => Ok(Action::ReadNow),
            "later" => Ok(Action::Later),
            "archive" => Ok(Action::Archive),
            "delete" => Ok(Action::Delete),
            "needs_review" => Ok(Action::NeedsReview),
            _ => Err(format!(
                "Unknown action: {}. Use read_now, later, archive, delete, or needs_review",
                s
            )),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 優先度（未設定は `Option::None` で表す）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            _ => Err(format!("Unknown priority: {}. Use high, medium, or low", s)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Option<Priority>` を空文字/値の文字列で読み書きする
pub mod priority_field {
    use super::Priority;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Priority>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_ref().map(Priority::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

/// 判定の出どころ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageSource {
    #[default]
    Manual,
    #[serde(alias = "ai")]
    Llm,
}

impl fmt::Display for TriageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriageSource::Manual => f.write_str("manual"),
            TriageSource::Llm => f.write_str("llm"),
        }
    }
}

/// 1件分のトリアージ判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageDecision {
    pub action: Action,

    #[serde(default, with = "priority_field")]
    pub priority: Option<Priority>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// 判定結果（LLM出力・インポートの1要素）
///
/// フルプロンプト時の追加情報（topics, suggested_tags, credibility,
/// reading_guidance 等）は `enrichment` にそのまま保持する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub id: String,
    pub title: String,
    pub triage_decision: TriageDecision,

    #[serde(flatten)]
    pub enrichment: Map<String, Value>,
}

impl TriageResult {
    /// LLMが提案したタグ
    pub fn suggested_tags(&self) -> Vec<String> {
        self.enrichment
            .get("suggested_tags")
            .map(crate::normalize::tags_from_value)
            .unwrap_or_default()
    }

    /// ストア保存用のレポート（結果全体）
    pub fn to_report(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_from_api_json() {
        let value = json!({
            "id": "01abc",
            "url": "https://read.readwise.io/read/01abc",
            "source_url": "https://example.com/post",
            "title": "Example",
            "author": null,
            "category": "article",
            "location": "new",
            "tags": {"rust": {"name": "rust"}},
            "site_name": "Example",
            "word_count": 1000,
            "summary": null,
            "saved_at": "2024-03-05T10:30:00.123456+00:00",
            "created_at": "2024-03-05T10:30:00Z",
            "updated_at": "not a date",
            "published_date": 1709634600000_i64,
            "reading_progress": 0.25
        });

        let item: Item = serde_json::from_value(value).unwrap();
        assert_eq!(item.id, "01abc");
        assert_eq!(item.url, "https://example.com/post");
        assert_eq!(item.reader_url, "https://read.readwise.io/read/01abc");
        assert_eq!(item.category, Category::Article);
        assert_eq!(item.author, "");
        assert_eq!(item.summary, "");
        assert_eq!(item.tags, vec!["rust"]);
        assert!(item.saved_at.is_some());
        assert!(item.created_at.is_some());
        assert!(item.updated_at.is_none());
        assert!(item.published_date.is_some());
        assert_eq!(item.reading_time_label(), "5 min");
    }

    #[test]
    fn test_item_unknown_category_and_missing_fields() {
        let item: Item = serde_json::from_value(json!({"id": "x", "category": "podcast"})).unwrap();
        assert_eq!(item.category, Category::Unknown);
        assert!(item.tags.is_empty());
        assert_eq!(item.reading_time_label(), "");
    }

    #[test]
    fn test_progress_is_clamped() {
        let item = Item { reading_progress: 1.7, ..Default::default() };
        assert_eq!(item.progress(), 1.0);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("read_now".parse::<Action>().unwrap(), Action::ReadNow);
        assert_eq!("Needs-Review".parse::<Action>().unwrap(), Action::NeedsReview);
        assert!("skim".parse::<Action>().is_err());
    }

    #[test]
    fn test_decision_priority_empty_string() {
        let decision: TriageDecision =
            serde_json::from_value(json!({"action": "later", "priority": ""})).unwrap();
        assert_eq!(decision.priority, None);

        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["priority"], "");
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn test_result_keeps_enrichment() {
        let result: TriageResult = serde_json::from_value(json!({
            "id": "1",
            "title": "T",
            "triage_decision": {"action": "read_now", "priority": "high", "reason": "r"},
            "topics": ["rust"],
            "suggested_tags": ["systems", "rust"]
        }))
        .unwrap();

        assert_eq!(result.suggested_tags(), vec!["systems", "rust"]);
        let report = result.to_report();
        assert_eq!(report["topics"][0], "rust");
        assert_eq!(report["triage_decision"]["priority"], "high");
    }
}
