use serde::{Deserialize, Serialize};
use triage_common::Item;

/// 一覧APIの1ページ
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next_page_cursor: Option<String>,
    #[serde(default)]
    pub results: Vec<Item>,
}

impl ListResponse {
    /// 次ページのカーソル（空文字は終端扱い）
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_page_cursor
            .as_deref()
            .map(str::trim)
            .filter(|cursor| !cursor.is_empty())
    }
}

/// ドキュメント更新内容
///
/// `id` はURLパスに入るのでボディには含めない。空のフィールドも送らない。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentUpdate {
    #[serde(skip)]
    pub id: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl DocumentUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// 送る内容がない
    pub fn is_noop(&self) -> bool {
        self.location.is_empty() && self.tags.is_empty() && self.notes.is_empty()
    }
}

/// 1件の更新が終わるごとに送る進捗
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateProgress {
    /// 何件目か（1始まり）
    pub current: usize,
    pub total: usize,
    pub id: String,
    pub success: bool,
}

/// 失敗した更新
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFailure {
    pub id: String,
    pub error: String,
}

/// 一括更新の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpdateResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<UpdateFailure>,
}
