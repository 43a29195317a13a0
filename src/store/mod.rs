//! トリアージ結果ストア
//!
//! アイテムIDをキーに判定を1ファイル（JSON）へ保存する。
//! 保存は同じディレクトリの一時ファイル経由で置き換えるため、
//! 書き込み途中で落ちても前回の内容が残る。

mod legacy;

use crate::error::{Result, TriageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use triage_common::normalize::dedupe_tags;
use triage_common::types::priority_field;
use triage_common::{Action, Priority, TriageSource};

/// 現行のストアフォーマット
pub const STORE_VERSION: u32 = 2;

pub const STORE_FILE_NAME: &str = "triage.json";

/// 1アイテム分の判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageStoreEntry {
    pub action: Action,

    #[serde(default, with = "priority_field")]
    pub priority: Option<Priority>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// 書き込んだ時刻
    pub triaged_at: DateTime<Utc>,

    #[serde(default)]
    pub source: TriageSource,

    /// 判定結果全体（LLM/インポート時のみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Value>,
}

impl TriageStoreEntry {
    /// レポートに含まれる判定理由
    pub fn reason(&self) -> Option<&str> {
        self.report
            .as_ref()?
            .pointer("/triage_decision/reason")?
            .as_str()
            .filter(|r| !r.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct StoreFile {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    items: BTreeMap<String, TriageStoreEntry>,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    updated_at: &'a DateTime<Utc>,
    items: &'a BTreeMap<String, TriageStoreEntry>,
}

/// ローカルのトリアージストア
///
/// 単一プロセス・単一ライター前提。`BTreeMap` で保持するので
/// ファイル上のキー順は常にソート済みになる。
#[derive(Debug)]
pub struct TriageStore {
    path: PathBuf,
    updated_at: DateTime<Utc>,
    items: BTreeMap<String, TriageStoreEntry>,
    dirty: bool,
}

impl TriageStore {
    /// ストアを開く
    ///
    /// - ファイルなし: 空のストア（最初の保存で作成）
    /// - 現行バージョン: そのまま読む。壊れていればエラー
    /// - 旧フォーマット: 元ファイルを `.bak` に複製してから変換結果で置き換える
    /// - 未知の新しいバージョン: エラー
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "store file not found, starting empty");
            return Ok(Self::empty(path));
        }

        let content = std::fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&content).map_err(|source| {
            TriageError::StoreCorrupt {
                path: path.clone(),
                source,
            }
        })?;

        let version = match value.get("version") {
            None => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| TriageError::StoreCorrupt {
                path: path.clone(),
                source: <serde_json::Error as serde::de::Error>::custom(
                    "version must be an integer",
                ),
            })?),
        };

        match version {
            None => Self::migrate(path, value),
            Some(n) if n <= legacy::LEGACY_VERSION => Self::migrate(path, value),
            Some(n) if n == u64::from(STORE_VERSION) => {
                let file: StoreFile = serde_json::from_value(value).map_err(|source| {
                    TriageError::StoreCorrupt {
                        path: path.clone(),
                        source,
                    }
                })?;
                debug!(path = %path.display(), items = file.items.len(), "store loaded");
                Ok(Self {
                    path,
                    updated_at: file.updated_at,
                    items: file.items,
                    dirty: false,
                })
            }
            Some(n) => Err(TriageError::UnsupportedStoreVersion {
                found: n,
                supported: STORE_VERSION,
            }),
        }
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            updated_at: Utc::now(),
            items: BTreeMap::new(),
            dirty: false,
        }
    }

    fn migrate(path: PathBuf, value: Value) -> Result<Self> {
        let converted = legacy::convert(value, Utc::now()).map_err(|source| {
            TriageError::StoreCorrupt {
                path: path.clone(),
                source,
            }
        })?;

        let mut store = Self {
            path,
            updated_at: converted.updated_at,
            items: converted.items,
            dirty: true,
        };

        // 新しい内容が置き換わるまで旧ファイルはパスに残す
        let tmp = store.write_temp()?;
        legacy::backup(&store.path)?;
        tmp.persist(&store.path).map_err(|e| TriageError::Io(e.error))?;

        info!(
            path = %store.path.display(),
            items = store.items.len(),
            "legacy store migrated"
        );
        store.dirty = false;
        Ok(store)
    }

    /// 判定を書き込む（同じIDは丸ごと置き換え）
    pub fn set_item(
        &mut self,
        id: &str,
        action: Action,
        priority: Option<Priority>,
        source: TriageSource,
        tags: Vec<String>,
        report: Option<Value>,
    ) {
        let now = Utc::now();
        self.items.insert(
            id.to_string(),
            TriageStoreEntry {
                action,
                priority,
                tags: dedupe_tags(tags),
                triaged_at: now,
                source,
                report,
            },
        );
        self.updated_at = now;
        self.dirty = true;
    }

    pub fn has_triaged(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn get_item(&self, id: &str) -> Option<&TriageStoreEntry> {
        self.items.get(id)
    }

    /// 未判定のIDを入力順のまま返す
    pub fn get_untriaged_ids<I, S>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .filter(|id| !self.has_triaged(id.as_ref()))
            .map(|id| id.as_ref().to_string())
            .collect()
    }

    /// アクション別の件数
    pub fn count_by_action(&self, action: Action) -> usize {
        self.items.values().filter(|e| e.action == action).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TriageStoreEntry)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// ファイルに書き出す内容
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&StoreFileRef {
            version: STORE_VERSION,
            updated_at: &self.updated_at,
            items: &self.items,
        })?;
        json.push('\n');
        Ok(json)
    }

    /// 変更があれば保存する
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty && self.path.exists() {
            return Ok(());
        }

        let tmp = self.write_temp()?;
        tmp.persist(&self.path).map_err(|e| TriageError::Io(e.error))?;
        self.dirty = false;

        debug!(path = %self.path.display(), items = self.items.len(), "store saved");
        Ok(())
    }

    /// 保存して閉じる
    pub fn close(mut self) -> Result<()> {
        self.save()
    }

    fn write_temp(&self) -> Result<NamedTempFile> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(self.to_pretty_json()?.as_bytes())?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}

/// 既定のストアパス（`~/.config/inbox-triage/triage.json`）
pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::app_dir()?.join(STORE_FILE_NAME))
}
