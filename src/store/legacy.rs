//! 旧フォーマットのストア読み込み
//!
//! 旧フォーマット: `version` なし、または `1`。
//! `{version?, updated_at?, items: {...}}` か、`{id: entry}` の素のマップ。
//! エントリに `report` はなく、`source` は省略または `"ai"` のことがある。

use super::TriageStoreEntry;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use triage_common::normalize::{
    deserialize_date, deserialize_tags, null_as_default, parse_date_value,
};
use triage_common::types::priority_field;
use triage_common::{Action, Priority, TriageSource};

pub(super) const LEGACY_VERSION: u64 = 1;

#[derive(Deserialize)]
struct LegacyEntry {
    action: Action,
    #[serde(default, with = "priority_field")]
    priority: Option<Priority>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_date")]
    triaged_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    source: TriageSource,
}

#[derive(Deserialize)]
struct WrappedStore {
    #[serde(default, deserialize_with = "deserialize_date")]
    updated_at: Option<DateTime<Utc>>,
    items: BTreeMap<String, LegacyEntry>,
}

pub(super) struct Converted {
    pub updated_at: DateTime<Utc>,
    pub items: BTreeMap<String, TriageStoreEntry>,
}

/// 旧フォーマットを現行のエントリに変換
///
/// `triaged_at` がなければ旧ファイルの `updated_at`、それもなければ `now`。
pub(super) fn convert(value: Value, now: DateTime<Utc>) -> serde_json::Result<Converted> {
    let wrapped = value
        .get("items")
        .map(Value::is_object)
        .unwrap_or(false);

    let (updated_at, items) = if wrapped {
        let store: WrappedStore = serde_json::from_value(value)?;
        (store.updated_at, store.items)
    } else {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                    "expected object, found {}",
                    other
                )))
            }
        };
        map.remove("version");
        let updated_at = map
            .remove("updated_at")
            .as_ref()
            .and_then(parse_date_value);
        let items: BTreeMap<String, LegacyEntry> = serde_json::from_value(Value::Object(map))?;
        (updated_at, items)
    };

    let fallback = updated_at.unwrap_or(now);
    let items = items
        .into_iter()
        .map(|(id, entry)| {
            (
                id,
                TriageStoreEntry {
                    action: entry.action,
                    priority: entry.priority,
                    tags: entry.tags,
                    triaged_at: entry.triaged_at.unwrap_or(fallback),
                    source: entry.source,
                    report: None,
                },
            )
        })
        .collect();

    Ok(Converted {
        updated_at: fallback,
        items,
    })
}

/// `<file>.bak` のパス
pub(super) fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// 旧ファイルを `.bak` に複製して退避
///
/// 元のファイルは残すので、置き換えが終わるまでパスから消えることはない。
/// 既に消えていた場合（他プロセスとの競合）は警告のみ。
pub(super) fn backup(path: &Path) -> Result<()> {
    let bak = backup_path(path);
    match std::fs::copy(path, &bak) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "legacy store vanished before backup");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_wrapped_legacy_store() {
        let value = json!({
            "version": 1,
            "updated_at": "2024-05-01T10:00:00Z",
            "items": {
                "a": {"action": "later", "priority": "low", "tags": ["x"], "source": "ai"},
                "b": {"action": "archive", "triaged_at": "2024-04-01 09:00:00"}
            }
        });
        let converted = convert(value, now()).unwrap();

        let a = &converted.items["a"];
        assert_eq!(a.source, TriageSource::Llm);
        assert_eq!(a.priority, Some(Priority::Low));
        assert_eq!(a.triaged_at, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());

        let b = &converted.items["b"];
        assert_eq!(b.source, TriageSource::Manual);
        assert_eq!(b.triaged_at, Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_bare_map_legacy_store() {
        let value = json!({
            "a": {"action": "read_now", "priority": "", "tags": null},
            "b": {"action": "needs_review"}
        });
        let converted = convert(value, now()).unwrap();
        assert_eq!(converted.items.len(), 2);
        assert_eq!(converted.items["a"].priority, None);
        assert!(converted.items["a"].tags.is_empty());
        assert_eq!(converted.items["b"].triaged_at, now());
        assert_eq!(converted.updated_at, now());
    }

    #[test]
    fn test_unknown_action_fails() {
        let value = json!({"items": {"a": {"action": "burn"}}});
        assert!(convert(value, now()).is_err());
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/tmp/triage.json")),
            PathBuf::from("/tmp/triage.json.bak")
        );
    }

    #[test]
    fn test_backup_keeps_original_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.json");
        std::fs::write(&path, r#"{"version":1,"items":{}}"#).unwrap();

        backup(&path).unwrap();

        assert!(path.exists());
        assert_eq!(
            std::fs::read_to_string(backup_path(&path)).unwrap(),
            r#"{"version":1,"items":{}}"#
        );
    }

    #[test]
    fn test_backup_missing_file_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.json");
        backup(&path).unwrap();
        assert!(!backup_path(&path).exists());
    }
}
