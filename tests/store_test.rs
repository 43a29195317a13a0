//! トリアージストアのテスト
//!
//! 保存・再読み込み・旧フォーマット移行・破損ファイルの扱いを検証

use inbox_triage::error::TriageError;
use inbox_triage::store::{TriageStore, STORE_FILE_NAME, STORE_VERSION};
use serde_json::{json, Value};
use tempfile::tempdir;
use triage_common::{Action, Priority, TriageSource};

fn bak_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".bak"))
        .collect()
}

/// ファイルがなければ空のストア
#[test]
fn test_missing_file_is_empty_store() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(STORE_FILE_NAME);

    let store = TriageStore::load(&path).expect("load");
    assert!(store.is_empty());
    assert!(!path.exists());
}

/// 書き込み → 保存 → 再読み込み
#[test]
fn test_set_save_and_reload() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join(STORE_FILE_NAME);

    let mut store = TriageStore::load(&path).expect("load");
    store.set_item(
        "doc-1",
        Action::ReadNow,
        Some(Priority::High),
        TriageSource::Manual,
        vec!["rust".into()],
        None,
    );
    store.save().expect("save");

    let loaded = TriageStore::load(&path).expect("reload");
    let entry = loaded.get_item("doc-1").expect("entry");
    assert_eq!(entry.action, Action::ReadNow);
    assert_eq!(entry.priority, Some(Priority::High));
    assert_eq!(entry.tags, vec!["rust"]);
    assert_eq!(entry.source, TriageSource::Manual);
    assert!(entry.report.is_none());

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["version"], json!(STORE_VERSION));
}

/// 同じIDへの書き込みは丸ごと置き換え
#[test]
fn test_upsert_replaces_entry() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = TriageStore::load(dir.path().join(STORE_FILE_NAME)).expect("load");

    store.set_item(
        "doc-1",
        Action::Later,
        Some(Priority::Low),
        TriageSource::Llm,
        vec!["a".into()],
        Some(json!({"id": "doc-1"})),
    );
    store.set_item("doc-1", Action::Archive, None, TriageSource::Manual, vec![], None);

    let entry = store.get_item("doc-1").expect("entry");
    assert_eq!(entry.action, Action::Archive);
    assert_eq!(entry.priority, None);
    assert!(entry.tags.is_empty());
    assert!(entry.report.is_none());
    assert_eq!(store.len(), 1);
}

/// 未判定IDは入力順のまま返る
#[test]
fn test_untriaged_ids_keep_order() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = TriageStore::load(dir.path().join(STORE_FILE_NAME)).expect("load");
    store.set_item("b", Action::Later, None, TriageSource::Manual, vec![], None);

    let ids = store.get_untriaged_ids(["c", "b", "a", "d"]);
    assert_eq!(ids, vec!["c", "a", "d"]);
    assert!(store.has_triaged("b"));
    assert!(!store.has_triaged("a"));
}

/// 変更なしで読み書きしても内容は変わらない
#[test]
fn test_load_save_roundtrip_is_identical() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(STORE_FILE_NAME);

    let mut store = TriageStore::load(&path).expect("load");
    store.set_item("z", Action::Delete, None, TriageSource::Llm, vec![], Some(json!({"x": 1})));
    store.set_item("a", Action::ReadNow, Some(Priority::Medium), TriageSource::Manual, vec![], None);
    store.close().expect("close");

    let before = std::fs::read_to_string(&path).unwrap();

    let mut reloaded = TriageStore::load(&path).expect("reload");
    assert_eq!(reloaded.to_pretty_json().unwrap(), before);
    reloaded.save().expect("save");
    reloaded.save().expect("save twice");

    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

/// キーはソート済みで書き出される
#[test]
fn test_keys_are_sorted() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = TriageStore::load(dir.path().join(STORE_FILE_NAME)).expect("load");
    for id in ["c", "a", "b"] {
        store.set_item(id, Action::Later, None, TriageSource::Manual, vec![], None);
    }

    let json = store.to_pretty_json().unwrap();
    let a = json.find("\"a\"").unwrap();
    let b = json.find("\"b\"").unwrap();
    let c = json.find("\"c\"").unwrap();
    assert!(a < b && b < c);
}

/// 旧フォーマットは一度だけ移行され、元ファイルは .bak に残る
#[test]
fn test_legacy_store_is_migrated_once() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(STORE_FILE_NAME);
    let legacy = json!({
        "version": 1,
        "updated_at": "2024-05-01T10:00:00Z",
        "items": {
            "doc-1": {"action": "later", "priority": "high", "tags": ["x"], "source": "ai"},
            "doc-2": {"action": "archive", "triaged_at": "2024-04-01"}
        }
    });
    std::fs::write(&path, serde_json::to_string_pretty(&legacy).unwrap()).unwrap();

    let store = TriageStore::load(&path).expect("migrate");
    assert_eq!(store.len(), 2);
    assert_eq!(store.get_item("doc-1").unwrap().source, TriageSource::Llm);
    assert_eq!(store.get_item("doc-2").unwrap().action, Action::Archive);
    drop(store);

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["version"], json!(STORE_VERSION));
    assert_eq!(raw["items"]["doc-1"]["source"], json!("llm"));

    let bak = dir.path().join(format!("{}.bak", STORE_FILE_NAME));
    let bak_content: Value = serde_json::from_str(&std::fs::read_to_string(&bak).unwrap()).unwrap();
    assert_eq!(bak_content, legacy);

    // 2回目は移行しない
    let again = TriageStore::load(&path).expect("reload");
    assert_eq!(again.len(), 2);
    assert_eq!(bak_files(dir.path()).len(), 1);
}

/// 退避後に置き換えが終わらなかった場合も、旧ファイルから移行し直せる
#[test]
fn test_interrupted_migration_is_recovered() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(STORE_FILE_NAME);
    let legacy = json!({
        "version": 1,
        "items": {"doc-1": {"action": "read_now", "priority": "high"}}
    });
    let raw = serde_json::to_string_pretty(&legacy).unwrap();
    // 複製だけ済んで旧ファイルがまだパスにある状態
    std::fs::write(&path, &raw).unwrap();
    std::fs::write(dir.path().join(format!("{}.bak", STORE_FILE_NAME)), &raw).unwrap();

    let store = TriageStore::load(&path).expect("migrate");
    assert_eq!(store.len(), 1);
    assert_eq!(store.get_item("doc-1").unwrap().action, Action::ReadNow);
    assert_eq!(store.get_item("doc-1").unwrap().priority, Some(Priority::High));

    let bak = dir.path().join(format!("{}.bak", STORE_FILE_NAME));
    let bak_content: Value = serde_json::from_str(&std::fs::read_to_string(&bak).unwrap()).unwrap();
    assert_eq!(bak_content, legacy);
    assert_eq!(bak_files(dir.path()).len(), 1);
}

/// バージョンなしの素のマップも旧フォーマットとして読む
#[test]
fn test_bare_legacy_map() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(STORE_FILE_NAME);
    std::fs::write(&path, r#"{"doc-9": {"action": "read_now", "priority": ""}}"#).unwrap();

    let store = TriageStore::load(&path).expect("migrate");
    let entry = store.get_item("doc-9").expect("entry");
    assert_eq!(entry.action, Action::ReadNow);
    assert_eq!(entry.priority, None);
    assert_eq!(entry.source, TriageSource::Manual);
}

/// 壊れたファイルはエラーにし、上書きしない
#[test]
fn test_corrupt_store_is_error() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(STORE_FILE_NAME);
    std::fs::write(&path, "{ not json").unwrap();

    let err = TriageStore::load(&path).unwrap_err();
    assert!(matches!(err, TriageError::StoreCorrupt { .. }));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

/// 現行バージョンでも中身が不正ならエラー
#[test]
fn test_current_version_with_bad_entry_is_error() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(STORE_FILE_NAME);
    std::fs::write(
        &path,
        r#"{"version": 2, "updated_at": "2024-01-01T00:00:00Z", "items": {"a": {"action": "nope"}}}"#,
    )
    .unwrap();

    assert!(matches!(
        TriageStore::load(&path),
        Err(TriageError::StoreCorrupt { .. })
    ));
    assert!(bak_files(dir.path()).is_empty());
}
