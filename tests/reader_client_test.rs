//! Readerクライアントのテスト
//!
//! トークン確認・ページ送り・ドキュメント更新・一括更新をモックサーバーで検証

use inbox_triage::error::TriageError;
use inbox_triage::http::RetryPolicy;
use inbox_triage::reader::{DocumentUpdate, ReaderClient};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ReaderClient {
    ReaderClient::new("test-token")
        .expect("client")
        .with_base_url(server.uri())
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)))
        .with_pacing(Duration::from_millis(5))
}

// ========================================
// トークン確認
// ========================================

/// 204なら有効
#[tokio::test]
async fn test_verify_token_accepts_204() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/auth/"))
        .and(header("Authorization", "Token test-token"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert!(client(&server).verify_token().await.unwrap());
}

/// 204以外は無効（エラーではない）
#[tokio::test]
async fn test_verify_token_rejects_other_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/auth/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(!client(&server).verify_token().await.unwrap());
}

/// 空のトークンは生成時にエラー
#[test]
fn test_empty_token_is_rejected() {
    assert!(matches!(
        ReaderClient::new("  "),
        Err(TriageError::MissingCredential(_))
    ));
}

// ========================================
// 一覧取得
// ========================================

/// カーソルを辿ってページ順に連結する
#[tokio::test]
async fn test_fetch_follows_page_cursor() {
    let server = MockServer::start().await;

    // カーソル付きのリクエストを先に判定させる
    Mock::given(method("GET"))
        .and(path("/api/v3/list/"))
        .and(query_param("pageCursor", "cursor-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "nextPageCursor": null,
            "results": [{"id": "c", "title": "C"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/list/"))
        .and(query_param("location", "new"))
        .and(header("Authorization", "Token test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "nextPageCursor": "cursor-2",
            "results": [
                {"id": "a", "title": "A", "tags": {"rust": {"name": "rust"}}},
                {"id": "b", "title": null, "word_count": null}
            ]
        })))
        .mount(&server)
        .await;

    let items = client(&server).fetch_inbox_items(0, "").await.expect("fetch");

    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(items[0].tags, vec!["rust"]);
    assert_eq!(items[1].title, "");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0]
        .url
        .query_pairs()
        .any(|(k, v)| k == "updatedAfter" && v.ends_with('Z')));
}

/// 途中のページで失敗したら全体をエラーにする
#[tokio::test]
async fn test_fetch_aborts_on_failed_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/list/"))
        .and(query_param("pageCursor", "cursor-2"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/list/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "nextPageCursor": "cursor-2",
            "results": [{"id": "a"}]
        })))
        .mount(&server)
        .await;

    let err = client(&server).fetch_inbox_items(7, "later").await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::FORBIDDEN));
}

// ========================================
// 更新
// ========================================

/// IDはパスに入り、空のフィールドは送らない
#[tokio::test]
async fn test_update_document_sends_present_fields_only() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v3/update/doc-1/"))
        .and(body_json(json!({"location": "archive", "tags": ["to-delete"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "doc-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut update = DocumentUpdate::new("doc-1");
    update.location = "archive".into();
    update.tags = vec!["to-delete".into()];

    client(&server).update_document(&update).await.expect("update");
}

/// 一括更新は失敗しても最後まで続け、1件ごとに進捗を送る
#[tokio::test]
async fn test_batch_update_reports_partial_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v3/update/ok/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v3/update/missing/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let mut ok = DocumentUpdate::new("ok");
    ok.location = "later".into();
    let mut missing = DocumentUpdate::new("missing");
    missing.location = "archive".into();

    let (tx, mut rx) = mpsc::channel(8);
    let result = client(&server).batch_update(&[ok, missing], Some(tx)).await;

    assert_eq!(result.total, 2);
    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors[0].id, "missing");
    assert!(result.errors[0].error.contains("404"));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].current, events[0].total, events[0].success), (1, 2, true));
    assert_eq!((events[1].current, events[1].id.as_str(), events[1].success), (2, "missing", false));
}

/// 再試行を使い切った更新も失敗として集計し、残りは続ける
#[tokio::test]
async fn test_batch_update_counts_exhausted_retries() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v3/update/ok/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v3/update/flaky/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let mut ok = DocumentUpdate::new("ok");
    ok.location = "later".into();
    let mut flaky = DocumentUpdate::new("flaky");
    flaky.location = "archive".into();

    let (tx, mut rx) = mpsc::channel(8);
    let result = client(&server).batch_update(&[ok, flaky], Some(tx)).await;

    assert_eq!(result.total, 2);
    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].id, "flaky");

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert!(!events[1].success);

    // 成功1回 + 500を3回
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}

/// 更新の間には一定の間隔を空ける
#[tokio::test]
async fn test_batch_update_is_paced() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let pacing = Duration::from_millis(50);
    let updates: Vec<DocumentUpdate> = ["a", "b", "c"]
        .iter()
        .map(|id| {
            let mut update = DocumentUpdate::new(*id);
            update.location = "later".into();
            update
        })
        .collect();

    let started = std::time::Instant::now();
    let result = client(&server)
        .with_pacing(pacing)
        .batch_update(&updates, None)
        .await;

    assert_eq!(result.success, 3);
    assert!(started.elapsed() >= pacing * 2);
}

/// IDはパスセグメントとしてエンコードされる
#[tokio::test]
async fn test_update_document_encodes_id() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v3/update/a%20b%2Fc/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut update = DocumentUpdate::new("a b/c");
    update.location = "archive".into();

    client(&server).update_document(&update).await.expect("update");
}

/// 表現できないほど長い取得期間はリクエスト前に設定エラー
#[tokio::test]
async fn test_fetch_rejects_out_of_range_days() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/list/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 0,
            "nextPageCursor": null,
            "results": []
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_inbox_items(200_000_000, "new")
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Config(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
