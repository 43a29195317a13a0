use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("{0} が設定されていません。`inbox-triage config` または環境変数で設定してください")]
    MissingCredential(&'static str),

    #[error("HTTP通信エラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("リトライ上限({attempts}回)に達しました: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<TriageError>,
    },

    #[error("APIエラー: {0}")]
    Api(String),

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("トリアージ結果の解析に失敗: {0}")]
    Triage(#[from] triage_common::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("ストアファイルが破損しています ({path}): {source}")]
    StoreCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("未対応のストアバージョン {found} (対応: {supported})")]
    UnsupportedStoreVersion { found: u64, supported: u32 },

    #[error("CLI実行エラー: {0}")]
    CliExecution(String),
}

impl TriageError {
    /// 同じリクエストを再送すれば成功しうるか
    pub fn is_retryable(&self) -> bool {
        match self {
            TriageError::Http(_) => true,
            TriageError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }

    /// HTTPステータスを持つエラーならそのステータス
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TriageError::Status { status, .. } => Some(*status),
            TriageError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
