//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON配列が見つかりません (先頭500文字: {preview})")]
    NoJsonArray { preview: String },

    #[error("結果[{index}]: {field} がありません")]
    MissingField { index: usize, field: &'static str },

    #[error("結果[{index}]: {field} の値が不正です: {value}")]
    InvalidField {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error = Error::Json(json_error);
        assert!(format!("{}", error).contains("JSON error"));
    }

    #[test]
    fn test_error_display_missing_field() {
        let error = Error::MissingField { index: 2, field: "title" };
        assert_eq!(format!("{}", error), "結果[2]: title がありません");
    }

    #[test]
    fn test_error_display_no_array_includes_preview() {
        let error = Error::NoJsonArray { preview: "hello".to_string() };
        assert!(format!("{}", error).contains("hello"));
    }

    #[test]
    fn test_error_from_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }
}
