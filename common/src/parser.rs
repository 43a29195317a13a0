//! LLMレスポンスパーサー
//!
//! モデル出力（前置きの説明文、コードブロック、末尾のコメント、末尾カンマ等を含みうる）
//! からトリアージ結果のJSON配列を取り出し、検証する。I/Oは行わない。

use crate::error::{Error, Result};
use crate::types::{Action, Priority, TriageDecision, TriageResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// エラー時に含める入力の先頭文字数
const PREVIEW_CHARS: usize = 500;

lazy_static::lazy_static! {
    // `}` / `]` 直前の末尾カンマ（有無の判定のみ）
    static ref TRAILING_COMMA_RE: Regex = Regex::new(r",(\s*[}\]])").unwrap();
}

/// 寛容モードの解析結果
#[derive(Debug, Clone, Default)]
pub struct LenientParse {
    /// 検証を通過した結果
    pub results: Vec<TriageResult>,
    /// 配列内の要素数
    pub total: usize,
    /// スキップした要素ごとの警告
    pub warnings: Vec<String>,
}

/// レスポンスからトリアージ結果を取り出す（全要素の検証が必要）
///
/// 抽出優先順位:
/// 1. コードブロック（```json / ```）の中身が `[...]` ならそれを検証
/// 2. 生テキスト中の `[` を左から順に走査し、最初に非空配列として読めたもの
/// 3. エラー（入力の先頭500文字を含む）
///
/// # Examples
/// ```
/// use triage_common::parse_triage_response;
///
/// let text = r#"Sure! [{"id":"1","title":"T","triage_decision":{"action":"later"}}]"#;
/// let results = parse_triage_response(text).unwrap();
/// assert_eq!(results[0].id, "1");
/// ```
pub fn parse_triage_response(text: &str) -> Result<Vec<TriageResult>> {
    for block in fenced_blocks(text) {
        if !is_bracketed_array(block) {
            continue;
        }
        if let Some(Value::Array(items)) = parse_json_tolerant(block) {
            if let Ok(results) = validate_all(&items) {
                return Ok(results);
            }
        }
    }

    let items = find_json_array(text).ok_or_else(|| no_array_error(text))?;
    validate_all(&items)
}

/// レスポンスからトリアージ結果を取り出す（不正な要素は警告にしてスキップ）
///
/// インポート用。配列自体が見つからない場合のみエラーを返す。
pub fn parse_triage_response_lenient(text: &str) -> Result<LenientParse> {
    let items = fenced_blocks(text)
        .into_iter()
        .filter(|block| is_bracketed_array(block))
        .find_map(|block| match parse_json_tolerant(block) {
            Some(Value::Array(items)) if !items.is_empty() => Some(items),
            _ => None,
        })
        .or_else(|| find_json_array(text))
        .ok_or_else(|| no_array_error(text))?;

    let mut parsed = LenientParse {
        total: items.len(),
        ..Default::default()
    };
    for (index, item) in items.iter().enumerate() {
        match validate_result(index, item) {
            Ok(result) => parsed.results.push(result),
            Err(e) => parsed.warnings.push(e.to_string()),
        }
    }
    Ok(parsed)
}

/// 生テキストから最初に読める非空JSON配列を探す
///
/// 各 `[` について `[]` と `{}` の深さを数えて対応する `]` を探し、
/// そのまま、または末尾カンマを除去してパースを試みる。
/// 一度の走査で文字列外に現れた `[` の結果は記録し、再走査しない。
pub fn find_json_array(text: &str) -> Option<Vec<Value>> {
    let mut known: HashMap<usize, Option<usize>> = HashMap::new();

    for (start, ch) in text.char_indices() {
        if ch != '[' {
            continue;
        }
        let end = match known.get(&start) {
            Some(end) => *end,
            None => scan_brackets(text, start, &mut known),
        };
        let Some(end) = end else {
            continue;
        };
        if let Some(Value::Array(items)) = parse_json_tolerant(&text[start..=end]) {
            if !items.is_empty() {
                return Some(items);
            }
        }
    }
    None
}

/// `}` / `]` 直前のカンマを除去（文字列リテラル内は変更しない）
pub fn strip_trailing_commas(json: &str) -> String {
    if !TRAILING_COMMA_RE.is_match(json) {
        return json.to_string();
    }

    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in json.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = json[offset + 1..].trim_start().chars().next();
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }

    out
}

/// 入力の先頭を文字境界で切り出す
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// 1要素を検証して `TriageResult` に変換
pub fn validate_result(index: usize, item: &Value) -> Result<TriageResult> {
    let obj = item
        .as_object()
        .ok_or(Error::MissingField { index, field: "id" })?;

    let id = required_str(obj, index, "id")?;
    let title = required_str(obj, index, "title")?;

    let decision = obj
        .get("triage_decision")
        .and_then(Value::as_object)
        .ok_or(Error::MissingField { index, field: "triage_decision.action" })?;

    let action_raw = required_str(decision, index, "triage_decision.action")?;
    let action: Action = action_raw.parse().map_err(|_| Error::InvalidField {
        index,
        field: "triage_decision.action",
        value: action_raw.clone(),
    })?;

    let priority = match decision.get("priority").and_then(Value::as_str).map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<Priority>().map_err(|_| Error::InvalidField {
            index,
            field: "triage_decision.priority",
            value: raw.to_string(),
        })?),
    };

    let reason = decision
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let enrichment: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "id" | "title" | "triage_decision"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(TriageResult {
        id,
        title,
        triage_decision: TriageDecision {
            action,
            priority,
            reason,
        },
        enrichment,
    })
}

fn validate_all(items: &[Value]) -> Result<Vec<TriageResult>> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| validate_result(index, item))
        .collect()
}

fn required_str(obj: &Map<String, Value>, index: usize, field: &'static str) -> Result<String> {
    let key = field.rsplit('.').next().unwrap_or(field);
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::MissingField { index, field }),
    }
}

fn no_array_error(text: &str) -> Error {
    Error::NoJsonArray {
        preview: preview(text),
    }
}

fn is_bracketed_array(block: &str) -> bool {
    block.starts_with('[') && block.ends_with(']')
}

/// そのまま、失敗したら末尾カンマを除去してパース
fn parse_json_tolerant(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate)
        .ok()
        .or_else(|| serde_json::from_str(&strip_trailing_commas(candidate)).ok())
}

/// コードブロックの中身を出現順に返す（言語タグは読み飛ばす）
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // 言語タグ行を飛ばす（同じ行にJSONが続く場合はそこから）
        let body_start = match after_fence.find('\n') {
            Some(nl) if !after_fence[..nl].trim_start().starts_with('[') => nl + 1,
            _ => 0,
        };
        let body = &after_fence[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(body[..close].trim());
        rest = &body[close + 3..];
    }

    blocks
}

/// `start` の `[` に対応する閉じ括弧の位置
///
/// 文字列リテラル内の括弧は数えない。途中で開いた `[` ごとの対応位置も
/// `known` に記録する（内側から走査し直しても括弧列は同じなので結果も一致する）。
/// 閉じずに終わった、または対応が崩れた時点で開いていたものはNone。
fn scan_brackets(
    text: &str,
    start: usize,
    known: &mut HashMap<usize, Option<usize>>,
) -> Option<usize> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        let pos = start + offset;
        match ch {
            '"' => in_string = true,
            '[' | '{' => stack.push((ch, pos)),
            ']' | '}' => {
                let Some((open, open_pos)) = stack.pop() else {
                    break;
                };
                if (open == '[') != (ch == ']') {
                    stack.push((open, open_pos));
                    break;
                }
                if open == '[' {
                    known.insert(open_pos, Some(pos));
                }
                if stack.is_empty() {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }

    for (open, open_pos) in stack {
        if open == '[' {
            known.insert(open_pos, None);
        }
    }
    None
}
