//! ワイヤ形式ごとのリクエスト生成・レスポンス抽出
//!
//! 2つの形式の関数を並べて置き、クライアント生成時に `WireCodec` として一度だけ選ぶ。

use super::provider::WireFormat;
use crate::error::{Result, TriageError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 1回の呼び出し内容
#[derive(Debug, Clone, Copy)]
pub struct Prompt<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: &'a str,
    pub user: &'a str,
}

/// 選択済みのワイヤ形式
#[derive(Clone, Copy)]
pub struct WireCodec {
    pub format: WireFormat,
    build: fn(&Prompt<'_>) -> Result<Value>,
    extract: fn(&[u8]) -> Result<String>,
}

impl std::fmt::Debug for WireCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireCodec").field("format", &self.format).finish()
    }
}

impl WireCodec {
    pub fn for_format(format: WireFormat) -> Self {
        match format {
            WireFormat::ChatCompletions => Self {
                format,
                build: build_chat_request,
                extract: extract_chat_content,
            },
            WireFormat::Messages => Self {
                format,
                build: build_messages_request,
                extract: extract_messages_content,
            },
        }
    }

    pub fn build(&self, prompt: &Prompt<'_>) -> Result<Value> {
        (self.build)(prompt)
    }

    pub fn extract(&self, body: &[u8]) -> Result<String> {
        (self.extract)(body)
    }
}

// =============================================
// chat-completions 形式
// =============================================

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

pub fn build_chat_request(prompt: &Prompt<'_>) -> Result<Value> {
    let mut messages = Vec::with_capacity(2);
    if !prompt.system.is_empty() {
        messages.push(WireMessage {
            role: "system".into(),
            content: Some(prompt.system.to_string()),
        });
    }
    messages.push(WireMessage {
        role: "user".into(),
        content: Some(prompt.user.to_string()),
    });

    Ok(serde_json::to_value(ChatRequest {
        model: prompt.model,
        messages,
    })?)
}

pub fn extract_chat_content(body: &[u8]) -> Result<String> {
    let response: ChatResponse = serde_json::from_slice(body)
        .map_err(|e| TriageError::ApiParse(format!("chat-completionsレスポンス: {}", e)))?;

    if let Some(error) = response.error.as_ref().filter(|e| !e.is_null()) {
        return Err(TriageError::Api(api_error_message(error)));
    }

    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.content)
        .find(|content| !content.trim().is_empty())
        .ok_or_else(|| TriageError::ApiParse("choicesに本文がありません".into()))
}

// =============================================
// messages 形式
// =============================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub fn build_messages_request(prompt: &Prompt<'_>) -> Result<Value> {
    Ok(serde_json::to_value(MessagesRequest {
        model: prompt.model,
        max_tokens: prompt.max_tokens,
        system: Some(prompt.system).filter(|s| !s.is_empty()),
        messages: vec![WireMessage {
            role: "user".into(),
            content: Some(prompt.user.to_string()),
        }],
    })?)
}

pub fn extract_messages_content(body: &[u8]) -> Result<String> {
    let response: MessagesResponse = serde_json::from_slice(body)
        .map_err(|e| TriageError::ApiParse(format!("messagesレスポンス: {}", e)))?;

    if let Some(error) = response.error.as_ref().filter(|e| !e.is_null()) {
        return Err(TriageError::Api(api_error_message(error)));
    }

    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or_else(|| TriageError::ApiParse("textブロックがありません".into()))
}

/// `error` フィールド（文字列 / {message}）をメッセージにする
fn api_error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
