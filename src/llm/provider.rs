//! LLMプロバイダ定義
//!
//! プロバイダごとのデフォルト（エンドポイント、モデル、ワイヤ形式）は
//! `ProviderTable` に持ち、起動時に組み立ててクライアントへ渡す。

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    #[value(name = "openrouter")]
    OpenRouter,
    Groq,
    /// ローカル実行（APIキー不要）
    Ollama,
    /// 任意のエンドポイント（エンドポイントとモデルの指定が必須）
    Custom,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::OpenRouter => "openrouter",
            Provider::Groq => "groq",
            Provider::Ollama => "ollama",
            Provider::Custom => "custom",
        }
    }

    /// プロバイダ固有のAPIキー環境変数
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::Ollama | Provider::Custom => None,
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "gemini" | "google" => Ok(Provider::Gemini),
            "openrouter" => Ok(Provider::OpenRouter),
            "groq" => Ok(Provider::Groq),
            "ollama" | "local" => Ok(Provider::Ollama),
            "custom" => Ok(Provider::Custom),
            _ => Err(format!(
                "Unknown LLM provider: {}. Use openai, anthropic, gemini, openrouter, groq, ollama, or custom",
                s
            )),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// リクエスト/レスポンスのJSON形式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// `{model, messages}` → `choices[].message.content`
    ChatCompletions,
    /// `{model, max_tokens, system, messages}` → `content[]` のtextブロック
    Messages,
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "chat_completions" | "chat" | "openai" => Ok(WireFormat::ChatCompletions),
            "messages" | "anthropic" => Ok(WireFormat::Messages),
            _ => Err(format!("Unknown wire format: {}. Use chat_completions or messages", s)),
        }
    }
}

/// プロバイダのデフォルト設定
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDefaults {
    pub endpoint: String,
    pub model: String,
    pub wire_format: WireFormat,
    /// APIキーが必要か（ローカル実行はfalse）
    pub requires_key: bool,
}

impl ProviderDefaults {
    fn remote(endpoint: &str, model: &str, wire_format: WireFormat) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            wire_format,
            requires_key: true,
        }
    }
}

/// プロバイダ → デフォルト設定の対応表
#[derive(Clone, Debug, Default)]
pub struct ProviderTable {
    entries: HashMap<Provider, ProviderDefaults>,
}

impl ProviderTable {
    /// 組み込みの対応表（`Custom` は含まない）
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            Provider::OpenAi,
            ProviderDefaults::remote(
                "https://api.openai.com/v1/chat/completions",
                "gpt-4o-mini",
                WireFormat::ChatCompletions,
            ),
        );
        entries.insert(
            Provider::Anthropic,
            ProviderDefaults::remote(
                "https://api.anthropic.com/v1/messages",
                "claude-3-5-haiku-latest",
                WireFormat::Messages,
            ),
        );
        entries.insert(
            Provider::Gemini,
            ProviderDefaults::remote(
                "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                "gemini-2.0-flash",
                WireFormat::ChatCompletions,
            ),
        );
        entries.insert(
            Provider::OpenRouter,
            ProviderDefaults::remote(
                "https://openrouter.ai/api/v1/chat/completions",
                "openai/gpt-4o-mini",
                WireFormat::ChatCompletions,
            ),
        );
        entries.insert(
            Provider::Groq,
            ProviderDefaults::remote(
                "https://api.groq.com/openai/v1/chat/completions",
                "llama-3.3-70b-versatile",
                WireFormat::ChatCompletions,
            ),
        );
        entries.insert(
            Provider::Ollama,
            ProviderDefaults {
                endpoint: "http://localhost:11434/v1/chat/completions".to_string(),
                model: "llama3.2".to_string(),
                wire_format: WireFormat::ChatCompletions,
                requires_key: false,
            },
        );
        Self { entries }
    }

    pub fn get(&self, provider: Provider) -> Option<&ProviderDefaults> {
        self.entries.get(&provider)
    }

    /// エントリを追加/置換した表を返す
    pub fn with_entry(mut self, provider: Provider, defaults: ProviderDefaults) -> Self {
        self.entries.insert(provider, defaults);
        self
    }
}
