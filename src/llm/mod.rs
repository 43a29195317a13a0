//! LLMクライアント
//!
//! 2つのワイヤ形式（chat-completions / messages）と複数プロバイダを1つのクライアントで扱う。

mod client;
pub mod provider;
pub mod wire;

pub use client::{LlmClient, LlmSettings, DEFAULT_MAX_TOKENS};
pub use provider::{Provider, ProviderDefaults, ProviderTable, WireFormat};
