use super::provider::{Provider, ProviderTable, WireFormat};
use super::wire::{Prompt, WireCodec};
use crate::error::{Result, TriageError};
use crate::http::{self, retry, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::time::Duration;
use tracing::{debug, info};
use triage_common::{parse_triage_response, render_prompt, PromptVariant, TriageResult, SYSTEM_PROMPT};

/// messages形式の `max_tokens` デフォルト
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_CHARS: usize = 300;

/// 設定から渡されるLLM接続情報
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub wire_format: Option<WireFormat>,
    pub max_tokens: u32,
    pub prompt_variant: PromptVariant,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: None,
            model: None,
            endpoint: None,
            wire_format: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            prompt_variant: PromptVariant::default(),
            timeout: http::DEFAULT_TIMEOUT,
        }
    }
}

/// プロバイダ非依存のLLMクライアント
///
/// ワイヤ形式と認証ヘッダーは生成時に確定させ、呼び出し経路では分岐しない。
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    provider: Provider,
    endpoint: String,
    model: String,
    headers: HeaderMap,
    codec: WireCodec,
    max_tokens: u32,
    variant: PromptVariant,
    retry: RetryPolicy,
}

impl LlmClient {
    /// 設定とプロバイダ表からクライアントを生成
    ///
    /// - 組み込みプロバイダ: 未指定のエンドポイント/モデル/形式は表のデフォルトを使う
    /// - `custom`: エンドポイントとモデルが必須（形式の既定は chat-completions）
    /// - ローカルプロバイダ以外はAPIキーが必須
    pub fn new(settings: &LlmSettings, table: &ProviderTable) -> Result<Self> {
        let defaults = table.get(settings.provider);
        if defaults.is_none() && settings.provider != Provider::Custom {
            return Err(TriageError::Config(format!(
                "プロバイダ {} のデフォルト設定がありません",
                settings.provider
            )));
        }

        let endpoint = non_empty(settings.endpoint.as_deref())
            .or_else(|| defaults.map(|d| d.endpoint.clone()))
            .ok_or_else(|| {
                TriageError::Config(format!(
                    "プロバイダ {} にはエンドポイントの指定が必要です",
                    settings.provider
                ))
            })?;

        let model = non_empty(settings.model.as_deref())
            .or_else(|| defaults.map(|d| d.model.clone()))
            .ok_or_else(|| {
                TriageError::Config(format!(
                    "プロバイダ {} にはモデルの指定が必要です",
                    settings.provider
                ))
            })?;

        let wire_format = settings
            .wire_format
            .or_else(|| defaults.map(|d| d.wire_format))
            .unwrap_or(WireFormat::ChatCompletions);

        let requires_key = defaults.map(|d| d.requires_key).unwrap_or(true);
        let api_key = non_empty(settings.api_key.as_deref());
        let headers = if requires_key {
            let key = api_key.ok_or(TriageError::MissingCredential("LLM APIキー"))?;
            auth_headers(wire_format, &key)?
        } else {
            HeaderMap::new()
        };

        debug!(
            provider = %settings.provider,
            %endpoint,
            %model,
            ?wire_format,
            "llm client configured"
        );

        Ok(Self {
            http: http::build_client(settings.timeout)?,
            provider: settings.provider,
            endpoint,
            model,
            headers,
            codec: WireCodec::for_format(wire_format),
            max_tokens: settings.max_tokens.max(1),
            variant: settings.prompt_variant,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn wire_format(&self) -> WireFormat {
        self.codec.format
    }

    /// 1回のチャット呼び出しで本文テキストを得る
    ///
    /// 通信エラー・5xx・429のみ再試行する。4xx、JSONでない本文、
    /// 200内の `error` フィールドは即座にエラーとして返す。
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = self.codec.build(&Prompt {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            user,
        })?;

        let response = retry::execute(&self.retry, "llm", || {
            self.http
                .post(&self.endpoint)
                .headers(self.headers.clone())
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(TriageError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let text = self.codec.extract(&bytes)?;
        debug!(chars = text.len(), "llm response received");
        Ok(text)
    }

    /// アイテムJSONをプロンプトに埋め込んで判定させる
    ///
    /// # Arguments
    /// * `items_json` - `triage_common::items_json` の出力
    pub async fn triage_items(&self, items_json: &str) -> Result<Vec<TriageResult>> {
        let prompt = render_prompt(self.variant, items_json);
        debug!(prompt_chars = prompt.len(), variant = %self.variant, "sending triage prompt");

        let text = self.complete(SYSTEM_PROMPT, &prompt).await?;
        let results = parse_triage_response(&text)?;

        info!(results = results.len(), model = %self.model, "llm triage parsed");
        Ok(results)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// ワイヤ形式に応じた認証ヘッダー
fn auth_headers(wire_format: WireFormat, key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    match wire_format {
        WireFormat::ChatCompletions => {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", key))?);
        }
        WireFormat::Messages => {
            headers.insert(HeaderName::from_static("x-api-key"), header_value(key)?);
            headers.insert(
                HeaderName::from_static("anthropic-version"),
                HeaderValue::from_static(ANTHROPIC_VERSION),
            );
        }
    }
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| TriageError::Config("APIキーに使用できない文字が含まれています".into()))
}
