use crate::error::{Result, TriageError};
use crate::llm::{LlmSettings, Provider, WireFormat, DEFAULT_MAX_TOKENS};
use crate::reader::{DEFAULT_DAYS_AGO, DEFAULT_LOCATION};
use crate::triage::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use triage_common::PromptVariant;

const APP_DIR_NAME: &str = "inbox-triage";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub readwise_token: Option<String>,
    pub llm_provider: Provider,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub llm_endpoint: Option<String>,
    pub llm_wire_format: Option<WireFormat>,
    pub llm_max_tokens: u32,
    pub prompt_variant: PromptVariant,
    pub days_ago: u32,
    pub location: String,
    pub batch_size: usize,
    pub timeout_seconds: u64,
    pub store_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            readwise_token: None,
            llm_provider: Provider::default(),
            llm_api_key: None,
            llm_model: None,
            llm_endpoint: None,
            llm_wire_format: None,
            llm_max_tokens: DEFAULT_MAX_TOKENS,
            prompt_variant: PromptVariant::default(),
            days_ago: DEFAULT_DAYS_AGO,
            location: DEFAULT_LOCATION.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_seconds: 120,
            store_path: None,
        }
    }
}

impl Config {
    /// 設定ファイルを読み、環境変数で上書きする
    ///
    /// `provider` はコマンドライン指定で、環境変数よりも優先する。
    pub fn load(provider: Option<Provider>) -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(provider, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 設定ファイルのみを読む（環境変数は反映しない）
    pub fn load_file() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(app_dir()?.join(CONFIG_FILE_NAME))
    }

    /// 環境変数を優先して上書き（空の値は無視）
    ///
    /// APIキーは `TRIAGE_LLM_API_KEY`、次に確定したプロバイダ固有の変数
    /// （`OPENAI_API_KEY` など）の順に探す。
    pub fn apply_env<F>(&mut self, provider_override: Option<Provider>, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("READWISE_TOKEN") {
            self.readwise_token = Some(token);
        }
        if let Some(provider) = get("TRIAGE_LLM_PROVIDER") {
            self.llm_provider = provider.parse().map_err(TriageError::Config)?;
        }
        if let Some(provider) = provider_override {
            self.llm_provider = provider;
        }

        let provider_key = self.llm_provider.api_key_env().and_then(|key| get(key));
        if let Some(key) = get("TRIAGE_LLM_API_KEY").or(provider_key) {
            self.llm_api_key = Some(key);
        }

        if let Some(model) = get("TRIAGE_LLM_MODEL") {
            self.llm_model = Some(model);
        }
        if let Some(endpoint) = get("TRIAGE_LLM_ENDPOINT") {
            self.llm_endpoint = Some(endpoint);
        }
        if let Some(days) = get("TRIAGE_DAYS") {
            self.days_ago = days.trim().parse().map_err(|_| {
                TriageError::Config(format!("TRIAGE_DAYS が数値ではありません: {}", days))
            })?;
        }
        if let Some(store) = get("TRIAGE_STORE") {
            self.store_path = Some(PathBuf::from(store));
        }
        Ok(())
    }

    pub fn reader_token(&self) -> Result<String> {
        self.readwise_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(TriageError::MissingCredential("Readwiseトークン"))
    }

    pub fn set_reader_token(&mut self, token: String) -> Result<()> {
        self.readwise_token = Some(token);
        self.save()
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            provider: self.llm_provider,
            api_key: self.llm_api_key.clone(),
            model: self.llm_model.clone(),
            endpoint: self.llm_endpoint.clone(),
            wire_format: self.llm_wire_format,
            max_tokens: self.llm_max_tokens,
            prompt_variant: self.prompt_variant,
            timeout: Duration::from_secs(self.timeout_seconds.max(1)),
        }
    }

    /// ストアのパス（未設定なら既定の場所）
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => crate::store::default_path(),
        }
    }
}

/// アプリの設定ディレクトリ（`~/.config/inbox-triage`）
pub fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TriageError::Config("ホームディレクトリが見つかりません".into()))?;
    Ok(home.join(".config").join(APP_DIR_NAME))
}

/// 表示用にシークレットを伏せる
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}
