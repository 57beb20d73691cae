//! LLM chat client and multi-vendor model catalog
//!
//! The catalog maps model names to platform + endpoint configuration,
//! with local Ollama models pre-configured and an OpenAI-compatible
//! fallback for anything unknown. The client speaks the four wire
//! formats:
//! - openai: `choices[0].message.content`, `Authorization: Bearer`
//! - anthropic: `content[0].text`, `x-api-key` + `anthropic-version`
//! - ollama: `message.content`, no auth
//! - google: `candidates[0].content.parts[0].text`, key as query param

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{mask_api_key, CONNECT_TIMEOUT, LLM_TIMEOUT};
use crate::error::WeftError;

pub const DEFAULT_MODEL: &str = "gemma3:4b";

const OLLAMA_CHAT_URL: &str = "http://localhost:11434/api/chat";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Wire format family a model speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// OpenAI and OpenAI-compatible endpoints
    OpenAi,
    Anthropic,
    Ollama,
    /// Google Gemini endpoints
    Google,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::Google => "google",
        }
    }

    /// Whether calls to this platform need an API key
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

/// Endpoint configuration for one model
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub platform: Platform,
    pub api_url: String,
    pub max_tokens: u32,
}

impl ModelConfig {
    fn ollama(max_tokens: u32) -> Self {
        Self {
            platform: Platform::Ollama,
            api_url: OLLAMA_CHAT_URL.to_string(),
            max_tokens,
        }
    }

    /// Fallback for models absent from the catalog
    fn openai_compatible() -> Self {
        Self {
            platform: Platform::OpenAi,
            api_url: OPENAI_CHAT_URL.to_string(),
            max_tokens: 4096,
        }
    }
}

/// Model name → configuration table, extensible at runtime
#[derive(Clone)]
pub struct ModelCatalog {
    models: Arc<DashMap<String, ModelConfig>>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self {
            models: Arc::new(DashMap::new()),
        }
    }

    /// Catalog pre-loaded with local Ollama models
    pub fn with_defaults() -> Self {
        let catalog = Self::empty();
        catalog.add_model("gemma3:4b", ModelConfig::ollama(8192));
        catalog.add_model("qwen2.5", ModelConfig::ollama(8192));
        catalog.add_model("gemma2", ModelConfig::ollama(8192));
        catalog.add_model("phi3", ModelConfig::ollama(4096));
        catalog
    }

    pub fn add_model(&self, name: impl Into<String>, config: ModelConfig) {
        self.models.insert(name.into(), config);
    }

    pub fn remove_model(&self, name: &str) {
        self.models.remove(name);
    }

    /// Configuration for a model; unknown names get the
    /// OpenAI-compatible fallback
    pub fn get(&self, model: &str) -> ModelConfig {
        self.models
            .get(model)
            .map(|e| e.value().clone())
            .unwrap_or_else(ModelConfig::openai_compatible)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn models_for_platform(&self, platform: Platform) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .iter()
            .filter(|e| e.value().platform == platform)
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> =
            self.models.iter().map(|e| e.value().platform).collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms.dedup();
        platforms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// One chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub api_key: Option<String>,
    /// Override the catalog's endpoint (self-hosted gateways, tests)
    pub api_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            api_key: None,
            api_url: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Chat client over the shared HTTP connection pool
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    catalog: ModelCatalog,
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new(ModelCatalog::with_defaults())
    }
}

impl LlmClient {
    pub fn new(catalog: ModelCatalog) -> Self {
        let http = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("weft/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");
        Self { http, catalog }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Run one chat completion, returning the assistant text
    pub async fn chat(&self, request: ChatRequest) -> Result<String, WeftError> {
        let config = self.catalog.get(&request.model);
        let url = request
            .api_url
            .clone()
            .unwrap_or_else(|| config.api_url.clone());

        debug!(
            model = %request.model,
            platform = config.platform.as_str(),
            api_key = %request.api_key.as_deref().map(mask_api_key).unwrap_or_default(),
            "dispatching chat completion"
        );

        match config.platform {
            Platform::OpenAi => self.chat_openai(&url, &request, &config).await,
            Platform::Anthropic => self.chat_anthropic(&url, &request, &config).await,
            Platform::Ollama => self.chat_ollama(&url, &request).await,
            Platform::Google => self.chat_google(&url, &request, &config).await,
        }
    }

    async fn chat_openai(
        &self,
        url: &str,
        request: &ChatRequest,
        config: &ModelConfig,
    ) -> Result<String, WeftError> {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens.unwrap_or(config.max_tokens),
            "stream": false,
        });
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }

        let mut builder = self.http.post(url).json(&payload);
        if let Some(key) = &request.api_key {
            builder = builder.bearer_auth(key);
        }

        let body = Self::send(builder).await?;
        Ok(body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn chat_anthropic(
        &self,
        url: &str,
        request: &ChatRequest,
        config: &ModelConfig,
    ) -> Result<String, WeftError> {
        let payload = json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens.unwrap_or(config.max_tokens),
        });

        let builder = self
            .http
            .post(url)
            .header("x-api-key", request.api_key.as_deref().unwrap_or(""))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload);

        let body = Self::send(builder).await?;
        Ok(body["content"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn chat_google(
        &self,
        url: &str,
        request: &ChatRequest,
        config: &ModelConfig,
    ) -> Result<String, WeftError> {
        // Gemini authenticates through a query parameter, not a header
        let url = match &request.api_key {
            Some(key) => format!("{url}?key={key}"),
            None => url.to_string(),
        };

        let contents: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "parts": [{ "text": m.content }],
                    "role": if m.role == "user" { "user" } else { "model" },
                })
            })
            .collect();

        let payload = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": request.max_tokens.unwrap_or(config.max_tokens),
                "temperature": request.temperature.unwrap_or(0.7),
            }
        });

        let body = Self::send(self.http.post(&url).json(&payload)).await?;
        Ok(body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn chat_ollama(&self, url: &str, request: &ChatRequest) -> Result<String, WeftError> {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages,
            "stream": false,
        });
        if let Some(temperature) = request.temperature {
            payload["options"] = json!({ "temperature": temperature });
        }

        let body = Self::send(self.http.post(url).json(&payload)).await?;
        Ok(body["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn send(builder: reqwest::RequestBuilder) -> Result<Value, WeftError> {
        let response = builder.send().await.map_err(|e| WeftError::HttpError {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WeftError::ProviderApiError {
                message: format!("{status}: {body}"),
            });
        }

        response.json().await.map_err(|e| WeftError::ProviderApiError {
            message: format!("invalid response body: {e}"),
        })
    }
}
