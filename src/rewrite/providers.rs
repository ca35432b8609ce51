// src/rewrite/providers.rs
//! Concrete rewrite backends. Gemini speaks its own REST dialect; OpenAI, Perplexity
//! and OpenRouter share the chat-completions wire format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ai::{AiConfig, ProviderId, ProviderSettings};
use crate::rewrite::RewriteError;

pub const MAX_TOKENS: u32 = 2000;
pub const TEMPERATURE: f32 = 0.7;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const PERPLEXITY_URL: &str = "https://api.perplexity.ai/chat/completions";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const OPENROUTER_TITLE: &str = "News Audio Generator";

/// One text-completion backend.
#[async_trait]
pub trait RewriteProvider: Send + Sync {
    /// Returns the raw generated text; empty output is an error.
    async fn complete(&self, prompt: &str) -> Result<String, RewriteError>;
    fn name(&self) -> &'static str;
    fn model(&self) -> &str;
    fn is_configured(&self) -> bool;
}

pub type DynRewriteProvider = Arc<dyn RewriteProvider>;

/// Build the provider selected in config. Never fails: an unconfigured provider is
/// returned as-is and reports `is_configured() == false`.
pub fn build_provider(cfg: &AiConfig) -> DynRewriteProvider {
    let settings = cfg.active().clone();
    let http = http_client(cfg.timeout);
    match cfg.provider {
        ProviderId::Gemini => Arc::new(GeminiProvider::new(http, settings)),
        ProviderId::OpenAi => Arc::new(ChatCompletionsProvider::openai(http, settings)),
        ProviderId::Perplexity => Arc::new(ChatCompletionsProvider::perplexity(http, settings)),
        ProviderId::OpenRouter => Arc::new(ChatCompletionsProvider::openrouter(
            http,
            settings,
            cfg.app_referer.clone(),
        )),
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("news-audio-generator/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Trim the error body so a provider's HTML error page doesn't flood logs.
fn short_detail(body: &str) -> String {
    const MAX: usize = 300;
    let t = body.trim();
    match t.char_indices().nth(MAX) {
        Some((i, _)) => format!("{}...", &t[..i]),
        None => t.to_string(),
    }
}

fn api_key<'a>(settings: &'a ProviderSettings, provider: &'static str) -> Result<&'a str, RewriteError> {
    settings
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(RewriteError::NotConfigured(provider))
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

pub struct GeminiProvider {
    http: reqwest::Client,
    settings: ProviderSettings,
}

impl GeminiProvider {
    pub fn new(http: reqwest::Client, settings: ProviderSettings) -> Self {
        Self { http, settings }
    }

    fn endpoint(&self) -> String {
        let base = self
            .settings
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/v1beta/models/{}:generateContent", self.settings.model)
    }
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Deserialize, Default)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl GeminiResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl RewriteProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, RewriteError> {
        let key = api_key(&self.settings, self.name())?;
        let req = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: MAX_TOKENS,
                temperature: TEMPERATURE,
            },
        };

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", key)
            .json(&req)
            .send()
            .await
            .map_err(|e| RewriteError::Transport {
                provider: self.name(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RewriteError::Status {
                provider: self.name(),
                status: status.as_u16(),
                detail: short_detail(&body),
            });
        }

        let body: GeminiResponse = resp.json().await.map_err(|e| RewriteError::Transport {
            provider: self.name(),
            detail: format!("decoding response: {e}"),
        })?;
        let text = body.text();
        if text.trim().is_empty() {
            return Err(RewriteError::Empty(self.name()));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        ProviderId::Gemini.as_str()
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }
}

// ------------------------------------------------------------
// Chat-completions family
// ------------------------------------------------------------

pub struct ChatCompletionsProvider {
    id: ProviderId,
    http: reqwest::Client,
    settings: ProviderSettings,
    endpoint: String,
    extra_headers: Vec<(&'static str, String)>,
}

impl ChatCompletionsProvider {
    fn with_endpoint(
        id: ProviderId,
        http: reqwest::Client,
        settings: ProviderSettings,
        default_url: &str,
    ) -> Self {
        let endpoint = settings
            .base_url
            .clone()
            .unwrap_or_else(|| default_url.to_string());
        Self {
            id,
            http,
            settings,
            endpoint,
            extra_headers: Vec::new(),
        }
    }

    pub fn openai(http: reqwest::Client, settings: ProviderSettings) -> Self {
        Self::with_endpoint(ProviderId::OpenAi, http, settings, OPENAI_URL)
    }

    pub fn perplexity(http: reqwest::Client, settings: ProviderSettings) -> Self {
        Self::with_endpoint(ProviderId::Perplexity, http, settings, PERPLEXITY_URL)
    }

    /// OpenRouter wants the calling app identified.
    pub fn openrouter(http: reqwest::Client, settings: ProviderSettings, referer: String) -> Self {
        let mut p = Self::with_endpoint(ProviderId::OpenRouter, http, settings, OPENROUTER_URL);
        p.extra_headers = vec![
            ("HTTP-Referer", referer),
            ("X-Title", OPENROUTER_TITLE.to_string()),
        ];
        p
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<ChatMsg<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResp {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMsg>,
}

#[derive(Deserialize)]
struct ChatChoiceMsg {
    content: Option<String>,
}

#[async_trait]
impl RewriteProvider for ChatCompletionsProvider {
    async fn complete(&self, prompt: &str) -> Result<String, RewriteError> {
        let key = api_key(&self.settings, self.name())?;
        let req = ChatReq {
            model: &self.settings.model,
            messages: vec![ChatMsg {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let mut builder = self.http.post(&self.endpoint).bearer_auth(key).json(&req);
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, value);
        }

        let resp = builder.send().await.map_err(|e| RewriteError::Transport {
            provider: self.name(),
            detail: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RewriteError::Status {
                provider: self.name(),
                status: status.as_u16(),
                detail: short_detail(&body),
            });
        }

        let body: ChatResp = resp.json().await.map_err(|e| RewriteError::Transport {
            provider: self.name(),
            detail: format!("decoding response: {e}"),
        })?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(RewriteError::Empty(self.name()));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        self.id.as_str()
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }
}
