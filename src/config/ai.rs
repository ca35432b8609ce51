// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;

/// Closed set of rewrite backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gemini,
    OpenAi,
    Perplexity,
    OpenRouter,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::OpenAi => "openai",
            ProviderId::Perplexity => "perplexity",
            ProviderId::OpenRouter => "openrouter",
        }
    }

    /// Env var holding the credential for this provider.
    pub fn key_var(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "GOOGLE_AI_API_KEY",
            ProviderId::OpenAi => "OPENAI_API_KEY",
            ProviderId::Perplexity => "PERPLEXITY_API_KEY",
            ProviderId::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn model_var(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "GEMINI_MODEL",
            ProviderId::OpenAi => "OPENAI_MODEL",
            ProviderId::Perplexity => "PERPLEXITY_MODEL",
            ProviderId::OpenRouter => "OPENROUTER_MODEL",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini-2.0-flash-exp",
            ProviderId::OpenAi => "gpt-4o-mini",
            ProviderId::Perplexity => "llama-3.1-sonar-small-128k-online",
            ProviderId::OpenRouter => "anthropic/claude-3.5-sonnet",
        }
    }

    pub const ALL: [ProviderId; 4] = [
        ProviderId::Gemini,
        ProviderId::OpenAi,
        ProviderId::Perplexity,
        ProviderId::OpenRouter,
    ];
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // case-insensitive; "google" is accepted as an alias for gemini
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "openai" => Ok(ProviderId::OpenAi),
            "perplexity" => Ok(ProviderId::Perplexity),
            "openrouter" => Ok(ProviderId::OpenRouter),
            other => anyhow::bail!("Unsupported AI provider: {other}"),
        }
    }
}

/// Credential + model for one provider. `api_key == None` means "not configured".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: String,
    /// Override for tests / self-hosted gateways.
    pub base_url: Option<String>,
}

impl ProviderSettings {
    pub fn unconfigured(id: ProviderId) -> Self {
        Self {
            api_key: None,
            model: id.default_model().to_string(),
            base_url: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    /// The single active provider for every run.
    pub provider: ProviderId,
    pub gemini: ProviderSettings,
    pub openai: ProviderSettings,
    pub perplexity: ProviderSettings,
    pub openrouter: ProviderSettings,
    pub timeout: Duration,
    /// Sent as `HTTP-Referer` to OpenRouter.
    pub app_referer: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderId::Gemini,
            gemini: ProviderSettings::unconfigured(ProviderId::Gemini),
            openai: ProviderSettings::unconfigured(ProviderId::OpenAi),
            perplexity: ProviderSettings::unconfigured(ProviderId::Perplexity),
            openrouter: ProviderSettings::unconfigured(ProviderId::OpenRouter),
            timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            app_referer: "http://localhost".to_string(),
        }
    }
}

impl AiConfig {
    pub fn settings(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::Gemini => &self.gemini,
            ProviderId::OpenAi => &self.openai,
            ProviderId::Perplexity => &self.perplexity,
            ProviderId::OpenRouter => &self.openrouter,
        }
    }

    pub fn settings_mut(&mut self, id: ProviderId) -> &mut ProviderSettings {
        match id {
            ProviderId::Gemini => &mut self.gemini,
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Perplexity => &mut self.perplexity,
            ProviderId::OpenRouter => &mut self.openrouter,
        }
    }

    pub fn active(&self) -> &ProviderSettings {
        self.settings(self.provider)
    }
}
