// src/speech.rs
//! Text-to-speech client (ElevenLabs) and the synthesizer seam the pipeline depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SpeechConfig;

const SPEECH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("ElevenLabs API key not configured")]
    NotConfigured,
    #[error("invalid ElevenLabs API key")]
    InvalidCredential,
    #[error("ElevenLabs API rate limit exceeded")]
    RateLimited,
    #[error("ElevenLabs request failed: {status} - {detail}")]
    Failed { status: u16, detail: String },
    #[error("ElevenLabs transport error: {0}")]
    Transport(String),
}

impl SpeechError {
    fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => SpeechError::InvalidCredential,
            429 => SpeechError::RateLimited,
            _ => SpeechError::Failed {
                status,
                detail: body.trim().chars().take(300).collect(),
            },
        }
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn is_configured(&self) -> bool;
    /// MP3 bytes for `text` spoken by `voice_id`.
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        settings: VoiceSettings,
    ) -> Result<Vec<u8>, SpeechError>;
    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError>;
}

pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model_id: String,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

impl ElevenLabsClient {
    pub fn from_config(cfg: &SpeechConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("news-audio-generator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(SPEECH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model_id: cfg.model_id.clone(),
        }
    }

    fn key(&self) -> Result<&str, SpeechError> {
        self.api_key.as_deref().ok_or(SpeechError::NotConfigured)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        settings: VoiceSettings,
    ) -> Result<Vec<u8>, SpeechError> {
        let key = self.key()?;
        let url = format!("{}/text-to-speech/{}", self.base_url, voice_id.trim());
        tracing::debug!(target: "speech", voice_id, chars = text.chars().count(), "synthesizing");

        let resp = self
            .http
            .post(&url)
            .header("xi-api-key", key)
            .json(&TtsRequest {
                text,
                model_id: &self.model_id,
                voice_settings: settings,
            })
            .send()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::from_status(status.as_u16(), &body));
        }

        let audio = resp
            .bytes()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))?;
        tracing::debug!(target: "speech", bytes = audio.len(), "audio received");
        Ok(audio.to_vec())
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        let key = self.key()?;
        let resp = self
            .http
            .get(format!("{}/voices", self.base_url))
            .header("xi-api-key", key)
            .send()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::from_status(status.as_u16(), &body));
        }

        let data: VoicesResponse = resp
            .json()
            .await
            .map_err(|e| SpeechError::Transport(format!("decoding voices: {e}")))?;
        tracing::debug!(target: "speech", count = data.voices.len(), "voices loaded");
        Ok(data.voices)
    }
}
