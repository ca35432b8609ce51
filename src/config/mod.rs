// src/config/mod.rs
//! Startup configuration. Built once, then shared by `Arc` with every component;
//! nothing else in the crate reads the process environment.

pub mod ai;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::proxy::{default_feed_proxies, default_page_proxies, ProxyEndpoint};
pub use ai::{AiConfig, ProviderId, ProviderSettings};

// --- env defaults & names ---
pub const ENV_CONFIG_PATH: &str = "NEWS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/news.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "noticias";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-proxy attempt timeout.
    pub timeout: Duration,
    pub feed_proxies: Vec<ProxyEndpoint>,
    pub page_proxies: Vec<ProxyEndpoint>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            feed_proxies: default_feed_proxies(),
            page_proxies: default_page_proxies(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model_id: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_ELEVENLABS_BASE_URL.to_string(),
            model_id: DEFAULT_ELEVENLABS_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub ai: AiConfig,
    pub speech: SpeechConfig,
    pub fetch: FetchConfig,
    pub output_dir: PathBuf,
}

impl AppConfig {
    /// Load using `.env` + process env, then overlay the TOML file at
    /// $NEWS_CONFIG_PATH (or `config/news.toml`) when it exists.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::from_lookup(|k| std::env::var(k).ok())?;

        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        if path.exists() {
            cfg.apply_file(&path)?;
        } else if std::env::var(ENV_CONFIG_PATH).is_ok() {
            anyhow::bail!("{ENV_CONFIG_PATH} points to non-existent path");
        }
        Ok(cfg)
    }

    /// Build from an arbitrary key lookup. Each key also falls back to its
    /// `VITE_`-prefixed spelling so existing `.env` files keep working.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| -> Option<String> {
            lookup(name)
                .or_else(|| lookup(&format!("VITE_{name}")))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut ai = AiConfig::default();
        if let Some(p) = get("AI_PROVIDER") {
            ai.provider = p.parse().context("parsing AI_PROVIDER")?;
        }
        for id in ProviderId::ALL {
            let s = ai.settings_mut(id);
            s.api_key = get(id.key_var());
            if let Some(m) = get(id.model_var()) {
                s.model = m;
            }
        }
        if let Some(secs) = get("PROVIDER_TIMEOUT_SECS") {
            ai.timeout = Duration::from_secs(parse_secs("PROVIDER_TIMEOUT_SECS", &secs)?);
        }
        if let Some(r) = get("APP_REFERER") {
            ai.app_referer = r;
        }

        let speech = SpeechConfig {
            api_key: get("ELEVENLABS_API_KEY"),
            ..SpeechConfig::default()
        };

        let mut fetch = FetchConfig::default();
        if let Some(secs) = get("FETCH_TIMEOUT_SECS") {
            fetch.timeout = Duration::from_secs(parse_secs("FETCH_TIMEOUT_SECS", &secs)?);
        }

        let output_dir = get("NEWS_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        Ok(Self {
            ai,
            speech,
            fetch,
            output_dir,
        })
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        self.apply_toml(&content)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    /// Overlay non-secret settings. Credentials are env-only.
    pub fn apply_toml(&mut self, s: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(s)?;

        if let Some(f) = file.fetch {
            if let Some(secs) = f.timeout_secs {
                self.fetch.timeout = Duration::from_secs(secs.max(1));
            }
            if let Some(p) = f.feed_proxies {
                self.fetch.feed_proxies = clean_proxies(p);
            }
            if let Some(p) = f.page_proxies {
                self.fetch.page_proxies = clean_proxies(p);
            }
        }
        if let Some(o) = file.output {
            if let Some(dir) = o.dir {
                self.output_dir = dir;
            }
        }
        if let Some(a) = file.ai {
            if let Some(p) = a.provider {
                self.ai.provider = p.parse()?;
            }
            if let Some(secs) = a.timeout_secs {
                self.ai.timeout = Duration::from_secs(secs.max(1));
            }
        }
        if let Some(sp) = file.speech {
            if let Some(url) = sp.base_url {
                self.speech.base_url = url.trim_end_matches('/').to_string();
            }
            if let Some(m) = sp.model_id {
                self.speech.model_id = m;
            }
        }
        Ok(())
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    let v: u64 = raw
        .parse()
        .with_context(|| format!("{name} must be a whole number of seconds"))?;
    Ok(v.max(1))
}

fn clean_proxies(items: Vec<ProxyEndpoint>) -> Vec<ProxyEndpoint> {
    items
        .into_iter()
        .filter(|p| !p.prefix.trim().is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    fetch: Option<FetchSection>,
    output: Option<OutputSection>,
    ai: Option<AiSection>,
    speech: Option<SpeechSection>,
}

#[derive(Debug, Deserialize)]
struct FetchSection {
    timeout_secs: Option<u64>,
    feed_proxies: Option<Vec<ProxyEndpoint>>,
    page_proxies: Option<Vec<ProxyEndpoint>>,
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct AiSection {
    provider: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SpeechSection {
    base_url: Option<String>,
    model_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::proxy::ResponseShape;
    use std::collections::HashMap;
    use std::env;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_any_vars() {
        let cfg = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.ai.provider, ProviderId::Gemini);
        assert!(!cfg.ai.active().is_configured());
        assert_eq!(cfg.fetch.timeout, Duration::from_secs(8));
        assert_eq!(cfg.fetch.feed_proxies.len(), 3);
        assert_eq!(cfg.fetch.page_proxies.len(), 3);
        assert_eq!(cfg.output_dir, PathBuf::from("noticias"));
        assert!(cfg.speech.api_key.is_none());
    }

    #[test]
    fn provider_keys_and_models_are_read() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("AI_PROVIDER", "openrouter"),
            ("OPENROUTER_API_KEY", "or-key"),
            ("OPENROUTER_MODEL", "meta/llama"),
            ("ELEVENLABS_API_KEY", "xi"),
        ]))
        .unwrap();
        assert_eq!(cfg.ai.provider, ProviderId::OpenRouter);
        assert_eq!(cfg.ai.active().api_key.as_deref(), Some("or-key"));
        assert_eq!(cfg.ai.active().model, "meta/llama");
        assert_eq!(cfg.ai.openai.model, "gpt-4o-mini");
        assert_eq!(cfg.speech.api_key.as_deref(), Some("xi"));
    }

    #[test]
    fn vite_prefixed_names_are_accepted() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("VITE_AI_PROVIDER", "openai"),
            ("VITE_OPENAI_API_KEY", "sk"),
        ]))
        .unwrap();
        assert_eq!(cfg.ai.provider, ProviderId::OpenAi);
        assert!(cfg.ai.active().is_configured());
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("AI_PROVIDER", "claude")])).unwrap_err();
        assert!(format!("{err:#}").contains("claude"));
    }

    #[test]
    fn toml_overlay_replaces_proxies_and_output() {
        let mut cfg = AppConfig::from_lookup(|_| None).unwrap();
        cfg.apply_toml(
            r#"
            [fetch]
            timeout_secs = 3
            feed_proxies = [
                { prefix = "https://relay.test/raw?u=" },
                { prefix = "" },
            ]
            page_proxies = [{ prefix = "https://relay.test/get?u=", shape = "json_envelope" }]

            [output]
            dir = "/tmp/out"

            [ai]
            provider = "perplexity"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.fetch.timeout, Duration::from_secs(3));
        assert_eq!(cfg.fetch.feed_proxies.len(), 1);
        assert_eq!(cfg.fetch.feed_proxies[0].shape, ResponseShape::Raw);
        assert_eq!(cfg.fetch.page_proxies[0].shape, ResponseShape::JsonEnvelope);
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cfg.ai.provider, ProviderId::Perplexity);
    }

    #[serial_test::serial]
    #[test]
    fn from_env_uses_env_and_config_path() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("news.toml");
        fs::write(&p, "[output]\ndir = \"from-file\"\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var("AI_PROVIDER", "openai");
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.ai.provider, ProviderId::OpenAi);
        assert_eq!(cfg.output_dir, PathBuf::from("from-file"));

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(AppConfig::from_env().is_err());

        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var("AI_PROVIDER");
    }
}
