// src/rewrite/mod.rs
//! Rewrite stage: source text -> broadcast-ready script of a target length.

pub mod prompt;
pub mod providers;
pub mod scrub;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ai::AiConfig;
use crate::ingest::fingerprint;
pub use providers::{build_provider, DynRewriteProvider, RewriteProvider};

/// Deviation (seconds) tolerated between estimated and target reading time.
pub const ADVISORY_TOLERANCE_SECS: u32 = 5;

/// Supported spoken lengths: 30..=180 seconds in steps of 30.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TargetDuration(u32);

impl TargetDuration {
    pub const MIN: u32 = 30;
    pub const MAX: u32 = 180;
    pub const STEP: u32 = 30;

    pub fn new(secs: u32) -> Result<Self, String> {
        if (Self::MIN..=Self::MAX).contains(&secs) && secs % Self::STEP == 0 {
            Ok(Self(secs))
        } else {
            Err(format!(
                "unsupported duration {secs}s (allowed: 30, 60, 90, 120, 150, 180)"
            ))
        }
    }

    pub fn secs(self) -> u32 {
        self.0
    }
}

impl Default for TargetDuration {
    fn default() -> Self {
        Self(60)
    }
}

impl TryFrom<u32> for TargetDuration {
    type Error = String;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<TargetDuration> for u32 {
    fn from(d: TargetDuration) -> u32 {
        d.0
    }
}

impl fmt::Display for TargetDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    #[error("{0} API key not configured")]
    NotConfigured(&'static str),
    #[error("{provider} API error: {status} - {detail}")]
    Status {
        provider: &'static str,
        status: u16,
        detail: String,
    },
    #[error("{provider} request failed: {detail}")]
    Transport {
        provider: &'static str,
        detail: String,
    },
    #[error("empty response from {0}")]
    Empty(&'static str),
}

impl RewriteError {
    pub fn provider(&self) -> &'static str {
        match self {
            RewriteError::NotConfigured(p) | RewriteError::Empty(p) => *p,
            RewriteError::Status { provider, .. } | RewriteError::Transport { provider, .. } => {
                *provider
            }
        }
    }
}

/// Estimated reading time drifted from the target by more than the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationAdvisory {
    pub estimated_seconds: u32,
    pub target_seconds: u32,
}

impl fmt::Display for DurationAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "estimated {}s vs target {}s",
            self.estimated_seconds, self.target_seconds
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteResult {
    pub text: String,
    pub word_count: usize,
    pub estimated_seconds: u32,
    pub target_seconds: u32,
    pub advisory: Option<DurationAdvisory>,
}

pub fn advisory_for(estimated_seconds: u32, target_seconds: u32) -> Option<DurationAdvisory> {
    (estimated_seconds.abs_diff(target_seconds) > ADVISORY_TOLERANCE_SECS).then_some(
        DurationAdvisory {
            estimated_seconds,
            target_seconds,
        },
    )
}

pub struct RewriteOrchestrator {
    provider: DynRewriteProvider,
}

impl RewriteOrchestrator {
    pub fn new(provider: DynRewriteProvider) -> Self {
        Self { provider }
    }

    pub fn from_config(cfg: &AiConfig) -> Self {
        Self::new(build_provider(cfg))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Credential check without I/O; the pipeline runs it before fetching.
    pub fn ensure_configured(&self) -> Result<(), RewriteError> {
        if self.provider.is_configured() {
            Ok(())
        } else {
            Err(RewriteError::NotConfigured(self.provider.name()))
        }
    }

    pub async fn rewrite(
        &self,
        source_text: &str,
        duration: TargetDuration,
    ) -> Result<RewriteResult, RewriteError> {
        self.ensure_configured()?;
        let name = self.provider.name();
        let target = duration.secs();

        tracing::info!(
            target: "rewrite",
            provider = name,
            model = self.provider.model(),
            source = %fingerprint(source_text),
            source_chars = source_text.chars().count(),
            target_secs = target,
            "rewrite started"
        );

        let prompt = prompt::build_prompt(source_text, target);
        let raw = self.provider.complete(&prompt).await?;
        let text = scrub::scrub_meta_commentary(&raw);
        // nothing speakable left (e.g. the reply was only a confirmation)
        if !text.chars().any(char::is_alphanumeric) {
            return Err(RewriteError::Empty(name));
        }

        let word_count = text.split_whitespace().count();
        let estimated_seconds = prompt::estimated_seconds(word_count);
        let advisory = advisory_for(estimated_seconds, target);
        if let Some(a) = advisory {
            tracing::warn!(target: "rewrite", provider = name, %a, "rewrite length off target");
        }

        tracing::info!(
            target: "rewrite",
            provider = name,
            words = word_count,
            estimated_secs = estimated_seconds,
            "rewrite finished"
        );

        Ok(RewriteResult {
            text,
            word_count,
            estimated_seconds,
            target_seconds: target,
            advisory,
        })
    }
}
