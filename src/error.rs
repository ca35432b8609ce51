//! Pipeline-level error taxonomy. Component errors converge here; the HTTP layer
//! and the one-shot binary only ever see these variants.

use crate::ingest::types::SourceKind;
use crate::rewrite::RewriteError;
use crate::schedule::ScheduleError;
use crate::speech::SpeechError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Every proxy failed for the source URL.
    #[error("could not reach the {kind} source {url}; {}", kind.alternate_hint())]
    SourceUnreachable { kind: SourceKind, url: String },

    #[error("news content too short ({len} chars, minimum {min}); try a different source")]
    ContentTooShort { len: usize, min: usize },

    /// Missing credential, detected before any network I/O.
    #[error("{0} credential is not configured")]
    ProviderNotConfigured(String),

    #[error("{provider} call failed: {detail}")]
    ProviderCallFailed { provider: String, detail: String },

    #[error("schedule misconfigured: {0}")]
    ScheduleMisconfigured(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Single-run guard: a generation is already in flight.
    #[error("a generation run is already in progress")]
    GenerationInProgress,

    #[error("saving audio failed: {0}")]
    Delivery(#[from] std::io::Error),
}

impl From<RewriteError> for PipelineError {
    fn from(e: RewriteError) -> Self {
        match e {
            RewriteError::NotConfigured(provider) => Self::ProviderNotConfigured(provider.into()),
            other => Self::ProviderCallFailed {
                provider: other.provider().to_string(),
                detail: other.to_string(),
            },
        }
    }
}

impl From<SpeechError> for PipelineError {
    fn from(e: SpeechError) -> Self {
        match e {
            SpeechError::NotConfigured => Self::ProviderNotConfigured("elevenlabs".into()),
            other => Self::ProviderCallFailed {
                provider: "elevenlabs".into(),
                detail: other.to_string(),
            },
        }
    }
}

impl From<ScheduleError> for PipelineError {
    fn from(e: ScheduleError) -> Self {
        Self::ScheduleMisconfigured(e.to_string())
    }
}
