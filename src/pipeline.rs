// src/pipeline.rs
//! fetch -> rewrite -> synthesize -> deliver.
//!
//! Manual and scheduled runs go through the same `GenerationPipeline::run`. One run at
//! a time; progress is published on a watch channel and the last successful result is
//! kept for the HTTP layer.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::ingest::article::extract_article;
use crate::ingest::feed::extract_feed;
use crate::ingest::proxy::{AttemptFailure, AttemptRecord, ProxyFetcher};
use crate::ingest::transport::{HttpTransport, ReqwestTransport};
use crate::ingest::types::{ExtractError, ExtractedArticle, FetchTarget, SourceKind};
use crate::ingest::{ensure_metrics_described, fingerprint};
use crate::rewrite::{DurationAdvisory, RewriteOrchestrator, TargetDuration};
use crate::schedule::GenerationTrigger;
use crate::speech::{ElevenLabsClient, SpeechError, SpeechSynthesizer, Voice, VoiceSettings};

/// Combined title + body must reach this many characters before rewriting.
pub const MIN_CONTENT_CHARS: usize = 50;
/// Where inline audio is served from.
pub const LATEST_AUDIO_URL: &str = "/audio/latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Keep the audio in memory and expose it for playback.
    #[default]
    Inline,
    SaveToDisk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub target: FetchTarget,
    pub voice_id: String,
    pub duration: TargetDuration,
    pub delivery: Delivery,
}

impl GenerationRequest {
    /// Validate the form-style inputs: exactly one of the two URLs, a voice and a
    /// supported duration.
    pub fn from_urls(
        rss_url: Option<&str>,
        news_url: Option<&str>,
        voice_id: &str,
        duration_secs: u32,
        save_to_local: bool,
    ) -> Result<Self, PipelineError> {
        let rss = rss_url.map(str::trim).filter(|s| !s.is_empty());
        let news = news_url.map(str::trim).filter(|s| !s.is_empty());
        let target = match (rss, news) {
            (Some(u), None) => FetchTarget::Feed(u.to_string()),
            (None, Some(u)) => FetchTarget::Page(u.to_string()),
            (None, None) => {
                return Err(PipelineError::InvalidRequest(
                    "provide an RSS feed URL or a news article URL".into(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(PipelineError::InvalidRequest(
                    "provide either an RSS feed URL or a news article URL, not both".into(),
                ))
            }
        };

        let voice_id = voice_id.trim();
        if voice_id.is_empty() {
            return Err(PipelineError::InvalidRequest("select a voice".into()));
        }
        let duration = TargetDuration::new(duration_secs).map_err(PipelineError::InvalidRequest)?;

        Ok(Self {
            target,
            voice_id: voice_id.to_string(),
            duration,
            delivery: if save_to_local {
                Delivery::SaveToDisk
            } else {
                Delivery::Inline
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Fetching,
    Rewriting,
    Synthesizing,
    Finalizing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub stage: Stage,
    pub progress: u8,
    pub message: String,
    /// Filled in by whoever knows the schedule (the HTTP layer).
    pub next_slot: Option<String>,
}

impl PipelineStatus {
    fn new(stage: Stage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
            next_slot: None,
        }
    }
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::new(Stage::Idle, 0, "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputRef {
    Playable { url: String },
    Saved { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRecord {
    pub timestamp: DateTime<Local>,
    pub filename: String,
    pub output: OutputRef,
    pub provider: String,
    pub source: SourceKind,
    pub word_count: usize,
    pub estimated_seconds: u32,
    pub target_seconds: u32,
    pub advisory: Option<DurationAdvisory>,
}

/// `noticia_DD-MM-YYYY__HH-MM.mp3`, local time.
pub fn output_filename(ts: NaiveDateTime) -> String {
    format!("noticia_{}.mp3", ts.format("%d-%m-%Y__%H-%M"))
}

/// Holds the single-run flag for the lifetime of a run.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn describe_pipeline_metrics() {
    ensure_metrics_described();
    describe_counter!("generation_runs_total", "Generation runs by outcome.");
    describe_histogram!("generation_duration_ms", "End-to-end generation time in milliseconds.");
    describe_counter!("schedule_checks_total", "Schedule wall-clock checks.");
}

pub struct GenerationPipeline {
    config: Arc<AppConfig>,
    feed_fetcher: ProxyFetcher,
    page_fetcher: ProxyFetcher,
    rewriter: RewriteOrchestrator,
    speech: Arc<dyn SpeechSynthesizer>,
    running: AtomicBool,
    status_tx: watch::Sender<PipelineStatus>,
    last: RwLock<Option<GenerationRecord>>,
    last_audio: RwLock<Option<Arc<Vec<u8>>>>,
}

impl GenerationPipeline {
    pub fn new(
        config: Arc<AppConfig>,
        transport: Arc<dyn HttpTransport>,
        rewriter: RewriteOrchestrator,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        describe_pipeline_metrics();
        let feed_fetcher = ProxyFetcher::new(transport.clone(), config.fetch.feed_proxies.clone())
            .with_timeout(config.fetch.timeout);
        let page_fetcher = ProxyFetcher::new(transport, config.fetch.page_proxies.clone())
            .with_timeout(config.fetch.timeout);
        let (status_tx, _) = watch::channel(PipelineStatus::default());
        Self {
            config,
            feed_fetcher,
            page_fetcher,
            rewriter,
            speech,
            running: AtomicBool::new(false),
            status_tx,
            last: RwLock::new(None),
            last_audio: RwLock::new(None),
        }
    }

    /// Production wiring: reqwest transport, configured rewrite provider, ElevenLabs.
    pub fn from_config(config: AppConfig) -> Self {
        let rewriter = RewriteOrchestrator::from_config(&config.ai);
        let speech = Arc::new(ElevenLabsClient::from_config(&config.speech));
        Self::new(
            Arc::new(config),
            Arc::new(ReqwestTransport::new()),
            rewriter,
            speech,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn last(&self) -> Option<GenerationRecord> {
        self.last.read().await.clone()
    }

    pub async fn last_audio(&self) -> Option<Arc<Vec<u8>>> {
        self.last_audio.read().await.clone()
    }

    pub async fn voices(&self) -> Result<Vec<Voice>, PipelineError> {
        Ok(self.speech.list_voices().await?)
    }

    fn publish(&self, stage: Stage, progress: u8, message: impl Into<String>) {
        let status = PipelineStatus::new(stage, progress, message);
        tracing::debug!(target: "pipeline", ?stage, progress, message = %status.message, "status");
        self.status_tx.send_replace(status);
    }

    /// Run once. A second call while one is in flight fails with `GenerationInProgress`.
    pub async fn run(&self, req: GenerationRequest) -> Result<GenerationRecord, PipelineError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(PipelineError::GenerationInProgress)?;
        let t0 = Instant::now();

        let result = self.run_stages(&req).await;

        histogram!("generation_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        match &result {
            Ok(rec) => {
                counter!("generation_runs_total", "outcome" => "ok").increment(1);
                self.publish(Stage::Done, 100, format!("audio ready: {}", rec.filename));
            }
            Err(e) => {
                counter!("generation_runs_total", "outcome" => "error").increment(1);
                tracing::error!(target: "pipeline", error = %e, url = req.target.url(), "generation failed");
                self.publish(Stage::Failed, 0, e.to_string());
            }
        }
        result
    }

    async fn run_stages(&self, req: &GenerationRequest) -> Result<GenerationRecord, PipelineError> {
        // credentials first, so a misconfigured deployment never touches the network
        self.rewriter.ensure_configured()?;
        if !self.speech.is_configured() {
            return Err(SpeechError::NotConfigured.into());
        }

        self.publish(Stage::Fetching, 10, format!("fetching {}", req.target.kind()));
        let article = self.acquire(&req.target).await?;
        let source_text = article.source_text();
        let len = source_text.trim().chars().count();
        if len < MIN_CONTENT_CHARS {
            return Err(PipelineError::ContentTooShort {
                len,
                min: MIN_CONTENT_CHARS,
            });
        }
        tracing::info!(
            target: "pipeline",
            stage = "fetched",
            kind = %req.target.kind(),
            source = %fingerprint(&source_text),
            chars = len,
            "content acquired"
        );

        self.publish(Stage::Rewriting, 35, format!("rewriting with {}", self.rewriter.provider_name()));
        let script = self.rewriter.rewrite(&source_text, req.duration).await?;

        self.publish(Stage::Synthesizing, 70, "synthesizing speech");
        let audio = self
            .speech
            .synthesize(&script.text, &req.voice_id, VoiceSettings::default())
            .await?;

        self.publish(Stage::Finalizing, 90, "finalizing audio");
        let timestamp = Local::now();
        let filename = output_filename(timestamp.naive_local());
        let output = self.deliver(req.delivery, &filename, audio).await?;

        let record = GenerationRecord {
            timestamp,
            filename,
            output,
            provider: self.rewriter.provider_name().to_string(),
            source: req.target.kind(),
            word_count: script.word_count,
            estimated_seconds: script.estimated_seconds,
            target_seconds: script.target_seconds,
            advisory: script.advisory,
        };
        *self.last.write().await = Some(record.clone());

        tracing::info!(
            target: "pipeline",
            stage = "done",
            filename = %record.filename,
            words = record.word_count,
            script = %fingerprint(&script.text),
            "generation finished"
        );
        Ok(record)
    }

    async fn acquire(&self, target: &FetchTarget) -> Result<ExtractedArticle, PipelineError> {
        let (fetcher, fetched) = match target {
            FetchTarget::Feed(url) => (
                &self.feed_fetcher,
                self.feed_fetcher.fetch_with(url, extract_feed).await,
            ),
            FetchTarget::Page(url) => (
                &self.page_fetcher,
                self.page_fetcher.fetch_with(url, extract_article).await,
            ),
        };

        fetched.map_err(|e| {
            let attempts = fetcher.last_attempts();
            let reasons: Vec<String> = attempts.iter().map(|a| a.failure.to_string()).collect();

            // every relay answered, but no copy of the page had enough text
            if let Some((len, min)) = all_too_short(&attempts) {
                tracing::warn!(target: "pipeline", ?reasons, "source reachable but content too short");
                return PipelineError::ContentTooShort { len, min };
            }

            tracing::warn!(target: "pipeline", error = %e, ?reasons, "source unreachable");
            PipelineError::SourceUnreachable {
                kind: target.kind(),
                url: target.url().to_string(),
            }
        })
    }

    async fn deliver(
        &self,
        delivery: Delivery,
        filename: &str,
        audio: Vec<u8>,
    ) -> Result<OutputRef, PipelineError> {
        match delivery {
            Delivery::Inline => {
                *self.last_audio.write().await = Some(Arc::new(audio));
                Ok(OutputRef::Playable {
                    url: LATEST_AUDIO_URL.to_string(),
                })
            }
            Delivery::SaveToDisk => {
                let dir = &self.config.output_dir;
                tokio::fs::create_dir_all(dir).await?;
                let path = dir.join(filename);
                tokio::fs::write(&path, &audio).await?;
                tracing::info!(target: "pipeline", path = %path.display(), bytes = audio.len(), "audio saved");
                Ok(OutputRef::Saved { path })
            }
        }
    }
}

#[async_trait]
impl GenerationTrigger for GenerationPipeline {
    async fn trigger(&self, request: GenerationRequest) -> Result<GenerationRecord, PipelineError> {
        self.run(request).await
    }
}

/// Longest `TooShort` rejection when every attempt failed that way.
fn all_too_short(attempts: &[AttemptRecord]) -> Option<(usize, usize)> {
    attempts
        .iter()
        .map(|a| match &a.failure {
            AttemptFailure::Rejected(ExtractError::TooShort { len, min }) => Some((*len, *min)),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .max()
}
