// tests/common/mod.rs
//
// Shared fakes for integration tests: scripted HTTP transport, rewrite provider,
// speech synthesizer, and a ready-made config pointing at fake relays.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use news_audio_generator::config::AppConfig;
use news_audio_generator::ingest::proxy::ProxyEndpoint;
use news_audio_generator::ingest::transport::{HttpReply, HttpTransport, TransportError};
use news_audio_generator::rewrite::{RewriteError, RewriteOrchestrator, RewriteProvider};
use news_audio_generator::speech::{SpeechError, SpeechSynthesizer, Voice, VoiceSettings};
use news_audio_generator::GenerationPipeline;

pub const FEED_3: &str = include_str!("../fixtures/feed_three_items.xml");
pub const FEED_ATOM: &str = include_str!("../fixtures/feed_atom.xml");
pub const ARTICLE_MAIN: &str = include_str!("../fixtures/article_main.html");
pub const ARTICLE_PARAGRAPHS: &str = include_str!("../fixtures/article_paragraphs.html");

pub const RELAY_A: &str = "https://relay-a.test/raw?url=";
pub const RELAY_B: &str = "https://relay-b.test/raw?url=";
pub const RELAY_C: &str = "https://relay-c.test/raw?url=";

pub const FAKE_MP3: &[u8] = b"ID3\x04\x00fake-mp3-frames";

#[derive(Clone)]
pub enum Route {
    Reply(u16, String),
    Fail(String),
    Hang,
}

/// Transport answering by URL prefix; unknown URLs get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Vec<(String, Route)>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, prefix: &str, route: Route) -> Self {
        self.routes.push((prefix.to_string(), route));
        self
    }

    pub fn ok(self, prefix: &str, body: &str) -> Self {
        self.route(prefix, Route::Reply(200, body.to_string()))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<HttpReply, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        let route = self
            .routes
            .iter()
            .find(|(p, _)| url.starts_with(p.as_str()))
            .map(|(_, r)| r.clone());
        match route {
            Some(Route::Reply(status, body)) => Ok(HttpReply { status, body }),
            Some(Route::Fail(e)) => Err(TransportError(e)),
            Some(Route::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError("unreachable".into()))
            }
            None => Ok(HttpReply {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

/// Rewrite provider returning a canned script and remembering the prompt.
pub struct FakeProvider {
    pub reply: String,
    pub configured: bool,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            configured: true,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RewriteProvider for FakeProvider {
    async fn complete(&self, prompt: &str) -> Result<String, RewriteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

/// Speech synthesizer returning `FAKE_MP3`, optionally after a delay.
pub struct FakeSpeech {
    pub configured: bool,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn new() -> Self {
        Self {
            configured: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn synthesize(
        &self,
        _text: &str,
        _voice_id: &str,
        _settings: VoiceSettings,
    ) -> Result<Vec<u8>, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(FAKE_MP3.to_vec())
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        Ok(vec![Voice {
            voice_id: "v-ana".into(),
            name: "Ana".into(),
        }])
    }
}

pub fn relays() -> Vec<ProxyEndpoint> {
    vec![
        ProxyEndpoint::raw(RELAY_A),
        ProxyEndpoint::raw(RELAY_B),
        ProxyEndpoint::raw(RELAY_C),
    ]
}

pub fn test_config(output_dir: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.fetch.feed_proxies = relays();
    cfg.fetch.page_proxies = relays();
    cfg.fetch.timeout = Duration::from_millis(200);
    cfg.output_dir = output_dir.to_path_buf();
    cfg
}

pub struct Harness {
    pub pipeline: Arc<GenerationPipeline>,
    pub transport: Arc<MockTransport>,
    pub provider: Arc<FakeProvider>,
    pub speech: Arc<FakeSpeech>,
}

pub fn harness(
    output_dir: &Path,
    transport: MockTransport,
    provider: FakeProvider,
    speech: FakeSpeech,
) -> Harness {
    let transport = Arc::new(transport);
    let provider = Arc::new(provider);
    let speech = Arc::new(speech);
    let pipeline = GenerationPipeline::new(
        Arc::new(test_config(output_dir)),
        transport.clone(),
        RewriteOrchestrator::new(provider.clone()),
        speech.clone(),
    );
    Harness {
        pipeline: Arc::new(pipeline),
        transport,
        provider,
        speech,
    }
}

/// A script long enough for a 60 s target (150 words).
pub fn script_words(n: usize) -> String {
    let mut s = vec!["palavra"; n].join(" ");
    s.push('.');
    s
}
