//! One-shot generation from the command line (same pipeline as the server).
//!
//! usage: generate_once <feed|page> <url> <voice_id> [duration_secs] [--save]

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use news_audio_generator::{AppConfig, GenerationPipeline, GenerationRequest};

const USAGE: &str = "usage: generate_once <feed|page> <url> <voice_id> [duration_secs] [--save]";

fn parse_args(args: &[String]) -> Result<GenerationRequest> {
    let save = args.iter().any(|a| a == "--save");
    let positional: Vec<&str> = args
        .iter()
        .filter(|a| a.as_str() != "--save")
        .map(String::as_str)
        .collect();

    let (kind, url, voice, rest) = match positional.as_slice() {
        [kind, url, voice, rest @ ..] => (*kind, *url, *voice, rest),
        _ => bail!(USAGE),
    };
    let duration = match rest {
        [] => 60,
        [d] => d.parse().with_context(|| format!("invalid duration: {d}"))?,
        _ => bail!(USAGE),
    };

    let req = match kind {
        "feed" => GenerationRequest::from_urls(Some(url), None, voice, duration, save),
        "page" => GenerationRequest::from_urls(None, Some(url), voice, duration, save),
        other => bail!("unknown source kind {other:?}; {USAGE}"),
    }?;
    Ok(req)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("news_audio_generator=info,warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let req = parse_args(&args)?;
    let config = AppConfig::from_env().context("loading configuration")?;
    let pipeline = GenerationPipeline::from_config(config);

    let record = pipeline.run(req).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
