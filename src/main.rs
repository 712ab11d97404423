use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tts_engine::{
    AudioCache, EngineConfig, GenerationParams, ResponseFormat, SynthesisRequest,
    SystemHardwareQuery, TtsEngine, core::hardware,
};

/// Long-form text-to-speech engine
#[derive(Parser, Debug)]
#[command(name = "tts-engine")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize text into an audio file
    Synthesize(SynthesizeArgs),

    /// Print the detected hardware profile
    Profile,

    /// Inspect or clear the audio cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args, Debug)]
struct SynthesizeArgs {
    /// Text to synthesize
    #[arg(short = 't', long, conflicts_with = "input", required_unless_present = "input")]
    text: Option<String>,

    /// Read the text from a file
    #[arg(short = 'i', long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Voice identifier (deployment default when omitted)
    #[arg(short = 'v', long)]
    voice: Option<String>,

    /// Output format (wav or pcm)
    #[arg(short = 'f', long, default_value = "wav")]
    format: String,

    /// Output file path
    #[arg(short = 'o', long, value_name = "FILE")]
    output: PathBuf,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    top_p: Option<f32>,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print cache statistics as JSON
    Stats,
    /// Remove every cached entry
    Clear,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    if let Some(path) = path {
        info!("Loading configuration from {}", path.display());
    }
    EngineConfig::load(path).map_err(|e| anyhow!(e.to_string()))
}

async fn open_cache(config: &EngineConfig) -> anyhow::Result<AudioCache> {
    let model_id = config
        .engine_settings()
        .model_id(config.inference.model.as_deref(), config.codec.sample_rate);
    AudioCache::from_config(&config.cache, model_id)
        .await?
        .ok_or_else(|| anyhow!("Audio cache is disabled; set cache.enabled or TTS_CACHE_ENABLED"))
}

async fn synthesize(config: &EngineConfig, args: SynthesizeArgs) -> anyhow::Result<()> {
    let format = ResponseFormat::parse(&args.format)?;
    let text = match (args.text, &args.input) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("Either --text or --input is required"),
    };

    let profile = hardware::detect(&SystemHardwareQuery::new(), &config.hardware).await;
    let engine = TtsEngine::from_config(config, profile).await?;

    let request = SynthesisRequest {
        text,
        voice: args.voice,
        format,
        params: GenerationParams {
            max_tokens: args.max_tokens,
            temperature: args.temperature,
            top_p: args.top_p,
        },
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current chunks");
            on_signal.cancel();
        }
    });

    let output = engine.synthesize_with_cancel(&request, &cancel).await?;
    for degradation in &output.degradations {
        warn!(%degradation, "Degraded output");
    }

    std::fs::write(&args.output, &output.audio)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!(
        "Wrote {} bytes of {} audio to {} (request {}{})",
        output.audio.len(),
        output.format,
        args.output.display(),
        output.request_id,
        if output.cached { ", cached" } else { "" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Synthesize(args) => synthesize(&config, args).await?,
        Commands::Profile => {
            let profile = hardware::detect(&SystemHardwareQuery::new(), &config.hardware).await;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Commands::Cache { action } => {
            let cache = open_cache(&config).await?;
            match action {
                CacheAction::Stats => {
                    let stats = cache.stats().await?;
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                CacheAction::Clear => {
                    cache.clear().await?;
                    println!("Cache cleared");
                }
            }
        }
    }

    Ok(())
}
