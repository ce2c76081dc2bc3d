mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ladder_core::{
    load_config, load_config_from_env, validate_config, Config, EncodingEngine, FfmpegEngine,
    LogFormat, LoggingConfig, PipelineProgress, StreamingPipeline,
};

use cli::Args;

/// Buffer size for pipeline progress events
const PROGRESS_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => load_config_from_env().context("Failed to load config from environment")?,
    };
    if let Some(max) = args.max_parallel {
        config.pipeline.max_parallel_encodes = Some(max as usize);
    }

    init_logging(&config.logging);

    validate_config(&config).context("Configuration validation failed")?;
    log_config(&config);

    let engine = Arc::new(FfmpegEngine::new(config.engine.clone()));
    engine
        .validate()
        .await
        .context("Encoding engine is not usable")?;

    let output_root = args.output_root.clone().unwrap_or_else(default_output_root);
    let pipeline = StreamingPipeline::new(config.pipeline.clone(), engine)
        .context("Failed to build pipeline")?;

    let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_BUFFER_SIZE);
    let reporter = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            log_progress(&event);
        }
    });

    let result = pipeline
        .process_with_progress(&args.input, &output_root, progress_tx)
        .await;
    let _ = reporter.await;

    let package = result.with_context(|| format!("Failed to package {:?}", args.input))?;

    if args.delete_input {
        match tokio::fs::remove_file(&args.input).await {
            Ok(()) => info!("Deleted input {:?}", args.input),
            Err(e) => warn!("Failed to delete input {:?}: {}", args.input, e),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&package)?);
    } else {
        println!("{}", package.manifest_path.display());
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (pretty, json) = match logging.format {
        LogFormat::Pretty => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

fn log_config(config: &Config) {
    let ladder: Vec<String> = config
        .pipeline
        .profiles
        .iter()
        .map(|p| p.to_string())
        .collect();
    info!("Rendition ladder: {}", ladder.join(", "));
    info!("FFmpeg path: {:?}", config.engine.ffmpeg_path);
    match config.pipeline.max_parallel_encodes {
        Some(max) => info!("Max parallel encodes: {}", max),
        None => info!("Max parallel encodes: unbounded"),
    }
}

fn log_progress(event: &PipelineProgress) {
    match event {
        PipelineProgress::Dispatched { renditions, .. } => {
            info!("Encoding {} renditions: {}", renditions.len(), renditions.join(", "));
        }
        PipelineProgress::Encoding {
            rendition, percent, ..
        } => {
            tracing::debug!("{}: {:.1}%", rendition, percent);
        }
        PipelineProgress::RenditionCompleted {
            rendition,
            completed,
            total,
            ..
        } => {
            info!("{} done ({}/{})", rendition, completed, total);
        }
        PipelineProgress::RenditionFailed {
            rendition, error, ..
        } => {
            warn!("{} failed: {}", rendition, error);
        }
        PipelineProgress::Completed { manifest_path, .. } => {
            info!("Master playlist written to {:?}", manifest_path);
        }
        PipelineProgress::Failed { error, .. } => {
            error!("Packaging failed: {}", error);
        }
    }
}

/// `output/<unix millis>`, one directory per invocation.
fn default_output_root() -> PathBuf {
    PathBuf::from("output").join(chrono::Utc::now().timestamp_millis().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_root() {
        let root = default_output_root();
        assert!(root.starts_with("output"));
        let millis: i64 = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .parse()
            .unwrap();
        assert!(millis > 1_600_000_000_000);
    }
}
