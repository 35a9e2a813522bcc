// src/main.rs

use anyhow::{bail, Context};
use clap::Parser;
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use notion2records::config::{Command, CommandLineInput, ModeArg};
use notion2records::output::{load_state, write_state, JsonLinesSink, ProtocolMessage};
use notion2records::{
    ExtractionConfig, ExtractionOrchestrator, NotionHttpClient, RunStatus, SyncMode, SyncState,
};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Sets up logging configuration.
///
/// stdout carries the protocol, so the console appender writes to stderr.
fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_file_path = std::env::temp_dir().join("notion2records.log");
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
    } else {
        "[{l}] {m}{n}"
    };

    let stderr_appender = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}",
        )))
        .build(&log_file_path)?;

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr_appender)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("file", Box::new(file_appender)),
        )
        .build(
            Root::builder()
                .appender("stderr")
                .appender("file")
                .build(log_level),
        )?;

    log4rs::init_config(config)?;
    log::debug!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

fn load_config(input: &CommandLineInput) -> anyhow::Result<ExtractionConfig> {
    let raw = fs::read_to_string(&input.config)
        .with_context(|| format!("Failed to read config file {}", input.config.display()))?;
    ExtractionConfig::from_json(&raw)
        .with_context(|| format!("Invalid configuration in {}", input.config.display()))
}

fn build_orchestrator(config: ExtractionConfig) -> anyhow::Result<ExtractionOrchestrator> {
    let transport =
        NotionHttpClient::new(&config.api_version).context("Failed to build the HTTP client")?;
    Ok(ExtractionOrchestrator::new(config, Arc::new(transport)))
}

async fn run_check(orchestrator: &ExtractionOrchestrator) -> anyhow::Result<()> {
    let status = orchestrator.check().await;
    let succeeded = status.succeeded;
    let mut sink = JsonLinesSink::new(io::stdout().lock());
    sink.write_message(&ProtocolMessage::connection_status(status))?;
    if !succeeded {
        bail!("Connection check failed");
    }
    Ok(())
}

fn run_discover(orchestrator: &ExtractionOrchestrator) -> anyhow::Result<()> {
    let mut sink = JsonLinesSink::new(io::stdout().lock());
    sink.write_message(&ProtocolMessage::catalog(orchestrator.catalog()))?;
    Ok(())
}

async fn run_read(
    orchestrator: &ExtractionOrchestrator,
    mode: SyncMode,
    input_state: SyncState,
    state_out: Option<&Path>,
) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let mut sink = JsonLinesSink::new(io::stdout().lock());

    let report = orchestrator.read(mode, input_state).run(&mut sink).await?;
    sink.into_inner().flush()?;

    let stats = orchestrator.client().stats();
    let governor = orchestrator.client().governor().stats();
    log::info!(
        "Read finished ({}) in {:.1}s: {} records, {} checkpoints, {} calls, {} retries, {} throttled waits",
        report.status,
        start_time.elapsed().as_secs_f64(),
        report.records,
        report.checkpoints,
        stats.calls,
        stats.retries,
        governor.throttled
    );

    if let Some(path) = state_out {
        write_state(path, &report.final_state)
            .with_context(|| format!("Failed to write state to {}", path.display()))?;
    }

    if let RunStatus::Failed { stream, reason } = &report.status {
        bail!("Stream {} failed: {}", stream, reason);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let input = CommandLineInput::parse();

    if let Err(e) = setup_logging(input.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = load_config(&input)?;
    let orchestrator = build_orchestrator(config)?;

    match &input.command {
        Command::Check => run_check(&orchestrator).await,
        Command::Discover => run_discover(&orchestrator),
        Command::Read {
            state,
            state_out,
            mode,
        } => {
            let input_state = match state {
                Some(path) => load_state(path)
                    .with_context(|| format!("Failed to load state from {}", path.display()))?,
                None => SyncState::new(),
            };
            let mode = match mode {
                ModeArg::FullRefresh => SyncMode::FullRefresh,
                ModeArg::Incremental => SyncMode::Incremental,
            };
            run_read(&orchestrator, mode, input_state, state_out.as_deref()).await
        }
    }
}
