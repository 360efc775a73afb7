//! Replays a recorded JSON-lines hand-landmark log through the workbench.
//!
//! With `--record LABEL` the frames become samples for LABEL; otherwise the
//! frames are recognized and confirmed symbols are written to stdout.

use anyhow::{bail, Context};
use gesture_scribe::capture::{FrameSource, JsonLinesReplay};
use gesture_scribe::recognition::WriterSink;
use gesture_scribe::storage::JsonFileRepository;
use gesture_scribe::training::{SoftmaxBackend, TrainingEvent};
use gesture_scribe::{AppConfig, Workbench};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() {
    gesture_scribe::init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };

    let mut config = match &options.config_path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(dir) = &options.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }

    let repository = Arc::new(JsonFileRepository::new(config.storage.data_dir()));
    let sink = WriterSink::new(std::io::stdout());
    let mut workbench = Workbench::new(config, Arc::new(SoftmaxBackend::new()), repository, sink)
        .context("Invalid configuration")?;

    // Carrying on with an empty store would overwrite the unreadable file
    let restored = workbench.restore().with_context(|| {
        format!(
            "Could not restore samples from {}",
            workbench.config().storage.data_dir().display()
        )
    })?;
    if !restored {
        tracing::info!("No stored samples, starting empty");
    }

    if let Some(label) = &options.record_label {
        if !workbench.store().contains(label) {
            workbench.add_label(label)?;
        }
        let captured = replay(&mut workbench, &options, Mode::Record(label))?;
        eprintln!("Recorded {captured} samples for '{label}'");
    }

    if options.train {
        train(&mut workbench).await?;
        if let Some(path) = &options.model_path {
            workbench.save_model(path)?;
        }
    } else if let Some(path) = &options.model_path {
        workbench
            .load_model(path)
            .with_context(|| format!("Failed to load model {}", path.display()))?;
    }

    if options.record_label.is_none() {
        workbench
            .start_recognition()
            .context("Train a model (--train) or load one (--model) first")?;
        let emitted = replay(&mut workbench, &options, Mode::Recognize)?;
        println!();
        eprintln!("Recognized {emitted} symbols");
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Mode<'a> {
    Record(&'a str),
    Recognize,
}

/// Feed every frame of the log; returns samples captured or symbols emitted
fn replay(
    workbench: &mut Workbench<WriterSink<std::io::Stdout>>,
    options: &Options,
    mode: Mode<'_>,
) -> anyhow::Result<usize> {
    let mut source = JsonLinesReplay::open(&options.frames_path)
        .with_context(|| format!("Failed to open {}", options.frames_path.display()))?;

    // Frame timestamps are offsets from the start of the capture
    let base = Instant::now();
    let mut count = 0usize;
    let mut armed = false;
    while let Some(frame) = source.next_frame() {
        let frame = frame?;
        let now = base + Duration::from_millis(frame.t_ms);
        let report = workbench.process_frame(frame.frame, now);

        match mode {
            Mode::Record(label) => {
                if !armed && report.hand_present {
                    workbench.start_held_recording(label, now)?;
                    armed = true;
                }
            }
            Mode::Recognize => count += usize::from(report.symbol.is_some()),
        }
    }

    if let Some(summary) = workbench.stop_recording() {
        count = summary.captured;
    }
    Ok(count)
}

async fn train(workbench: &mut Workbench<WriterSink<std::io::Stdout>>) -> anyhow::Result<()> {
    let mut run = workbench.start_training()?;
    while let Some(event) = run.next_event().await {
        match event {
            TrainingEvent::Epoch(progress) => eprintln!(
                "epoch {}/{} loss {:.4} acc {:.3} val {}",
                progress.epoch_index + 1,
                progress.total_epochs,
                progress.loss.unwrap_or(f32::NAN),
                progress.training_accuracy.unwrap_or(f32::NAN),
                progress
                    .validation_accuracy
                    .map(|v| format!("{v:.3}"))
                    .unwrap_or_else(|| "-".to_string())
            ),
            TrainingEvent::Completed(summary) => eprintln!(
                "Trained on {} examples across {} labels",
                summary.example_count,
                summary.labels.len()
            ),
            TrainingEvent::Failed { message } => eprintln!("Training failed: {message}"),
        }
    }
    run.finish().await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Options {
    config_path: Option<PathBuf>,
    frames_path: PathBuf,
    data_dir: Option<PathBuf>,
    model_path: Option<PathBuf>,
    record_label: Option<String>,
    train: bool,
}

fn parse_args(args: Vec<String>) -> anyhow::Result<Option<Options>> {
    let mut config_path = None;
    let mut frames_path = None;
    let mut data_dir = None;
    let mut model_path = None;
    let mut record_label = None;
    let mut train = false;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                config_path = Some(PathBuf::from(value_of(&args, idx, "--config")?));
            }
            "--frames" => {
                idx += 1;
                frames_path = Some(PathBuf::from(value_of(&args, idx, "--frames")?));
            }
            "--data-dir" => {
                idx += 1;
                data_dir = Some(PathBuf::from(value_of(&args, idx, "--data-dir")?));
            }
            "--model" => {
                idx += 1;
                model_path = Some(PathBuf::from(value_of(&args, idx, "--model")?));
            }
            "--record" => {
                idx += 1;
                record_label = Some(value_of(&args, idx, "--record")?.to_string());
            }
            "--train" => train = true,
            unknown => bail!("Unknown argument: {unknown}\n\n{}", help_text()),
        }
        idx += 1;
    }

    let Some(frames_path) = frames_path else {
        bail!("--frames is required\n\n{}", help_text());
    };
    Ok(Some(Options {
        config_path,
        frames_path,
        data_dir,
        model_path,
        record_label,
        train,
    }))
}

fn value_of<'a>(args: &'a [String], idx: usize, flag: &str) -> anyhow::Result<&'a str> {
    match args.get(idx) {
        Some(value) => Ok(value.as_str()),
        None => bail!("{flag} requires a value"),
    }
}

fn help_text() -> &'static str {
    "gesture-scribe

Usage:
  gesture-scribe --frames <frames.jsonl> [options]

Options:
  --frames <path>    JSON-lines frame log, one {\"tMs\", \"hands\"} object per line
  --config <path>    JSON configuration file
  --data-dir <path>  Sample directory (overrides storage.dataDir)
  --record <label>   Record the frames as samples for <label> instead of recognizing
  --train            Train a classifier on the stored samples
  --model <path>     Model bundle to save after --train, or to load otherwise
  -h, --help         Show this help"
}
