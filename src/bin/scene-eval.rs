//! CLI for inspecting, running and evaluating acoustic scene models.

#![allow(clippy::print_stdout)] // CLI tool needs stdout
#![allow(clippy::print_stderr)] // CLI tool needs stderr

use clap::{Parser, Subcommand};
use scene_eval::{
    BatchRunner, EvaluationOrchestrator, InferenceEngine, ModelRegistry, Result, init_runtime,
    write_batch_csv,
};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Load, run and evaluate acoustic scene classification models.
#[derive(Parser, Debug)]
#[command(name = "scene-eval", version)]
#[command(about = "Load, run and evaluate acoustic scene classification models")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a model artifact and print its metadata
    Inspect {
        /// Checkpoint (.json) or compiled module (.onnx)
        model: PathBuf,
    },
    /// Predict the scene class of one or more audio files
    Predict {
        /// Checkpoint (.json) or compiled module (.onnx)
        #[arg(short, long)]
        model: PathBuf,

        /// Audio files (wav, mp3, m4a, flac)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Also write the results as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Evaluate a model on a zip archive with one folder per class
    Evaluate {
        /// Checkpoint (.json) or compiled module (.onnx)
        #[arg(short, long)]
        model: PathBuf,

        /// Dataset archive
        archive: PathBuf,

        /// Directory for the extraction workspace (default: system temp dir)
        #[arg(long)]
        temp_dir: Option<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_model(path: &Path) -> Result<Arc<ModelRegistry>> {
    init_runtime()?;
    let registry = Arc::new(ModelRegistry::new());
    let start = Instant::now();
    registry.load_file(path)?;
    tracing::info!(
        model = %path.display(),
        elapsed_ms = start.elapsed().as_millis(),
        "model ready"
    );
    Ok(registry)
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Inspect { model } => {
            let registry = load_model(&model)?;
            print_json(&registry.metadata())
        }
        Command::Predict { model, files, csv } => {
            let registry = load_model(&model)?;
            let runner = BatchRunner::new(InferenceEngine::new(registry));
            let results = runner.run_paths(&files);
            if let Some(path) = csv {
                write_batch_csv(File::create(&path)?, &results)?;
                tracing::info!(csv = %path.display(), "results written");
            }
            print_json(&results)
        }
        Command::Evaluate {
            model,
            archive,
            temp_dir,
        } => {
            let registry = load_model(&model)?;
            let mut builder = EvaluationOrchestrator::builder(registry);
            if let Some(dir) = temp_dir {
                builder = builder.workspace_root(dir);
            }
            let start = Instant::now();
            let report = builder.build().evaluate_file(&archive)?;
            tracing::info!(elapsed_ms = start.elapsed().as_millis(), "evaluation finished");
            print_json(&report)
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging();

    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_evaluate_accepts_temp_dir() {
        let args = Args::try_parse_from([
            "scene-eval",
            "evaluate",
            "--model",
            "model.json",
            "data.zip",
            "--temp-dir",
            "/scratch",
        ])
        .unwrap();
        match args.command {
            Command::Evaluate { temp_dir, .. } => {
                assert_eq!(temp_dir, Some(PathBuf::from("/scratch")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_predict_rejects_temp_dir() {
        let result = Args::try_parse_from([
            "scene-eval",
            "predict",
            "--model",
            "model.json",
            "a.wav",
            "--temp-dir",
            "/scratch",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_predict_requires_files() {
        assert!(Args::try_parse_from(["scene-eval", "predict", "-m", "model.json"]).is_err());
    }
}
