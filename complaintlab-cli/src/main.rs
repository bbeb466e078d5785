//! ComplaintLab CLI — ingestion, training and prediction commands.
//!
//! Commands:
//! - `ingest` — download new complaints into the feature store
//! - `train` — run the whole training pipeline in-process
//! - `task <stage>` — run one stage of a run, passing artifacts via handoff files
//! - `predict` — score JSON/Parquet files with the served model
//! - `status` — report the resume point, feature store and served model
//!
//! Logging goes to stderr. `RUST_LOG` sets the filter (default `info`) and
//! `COMPLAINTLAB_LOG_JSON=1` switches to JSON lines.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use complaintlab_core::ingest::config::{DATA_INGESTION_DIR, FEATURE_STORE_DIR};
use complaintlab_core::ingest::metadata::METADATA_FILE_NAME;
use complaintlab_core::ingest::{
    FeatureStore, HttpTransport, IngestionMetadataStore, ThreadSleeper,
};
use complaintlab_core::DataIngestion;
use complaintlab_runner::{
    BaselineEngine, BatchPrediction, BatchPredictionConfig, EnvironmentSettings, ModelResolver,
    PipelineSettings, StageName, TrainingPipeline, TrainingPipelineConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "complaintlab",
    about = "ComplaintLab — consumer complaint dispute model training pipeline"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Path to a TOML settings file. Every field is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `artifact_root` from the settings file.
    #[arg(long, global = true)]
    artifact_root: Option<PathBuf>,

    /// Overrides `pipeline_name` from the settings file.
    #[arg(long, global = true)]
    pipeline_name: Option<String>,
}

#[derive(Args)]
struct WindowArgs {
    /// First day to ingest (YYYY-MM-DD). Ignored once a resume point exists.
    #[arg(long)]
    from: Option<String>,

    /// Last day to ingest (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    to: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download new complaints and append them to the feature store.
    Ingest {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Run ingestion through pushing in one process.
    Train {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Run a single stage of a run.
    Task {
        /// data_ingestion, data_validation, data_transformation, model_trainer,
        /// model_evaluation or model_pusher.
        stage: String,

        /// Run timestamp shared by every task of the run (YYYYmmdd_HHMMSS).
        #[arg(long)]
        run_timestamp: String,

        #[command(flatten)]
        window: WindowArgs,
    },
    /// Score every JSON/Parquet file in a directory with the served model.
    Predict {
        /// Directory holding the files to score.
        #[arg(long)]
        input: PathBuf,

        /// Directory receiving `<name>_prediction.parquet` files.
        #[arg(long, default_value = "predictions")]
        output: PathBuf,
    },
    /// Report resume point, feature store size and served model.
    Status,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.common)?;

    match cli.command {
        Commands::Ingest { window } => {
            apply_window(&mut settings, window);
            run_ingest(&settings)
        }
        Commands::Train { window } => {
            apply_window(&mut settings, window);
            run_train(settings)
        }
        Commands::Task {
            stage,
            run_timestamp,
            window,
        } => {
            apply_window(&mut settings, window);
            run_task(settings, &stage, run_timestamp)
        }
        Commands::Predict { input, output } => run_predict(&settings, input, output),
        Commands::Status => run_status(&settings),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_json = std::env::var("COMPLAINTLAB_LOG_JSON")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_settings(common: &CommonArgs) -> Result<PipelineSettings> {
    let mut settings = match &common.config {
        Some(path) => PipelineSettings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => PipelineSettings::default(),
    };
    if let Some(root) = &common.artifact_root {
        settings.artifact_root = root.clone();
    }
    if let Some(name) = &common.pipeline_name {
        settings.pipeline_name = name.clone();
    }
    settings.validate()?;
    tracing::debug!(?settings, "resolved settings");
    Ok(settings)
}

fn apply_window(settings: &mut PipelineSettings, window: WindowArgs) {
    if window.from.is_some() {
        settings.ingestion.from_date = window.from;
    }
    if window.to.is_some() {
        settings.ingestion.to_date = window.to;
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn transport(settings: &PipelineSettings) -> Result<Arc<HttpTransport>> {
    let timeout = Duration::from_secs(settings.ingestion.request_timeout_secs);
    Ok(Arc::new(HttpTransport::new(timeout)?))
}

fn training_pipeline(
    settings: PipelineSettings,
    config: TrainingPipelineConfig,
) -> Result<TrainingPipeline> {
    let transport = transport(&settings)?;
    Ok(TrainingPipeline::new(
        config,
        settings,
        transport,
        Arc::new(ThreadSleeper),
        Arc::new(BaselineEngine),
        today(),
    ))
}

fn run_ingest(settings: &PipelineSettings) -> Result<()> {
    let pipeline = TrainingPipelineConfig::now(settings);
    let config = pipeline.data_ingestion_config(settings, today())?;
    println!(
        "Ingesting {} .. {} into {}",
        config.from_date,
        config.to_date,
        config.feature_store_path().display()
    );

    let mut ingestion = DataIngestion::new(config, transport(settings)?, Arc::new(ThreadSleeper));
    let artifact = ingestion.run()?;

    let failed = ingestion.failed_downloads();
    if !failed.is_empty() {
        println!("{} window(s) gave up after retries:", failed.len());
        for request in failed {
            println!("  {}", request.url);
        }
    }
    println!("{}", serde_json::to_string_pretty(&artifact)?);
    Ok(())
}

fn run_train(settings: PipelineSettings) -> Result<()> {
    let config = TrainingPipelineConfig::now(&settings);
    println!("Run {} under {}", config.run_timestamp, config.artifact_dir().display());

    let outcome = training_pipeline(settings, config)?.start()?;

    let trainer = &outcome.trainer;
    println!(
        "Train f1 {:.4}  test f1 {:.4}",
        trainer.train_metrics.f1_score, trainer.test_metrics.f1_score
    );
    let evaluation = &outcome.evaluation;
    match evaluation.best_model_score {
        Some(best) => println!(
            "Trained {:.4} vs served {:.4} ({:+.4})",
            evaluation.trained_model_score, best, evaluation.improved_accuracy
        ),
        None => println!(
            "Trained {:.4}, no served model yet",
            evaluation.trained_model_score
        ),
    }
    match &outcome.pusher {
        Some(pusher) => println!("Pushed to {}", pusher.saved_model_dir.display()),
        None => println!("Model rejected, nothing pushed"),
    }
    Ok(())
}

fn run_task(settings: PipelineSettings, stage: &str, run_timestamp: String) -> Result<()> {
    let Some(stage) = StageName::parse(stage) else {
        bail!("unknown stage '{stage}'");
    };
    if !StageName::TRAINING.contains(&stage) {
        bail!("'{stage}' is not a training task; use `complaintlab predict`");
    }
    let config = TrainingPipelineConfig::new(
        settings.pipeline_name.clone(),
        run_timestamp,
        settings.artifact_root.clone(),
    );
    match training_pipeline(settings, config)?.run_task(stage)? {
        Some(path) => println!("{stage}: artifact at {}", path.display()),
        None => println!("{stage}: skipped"),
    }
    Ok(())
}

fn run_predict(settings: &PipelineSettings, input: PathBuf, output: PathBuf) -> Result<()> {
    let pipeline = TrainingPipelineConfig::now(settings);
    let config = BatchPredictionConfig::new(&pipeline, settings.schema.clone(), input, output);
    let written = BatchPrediction::new(config).start_prediction()?;
    for path in &written {
        println!("{}", path.display());
    }
    println!("{} file(s) scored", written.len());
    Ok(())
}

fn run_status(settings: &PipelineSettings) -> Result<()> {
    let pipeline = TrainingPipelineConfig::now(settings);
    let ingestion_dir = pipeline.pipeline_dir().join(DATA_INGESTION_DIR);

    let store = IngestionMetadataStore::new(ingestion_dir.join(METADATA_FILE_NAME));
    if store.exists() {
        let record = store.read()?;
        println!(
            "Resume point: {} (last window {} .. {}, written {})",
            record.to_date, record.from_date, record.to_date, record.written_at
        );
    } else {
        println!("Resume point: none, next run starts at the configured from_date");
    }

    let feature_store = FeatureStore::new(
        ingestion_dir
            .join(FEATURE_STORE_DIR)
            .join(&settings.ingestion.file_name),
    );
    println!(
        "Feature store: {} part(s) at {}",
        feature_store.part_count()?,
        feature_store.path().display()
    );

    match ModelResolver::new(pipeline.saved_models_dir()).latest_model_path()? {
        Some(path) => println!("Served model: {}", path.display()),
        None => println!("Served model: none"),
    }

    let env = EnvironmentSettings::from_env();
    let show = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
    println!("MONGO_DB_URL: {}", show(&env.mongo_db_url));
    println!("BUCKET_NAME: {}", env.bucket_name.as_deref().unwrap_or("unset"));
    Ok(())
}
