use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dengue_forecast::config::AppConfig;
use dengue_forecast::io::write_submission;
use dengue_forecast::ml::split::partition;
use dengue_forecast::ml::{self, PersistedModel, SubmissionTemplate, predict_and_reconcile};
use dengue_forecast::pipeline::{FeaturePipeline, RawData, prepare};
use dengue_forecast::table::column_names;
use dengue_forecast::traits::SystemClock;
use dengue_forecast::{Origin, Submission};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "dengue-forecast")]
#[command(about = "Weekly dengue case forecasting per city")]
struct Args {
    /// Configuration file layered over the defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit on every labeled row and write the submission
    Train {
        /// Score a held-out split before the final fit
        #[arg(long)]
        validate: bool,
    },
    /// Cross-validated grid search over the forest hyperparameters
    Search,
    /// Held-out MAE of the configured hyperparameters
    Evaluate,
    /// Write a submission with a previously saved model
    Predict,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("dengue_forecast=debug");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Train { validate } => run_train(&config, validate),
        Command::Search => run_search(&config),
        Command::Evaluate => run_evaluate(&config),
        Command::Predict => run_predict(&config),
    }
}

fn load_raw(config: &AppConfig) -> Result<RawData> {
    RawData::load(&config.data).context("Failed to read input data")
}

fn run_train(config: &AppConfig, validate: bool) -> Result<()> {
    let raw = load_raw(config)?;
    let prepared = prepare(&raw, config).context("Feature engineering failed")?;

    let hold_out = validate.then(|| config.split.hold_out());
    let result = ml::train_model(&prepared.labeled, &config.model, hold_out, &SystemClock)
        .context("Training failed")?;
    if let Some(mae) = result.validation_mae {
        println!("Validation MAE: {:.4}", mae);
    }

    let submission = predict_and_reconcile(
        &result.persisted.forest,
        &result.persisted.feature_names,
        &prepared.features.frame,
        &prepared.features.encoding,
        &prepared.template,
        &config.features.key_columns(),
    )
    .context("Prediction failed")?;
    save_submission(config, &submission)?;

    if let Some(path) = &config.data.model_path {
        result
            .persisted
            .save(path)
            .with_context(|| format!("Failed to save model to {}", path.display()))?;
    }
    Ok(())
}

fn run_search(config: &AppConfig) -> Result<()> {
    let raw = load_raw(config)?;
    let prepared = prepare(&raw, config).context("Feature engineering failed")?;

    let outcome = ml::search(
        prepared.labeled.features.view(),
        &prepared.labeled.targets,
        &config.search.grid(),
        config.search.folds,
        config.model.random_state,
    )
    .context("Grid search failed")?;

    for candidate in &outcome.results {
        tracing::debug!(
            "{} -> {:.4}",
            candidate.hyperparameters,
            candidate.mean_score
        );
    }
    println!("Best hyperparameters: {}", outcome.best);
    println!("Best score (negative MAE): {:.4}", outcome.best_score);
    Ok(())
}

fn run_evaluate(config: &AppConfig) -> Result<()> {
    let raw = load_raw(config)?;
    let prepared = prepare(&raw, config).context("Feature engineering failed")?;

    let mae = ml::training::validate(&prepared.labeled, &config.model, config.split.hold_out())
        .context("Evaluation failed")?;
    println!("MAE: {:.4}", mae);
    Ok(())
}

fn run_predict(config: &AppConfig) -> Result<()> {
    let path = config
        .data
        .model_path
        .as_ref()
        .context("data.model_path must be set to predict with a saved model")?;
    let model = PersistedModel::load(path)
        .with_context(|| format!("Failed to load model from {}", path.display()))?;
    tracing::info!("{}", model.summary());

    let raw = load_raw(config)?;
    let keys = config.features.key_columns();
    let features = FeaturePipeline::new(config.features.clone())
        .run(&raw.features_train, &raw.features_test)
        .context("Feature engineering failed")?;
    let unlabeled = partition(&features.frame, Origin::Unlabeled)?;
    model
        .check_features(&column_names(&unlabeled))
        .context("Saved model does not match the configured features")?;
    let template =
        SubmissionTemplate::from_table(&raw.submission_format, &keys, &config.split.target_column)?;

    let submission = predict_and_reconcile(
        &model.forest,
        &model.feature_names,
        &features.frame,
        &features.encoding,
        &template,
        &keys,
    )
    .context("Prediction failed")?;
    save_submission(config, &submission)
}

fn save_submission(config: &AppConfig, submission: &Submission) -> Result<()> {
    let path = config.data.submission_path();
    write_submission(&path, submission)
        .with_context(|| format!("Failed to write submission to {}", path.display()))?;
    if !submission.is_complete() {
        tracing::warn!(
            "Submission has {} rows without a prediction",
            submission.unmatched.len()
        );
    }
    Ok(())
}
