//! Offline dropout-risk classifier training.
//!
//! Reads a feature CSV, fits the preprocessing pipeline and a random forest
//! on a seeded 80/20 split, reports test metrics and writes the fitted
//! artifacts as JSON next to "latest" pointers.

pub mod dataset;
pub mod evaluate;
pub mod forest;
pub mod preprocess;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use dataset::Dataset;
use evaluate::Evaluation;
use forest::{ForestParams, RandomForest};
use preprocess::Preprocessor;

pub const LATEST_PREPROCESSOR: &str = "preprocessor.json";
pub const LATEST_MODEL: &str = "random_forest_model.json";
pub const RISK_CLASSES: usize = 3;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("required column {0} not found in dataset")]
    MissingColumn(String),
    #[error("row {row}: invalid value {value:?} in column {column}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("row {row}: risk_level must be 0, 1 or 2, got {value:?}")]
    InvalidLabel { row: usize, value: String },
    #[error("not enough rows to train: {0}")]
    NotEnoughRows(usize),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type TrainerResult<T> = Result<T, TrainerError>;

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub trees: usize,
    pub max_depth: usize,
    pub seed: u64,
    pub test_fraction: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            trees: 100,
            max_depth: 10,
            seed: 42,
            test_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SavedArtifacts {
    pub preprocessor: PathBuf,
    pub model: PathBuf,
    pub latest_preprocessor: PathBuf,
    pub latest_model: PathBuf,
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub train_rows: usize,
    pub test_rows: usize,
    pub evaluation: Evaluation,
    pub artifacts: SavedArtifacts,
}

pub fn train(data: &Path, models_dir: &Path, options: &TrainingOptions) -> TrainerResult<TrainingOutcome> {
    let dataset = Dataset::load_csv(data)?;
    info!(rows = dataset.len(), path = %data.display(), "loaded training data");

    let (train_set, test_set) = dataset.split(options.test_fraction, options.seed);
    if train_set.is_empty() || test_set.is_empty() {
        return Err(TrainerError::NotEnoughRows(dataset.len()));
    }

    let preprocessor = Preprocessor::fit(&train_set.rows);
    let x_train = preprocessor.transform(&train_set.rows);
    let x_test = preprocessor.transform(&test_set.rows);
    info!(
        features = preprocessor.output_width(),
        train = train_set.len(),
        test = test_set.len(),
        "fitted preprocessor"
    );

    let params = ForestParams {
        trees: options.trees,
        max_depth: options.max_depth,
        seed: options.seed,
    };
    let forest = RandomForest::fit(&x_train, &train_set.labels, RISK_CLASSES, &params)?;
    info!(trees = forest.tree_count(), "trained random forest");

    let predicted: Vec<usize> = x_test.iter().map(|row| forest.predict(row)).collect();
    let evaluation = evaluate::evaluate(&test_set.labels, &predicted, RISK_CLASSES);
    info!(accuracy = evaluation.accuracy, "evaluated on held-out split");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let artifacts = save_artifacts(models_dir, &preprocessor, &forest, &timestamp)?;

    Ok(TrainingOutcome {
        train_rows: train_set.len(),
        test_rows: test_set.len(),
        evaluation,
        artifacts,
    })
}

pub fn save_artifacts(
    models_dir: &Path,
    preprocessor: &Preprocessor,
    forest: &RandomForest,
    timestamp: &str,
) -> TrainerResult<SavedArtifacts> {
    fs::create_dir_all(models_dir)?;

    let preprocessor_path = models_dir.join(format!("preprocessor_{timestamp}.json"));
    write_json(&preprocessor_path, preprocessor)?;
    let model_path = models_dir.join(format!("rf_model_{timestamp}.json"));
    write_json(&model_path, forest)?;

    let latest_preprocessor = models_dir.join(LATEST_PREPROCESSOR);
    point_latest(&preprocessor_path, &latest_preprocessor)?;
    let latest_model = models_dir.join(LATEST_MODEL);
    point_latest(&model_path, &latest_model)?;

    info!(model = %model_path.display(), "saved model artifacts");
    Ok(SavedArtifacts {
        preprocessor: preprocessor_path,
        model: model_path,
        latest_preprocessor,
        latest_model,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> TrainerResult<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer(io::BufWriter::new(file), value)?;
    Ok(())
}

/// Replaces `link` with a relative symlink to `target`, or a copy where
/// symlinks are unavailable.
fn point_latest(target: &Path, link: &Path) -> io::Result<()> {
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)?;
    }

    #[cfg(unix)]
    {
        if let Some(name) = target.file_name() {
            match std::os::unix::fs::symlink(name, link) {
                Ok(()) => return Ok(()),
                Err(e) => warn!("symlink {} failed, copying instead: {e}", link.display()),
            }
        }
    }

    fs::copy(target, link).map(|_| ())
}
