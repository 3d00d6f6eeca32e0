//! End-to-end training run: extract, split, scale, train, test, persist.

use crate::artifacts::{ArtifactStore, PipelineArtifact};
use crate::data::{ExtractionReport, Extractor, FeatureColumn, SheetSchema, train_test_split};
use crate::error::MlError;
use crate::features::StandardScaler;
use crate::training::{FitFailure, ModelBank, RegressionMetrics};
use serde::Serialize;
use slopefos_core::{AppConfig, ModelId};
use std::path::PathBuf;
use std::time::Instant;

/// Held-out scores of one promoted model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestedModel {
    pub model: ModelId,
    pub metrics: RegressionMetrics,
}

/// What a pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub feature_columns: Vec<FeatureColumn>,
    pub models_trained: Vec<ModelId>,
    pub failures: Vec<FitFailure>,
    /// Sorted by test R², best first.
    pub tested: Vec<TestedModel>,
    pub extraction: ExtractionReport,
    pub artifact_dir: PathBuf,
}

/// Run the whole training pipeline described by `config`.
pub fn run_pipeline(config: &AppConfig) -> Result<PipelineSummary, MlError> {
    let started = Instant::now();

    tracing::info!(path = %config.data.path.display(), "Step 1: extracting dataset");
    let extraction = Extractor::new(SheetSchema::default()).extract_file(&config.data.path)?;
    let dataset = extraction.dataset;
    if dataset.is_empty() {
        return Err(MlError::DatasetEmpty {
            path: config.data.path.clone(),
        });
    }
    if let Some(summary) = dataset.summary() {
        tracing::info!(
            samples = summary.samples,
            fos_min = summary.fos_min,
            fos_max = summary.fos_max,
            pre_monsoon = summary.pre_monsoon,
            post_monsoon = summary.post_monsoon,
            ru_applied = summary.ru_applied,
            "Dataset extracted"
        );
    }
    let x = dataset.features(config.data.include_ru);
    let y = dataset.targets();

    tracing::info!(
        test_fraction = config.split.test_fraction,
        seed = config.split.seed,
        "Step 2: splitting"
    );
    let split = train_test_split(&x, &y, config.split.test_fraction, config.split.seed)?;
    let scaler = StandardScaler::fit(&split.x_train)?;
    let x_train = scaler.transform(&split.x_train)?;
    let x_test = scaler.transform(&split.x_test)?;
    tracing::info!(
        train = split.y_train.len(),
        test = split.y_test.len(),
        features = scaler.n_features(),
        "Split and scaled"
    );

    tracing::info!("Step 3: training roster");
    let bank = ModelBank::from_config(&config.training.roster);
    let run = bank.train_all(&x_train, &split.y_train);
    if run.leaderboard.is_empty() {
        return Err(MlError::training("every roster model failed to train"));
    }

    let selected = run.leaderboard.select(&config.training.selection);
    tracing::info!(
        policy = %config.training.selection,
        selected = ?selected,
        "Step 4: testing promoted models"
    );
    let tested = ModelBank::test_selected(&run.leaderboard, &x_test, &split.y_test, &selected)?;

    tracing::info!(dir = %config.artifacts.dir.display(), "Step 5: saving artifacts");
    let store = ArtifactStore::new(&config.artifacts.dir);
    store.save(&PipelineArtifact {
        scaler: &scaler,
        training: &run,
        tested: &tested,
        selection: &config.training.selection,
        dataset: dataset.summary(),
    })?;

    let mut ranked: Vec<TestedModel> = tested
        .iter()
        .map(|t| TestedModel {
            model: t.id,
            metrics: t.metrics,
        })
        .collect();
    ranked.sort_by(|a, b| b.metrics.r2.total_cmp(&a.metrics.r2));

    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Pipeline completed"
    );
    Ok(PipelineSummary {
        samples: dataset.len(),
        train_samples: split.y_train.len(),
        test_samples: split.y_test.len(),
        feature_columns: scaler.columns().to_vec(),
        models_trained: run.leaderboard.entries().iter().map(|e| e.id).collect(),
        failures: run.failures,
        tested: ranked,
        extraction: extraction.report,
        artifact_dir: config.artifacts.dir.clone(),
    })
}
