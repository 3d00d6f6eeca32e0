//! The artifact directory: trained models, tables, and their manifest.
//!
//! A save builds the complete artifact set in a staging directory and swaps
//! it into place, so readers see either the previous set or the new one.
//! `manifest.json` records a SHA-256 for every other file and is checked on
//! every load.

use super::tables::{metrics_table, predictions_table};
use crate::algorithms::TrainedModel;
use crate::data::{DatasetSummary, FeatureColumn};
use crate::error::MlError;
use crate::features::StandardScaler;
use crate::training::{ComparisonRow, FitFailure, RegressionMetrics, TestResult, TrainingRun};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use slopefos_core::persistence::{StagedDir, load_json, sha256_hex};
use slopefos_core::{ModelId, SelectionPolicy};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const SUMMARY_FILE: &str = "results_summary.json";
pub const TRAINING_RESULTS_FILE: &str = "training_results.csv";
pub const TEST_RESULTS_FILE: &str = "test_results.csv";

pub fn model_file(id: ModelId) -> String {
    format!("model_{}.json", id.slug())
}

pub fn promoted_model_file(id: ModelId) -> String {
    format!("best_model_{}.json", id.slug())
}

pub fn predictions_file(id: ModelId) -> String {
    format!("test_predictions_{}.csv", id.slug())
}

/// Everything one pipeline run persists.
pub struct PipelineArtifact<'a> {
    pub scaler: &'a StandardScaler,
    pub training: &'a TrainingRun,
    pub tested: &'a [TestResult],
    pub selection: &'a SelectionPolicy,
    pub dataset: Option<DatasetSummary>,
}

/// Training and held-out scores of a promoted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotedRecord {
    pub model: ModelId,
    pub training: RegressionMetrics,
    pub test: RegressionMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub feature_columns: Vec<FeatureColumn>,
    pub trained: Vec<ModelId>,
    pub promoted: Vec<PromotedRecord>,
    /// File name to hex SHA-256.
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub predictions: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub predictions: Vec<f64>,
    pub actual: Vec<f64>,
}

/// Contents of `results_summary.json`, keyed by model display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub created_at: DateTime<Utc>,
    pub selection_policy: SelectionPolicy,
    pub feature_columns: Vec<FeatureColumn>,
    pub training_results: BTreeMap<String, TrainingSummary>,
    pub test_models: Vec<String>,
    pub test_results: BTreeMap<String, TestSummary>,
    pub failures: Vec<FitFailure>,
    pub comparison: Vec<ComparisonRow>,
    pub dataset: Option<DatasetSummary>,
}

/// A promoted model ready to serve.
#[derive(Debug, Clone)]
pub struct PromotedModel {
    pub id: ModelId,
    pub model: TrainedModel,
    pub training: RegressionMetrics,
    pub test: RegressionMetrics,
}

/// What the prediction service loads.
#[derive(Debug, Clone)]
pub struct ServingBundle {
    pub manifest: ArtifactManifest,
    pub scaler: StandardScaler,
    pub models: Vec<PromotedModel>,
}

/// Collects files in the staging directory with their checksums.
struct StagingWriter<'a> {
    dir: &'a Path,
    files: BTreeMap<String, String>,
}

impl StagingWriter<'_> {
    fn write(&mut self, name: String, bytes: &[u8]) -> Result<(), MlError> {
        std::fs::write(self.dir.join(&name), bytes)?;
        self.files.insert(name, sha256_hex(bytes));
        Ok(())
    }

    fn write_json<T: Serialize>(&mut self, name: String, value: &T) -> Result<(), MlError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write(name, &bytes)
    }
}

/// Reads and writes the artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replace the artifact directory with the results of one run.
    pub fn save(&self, artifact: &PipelineArtifact<'_>) -> Result<ArtifactManifest, MlError> {
        let created_at = Utc::now();
        let staged = StagedDir::create(&self.dir)?;
        let mut writer = StagingWriter {
            dir: staged.path(),
            files: BTreeMap::new(),
        };
        let leaderboard = &artifact.training.leaderboard;

        writer.write_json(SCALER_FILE.to_string(), artifact.scaler)?;
        for entry in leaderboard.entries() {
            writer.write_json(model_file(entry.id), &entry.model)?;
        }

        let mut promoted = Vec::with_capacity(artifact.tested.len());
        for test in artifact.tested {
            let entry = leaderboard.get(test.id).ok_or_else(|| {
                MlError::artifact(format!("tested model {} has no training result", test.id))
            })?;
            writer.write_json(promoted_model_file(test.id), &entry.model)?;
            writer.write(
                predictions_file(test.id),
                predictions_table(&test.rows).as_bytes(),
            )?;
            promoted.push(PromotedRecord {
                model: test.id,
                training: entry.metrics,
                test: test.metrics,
            });
        }

        let training_rows: Vec<(ModelId, RegressionMetrics)> = leaderboard
            .entries()
            .iter()
            .map(|e| (e.id, e.metrics))
            .collect();
        writer.write(
            TRAINING_RESULTS_FILE.to_string(),
            metrics_table(&training_rows).as_bytes(),
        )?;
        let test_rows: Vec<(ModelId, RegressionMetrics)> =
            artifact.tested.iter().map(|t| (t.id, t.metrics)).collect();
        writer.write(
            TEST_RESULTS_FILE.to_string(),
            metrics_table(&test_rows).as_bytes(),
        )?;

        let tested_ids: Vec<ModelId> = artifact.tested.iter().map(|t| t.id).collect();
        let summary = ResultsSummary {
            created_at,
            selection_policy: artifact.selection.clone(),
            feature_columns: artifact.scaler.columns().to_vec(),
            training_results: leaderboard
                .entries()
                .iter()
                .map(|e| {
                    (
                        e.id.display_name().to_string(),
                        TrainingSummary {
                            r2: e.metrics.r2,
                            rmse: e.metrics.rmse,
                            mae: e.metrics.mae,
                            predictions: e.predictions.clone(),
                        },
                    )
                })
                .collect(),
            test_models: tested_ids
                .iter()
                .map(|id| id.display_name().to_string())
                .collect(),
            test_results: artifact
                .tested
                .iter()
                .map(|t| {
                    (
                        t.id.display_name().to_string(),
                        TestSummary {
                            r2: t.metrics.r2,
                            rmse: t.metrics.rmse,
                            mae: t.metrics.mae,
                            predictions: t.rows.iter().map(|r| r.predicted).collect(),
                            actual: t.rows.iter().map(|r| r.actual).collect(),
                        },
                    )
                })
                .collect(),
            failures: artifact.training.failures.clone(),
            comparison: leaderboard.comparison_rows(&tested_ids),
            dataset: artifact.dataset.clone(),
        };
        writer.write_json(SUMMARY_FILE.to_string(), &summary)?;

        let manifest = ArtifactManifest {
            format_version: FORMAT_VERSION,
            created_at,
            feature_columns: artifact.scaler.columns().to_vec(),
            trained: leaderboard.entries().iter().map(|e| e.id).collect(),
            promoted,
            files: writer.files,
        };
        std::fs::write(
            staged.path().join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
        staged.commit()?;

        tracing::info!(
            dir = %self.dir.display(),
            trained = manifest.trained.len(),
            promoted = manifest.promoted.len(),
            "Saved artifacts"
        );
        Ok(manifest)
    }

    pub fn load_manifest(&self) -> Result<ArtifactManifest, MlError> {
        let path = self.dir.join(MANIFEST_FILE);
        let manifest: ArtifactManifest = load_json(&path)?.ok_or_else(|| {
            MlError::missing(format!("no artifact manifest at {}", path.display()))
        })?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(MlError::UnsupportedFormat {
                found: manifest.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(manifest)
    }

    /// Check every file listed in the manifest against its checksum.
    pub fn verify(&self, manifest: &ArtifactManifest) -> Result<(), MlError> {
        for name in manifest.files.keys() {
            self.read_verified(manifest, name)?;
        }
        Ok(())
    }

    fn read_verified(&self, manifest: &ArtifactManifest, name: &str) -> Result<Vec<u8>, MlError> {
        let expected = manifest
            .files
            .get(name)
            .ok_or_else(|| MlError::artifact(format!("{name} is not listed in the manifest")))?;
        let path = self.dir.join(name);
        let bytes = std::fs::read(&path).map_err(|e| {
            MlError::artifact(format!("failed to read {}: {e}", path.display()))
        })?;
        if &sha256_hex(&bytes) != expected {
            return Err(MlError::ChecksumMismatch {
                file: name.to_string(),
            });
        }
        Ok(bytes)
    }

    fn read_json<T: DeserializeOwned>(
        &self,
        manifest: &ArtifactManifest,
        name: &str,
    ) -> Result<T, MlError> {
        let bytes = self.read_verified(manifest, name)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn load_scaler(&self, manifest: &ArtifactManifest) -> Result<StandardScaler, MlError> {
        self.read_json(manifest, SCALER_FILE)
    }

    /// A trained (not necessarily promoted) model.
    pub fn load_model(
        &self,
        manifest: &ArtifactManifest,
        id: ModelId,
    ) -> Result<TrainedModel, MlError> {
        self.read_json(manifest, &model_file(id))
    }

    pub fn load_summary(&self, manifest: &ArtifactManifest) -> Result<ResultsSummary, MlError> {
        self.read_json(manifest, SUMMARY_FILE)
    }

    /// The scaler and the requested promoted models.
    pub fn load_promoted(&self, ids: &[ModelId]) -> Result<ServingBundle, MlError> {
        let manifest = self.load_manifest()?;
        let scaler = self.load_scaler(&manifest)?;
        let mut models = Vec::with_capacity(ids.len());
        for &id in ids {
            let record = manifest
                .promoted
                .iter()
                .find(|r| r.model == id)
                .ok_or_else(|| MlError::missing(format!("{id} was not promoted")))?;
            let model = self.read_json(&manifest, &promoted_model_file(id))?;
            models.push(PromotedModel {
                id,
                model,
                training: record.training,
                test: record.test,
            });
        }
        Ok(ServingBundle {
            manifest,
            scaler,
            models,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{ModelSpec, Regressor};
    use crate::data::FeatureMatrix;
    use crate::training::{ModelBank, RosterEntry};
    use ndarray::{Array1, Array2};
    use pretty_assertions::assert_eq;
    use slopefos_core::config::{ForestParams, GbParams, XgbParams};
    use tempfile::TempDir;

    struct Fixture {
        scaler: StandardScaler,
        run: TrainingRun,
        tested: Vec<TestResult>,
        x: Array2<f64>,
    }

    fn fixture() -> Fixture {
        let values = Array2::from_shape_fn((30, 4), |(i, j)| {
            ((i * (j + 2) + 3 * j) % 13) as f64 + if j == 3 { 0.0 } else { 10.0 }
        });
        let x = FeatureMatrix::new(FeatureColumn::columns(true), values).unwrap();
        let y: Array1<f64> = x
            .values()
            .rows()
            .into_iter()
            .map(|r| 0.5 + 0.05 * r[0] + 0.02 * r[1])
            .collect();
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();
        let bank = ModelBank::new(vec![
            RosterEntry {
                id: ModelId::RandomForest,
                spec: ModelSpec::RandomForest(ForestParams {
                    n_estimators: 5,
                    ..ForestParams::default()
                }),
            },
            RosterEntry {
                id: ModelId::XgBoost,
                spec: ModelSpec::XgBoost(XgbParams {
                    n_estimators: 10,
                    ..XgbParams::default()
                }),
            },
            RosterEntry {
                id: ModelId::GradientBoosting,
                spec: ModelSpec::GradientBoosting(GbParams {
                    n_estimators: 10,
                    ..GbParams::default()
                }),
            },
        ]);
        let run = bank.train_all(&scaled, &y);
        let tested = ModelBank::test_selected(
            &run.leaderboard,
            &scaled,
            &y,
            &[ModelId::GradientBoosting, ModelId::XgBoost],
        )
        .unwrap();
        Fixture {
            scaler,
            run,
            tested,
            x: scaled,
        }
    }

    fn save(store: &ArtifactStore, f: &Fixture) -> ArtifactManifest {
        store
            .save(&PipelineArtifact {
                scaler: &f.scaler,
                training: &f.run,
                tested: &f.tested,
                selection: &SelectionPolicy::default(),
                dataset: None,
            })
            .unwrap()
    }

    #[test]
    fn test_save_writes_expected_files() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        let f = fixture();
        let manifest = save(&store, &f);

        for name in [
            "scaler.json",
            "model_random_forest.json",
            "model_xgboost.json",
            "model_gradient_boosting.json",
            "best_model_gradient_boosting.json",
            "best_model_xgboost.json",
            "training_results.csv",
            "test_results.csv",
            "test_predictions_gradient_boosting.csv",
            "test_predictions_xgboost.csv",
            "results_summary.json",
        ] {
            assert!(manifest.files.contains_key(name), "missing {name}");
            assert!(store.dir().join(name).exists());
        }
        assert!(!manifest.files.contains_key("best_model_random_forest.json"));
        assert!(store.dir().join(MANIFEST_FILE).exists());
        assert_eq!(manifest.trained.len(), 3);

        let training = std::fs::read_to_string(store.dir().join(TRAINING_RESULTS_FILE)).unwrap();
        assert_eq!(training.lines().count(), 4);

        // nothing but the artifact directory itself is left next to it
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_roundtrip_promoted_models_predict_identically() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        let f = fixture();
        save(&store, &f);

        let bundle = store
            .load_promoted(&[ModelId::GradientBoosting, ModelId::XgBoost])
            .unwrap();
        assert_eq!(bundle.scaler, f.scaler);
        assert_eq!(bundle.models.len(), 2);
        for model in &bundle.models {
            let original = f.run.leaderboard.get(model.id).unwrap();
            assert_eq!(
                model.model.predict(&f.x).unwrap(),
                original.model.predict(&f.x).unwrap()
            );
            assert_eq!(model.training, original.metrics);
        }
        store.verify(&bundle.manifest).unwrap();

        let summary = store.load_summary(&bundle.manifest).unwrap();
        assert_eq!(summary.test_models, vec!["Gradient Boosting", "XGBoost"]);
        assert_eq!(summary.training_results.len(), 3);
        assert_eq!(summary.comparison.iter().filter(|r| r.is_promoted).count(), 2);
    }

    #[test]
    fn test_tampered_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        save(&store, &fixture());

        std::fs::write(store.dir().join(SCALER_FILE), "{}").unwrap();
        let err = store.load_promoted(&[ModelId::XgBoost]).unwrap_err();
        assert!(
            matches!(&err, MlError::ChecksumMismatch { file } if file == SCALER_FILE),
            "{err}"
        );
    }

    #[test]
    fn test_missing_promotion_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        save(&store, &fixture());
        let err = store.load_promoted(&[ModelId::RandomForest]).unwrap_err();
        assert!(matches!(err, MlError::MissingArtifact(_)));
        // trained models remain loadable directly
        let manifest = store.load_manifest().unwrap();
        assert!(store.load_model(&manifest, ModelId::RandomForest).is_ok());
    }

    #[test]
    fn test_missing_directory() {
        let store = ArtifactStore::new("/nonexistent/slopefos/models");
        assert!(matches!(store.load_manifest(), Err(MlError::MissingArtifact(_))));
    }

    #[test]
    fn test_second_save_replaces_first() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        let f = fixture();
        save(&store, &f);
        std::fs::write(store.dir().join("stray.txt"), "x").unwrap();
        save(&store, &f);
        assert!(!store.dir().join("stray.txt").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
