//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use slopefos_core::config::workspace_config_path;
use slopefos_core::{AppConfig, SelectionPolicy};
use slopefos_ml::artifacts::ArtifactManifest;
use slopefos_ml::inference::PredictRequest;
use slopefos_ml::{
    ArtifactStore, LayerInput, ModelChoice, PipelineSummary, PredictionService, run_pipeline,
};
use std::path::{Path, PathBuf};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Train {
            data,
            output,
            no_ru,
            seed,
            test_fraction,
            ranked,
            json,
        } => {
            let overrides = TrainOverrides {
                data,
                output,
                no_ru,
                seed,
                test_fraction,
                ranked,
            };
            handle_train(overrides, json, workspace, config_file).await
        }
        Commands::Serve { host, port, models } => {
            handle_serve(host, port, models, workspace, config_file).await
        }
        Commands::Predict {
            cohesion,
            friction_angle,
            unit_weight,
            ru,
            model,
            request,
            models,
        } => {
            let request = match request {
                Some(path) => {
                    let content = std::fs::read_to_string(&path).map_err(|e| {
                        anyhow::anyhow!("Failed to read request {}: {}", path.display(), e)
                    })?;
                    PredictRequest::from_json(&serde_json::from_str(&content)?)?
                }
                None => PredictRequest::Single {
                    layer: LayerInput::new(
                        cohesion.unwrap_or_default(),
                        friction_angle.unwrap_or_default(),
                        unit_weight.unwrap_or_default(),
                        ru,
                    ),
                    model: ModelChoice::parse(model.as_deref()),
                },
            };
            handle_predict(request, models, workspace, config_file)
        }
        Commands::Inspect { models, verify } => {
            handle_inspect(models, verify, workspace, config_file)
        }
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

/// Load the layered configuration with workspace-relative paths resolved.
fn load(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<AppConfig> {
    let mut config = slopefos_core::load_validated_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    resolve_paths(&mut config, workspace);
    Ok(config)
}

fn resolve_paths(config: &mut AppConfig, workspace: &Path) {
    let resolve = |path: &PathBuf| {
        if path.is_relative() {
            workspace.join(path)
        } else {
            path.clone()
        }
    };
    config.data.path = resolve(&config.data.path);
    config.artifacts.dir = resolve(&config.artifacts.dir);
}

/// Command-line values that take precedence over the loaded configuration.
#[derive(Debug, Default)]
struct TrainOverrides {
    data: Option<PathBuf>,
    output: Option<PathBuf>,
    no_ru: bool,
    seed: Option<u64>,
    test_fraction: Option<f64>,
    ranked: Option<usize>,
}

impl TrainOverrides {
    fn apply(self, config: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(data) = self.data {
            config.data.path = data;
        }
        if let Some(output) = self.output {
            config.artifacts.dir = output;
        }
        if self.no_ru {
            config.data.include_ru = false;
        }
        if let Some(seed) = self.seed {
            config.split.seed = seed;
        }
        if let Some(fraction) = self.test_fraction {
            config.split.test_fraction = fraction;
        }
        if let Some(count) = self.ranked {
            config.training.selection = SelectionPolicy::Ranked { count };
        }
        let problems = config.validate();
        if !problems.is_empty() {
            anyhow::bail!("Invalid options: {}", problems.join("; "));
        }
        Ok(())
    }
}

async fn handle_train(
    overrides: TrainOverrides,
    json: bool,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = load(workspace, config_file)?;
    overrides.apply(&mut config)?;

    if !config.data.path.exists() {
        anyhow::bail!(
            "Data file not found at {}. Pass --data or set data.path in the configuration.",
            config.data.path.display()
        );
    }

    let summary = tokio::task::spawn_blocking(move || run_pipeline(&config)).await??;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &PipelineSummary) {
    let percent = |part: usize| part as f64 * 100.0 / summary.samples.max(1) as f64;
    println!("\nPipeline completed");
    println!("  Total samples:    {}", summary.samples);
    println!(
        "  Training samples: {} ({:.0}%)",
        summary.train_samples,
        percent(summary.train_samples)
    );
    println!(
        "  Testing samples:  {} ({:.0}%)",
        summary.test_samples,
        percent(summary.test_samples)
    );
    let features: Vec<&str> = summary.feature_columns.iter().map(|c| c.name()).collect();
    println!("  Features:         {}", features.join(", "));
    println!("  Models trained:   {}", summary.models_trained.len());
    for failure in &summary.failures {
        println!("  Failed:           {} ({})", failure.model, failure.reason);
    }
    if summary.extraction.blocks_skipped > 0 {
        println!(
            "  Skipped blocks:   {}",
            summary.extraction.blocks_skipped
        );
    }

    println!("\n  Test results:");
    for tested in &summary.tested {
        println!("    {}", tested.model);
        println!("      R²:   {:.4}", tested.metrics.r2);
        println!("      RMSE: {:.4}", tested.metrics.rmse);
        println!("      MAE:  {:.4}", tested.metrics.mae);
    }
    println!("\n  Artifacts: {}", summary.artifact_dir.display());
}

async fn handle_serve(
    host: Option<String>,
    port: Option<u16>,
    models: Option<PathBuf>,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = load(workspace, config_file)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(models) = models {
        config.artifacts.dir = models;
    }

    let service = PredictionService::load(&ArtifactStore::new(&config.artifacts.dir));
    if !service.is_ready() {
        tracing::warn!(
            dir = %config.artifacts.dir.display(),
            "Serving without models; /predict will answer 503 until models are trained"
        );
    }
    slopefos_ml::inference::run(service, &config.server).await?;
    Ok(())
}

fn handle_predict(
    request: PredictRequest,
    models: Option<PathBuf>,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    let dir = match models {
        Some(dir) => dir,
        None => load(workspace, config_file)?.artifacts.dir,
    };
    let service = PredictionService::load(&ArtifactStore::new(&dir));
    if let Some(reason) = service.unavailable_reason() {
        anyhow::bail!("Models not loaded from {}: {}", dir.display(), reason);
    }
    tracing::debug!(model = ?request.model(), "Predicting");
    let result = request.execute(&service)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn handle_inspect(
    models: Option<PathBuf>,
    verify: bool,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    let dir = match models {
        Some(dir) => dir,
        None => load(workspace, config_file)?.artifacts.dir,
    };
    let store = ArtifactStore::new(&dir);
    let manifest = store.load_manifest()?;
    if verify {
        store.verify(&manifest)?;
        println!("All {} files match their checksums.", manifest.files.len());
    }
    print_manifest(&dir, &manifest);

    let summary = store.load_summary(&manifest)?;
    if let Some(dataset) = &summary.dataset {
        println!("\n  Dataset:");
        println!("    Samples:      {}", dataset.samples);
        println!("    FoS range:    {:.3} – {:.3}", dataset.fos_min, dataset.fos_max);
        println!("    Ru range:     {:.2} – {:.2}", dataset.ru_min, dataset.ru_max);
        println!(
            "    Seasons:      {} pre-monsoon, {} post-monsoon",
            dataset.pre_monsoon, dataset.post_monsoon
        );
        println!(
            "    Ru applied:   {} with, {} without",
            dataset.ru_applied, dataset.ru_not_applied
        );
    }
    println!("\n  Training leaderboard:");
    for row in &summary.comparison {
        let marker = if row.is_promoted { "*" } else { " " };
        println!(
            "   {marker} {:<18} R² {:.4}  RMSE {:.4}  MAE {:.4}",
            row.model, row.r2, row.rmse, row.mae
        );
    }
    for failure in &summary.failures {
        println!("     {:<18} failed: {}", failure.model.display_name(), failure.reason);
    }
    Ok(())
}

fn print_manifest(dir: &Path, manifest: &ArtifactManifest) {
    println!("Artifacts at {}", dir.display());
    println!("  Format version: {}", manifest.format_version);
    println!("  Created:        {}", manifest.created_at.to_rfc3339());
    let features: Vec<&str> = manifest.feature_columns.iter().map(|c| c.name()).collect();
    println!("  Features:       {}", features.join(", "));
    println!("  Trained:        {}", manifest.trained.len());
    println!("\n  Promoted models:");
    for record in &manifest.promoted {
        println!(
            "    {:<18} test R² {:.4}  RMSE {:.4}  MAE {:.4}  (training R² {:.4})",
            record.model.display_name(),
            record.test.r2,
            record.test.rmse,
            record.test.mae,
            record.training.r2
        );
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let toml_str = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = slopefos_core::load_config(Some(workspace), config_file)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use slopefos_core::ModelId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, None).await.unwrap();

        let config_path = workspace.join(".slopefos").join("config.toml");
        assert!(config_path.exists());

        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: AppConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.split.seed, 42);
        assert_eq!(parsed.server.port, 5000);
        assert_eq!(
            parsed.training.selection,
            SelectionPolicy::Fixed {
                models: vec![ModelId::GradientBoosting, ModelId::XgBoost]
            }
        );
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let config_path = workspace_config_path(workspace);
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(&config_path, "[split]\nseed = 7\n").unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, None).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&config_path).unwrap(),
            "[split]\nseed = 7\n"
        );
    }

    #[test]
    fn test_train_overrides_take_precedence() {
        let mut config = AppConfig::default();
        TrainOverrides {
            data: Some(PathBuf::from("/data/sheet.csv")),
            output: Some(PathBuf::from("/tmp/out")),
            no_ru: true,
            seed: Some(7),
            test_fraction: Some(0.3),
            ranked: Some(2),
        }
        .apply(&mut config)
        .unwrap();

        assert_eq!(config.data.path, PathBuf::from("/data/sheet.csv"));
        assert_eq!(config.artifacts.dir, PathBuf::from("/tmp/out"));
        assert!(!config.data.include_ru);
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.split.test_fraction, 0.3);
        assert_eq!(
            config.training.selection,
            SelectionPolicy::Ranked { count: 2 }
        );
    }

    #[test]
    fn test_train_overrides_are_validated() {
        let mut config = AppConfig::default();
        let err = TrainOverrides {
            test_fraction: Some(1.5),
            ..TrainOverrides::default()
        }
        .apply(&mut config)
        .unwrap_err();
        assert!(err.to_string().contains("test_fraction"));
    }

    #[test]
    fn test_relative_paths_resolve_against_workspace() {
        let mut config = AppConfig::default();
        config.artifacts.dir = PathBuf::from("/abs/models");
        resolve_paths(&mut config, Path::new("/work"));
        assert_eq!(
            config.data.path,
            PathBuf::from("/work/data/Overall Data.csv")
        );
        assert_eq!(config.artifacts.dir, PathBuf::from("/abs/models"));
    }

    #[tokio::test]
    async fn test_predict_without_models_fails() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Predict {
            cohesion: Some(10.0),
            friction_angle: Some(30.0),
            unit_weight: Some(20.0),
            ru: 0.0,
            model: None,
            request: None,
            models: Some(dir.path().join("missing")),
        };
        let err = handle_command(command, dir.path(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Models not loaded"));
    }
}
