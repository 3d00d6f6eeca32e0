//! Tabular samples and the feature/target views models train on.

use crate::error::MlError;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Measurement season of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    PreMonsoon,
    PostMonsoon,
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreMonsoon => f.write_str("pre_monsoon"),
            Self::PostMonsoon => f.write_str("post_monsoon"),
        }
    }
}

/// One soil measurement with its computed Factor of Safety.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub material: String,
    /// kPa
    pub cohesion: f64,
    /// degrees
    pub friction_angle: f64,
    /// kN/m³
    pub unit_weight: f64,
    /// Pore-pressure ratio in [0, 1]; 0.0 when not recorded.
    pub ru: f64,
    pub fos: f64,
    pub season: Season,
    pub ru_applied: bool,
}

/// Bitwise identity of a sample, used for duplicate removal.
pub(crate) type SampleKey = (String, [u64; 5], Season, bool);

impl Sample {
    pub(crate) fn key(&self) -> SampleKey {
        (
            self.material.clone(),
            [
                self.cohesion.to_bits(),
                self.friction_angle.to_bits(),
                self.unit_weight.to_bits(),
                self.ru.to_bits(),
                self.fos.to_bits(),
            ],
            self.season,
            self.ru_applied,
        )
    }

    /// Every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        [
            self.cohesion,
            self.friction_angle,
            self.unit_weight,
            self.ru,
            self.fos,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// A model input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    Cohesion,
    FrictionAngle,
    UnitWeight,
    Ru,
}

impl FeatureColumn {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cohesion => "cohesion",
            Self::FrictionAngle => "friction_angle",
            Self::UnitWeight => "unit_weight",
            Self::Ru => "ru",
        }
    }

    /// Human-readable label with unit.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cohesion => "Cohesion (kPa)",
            Self::FrictionAngle => "Friction Angle (degrees)",
            Self::UnitWeight => "Unit Weight (kN/m³)",
            Self::Ru => "Ru (Pore Pressure Ratio)",
        }
    }

    pub fn value(&self, sample: &Sample) -> f64 {
        match self {
            Self::Cohesion => sample.cohesion,
            Self::FrictionAngle => sample.friction_angle,
            Self::UnitWeight => sample.unit_weight,
            Self::Ru => sample.ru,
        }
    }

    /// Model input columns, in matrix order.
    pub fn columns(include_ru: bool) -> Vec<FeatureColumn> {
        let mut columns = vec![Self::Cohesion, Self::FrictionAngle, Self::UnitWeight];
        if include_ru {
            columns.push(Self::Ru);
        }
        columns
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A feature matrix that remembers which column is which.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<FeatureColumn>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<FeatureColumn>, values: Array2<f64>) -> Result<Self, MlError> {
        if columns.len() != values.ncols() {
            return Err(MlError::shape(format!(
                "{} column names for a matrix with {} columns",
                columns.len(),
                values.ncols()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }
}

/// Ordered, de-duplicated samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn features(&self, include_ru: bool) -> FeatureMatrix {
        let columns = FeatureColumn::columns(include_ru);
        let values = Array2::from_shape_fn((self.samples.len(), columns.len()), |(i, j)| {
            columns[j].value(&self.samples[i])
        });
        FeatureMatrix { columns, values }
    }

    pub fn targets(&self) -> Array1<f64> {
        self.samples.iter().map(|s| s.fos).collect()
    }

    /// Descriptive statistics; `None` for an empty dataset.
    pub fn summary(&self) -> Option<DatasetSummary> {
        let first = self.samples.first()?;
        let mut summary = DatasetSummary {
            samples: self.samples.len(),
            fos_min: first.fos,
            fos_max: first.fos,
            ru_min: first.ru,
            ru_max: first.ru,
            pre_monsoon: 0,
            post_monsoon: 0,
            ru_applied: 0,
            ru_not_applied: 0,
        };
        for sample in &self.samples {
            summary.fos_min = summary.fos_min.min(sample.fos);
            summary.fos_max = summary.fos_max.max(sample.fos);
            summary.ru_min = summary.ru_min.min(sample.ru);
            summary.ru_max = summary.ru_max.max(sample.ru);
            match sample.season {
                Season::PreMonsoon => summary.pre_monsoon += 1,
                Season::PostMonsoon => summary.post_monsoon += 1,
            }
            if sample.ru_applied {
                summary.ru_applied += 1;
            } else {
                summary.ru_not_applied += 1;
            }
        }
        Some(summary)
    }
}

/// Descriptive statistics of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub samples: usize,
    pub fos_min: f64,
    pub fos_max: f64,
    pub ru_min: f64,
    pub ru_max: f64,
    pub pre_monsoon: usize,
    pub post_monsoon: usize,
    pub ru_applied: usize,
    pub ru_not_applied: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(material: &str, fos: f64, season: Season, ru: f64) -> Sample {
        Sample {
            material: material.into(),
            cohesion: 20.0,
            friction_angle: 30.0,
            unit_weight: 18.0,
            ru,
            fos,
            season,
            ru_applied: ru > 0.0,
        }
    }

    #[test]
    fn test_features_column_order() {
        let ds = Dataset::new(vec![sample("Clay", 1.2, Season::PreMonsoon, 0.3)]);
        let with_ru = ds.features(true);
        assert_eq!(
            with_ru.columns(),
            &[
                FeatureColumn::Cohesion,
                FeatureColumn::FrictionAngle,
                FeatureColumn::UnitWeight,
                FeatureColumn::Ru
            ]
        );
        assert_eq!(with_ru.values().row(0).to_vec(), vec![20.0, 30.0, 18.0, 0.3]);
        assert_eq!(ds.features(false).n_features(), 3);
        assert_eq!(ds.targets().to_vec(), vec![1.2]);
    }

    #[test]
    fn test_feature_matrix_rejects_mismatched_columns() {
        let err = FeatureMatrix::new(vec![FeatureColumn::Cohesion], Array2::zeros((2, 3)));
        assert!(err.is_err());
    }

    #[test]
    fn test_select_rows_keeps_order() {
        let ds = Dataset::new(vec![
            sample("A", 1.0, Season::PreMonsoon, 0.0),
            sample("B", 2.0, Season::PreMonsoon, 0.0),
            sample("C", 3.0, Season::PreMonsoon, 0.0),
        ]);
        let mut x = ds.features(false);
        x.values[[0, 0]] = 1.0;
        x.values[[2, 0]] = 3.0;
        let picked = x.select_rows(&[2, 0]);
        assert_eq!(picked.values().column(0).to_vec(), vec![3.0, 1.0]);
    }

    #[test]
    fn test_summary_counts() {
        let ds = Dataset::new(vec![
            sample("A", 0.8, Season::PreMonsoon, 0.0),
            sample("B", 2.1, Season::PostMonsoon, 0.5),
            sample("C", 1.4, Season::PostMonsoon, 0.2),
        ]);
        let summary = ds.summary().unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.fos_min, 0.8);
        assert_eq!(summary.fos_max, 2.1);
        assert_eq!(summary.ru_max, 0.5);
        assert_eq!(summary.pre_monsoon, 1);
        assert_eq!(summary.post_monsoon, 2);
        assert_eq!(summary.ru_applied, 2);
        assert!(Dataset::default().summary().is_none());
    }
}
