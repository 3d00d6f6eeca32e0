//! Safety classification and confidence bands for a predicted FoS.

use serde::{Deserialize, Serialize};
use std::fmt;

/// z-score of a two-sided 95% normal interval.
pub const Z_95: f64 = 1.96;

/// Round to four decimals, the precision every reported FoS uses.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyStatus {
    Critical,
    Warning,
    Caution,
    Safe,
}

impl SafetyStatus {
    pub fn classify(fos: f64) -> Self {
        if fos < 1.0 {
            Self::Critical
        } else if fos < 1.3 {
            Self::Warning
        } else if fos < 1.5 {
            Self::Caution
        } else {
            Self::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Warning => "WARNING",
            Self::Caution => "CAUTION",
            Self::Safe => "SAFE",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Critical => "Slope is unstable - immediate action required",
            Self::Warning => "Slope stability is marginal - review required",
            Self::Caution => "Slope is stable but monitor conditions",
            Self::Safe => "Slope is stable",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::Critical => "red",
            Self::Warning => "orange",
            Self::Caution => "yellow",
            Self::Safe => "green",
        }
    }
}

impl fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `safety` object of a prediction response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub status: SafetyStatus,
    pub message: String,
    pub color: String,
}

impl SafetyAssessment {
    pub fn for_fos(fos: f64) -> Self {
        let status = SafetyStatus::classify(fos);
        Self {
            status,
            message: status.message().to_string(),
            color: status.color().to_string(),
        }
    }
}

/// Approximate band `fos ± 1.96 × RMSE`, floored at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: String,
}

impl ConfidenceInterval {
    pub fn from_rmse(fos: f64, rmse: f64) -> Self {
        let half_width = Z_95 * rmse;
        Self {
            lower: round4((fos - half_width).max(0.0)),
            upper: round4(fos + half_width),
            level: "95%".to_string(),
        }
    }
}
