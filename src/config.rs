use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::Query;

// ---------------------------------------------------------------------------
// Scan configuration
// ---------------------------------------------------------------------------

/// Everything a scan needs, passed explicitly to each stage.
///
/// Loaded from a JSON file; every field falls back to its default:
///
/// ```json
/// {
///   "series_length": 500,
///   "outlier_sigma": 5.0,
///   "smoothing_window": 101,
///   "anomaly_fraction": 0.05,
///   "random_seed": 42,
///   "output_dir": "results",
///   "acquisition": {
///     "archive_root": "archive",
///     "target_count": 50,
///     "sources": [{ "target": "sector14", "limit": 50, "provider": "SPOC" }]
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Length N of every feature vector.
    pub series_length: usize,
    /// Sigma-clipping threshold; `None` skips outlier removal.
    pub outlier_sigma: Option<f64>,
    /// Detrending window in samples; `None` skips detrending.
    pub smoothing_window: Option<usize>,
    /// Expected share of anomalous stars, in (0, 1).
    pub anomaly_fraction: f64,
    pub random_seed: u64,
    /// Number of isolation trees.
    pub n_estimators: usize,
    pub output_dir: PathBuf,
    pub acquisition: AcquisitionConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            series_length: 500,
            outlier_sigma: None,
            smoothing_window: Some(101),
            anomaly_fraction: 0.05,
            random_seed: 42,
            n_estimators: 100,
            output_dir: PathBuf::from("results"),
            acquisition: AcquisitionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Directory holding the archive's batch files.
    pub archive_root: PathBuf,
    /// Stop querying once this many light curves are collected.
    pub target_count: usize,
    /// Sources tried in order.
    pub sources: Vec<Query>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let source = |target: &str| Query {
            provider: Some("SPOC".to_string()),
            ..Query::new(target, 50)
        };
        Self {
            archive_root: PathBuf::from("archive"),
            target_count: 50,
            sources: vec![source("sector14"), source("sector15")],
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("series_length must be at least 1")]
    EmptySeries,
    #[error("anomaly_fraction must lie in (0, 1), got {0}")]
    AnomalyFraction(f64),
    #[error("outlier_sigma must be positive, got {0}")]
    OutlierSigma(f64),
    #[error("smoothing_window must be at least 3, got {0}")]
    SmoothingWindow(usize),
    #[error("n_estimators must be at least 1")]
    NoEstimators,
    #[error("acquisition.target_count must be at least 1")]
    NoTargets,
}

impl ScanConfig {
    /// Read a JSON configuration file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ScanConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.series_length == 0 {
            return Err(ConfigError::EmptySeries);
        }
        // Written so NaN fails too.
        if !(self.anomaly_fraction > 0.0 && self.anomaly_fraction < 1.0) {
            return Err(ConfigError::AnomalyFraction(self.anomaly_fraction));
        }
        if let Some(sigma) = self.outlier_sigma {
            if !(sigma > 0.0 && sigma.is_finite()) {
                return Err(ConfigError::OutlierSigma(sigma));
            }
        }
        if let Some(window) = self.smoothing_window {
            if window < 3 {
                return Err(ConfigError::SmoothingWindow(window));
            }
        }
        if self.n_estimators == 0 {
            return Err(ConfigError::NoEstimators);
        }
        if self.acquisition.target_count == 0 {
            return Err(ConfigError::NoTargets);
        }
        Ok(())
    }
}
