//! Conditioning pipeline: raw light curve → fixed-length feature vector.
//!
//! ```text
//!  RawSeries
//!     │ clean        drop non-finite samples, sort by time
//!     │ clip         optional sigma clipping
//!     │ flatten      optional savgol detrend, per gap-free segment
//!     │ normalize    divide by median flux
//!     │ span check   t_max - t_min > 0
//!     │ bin          N equal-width time bins
//!     │ reconcile    truncate / pad with 1.0 to exactly N
//!     ▼ sanitize     non-finite → 1.0
//!  FeatureVector
//! ```

pub mod detrend;
pub mod resample;
pub mod stats;

use thiserror::Error;

use crate::config::ScanConfig;
use crate::data::model::{FeatureMatrix, FeatureVector, RawSeries, Sample};

/// Maximum sigma-clipping passes when removing outliers.
const CLIP_MAX_ITERS: usize = 5;

/// Why a light curve did not make it into the feature matrix.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DropReason {
    #[error("no valid samples after cleaning")]
    MissingData,
    #[error("outlier removal failed: {0}")]
    OutlierRemovalFailure(String),
    #[error("detrending failed: {0}")]
    DetrendFailure(String),
    #[error("cannot normalize to baseline {baseline}")]
    NormalizeFailure { baseline: f64 },
    #[error("degenerate time span {span}")]
    DegenerateSpan { span: f64 },
    #[error("resampling failed: {0}")]
    ResampleFailure(String),
}

/// Result of conditioning a whole batch.
#[derive(Debug)]
pub struct ConditionedBatch {
    pub matrix: FeatureMatrix,
    /// Identifier and reason for every dropped series, in input order.
    pub dropped: Vec<(String, DropReason)>,
}

/// Condition one light curve.
pub fn condition(raw: RawSeries, config: &ScanConfig) -> Result<FeatureVector, DropReason> {
    if raw.is_empty() {
        return Err(DropReason::MissingData);
    }
    let mut samples = clean(raw.samples);
    if samples.is_empty() {
        return Err(DropReason::MissingData);
    }

    if let Some(sigma) = config.outlier_sigma {
        samples = remove_outliers(samples, sigma)?;
    }

    let (time, mut flux): (Vec<f64>, Vec<f64>) =
        samples.into_iter().map(|s| (s.time, s.flux)).unzip();

    if let Some(window) = config.smoothing_window {
        flatten(&time, &mut flux, window)?;
    }

    normalize(&mut flux)?;

    let t0 = time[0];
    let span = time[time.len() - 1] - t0;
    if !(span.is_finite() && span > 0.0) {
        return Err(DropReason::DegenerateSpan { span });
    }

    let n = config.series_length;
    let width = span / n as f64;
    let binned = resample::bin_by_time(&time, &flux, t0, width).ok_or_else(|| {
        DropReason::ResampleFailure(format!("cannot bin span {span} into {n} bins"))
    })?;

    let mut values = resample::reconcile_length(binned, n);
    resample::replace_invalid(&mut values);

    Ok(FeatureVector::from_conditioned(values))
}

/// Condition every series; survivors go into the matrix, the rest are logged.
pub fn condition_all(
    series: impl IntoIterator<Item = RawSeries>,
    config: &ScanConfig,
) -> ConditionedBatch {
    let mut matrix = FeatureMatrix::new(config.series_length);
    let mut dropped = Vec::new();

    for raw in series {
        let identifier = raw.identifier.clone();
        log::debug!("Conditioning '{identifier}' ({} samples)", raw.len());
        let outcome = condition(raw, config).and_then(|vector| {
            matrix
                .push(identifier.clone(), vector)
                .map_err(|e| DropReason::ResampleFailure(e.to_string()))
        });
        if let Err(reason) = outcome {
            log::warn!("Dropping '{identifier}': {reason}");
            dropped.push((identifier, reason));
        }
    }

    log::info!(
        "Conditioned {} light curves, dropped {}",
        matrix.len(),
        dropped.len()
    );
    ConditionedBatch { matrix, dropped }
}

// -- steps --

fn clean(mut samples: Vec<Sample>) -> Vec<Sample> {
    samples.retain(|s| s.time.is_finite() && s.flux.is_finite());
    samples.sort_by(|a, b| a.time.total_cmp(&b.time));
    samples
}

fn remove_outliers(samples: Vec<Sample>, sigma: f64) -> Result<Vec<Sample>, DropReason> {
    let flux: Vec<f64> = samples.iter().map(|s| s.flux).collect();
    let keep = stats::sigma_clip_mask(&flux, sigma, CLIP_MAX_ITERS).ok_or_else(|| {
        DropReason::OutlierRemovalFailure("flux statistics are not finite".into())
    })?;

    let kept: Vec<Sample> = samples
        .into_iter()
        .zip(keep)
        .filter_map(|(s, k)| k.then_some(s))
        .collect();
    if kept.is_empty() {
        return Err(DropReason::OutlierRemovalFailure("every sample was clipped".into()));
    }
    Ok(kept)
}

fn flatten(time: &[f64], flux: &mut [f64], window: usize) -> Result<(), DropReason> {
    let trend = detrend::savgol_trend(time, flux, window)
        .ok_or_else(|| DropReason::DetrendFailure("empty series".into()))?;

    if let Some(bad) = trend.iter().find(|t| !t.is_finite() || **t == 0.0) {
        return Err(DropReason::DetrendFailure(format!("invalid trend value {bad}")));
    }
    for (f, t) in flux.iter_mut().zip(trend) {
        *f /= t;
    }
    Ok(())
}

fn normalize(flux: &mut [f64]) -> Result<(), DropReason> {
    let baseline = stats::median(flux).unwrap_or(f64::NAN);
    if !baseline.is_finite() || baseline == 0.0 {
        return Err(DropReason::NormalizeFailure { baseline });
    }
    for f in flux.iter_mut() {
        *f /= baseline;
    }
    Ok(())
}
