//! Savitzky–Golay style flattening.
//!
//! The trend at each sample is the value at that sample of a quadratic
//! least-squares fit over a window of neighbouring samples (sample index is
//! the abscissa, as in the usual savgol filter). Near the ends the window is
//! shifted inward instead of truncated. Samples that deviate from the trend
//! by more than [`MASK_SIGMA`] are excluded and the trend is refit, so short
//! transits and flares survive flattening.
//!
//! Windows never straddle a large time gap: the series is cut into segments
//! wherever consecutive samples are more than [`BREAK_TOLERANCE`] median
//! cadences apart, and each segment is fitted on its own.

use std::ops::Range;

use super::stats;

/// Re-fit passes after the initial trend.
const MASK_ITERATIONS: usize = 3;
const MASK_SIGMA: f64 = 3.0;
/// Gap, in median cadences, that starts a new segment.
const BREAK_TOLERANCE: f64 = 5.0;

/// Odd window no longer than the series.
fn effective_window(window: usize, len: usize) -> usize {
    let w = window.min(len).max(1);
    if w % 2 == 0 { w - 1 } else { w }
}

/// Quadratic fit through the kept samples of `[start, end)`, evaluated at
/// `center`. Falls back to the mean with fewer than three points.
fn local_fit(flux: &[f64], keep: &[bool], start: usize, end: usize, center: usize) -> Option<f64> {
    let (mut s0, mut s1, mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let (mut t0, mut t1, mut t2) = (0.0, 0.0, 0.0);

    for j in (start..end).filter(|&j| keep[j]) {
        let x = j as f64 - center as f64;
        let x2 = x * x;
        let y = flux[j];
        s0 += 1.0;
        s1 += x;
        s2 += x2;
        s3 += x2 * x;
        s4 += x2 * x2;
        t0 += y;
        t1 += x * y;
        t2 += x2 * y;
    }

    if s0 == 0.0 {
        return None;
    }
    if s0 < 3.0 {
        return Some(t0 / s0);
    }

    // Normal equations; the constant term is the fit at `center`.
    let det = s0 * (s2 * s4 - s3 * s3) - s1 * (s1 * s4 - s3 * s2) + s2 * (s1 * s3 - s2 * s2);
    if det == 0.0 || !det.is_finite() {
        return Some(t0 / s0);
    }
    let det_a = t0 * (s2 * s4 - s3 * s3) - s1 * (t1 * s4 - s3 * t2) + s2 * (t1 * s3 - s2 * t2);
    Some(det_a / det)
}

fn fit_pass(flux: &[f64], keep: &[bool], window: usize, previous: Option<&[f64]>) -> Option<Vec<f64>> {
    let n = flux.len();
    let half = window / 2;

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half).min(n - window);
            local_fit(flux, keep, start, start + window, i)
                .or_else(|| previous.map(|p| p[i]))
        })
        .collect()
}

/// Split sorted `time` into index ranges with no internal gap longer than
/// [`BREAK_TOLERANCE`] median cadences.
fn segments(time: &[f64]) -> Vec<Range<usize>> {
    let n = time.len();
    let steps: Vec<f64> = time.windows(2).map(|w| w[1] - w[0]).collect();
    let Some(cadence) = stats::median(&steps).filter(|c| c.is_finite() && *c > 0.0) else {
        return vec![0..n];
    };

    let mut out = Vec::new();
    let mut start = 0;
    for (i, step) in steps.iter().enumerate() {
        if *step > BREAK_TOLERANCE * cadence {
            out.push(start..i + 1);
            start = i + 1;
        }
    }
    out.push(start..n);
    out
}

/// Long-term trend of `flux` sampled at `time`, using a smoothing window of
/// `window` samples inside each gap-free segment.
///
/// `time` must be sorted and as long as `flux`. `None` for an empty series.
pub fn savgol_trend(time: &[f64], flux: &[f64], window: usize) -> Option<Vec<f64>> {
    if flux.is_empty() || time.len() != flux.len() {
        return None;
    }
    let mut trend = Vec::with_capacity(flux.len());
    for segment in segments(time) {
        trend.extend(segment_trend(&flux[segment], window)?);
    }
    Some(trend)
}

fn segment_trend(flux: &[f64], window: usize) -> Option<Vec<f64>> {
    if flux.is_empty() {
        return None;
    }
    let window = effective_window(window, flux.len());
    let mut keep = vec![true; flux.len()];
    let mut trend = fit_pass(flux, &keep, window, None)?;

    for _ in 0..MASK_ITERATIONS {
        let residuals: Vec<f64> = flux.iter().zip(&trend).map(|(f, t)| f - t).collect();
        let Some(clip) = stats::sigma_clip_mask(&residuals, MASK_SIGMA, 1) else {
            break;
        };

        let mut changed = false;
        for (k, c) in keep.iter_mut().zip(clip) {
            if *k && !c {
                *k = false;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        trend = fit_pass(flux, &keep, window, Some(&trend))?;
    }

    Some(trend)
}
