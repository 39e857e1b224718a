/// Flux value meaning "no change"; used for padding and invalid bins.
pub const BASELINE_FLUX: f64 = 1.0;

/// Average flux into equal-width time bins starting at `t0`.
///
/// The bin count is `floor(span / width) + 1`, so the final sample falls in a
/// trailing bin of its own. Bins without samples are NaN. Inputs must be
/// finite, sorted by time and of equal length.
pub fn bin_by_time(time: &[f64], flux: &[f64], t0: f64, width: f64) -> Option<Vec<f64>> {
    if !(width.is_finite() && width > 0.0) {
        return None;
    }
    let span = time.last()? - t0;
    let count = (span / width).floor();
    if !count.is_finite() || count < 0.0 || count >= u32::MAX as f64 {
        return None;
    }
    let count = count as usize + 1;

    let mut sums = vec![0.0; count];
    let mut hits = vec![0usize; count];
    for (&t, &f) in time.iter().zip(flux) {
        let index = (((t - t0) / width).floor() as usize).min(count - 1);
        sums[index] += f;
        hits[index] += 1;
    }

    Some(
        sums.into_iter()
            .zip(hits)
            .map(|(sum, n)| if n == 0 { f64::NAN } else { sum / n as f64 })
            .collect(),
    )
}

/// Force exactly `length` values: keep the first `length` bins, or pad the
/// tail with [`BASELINE_FLUX`].
pub fn reconcile_length(mut values: Vec<f64>, length: usize) -> Vec<f64> {
    values.resize(length, BASELINE_FLUX);
    values
}

/// Replace NaN / infinite values with [`BASELINE_FLUX`].
pub fn replace_invalid(values: &mut [f64]) {
    for v in values.iter_mut().filter(|v| !v.is_finite()) {
        *v = BASELINE_FLUX;
    }
}
