//! Small robust-statistics helpers shared by the conditioning steps.

/// Median of the values, or `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Population standard deviation about `center`.
pub fn std_dev_about(values: &[f64], center: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let variance =
        values.iter().map(|v| (v - center).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Iterative sigma clipping with a median centre.
///
/// Returns a keep-mask the same length as `values`. Stops after `max_iters`
/// passes or once a pass rejects nothing. `None` if the statistics are not
/// finite.
pub fn sigma_clip_mask(values: &[f64], sigma: f64, max_iters: usize) -> Option<Vec<bool>> {
    let mut keep = vec![true; values.len()];

    for _ in 0..max_iters {
        let kept: Vec<f64> = values
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(v, _)| *v)
            .collect();
        let center = median(&kept)?;
        let spread = std_dev_about(&kept, center)?;
        if !center.is_finite() || !spread.is_finite() {
            return None;
        }
        if spread == 0.0 {
            break;
        }

        let mut rejected = 0;
        for (value, k) in values.iter().zip(keep.iter_mut()) {
            if *k && (value - center).abs() > sigma * spread {
                *k = false;
                rejected += 1;
            }
        }
        if rejected == 0 {
            break;
        }
    }

    Some(keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_and_even_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn std_about_center() {
        let sd = std_dev_about(&[1.0, 3.0], 2.0).unwrap();
        assert!((sd - 1.0).abs() < 1e-12);
    }

    #[test]
    fn clipping_rejects_a_spike() {
        let mut values: Vec<f64> = (0..100).map(|i| 1.0 + 0.001 * ((i % 7) as f64 - 3.0)).collect();
        values[40] = 5.0;

        let keep = sigma_clip_mask(&values, 5.0, 5).unwrap();

        assert!(!keep[40]);
        assert_eq!(keep.iter().filter(|k| **k).count(), 99);
    }

    #[test]
    fn clipping_constant_series_keeps_everything() {
        let keep = sigma_clip_mask(&[1.0; 10], 3.0, 5).unwrap();
        assert!(keep.iter().all(|k| *k));
    }
}
