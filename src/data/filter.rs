use super::model::{MetadataValue, RawSeries};
use crate::archive::Query;

/// Metadata column naming the pipeline that produced a light curve.
pub const PROVIDER_COLUMN: &str = "author";

/// Metadata column with the separation (arcsec) from the query anchor.
pub const DISTANCE_COLUMN: &str = "distance";

/// Return indices of series that pass the query's predicates, capped at
/// `query.limit`, in batch order.
///
/// A series passes when:
/// * no provider is requested, or its `author` matches (case-insensitive)
/// * no radius is requested, or its `distance` is within the radius
///
/// A requested predicate whose column is missing (or `Null`) fails the row.
pub fn matching_indices(batch: &[RawSeries], query: &Query) -> Vec<usize> {
    batch
        .iter()
        .enumerate()
        .filter(|(_, series)| {
            if let Some(provider) = &query.provider {
                let matches = series
                    .metadata
                    .get(PROVIDER_COLUMN)
                    .and_then(MetadataValue::as_str)
                    .is_some_and(|author| author.eq_ignore_ascii_case(provider));
                if !matches {
                    return false;
                }
            }
            if let Some(radius) = query.radius_arcsec {
                let within = series
                    .metadata
                    .get(DISTANCE_COLUMN)
                    .and_then(MetadataValue::as_f64)
                    .is_some_and(|distance| distance <= radius);
                if !within {
                    return false;
                }
            }
            true
        })
        .map(|(i, _)| i)
        .take(query.limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(id: &str, author: Option<&str>, distance: Option<f64>) -> RawSeries {
        let mut raw = RawSeries::from_columns(id, &[0.0, 1.0], &[1.0, 1.0]);
        if let Some(author) = author {
            raw = raw.with_metadata(PROVIDER_COLUMN, MetadataValue::String(author.into()));
        }
        if let Some(distance) = distance {
            raw = raw.with_metadata(DISTANCE_COLUMN, MetadataValue::Float(distance));
        }
        raw
    }

    fn query(provider: Option<&str>, radius: Option<f64>, limit: usize) -> Query {
        Query {
            target: "sector14".into(),
            radius_arcsec: radius,
            limit,
            provider: provider.map(str::to_string),
        }
    }

    #[test]
    fn no_predicates_keeps_everything_up_to_limit() {
        let batch = vec![series("a", None, None), series("b", None, None), series("c", None, None)];
        assert_eq!(matching_indices(&batch, &query(None, None, 10)), vec![0, 1, 2]);
        assert_eq!(matching_indices(&batch, &query(None, None, 2)), vec![0, 1]);
    }

    #[test]
    fn provider_filter_is_case_insensitive_and_requires_column() {
        let batch = vec![
            series("a", Some("SPOC"), None),
            series("b", Some("QLP"), None),
            series("c", None, None),
            series("d", Some("spoc"), None),
        ];
        assert_eq!(matching_indices(&batch, &query(Some("SPOC"), None, 10)), vec![0, 3]);
    }

    #[test]
    fn radius_filter_uses_distance_column() {
        let batch = vec![
            series("a", None, Some(0.0)),
            series("b", None, Some(30.0)),
            series("c", None, None),
            series("d", None, Some(10.0)),
        ];
        assert_eq!(matching_indices(&batch, &query(None, Some(10.0), 10)), vec![0, 3]);
    }

    #[test]
    fn limit_applies_after_filtering() {
        let batch = vec![
            series("a", Some("QLP"), None),
            series("b", Some("SPOC"), None),
            series("c", Some("SPOC"), None),
        ];
        assert_eq!(matching_indices(&batch, &query(Some("SPOC"), None, 1)), vec![1]);
    }
}
