use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::filter::matching_indices;
use crate::data::loader::load_file;
use crate::data::model::RawSeries;

/// File extensions tried, in order, when resolving a query target.
const ARCHIVE_EXTENSIONS: [&str; 4] = ["parquet", "pq", "json", "csv"];

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// One search against the archive (a sector, field or target anchor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Target star or field identifier.
    pub target: String,
    /// Keep only products within this separation of the anchor.
    #[serde(default)]
    pub radius_arcsec: Option<f64>,
    /// Maximum number of series returned by this query.
    pub limit: usize,
    /// Data-provider filter, e.g. `SPOC`.
    #[serde(default)]
    pub provider: Option<String>,
}

impl Query {
    pub fn new(target: impl Into<String>, limit: usize) -> Self {
        Self {
            target: target.into(),
            radius_arcsec: None,
            limit,
            provider: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no archive file for target '{target}' under {}", root.display())]
    TargetNotFound { target: String, root: PathBuf },

    #[error("failed to load {}: {reason:#}", path.display())]
    Load { path: PathBuf, reason: anyhow::Error },
}

/// Source of raw light curves.
pub trait Archive {
    /// Run one query. A failing query never affects other queries.
    fn search(&self, query: &Query) -> Result<Vec<RawSeries>, ArchiveError>;
}

/// Archive backed by a directory of light-curve batch files, one per target.
#[derive(Debug, Clone)]
pub struct FileArchive {
    root: PathBuf,
}

impl FileArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<target>.<ext>` for the first known extension that exists,
    /// or the target itself when it already names a file.
    fn resolve(&self, target: &str) -> Option<PathBuf> {
        ARCHIVE_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{target}.{ext}")))
            .chain(std::iter::once(PathBuf::from(target)))
            .find(|path| path.is_file())
    }
}

impl Archive for FileArchive {
    fn search(&self, query: &Query) -> Result<Vec<RawSeries>, ArchiveError> {
        let path = self
            .resolve(&query.target)
            .ok_or_else(|| ArchiveError::TargetNotFound {
                target: query.target.clone(),
                root: self.root.clone(),
            })?;

        log::debug!("Loading {} for query {:?}", path.display(), query.target);
        let mut batch = load_file(&path).map_err(|reason| ArchiveError::Load {
            path: path.clone(),
            reason,
        })?;

        let keep = matching_indices(&batch, query);
        let mut selected = Vec::with_capacity(keep.len());
        // Indices are ascending; drain from the back so earlier ones stay valid.
        for &i in keep.iter().rev() {
            selected.push(batch.swap_remove(i));
        }
        selected.reverse();
        Ok(selected)
    }
}

// ---------------------------------------------------------------------------
// Bounded multi-source acquisition
// ---------------------------------------------------------------------------

/// Query each source in order until `target_count` series are collected or
/// the sources run out.
///
/// A source that errors or comes back empty contributes nothing and the loop
/// moves on to the next one.
pub fn collect_series(
    archive: &dyn Archive,
    sources: &[Query],
    target_count: usize,
) -> Vec<RawSeries> {
    let mut collected: Vec<RawSeries> = Vec::new();

    for query in sources {
        let remaining = target_count.saturating_sub(collected.len());
        if remaining == 0 {
            break;
        }

        log::info!(
            "Searching '{}' (limit {}, need {remaining} more)",
            query.target,
            query.limit
        );
        match archive.search(query) {
            Ok(batch) if batch.is_empty() => {
                log::warn!("Source '{}' returned no light curves", query.target);
            }
            Ok(batch) => {
                let found = batch.len();
                collected.extend(batch.into_iter().take(remaining));
                log::info!(
                    "Source '{}' returned {found} light curves ({} collected)",
                    query.target,
                    collected.len()
                );
            }
            Err(e) => {
                log::warn!("Source '{}' failed: {e}", query.target);
            }
        }
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    /// In-memory archive keyed by target; unknown targets fail.
    struct ScriptedArchive {
        batches: Vec<(&'static str, usize)>,
        calls: RefCell<Vec<String>>,
    }

    impl Archive for ScriptedArchive {
        fn search(&self, query: &Query) -> Result<Vec<RawSeries>, ArchiveError> {
            self.calls.borrow_mut().push(query.target.clone());
            let (_, count) = self
                .batches
                .iter()
                .find(|(target, _)| *target == query.target)
                .ok_or_else(|| ArchiveError::TargetNotFound {
                    target: query.target.clone(),
                    root: PathBuf::new(),
                })?;
            Ok((0..*count)
                .map(|i| RawSeries::from_columns(format!("{}-{i}", query.target), &[0.0, 1.0], &[1.0, 1.0]))
                .collect())
        }
    }

    fn archive(batches: Vec<(&'static str, usize)>) -> ScriptedArchive {
        ScriptedArchive {
            batches,
            calls: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn stops_once_target_count_is_reached() {
        let archive = archive(vec![("s14", 3), ("s15", 3), ("s16", 3)]);
        let sources = [Query::new("s14", 10), Query::new("s15", 10), Query::new("s16", 10)];

        let series = collect_series(&archive, &sources, 5);

        assert_eq!(series.len(), 5);
        assert_eq!(series[4].identifier, "s15-1");
        assert_eq!(*archive.calls.borrow(), vec!["s14", "s15"]);
    }

    #[test]
    fn failing_and_empty_sources_are_skipped() {
        let archive = archive(vec![("empty", 0), ("good", 2)]);
        let sources = [Query::new("missing", 10), Query::new("empty", 10), Query::new("good", 10)];

        let series = collect_series(&archive, &sources, 50);

        assert_eq!(series.len(), 2);
        assert_eq!(archive.calls.borrow().len(), 3);
    }

    #[test]
    fn exhausted_sources_return_what_was_found() {
        let archive = archive(vec![]);
        let series = collect_series(&archive, &[Query::new("nowhere", 5)], 5);
        assert!(series.is_empty());
    }

    #[test]
    fn file_archive_resolves_target_and_applies_query() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("sector14.json"),
            r#"[
                {"time": [0.0, 1.0], "flux": [1.0, 1.0], "target_name": "A", "author": "SPOC"},
                {"time": [0.0, 1.0], "flux": [1.0, 1.0], "target_name": "B", "author": "QLP"},
                {"time": [0.0, 1.0], "flux": [1.0, 1.0], "target_name": "C", "author": "SPOC"}
            ]"#,
        )
        .unwrap();
        let archive = FileArchive::new(dir.path());

        let mut query = Query::new("sector14", 10);
        query.provider = Some("SPOC".into());
        let series = archive.search(&query).unwrap();

        let ids: Vec<&str> = series.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn file_archive_reports_missing_target() {
        let dir = TempDir::new().unwrap();
        let archive = FileArchive::new(dir.path());

        let err = archive.search(&Query::new("sector99", 10)).unwrap_err();
        assert!(matches!(err, ArchiveError::TargetNotFound { .. }));
    }
}
