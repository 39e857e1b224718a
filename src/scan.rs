use anyhow::Result;

use crate::archive::{Archive, collect_series};
use crate::config::ScanConfig;
use crate::pipeline::condition_all;
use crate::render::Renderer;
use crate::report::{ensure_output_dir, report};
use crate::scoring::Scorer;

// ---------------------------------------------------------------------------
// One end-to-end scan
// ---------------------------------------------------------------------------

/// Counts from a finished scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub acquired: usize,
    pub conditioned: usize,
    pub dropped: usize,
    pub anomalies: usize,
    pub render_failures: usize,
}

/// Acquire → condition → score → render.
///
/// Acquiring nothing ends the scan early with an empty summary; that is
/// reported but not an error.
pub fn run(
    config: &ScanConfig,
    archive: &dyn Archive,
    scorer: &dyn Scorer,
    renderer: &dyn Renderer,
) -> Result<ScanSummary> {
    ensure_output_dir(&config.output_dir)?;

    let acq = &config.acquisition;
    log::info!(
        "Collecting up to {} light curves from {} source(s)",
        acq.target_count,
        acq.sources.len()
    );
    let series = collect_series(archive, &acq.sources, acq.target_count);
    if series.is_empty() {
        log::error!("No light curves acquired; check the archive and query settings");
        return Ok(ScanSummary::default());
    }
    let acquired = series.len();
    log::info!("Acquired {acquired} light curves, conditioning...");

    let batch = condition_all(series, config);
    let outcome = report(&batch.matrix, config, scorer, renderer)?;

    Ok(ScanSummary {
        acquired,
        conditioned: batch.matrix.len(),
        dropped: batch.dropped.len(),
        anomalies: outcome.anomalies.len(),
        render_failures: outcome.render_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveError, Query};
    use crate::data::model::{FeatureMatrix, RawSeries};
    use crate::render::PngRenderer;
    use crate::scoring::{Assessment, IsolationForest};
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct MemoryArchive(Vec<RawSeries>);

    impl Archive for MemoryArchive {
        fn search(&self, query: &Query) -> Result<Vec<RawSeries>, ArchiveError> {
            Ok(self.0.iter().take(query.limit).cloned().collect())
        }
    }

    struct RefusingScorer(Cell<bool>);

    impl Scorer for RefusingScorer {
        fn assess(&self, _matrix: &FeatureMatrix) -> Result<Vec<Assessment>> {
            self.0.set(true);
            anyhow::bail!("scorer must not be called")
        }
    }

    fn config(dir: &Path) -> ScanConfig {
        let mut config = ScanConfig {
            series_length: 50,
            anomaly_fraction: 0.5,
            output_dir: dir.join("results"),
            ..ScanConfig::default()
        };
        config.acquisition.sources = vec![Query::new("memory", 10)];
        config
    }

    fn star(id: &str, depth: f64) -> RawSeries {
        let time: Vec<f64> = (0..800).map(|i| 1683.0 + i as f64 * 0.025).collect();
        let flux: Vec<f64> = (0..800)
            .map(|i| if (380..400).contains(&i) { 1000.0 * (1.0 - depth) } else { 1000.0 })
            .collect();
        RawSeries::from_columns(id, &time, &flux)
    }

    fn png_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".png"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn two_good_one_degenerate_yields_one_artifact() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let archive = MemoryArchive(vec![
            star("TIC 100", 0.0),
            RawSeries::from_columns("TIC 200", &[1690.0, 1690.0, 1690.0], &[1.0, 1.02, 0.98]),
            star("TIC 300", 0.02),
        ]);

        let summary = run(
            &config,
            &archive,
            &IsolationForest::from_config(&config),
            &PngRenderer::default(),
        )
        .unwrap();

        assert_eq!(summary.acquired, 3);
        assert_eq!(summary.conditioned, 2);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.anomalies, 1);

        let files = png_files(&config.output_dir);
        assert_eq!(files.len(), 1);
        assert!(
            files[0] == "anomaly_001_TIC_100.png" || files[0] == "anomaly_001_TIC_300.png",
            "{files:?}"
        );
    }

    #[test]
    fn rerun_overwrites_instead_of_accumulating() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let archive = MemoryArchive(vec![star("TIC 1", 0.0), star("TIC 2", 0.03)]);
        let scorer = IsolationForest::from_config(&config);

        run(&config, &archive, &scorer, &PngRenderer::default()).unwrap();
        let first = png_files(&config.output_dir);
        run(&config, &archive, &scorer, &PngRenderer::default()).unwrap();
        let second = png_files(&config.output_dir);

        assert_eq!(first, second);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn nothing_acquired_ends_cleanly_without_scoring() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let scorer = RefusingScorer(Cell::new(false));

        let summary = run(&config, &MemoryArchive(Vec::new()), &scorer, &PngRenderer::default())
            .unwrap();

        assert_eq!(summary, ScanSummary::default());
        assert!(!scorer.0.get());
        assert!(config.output_dir.is_dir());
    }

    #[test]
    fn all_series_dropped_skips_scoring() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let archive = MemoryArchive(vec![
            RawSeries::from_columns("flat", &[1.0], &[1.0]),
            RawSeries::new("empty", Vec::new()),
        ]);
        let scorer = RefusingScorer(Cell::new(false));

        let summary = run(&config, &archive, &scorer, &PngRenderer::default()).unwrap();

        assert_eq!(summary.acquired, 2);
        assert_eq!(summary.conditioned, 0);
        assert_eq!(summary.anomalies, 0);
        assert!(!scorer.0.get());
        assert!(png_files(&config.output_dir).is_empty());
    }
}
