use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::ScanConfig;
use crate::data::model::{FeatureMatrix, ScoredAnomaly};
use crate::render::Renderer;
use crate::scoring::{Assessment, Label, Scorer};

/// Summary table written next to the images.
pub const MANIFEST_NAME: &str = "anomalies.csv";

/// Outcome of scoring and rendering one matrix.
#[derive(Debug, Default)]
pub struct Report {
    pub anomalies: Vec<ManifestRow>,
    /// Anomalies whose image could not be written.
    pub render_failures: usize,
}

/// One line of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestRow {
    pub rank: usize,
    pub identifier: String,
    pub score: f64,
    pub artifact: String,
}

/// Create the output directory if it does not exist yet.
pub fn ensure_output_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
}

/// Make an identifier safe to use in a file name.
pub fn sanitize_identifier(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len());
    for c in identifier.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out
        .trim_start_matches(|c| c == '.' || c == '_')
        .trim_end_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `anomaly_{rank:03}_{identifier}.png`; the rank prefix keeps both order on
/// disk and uniqueness when identifiers repeat.
pub fn artifact_name(rank: usize, identifier: &str) -> String {
    format!("anomaly_{rank:03}_{}.png", sanitize_identifier(identifier))
}

/// Keep rows labelled anomalous, most negative score first, ranked from 1.
pub fn rank_anomalies<'a>(
    matrix: &'a FeatureMatrix,
    assessments: &[Assessment],
) -> Vec<ScoredAnomaly<'a>> {
    let mut flagged: Vec<(usize, f64)> = assessments
        .iter()
        .enumerate()
        .filter(|(_, a)| a.label == Label::Anomalous)
        .map(|(i, a)| (i, a.score))
        .collect();
    flagged.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    flagged
        .into_iter()
        .filter_map(|(i, score)| Some((matrix.identifier(i)?, matrix.row(i)?, score)))
        .enumerate()
        .map(|(position, (identifier, vector, score))| ScoredAnomaly {
            identifier,
            vector,
            score,
            rank: position + 1,
        })
        .collect()
}

/// Score the matrix once, then render every anomaly in rank order.
///
/// An empty matrix yields an empty report without touching the scorer or the
/// renderer.
pub fn report(
    matrix: &FeatureMatrix,
    config: &ScanConfig,
    scorer: &dyn Scorer,
    renderer: &dyn Renderer,
) -> Result<Report> {
    if matrix.is_empty() {
        log::info!("No conditioned light curves, nothing to score");
        return Ok(Report::default());
    }

    log::info!(
        "Scoring {} light curves of {} bins each",
        matrix.len(),
        matrix.dimension()
    );
    let assessments = scorer.assess(matrix).context("scoring feature matrix")?;
    anyhow::ensure!(
        assessments.len() == matrix.len(),
        "scorer returned {} assessments for {} rows",
        assessments.len(),
        matrix.len()
    );

    let ranked = rank_anomalies(matrix, &assessments);
    log::info!("Detected {} anomalies", ranked.len());

    let mut report = Report::default();
    let total = ranked.len();
    for anomaly in &ranked {
        let name = artifact_name(anomaly.rank, anomaly.identifier);
        let path = config.output_dir.join(&name);
        let title = format!(
            "ANOMALY DETECTED: {} (rank {}, score {:.4})",
            anomaly.identifier, anomaly.rank, anomaly.score
        );

        match renderer.render(anomaly.vector, &title, anomaly.rank, total, &path) {
            Ok(()) => {
                log::info!("Saved report: {}", path.display());
                report.anomalies.push(ManifestRow {
                    rank: anomaly.rank,
                    identifier: anomaly.identifier.to_string(),
                    score: anomaly.score,
                    artifact: name,
                });
            }
            Err(e) => {
                log::error!("Failed to render '{}': {e:#}", anomaly.identifier);
                report.render_failures += 1;
            }
        }
    }

    write_manifest(&config.output_dir.join(MANIFEST_NAME), &report.anomalies)?;
    Ok(report)
}

fn write_manifest(path: &Path, rows: &[ManifestRow]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.serialize(row).context("writing manifest row")?;
    }
    writer.flush().context("flushing manifest")?;
    Ok(())
}
