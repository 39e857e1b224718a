mod archive;
mod color;
mod config;
mod data;
mod pipeline;
mod render;
mod report;
mod scan;
mod scoring;

use std::path::PathBuf;

use anyhow::Result;

use archive::FileArchive;
use config::ScanConfig;
use render::PngRenderer;
use scoring::IsolationForest;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional positional argument: path to a JSON config file.
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => ScanConfig::load(&path)?,
        None => {
            let config = ScanConfig::default();
            config.validate()?;
            config
        }
    };
    log::debug!("Configuration: {config:?}");

    let archive = FileArchive::new(&config.acquisition.archive_root);
    log::info!("[A.E.G.I.S] Scanning archive at {}", archive.root().display());

    let scorer = IsolationForest::from_config(&config);
    let renderer = PngRenderer::default();

    let summary = scan::run(&config, &archive, &scorer, &renderer)?;
    log::info!(
        "Scan complete: {} acquired, {} conditioned, {} dropped, {} anomalies written to {}",
        summary.acquired,
        summary.conditioned,
        summary.dropped,
        summary.anomalies,
        config.output_dir.display()
    );
    if summary.render_failures > 0 {
        log::warn!("{} anomaly report(s) could not be rendered", summary.render_failures);
    }
    Ok(())
}
