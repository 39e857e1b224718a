use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::{register_font, FontStyle};

use crate::color;
use crate::data::model::FeatureVector;

/// Persists one conditioned light curve as an image.
pub trait Renderer {
    /// `rank` / `total` let implementations style reports by severity.
    fn render(
        &self,
        vector: &FeatureVector,
        title: &str,
        rank: usize,
        total: usize,
        path: &Path,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Font
// ---------------------------------------------------------------------------

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Register the embedded font with plotters once per process.
fn ensure_font() -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES).is_ok());
    anyhow::ensure!(ok, "embedded plot font could not be loaded");
    Ok(())
}

fn plot_color(c: Rgb<u8>) -> RGBColor {
    let Rgb([r, g, b]) = c;
    RGBColor(r, g, b)
}

// ---------------------------------------------------------------------------
// PNG line plot
// ---------------------------------------------------------------------------

/// Line plot of flux against normalized time, written as PNG.
#[derive(Debug, Clone)]
pub struct PngRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for PngRenderer {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 400,
        }
    }
}

/// Flux range to plot. Always keeps the 1.0 baseline in view.
fn flux_range(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .fold((1.0f64, 1.0f64), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let pad = ((hi - lo) * 0.05).max(1e-3);
    (lo - pad, hi + pad)
}

/// Bin `i` of `count` on the 0..1 time axis.
fn normalized_time(i: usize, count: usize) -> f64 {
    if count <= 1 {
        0.5
    } else {
        i as f64 / (count - 1) as f64
    }
}

impl PngRenderer {
    /// Draw the titled chart into an in-memory image.
    pub fn draw(&self, vector: &FeatureVector, title: &str, curve: Rgb<u8>) -> Result<RgbImage> {
        ensure_font()?;

        let values = vector.values();
        let (y_min, y_max) = flux_range(values);
        let mut buffer = vec![0u8; self.width as usize * self.height as usize * 3];

        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height))
                .into_drawing_area();
            root.fill(&plot_color(color::BACKGROUND))?;

            let mut chart = ChartBuilder::on(&root)
                .caption(title, (FONT_FAMILY, 22))
                .margin(10)
                .x_label_area_size(45)
                .y_label_area_size(65)
                .build_cartesian_2d(0.0..1.0, y_min..y_max)?;

            chart
                .configure_mesh()
                .x_desc("Normalized Time")
                .y_desc("Flux")
                .axis_style(&plot_color(color::FRAME))
                .light_line_style(&plot_color(color::GRID))
                .x_label_formatter(&|x| format!("{x:.1}"))
                .y_label_formatter(&|y| format!("{y:.3}"))
                .draw()?;

            chart.draw_series(DashedLineSeries::new(
                vec![(0.0, 1.0), (1.0, 1.0)],
                6,
                4,
                plot_color(color::BASELINE).stroke_width(1),
            ))?;

            chart.draw_series(LineSeries::new(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| (normalized_time(i, values.len()), v)),
                plot_color(curve).stroke_width(2),
            ))?;

            root.present()?;
        }

        RgbImage::from_raw(self.width, self.height, buffer).context("plot buffer has the wrong size")
    }
}

impl Renderer for PngRenderer {
    fn render(
        &self,
        vector: &FeatureVector,
        title: &str,
        rank: usize,
        total: usize,
        path: &Path,
    ) -> Result<()> {
        let img = self.draw(vector, title, color::rank_color(rank, total))?;
        img.save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("writing {}", path.display()))
    }
}
