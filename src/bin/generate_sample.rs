//! Write a synthetic light-curve archive for trying out the scanner.
//!
//! Usage: `generate_sample [ARCHIVE_DIR]` (default `archive`). Produces
//! `sector14.parquet` and `sector15.parquet` in the layout the scanner's
//! parquet loader expects.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Float64Array, Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// 30-minute full-frame-image cadence.
const CADENCE_DAYS: f64 = 30.0 / 1440.0;
const SECTOR_DAYS: f64 = 27.0;
const STARS_PER_SECTOR: usize = 30;
/// Mid-sector data downlink, relative to sector start.
const DOWNLINK_GAP: std::ops::Range<f64> = 13.0..14.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Quiet,
    Transit,
    Flare,
    EclipsingBinary,
    Gappy,
    SingleEpoch,
}

fn kind_for(index: usize) -> Kind {
    match index {
        4 => Kind::Transit,
        11 => Kind::Flare,
        17 => Kind::EclipsingBinary,
        23 => Kind::Gappy,
        29 => Kind::SingleEpoch,
        _ => Kind::Quiet,
    }
}

/// A few quiet stars come from a second pipeline so provider filtering has
/// something to reject. Every constructed anomaly stays with SPOC.
fn author_for(index: usize) -> &'static str {
    if index % 6 == 0 {
        "QLP"
    } else {
        "SPOC"
    }
}

struct Star {
    target_name: String,
    author: &'static str,
    distance: f64,
    time: Vec<f64>,
    flux: Vec<Option<f64>>,
}

fn light_curve(kind: Kind, start: f64, rng: &mut StdRng) -> (Vec<f64>, Vec<Option<f64>>) {
    let base: f64 = rng.random_range(500.0..5000.0);
    if kind == Kind::SingleEpoch {
        return (vec![start], vec![Some(base)]);
    }

    let noise = Normal::new(0.0, 0.001).expect("valid noise distribution");
    let drift: f64 = rng.random_range(-0.01..0.01);
    let period: f64 = rng.random_range(2.0..6.0);
    let phase: f64 = rng.random_range(0.0..period);
    let n = (SECTOR_DAYS / CADENCE_DAYS) as usize;

    let mut time = Vec::with_capacity(n);
    let mut flux = Vec::with_capacity(n);
    for i in 0..n {
        let dt = i as f64 * CADENCE_DAYS;
        if DOWNLINK_GAP.contains(&dt) {
            continue;
        }
        let x = dt / SECTOR_DAYS;
        let mut rel = 1.0 + drift * x + 0.5 * drift * x * x;

        match kind {
            Kind::Transit => {
                if (dt + phase) % period < 0.15 {
                    rel -= 0.01;
                }
            }
            Kind::Flare => {
                for onset in [6.3, 19.1] {
                    if dt >= onset {
                        rel += 0.05 * (-(dt - onset) / 0.1).exp();
                    }
                }
            }
            Kind::EclipsingBinary => {
                let orbit = ((dt + phase) % period) / period;
                if orbit < 0.04 {
                    rel -= 0.3;
                } else if (0.5..0.54).contains(&orbit) {
                    rel -= 0.1;
                }
            }
            Kind::Quiet | Kind::Gappy | Kind::SingleEpoch => {}
        }
        rel += noise.sample(rng);

        let missing = kind == Kind::Gappy && (i / 40) % 3 == 1;
        time.push(start + dt);
        flux.push(if missing { None } else { Some(base * rel) });
    }
    (time, flux)
}

fn generate_sector(sector: i64, start: f64, rng: &mut StdRng) -> Vec<Star> {
    (0..STARS_PER_SECTOR)
        .map(|index| {
            let (time, flux) = light_curve(kind_for(index), start, rng);
            Star {
                target_name: format!("TIC {}", 100_000_000 + sector * 1000 + index as i64),
                author: author_for(index),
                distance: rng.random_range(0.0..60.0),
                time,
                flux,
            }
        })
        .collect()
}

fn write_sector(path: &Path, sector: i64, stars: &[Star]) {
    let mut time_builder = ListBuilder::new(Float64Builder::new());
    let mut flux_builder = ListBuilder::new(Float64Builder::new());
    for star in stars {
        time_builder.values().append_slice(&star.time);
        time_builder.append(true);
        for &f in &star.flux {
            flux_builder.values().append_option(f);
        }
        flux_builder.append(true);
    }

    let names = StringArray::from(stars.iter().map(|s| s.target_name.as_str()).collect::<Vec<_>>());
    let authors = StringArray::from(stars.iter().map(|s| s.author).collect::<Vec<_>>());
    let sectors = Int64Array::from(vec![sector; stars.len()]);
    let distances = Float64Array::from(stars.iter().map(|s| s.distance).collect::<Vec<_>>());

    let list = |name: &str| {
        Field::new(
            name,
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        )
    };
    let schema = Arc::new(Schema::new(vec![
        list("time"),
        list("flux"),
        Field::new("target_name", DataType::Utf8, false),
        Field::new("author", DataType::Utf8, false),
        Field::new("sector", DataType::Int64, false),
        Field::new("distance", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(time_builder.finish()),
            Arc::new(flux_builder.finish()),
            Arc::new(names),
            Arc::new(authors),
            Arc::new(sectors),
            Arc::new(distances),
        ],
    )
    .expect("Failed to create RecordBatch");

    let file = std::fs::File::create(path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
}

fn main() {
    let dir = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("archive"));
    std::fs::create_dir_all(&dir).expect("Failed to create archive directory");

    let mut rng = StdRng::seed_from_u64(42);

    // TESS sectors 14 and 15 begin roughly at these BTJD epochs.
    for (sector, start) in [(14i64, 1683.35), (15, 1711.37)] {
        let stars = generate_sector(sector, start, &mut rng);
        let path = dir.join(format!("sector{sector}.parquet"));
        write_sector(&path, sector, &stars);
        println!(
            "Wrote {} light curves ({} anomalous by construction) to {}",
            stars.len(),
            (0..STARS_PER_SECTOR).filter(|&i| kind_for(i) != Kind::Quiet).count(),
            path.display()
        );
    }
}
