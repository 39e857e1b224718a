use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeListArray, ListArray, StringArray,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{MetadataValue, RawSeries};

/// Metadata column holding the star identifier.
pub const IDENTIFIER_COLUMN: &str = "target_name";

const TIME_COLUMN: &str = "time";
const FLUX_COLUMN: &str = "flux";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a batch of light curves from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – Parquet file with `time` and `flux` list columns
/// * `.json`    – `[{ "time": [...], "flux": [...], ...meta }, ...]`
/// * `.csv`     – columns `time` and `flux` containing semicolon-separated floats
///
/// A malformed row is skipped with a warning; only file-level problems fail
/// the whole batch.
pub fn load_file(path: &Path) -> Result<Vec<RawSeries>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Assemble a series from parsed columns, or `None` if they do not pair up.
fn build_series(
    row: usize,
    time: Vec<f64>,
    flux: Vec<f64>,
    metadata: BTreeMap<String, MetadataValue>,
) -> Option<RawSeries> {
    if time.len() != flux.len() {
        log::warn!(
            "Row {row}: time has {} values but flux has {}, skipping",
            time.len(),
            flux.len()
        );
        return None;
    }
    let identifier = metadata
        .get(IDENTIFIER_COLUMN)
        .filter(|v| **v != MetadataValue::Null)
        .map(|v| v.to_string())
        .unwrap_or_default();

    let mut series = RawSeries::from_columns(identifier, &time, &flux);
    series.metadata = metadata;
    Some(series)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   {
///     "time": [1683.35, 1683.36, ...],
///     "flux": [1.0012, null, ...],
///     "target_name": "TIC 141914082",
///     "author": "SPOC",
///     "distance": 0.0
///   },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<Vec<RawSeries>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut series = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let Some(obj) = rec.as_object() else {
            log::warn!("Row {i} is not a JSON object, skipping");
            continue;
        };

        let columns = json_array_to_f64(obj.get(TIME_COLUMN), i, TIME_COLUMN)
            .and_then(|time| Ok((time, json_array_to_f64(obj.get(FLUX_COLUMN), i, FLUX_COLUMN)?)));
        let (time, flux) = match columns {
            Ok(columns) => columns,
            Err(e) => {
                log::warn!("{e:#}, skipping");
                continue;
            }
        };

        let metadata = obj
            .iter()
            .filter(|(key, _)| key.as_str() != TIME_COLUMN && key.as_str() != FLUX_COLUMN)
            .map(|(key, val)| (key.clone(), json_to_metadata(val)))
            .collect();

        series.extend(build_series(i, time, flux, metadata));
    }

    Ok(series)
}

/// Numbers pass through; `null` marks a missing measurement and becomes NaN.
fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| match v {
            JsonValue::Null => Ok(f64::NAN),
            other => other
                .as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number")),
        })
        .collect()
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// `time` and `flux` columns contain semicolon-separated floats:
///   `"1683.35;1683.36"`, `"1.0012;nan"`
/// All other columns are treated as metadata.
fn load_csv(path: &Path) -> Result<Vec<RawSeries>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let time_idx = headers
        .iter()
        .position(|h| h == TIME_COLUMN)
        .context("CSV missing 'time' column")?;
    let flux_idx = headers
        .iter()
        .position(|h| h == FLUX_COLUMN)
        .context("CSV missing 'flux' column")?;

    let mut series = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("CSV row {row_no}: {e}, skipping");
                continue;
            }
        };

        let columns = parse_semicolon_floats(record.get(time_idx).unwrap_or(""), row_no, TIME_COLUMN)
            .and_then(|time| {
                let flux =
                    parse_semicolon_floats(record.get(flux_idx).unwrap_or(""), row_no, FLUX_COLUMN)?;
                Ok((time, flux))
            });
        let (time, flux) = match columns {
            Ok(columns) => columns,
            Err(e) => {
                log::warn!("{e:#}, skipping");
                continue;
            }
        };

        let metadata = record
            .iter()
            .enumerate()
            .filter(|(col_idx, _)| *col_idx != time_idx && *col_idx != flux_idx)
            .filter_map(|(col_idx, value)| {
                headers
                    .get(col_idx)
                    .map(|name| (name.clone(), guess_metadata_type(value)))
            })
            .collect();

        series.extend(build_series(row_no, time, flux, metadata));
    }

    Ok(series)
}

/// Empty tokens are missing measurements; `nan` parses natively.
fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            let tok = tok.trim();
            if tok.is_empty() {
                return Ok(f64::NAN);
            }
            tok.parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn guess_metadata_type(s: &str) -> MetadataValue {
    if s.is_empty() {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" {
        return MetadataValue::Bool(s == "true");
    }
    MetadataValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing light curves.
///
/// Expected schema:
/// - `time`: List<Float64> or LargeList<Float64> – observation epochs (days)
/// - `flux`: List<Float64> or LargeList<Float64> – measured flux, nulls allowed
/// - Any other columns are treated as metadata (strings, ints, floats, bools)
fn load_parquet(path: &Path) -> Result<Vec<RawSeries>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut series = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let n_rows = batch.num_rows();

        let time_idx = schema
            .index_of(TIME_COLUMN)
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'time' column"))?;
        let flux_idx = schema
            .index_of(FLUX_COLUMN)
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'flux' column"))?;

        let time_col = batch.column(time_idx);
        let flux_col = batch.column(flux_idx);

        let meta_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_idx && *i != flux_idx)
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        for row in 0..n_rows {
            let columns = extract_f64_list(time_col, row)
                .with_context(|| format!("Row {row}: failed to read 'time'"))
                .and_then(|time| {
                    let flux = extract_f64_list(flux_col, row)
                        .with_context(|| format!("Row {row}: failed to read 'flux'"))?;
                    Ok((time, flux))
                });
            let (time, flux) = match columns {
                Ok(columns) => columns,
                Err(e) => {
                    log::warn!("{e:#}, skipping");
                    continue;
                }
            };

            let metadata = meta_cols
                .iter()
                .map(|(col_idx, col_name)| {
                    (col_name.clone(), extract_metadata_value(batch.column(*col_idx), row))
                })
                .collect();

            series.extend(build_series(row, time, flux, metadata));
        }
    }

    Ok(series)
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
/// Null entries inside the list become NaN.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a single metadata value from an Arrow column at a given row.
fn extract_metadata_value(col: &Arc<dyn Array>, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map_or(MetadataValue::Null, |s| MetadataValue::String(s.value(row).to_string())),
        DataType::LargeUtf8 => {
            MetadataValue::String(col.as_string::<i64>().value(row).to_string())
        }
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Integer(i64::from(a.value(row)))),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Integer(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Float(f64::from(a.value(row)))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Bool(a.value(row))),
        _ => MetadataValue::String(format!("{:?}", col.data_type())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn json_nulls_become_nan_and_identifier_is_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        fs::write(
            &path,
            r#"[
                {"time": [0.0, 1.0, 2.0], "flux": [1.0, null, 0.98],
                 "target_name": "TIC 100", "author": "SPOC", "distance": 1.5},
                {"time": [0.0, 1.0], "flux": [1.0], "target_name": "broken"},
                {"time": [0.0], "flux": [1.0]}
            ]"#,
        )
        .unwrap();

        let series = load_file(&path).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].identifier, "TIC 100");
        assert!(series[0].samples[1].flux.is_nan());
        assert_eq!(
            series[0].metadata.get("author"),
            Some(&MetadataValue::String("SPOC".into()))
        );
        assert!(series[1].identifier.is_empty());
    }

    #[test]
    fn csv_empty_and_nan_tokens_are_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.csv");
        fs::write(
            &path,
            "target_name,time,flux,sector\n\
             TIC 5,0.0;0.5;1.0,1.0;;nan,14\n\
             TIC 6,0.0;x,1.0;1.0,14\n",
        )
        .unwrap();

        let series = load_file(&path).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].identifier, "TIC 5");
        assert_eq!(series[0].len(), 3);
        assert!(series[0].samples[1].flux.is_nan());
        assert!(series[0].samples[2].flux.is_nan());
        assert_eq!(series[0].metadata.get("sector"), Some(&MetadataValue::Integer(14)));
    }

    #[test]
    fn csv_without_flux_column_fails_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.csv");
        fs::write(&path, "target_name,time\nTIC 1,0.0;1.0\n").unwrap();

        assert!(load_file(&path).is_err());
    }

    /// Four rows: a good one with a missing flux sample, a length mismatch,
    /// a null time list, and a second good one.
    fn write_sector_parquet(path: &Path) {
        use arrow::array::{Float32Builder, Float64Builder, LargeListBuilder, ListBuilder};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let mut time = ListBuilder::new(Float64Builder::new());
        let mut flux = LargeListBuilder::new(Float32Builder::new());

        time.values().append_slice(&[0.0, 1.0, 2.0]);
        time.append(true);
        flux.values().append_value(1.0);
        flux.values().append_null();
        flux.values().append_value(0.98);
        flux.append(true);

        time.values().append_slice(&[0.0, 1.0]);
        time.append(true);
        flux.values().append_value(1.0);
        flux.append(true);

        time.append(false);
        flux.values().append_value(1.0);
        flux.append(true);

        time.values().append_slice(&[5.0, 6.0]);
        time.append(true);
        flux.values().append_slice(&[2.0, 2.5]);
        flux.append(true);

        let schema = Arc::new(Schema::new(vec![
            Field::new(
                "time",
                DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
                true,
            ),
            Field::new(
                "flux",
                DataType::LargeList(Arc::new(Field::new("item", DataType::Float32, true))),
                false,
            ),
            Field::new("target_name", DataType::Utf8, false),
            Field::new("sector", DataType::Int32, false),
            Field::new("distance", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(time.finish()),
                Arc::new(flux.finish()),
                Arc::new(StringArray::from(vec!["TIC 1", "TIC 2", "TIC 3", "TIC 4"])),
                Arc::new(Int32Array::from(vec![14; 4])),
                Arc::new(Float64Array::from(vec![Some(1.5), Some(2.0), Some(3.0), None])),
            ],
        )
        .unwrap();

        let file = fs::File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn parquet_rows_load_with_bad_rows_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sector14.parquet");
        write_sector_parquet(&path);

        let series = load_file(&path).unwrap();

        let ids: Vec<&str> = series.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(ids, ["TIC 1", "TIC 4"]);

        let first = &series[0];
        assert_eq!(first.len(), 3);
        assert!(first.samples[1].flux.is_nan());
        assert!((first.samples[2].flux - 0.98).abs() < 1e-6);
        assert_eq!(first.metadata.get("distance"), Some(&MetadataValue::Float(1.5)));
        assert_eq!(first.metadata.get("sector"), Some(&MetadataValue::Integer(14)));
        assert!(!first.metadata.contains_key("flux"));

        assert_eq!(series[1].samples[1].flux, 2.5);
        assert_eq!(series[1].metadata.get("distance"), Some(&MetadataValue::Null));
    }

    #[test]
    fn parquet_without_flux_column_fails_the_file() {
        use arrow::array::{Float64Builder, ListBuilder};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.parquet");

        let mut time = ListBuilder::new(Float64Builder::new());
        time.values().append_slice(&[0.0, 1.0]);
        time.append(true);
        let schema = Arc::new(Schema::new(vec![Field::new(
            "time",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        )]));
        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(time.finish())]).unwrap();
        let mut writer = ArrowWriter::try_new(fs::File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let err = load_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("flux"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        assert!(load_file(Path::new("curves.fits")).is_err());
    }
}
