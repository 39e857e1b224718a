use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a metadata column
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value attached to a light curve
/// (target name, sector, provider, separation, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v:.4}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    /// Try to interpret the value as an `f64` (e.g. the `distance` column).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Borrow the value as text when it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RawSeries – one light curve as delivered by the archive
// ---------------------------------------------------------------------------

/// One (time, flux) measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub flux: f64,
}

/// A raw, irregularly sampled light curve.
///
/// Conditioning takes the series by value, so its sample buffer is released
/// as soon as that star has been processed, whatever the outcome.
#[derive(Debug, Clone)]
pub struct RawSeries {
    /// Target name. Not guaranteed unique or non-empty.
    pub identifier: String,
    pub samples: Vec<Sample>,
    /// Remaining columns of the archive row.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl RawSeries {
    pub fn new(identifier: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            identifier: identifier.into(),
            samples,
            metadata: BTreeMap::new(),
        }
    }

    /// Build a series from parallel time / flux columns.
    pub fn from_columns(identifier: impl Into<String>, time: &[f64], flux: &[f64]) -> Self {
        let samples = time
            .iter()
            .zip(flux)
            .map(|(&time, &flux)| Sample { time, flux })
            .collect();
        Self::new(identifier, samples)
    }

    #[cfg(test)]
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FeatureVector / FeatureMatrix
// ---------------------------------------------------------------------------

/// A conditioned light curve: fixed length, finite values only.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    /// Wrap already-conditioned values. Callers guarantee finiteness.
    pub(crate) fn from_conditioned(values: Vec<f64>) -> Self {
        debug_assert!(values.iter().all(|v| v.is_finite()));
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MatrixError {
    #[error("feature vector has {actual} values, matrix expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Feature vectors with their identifiers, index-aligned.
///
/// `identifier(i)` always describes `row(i)`; both collections only grow
/// through [`FeatureMatrix::push`].
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    dimension: usize,
    rows: Vec<FeatureVector>,
    identifiers: Vec<String>,
}

impl FeatureMatrix {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            rows: Vec::new(),
            identifiers: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        identifier: impl Into<String>,
        vector: FeatureVector,
    ) -> Result<(), MatrixError> {
        if vector.len() != self.dimension {
            return Err(MatrixError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.rows.push(vector);
        self.identifiers.push(identifier.into());
        Ok(())
    }

    /// Number of columns (the configured series length).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&FeatureVector> {
        self.rows.get(index)
    }

    pub fn identifier(&self, index: usize) -> Option<&str> {
        self.identifiers.get(index).map(String::as_str)
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    #[cfg(test)]
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }
}

// ---------------------------------------------------------------------------
// ScoredAnomaly – ephemeral, lives only while reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAnomaly<'a> {
    pub identifier: &'a str,
    pub vector: &'a FeatureVector,
    /// Model score, more negative is more anomalous.
    pub score: f64,
    /// 1-based position in ascending score order.
    pub rank: usize,
}
