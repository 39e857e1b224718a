/// Data layer: core types, loading, and query filtering.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Vec<RawSeries>
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  provider / radius / limit → matching indices
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ FeatureMatrix │  conditioned vectors + identifiers (model)
///   └──────────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
