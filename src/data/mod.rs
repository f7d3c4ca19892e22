/// Data layer: dataset inspection, filters, predicates and queries.
///
/// Architecture:
/// ```text
///  .parquet / .csv (cached locally)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  footer / header → DatasetHandle
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐   FilterSpec   ┌────────────┐
///   │  filter   │ ─────────────▶ │ predicate  │  conditions + bound params
///   └──────────┘                 └────────────┘
///        │                              │
///        ▼                              ▼
///   ┌──────────┐      SQL + params ┌──────────┐
///   │  query    │ ────────────────▶ │  engine   │  embedded DuckDB
///   └──────────┘                    └──────────┘
/// ```

pub mod engine;
pub mod filter;
pub mod loader;
pub mod model;
pub mod predicate;
pub mod query;
