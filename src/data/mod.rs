/// Data layer: core types, loading, alignment, conditioning and export.
///
/// Architecture:
/// ```text
///  frame_times.txt   parsed_data.txt   control_inputs_log.txt   darkreferencelog.txt
///        │                 │                    │                      │
///        ▼                 ▼                    ▼                      ▼
///   ┌───────────┐    ┌──────────┐                                      │
///   │ timestamp │    │  loader  │  parse files → Timestamp, SpectralDataset,
///   └───────────┘    └──────────┘                MetadataTable, DarkReferenceTable
///        │                 │
///        ▼                 ▼
///   ┌──────────┐     ┌──────────┐
///   │  align   │     │  filter  │  dark subtraction + smoothing → ConditionedSpectrum
///   └──────────┘     └──────────┘
///        │                 │
///        ▼                 ▼
///   ┌──────────┐     ┌──────────┐
///   │ metadata │ ──▶ │  export  │  aligned CSV, per-frame metadata CSV
///   └──────────┘     └──────────┘
/// ```
pub mod align;
pub mod export;
pub mod filter;
pub mod loader;
pub mod metadata;
pub mod model;
pub mod timestamp;
