//! Temporal alignment of video frames, spectral readings and per-frame
//! metadata, with spectral conditioning and CSV export.

pub mod config;
pub mod data;
pub mod error;
pub mod source;
pub mod state;

pub use config::{DirectoryLayout, FilterSettings, SessionConfig, SmoothingStrategy};
pub use data::filter::{ConditionedSpectrum, Smoother};
pub use data::metadata::MetadataStore;
pub use data::model::{CellValue, SpectralDataset, Timestamp};
pub use error::{Result, SyncError};
pub use source::{FixedRateSource, FrameSource};
pub use state::{FrameView, LiveSession, RowView, Session};
