use std::collections::{BTreeMap, BTreeSet};

use super::align::nearest_index_by;
use super::model::{CellValue, FrameMetadata};
use crate::error::{Result, SyncError};

/// Cells of the metadata editor as `(column header, cell text)`.
pub type TableCells = [(String, String)];

/// Frame-indexed metadata edited during a review session.
///
/// A frame's record is created the first time the frame is shown and is never
/// removed afterwards; frames that were never shown have no record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    records: BTreeMap<usize, FrameMetadata>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from a control log: entry `i` belongs to frame `i`.
    pub fn from_records(records: Vec<FrameMetadata>) -> Self {
        MetadataStore {
            records: records.into_iter().enumerate().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, frame: usize) -> Option<&FrameMetadata> {
        self.records.get(&frame)
    }

    /// Records in frame order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &FrameMetadata)> {
        self.records.iter().map(|(frame, meta)| (*frame, meta))
    }

    /// Record for a frame being shown, created empty on first visit. The
    /// stored timestamp follows the frame's current computed time.
    pub fn visit(&mut self, frame: usize, timestamp: f64) -> &FrameMetadata {
        let record = self.records.entry(frame).or_insert_with(|| {
            log::debug!("Creating metadata for frame {frame}");
            FrameMetadata::new(timestamp)
        });
        record.timestamp = timestamp;
        record
    }

    /// What the editor shows for a frame, in key order.
    pub fn table_cells(&self, frame: usize) -> Vec<(String, String)> {
        self.records
            .get(&frame)
            .map(|meta| {
                meta.controls
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Commit the editor contents for a frame.
    ///
    /// Every cell is parsed as a number. The parsed cells replace the frame's
    /// controls; a cell that does not parse is dropped from the update and
    /// reported in the returned warnings. Frames that were never shown are left alone.
    pub fn save_from_table(&mut self, frame: usize, cells: &TableCells) -> Vec<SyncError> {
        let Some(record) = self.records.get_mut(&frame) else {
            log::warn!("Ignoring metadata edits for frame {frame}, which has not been shown");
            return Vec::new();
        };

        let mut warnings = Vec::new();
        let mut updated = BTreeMap::new();
        for (field, text) in cells {
            match CellValue::parse_number(text) {
                Some(value) => {
                    updated.insert(field.clone(), value);
                }
                None => {
                    log::warn!("Invalid value in column '{field}': {text:?}");
                    warnings.push(SyncError::InvalidFieldValue {
                        field: field.clone(),
                        value: text.clone(),
                    });
                }
            }
        }
        record.controls = updated;
        warnings
    }

    /// Union of control names over every record, sorted.
    pub fn control_keys(&self) -> BTreeSet<&str> {
        self.records
            .values()
            .flat_map(|meta| meta.controls.keys().map(String::as_str))
            .collect()
    }

    /// Record whose timestamp is closest to `timestamp`, using the same
    /// tie-break and boundary rules as the spectral aligner.
    pub fn nearest(&self, timestamp: f64) -> Result<(usize, &FrameMetadata)> {
        let ordered: Vec<(usize, &FrameMetadata)> = self.iter().collect();
        let idx = nearest_index_by(&ordered, &timestamp, |(_, meta)| &meta.timestamp)
            .map_err(|_| SyncError::EmptyDataset("frame metadata".to_string()))?;
        Ok(ordered[idx])
    }
}
