use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::metadata::MetadataStore;
use super::model::{format_float, CellValue, MetadataTable, SpectralDataset, Timestamp};
use super::timestamp::validate;
use crate::error::{read_to_string, Result, SyncError};

// ---------------------------------------------------------------------------
// Aligned export
// ---------------------------------------------------------------------------

/// One exported line: a frame with the spectral row and metadata row at the
/// same position.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    pub frame: usize,
    pub frame_timestamp: String,
    pub spectral_timestamp: String,
    pub spectral_values: Vec<CellValue>,
    pub metadata_values: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTable {
    pub header: Vec<String>,
    pub rows: Vec<AlignedRow>,
}

/// Fail unless there is exactly one spectral row per frame.
pub fn validate_row_counts(
    frame_times: &[Timestamp],
    spectral: &SpectralDataset<Timestamp>,
) -> Result<()> {
    if frame_times.len() != spectral.len() {
        return Err(SyncError::RowCountMismatch {
            frames: frame_times.len(),
            spectra: spectral.len(),
        });
    }
    Ok(())
}

/// Pair frames with spectral and metadata rows by position.
///
/// There is one output row per frame. Extra spectral rows are dropped; fewer
/// spectral rows than frames is a [`SyncError::RowCountMismatch`]. Missing
/// metadata rows export as empty cells.
pub fn align_rows(
    frame_times: &[Timestamp],
    spectral: &SpectralDataset<Timestamp>,
    metadata: &MetadataTable,
) -> Result<AlignedTable> {
    if spectral.len() < frame_times.len() {
        return Err(SyncError::RowCountMismatch {
            frames: frame_times.len(),
            spectra: spectral.len(),
        });
    }
    if spectral.len() > frame_times.len() {
        log::warn!(
            "Truncating {} spectral rows to {} frames",
            spectral.len(),
            frame_times.len()
        );
    }

    let mut header = vec![
        "frame".to_string(),
        "frame_timestamp".to_string(),
        "spectral_timestamp".to_string(),
    ];
    header.extend(spectral.columns.iter().cloned());
    header.extend(metadata.columns.iter().cloned());

    let padded = |values: Option<&Vec<CellValue>>, width: usize| -> Vec<CellValue> {
        (0..width)
            .map(|i| {
                values
                    .and_then(|v| v.get(i))
                    .cloned()
                    .unwrap_or(CellValue::Null)
            })
            .collect()
    };

    let rows = frame_times
        .iter()
        .zip(&spectral.records)
        .enumerate()
        .map(|(frame, (ts, record))| AlignedRow {
            frame,
            frame_timestamp: ts.as_str().to_string(),
            spectral_timestamp: record.timestamp.as_str().to_string(),
            spectral_values: padded(Some(&record.values), spectral.columns.len()),
            metadata_values: padded(metadata.rows.get(frame), metadata.columns.len()),
        })
        .collect();

    Ok(AlignedTable { header, rows })
}

/// Serialize an aligned table as CSV.
pub fn write_aligned<W: Write>(writer: W, table: &AlignedTable) -> std::result::Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&table.header)?;
    for row in &table.rows {
        let mut fields = Vec::with_capacity(table.header.len());
        fields.push(row.frame.to_string());
        fields.push(row.frame_timestamp.clone());
        fields.push(row.spectral_timestamp.clone());
        fields.extend(row.spectral_values.iter().map(CellValue::to_field));
        fields.extend(row.metadata_values.iter().map(CellValue::to_field));
        out.write_record(&fields)?;
    }
    out.flush()?;
    Ok(())
}

/// Write the aligned CSV to `path`, truncating spectral data to the frame count.
/// Fails without writing when there are fewer spectral rows than frames.
/// Returns the number of rows written.
pub fn export_csv(
    path: &Path,
    frame_times: &[Timestamp],
    spectral: &SpectralDataset<Timestamp>,
    metadata: &MetadataTable,
) -> Result<usize> {
    let table = align_rows(frame_times, spectral, metadata)?;
    let context = || format!("Failed to write CSV {}", path.display());
    let file = File::create(path).map_err(|e| SyncError::io(context(), e))?;
    write_aligned(file, &table).map_err(|e| SyncError::io(context(), e.into()))?;
    log::info!("Exported {} aligned rows to {}", table.rows.len(), path.display());
    Ok(table.rows.len())
}

/// Like [`export_csv`], but refuses to write unless frame and spectral row
/// counts are equal.
pub fn export_csv_strict(
    path: &Path,
    frame_times: &[Timestamp],
    spectral: &SpectralDataset<Timestamp>,
    metadata: &MetadataTable,
) -> Result<usize> {
    validate_row_counts(frame_times, spectral)?;
    export_csv(path, frame_times, spectral, metadata)
}

/// Read the `frame_timestamp` column of an aligned export back in.
pub fn load_exported_frame_times(path: &Path) -> Result<Vec<Timestamp>> {
    let text = read_to_string(path)?;
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let idx = reader
        .headers()?
        .iter()
        .position(|h| h == "frame_timestamp")
        .ok_or_else(|| SyncError::MissingTimestampColumn(path.to_path_buf()))?;

    let mut times = Vec::new();
    for result in reader.records() {
        let row = result?;
        times.push(validate(row.get(idx).unwrap_or(""))?);
    }
    if times.is_empty() {
        return Err(SyncError::EmptyDataset(path.display().to_string()));
    }
    Ok(times)
}

// ---------------------------------------------------------------------------
// Per-frame metadata export
// ---------------------------------------------------------------------------

/// Serialize frame metadata as CSV: `timestamp` followed by every control name
/// seen on any frame, sorted. Controls a frame lacks export as empty cells.
/// An empty store writes nothing.
pub fn write_frame_metadata<W: Write>(
    writer: W,
    store: &MetadataStore,
) -> std::result::Result<(), csv::Error> {
    if store.is_empty() {
        return Ok(());
    }
    let keys = store.control_keys();
    let mut out = csv::Writer::from_writer(writer);

    let mut header = vec!["timestamp"];
    header.extend(keys.iter().copied());
    out.write_record(&header)?;

    for (_, meta) in store.iter() {
        let mut fields = vec![format_float(meta.timestamp)];
        fields.extend(keys.iter().map(|k| {
            meta.controls
                .get(*k)
                .map(CellValue::to_field)
                .unwrap_or_default()
        }));
        out.write_record(&fields)?;
    }
    out.flush()?;
    Ok(())
}

/// Write frame metadata to `path`. See [`write_frame_metadata`].
pub fn save_frame_metadata(path: &Path, store: &MetadataStore) -> Result<()> {
    let context = || format!("Failed to save file {}", path.display());
    let file = File::create(path).map_err(|e| SyncError::io(context(), e))?;
    write_frame_metadata(file, store).map_err(|e| SyncError::io(context(), e.into()))?;
    log::info!("Saved metadata for {} frames to {}", store.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{FrameMetadata, SpectralRecord};

    fn ts(s: &str) -> Timestamp {
        validate(s).unwrap()
    }

    fn frames(n: usize) -> Vec<Timestamp> {
        (0..n)
            .map(|i| ts(&format!("20200101_0000{i:02}.000000")))
            .collect()
    }

    fn spectra(n: usize) -> SpectralDataset<Timestamp> {
        let records = (0..n)
            .map(|i| SpectralRecord {
                timestamp: ts(&format!("20200101_0000{i:02}.500000")),
                values: vec![CellValue::Integer(50), CellValue::Float(i as f64 + 0.5)],
            })
            .collect();
        SpectralDataset::new(vec!["IntegrationTime".into(), "500".into()], records)
    }

    #[test]
    fn strict_validator() {
        assert!(validate_row_counts(&frames(2), &spectra(2)).is_ok());
        assert!(matches!(
            validate_row_counts(&frames(1), &spectra(2)),
            Err(SyncError::RowCountMismatch { frames: 1, spectra: 2 })
        ));
    }

    #[test]
    fn aligned_rows_truncate_long_spectra() {
        let metadata = MetadataTable::replicated(vec!["x".into()], vec![CellValue::Float(1.0)], 2);

        let table = align_rows(&frames(2), &spectra(3), &metadata).unwrap();
        assert_eq!(
            table.header,
            ["frame", "frame_timestamp", "spectral_timestamp", "IntegrationTime", "500", "x"]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].spectral_timestamp, "20200101_000001.500000");

        // Metadata shorter than the frames pads with empty cells.
        let table = align_rows(&frames(3), &spectra(3), &metadata).unwrap();
        assert_eq!(table.rows[2].metadata_values, [CellValue::Null]);
    }

    #[test]
    fn short_spectra_fail_export_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        let metadata = MetadataTable::replicated(vec!["x".into()], vec![CellValue::Float(1.0)], 3);
        assert!(matches!(
            align_rows(&frames(3), &spectra(1), &metadata),
            Err(SyncError::RowCountMismatch { frames: 3, spectra: 1 })
        ));
        let err = export_csv(&path, &frames(3), &spectra(1), &metadata);
        assert!(matches!(err, Err(SyncError::RowCountMismatch { frames: 3, spectra: 1 })));
        assert!(!path.exists());
    }

    #[test]
    fn aligned_csv_layout() {
        let metadata = MetadataTable::replicated(
            vec!["x".into(), "y".into()],
            vec![CellValue::Float(1.0), CellValue::Text("foo".into())],
            2,
        );
        let mut buf = Vec::new();
        write_aligned(&mut buf, &align_rows(&frames(2), &spectra(2), &metadata).unwrap()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "frame,frame_timestamp,spectral_timestamp,IntegrationTime,500,x,y",
                "0,20200101_000000.000000,20200101_000000.500000,50,0.5,1.0,foo",
                "1,20200101_000001.000000,20200101_000001.500000,50,1.5,1.0,foo",
            ]
        );
    }

    #[test]
    fn export_round_trips_frame_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        let times = frames(4);
        let written = export_csv(&path, &times, &spectra(4), &MetadataTable::default()).unwrap();
        assert_eq!(written, 4);
        let back = load_exported_frame_times(&path).unwrap();
        let raw: Vec<&str> = back.iter().map(|t| t.as_str()).collect();
        let expected: Vec<&str> = times.iter().map(|t| t.as_str()).collect();
        assert_eq!(raw, expected);
    }

    #[test]
    fn strict_export_writes_nothing_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        let err = export_csv_strict(&path, &frames(2), &spectra(3), &MetadataTable::default());
        assert!(matches!(err, Err(SyncError::RowCountMismatch { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn export_failure_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("output.csv");
        let err = export_csv(&path, &frames(1), &spectra(1), &MetadataTable::default());
        match err {
            Err(SyncError::Io { context, .. }) => assert!(context.starts_with("Failed to write CSV")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn frame_metadata_union() {
        let store = MetadataStore::from_records(vec![
            FrameMetadata {
                timestamp: 0.0,
                controls: [("a".to_string(), CellValue::Integer(1))].into_iter().collect(),
            },
            FrameMetadata {
                timestamp: 1.0,
                controls: [("b".to_string(), CellValue::Integer(2))].into_iter().collect(),
            },
        ]);
        let mut buf = Vec::new();
        write_frame_metadata(&mut buf, &store).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["timestamp,a,b", "0.0,1,", "1.0,,2"]);
    }

    #[test]
    fn empty_store_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.csv");
        save_frame_metadata(&path, &MetadataStore::new()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
