use std::path::Path;

use super::model::{
    is_integration_key, CellValue, DarkReferenceTable, FrameMetadata, MetadataTable,
    SpectralDataset, SpectralRecord, Timestamp,
};
use super::timestamp::validate;
use crate::error::{read_to_string, Result, SyncError};

/// Header used by the acquisition software for the timestamp column.
const KECM_TIMESTAMP: &str = "KecmTimestamp";

// ---------------------------------------------------------------------------
// Spectral log
// ---------------------------------------------------------------------------

/// Load a spectral log written by the acquisition software.
///
/// Layout:
///
/// ```text
/// FILE_START
/// KecmTimestamp,IntegrationTime,500.0,500.5,...
/// 20200101_000000.000000,50,0.12,0.14,...
/// ...
/// FILE_END
/// ```
///
/// The first line is always skipped. The timestamp column (`KecmTimestamp`,
/// `timestamp`, or an unnamed first column) is required. Rows whose timestamp
/// does not validate are dropped. Other cells are coerced with
/// [`CellValue::guess`].
pub fn load_spectral(path: &Path) -> Result<SpectralDataset<Timestamp>> {
    let text = read_to_string(path)?;
    let body = skip_first_line(&text);
    if body.trim().is_empty() {
        return Err(SyncError::EmptyDataset(path.display().to_string()));
    }

    let mut reader = csv_reader(body.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let ts_idx = timestamp_column(&headers)
        .ok_or_else(|| SyncError::MissingTimestampColumn(path.to_path_buf()))?;

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ts_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for (row_no, result) in reader.records().enumerate() {
        let row = result?;
        let raw = row.get(ts_idx).unwrap_or("");
        let timestamp = match validate(raw) {
            Ok(ts) => ts,
            Err(_) => {
                log::debug!("{}: dropping row {row_no} with timestamp {raw:?}", path.display());
                dropped += 1;
                continue;
            }
        };
        let values = (0..headers.len())
            .filter(|&i| i != ts_idx)
            .map(|i| row.get(i).map(CellValue::guess).unwrap_or(CellValue::Null))
            .collect();
        records.push(SpectralRecord { timestamp, values });
    }

    if records.is_empty() {
        return Err(SyncError::EmptyDataset(path.display().to_string()));
    }
    if dropped > 0 {
        log::warn!("{}: skipped {dropped} rows without a valid timestamp", path.display());
    }
    warn_if_unsorted(&records, path);
    log::info!(
        "Loaded {} spectra with {} columns from {}",
        records.len(),
        columns.len(),
        path.display()
    );
    Ok(SpectralDataset::new(columns, records))
}

fn skip_first_line(text: &str) -> &str {
    match text.find('\n') {
        Some(pos) => &text[pos + 1..],
        None => "",
    }
}

fn timestamp_column(headers: &[String]) -> Option<usize> {
    headers
        .iter()
        .position(|h| h == KECM_TIMESTAMP)
        .or_else(|| headers.iter().position(|h| h == "timestamp"))
        .or_else(|| match headers.first() {
            Some(first) if first.is_empty() || first == "0" => Some(0),
            _ => None,
        })
}

fn warn_if_unsorted<T: PartialOrd>(records: &[SpectralRecord<T>], path: &Path) {
    if records.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
        log::warn!(
            "{}: timestamps are not in ascending order; nearest-neighbour lookups assume they are",
            path.display()
        );
    }
}

fn csv_reader<R: std::io::Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

// ---------------------------------------------------------------------------
// Metadata seed
// ---------------------------------------------------------------------------

/// Load a single `key=value,key=value` line and replicate it `row_count` times.
///
/// Values become floats where they parse and stay text otherwise. Pieces
/// without `=` are ignored.
pub fn load_metadata(path: &Path, row_count: usize) -> Result<MetadataTable> {
    let text = read_to_string(path)?;
    let line = text.lines().next().unwrap_or("").trim();
    let table = parse_metadata_line(line, row_count);
    log::info!(
        "Loaded metadata columns {:?} from {} for {row_count} frames",
        table.columns,
        path.display()
    );
    Ok(table)
}

/// Parse a `key=value,...` line into a replicated table. See [`load_metadata`].
pub fn parse_metadata_line(line: &str, row_count: usize) -> MetadataTable {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for pair in line.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        columns.push(key.trim().to_string());
        values.push(CellValue::float_or_text(value));
    }
    MetadataTable::replicated(columns, values, row_count)
}

// ---------------------------------------------------------------------------
// Dark reference
// ---------------------------------------------------------------------------

/// Load baselines keyed by integration time.
///
/// The integration-time column may use any of the accepted aliases. A
/// `timestamp` column is ignored; every other cell becomes a float (`NaN` when
/// it does not parse). Rows without a numeric integration time are skipped.
pub fn load_dark_reference(path: &Path) -> Result<DarkReferenceTable> {
    let text = read_to_string(path)?;
    let mut reader = csv_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut table = DarkReferenceTable::default();
    for result in reader.records() {
        let row = result?;
        let mut integration = None;
        let mut baseline = Vec::new();
        for (key, value) in headers.iter().zip(row.iter()) {
            if is_integration_key(key) {
                integration = value.parse::<f64>().ok();
            } else if !is_timestamp_key(key) {
                baseline.push(value.parse::<f64>().unwrap_or(f64::NAN));
            }
        }
        match integration {
            Some(t) => table.insert(t, baseline),
            None => log::debug!("{}: dark row without integration time", path.display()),
        }
    }
    log::info!(
        "Loaded {} dark reference baselines from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

fn is_timestamp_key(key: &str) -> bool {
    let lowered: String = key
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    lowered == "timestamp"
}

// ---------------------------------------------------------------------------
// Live review tables (float seconds)
// ---------------------------------------------------------------------------

/// A CSV table with a `timestamp` column in seconds where every cell is a float.
struct FloatTable {
    columns: Vec<String>,
    rows: Vec<(f64, Vec<f64>)>,
}

fn load_float_table(path: &Path) -> Result<FloatTable> {
    let text = read_to_string(path)?;
    let mut reader = csv_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let ts_idx = headers
        .iter()
        .position(|h| h == "timestamp")
        .ok_or_else(|| SyncError::MissingTimestampColumn(path.to_path_buf()))?;

    let columns = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ts_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let row = result?;
        let parse = |i: usize| {
            row.get(i)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(f64::NAN)
        };
        let timestamp = parse(ts_idx);
        if !timestamp.is_finite() {
            log::warn!("{}: skipping row {row_no} without a numeric timestamp", path.display());
            continue;
        }
        let values = (0..headers.len()).filter(|&i| i != ts_idx).map(parse).collect();
        rows.push((timestamp, values));
    }
    Ok(FloatTable { columns, rows })
}

/// Load spectra for live review: `timestamp` in seconds, every other cell a
/// float (`NaN` when it does not parse).
pub fn load_live_spectra(path: &Path) -> Result<SpectralDataset<f64>> {
    let table = load_float_table(path)?;
    let records: Vec<SpectralRecord<f64>> = table
        .rows
        .into_iter()
        .map(|(timestamp, values)| SpectralRecord {
            timestamp,
            values: values.into_iter().map(CellValue::Float).collect(),
        })
        .collect();
    warn_if_unsorted(&records, path);
    log::info!("Loaded {} live spectra from {}", records.len(), path.display());
    Ok(SpectralDataset::new(table.columns, records))
}

/// Load a control-input log: row `i` becomes the metadata of frame `i`.
pub fn load_control_log(path: &Path) -> Result<Vec<FrameMetadata>> {
    let table = load_float_table(path)?;
    let records: Vec<FrameMetadata> = table
        .rows
        .into_iter()
        .map(|(timestamp, values)| FrameMetadata {
            timestamp,
            controls: table
                .columns
                .iter()
                .cloned()
                .zip(values.into_iter().map(CellValue::Float))
                .collect(),
        })
        .collect();
    log::info!("Loaded {} control log entries from {}", records.len(), path.display());
    Ok(records)
}
