use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;

// ---------------------------------------------------------------------------
// CellValue – a single cell of a delimited table
// ---------------------------------------------------------------------------

/// A table cell after numeric coercion.
///
/// Loaders try integer, then float, and keep the original text when neither
/// parses, so mixed-type columns survive a load untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl CellValue {
    /// Coerce a raw cell: integer, then float, then text. Empty cells are `Null`.
    pub fn guess(s: &str) -> CellValue {
        let s = s.trim();
        if s.is_empty() {
            return CellValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return CellValue::Float(f);
        }
        CellValue::Text(s.to_string())
    }

    /// Coerce a raw cell to a float, keeping the text when that fails.
    pub fn float_or_text(s: &str) -> CellValue {
        let s = s.trim();
        match s.parse::<f64>() {
            Ok(f) => CellValue::Float(f),
            Err(_) => CellValue::Text(s.to_string()),
        }
    }

    /// Parse an edited cell as a number. Text is rejected.
    pub fn parse_number(s: &str) -> Option<CellValue> {
        match CellValue::guess(s) {
            v @ (CellValue::Integer(_) | CellValue::Float(_)) => Some(v),
            _ => None,
        }
    }

    /// Numeric view of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Render for a CSV field. Missing values and `NaN` become an empty field.
    pub fn to_field(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Float(v) if v.is_nan() => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => f.write_str(&format_float(*v)),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Null => Ok(()),
        }
    }
}

/// Format a float for CSV output: integral
/// values keep a trailing `.0`, everything else uses the shortest round-trip form.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        let s = if v > 0.0 { "inf" } else { "-inf" };
        s.to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

// ---------------------------------------------------------------------------
// Timestamp – formatted log timestamp
// ---------------------------------------------------------------------------

/// A validated log timestamp. The original text is kept so exports reproduce
/// the input byte for byte.
#[derive(Debug, Clone)]
pub struct Timestamp {
    text: String,
    instant: NaiveDateTime,
}

impl Timestamp {
    pub(crate) fn new(text: String, instant: NaiveDateTime) -> Self {
        Timestamp { text, instant }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.instant == other.instant
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant.cmp(&other.instant)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ---------------------------------------------------------------------------
// Spectral records
// ---------------------------------------------------------------------------

/// Names accepted for the integration-time column, compared after lowercasing
/// and removing spaces.
const INTEGRATION_ALIASES: [&str; 3] = ["integrationtime", "integration_time", "integration"];

/// Whether `key` names the integration-time column.
pub fn is_integration_key(key: &str) -> bool {
    let lowered: String = key
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    INTEGRATION_ALIASES.contains(&lowered.as_str())
}

/// One spectral reading. `values` is positional against
/// [`SpectralDataset::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralRecord<T> {
    pub timestamp: T,
    pub values: Vec<CellValue>,
}

/// Spectral readings ordered by timestamp.
///
/// `T` is [`Timestamp`] for readings imported from formatted logs and `f64`
/// seconds for the live review path.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralDataset<T> {
    /// Column names other than `timestamp`, in file order.
    pub columns: Vec<String>,
    pub records: Vec<SpectralRecord<T>>,
}

impl<T> Default for SpectralDataset<T> {
    fn default() -> Self {
        SpectralDataset {
            columns: Vec::new(),
            records: Vec::new(),
        }
    }
}

impl<T> SpectralDataset<T> {
    pub fn new(columns: Vec<String>, records: Vec<SpectralRecord<T>>) -> Self {
        SpectralDataset { columns, records }
    }

    /// Number of spectral rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `(column, value)` pairs of one row, in column order.
    pub fn fields(&self, row: usize) -> Option<Vec<(&str, &CellValue)>> {
        let record = self.records.get(row)?;
        Some(self.fields_of(record))
    }

    /// `(column, value)` pairs of a record that belongs to this dataset.
    pub fn fields_of<'a>(&'a self, record: &'a SpectralRecord<T>) -> Vec<(&'a str, &'a CellValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(record.values.iter())
            .collect()
    }

    /// Integration time of a row, read from the first alias column that holds a number.
    pub fn integration_time(&self, row: usize) -> Option<f64> {
        let record = self.records.get(row)?;
        self.columns
            .iter()
            .zip(record.values.iter())
            .filter(|(col, _)| is_integration_key(col))
            .find_map(|(_, v)| v.as_f64())
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Row-major metadata table, one row per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl MetadataTable {
    /// Replicate a single row of values `row_count` times.
    pub fn replicated(columns: Vec<String>, values: Vec<CellValue>, row_count: usize) -> Self {
        MetadataTable {
            columns,
            rows: vec![values; row_count],
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(column, value)` pairs of one row.
    pub fn row(&self, index: usize) -> Option<Vec<(&str, &CellValue)>> {
        let row = self.rows.get(index)?;
        Some(self.columns.iter().map(String::as_str).zip(row.iter()).collect())
    }

    /// Store edited text into a cell. Unknown columns and rows are ignored.
    pub fn set_text(&mut self, row: usize, column: &str, text: &str) -> bool {
        let Some(col) = self.columns.iter().position(|c| c == column) else {
            return false;
        };
        match self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            Some(cell) => {
                *cell = CellValue::Text(text.to_string());
                true
            }
            None => false,
        }
    }
}

/// Per-frame annotations edited during a live review.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    /// Frame time in seconds from the start of the video.
    pub timestamp: f64,
    pub controls: BTreeMap<String, CellValue>,
}

impl FrameMetadata {
    pub fn new(timestamp: f64) -> Self {
        FrameMetadata {
            timestamp,
            controls: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dark reference
// ---------------------------------------------------------------------------

/// Baseline intensities keyed by integration time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DarkReferenceTable {
    entries: Vec<(f64, Vec<f64>)>,
}

impl DarkReferenceTable {
    /// Insert a baseline, replacing any earlier one with the same integration time.
    pub fn insert(&mut self, integration_time: f64, baseline: Vec<f64>) {
        match self.entries.iter_mut().find(|(t, _)| *t == integration_time) {
            Some(entry) => entry.1 = baseline,
            None => self.entries.push((integration_time, baseline)),
        }
    }

    /// Exact-match lookup.
    pub fn get(&self, integration_time: f64) -> Option<&[f64]> {
        self.entries
            .iter()
            .find(|(t, _)| *t == integration_time)
            .map(|(_, v)| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_coercion() {
        assert_eq!(CellValue::guess("12"), CellValue::Integer(12));
        assert_eq!(CellValue::guess(" 0.5 "), CellValue::Float(0.5));
        assert_eq!(CellValue::guess("FILE_END"), CellValue::Text("FILE_END".into()));
        assert_eq!(CellValue::guess(""), CellValue::Null);
        assert_eq!(CellValue::float_or_text("1"), CellValue::Float(1.0));
        assert_eq!(CellValue::parse_number("abc"), None);
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(-3.0), "-3.0");
        assert_eq!(CellValue::Float(f64::NAN).to_field(), "");
        assert_eq!(CellValue::Integer(2).to_field(), "2");
    }

    #[test]
    fn integration_aliases() {
        assert!(is_integration_key("IntegrationTime"));
        assert!(is_integration_key("Integration Time"));
        assert!(is_integration_key("integration_time"));
        assert!(is_integration_key("INTEGRATION"));
        assert!(!is_integration_key("integration_ms"));
        assert!(!is_integration_key("500"));
    }

    #[test]
    fn dark_table_replaces_duplicates() {
        let mut table = DarkReferenceTable::default();
        table.insert(50.0, vec![1.0, 2.0]);
        table.insert(50.0, vec![3.0]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(50.0), Some(&[3.0][..]));
        assert_eq!(table.get(51.0), None);
    }

    #[test]
    fn metadata_table_edits() {
        let mut table = MetadataTable::replicated(
            vec!["x".into()],
            vec![CellValue::Float(1.0)],
            2,
        );
        assert!(table.set_text(1, "x", "7"));
        assert!(!table.set_text(1, "missing", "7"));
        assert!(!table.set_text(5, "x", "7"));
        assert_eq!(table.rows[0][0], CellValue::Float(1.0));
        assert_eq!(table.rows[1][0], CellValue::Text("7".into()));
    }
}
