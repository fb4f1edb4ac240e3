use std::path::Path;

use chrono::NaiveDateTime;

use super::model::Timestamp;
use crate::error::{read_to_string, Result, SyncError};

/// Layout of every timestamp in frame-time and spectral logs,
/// e.g. `20200101_000000.000000`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S.%6f";

/// Sentinel written by the acquisition software at the start of a log.
pub const FILE_START: &str = "FILE_START";

/// Parse `text` under [`TIMESTAMP_FORMAT`]. Surrounding whitespace is not accepted.
pub fn validate(text: &str) -> Result<Timestamp> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|instant| Timestamp::new(text.to_string(), instant))
        .map_err(|_| SyncError::InvalidTimestamp(text.to_string()))
}

/// Read a frame-time file. See [`parse_frame_times`].
pub fn load_frame_times(path: &Path) -> Result<Vec<Timestamp>> {
    let text = read_to_string(path)?;
    let times = parse_frame_times(&text, &path.display().to_string())?;
    log::info!("Loaded {} frame times from {}", times.len(), path.display());
    Ok(times)
}

/// Extract one timestamp per frame from the text of a frame-time file.
///
/// Blank lines, the `FILE_START` sentinel and header lines are skipped. A CSV
/// line whose first field is a frame counter (or starts with `frame`) yields its
/// last field. Any other line must be a valid timestamp. `source` names the
/// input in the empty-dataset error.
pub fn parse_frame_times(text: &str, source: &str) -> Result<Vec<Timestamp>> {
    let mut times = Vec::new();
    for line in text.lines() {
        let Some(candidate) = frame_time_field(line) else {
            continue;
        };
        times.push(validate(candidate)?);
    }
    if times.is_empty() {
        return Err(SyncError::EmptyDataset(source.to_string()));
    }
    Ok(times)
}

/// The timestamp field of one frame-time line, or `None` for lines to skip.
fn frame_time_field(line: &str) -> Option<&str> {
    let mut ts = line.trim();
    if ts.is_empty() || ts == FILE_START {
        return None;
    }
    if ts.contains(',') {
        let parts: Vec<&str> = ts.split(',').map(str::trim).collect();
        let first = parts[0];
        let is_counter = !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit());
        if (starts_with_ignore_case(first, "frame") || is_counter) && parts.len() > 1 {
            ts = parts[parts.len() - 1];
        }
    }
    if starts_with_ignore_case(ts, "timestamp") || starts_with_ignore_case(ts, "frame") {
        log::debug!("Skipping header line {line:?}");
        return None;
    }
    Some(ts)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_strict_format() {
        let ts = validate("20200101_000001.250000").unwrap();
        assert_eq!(ts.as_str(), "20200101_000001.250000");
        assert_eq!(
            ts.instant().format("%H:%M:%S%.3f").to_string(),
            "00:00:01.250"
        );
    }

    #[test]
    fn validate_rejects_other_layouts() {
        for bad in [
            "FILE_END",
            "2020-01-01 00:00:00",
            "20200101_000000",
            "20200101_000000.000000 ",
            "20201301_000000.000000",
            "",
        ] {
            assert!(
                matches!(validate(bad), Err(SyncError::InvalidTimestamp(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn plain_lines_with_sentinel() {
        let text = "FILE_START\n20200101_000000.000000\n\n20200101_000000.033333\n";
        let times = parse_frame_times(text, "mem").unwrap();
        let raw: Vec<&str> = times.iter().map(|t| t.as_str()).collect();
        assert_eq!(raw, ["20200101_000000.000000", "20200101_000000.033333"]);
    }

    #[test]
    fn csv_lines_use_last_field() {
        let text = "frame,timestamp\n0,20200101_000000.000000\n1, 20200101_000000.100000\n";
        let times = parse_frame_times(text, "mem").unwrap();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1].as_str(), "20200101_000000.100000");
    }

    #[test]
    fn timestamp_header_is_skipped() {
        let text = "Timestamp\n20200101_000000.000000\n";
        assert_eq!(parse_frame_times(text, "mem").unwrap().len(), 1);
    }

    #[test]
    fn invalid_line_fails_whole_file() {
        let text = "20200101_000000.000000\nnot-a-time\n";
        assert!(matches!(
            parse_frame_times(text, "mem"),
            Err(SyncError::InvalidTimestamp(s)) if s == "not-a-time"
        ));
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(matches!(
            parse_frame_times("FILE_START\n\n", "frames.txt"),
            Err(SyncError::EmptyDataset(s)) if s == "frames.txt"
        ));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        assert!(matches!(
            load_frame_times(&path),
            Err(SyncError::FileNotFound(p)) if p == path
        ));
    }
}
