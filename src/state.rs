use std::path::{Path, PathBuf};

use crate::config::SessionConfig;
use crate::data::align::{nearest_index, nearest_index_by};
use crate::data::export;
use crate::data::filter::{condition, select_smoother, ConditionedSpectrum, Smoother};
use crate::data::loader;
use crate::data::metadata::{MetadataStore, TableCells};
use crate::data::model::{
    format_float, DarkReferenceTable, FrameMetadata, MetadataTable, SpectralDataset, Timestamp,
};
use crate::data::timestamp::load_frame_times;
use crate::error::{Result, SyncError};
use crate::source::{frame_seconds, FixedRateSource, FrameSource};

/// Opens the video file of a session directory.
pub type SourceOpener<'a> = dyn FnMut(&Path) -> Result<Box<dyn FrameSource>> + 'a;

/// Load the dark reference at `path`, or an empty table when there is none.
fn dark_reference_or_empty(path: &Path) -> Result<DarkReferenceTable> {
    match loader::load_dark_reference(path) {
        Ok(table) => Ok(table),
        Err(SyncError::FileNotFound(_)) => {
            log::warn!("No dark reference at {}; spectra are not dark-subtracted", path.display());
            Ok(DarkReferenceTable::default())
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Row-driven review session
// ---------------------------------------------------------------------------

/// What the presentation layer shows for one spectral row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub row: usize,
    pub total_rows: usize,
    /// Frame closest in time to the spectral row.
    pub frame: usize,
    pub total_frames: usize,
    pub spectral_timestamp: String,
    pub frame_timestamp: Option<String>,
    pub spectrum: ConditionedSpectrum,
    /// Metadata editor cells for `frame`.
    pub metadata: Vec<(String, String)>,
}

impl RowView {
    pub fn title(&self) -> String {
        let mut title = format!("Spectrum at {}", self.spectral_timestamp);
        if let Some(t) = self.spectrum.integration_time.filter(|t| !t.is_nan()) {
            title.push_str(&format!(" (Integration: {})", format_float(t)));
        }
        format!(
            "{title}\nRow {}/{} Frame {}/{}",
            self.row + 1,
            self.total_rows,
            self.frame + 1,
            self.total_frames
        )
    }
}

/// A review session over imported frame times, spectra and metadata, stepped
/// one spectral row at a time.
///
/// Imports either replace a dataset completely or leave the session untouched.
pub struct Session {
    pub config: SessionConfig,
    source: Option<Box<dyn FrameSource>>,
    smoother: Box<dyn Smoother>,

    pub frame_times: Vec<Timestamp>,
    pub spectral: SpectralDataset<Timestamp>,
    pub metadata: MetadataTable,
    pub dark_reference: DarkReferenceTable,

    pub total_frames: usize,
    pub current_frame: usize,
    pub current_row: usize,

    /// Where [`Session::export_csv`] writes when not given a path.
    pub output_path: PathBuf,

    /// Last user-visible notice (failed import, failed export, ...).
    pub status_message: Option<String>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let smoother = select_smoother(&config.filter);
        log::info!("Smoothing spectra with {}", smoother.name());
        Session {
            output_path: config.output_path.clone(),
            config,
            source: None,
            smoother,
            frame_times: Vec::new(),
            spectral: SpectralDataset::default(),
            metadata: MetadataTable::default(),
            dark_reference: DarkReferenceTable::default(),
            total_frames: 0,
            current_frame: 0,
            current_row: 0,
            status_message: None,
        }
    }

    pub fn smoother_name(&self) -> &'static str {
        self.smoother.name()
    }

    fn fail<T>(&mut self, what: &str, err: SyncError) -> Result<T> {
        log::error!("{what}: {err}");
        self.status_message = Some(format!("{what}: {err}"));
        Err(err)
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }

    // -- imports --

    /// Import a whole session directory (see [`crate::config::DirectoryLayout`]).
    ///
    /// Frame times, spectra and metadata must all be present and parse before
    /// anything is replaced. The current frame source is released before the
    /// directory's video is opened; without a video file a fixed-rate source
    /// sized to the frame times stands in.
    pub fn import_directory(
        &mut self,
        dir: &Path,
        open_video: &mut SourceOpener<'_>,
    ) -> Result<Option<RowView>> {
        let layout = self.config.layout.clone();
        let frame_times_path = layout.frame_times_in(dir);
        let spectral_path = layout.spectral_in(dir);
        let metadata_path = layout.metadata_in(dir);

        let missing: Vec<&PathBuf> = [&frame_times_path, &spectral_path, &metadata_path]
            .into_iter()
            .filter(|p| !p.exists())
            .collect();
        if let Some(first) = missing.first() {
            let names: Vec<String> = missing
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            let err = SyncError::FileNotFound((*first).clone());
            log::error!("Required data files not found: {}", names.join(", "));
            self.status_message = Some(format!(
                "Required data files not found: {}",
                names.join(", ")
            ));
            return Err(err);
        }

        let parsed = (|| -> Result<_> {
            let frame_times = load_frame_times(&frame_times_path)?;
            let spectral = loader::load_spectral(&spectral_path)?;
            let metadata = loader::load_metadata(&metadata_path, frame_times.len())?;
            let dark = dark_reference_or_empty(&layout.dark_reference_in(dir))?;
            Ok((frame_times, spectral, metadata, dark))
        })();
        let (frame_times, spectral, metadata, dark) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return self.fail("Error loading data", e),
        };

        self.release_source();
        let video = layout.video_in(dir);
        let source: Box<dyn FrameSource> = if video.exists() {
            match open_video(&video) {
                Ok(source) => source,
                Err(e) => {
                    log::warn!("Could not open {}: {e}", video.display());
                    Box::new(FixedRateSource::new(frame_times.len(), self.config.fps))
                }
            }
        } else {
            log::info!("No video in {}; using frame times only", dir.display());
            Box::new(FixedRateSource::new(frame_times.len(), self.config.fps))
        };

        self.total_frames = match source.frame_count() {
            0 => frame_times.len(),
            n => n,
        };
        self.source = Some(source);
        self.frame_times = frame_times;
        self.spectral = spectral;
        self.metadata = metadata;
        self.dark_reference = dark;
        self.output_path = dir.join(&self.config.output_path);
        self.current_frame = 0;
        self.current_row = 0;
        self.status_message = None;
        Ok(self.display_row(0))
    }

    /// Replace the spectral dataset and redisplay the current row, or the first
    /// row when the new dataset is shorter.
    pub fn import_spectral(&mut self, path: &Path) -> Result<Option<RowView>> {
        match loader::load_spectral(path) {
            Ok(spectral) => {
                self.spectral = spectral;
                if self.current_row >= self.spectral.len() {
                    self.current_row = 0;
                }
                self.status_message = None;
                Ok(self.display_row(self.current_row))
            }
            Err(e) => self.fail("Error loading data", e),
        }
    }

    /// Replace the frame times; the frame count follows the new file.
    pub fn import_frame_times(&mut self, path: &Path) -> Result<Option<RowView>> {
        match load_frame_times(path) {
            Ok(times) => {
                self.total_frames = times.len();
                self.frame_times = times;
                if self.current_frame >= self.total_frames {
                    self.current_frame = 0;
                }
                self.status_message = None;
                Ok(self.display_row(self.current_row))
            }
            Err(e) => self.fail("Error loading data", e),
        }
    }

    /// Replace the per-frame metadata with a seed file sized to the frame times.
    pub fn import_metadata(&mut self, path: &Path) -> Result<()> {
        match loader::load_metadata(path, self.frame_times.len()) {
            Ok(table) => {
                self.metadata = table;
                Ok(())
            }
            Err(e) => self.fail("Error loading data", e),
        }
    }

    /// Replace the dark reference table.
    pub fn import_dark_reference(&mut self, path: &Path) -> Result<()> {
        match loader::load_dark_reference(path) {
            Ok(table) => {
                self.dark_reference = table;
                Ok(())
            }
            Err(e) => self.fail("Error loading dark reference", e),
        }
    }

    // -- display & navigation --

    /// Show spectral row `row`: align it to the nearest frame, condition it and
    /// collect that frame's metadata. Rows outside the dataset are a no-op.
    pub fn display_row(&mut self, row: usize) -> Option<RowView> {
        let fields = self.spectral.fields(row)?;
        let record = &self.spectral.records[row];

        let frame = nearest_index(&self.frame_times, &record.timestamp).unwrap_or(0);
        let spectrum = condition(&fields, &self.dark_reference, self.smoother.as_ref());
        let metadata = self
            .metadata
            .row(frame)
            .map(|cells| {
                cells
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let view = RowView {
            row,
            total_rows: self.spectral.len(),
            frame,
            total_frames: self.total_frames,
            spectral_timestamp: record.timestamp.as_str().to_string(),
            frame_timestamp: self.frame_times.get(frame).map(|t| t.as_str().to_string()),
            spectrum,
            metadata,
        };
        self.current_row = row;
        self.current_frame = frame;
        Some(view)
    }

    /// Store the editor cells into the metadata row of the current frame.
    pub fn save_current_metadata(&mut self, cells: &TableCells) {
        for (column, text) in cells {
            self.metadata.set_text(self.current_frame, column, text);
        }
    }

    /// Flush the editor, then step to the next spectral row.
    pub fn next_row(&mut self, cells: &TableCells) -> Option<RowView> {
        if self.current_row + 1 >= self.spectral.len() {
            return None;
        }
        self.save_current_metadata(cells);
        self.display_row(self.current_row + 1)
    }

    /// Flush the editor, then step to the previous spectral row.
    pub fn prev_row(&mut self, cells: &TableCells) -> Option<RowView> {
        if self.current_row == 0 || self.spectral.is_empty() {
            return None;
        }
        self.save_current_metadata(cells);
        self.display_row(self.current_row - 1)
    }

    /// Jump back to the first row once frame times and spectra are loaded.
    pub fn analyze(&mut self) -> Result<RowView> {
        if self.spectral.is_empty() || self.frame_times.is_empty() {
            log::warn!("Analyze requested before frame times and spectra were imported");
            self.status_message =
                Some("Missing Data: import frame times and spectra first".to_string());
            return Err(SyncError::EmptyDataset("frame times or spectral data".to_string()));
        }
        self.display_row(0)
            .ok_or_else(|| SyncError::EmptyDataset("spectral data".to_string()))
    }

    // -- export --

    /// Write the aligned CSV, truncating spectra to the frame count.
    pub fn export_csv(&mut self, path: Option<&Path>) -> Result<usize> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| self.output_path.clone());
        match export::export_csv(&path, &self.frame_times, &self.spectral, &self.metadata) {
            Ok(rows) => {
                self.status_message = Some(format!("Exported {rows} rows to {}", path.display()));
                Ok(rows)
            }
            Err(e) => self.fail("Export failed", e),
        }
    }

    /// Write the aligned CSV only if every frame has exactly one spectral row.
    pub fn export_csv_strict(&mut self, path: Option<&Path>) -> Result<usize> {
        if let Err(e) = export::validate_row_counts(&self.frame_times, &self.spectral) {
            return self.fail("Export failed", e);
        }
        self.export_csv(path)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release_source();
    }
}

// ---------------------------------------------------------------------------
// Frame-driven live session
// ---------------------------------------------------------------------------

/// What the presentation layer shows for one video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    pub frame: usize,
    pub total_frames: usize,
    /// Seconds from the start of the video.
    pub timestamp: f64,
    /// Timestamp of the nearest spectrum.
    pub spectral_timestamp: f64,
    pub spectrum: ConditionedSpectrum,
    pub controls: Vec<(String, String)>,
}

impl FrameView {
    pub fn title(&self) -> String {
        let mut title = format!("Timestamp: {:.2}s", self.spectral_timestamp);
        if let Some(t) = self.spectrum.integration_time.filter(|t| !t.is_nan()) {
            title.push_str(&format!(" | Integration: {}", format_float(t)));
        }
        title
    }

    pub fn status(&self) -> String {
        format!("Frame {}/{}", self.frame + 1, self.total_frames)
    }
}

/// A session stepped frame by frame, timing frames from the source's rate and
/// editing per-frame metadata.
pub struct LiveSession {
    source: Box<dyn FrameSource>,
    fps: f64,
    smoother: Box<dyn Smoother>,
    pub spectra: SpectralDataset<f64>,
    pub store: MetadataStore,
    pub dark_reference: DarkReferenceTable,
    pub current_frame: usize,
    pub status_message: Option<String>,
}

impl LiveSession {
    pub fn new(
        config: &SessionConfig,
        source: Box<dyn FrameSource>,
        spectra: SpectralDataset<f64>,
        store: MetadataStore,
        dark_reference: DarkReferenceTable,
    ) -> Self {
        let fps = source.fps().unwrap_or(config.fps);
        let smoother = select_smoother(&config.filter);
        log::info!(
            "Live session: {} frames at {fps} fps, {} spectra, smoothing with {}",
            source.frame_count(),
            spectra.len(),
            smoother.name()
        );
        LiveSession {
            source,
            fps,
            smoother,
            spectra,
            store,
            dark_reference,
            current_frame: 0,
            status_message: None,
        }
    }

    /// Load spectra, an optional control log and an optional dark reference.
    /// A control log or dark reference path that does not exist is skipped.
    pub fn open(
        config: &SessionConfig,
        source: Box<dyn FrameSource>,
        spectra_path: &Path,
        control_log: Option<&Path>,
        dark_reference: Option<&Path>,
    ) -> Result<Self> {
        let spectra = loader::load_live_spectra(spectra_path)?;
        let store = match control_log {
            Some(path) if path.exists() => MetadataStore::from_records(loader::load_control_log(path)?),
            Some(path) => {
                log::warn!("Control log {} not found; starting with empty metadata", path.display());
                MetadataStore::new()
            }
            None => MetadataStore::new(),
        };
        let dark = match dark_reference {
            Some(path) => dark_reference_or_empty(path)?,
            None => DarkReferenceTable::default(),
        };
        Ok(Self::new(config, source, spectra, store, dark))
    }

    pub fn total_frames(&self) -> usize {
        self.source.frame_count()
    }

    pub fn frame_timestamp(&self, frame: usize) -> f64 {
        frame_seconds(frame, self.fps)
    }

    /// Show the current frame: nearest spectrum by time, conditioned, plus the
    /// frame's metadata (created on first visit).
    pub fn update_display(&mut self) -> Result<FrameView> {
        let frame = self.current_frame;
        let timestamp = self.frame_timestamp(frame);

        let idx = match nearest_index_by_time(&self.spectra, timestamp) {
            Ok(idx) => idx,
            Err(e) => {
                self.status_message = Some(format!("No spectra to show: {e}"));
                return Err(e);
            }
        };
        let record = &self.spectra.records[idx];
        let fields = self.spectra.fields_of(record);
        let spectrum = condition(&fields, &self.dark_reference, self.smoother.as_ref());
        let spectral_timestamp = record.timestamp;

        self.store.visit(frame, timestamp);
        let view = FrameView {
            frame,
            total_frames: self.total_frames(),
            timestamp,
            spectral_timestamp,
            spectrum,
            controls: self.store.table_cells(frame),
        };
        self.status_message = Some(view.status());
        Ok(view)
    }

    /// Commit the editor cells to the current frame's metadata. Cells that do
    /// not parse are returned and the last one is shown as the status.
    pub fn save_metadata_from_table(&mut self, cells: &TableCells) -> Vec<SyncError> {
        let warnings = self.store.save_from_table(self.current_frame, cells);
        if let Some(last) = warnings.last() {
            self.status_message = Some(last.to_string());
        }
        warnings
    }

    /// Flush the editor, then advance one frame. Stays put on the last frame.
    pub fn show_next_frame(&mut self, cells: &TableCells) -> Result<Option<FrameView>> {
        self.save_metadata_from_table(cells);
        if self.current_frame + 1 < self.total_frames() {
            self.current_frame += 1;
            return self.update_display().map(Some);
        }
        Ok(None)
    }

    /// Flush the editor, then go back one frame. Stays put on the first frame.
    pub fn show_prev_frame(&mut self, cells: &TableCells) -> Result<Option<FrameView>> {
        self.save_metadata_from_table(cells);
        if self.current_frame > 0 {
            self.current_frame -= 1;
            return self.update_display().map(Some);
        }
        Ok(None)
    }

    /// Metadata stored for the frame closest in time to `seconds`.
    pub fn nearest_metadata(&self, seconds: f64) -> Result<(usize, &FrameMetadata)> {
        self.store.nearest(seconds)
    }

    /// Flush the editor, then write the per-frame metadata CSV.
    pub fn save_metadata(&mut self, path: &Path, cells: &TableCells) -> Result<()> {
        self.save_metadata_from_table(cells);
        match export::save_frame_metadata(path, &self.store) {
            Ok(()) => {
                self.status_message = Some(format!("Saved metadata to {}", path.display()));
                Ok(())
            }
            Err(e) => {
                log::error!("{e}");
                self.status_message = Some(e.to_string());
                Err(e)
            }
        }
    }
}

fn nearest_index_by_time(spectra: &SpectralDataset<f64>, seconds: f64) -> Result<usize> {
    nearest_index_by(&spectra.records, &seconds, |r| &r.timestamp)
        .map_err(|_| SyncError::EmptyDataset("spectral data".to_string()))
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.source.release();
    }
}
