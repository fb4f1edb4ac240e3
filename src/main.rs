use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use spectra_sync::data::loader;
use spectra_sync::data::metadata::MetadataStore;
use spectra_sync::data::model::DarkReferenceTable;
use spectra_sync::{FixedRateSource, FrameSource, LiveSession, SessionConfig, Session};

/// Align video frames, spectra and per-frame metadata.
#[derive(Parser, Debug)]
#[command(name = "spectra-sync", version)]
struct Cli {
    /// Session config (JSON). Defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a session directory and write the aligned CSV
    Export {
        dir: PathBuf,

        /// Output file (defaults to the configured output path inside `dir`)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Refuse to export unless every frame has exactly one spectral row
        #[arg(long)]
        strict: bool,
    },

    /// Print the aligned frame and conditioned spectrum of one spectral row
    Show {
        dir: PathBuf,

        #[arg(long, default_value_t = 0)]
        row: usize,
    },

    /// Step through frames of a live session and save per-frame metadata
    Review {
        /// Spectra CSV with a `timestamp` column in seconds
        spectra: PathBuf,

        /// Control log used to seed the metadata
        #[arg(long, value_name = "FILE")]
        controls: Option<PathBuf>,

        /// Dark reference CSV
        #[arg(long, value_name = "FILE")]
        dark: Option<PathBuf>,

        /// Number of video frames (defaults to one per spectrum)
        #[arg(long)]
        frames: Option<usize>,

        /// Frame rate (defaults to the configured rate)
        #[arg(long)]
        fps: Option<f64>,

        /// Metadata edit applied when the frame is shown
        #[arg(long = "edit", value_name = "FRAME:KEY=VALUE", value_parser = parse_edit)]
        edits: Vec<Edit>,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone)]
struct Edit {
    frame: usize,
    key: String,
    value: String,
}

fn parse_edit(s: &str) -> Result<Edit, String> {
    let (frame, assignment) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FRAME:KEY=VALUE, got {s:?}"))?;
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| format!("expected FRAME:KEY=VALUE, got {s:?}"))?;
    let frame = frame
        .trim()
        .parse()
        .map_err(|e| format!("invalid frame {frame:?}: {e}"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok(Edit {
        frame,
        key: key.trim().to_string(),
        value: value.trim().to_string(),
    })
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Command::Export {
            dir,
            output,
            strict,
        } => export(config, &dir, output.as_deref(), strict),
        Command::Show { dir, row } => show(config, &dir, row),
        Command::Review {
            spectra,
            controls,
            dark,
            frames,
            fps,
            edits,
            output,
        } => {
            let mut config = config;
            if let Some(fps) = fps {
                if !(fps > 0.0) {
                    bail!("--fps must be positive, got {fps}");
                }
                config.fps = fps;
            }
            review(
                &config,
                &spectra,
                controls.as_deref(),
                dark.as_deref(),
                frames,
                &edits,
                &output,
            )
        }
    }
}

/// The CLI does not decode video; frame timing comes from the frame times.
fn open_session(config: SessionConfig, dir: &Path) -> anyhow::Result<Session> {
    let fps = config.fps;
    let mut session = Session::new(config);
    let mut open_video = |path: &Path| -> spectra_sync::Result<Box<dyn FrameSource>> {
        log::info!("Not decoding {}; timing frames from frame times", path.display());
        Ok(Box::new(FixedRateSource::new(0, fps)))
    };
    session
        .import_directory(dir, &mut open_video)
        .with_context(|| format!("Failed to import {}", dir.display()))?;
    Ok(session)
}

fn export(config: SessionConfig, dir: &Path, output: Option<&Path>, strict: bool) -> anyhow::Result<()> {
    let mut session = open_session(config, dir)?;
    let rows = if strict {
        session.export_csv_strict(output)?
    } else {
        session.export_csv(output)?
    };
    let path = output.map(Path::to_path_buf).unwrap_or_else(|| session.output_path.clone());
    println!("Exported {rows} rows to {}", path.display());
    Ok(())
}

fn show(config: SessionConfig, dir: &Path, row: usize) -> anyhow::Result<()> {
    let mut session = open_session(config, dir)?;
    let total = session.spectral.len();
    let Some(view) = session.display_row(row) else {
        bail!("Row {row} is out of range ({total} spectral rows)");
    };

    println!("{}", view.title());
    if let Some(ts) = &view.frame_timestamp {
        println!("Frame timestamp: {ts}");
    }
    if view.spectrum.dark_subtracted {
        println!("Dark reference subtracted");
    }
    for (key, value) in &view.metadata {
        println!("  {key} = {value}");
    }
    for (key, value) in view.spectrum.pairs() {
        println!("{key}\t{value:.6}");
    }
    Ok(())
}

fn review(
    config: &SessionConfig,
    spectra_path: &Path,
    controls: Option<&Path>,
    dark: Option<&Path>,
    frames: Option<usize>,
    edits: &[Edit],
    output: &Path,
) -> anyhow::Result<()> {
    let spectra = loader::load_live_spectra(spectra_path)
        .with_context(|| format!("Failed to load spectra from {}", spectra_path.display()))?;
    let store = match controls {
        Some(path) => MetadataStore::from_records(loader::load_control_log(path)?),
        None => MetadataStore::new(),
    };
    let dark = match dark {
        Some(path) => loader::load_dark_reference(path)?,
        None => DarkReferenceTable::default(),
    };
    let frames = frames.unwrap_or(spectra.len());
    if frames == 0 {
        bail!("Nothing to review: no frames");
    }

    let source = Box::new(FixedRateSource::new(frames, config.fps));
    let mut session = LiveSession::new(config, source, spectra, store, dark);

    let mut view = session.update_display()?;
    loop {
        let mut cells = view.controls.clone();
        for edit in edits.iter().filter(|e| e.frame == view.frame) {
            match cells.iter_mut().find(|(k, _)| *k == edit.key) {
                Some(cell) => cell.1 = edit.value.clone(),
                None => cells.push((edit.key.clone(), edit.value.clone())),
            }
        }
        for warning in session.save_metadata_from_table(&cells) {
            eprintln!("Frame {}: {warning}", view.frame + 1);
        }
        println!("{}  {}", view.status(), view.title());

        let committed = session.store.table_cells(view.frame);
        match session.show_next_frame(&committed)? {
            Some(next) => view = next,
            None => break,
        }
    }

    let cells = session.store.table_cells(session.current_frame);
    session.save_metadata(output, &cells)?;
    println!("Saved metadata for {} frames to {}", session.store.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_arguments() {
        let edit = parse_edit("3:gain=2.5").unwrap();
        assert_eq!(edit.frame, 3);
        assert_eq!(edit.key, "gain");
        assert_eq!(edit.value, "2.5");
        assert!(parse_edit("gain=2").is_err());
        assert!(parse_edit("x:gain=2").is_err());
        assert!(parse_edit("1:=2").is_err());
    }

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from([
            "spectra-sync",
            "review",
            "spectra.csv",
            "--edit",
            "0:gain=1",
            "--edit",
            "2:mode=3",
            "-o",
            "metadata.csv",
        ])
        .unwrap();
        match cli.command {
            Command::Review { edits, frames, .. } => {
                assert_eq!(edits.len(), 2);
                assert_eq!(frames, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
