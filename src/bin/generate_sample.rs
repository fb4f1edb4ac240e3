use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime};

use spectra_sync::data::model::format_float;
use spectra_sync::data::timestamp::{FILE_START, TIMESTAMP_FORMAT};
use spectra_sync::DirectoryLayout;

const FPS: f64 = 30.0;
const FRAMES: usize = 150;
const SPECTRA_HZ: f64 = 30.0;
const INTEGRATION_MS: u32 = 50;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

fn generate_spectrum(
    wavelengths: &[f64],
    peaks: &[(f64, f64, f64)],
    baseline: &[f64],
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    wavelengths
        .iter()
        .zip(baseline)
        .map(|(&wl, &dark)| {
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(wl, mu, sigma, amp))
                .sum();
            dark + signal + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn stamp(start: NaiveDateTime, seconds: f64) -> String {
    let offset = Duration::microseconds((seconds * 1e6).round() as i64);
    (start + offset).format(TIMESTAMP_FORMAT).to_string()
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_float(*v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Writes a synthetic session directory: frame times at 30 fps, a 30 Hz
/// spectral log whose peak drifts over time, a metadata seed and a dark
/// reference for the integration time used.
fn main() -> anyhow::Result<()> {
    env_logger::init();
    let dir = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "sample_session".to_string()),
    );
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let layout = DirectoryLayout::default();

    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .context("invalid start time")?;
    let mut rng = SimpleRng::new(42);

    // Wavelengths: 500 → 699.5 nm, step 0.5
    let wavelengths: Vec<f64> = (0..400).map(|i| 500.0 + i as f64 * 0.5).collect();
    let baseline: Vec<f64> = wavelengths
        .iter()
        .map(|&wl| 0.02 + 0.00005 * (wl - 500.0))
        .collect();

    let mut frame_times = format!("{FILE_START}\n");
    for frame in 0..FRAMES {
        writeln!(frame_times, "{}", stamp(start, frame as f64 / FPS))?;
    }

    // Spectra start slightly after the first frame so alignment is not trivial.
    let duration = FRAMES as f64 / FPS;
    let spectra = (duration * SPECTRA_HZ) as usize;
    let mut spectral = format!(
        "{FILE_START}\nKecmTimestamp,IntegrationTime,{}\n",
        join(&wavelengths)
    );
    for i in 0..spectra {
        let t = 0.013 + i as f64 / SPECTRA_HZ;
        let drift = 580.0 + 40.0 * (t / duration);
        let peaks = [(drift, 6.0, 0.8), (650.0, 12.0, 0.3)];
        let values = generate_spectrum(&wavelengths, &peaks, &baseline, 0.01, &mut rng);
        writeln!(spectral, "{},{INTEGRATION_MS},{}", stamp(start, t), join(&values))?;
    }
    spectral.push_str("FILE_END\n");

    let metadata = "gain=2,mode=auto,laser_power=0.8\n";
    let dark = format!(
        "IntegrationTime,{}\n{INTEGRATION_MS},{}\n",
        join(&wavelengths),
        join(&baseline)
    );

    let files = [
        (layout.frame_times_in(&dir), frame_times),
        (layout.spectral_in(&dir), spectral),
        (layout.metadata_in(&dir), metadata.to_string()),
        (layout.dark_reference_in(&dir), dark),
    ];
    for (path, contents) in &files {
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    println!(
        "Wrote {FRAMES} frame times and {spectra} spectra ({} wavelengths each) to {}",
        wavelengths.len(),
        dir.display()
    );
    Ok(())
}
