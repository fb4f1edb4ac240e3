use std::f64::consts::PI;

use super::model::{is_integration_key, CellValue, DarkReferenceTable};
use crate::config::{FilterSettings, SmoothingStrategy};

// ---------------------------------------------------------------------------
// Smoothing strategies
// ---------------------------------------------------------------------------

/// A low-pass smoother applied to one intensity-vs-wavelength curve at a time.
///
/// Implementations return exactly as many samples as they are given.
pub trait Smoother {
    /// Short label for logs and status lines.
    fn name(&self) -> &'static str;

    fn smooth(&self, row: &[f64]) -> Vec<f64>;

    /// Smooth each row independently.
    fn smooth_rows(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.smooth(row)).collect()
    }
}

/// Windowed-sinc FIR low-pass (Hamming window, unity gain at DC).
#[derive(Debug, Clone)]
pub struct WindowedFir {
    coefficients: Vec<f64>,
}

impl WindowedFir {
    /// Design a `taps`-long low-pass filter for `cutoff` at `sample_rate`.
    ///
    /// Returns `None` when the cutoff does not lie strictly between zero and
    /// the Nyquist frequency, or when `taps` is zero.
    pub fn design(taps: usize, cutoff: f64, sample_rate: f64) -> Option<Self> {
        let nyquist = sample_rate / 2.0;
        if taps == 0 || !(sample_rate > 0.0) || !(cutoff > 0.0 && cutoff < nyquist) {
            return None;
        }
        if taps == 1 {
            return Some(WindowedFir {
                coefficients: vec![1.0],
            });
        }

        // Cutoff in cycles per sample.
        let fc = cutoff / sample_rate;
        let m = (taps - 1) as f64;
        let mut coefficients: Vec<f64> = (0..taps)
            .map(|n| {
                let n = n as f64;
                let x = n - m / 2.0;
                let sinc = if x == 0.0 {
                    2.0 * fc
                } else {
                    (2.0 * PI * fc * x).sin() / (PI * x)
                };
                let window = 0.54 - 0.46 * (2.0 * PI * n / m).cos();
                sinc * window
            })
            .collect();

        let sum: f64 = coefficients.iter().sum();
        if !(sum.abs() > f64::EPSILON) {
            return None;
        }
        coefficients.iter_mut().for_each(|c| *c /= sum);
        Some(WindowedFir { coefficients })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl Smoother for WindowedFir {
    fn name(&self) -> &'static str {
        "windowed FIR"
    }

    fn smooth(&self, row: &[f64]) -> Vec<f64> {
        convolve_edge_padded(row, &self.coefficients)
    }
}

/// Uniform-weight fallback: a centred moving average over `taps` samples.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    coefficients: Vec<f64>,
}

impl MovingAverage {
    pub fn new(taps: usize) -> Self {
        let taps = taps.max(1);
        MovingAverage {
            coefficients: vec![1.0 / taps as f64; taps],
        }
    }
}

impl Smoother for MovingAverage {
    fn name(&self) -> &'static str {
        "moving average"
    }

    fn smooth(&self, row: &[f64]) -> Vec<f64> {
        convolve_edge_padded(row, &self.coefficients)
    }
}

/// Convolve `row` with `coefficients`, padding `taps / 2` copies of the first
/// and last samples on either side so the output keeps the input length.
fn convolve_edge_padded(row: &[f64], coefficients: &[f64]) -> Vec<f64> {
    let (Some(&first), Some(&last)) = (row.first(), row.last()) else {
        return Vec::new();
    };
    let pad = coefficients.len() / 2;
    let mut padded = Vec::with_capacity(row.len() + 2 * pad);
    padded.extend(std::iter::repeat(first).take(pad));
    padded.extend_from_slice(row);
    padded.extend(std::iter::repeat(last).take(pad));

    (0..row.len())
        .map(|i| {
            coefficients
                .iter()
                .zip(&padded[i..])
                .map(|(c, x)| c * x)
                .sum::<f64>()
        })
        .collect()
}

/// Pick the smoothing strategy once, at session start.
///
/// `Auto` and `WindowedFir` use the designed filter when the settings allow a
/// valid design and fall back to the moving average otherwise.
pub fn select_smoother(settings: &FilterSettings) -> Box<dyn Smoother> {
    let fallback = || -> Box<dyn Smoother> { Box::new(MovingAverage::new(settings.taps)) };
    match settings.strategy {
        SmoothingStrategy::MovingAverage => fallback(),
        SmoothingStrategy::Auto | SmoothingStrategy::WindowedFir => {
            match WindowedFir::design(settings.taps, settings.cutoff, settings.sample_rate) {
                Some(fir) => Box::new(fir),
                None => {
                    log::warn!(
                        "Cannot design a {}-tap FIR for cutoff {} at {} Hz; using moving average",
                        settings.taps,
                        settings.cutoff,
                        settings.sample_rate
                    );
                    fallback()
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Conditioning
// ---------------------------------------------------------------------------

/// One spectral reading after dark subtraction and smoothing, ordered by wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedSpectrum {
    /// Channel column names, as they appeared in the source.
    pub keys: Vec<String>,
    pub wavelengths: Vec<f64>,
    pub values: Vec<f64>,
    pub integration_time: Option<f64>,
    pub dark_subtracted: bool,
}

impl ConditionedSpectrum {
    /// `(key, smoothed value)` pairs in wavelength order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.keys.iter().map(String::as_str).zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Channel columns of a reading, sorted by numeric wavelength.
///
/// `timestamp`, the integration-time column and any column whose name is not
/// a finite number are left out. Cells without a numeric value read as `NaN`.
pub fn channels(fields: &[(&str, &CellValue)]) -> Vec<(String, f64, f64)> {
    let mut out: Vec<(String, f64, f64)> = fields
        .iter()
        .filter(|(key, _)| *key != "timestamp" && !is_integration_key(key))
        .filter_map(|(key, value)| {
            let wavelength = key.trim().parse::<f64>().ok().filter(|w| w.is_finite())?;
            Some((key.to_string(), wavelength, value.as_f64().unwrap_or(f64::NAN)))
        })
        .collect();
    out.sort_by(|a, b| a.1.total_cmp(&b.1));
    out
}

/// Integration time of a reading, if an alias column holds a number.
pub fn integration_time(fields: &[(&str, &CellValue)]) -> Option<f64> {
    fields
        .iter()
        .filter(|(key, _)| is_integration_key(key))
        .find_map(|(_, value)| value.as_f64())
}

/// Subtract the matching dark baseline in place.
///
/// Nothing happens unless there is a baseline for exactly `integration_time`
/// with exactly as many samples as `values`. Returns whether it subtracted.
pub fn subtract_dark(
    values: &mut [f64],
    integration_time: Option<f64>,
    dark: &DarkReferenceTable,
) -> bool {
    let Some(baseline) = integration_time.and_then(|t| dark.get(t)) else {
        return false;
    };
    if baseline.len() != values.len() {
        log::debug!(
            "Dark baseline has {} samples, spectrum has {}; not subtracting",
            baseline.len(),
            values.len()
        );
        return false;
    }
    values.iter_mut().zip(baseline).for_each(|(v, d)| *v -= d);
    true
}

/// Dark-subtract and smooth one reading.
pub fn condition(
    fields: &[(&str, &CellValue)],
    dark: &DarkReferenceTable,
    smoother: &dyn Smoother,
) -> ConditionedSpectrum {
    let channels = channels(fields);
    let integration_time = integration_time(fields);

    let mut keys = Vec::with_capacity(channels.len());
    let mut wavelengths = Vec::with_capacity(channels.len());
    let mut values = Vec::with_capacity(channels.len());
    for (key, wavelength, value) in channels {
        keys.push(key);
        wavelengths.push(wavelength);
        values.push(value);
    }

    let dark_subtracted = subtract_dark(&mut values, integration_time, dark);
    let values = smoother.smooth(&values);

    ConditionedSpectrum {
        keys,
        wavelengths,
        values,
        integration_time,
        dark_subtracted,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn default_fir() -> WindowedFir {
        WindowedFir::design(101, 10.0, 2047.0).unwrap()
    }

    #[test]
    fn fir_design_is_symmetric_with_unity_gain() {
        let fir = default_fir();
        let c = fir.coefficients();
        assert_eq!(c.len(), 101);
        assert_relative_eq!(c.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        for i in 0..c.len() {
            assert_relative_eq!(c[i], c[c.len() - 1 - i], epsilon = 1e-15);
        }
        assert!(c[50] > c[0]);
    }

    #[test]
    fn fir_design_rejects_bad_cutoff() {
        assert!(WindowedFir::design(101, 0.0, 2047.0).is_none());
        assert!(WindowedFir::design(101, 2000.0, 2047.0).is_none());
        assert!(WindowedFir::design(0, 10.0, 2047.0).is_none());
        assert!(WindowedFir::design(101, 10.0, 0.0).is_none());
    }

    #[test]
    fn output_length_matches_input() {
        let smoothers: [Box<dyn Smoother>; 2] =
            [Box::new(default_fir()), Box::new(MovingAverage::new(101))];
        for smoother in &smoothers {
            for n in [0usize, 1, 2, 7, 50, 101, 300] {
                let row: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).sin()).collect();
                assert_eq!(smoother.smooth(&row).len(), n, "{} n={n}", smoother.name());
            }
        }
    }

    #[test]
    fn constant_input_is_preserved() {
        let row = vec![3.5; 40];
        for value in default_fir().smooth(&row) {
            assert_relative_eq!(value, 3.5, epsilon = 1e-9);
        }
        for value in MovingAverage::new(101).smooth(&row) {
            assert_relative_eq!(value, 3.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn strategies_agree_on_smooth_input() {
        // A slow ramp: any symmetric unit-gain kernel reproduces it away from the edges.
        let row: Vec<f64> = (0..400).map(|i| 0.01 * i as f64 + 2.0).collect();
        let fir = default_fir().smooth(&row);
        let avg = MovingAverage::new(101).smooth(&row);
        for i in 60..340 {
            assert_relative_eq!(fir[i], avg[i], epsilon = 1e-9);
            assert_relative_eq!(fir[i], row[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn smooth_rows_is_per_row() {
        let smoother = MovingAverage::new(3);
        let rows = vec![vec![0.0, 3.0, 0.0], vec![1.0]];
        let out = smoother.smooth_rows(&rows);
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[0][1], 1.0);
        assert_relative_eq!(out[0][0], 1.0);
        assert_eq!(out[1].len(), 1);
        assert_relative_eq!(out[1][0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn selection_falls_back() {
        let mut settings = FilterSettings::default();
        assert_eq!(select_smoother(&settings).name(), "windowed FIR");
        settings.cutoff = 5000.0;
        assert_eq!(select_smoother(&settings).name(), "moving average");
        settings.strategy = SmoothingStrategy::MovingAverage;
        settings.cutoff = 10.0;
        assert_eq!(select_smoother(&settings).name(), "moving average");
    }

    #[test]
    fn channels_sort_numerically_and_skip_non_channels() {
        let v = |x: f64| CellValue::Float(x);
        let (a, b, c, d, e, f) = (
            v(1.0),
            v(2.0),
            v(3.0),
            v(50.0),
            CellValue::Text("evt".into()),
            v(0.0),
        );
        let fields = vec![
            ("timestamp", &f),
            ("1000", &a),
            ("200", &b),
            ("30.5", &c),
            ("Integration Time", &d),
            ("eventID", &e),
        ];
        let ch = channels(&fields);
        let keys: Vec<&str> = ch.iter().map(|c| c.0.as_str()).collect();
        assert_eq!(keys, ["30.5", "200", "1000"]);
        assert_eq!(integration_time(&fields), Some(50.0));
    }

    #[test]
    fn dark_subtraction_requires_matching_length() {
        let mut dark = DarkReferenceTable::default();
        dark.insert(50.0, vec![1.0, 1.0]);
        dark.insert(100.0, vec![1.0, 1.0, 1.0]);

        let mut values = vec![5.0, 6.0];
        assert!(subtract_dark(&mut values, Some(50.0), &dark));
        assert_eq!(values, [4.0, 5.0]);

        let mut values = vec![5.0, 6.0];
        assert!(!subtract_dark(&mut values, Some(100.0), &dark));
        assert!(!subtract_dark(&mut values, Some(75.0), &dark));
        assert!(!subtract_dark(&mut values, None, &dark));
        assert_eq!(values, [5.0, 6.0]);
    }

    #[test]
    fn condition_mismatched_dark_is_filter_only() {
        let (x, y, t) = (CellValue::Float(2.0), CellValue::Float(4.0), CellValue::Integer(50));
        let fields = vec![("IntegrationTime", &t), ("501", &y), ("500", &x)];
        let mut dark = DarkReferenceTable::default();
        dark.insert(50.0, vec![1.0, 1.0, 1.0]);
        let smoother = MovingAverage::new(1);

        let out = condition(&fields, &dark, &smoother);
        assert!(!out.dark_subtracted);
        assert_eq!(out.values, [2.0, 4.0]);
        let pairs: Vec<(&str, f64)> = out.pairs().collect();
        assert_eq!(pairs, [("500", 2.0), ("501", 4.0)]);

        dark.insert(50.0, vec![1.0, 1.0]);
        let out = condition(&fields, &dark, &smoother);
        assert!(out.dark_subtracted);
        assert_eq!(out.values, [1.0, 3.0]);
        assert_eq!(out.integration_time, Some(50.0));
    }
}
