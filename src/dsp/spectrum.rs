//! Spectral Analyzer — magnitude spectrum, band energy, dominant frequency
//! and spectral centroid of a clip.
//!
//! The spectrum of a Hann-windowed block of N samples is reported as N bins
//! spanning `[0, nyquist)`, bin `k` at `k * (sample_rate / 2) / N` Hz, each in
//! dB full scale (`(-inf, 0]`). Two estimators produce that contract:
//!
//! - [`AcceleratedEstimator`]: real FFT of the block zero-padded to 2N.
//! - [`DirectDftEstimator`]: the same transform evaluated directly, O(N²).
//!
//! [`select_estimator`] probes the accelerated path once and falls back to the
//! direct DFT when it can't be used.

use std::cell::RefCell;
use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::config::EstimatorChoice;
use crate::error::EngineError;

use super::window::{apply_hann, hann};

/// Samples taken from the middle of the clip for spectral analysis.
pub const ANALYSIS_SEGMENT: usize = 2048;
/// Bins below this level are raised to it before energy is summed.
pub const DB_FLOOR: f64 = -100.0;
const SILENCE_EPSILON: f64 = 1e-10;

const LOW_BAND: (f64, f64) = (20.0, 250.0);
const MID_BAND: (f64, f64) = (250.0, 4000.0);

/// Magnitude spectrum of one Hann-windowed block.
pub trait SpectrumEstimator {
    fn name(&self) -> &'static str;

    /// Returns `windowed.len()` bins in dBFS.
    fn magnitude_db(&self, windowed: &[f64]) -> Result<Vec<f64>, EngineError>;
}

/// Convert a raw DFT magnitude of an N-sample Hann block to dBFS.
/// A full-scale sine centred on a bin reads 0 dB.
fn magnitude_to_db(magnitude: f64, coherent_gain: f64) -> f64 {
    if coherent_gain <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let normalized = 2.0 * magnitude / coherent_gain;
    (20.0 * normalized.log10()).min(0.0)
}

fn coherent_gain(n: usize) -> f64 {
    hann(n).iter().sum()
}

pub struct AcceleratedEstimator {
    planner: RefCell<RealFftPlanner<f64>>,
}

impl AcceleratedEstimator {
    pub fn new() -> Self {
        AcceleratedEstimator {
            planner: RefCell::new(RealFftPlanner::new()),
        }
    }

    fn plan(&self, len: usize) -> Arc<dyn RealToComplex<f64>> {
        self.planner.borrow_mut().plan_fft_forward(len)
    }
}

impl Default for AcceleratedEstimator {
    fn default() -> Self {
        AcceleratedEstimator::new()
    }
}

impl SpectrumEstimator for AcceleratedEstimator {
    fn name(&self) -> &'static str {
        "accelerated-fft"
    }

    fn magnitude_db(&self, windowed: &[f64]) -> Result<Vec<f64>, EngineError> {
        let n = windowed.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let fft = self.plan(2 * n);
        let mut input = fft.make_input_vec();
        input[..n].copy_from_slice(windowed);
        let mut output = fft.make_output_vec();
        fft.process(&mut input, &mut output)
            .map_err(|e| EngineError::Estimator {
                reason: e.to_string(),
            })?;

        let gain = coherent_gain(n);
        Ok(output[..n]
            .iter()
            .map(|c| magnitude_to_db(c.norm(), gain))
            .collect())
    }
}

/// Plain DFT over the same bin grid as [`AcceleratedEstimator`].
#[derive(Debug, Default)]
pub struct DirectDftEstimator;

impl SpectrumEstimator for DirectDftEstimator {
    fn name(&self) -> &'static str {
        "direct-dft"
    }

    fn magnitude_db(&self, windowed: &[f64]) -> Result<Vec<f64>, EngineError> {
        let n = windowed.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        // Twiddles for e^{-iπm/N}, m in [0, 2N)
        let period = 2 * n;
        let (cos_table, sin_table): (Vec<f64>, Vec<f64>) = (0..period)
            .map(|m| {
                let angle = std::f64::consts::PI * m as f64 / n as f64;
                (angle.cos(), angle.sin())
            })
            .unzip();

        let gain = coherent_gain(n);
        let spectrum = (0..n)
            .map(|k| {
                let mut re = 0.0;
                let mut im = 0.0;
                for (i, &x) in windowed.iter().enumerate() {
                    let m = (k * i) % period;
                    re += x * cos_table[m];
                    im -= x * sin_table[m];
                }
                magnitude_to_db((re * re + im * im).sqrt(), gain)
            })
            .collect();
        Ok(spectrum)
    }
}

/// Runs the accelerated path and drops to the direct DFT for any block the
/// accelerated path fails on or returns nothing usable for.
pub struct FallbackEstimator {
    primary: AcceleratedEstimator,
    fallback: DirectDftEstimator,
}

impl FallbackEstimator {
    pub fn new() -> Self {
        FallbackEstimator {
            primary: AcceleratedEstimator::new(),
            fallback: DirectDftEstimator,
        }
    }
}

impl Default for FallbackEstimator {
    fn default() -> Self {
        FallbackEstimator::new()
    }
}

impl SpectrumEstimator for FallbackEstimator {
    fn name(&self) -> &'static str {
        "accelerated-fft+fallback"
    }

    fn magnitude_db(&self, windowed: &[f64]) -> Result<Vec<f64>, EngineError> {
        match self.primary.magnitude_db(windowed) {
            Ok(bins) if is_usable(&bins, windowed) => Ok(bins),
            Ok(_) => {
                log::warn!("accelerated spectrum had no usable bins, using direct DFT");
                self.fallback.magnitude_db(windowed)
            }
            Err(e) => {
                log::warn!("accelerated spectrum failed ({e}), using direct DFT");
                self.fallback.magnitude_db(windowed)
            }
        }
    }
}

/// A spectrum is usable if it has a finite bin, or the input really was silent.
fn is_usable(bins: &[f64], windowed: &[f64]) -> bool {
    bins.iter().any(|v| v.is_finite()) || windowed.iter().all(|&x| x == 0.0)
}

/// Pick an estimator for the given choice. `Auto` probes the accelerated path
/// on a short test tone first.
pub fn select_estimator(choice: EstimatorChoice) -> Box<dyn SpectrumEstimator> {
    match choice {
        EstimatorChoice::Direct => Box::new(DirectDftEstimator),
        EstimatorChoice::Accelerated => Box::new(AcceleratedEstimator::new()),
        EstimatorChoice::Auto => {
            let probe: Vec<f32> = (0..64)
                .map(|i| (2.0 * std::f32::consts::PI * 4.0 * i as f32 / 64.0).sin())
                .collect();
            let windowed = apply_hann(&probe);
            match AcceleratedEstimator::new().magnitude_db(&windowed) {
                Ok(bins) if is_usable(&bins, &windowed) => Box::new(FallbackEstimator::new()),
                _ => {
                    log::warn!("accelerated spectrum probe failed, using direct DFT");
                    Box::new(DirectDftEstimator)
                }
            }
        }
    }
}

/// Share of spectral energy in the low/mid/high bands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandRatios {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumAnalysis {
    pub band_ratios: BandRatios,
    pub dominant_frequency: f64,
    pub spectral_centroid: f64,
    /// dBFS per bin, bin k at `k * (sample_rate / 2) / raw_spectrum.len()` Hz.
    pub raw_spectrum: Vec<f64>,
}

/// The block analysed: `ANALYSIS_SEGMENT` samples from the middle of
/// channel 0, or the whole channel if it is shorter.
pub fn middle_segment(buffer: &SampleBuffer) -> &[f32] {
    let data = buffer.channel(0);
    if data.len() <= ANALYSIS_SEGMENT {
        return data;
    }
    let start = data.len() / 2 - ANALYSIS_SEGMENT / 2;
    &data[start..start + ANALYSIS_SEGMENT]
}

/// Spectral analysis of a clip.
pub fn analyze_spectrum(
    buffer: &SampleBuffer,
    estimator: &dyn SpectrumEstimator,
) -> Result<SpectrumAnalysis, EngineError> {
    let windowed = apply_hann(middle_segment(buffer));
    let spectrum = estimator.magnitude_db(&windowed)?;
    let nyquist = buffer.sample_rate() as f64 / 2.0;

    log::debug!(
        "spectrum: {} bins via {} at {} Hz",
        spectrum.len(),
        estimator.name(),
        buffer.sample_rate()
    );

    Ok(SpectrumAnalysis {
        band_ratios: band_ratios(&spectrum, nyquist),
        dominant_frequency: dominant_frequency(&spectrum, nyquist),
        spectral_centroid: spectral_centroid(&spectrum, nyquist),
        raw_spectrum: spectrum,
    })
}

pub fn bin_frequency(bin: usize, bin_count: usize, nyquist: f64) -> f64 {
    bin as f64 * nyquist / bin_count as f64
}

/// Energy share per band. Bins at -inf carry no energy; finite bins are
/// floored at [`DB_FLOOR`]. A degenerate spectrum gives all zeros.
pub fn band_ratios(spectrum: &[f64], nyquist: f64) -> BandRatios {
    let mut low = 0.0;
    let mut mid = 0.0;
    let mut high = 0.0;

    for (k, &db) in spectrum.iter().enumerate() {
        if !db.is_finite() {
            continue;
        }
        let energy = 10f64.powf(db.max(DB_FLOOR) / 20.0);
        let freq = bin_frequency(k, spectrum.len(), nyquist);
        if freq >= LOW_BAND.0 && freq < LOW_BAND.1 {
            low += energy;
        } else if freq >= MID_BAND.0 && freq < MID_BAND.1 {
            mid += energy;
        } else if freq >= MID_BAND.1 && freq <= nyquist {
            high += energy;
        }
    }

    let total = low + mid + high;
    if total < SILENCE_EPSILON {
        return BandRatios::default();
    }
    BandRatios {
        low: low / total,
        mid: mid / total,
        high: high / total,
    }
}

/// Frequency of the loudest finite bin, 0 if there is none.
pub fn dominant_frequency(spectrum: &[f64], nyquist: f64) -> f64 {
    let mut best: Option<(usize, f64)> = None;
    for (k, &db) in spectrum.iter().enumerate() {
        if db == f64::NEG_INFINITY || db.is_nan() {
            continue;
        }
        if best.is_none_or(|(_, v)| db > v) {
            best = Some((k, db));
        }
    }
    best.map_or(0.0, |(k, _)| bin_frequency(k, spectrum.len(), nyquist))
}

/// Magnitude-weighted mean frequency, 0 for a silent spectrum.
pub fn spectral_centroid(spectrum: &[f64], nyquist: f64) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (k, &db) in spectrum.iter().enumerate() {
        if !db.is_finite() {
            continue;
        }
        let mag = 10f64.powf(db / 20.0);
        weighted += bin_frequency(k, spectrum.len(), nyquist) * mag;
        total += mag;
    }
    if total < SILENCE_EPSILON {
        0.0
    } else {
        weighted / total
    }
}
