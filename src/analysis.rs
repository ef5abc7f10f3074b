//! Clip analysis — basic info, spectrum, pitch curve and spectrogram in one pass.
//!
//! Progress milestones: 0–20 basic info, 20–60 spectrum, 60–100 pitch curve
//! and spectrogram. A spectrum or spectrogram failure degrades to an empty
//! result for that stage; cancellation and timeouts abort the whole analysis.

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::context::EngineContext;
use crate::dsp::spectrogram::{Spectrogram, build_spectrogram};
use crate::dsp::spectrum::{BandRatios, SpectrumAnalysis, analyze_spectrum};
use crate::dsp::tuner::{PitchCurvePoint, PitchRange, pitch_curve, summarize_curve};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    pub duration: f64,
    pub sample_rate: u32,
    pub channel_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyInfo {
    pub band_ratios: BandRatios,
    pub dominant_frequency: f64,
    pub spectral_centroid: f64,
    pub raw_spectrum: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchInfo {
    pub pitch_curve: Vec<PitchCurvePoint>,
    pub spectrogram: Spectrogram,
    pub average_pitch: f64,
    pub pitch_range: PitchRange,
    pub is_pitched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub basic: BasicInfo,
    pub frequency: FrequencyInfo,
    pub pitch: PitchInfo,
}

/// Analyse a clip. `on_progress(percent, message)` is called at the stage
/// milestones and on the context's yield cadence inside long loops.
///
/// Fails with [`EngineError::MissingBuffer`] when `buffer` is `None`.
pub fn analyze(
    buffer: Option<&SampleBuffer>,
    ctx: &EngineContext,
    on_progress: &mut dyn FnMut(f32, &str),
) -> Result<AnalysisResult, EngineError> {
    let buffer = buffer.ok_or(EngineError::MissingBuffer)?;

    on_progress(0.0, "Reading basic info");
    let basic = BasicInfo {
        duration: buffer.duration(),
        sample_rate: buffer.sample_rate(),
        channel_count: buffer.channel_count(),
    };
    log::debug!(
        "analyze: {:.3}s, {} Hz, {} ch",
        basic.duration,
        basic.sample_rate,
        basic.channel_count
    );
    on_progress(20.0, "Analyzing spectrum");

    ctx.check()?;
    let spectrum = match analyze_spectrum(buffer, ctx.estimator()) {
        Ok(s) => s,
        Err(e) if e.is_interrupt() => return Err(e),
        Err(e) => {
            log::warn!("spectrum failed, continuing without it: {e}");
            SpectrumAnalysis::default()
        }
    };
    let frequency = FrequencyInfo {
        band_ratios: spectrum.band_ratios,
        dominant_frequency: spectrum.dominant_frequency,
        spectral_centroid: spectrum.spectral_centroid,
        raw_spectrum: spectrum.raw_spectrum,
    };
    on_progress(60.0, "Detecting pitch");

    // Pitch curve takes the first half of the 60–100 span, the spectrogram the rest.
    let curve = pitch_curve(buffer.channel(0), buffer.sample_rate(), ctx, &mut |p| {
        on_progress(scale_progress(60.0, p * 0.5), "Detecting pitch")
    })?;
    let summary = summarize_curve(&curve);

    let spectrogram = match build_spectrogram(buffer, ctx, &mut |p| {
        on_progress(scale_progress(60.0, 0.5 + p * 0.5), "Building spectrogram")
    }) {
        Ok(s) => s,
        Err(e) if e.is_interrupt() => return Err(e),
        Err(e) => {
            log::warn!("spectrogram failed, continuing without it: {e}");
            Spectrogram::empty(buffer.sample_rate())
        }
    };
    on_progress(100.0, "Analysis complete");

    Ok(AnalysisResult {
        basic,
        frequency,
        pitch: PitchInfo {
            pitch_curve: curve,
            spectrogram,
            average_pitch: summary.average_pitch,
            pitch_range: summary.pitch_range,
            is_pitched: summary.is_pitched,
        },
    })
}

/// Map sub-step progress `p` in [0, 1] onto a 40-point span starting at `base`.
fn scale_progress(base: f32, p: f64) -> f32 {
    base + (p.clamp(0.0, 1.0) as f32) * 40.0
}
