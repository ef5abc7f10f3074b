//! Spectrogram — STFT of channel 0 rendered to 8-bit intensities.

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::context::EngineContext;
use crate::error::EngineError;

use super::spectrum::DB_FLOOR;
use super::window::apply_hann;

pub const STFT_WINDOW: usize = 512;
/// 75 % overlap.
pub const STFT_HOP: usize = 128;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spectrogram {
    /// `data[frame][bin]`, 0 = -100 dB or quieter, 255 = 0 dB.
    pub data: Vec<Vec<u8>>,
    /// Number of frames.
    pub width: usize,
    /// Bins per frame.
    pub height: usize,
    /// Seconds between frames.
    pub time_step: f64,
    /// `[0, nyquist]` in Hz.
    pub frequency_range: [f64; 2],
}

impl Spectrogram {
    /// Zero-sized spectrogram that still carries the clip's time/frequency scale.
    pub fn empty(sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f64;
        Spectrogram {
            data: Vec::new(),
            width: 0,
            height: 0,
            time_step: STFT_HOP as f64 / sr,
            frequency_range: [0.0, sr / 2.0],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0
    }
}

/// Map dBFS linearly from `[-100, 0]` onto `[0, 255]`.
pub fn db_to_intensity(db: f64) -> u8 {
    if db.is_nan() {
        return 0;
    }
    let clamped = db.clamp(DB_FLOOR, 0.0);
    ((clamped - DB_FLOOR) / -DB_FLOOR * 255.0).round() as u8
}

/// Build the spectrogram of a clip. `on_progress` gets the completed
/// fraction on the context's yield cadence.
pub fn build_spectrogram(
    buffer: &SampleBuffer,
    ctx: &EngineContext,
    on_progress: &mut dyn FnMut(f64),
) -> Result<Spectrogram, EngineError> {
    let samples = buffer.channel(0);
    let mut spectrogram = Spectrogram::empty(buffer.sample_rate());
    if samples.len() < STFT_WINDOW {
        return Ok(spectrogram);
    }

    let frames = (samples.len() - STFT_WINDOW) / STFT_HOP + 1;
    let estimator = ctx.estimator();
    let mut data = Vec::with_capacity(frames);
    for i in 0..frames {
        ctx.checkpoint(i)?;
        if ctx.is_yield_point(i) {
            on_progress(i as f64 / frames as f64);
        }
        let start = i * STFT_HOP;
        let windowed = apply_hann(&samples[start..start + STFT_WINDOW]);
        let column: Vec<u8> = estimator
            .magnitude_db(&windowed)?
            .into_iter()
            .map(db_to_intensity)
            .collect();
        data.push(column);
    }
    on_progress(1.0);

    log::debug!(
        "spectrogram: {frames} frames x {STFT_WINDOW} bins via {}",
        estimator.name()
    );
    spectrogram.width = frames;
    spectrogram.height = STFT_WINDOW;
    spectrogram.data = data;
    Ok(spectrogram)
}
