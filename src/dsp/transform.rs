//! Transform library — pure buffer-to-buffer edits.
//!
//! Every function takes a buffer by reference and returns a new one.

use serde::{Deserialize, Serialize};

use crate::buffer::{SampleBuffer, read_interpolated};

use super::window::hann;

/// OLA frame length for pitch shifting.
pub const OLA_WINDOW: usize = 2048;
/// Output scale applied after overlap-add, on top of the hop ratio.
/// Empirically tuned; not derived from the window overlap sum.
pub const OLA_GAIN: f32 = 0.6;
/// Silence threshold used to trim OLA boundary padding.
pub const PITCH_TRIM_THRESHOLD: f32 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClippingReport {
    pub clipped: bool,
    pub peak_level: f32,
}

fn map_channels(buffer: &SampleBuffer, f: impl Fn(&[f32]) -> Vec<f32>) -> SampleBuffer {
    buffer.with_channels(buffer.channels().iter().map(|c| f(c)).collect())
}

/// Keep `[floor(start * sr), floor(end * sr))`, clamped to the clip.
pub fn crop(buffer: &SampleBuffer, start: f64, end: f64) -> SampleBuffer {
    let sr = buffer.sample_rate() as f64;
    let len = buffer.len();
    let from = ((start.max(0.0) * sr).floor() as usize).min(len);
    let to = ((end.max(0.0) * sr).floor() as usize).clamp(from, len);
    map_channels(buffer, |c| c[from..to].to_vec())
}

pub fn gain(buffer: &SampleBuffer, multiplier: f32) -> SampleBuffer {
    map_channels(buffer, |c| c.iter().map(|&s| s * multiplier).collect())
}

/// Would applying `multiplier` push the clip past full scale?
pub fn detect_clipping(buffer: &SampleBuffer, multiplier: f32) -> ClippingReport {
    let peak_level = buffer.peak() * multiplier.abs();
    ClippingReport {
        clipped: peak_level > 1.0,
        peak_level,
    }
}

fn ramp_len(buffer: &SampleBuffer, duration: f64) -> usize {
    ((duration.max(0.0) * buffer.sample_rate() as f64) as usize).min(buffer.len())
}

/// Linear ramp from silence over the first `duration` seconds.
pub fn fade_in(buffer: &SampleBuffer, duration: f64) -> SampleBuffer {
    let n = ramp_len(buffer, duration);
    map_channels(buffer, |c| {
        let mut out = c.to_vec();
        for (i, s) in out.iter_mut().take(n).enumerate() {
            *s *= i as f32 / n as f32;
        }
        out
    })
}

/// Linear ramp to silence over the last `duration` seconds.
pub fn fade_out(buffer: &SampleBuffer, duration: f64) -> SampleBuffer {
    let n = ramp_len(buffer, duration);
    map_channels(buffer, |c| {
        let mut out = c.to_vec();
        let start = out.len() - n;
        for (j, s) in out[start..].iter_mut().enumerate() {
            *s *= 1.0 - (j + 1) as f32 / n as f32;
        }
        out
    })
}

/// Tape-style speed change: nearest-neighbour index stepping, so pitch and
/// duration move together. Output length is `floor(len / rate)`.
pub fn change_playback_rate(buffer: &SampleBuffer, rate: f64) -> SampleBuffer {
    if !rate.is_finite() || rate <= 0.0 {
        log::warn!("ignoring playback rate {rate}");
        return buffer.clone();
    }
    let out_len = (buffer.len() as f64 / rate).floor() as usize;
    map_channels(buffer, |c| {
        (0..out_len)
            .map(|i| c[((i as f64 * rate).floor() as usize).min(c.len() - 1)])
            .collect()
    })
}

/// Overlap-add time stretch of one channel to `ratio` times its length.
fn ola_stretch(samples: &[f32], ratio: f64) -> Vec<f32> {
    let hop_in = OLA_WINDOW / 4;
    let hop_out = ((hop_in as f64 * ratio).round() as usize).max(1);
    let out_len = (samples.len() as f64 * ratio).round() as usize;
    let window = hann(OLA_WINDOW);
    let mut output = vec![0.0f32; out_len];

    let mut read_pos = 0usize;
    let mut write_pos = 0usize;
    while read_pos < samples.len() && write_pos < out_len {
        for (i, &w) in window.iter().enumerate() {
            let (Some(&x), Some(y)) = (samples.get(read_pos + i), output.get_mut(write_pos + i))
            else {
                break;
            };
            *y += x * w as f32;
        }
        read_pos += hop_in;
        write_pos += hop_out;
    }

    let scale = hop_out as f32 / hop_in as f32 * OLA_GAIN;
    for s in &mut output {
        *s *= scale;
    }
    output
}

/// Linear-interpolation resample reading the input `ratio` samples per output sample.
fn resample_by_ratio(samples: &[f32], ratio: f64) -> Vec<f32> {
    let out_len = (samples.len() as f64 / ratio).floor() as usize;
    (0..out_len)
        .map(|i| read_interpolated(samples, i as f64 * ratio))
        .collect()
}

/// Shift pitch by `semitones` keeping duration: OLA-stretch to `ratio`
/// times the length, resample back by `ratio`, then trim boundary padding.
pub fn change_pitch(buffer: &SampleBuffer, semitones: i32) -> SampleBuffer {
    if semitones == 0 || buffer.is_empty() {
        return buffer.clone();
    }
    let ratio = 2f64.powf(semitones as f64 / 12.0);
    log::debug!("pitch shift {semitones:+} st (ratio {ratio:.4})");
    let shifted = map_channels(buffer, |c| resample_by_ratio(&ola_stretch(c, ratio), ratio));
    trim_silence(&shifted, PITCH_TRIM_THRESHOLD)
}

/// Drop leading/trailing samples where every channel is at or below
/// `threshold`. A buffer with nothing above the threshold comes back unchanged.
pub fn trim_silence(buffer: &SampleBuffer, threshold: f32) -> SampleBuffer {
    let loud = |i: usize| buffer.channels().iter().any(|c| c[i].abs() > threshold);
    let Some(first) = (0..buffer.len()).find(|&i| loud(i)) else {
        return buffer.clone();
    };
    let last = (first..buffer.len()).rev().find(|&i| loud(i)).unwrap_or(first);
    map_channels(buffer, |c| c[first..=last].to_vec())
}
