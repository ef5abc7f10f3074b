//! Mixer — combines two clips by concatenation (join) or weighted sum (mix).
//!
//! Both operations first bring the clips to a common sample rate (the higher
//! of the two) and a common channel count (the larger of the two). A clip
//! with fewer channels repeats its last channel into the extra ones. When
//! mixing, the shorter clip is treated as padded with silence.

use serde::{Deserialize, Serialize};

use crate::buffer::{SampleBuffer, read_interpolated};

/// Peak level targeted when a mix is normalized (1 % headroom).
pub const NORMALIZE_TARGET: f32 = 0.99;

#[derive(Debug, Clone, PartialEq)]
pub struct MixResult {
    pub buffer: SampleBuffer,
    /// The mix was scaled down to fit under full scale.
    pub normalized: bool,
    /// The mix exceeded full scale and was hard-clamped.
    pub clipped: bool,
}

/// Flags of a [`MixResult`] without the audio, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixFlags {
    pub normalized: bool,
    pub clipped: bool,
}

impl MixResult {
    pub fn flags(&self) -> MixFlags {
        MixFlags {
            normalized: self.normalized,
            clipped: self.clipped,
        }
    }
}

/// A summing bus that accumulates per-channel samples and tracks the peak.
#[derive(Debug, Clone)]
struct Mixer {
    buffers: Vec<Vec<f32>>,
}

impl Mixer {
    /// A bus of `channels` x `num_samples` zeros.
    fn new(channels: usize, num_samples: usize) -> Self {
        Mixer {
            buffers: vec![vec![0.0; num_samples]; channels],
        }
    }

    /// Add `source * weight` starting at sample 0 of `channel`.
    fn add(&mut self, channel: usize, source: &[f32], weight: f32) {
        for (out, &s) in self.buffers[channel].iter_mut().zip(source) {
            *out += s * weight;
        }
    }

    fn peak(&self) -> f32 {
        self.buffers
            .iter()
            .flat_map(|b| b.iter())
            .fold(0.0f32, |m, &s| m.max(s.abs()))
    }

    /// Finish the mix: normalize to [`NORMALIZE_TARGET`] or hard-clamp to
    /// [-1, 1] when the peak is over full scale.
    fn output(mut self, auto_normalize: bool) -> (Vec<Vec<f32>>, bool, bool) {
        let peak = self.peak();
        if peak <= 1.0 {
            return (self.buffers, false, false);
        }
        if auto_normalize {
            let scale = NORMALIZE_TARGET / peak;
            for s in self.buffers.iter_mut().flat_map(|b| b.iter_mut()) {
                *s *= scale;
            }
            (self.buffers, true, false)
        } else {
            for s in self.buffers.iter_mut().flat_map(|b| b.iter_mut()) {
                *s = s.clamp(-1.0, 1.0);
            }
            (self.buffers, false, true)
        }
    }
}

/// Convert to `target_rate` by linear interpolation, keeping duration and pitch.
pub fn resample_buffer(buffer: &SampleBuffer, target_rate: u32) -> SampleBuffer {
    let source_rate = buffer.sample_rate();
    if target_rate == 0 || target_rate == source_rate {
        return buffer.clone();
    }
    let step = source_rate as f64 / target_rate as f64;
    let out_len = (buffer.len() as f64 / step).round() as usize;
    let channels = buffer
        .channels()
        .iter()
        .map(|c| {
            (0..out_len)
                .map(|i| read_interpolated(c, i as f64 * step))
                .collect()
        })
        .collect();
    SampleBuffer::from_parts(channels, target_rate)
}

/// Resample both clips to the higher of their two rates.
fn harmonize_rates(a: &SampleBuffer, b: &SampleBuffer) -> (SampleBuffer, SampleBuffer) {
    let rate = a.sample_rate().max(b.sample_rate());
    if a.sample_rate() != b.sample_rate() {
        log::debug!(
            "harmonizing {} Hz and {} Hz to {rate} Hz",
            a.sample_rate(),
            b.sample_rate()
        );
    }
    (resample_buffer(a, rate), resample_buffer(b, rate))
}

/// Channel `index`, or the buffer's last channel if it has fewer.
fn broadcast_channel(buffer: &SampleBuffer, index: usize) -> &[f32] {
    buffer.channel(index.min(buffer.channel_count() - 1))
}

/// Concatenate `b` after `a`.
pub fn join(a: &SampleBuffer, b: &SampleBuffer) -> SampleBuffer {
    let (a, b) = harmonize_rates(a, b);
    let channel_count = a.channel_count().max(b.channel_count());
    let channels = (0..channel_count)
        .map(|ch| {
            let mut out = Vec::with_capacity(a.len() + b.len());
            out.extend_from_slice(broadcast_channel(&a, ch));
            out.extend_from_slice(broadcast_channel(&b, ch));
            out
        })
        .collect();
    SampleBuffer::from_parts(channels, a.sample_rate())
}

/// Weighted sum `a * balance1 + b * balance2` over the longer clip's length.
pub fn mix(
    a: &SampleBuffer,
    b: &SampleBuffer,
    balance1: f32,
    balance2: f32,
    auto_normalize: bool,
) -> MixResult {
    let (a, b) = harmonize_rates(a, b);
    let channel_count = a.channel_count().max(b.channel_count());
    let mut mixer = Mixer::new(channel_count, a.len().max(b.len()));
    for ch in 0..channel_count {
        mixer.add(ch, broadcast_channel(&a, ch), balance1);
        mixer.add(ch, broadcast_channel(&b, ch), balance2);
    }

    let (channels, normalized, clipped) = mixer.output(auto_normalize);
    if normalized {
        log::debug!("mix normalized to {NORMALIZE_TARGET}");
    } else if clipped {
        log::warn!("mix exceeded full scale and was clamped");
    }
    MixResult {
        buffer: SampleBuffer::from_parts(channels, a.sample_rate()),
        normalized,
        clipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, samples: usize, amp: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn mono(data: Vec<f32>, sample_rate: u32) -> SampleBuffer {
        SampleBuffer::mono(data, sample_rate).unwrap()
    }

    #[test]
    fn resample_round_trip_is_close() {
        let original = mono(sine(220.0, 44100, 4410, 0.8), 44100);
        let up = resample_buffer(&original, 48000);
        assert_eq!(up.sample_rate(), 48000);
        assert_eq!(up.len(), 4800);
        let back = resample_buffer(&up, 44100);
        assert_eq!(back.len(), original.len());
        let max_err = original
            .channel(0)
            .iter()
            .zip(back.channel(0))
            .take(original.len() - 2)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 0.01, "round trip error {max_err}");
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let buf = mono(vec![0.1, 0.2, 0.3], 22050);
        assert_eq!(resample_buffer(&buf, 22050), buf);
    }

    #[test]
    fn join_lengths_add() {
        let a = mono(vec![0.5; 100], 8000);
        let b = mono(vec![-0.5; 50], 8000);
        let out = join(&a, &b);
        assert_eq!(out.len(), 150);
        assert_eq!(out.channel(0)[99], 0.5);
        assert_eq!(out.channel(0)[100], -0.5);
    }

    #[test]
    fn join_harmonizes_rate_and_broadcasts_channels() {
        let a = mono(vec![0.25; 8000], 8000);
        let b = SampleBuffer::new(vec![vec![0.1; 16000], vec![0.2; 16000]], 16000).unwrap();
        let out = join(&a, &b);

        assert_eq!(out.sample_rate(), 16000);
        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.len(), 16000 + 16000);
        // Mono source fills both output channels
        assert_eq!(out.channel(0)[10], 0.25);
        assert_eq!(out.channel(1)[10], 0.25);
        assert_eq!(out.channel(0)[20000], 0.1);
        assert_eq!(out.channel(1)[20000], 0.2);
    }

    #[test]
    fn mix_pads_shorter_clip() {
        let a = mono(vec![0.4; 10], 8000);
        let b = mono(vec![0.2; 4], 8000);
        let result = mix(&a, &b, 1.0, 1.0, false);
        assert_eq!(result.buffer.len(), 10);
        assert!((result.buffer.channel(0)[0] - 0.6).abs() < 1e-6);
        assert!((result.buffer.channel(0)[9] - 0.4).abs() < 1e-6);
        assert!(!result.clipped && !result.normalized);
    }

    #[test]
    fn mix_under_full_scale() {
        let a = mono(sine(220.0, 8000, 800, 0.6), 8000);
        let result = mix(&a, &a, 0.5, 0.5, false);
        assert!(!result.clipped);
        assert!(!result.normalized);
        assert!((result.buffer.peak() - a.peak()).abs() < 1e-5);
    }

    #[test]
    fn mix_over_full_scale_clamps() {
        let a = mono(sine(220.0, 8000, 800, 1.2), 8000);
        let result = mix(&a, &a, 0.5, 0.5, false);
        assert!(result.clipped);
        assert!(!result.normalized);
        assert!(result.buffer.channel(0).iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(result.buffer.peak(), 1.0);
    }

    #[test]
    fn mix_over_full_scale_normalizes() {
        let a = mono(sine(220.0, 8000, 800, 1.2), 8000);
        let result = mix(&a, &a, 0.5, 0.5, true);
        assert!(!result.clipped);
        assert!(result.normalized);
        assert!(result.buffer.peak() <= NORMALIZE_TARGET + 1e-6);
        assert!(result.buffer.peak() > 0.98);
        assert_eq!(
            result.flags(),
            MixFlags {
                normalized: true,
                clipped: false
            }
        );
    }

    #[test]
    fn mix_harmonizes_rates() {
        let a = mono(vec![0.1; 4410], 44100);
        let b = mono(vec![0.1; 4800], 48000);
        let result = mix(&a, &b, 1.0, 1.0, false);
        assert_eq!(result.buffer.sample_rate(), 48000);
        assert_eq!(result.buffer.len(), 4800);
        assert!((result.buffer.channel(0)[100] - 0.2).abs() < 1e-6);
    }
}
