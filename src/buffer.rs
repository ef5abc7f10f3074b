//! Sample buffer — decoded multi-channel audio held in memory.
//!
//! Every transform in the engine reads one of these and produces a new one;
//! nothing mutates a buffer it was handed.

use crate::error::EngineError;

/// N channels of equal-length f32 samples plus their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build a buffer, checking that there is at least one channel, all
    /// channels have the same length and the sample rate is non-zero.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, EngineError> {
        if sample_rate == 0 {
            return Err(EngineError::invalid_buffer("sample rate must be positive"));
        }
        let Some(first) = channels.first() else {
            return Err(EngineError::invalid_buffer("buffer has no channels"));
        };
        let len = first.len();
        if let Some(i) = channels.iter().position(|c| c.len() != len) {
            return Err(EngineError::invalid_buffer(format!(
                "channel {i} has {} samples, expected {len}",
                channels[i].len()
            )));
        }
        Ok(SampleBuffer {
            channels,
            sample_rate,
        })
    }

    pub fn mono(data: Vec<f32>, sample_rate: u32) -> Result<Self, EngineError> {
        SampleBuffer::new(vec![data], sample_rate)
    }

    /// De-interleave `frame = [ch0, ch1, ...]` ordered samples.
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, EngineError> {
        if channel_count == 0 {
            return Err(EngineError::invalid_buffer("buffer has no channels"));
        }
        let frames = samples.len() / channel_count;
        let channels = (0..channel_count)
            .map(|ch| {
                samples
                    .iter()
                    .skip(ch)
                    .step_by(channel_count)
                    .take(frames)
                    .copied()
                    .collect()
            })
            .collect();
        SampleBuffer::new(channels, sample_rate)
    }

    /// Create from interleaved 16-bit signed PCM data.
    pub fn from_i16(
        pcm: &[i16],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, EngineError> {
        let data: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        SampleBuffer::from_interleaved(&data, channel_count, sample_rate)
    }

    /// Same rate, new sample data. Callers guarantee equal channel lengths.
    pub(crate) fn with_channels(&self, channels: Vec<Vec<f32>>) -> Self {
        debug_assert!(!channels.is_empty());
        debug_assert!(channels.iter().all(|c| c.len() == channels[0].len()));
        SampleBuffer {
            channels,
            sample_rate: self.sample_rate,
        }
    }

    pub(crate) fn from_parts(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(sample_rate > 0);
        debug_assert!(!channels.is_empty());
        SampleBuffer {
            channels,
            sample_rate,
        }
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let n = self.channels.len();
        let mut out = Vec::with_capacity(self.len() * n);
        for i in 0..self.len() {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |m, &s| m.max(s.abs()))
    }

    /// Root mean square across all channels.
    pub fn rms(&self) -> f32 {
        let count = self.len() * self.channels.len();
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|&s| s as f64 * s as f64)
            .sum();
        (sum / count as f64).sqrt() as f32
    }

    /// Read a sample with linear interpolation at a fractional position.
    /// Positions past the last sample hold the last sample.
    pub fn read_interpolated(&self, channel: usize, position: f64) -> f32 {
        read_interpolated(&self.channels[channel], position)
    }
}

pub(crate) fn read_interpolated(data: &[f32], position: f64) -> f32 {
    if data.is_empty() || position < 0.0 {
        return 0.0;
    }

    let idx = position as usize;
    if idx >= data.len() - 1 {
        return data[data.len() - 1];
    }

    let frac = (position - idx as f64) as f32;
    data[idx] + frac * (data[idx + 1] - data[idx])
}
