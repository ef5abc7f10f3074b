//! Processing façade — applies a [`ProcessingSettings`] to a clip.
//!
//! Stages always run in the same order: crop, gain, fade in, fade out,
//! playback rate, pitch. Stages left at their no-op value are skipped.

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::dsp::transform::{self, PITCH_TRIM_THRESHOLD};
use crate::error::EngineError;

pub const MIN_PITCH_SHIFT: i32 = -12;
pub const MAX_PITCH_SHIFT: i32 = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropSettings {
    pub enabled: bool,
    /// Seconds.
    pub start: f64,
    /// Seconds.
    pub end: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeSettings {
    pub enabled: bool,
    /// Seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingSettings {
    pub crop: CropSettings,
    /// Gain multiplier.
    pub volume: f32,
    pub fade_in: FadeSettings,
    pub fade_out: FadeSettings,
    /// Speed multiplier; changes pitch and duration together.
    pub playback_rate: f64,
    /// Semitones, clamped to [-12, 12].
    pub pitch: i32,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        ProcessingSettings {
            crop: CropSettings::default(),
            volume: 1.0,
            fade_in: FadeSettings::default(),
            fade_out: FadeSettings::default(),
            playback_rate: 1.0,
            pitch: 0,
        }
    }
}

impl ProcessingSettings {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Apply `settings` to `buffer`, returning a new clip.
pub fn process_audio(buffer: &SampleBuffer, settings: &ProcessingSettings) -> SampleBuffer {
    let mut result = buffer.clone();
    let mut retimed = false;

    if settings.crop.enabled && settings.crop.end > settings.crop.start {
        log::debug!("crop {:.3}s..{:.3}s", settings.crop.start, settings.crop.end);
        result = transform::crop(&result, settings.crop.start, settings.crop.end);
    }
    if settings.volume != 1.0 {
        let report = transform::detect_clipping(&result, settings.volume);
        if report.clipped {
            log::warn!("gain {} clips (peak {:.3})", settings.volume, report.peak_level);
        }
        result = transform::gain(&result, settings.volume);
    }
    if settings.fade_in.enabled && settings.fade_in.duration > 0.0 {
        result = transform::fade_in(&result, settings.fade_in.duration);
    }
    if settings.fade_out.enabled && settings.fade_out.duration > 0.0 {
        result = transform::fade_out(&result, settings.fade_out.duration);
    }
    if settings.playback_rate != 1.0 {
        result = transform::change_playback_rate(&result, settings.playback_rate);
        retimed = true;
    }
    let pitch = settings.pitch.clamp(MIN_PITCH_SHIFT, MAX_PITCH_SHIFT);
    if pitch != 0 {
        result = transform::change_pitch(&result, pitch);
        retimed = true;
    }

    if retimed {
        result = transform::trim_silence(&result, PITCH_TRIM_THRESHOLD);
    }
    result
}

/// [`process_audio`] with settings given as JSON.
pub fn process_audio_json(buffer: &SampleBuffer, settings: &str) -> Result<SampleBuffer, EngineError> {
    let settings = ProcessingSettings::from_json(settings)?;
    Ok(process_audio(buffer, &settings))
}
