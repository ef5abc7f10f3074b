pub mod analysis;
pub mod buffer;
pub mod config;
pub mod context;
pub mod dsp;
pub mod error;
pub mod processor;

pub use analysis::{AnalysisResult, analyze};
pub use buffer::SampleBuffer;
pub use config::EngineConfig;
pub use context::{CancelToken, EngineContext};
pub use dsp::mixer::{MixFlags, MixResult, join, mix};
pub use error::EngineError;
pub use processor::{ProcessingSettings, process_audio};

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Interleaved clip handed back across the WASM boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipPayload {
    pub samples: Vec<f32>,
    pub channel_count: usize,
    pub sample_rate: u32,
}

impl From<&SampleBuffer> for ClipPayload {
    fn from(buffer: &SampleBuffer) -> Self {
        ClipPayload {
            samples: buffer.to_interleaved(),
            channel_count: buffer.channel_count(),
            sample_rate: buffer.sample_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixPayload {
    pub clip: ClipPayload,
    #[serde(flatten)]
    pub flags: MixFlags,
}

impl From<&MixResult> for MixPayload {
    fn from(result: &MixResult) -> Self {
        MixPayload {
            clip: ClipPayload::from(&result.buffer),
            flags: result.flags(),
        }
    }
}

fn to_js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

fn clip(samples: &[f32], channel_count: usize, sample_rate: u32) -> Result<SampleBuffer, JsValue> {
    SampleBuffer::from_interleaved(samples, channel_count, sample_rate).map_err(to_js_error)
}

/// WASM-exposed: return the cliplab-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: analyse an interleaved clip and return the `AnalysisResult` object.
/// `config` may be `undefined` for defaults.
#[wasm_bindgen]
pub fn analyze_clip(
    samples: Vec<f32>,
    channel_count: usize,
    sample_rate: u32,
    config: JsValue,
) -> Result<JsValue, JsValue> {
    let buffer = clip(&samples, channel_count, sample_rate)?;
    let config: EngineConfig = if config.is_undefined() || config.is_null() {
        EngineConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config)?
    };
    let ctx = EngineContext::new(config);
    let result = analyze(Some(&buffer), &ctx, &mut |percent, message| {
        log::trace!("{percent:.0}% {message}")
    })
    .map_err(to_js_error)?;
    serde_wasm_bindgen::to_value(&result).map_err(to_js_error)
}

/// WASM-exposed: robust single-pitch (key) estimate of channel 0.
#[wasm_bindgen]
pub fn detect_clip_pitch(
    samples: Vec<f32>,
    channel_count: usize,
    sample_rate: u32,
) -> Result<JsValue, JsValue> {
    let buffer = clip(&samples, channel_count, sample_rate)?;
    let ctx = EngineContext::default();
    let pitch = dsp::tuner::detect_batch_pitch(buffer.channel(0), sample_rate, &ctx)
        .map_err(to_js_error)?;
    serde_wasm_bindgen::to_value(&pitch).map_err(to_js_error)
}

/// WASM-exposed: apply processing settings to an interleaved clip.
/// Returns interleaved samples with the same channel count and rate.
#[wasm_bindgen]
pub fn process_clip(
    samples: Vec<f32>,
    channel_count: usize,
    sample_rate: u32,
    settings: JsValue,
) -> Result<Vec<f32>, JsValue> {
    let buffer = clip(&samples, channel_count, sample_rate)?;
    let settings: ProcessingSettings = serde_wasm_bindgen::from_value(settings)?;
    Ok(process_audio(&buffer, &settings).to_interleaved())
}

/// WASM-exposed: concatenate two clips; returns a `ClipPayload`.
#[wasm_bindgen]
pub fn join_clips(
    a: Vec<f32>,
    a_channels: usize,
    a_rate: u32,
    b: Vec<f32>,
    b_channels: usize,
    b_rate: u32,
) -> Result<JsValue, JsValue> {
    let a = clip(&a, a_channels, a_rate)?;
    let b = clip(&b, b_channels, b_rate)?;
    let joined = join(&a, &b);
    serde_wasm_bindgen::to_value(&ClipPayload::from(&joined)).map_err(to_js_error)
}

/// WASM-exposed: weighted mix of two clips; returns a `MixPayload`.
#[wasm_bindgen]
#[allow(clippy::too_many_arguments)]
pub fn mix_clips(
    a: Vec<f32>,
    a_channels: usize,
    a_rate: u32,
    b: Vec<f32>,
    b_channels: usize,
    b_rate: u32,
    balance1: f32,
    balance2: f32,
    auto_normalize: bool,
) -> Result<JsValue, JsValue> {
    let a = clip(&a, a_channels, a_rate)?;
    let b = clip(&b, b_channels, b_rate)?;
    let result = mix(&a, &b, balance1, balance2, auto_normalize);
    serde_wasm_bindgen::to_value(&MixPayload::from(&result)).map_err(to_js_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn payload_is_interleaved() {
        let buffer = SampleBuffer::new(vec![vec![0.1, 0.2], vec![-0.1, -0.2]], 22050).unwrap();
        let payload = ClipPayload::from(&buffer);
        assert_eq!(payload.samples, vec![0.1, -0.1, 0.2, -0.2]);
        assert_eq!(payload.channel_count, 2);
        assert_eq!(payload.sample_rate, 22050);
    }

    #[test]
    fn mix_payload_carries_flags() {
        let a = SampleBuffer::mono(vec![0.9; 8], 8000).unwrap();
        let result = mix(&a, &a, 1.0, 1.0, true);
        let payload = MixPayload::from(&result);
        assert!(payload.flags.normalized);
        assert!(!payload.flags.clipped);
        assert_eq!(payload.clip.samples.len(), 8);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["clip"]["channelCount"].is_u64());
        assert_eq!(json["normalized"], true);
        assert_eq!(json["clipped"], false);
    }
}
