//! Engine configuration.
//!
//! Everything here is a host-level choice (which spectrum path to use, how
//! often long loops check in, pitch search bands). The DSP constants
//! themselves live next to the kernels that use them.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Which spectrum estimator the engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorChoice {
    /// Probe the accelerated path and fall back to the direct DFT if it is unusable.
    #[default]
    Auto,
    Accelerated,
    Direct,
}

/// A closed frequency band in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub min: f64,
    pub max: f64,
}

impl FrequencyRange {
    pub const fn new(min: f64, max: f64) -> Self {
        FrequencyRange { min, max }
    }

    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.min && freq <= self.max
    }
}

/// Band used for interactive preview analysis.
pub const INTERACTIVE_PITCH_RANGE: FrequencyRange = FrequencyRange::new(80.0, 1000.0);
/// Band used for batch/key detection.
pub const BATCH_PITCH_RANGE: FrequencyRange = FrequencyRange::new(50.0, 2000.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub estimator: EstimatorChoice,
    /// Long loops check cancellation and report progress every this many iterations.
    pub yield_interval: usize,
    /// Wall-clock budget for one analysis. `None` disables the deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub interactive_pitch_range: FrequencyRange,
    pub batch_pitch_range: FrequencyRange,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            estimator: EstimatorChoice::Auto,
            yield_interval: 10,
            timeout_ms: None,
            interactive_pitch_range: INTERACTIVE_PITCH_RANGE,
            batch_pitch_range: BATCH_PITCH_RANGE,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let mut config: EngineConfig = serde_json::from_str(json)?;
        if config.yield_interval == 0 {
            config.yield_interval = 1;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.estimator, EstimatorChoice::Auto);
        assert_eq!(c.yield_interval, 10);
        assert!(c.timeout_ms.is_none());
        assert_eq!(c.interactive_pitch_range, FrequencyRange::new(80.0, 1000.0));
        assert_eq!(c.batch_pitch_range, FrequencyRange::new(50.0, 2000.0));
    }

    #[test]
    fn empty_json_is_default() {
        let c = EngineConfig::from_json("{}").unwrap();
        assert_eq!(c, EngineConfig::default());
    }

    #[test]
    fn partial_json_overrides() {
        let c = EngineConfig::from_json(
            r#"{"estimator":"direct","timeoutMs":250,"yieldInterval":0}"#,
        )
        .unwrap();
        assert_eq!(c.estimator, EstimatorChoice::Direct);
        assert_eq!(c.timeout_ms, Some(250));
        // Zero would mean "never check in"
        assert_eq!(c.yield_interval, 1);
    }

    #[test]
    fn bad_json_is_config_error() {
        let err = EngineConfig::from_json(r#"{"estimator":"gpu"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn range_contains_is_inclusive() {
        let r = FrequencyRange::new(80.0, 1000.0);
        assert!(r.contains(80.0));
        assert!(r.contains(1000.0));
        assert!(!r.contains(79.9));
    }
}
