//! Engine context — the resources one engine instance owns.
//!
//! Built once by the host and passed by reference into every analysis call.
//! Holds the config, the spectrum estimator picked at construction time, a
//! cancellation token and an optional deadline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::EngineConfig;
use crate::dsp::spectrum::{SpectrumEstimator, select_estimator};
use crate::error::EngineError;

/// Shared cancellation flag. Clone it and hand the clone to whoever may cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Milliseconds on a monotonic-enough clock. Browsers don't provide
/// `std::time::Instant`, so wasm32 reads the JS clock instead.
#[cfg(target_arch = "wasm32")]
fn now_ms() -> f64 {
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
fn now_ms() -> f64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
}

pub struct EngineContext {
    config: EngineConfig,
    estimator: Box<dyn SpectrumEstimator>,
    cancel: CancelToken,
    // Clock reading in ms, taken only when a timeout is configured.
    started: Option<f64>,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        let estimator = select_estimator(config.estimator);
        log::debug!(
            "engine context: estimator={} timeout={:?}",
            estimator.name(),
            config.timeout_ms
        );
        let started = config.timeout_ms.map(|_| now_ms());
        EngineContext {
            config,
            estimator,
            cancel: CancelToken::new(),
            started,
        }
    }

    /// Swap in a custom estimator (e.g. a host-provided accelerated path).
    pub fn with_estimator(mut self, estimator: Box<dyn SpectrumEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &dyn SpectrumEstimator {
        self.estimator.as_ref()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Start the timeout window over, e.g. before a new analysis.
    pub fn restart_clock(&mut self) {
        self.cancel.reset();
        self.started = self.config.timeout_ms.map(|_| now_ms());
    }

    /// Fail if cancelled or past the deadline.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if let (Some(started), Some(limit)) = (self.started, self.config.timeout_ms) {
            let elapsed = (now_ms() - started).max(0.0);
            if elapsed > limit as f64 {
                return Err(EngineError::TimedOut {
                    elapsed_ms: elapsed as u128,
                });
            }
        }
        Ok(())
    }

    /// Called once per loop iteration; only does work on the yield cadence.
    pub fn checkpoint(&self, iteration: usize) -> Result<(), EngineError> {
        if self.is_yield_point(iteration) {
            self.check()
        } else {
            Ok(())
        }
    }

    pub fn is_yield_point(&self, iteration: usize) -> bool {
        iteration % self.config.yield_interval.max(1) == 0
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        EngineContext::new(EngineConfig::default())
    }
}
