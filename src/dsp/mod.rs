//! DSP kernels — pure Rust analysis and clip processing.
//!
//! Everything here works on whole in-memory clips. The same code runs
//! natively and in the browser via WASM.

pub mod mixer;
pub mod spectrogram;
pub mod spectrum;
pub mod transform;
pub mod tuner;
pub mod window;
