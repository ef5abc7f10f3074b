//! Pitch detection — YIN on single frames, a sliding pitch curve for
//! previews, and a robust batch estimate for key detection.
//!
//! The batch estimate votes on MIDI-rounded frequencies across windows and
//! keeps the mode, so a few octave errors or noisy windows don't drag the
//! result the way a mean would.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::FrequencyRange;
use crate::context::EngineContext;
use crate::error::EngineError;

/// YIN absolute threshold on the cumulative mean normalized difference.
pub const YIN_THRESHOLD: f64 = 0.15;
const YIN_EPSILON: f64 = 1e-10;
/// Estimates outside `[min / GUARD, max * GUARD]` are discarded outright.
const GUARD_FACTOR: f64 = 10.0;

/// Sliding curve: 100 ms windows, 50 ms hop.
pub const CURVE_WINDOW_SECONDS: f64 = 0.1;
pub const CURVE_MIN_CONFIDENCE: f64 = 0.5;
pub const CURVE_PITCHED_RATIO: f64 = 0.3;

/// Batch windows quieter than this RMS are treated as silence.
pub const BATCH_RMS_GATE: f32 = 0.01;
/// Lower than the curve threshold; percussive/noisy material rarely scores higher.
pub const BATCH_MIN_CONFIDENCE: f64 = 0.35;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Result of pitch detection on one frame. `frequency == 0` means no pitch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Estimated fundamental frequency in Hz.
    pub frequency: f64,
    /// Confidence in [0, 1] — higher is better.
    pub confidence: f64,
}

impl PitchEstimate {
    pub const NONE: PitchEstimate = PitchEstimate {
        frequency: 0.0,
        confidence: 0.0,
    };

    pub fn is_none(&self) -> bool {
        self.frequency <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchCurvePoint {
    /// Window start in seconds.
    pub time: f64,
    pub frequency: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PitchRange {
    pub min: f64,
    pub max: f64,
}

/// Aggregate over a pitch curve's confident points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchSummary {
    pub average_pitch: f64,
    pub pitch_range: PitchRange,
    pub is_pitched: bool,
}

/// Batch/key-detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPitch {
    /// Frequency of the winning MIDI note (equal temperament, A4 = 440).
    pub frequency: f64,
    pub midi_note: u8,
    pub note_name: String,
    /// Mean confidence of the windows that voted for the winning note.
    pub confidence: f64,
    pub voting_windows: usize,
    pub total_windows: usize,
}

impl BatchPitch {
    fn none(total_windows: usize) -> Self {
        BatchPitch {
            frequency: 0.0,
            midi_note: 0,
            note_name: String::new(),
            confidence: 0.0,
            voting_windows: 0,
            total_windows,
        }
    }

    pub fn is_pitched(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Detect the fundamental frequency of one frame with YIN.
///
/// - `frame`: mono samples
/// - `sample_rate`: in Hz
/// - `range`: nominal band; lags searched are derived from it
pub fn detect_pitch(frame: &[f32], sample_rate: u32, range: FrequencyRange) -> PitchEstimate {
    let n = frame.len();
    if n == 0 || sample_rate == 0 || range.min <= 0.0 || range.max <= range.min {
        return PitchEstimate::NONE;
    }
    let sr = sample_rate as f64;

    // Convert frequency bounds to lag bounds
    let min_lag = (sr / range.max).floor() as usize;
    let max_lag = (sr / range.min).ceil() as usize;
    if min_lag < 1 || max_lag > n {
        return PitchEstimate::NONE;
    }

    // Lags past max_lag + 1 never influence the search or the interpolation.
    let limit = (max_lag + 1).min(n - 1);
    if limit < min_lag {
        return PitchEstimate::NONE;
    }

    // Difference function
    let mut diff = vec![0.0f64; limit + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        let mut sum = 0.0;
        for i in 0..n - tau {
            let delta = frame[i] as f64 - frame[i + tau] as f64;
            sum += delta * delta;
        }
        *d = sum;
    }

    // Cumulative mean normalized difference
    let mut cmndf = vec![1.0f64; limit + 1];
    let mut running_sum = 0.0;
    for tau in 1..=limit {
        running_sum += diff[tau];
        cmndf[tau] = diff[tau] * tau as f64 / (running_sum + YIN_EPSILON);
    }
    if running_sum < YIN_EPSILON {
        // Silent or constant frame
        return PitchEstimate::NONE;
    }

    // Absolute threshold — first dip below threshold, followed to its minimum
    let search_end = max_lag.min(limit);
    let mut best_tau = None;
    for tau in min_lag..=search_end {
        if cmndf[tau] < YIN_THRESHOLD {
            // Keep descending to the bottom of this dip rather than stopping at
            // the crossing; the crossing sits on the slope and biases the lag short.
            let mut t = tau;
            while t < search_end && cmndf[t + 1] < cmndf[t] {
                t += 1;
            }
            best_tau = Some(t);
            break;
        }
    }

    // Fallback: the global minimum over the searched lags
    let best_tau = best_tau.unwrap_or_else(|| {
        (min_lag..=search_end)
            .min_by(|&a, &b| cmndf[a].total_cmp(&cmndf[b]))
            .unwrap_or(min_lag)
    });

    // Parabolic interpolation for sub-sample accuracy
    let (refined_lag, refined_value) = if best_tau > 0 && best_tau < limit {
        let alpha = cmndf[best_tau - 1];
        let beta = cmndf[best_tau];
        let gamma = cmndf[best_tau + 1];
        let denom = alpha - 2.0 * beta + gamma;
        if denom.abs() > 1e-12 {
            let offset = (0.5 * (alpha - gamma) / denom).clamp(-1.0, 1.0);
            (
                best_tau as f64 + offset,
                beta - 0.25 * (alpha - gamma) * offset,
            )
        } else {
            (best_tau as f64, beta)
        }
    } else {
        (best_tau as f64, cmndf[best_tau])
    };

    if refined_lag <= 0.0 {
        return PitchEstimate::NONE;
    }
    let frequency = sr / refined_lag;
    if frequency < range.min / GUARD_FACTOR || frequency > range.max * GUARD_FACTOR {
        return PitchEstimate::NONE;
    }

    let mut confidence = (1.0 - refined_value).clamp(0.0, 1.0);
    if !range.contains(frequency) {
        // Keep it, but flagged
        confidence *= 0.5;
    }

    PitchEstimate {
        frequency,
        confidence,
    }
}

fn window_len(seconds: f64, sample_rate: u32) -> usize {
    (seconds * sample_rate as f64).round() as usize
}

/// Pitch curve over a whole clip: one point per 100 ms window, 50 % overlap.
///
/// `on_progress` receives the completed fraction in [0, 1] on the context's
/// yield cadence.
pub fn pitch_curve(
    samples: &[f32],
    sample_rate: u32,
    ctx: &EngineContext,
    on_progress: &mut dyn FnMut(f64),
) -> Result<Vec<PitchCurvePoint>, EngineError> {
    let range = ctx.config().interactive_pitch_range;
    let window = window_len(CURVE_WINDOW_SECONDS, sample_rate);
    let hop = (window / 2).max(1);
    if window == 0 || samples.len() < window {
        return Ok(Vec::new());
    }

    let frames = (samples.len() - window) / hop + 1;
    let mut points = Vec::with_capacity(frames);
    for i in 0..frames {
        ctx.checkpoint(i)?;
        if ctx.is_yield_point(i) {
            on_progress(i as f64 / frames as f64);
        }
        let start = i * hop;
        let estimate = detect_pitch(&samples[start..start + window], sample_rate, range);
        log::trace!(
            "pitch window {i}: {:.1} Hz ({:.2})",
            estimate.frequency,
            estimate.confidence
        );
        points.push(PitchCurvePoint {
            time: start as f64 / sample_rate as f64,
            frequency: estimate.frequency,
            confidence: estimate.confidence,
        });
    }
    on_progress(1.0);
    Ok(points)
}

/// Average and range over points with confidence above 0.5; the clip counts
/// as pitched when at least 30 % of its windows are confident.
pub fn summarize_curve(points: &[PitchCurvePoint]) -> PitchSummary {
    let confident: Vec<f64> = points
        .iter()
        .filter(|p| p.confidence > CURVE_MIN_CONFIDENCE)
        .map(|p| p.frequency)
        .collect();
    if confident.is_empty() {
        return PitchSummary::default();
    }

    let average_pitch = confident.iter().sum::<f64>() / confident.len() as f64;
    let min = confident.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = confident.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let is_pitched = confident.len() as f64 / points.len() as f64 >= CURVE_PITCHED_RATIO;

    PitchSummary {
        average_pitch,
        pitch_range: PitchRange { min, max },
        is_pitched,
    }
}

/// Window length for batch detection, shrinking for very short clips.
fn batch_window_seconds(duration: f64) -> f64 {
    if duration < 0.1 {
        0.025
    } else if duration < 0.2 {
        0.05
    } else {
        0.1
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / frame.len() as f64).sqrt() as f32
}

#[derive(Default)]
struct Vote {
    count: usize,
    confidence_sum: f64,
}

/// Robust single-pitch estimate for a whole clip (key detection).
pub fn detect_batch_pitch(
    samples: &[f32],
    sample_rate: u32,
    ctx: &EngineContext,
) -> Result<BatchPitch, EngineError> {
    if samples.is_empty() || sample_rate == 0 {
        return Ok(BatchPitch::none(0));
    }
    let range = ctx.config().batch_pitch_range;
    let duration = samples.len() as f64 / sample_rate as f64;
    let window = window_len(batch_window_seconds(duration), sample_rate)
        .clamp(1, samples.len());
    let hop = (window / 2).max(1);
    let frames = (samples.len() - window) / hop + 1;

    let mut votes: BTreeMap<u8, Vote> = BTreeMap::new();
    for i in 0..frames {
        ctx.checkpoint(i)?;
        let start = i * hop;
        let frame = &samples[start..start + window];
        if rms(frame) < BATCH_RMS_GATE {
            continue;
        }
        let estimate = detect_pitch(frame, sample_rate, range);
        if estimate.is_none() || estimate.confidence <= BATCH_MIN_CONFIDENCE {
            continue;
        }
        let (note, _) = frequency_to_midi_cents(estimate.frequency, 440.0);
        let vote = votes.entry(note).or_default();
        vote.count += 1;
        vote.confidence_sum += estimate.confidence;
    }

    // Mode; ties go to the more confident note, then the lower one.
    let winner = votes.iter().fold(None::<(u8, &Vote)>, |best, (&note, vote)| match best {
        Some((_, b))
            if b.count > vote.count
                || (b.count == vote.count && b.confidence_sum >= vote.confidence_sum) =>
        {
            best
        }
        _ => Some((note, vote)),
    });

    let Some((note, vote)) = winner else {
        log::debug!("batch pitch: no confident windows out of {frames}");
        return Ok(BatchPitch::none(frames));
    };

    log::debug!(
        "batch pitch: {} with {}/{frames} windows",
        midi_note_name(note),
        vote.count
    );
    Ok(BatchPitch {
        frequency: midi_to_frequency(note as i32, 440.0),
        midi_note: note,
        note_name: midi_note_name(note),
        confidence: vote.confidence_sum / vote.count as f64,
        voting_windows: vote.count,
        total_windows: frames,
    })
}

/// Convert a frequency to the nearest MIDI note + fine-tune cents.
pub fn frequency_to_midi_cents(freq: f64, a4_freq: f64) -> (u8, f64) {
    if freq <= 0.0 {
        return (0, 0.0);
    }
    let midi_float = 69.0 + 12.0 * (freq / a4_freq).log2();
    let midi_note = midi_float.round() as i32;
    let cents = (midi_float - midi_note as f64) * 100.0;

    let clamped = midi_note.clamp(0, 127) as u8;
    (clamped, cents)
}

/// `tuning_pitch * 2^((midi - 69) / 12)`
pub fn midi_to_frequency(midi: i32, tuning_pitch: f64) -> f64 {
    tuning_pitch * 2.0_f64.powf((midi as f64 - 69.0) / 12.0)
}

/// Scientific pitch name, C4 = 60.
pub fn midi_note_name(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{octave}", NOTE_NAMES[midi as usize % 12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BATCH_PITCH_RANGE, INTERACTIVE_PITCH_RANGE};
    use std::f64::consts::PI;

    fn generate_sine(freq: f64, sample_rate: u32, duration: f64) -> Vec<f32> {
        let num_samples = (sample_rate as f64 * duration) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * PI * freq * t).sin() as f32
            })
            .collect()
    }

    fn lcg_noise(len: usize, seed: u64, amp: f32) -> Vec<f32> {
        let mut rng = seed;
        (0..len)
            .map(|_| {
                rng = rng
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((rng >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0) as f32 * amp
            })
            .collect()
    }

    #[test]
    fn detect_a4_single_window() {
        let samples = generate_sine(440.0, 44100, 0.1);
        let result = detect_pitch(&samples, 44100, INTERACTIVE_PITCH_RANGE);

        assert!(result.confidence > 0.8, "Confidence should be high: {}", result.confidence);
        assert!(
            (result.frequency - 440.0).abs() < 2.0,
            "Expected ~440Hz, got {}",
            result.frequency
        );
    }

    #[test]
    fn detect_c4_262hz() {
        let samples = generate_sine(261.63, 44100, 0.1);
        let result = detect_pitch(&samples, 44100, INTERACTIVE_PITCH_RANGE);
        assert!(
            (result.frequency - 261.63).abs() < 2.0,
            "Expected ~261.63Hz, got {}",
            result.frequency
        );
    }

    #[test]
    fn detect_low_frequency() {
        let samples = generate_sine(82.41, 44100, 0.5); // E2
        let result = detect_pitch(&samples, 44100, BATCH_PITCH_RANGE);
        assert!(
            (result.frequency - 82.41).abs() < 1.0,
            "Expected ~82.41Hz, got {}",
            result.frequency
        );
        assert!(result.confidence > 0.8);
    }

    #[test]
    fn out_of_band_is_kept_at_half_confidence() {
        // Just above 1000 Hz: the shortest searched lag (44) still resolves it
        let samples = generate_sine(1002.0, 44100, 0.1);
        let result = detect_pitch(&samples, 44100, INTERACTIVE_PITCH_RANGE);
        assert!(
            result.frequency > 1000.0 && result.frequency < 1005.0,
            "estimate should survive the guard band: {}",
            result.frequency
        );
        assert!(
            result.confidence <= 0.5 && result.confidence > 0.4,
            "out-of-band confidence should be halved: {}",
            result.confidence
        );
    }

    #[test]
    fn noise_has_low_confidence() {
        let samples = lcg_noise(8820, 12345, 1.0);
        let result = detect_pitch(&samples, 44100, INTERACTIVE_PITCH_RANGE);
        assert!(
            result.confidence < 0.6,
            "Noise should have low confidence: {}",
            result.confidence
        );
    }

    #[test]
    fn degenerate_frames() {
        assert_eq!(detect_pitch(&[], 44100, INTERACTIVE_PITCH_RANGE), PitchEstimate::NONE);
        assert_eq!(
            detect_pitch(&[0.0; 4410], 44100, INTERACTIVE_PITCH_RANGE),
            PitchEstimate::NONE
        );
        // max lag (552) longer than the frame
        assert_eq!(
            detect_pitch(&generate_sine(440.0, 44100, 0.01), 44100, INTERACTIVE_PITCH_RANGE),
            PitchEstimate::NONE
        );
        // min lag < 1: range max above the sample rate
        assert_eq!(
            detect_pitch(
                &generate_sine(440.0, 8000, 0.1),
                8000,
                FrequencyRange::new(80.0, 9000.0)
            ),
            PitchEstimate::NONE
        );
    }

    #[test]
    fn curve_over_sine() {
        let ctx = EngineContext::default();
        let samples = generate_sine(440.0, 44100, 1.0);
        let mut last = 0.0;
        let points = pitch_curve(&samples, 44100, &ctx, &mut |p| last = p).unwrap();

        // (44100 - 4410) / 2205 + 1
        assert_eq!(points.len(), 19);
        assert_eq!(last, 1.0);
        assert!(points.windows(2).all(|w| w[0].time < w[1].time));
        assert!((points[1].time - 0.05).abs() < 1e-9);

        let summary = summarize_curve(&points);
        assert!(summary.is_pitched);
        assert!((summary.average_pitch - 440.0).abs() < 2.0, "{summary:?}");
        assert!(summary.pitch_range.min <= summary.pitch_range.max);
    }

    #[test]
    fn curve_shorter_than_window_is_empty() {
        let ctx = EngineContext::default();
        let points = pitch_curve(&[0.1; 100], 44100, &ctx, &mut |_| {}).unwrap();
        assert!(points.is_empty());
        let summary = summarize_curve(&points);
        assert!(!summary.is_pitched);
        assert_eq!(summary.average_pitch, 0.0);
    }

    #[test]
    fn curve_respects_cancellation() {
        let ctx = EngineContext::default();
        ctx.cancel_token().cancel();
        let samples = generate_sine(440.0, 44100, 1.0);
        let result = pitch_curve(&samples, 44100, &ctx, &mut |_| {});
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn summary_threshold() {
        let point = |f: f64, c: f64| PitchCurvePoint {
            time: 0.0,
            frequency: f,
            confidence: c,
        };
        // 3 of 10 confident -> exactly 30 %
        let mut points = vec![point(0.0, 0.0); 7];
        points.extend([point(200.0, 0.9), point(300.0, 0.8), point(400.0, 0.51)]);
        let summary = summarize_curve(&points);
        assert!(summary.is_pitched);
        assert!((summary.average_pitch - 300.0).abs() < 1e-9);
        assert_eq!(summary.pitch_range, PitchRange { min: 200.0, max: 400.0 });

        points.pop();
        points.push(point(400.0, 0.5));
        assert!(!summarize_curve(&points).is_pitched);
    }

    #[test]
    fn batch_mode_resists_octave_outliers() {
        let ctx = EngineContext::default();
        let mut samples = generate_sine(440.0, 44100, 1.0);
        samples.extend(generate_sine(880.0, 44100, 0.3));
        let result = detect_batch_pitch(&samples, 44100, &ctx).unwrap();
        assert_eq!(result.midi_note, 69);
        assert_eq!(result.note_name, "A4");
        assert!((result.frequency - 440.0).abs() < 1e-9);
        assert!(result.voting_windows < result.total_windows);
    }

    #[test]
    fn batch_short_noisy_clip() {
        let ctx = EngineContext::default();
        // 80 ms -> 25 ms windows
        let tone = generate_sine(220.0, 44100, 0.08);
        let noise = lcg_noise(tone.len(), 7, 0.05);
        let samples: Vec<f32> = tone.iter().zip(&noise).map(|(a, b)| a * 0.5 + b).collect();
        let result = detect_batch_pitch(&samples, 44100, &ctx).unwrap();
        assert_eq!(result.note_name, "A3");
        assert!(result.confidence > BATCH_MIN_CONFIDENCE);
    }

    #[test]
    fn batch_gates_silence() {
        let ctx = EngineContext::default();
        let result = detect_batch_pitch(&[0.001; 44100], 44100, &ctx).unwrap();
        assert!(!result.is_pitched());
        assert_eq!(result.voting_windows, 0);
        assert_eq!(result.total_windows, 19);

        let empty = detect_batch_pitch(&[], 44100, &ctx).unwrap();
        assert_eq!(empty.total_windows, 0);
    }

    #[test]
    fn batch_window_sizes() {
        assert_eq!(batch_window_seconds(0.05), 0.025);
        assert_eq!(batch_window_seconds(0.15), 0.05);
        assert_eq!(batch_window_seconds(2.0), 0.1);
    }

    #[test]
    fn freq_to_midi_a4() {
        let (note, cents) = frequency_to_midi_cents(440.0, 440.0);
        assert_eq!(note, 69);
        assert!(cents.abs() < 0.1);
    }

    #[test]
    fn freq_to_midi_a432() {
        let (note, cents) = frequency_to_midi_cents(432.0, 440.0);
        // 432 Hz is about 31.8 cents flat of A4
        assert_eq!(note, 69);
        assert!((cents - (-31.77)).abs() < 1.0, "Expected ~-31.8 cents, got {cents}");
    }

    #[test]
    fn note_names() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(69), "A4");
        assert_eq!(midi_note_name(61), "C#4");
        assert_eq!(midi_note_name(0), "C-1");
        assert!((midi_to_frequency(57, 440.0) - 220.0).abs() < 1e-9);
    }
}
