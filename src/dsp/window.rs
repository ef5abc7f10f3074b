//! Hann window, cached per size.

use std::cell::RefCell;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::rc::Rc;

thread_local! {
    static HANN_CACHE: RefCell<HashMap<usize, Rc<[f64]>>> = RefCell::new(HashMap::new());
}

/// Symmetric Hann window: `w[i] = 0.5 * (1 - cos(2πi / (N-1)))`.
pub fn hann(size: usize) -> Rc<[f64]> {
    HANN_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .entry(size)
            .or_insert_with(|| {
                if size <= 1 {
                    return vec![1.0; size].into();
                }
                let n_minus_1 = (size - 1) as f64;
                (0..size)
                    .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n_minus_1).cos()))
                    .collect()
            })
            .clone()
    })
}

/// Multiply `samples` by a Hann window of the same length.
pub fn apply_hann(samples: &[f32]) -> Vec<f64> {
    let w = hann(samples.len());
    samples
        .iter()
        .zip(w.iter())
        .map(|(&s, &w)| s as f64 * w)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_and_center() {
        let w = hann(513);
        assert!(w[0].abs() < 1e-12);
        assert!(w[512].abs() < 1e-12);
        assert!((w[256] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn symmetric() {
        let w = hann(2048);
        for i in 0..1024 {
            assert!((w[i] - w[2047 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_sizes() {
        assert!(hann(0).is_empty());
        assert_eq!(&hann(1)[..], &[1.0]);
    }

    #[test]
    fn apply_scales_samples() {
        let out = apply_hann(&[1.0; 5]);
        assert_eq!(out.len(), 5);
        assert!((out[2] - 1.0).abs() < 1e-12);
        assert!(out[0].abs() < 1e-12);
    }
}
