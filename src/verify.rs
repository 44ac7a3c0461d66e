//! Host reference and device-result verification.

use std::fmt;

use crate::element::Element;

/// Outcome of comparing a device result to the host reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    Mismatch,
}

impl Verdict {
    pub fn is_match(self) -> bool {
        self == Verdict::Match
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Match => f.write_str("match"),
            Verdict::Mismatch => f.write_str("mismatch"),
        }
    }
}

/// Sequential host dot product, summed in index order.
///
/// `f32` inputs accumulate in `f64`; `i32` wraps like the device kernels.
pub fn reference<T: Element>(a: &[T], b: &[T]) -> T::Acc {
    a.iter()
        .zip(b)
        .fold(T::acc_zero(), |acc, (&x, &y)| T::acc_mul_add(acc, x, y))
}

/// Compare a device result against the host reference.
pub fn verify<T: Element>(device: T, reference: T::Acc, epsilon: f64) -> Verdict {
    if T::agrees(device, reference, epsilon) {
        Verdict::Match
    } else {
        Verdict::Mismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_int() {
        assert_eq!(reference(&[1i32, 2, 3], &[4, 5, 6]), 32);
        assert_eq!(reference::<i32>(&[], &[]), 0);
    }

    #[test]
    fn test_reference_float_accumulates_in_f64() {
        let a = vec![0.1f32; 10];
        let r = reference(&a, &a);
        assert!((r - 10.0 * f64::from(0.1f32) * f64::from(0.1f32)).abs() < 1e-12);
    }

    #[test]
    fn test_verify_int_exact() {
        assert_eq!(verify(65536i32, 65536, 1e-4), Verdict::Match);
        assert_eq!(verify(65535i32, 65536, 1e-4), Verdict::Mismatch);
    }

    #[test]
    fn test_verify_float_tolerance() {
        assert_eq!(verify(1.0f32, 1.00001, 1e-4), Verdict::Match);
        assert_eq!(verify(1.0f32, 1.01, 1e-4), Verdict::Mismatch);
    }

    #[test]
    fn test_verify_float_tolerance_not_scaled_by_magnitude() {
        assert_eq!(verify(1000.05f32, 1000.0, 1e-4), Verdict::Mismatch);
        assert_eq!(verify(1.0f32, 1.0, 0.0), Verdict::Mismatch);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Match.to_string(), "match");
        assert_eq!(Verdict::Mismatch.to_string(), "mismatch");
        assert!(Verdict::Match.is_match());
    }
}
