//! Element types supported by the kernels.
//!
//! Each element type carries the names the kernel sources use for it and
//! the host-side accumulator the verifier sums into.

use std::fmt;

use rand::Rng;

/// Kernel-facing tag for an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    I32,
    F32,
}

impl ElementKind {
    /// Scalar type name in WGSL.
    pub fn wgsl_type(self) -> &'static str {
        match self {
            ElementKind::I32 => "i32",
            ElementKind::F32 => "f32",
        }
    }

    /// Scalar type name in OpenCL C.
    pub fn opencl_type(self) -> &'static str {
        match self {
            ElementKind::I32 => "int",
            ElementKind::F32 => "float",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::I32 => "i32",
            ElementKind::F32 => "f32",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A numeric element the pipeline can multiply and sum.
///
/// Integer arithmetic wraps on overflow, on the host and on every device.
pub trait Element:
    bytemuck::Pod + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const KIND: ElementKind;

    /// Host accumulator used for the reference sum.
    type Acc: Copy + PartialEq + fmt::Debug + fmt::Display + Send + Sync;

    fn zero() -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn add(self, rhs: Self) -> Self;

    fn acc_zero() -> Self::Acc;
    fn acc_mul_add(acc: Self::Acc, a: Self, b: Self) -> Self::Acc;

    /// Whether a device result agrees with the host reference.
    fn agrees(device: Self, reference: Self::Acc, epsilon: f64) -> bool;

    /// Convert a small integer, used for deterministic fills.
    fn from_i32(v: i32) -> Self;

    /// Draw a uniformly distributed value from the element's test range.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

impl Element for i32 {
    const KIND: ElementKind = ElementKind::I32;
    type Acc = i32;

    fn zero() -> Self {
        0
    }

    fn mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn acc_zero() -> i32 {
        0
    }

    fn acc_mul_add(acc: i32, a: i32, b: i32) -> i32 {
        acc.wrapping_add(a.wrapping_mul(b))
    }

    fn agrees(device: i32, reference: i32, _epsilon: f64) -> bool {
        device == reference
    }

    fn from_i32(v: i32) -> Self {
        v
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.random_range(-100..=100)
    }
}

impl Element for f32 {
    const KIND: ElementKind = ElementKind::F32;
    type Acc = f64;

    fn zero() -> Self {
        0.0
    }

    fn mul(self, rhs: Self) -> Self {
        self * rhs
    }

    fn add(self, rhs: Self) -> Self {
        self + rhs
    }

    fn acc_zero() -> f64 {
        0.0
    }

    fn acc_mul_add(acc: f64, a: f32, b: f32) -> f64 {
        acc + f64::from(a) * f64::from(b)
    }

    /// Absolute tolerance, strict: `|device - reference| < epsilon`.
    fn agrees(device: f32, reference: f64, epsilon: f64) -> bool {
        (f64::from(device) - reference).abs() < epsilon
    }

    fn from_i32(v: i32) -> Self {
        v as f32
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.random_range(-1.0..1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_wraps() {
        assert_eq!(i32::MAX.add(1), i32::MIN);
        assert_eq!(i32::acc_mul_add(i32::MAX, 1, 1), i32::MIN);
    }

    #[test]
    fn test_i32_agrees_exactly() {
        assert!(i32::agrees(42, 42, 1.0));
        assert!(!i32::agrees(42, 43, 1.0));
    }

    #[test]
    fn test_f32_agrees_within_tolerance() {
        assert!(f32::agrees(1.00001, 1.0, 1e-4));
        assert!(!f32::agrees(1.001, 1.0, 1e-4));
    }

    #[test]
    fn test_f32_tolerance_is_absolute() {
        assert!(!f32::agrees(1000.05, 1000.0, 1e-4));
        assert!(f32::agrees(1000.0, 1000.00001, 1e-4));
    }

    #[test]
    fn test_f32_tolerance_is_strict() {
        assert!(!f32::agrees(1.0, 1.0, 0.0));
        assert!(!f32::agrees(1.5, 1.0, 0.5));
    }

    #[test]
    fn test_kind_type_names() {
        assert_eq!(i32::KIND.wgsl_type(), "i32");
        assert_eq!(f32::KIND.opencl_type(), "float");
        assert_eq!(ElementKind::F32.to_string(), "f32");
    }
}
