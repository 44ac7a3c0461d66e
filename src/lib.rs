//! # gpudot
//!
//! Dot product of two large vectors on a compute device, computed as an
//! elementwise multiply followed by repeated group-local tree reductions.
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────────────┐   ┌──────────┐
//! │  A, B    │──▶│ multiply │──▶│ reduce (pass loop) │──▶│ verifier │
//! │  padded  │   │  C = A·B │   │  L → L/G → … → 1   │   │  host Σ  │
//! └──────────┘   └──────────┘   └────────────────────┘   └──────────┘
//! ```
//!
//! Device access goes through the [`backend::Backend`] trait. The
//! [`cpu::CpuBackend`] is always available; `webgpu` and `opencl` features
//! add real device engines.
//!
//! ```rust
//! use gpudot::cpu::CpuBackend;
//! use gpudot::pipeline::{DotConfig, DotEngine};
//!
//! let backend = CpuBackend::new();
//! let engine = DotEngine::new(&backend, DotConfig::default());
//! let a = vec![1i32; 65536];
//! let b = vec![1i32; 65536];
//! let outcome = engine.run(&a, &b).unwrap();
//! assert_eq!(outcome.value, 65536);
//! assert_eq!(outcome.verdict.to_string(), "match");
//! ```

pub mod backend;
pub mod cpu;
pub mod element;
pub mod generate;
pub mod multiply;
pub mod padding;
pub mod pipeline;
pub mod reduce;
pub mod verify;

#[cfg(feature = "opencl")]
pub mod opencl;

#[cfg(feature = "webgpu")]
pub mod webgpu;

#[cfg(test)]
mod validation;

pub use backend::BackendError;

use thiserror::Error;

/// Invalid input or configuration, detected before any device interaction.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Input vectors have zero length.
    #[error("input vectors must not be empty")]
    EmptyInput,
    /// Input vectors differ in length.
    #[error("input length mismatch (a={a}, b={b})")]
    LengthMismatch { a: usize, b: usize },
    /// Group size below 2.
    #[error("group size must be at least 2, got {0}")]
    InvalidGroupSize(usize),
    /// Negative or non-finite tolerance.
    #[error("epsilon must be finite and non-negative, got {0}")]
    InvalidEpsilon(f64),
}

/// Error types for a dot-product run.
///
/// Every variant terminates the current run. Verification mismatches are
/// not errors; see [`verify::Verdict`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DotError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    /// A reduction pass computed a length that padding should have made
    /// impossible.
    #[error("alignment defect at pass {pass}: length {len} with group size {group_size}")]
    AlignmentDefect {
        pass: usize,
        len: usize,
        group_size: usize,
    },
}

pub type DotResult<T> = Result<T, DotError>;
