//! End-to-end dot product: validate, pad, upload, multiply, reduce, verify.
//!
//! [`DotEngine`] borrows a backend (the execution context owning the device,
//! queue and compiled kernels) and carries a [`DotConfig`]. The same engine
//! handles any length and any [`Element`] type the backend supports.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::{Access, Backend};
use crate::element::Element;
use crate::multiply::multiply;
use crate::padding::pad;
use crate::reduce::{estimated_passes, ReductionScheduler};
use crate::verify::{self, Verdict};
use crate::{ConfigError, DotResult};

/// Default group size.
pub const DEFAULT_GROUP_SIZE: usize = 256;

/// Default verification tolerance for floating-point elements.
pub const DEFAULT_EPSILON: f64 = 1e-4;

/// Settings for a dot-product run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotConfig {
    /// Lanes per group; every launch covers a multiple of this.
    pub group_size: usize,
    /// Absolute float tolerance: a result matches when `|device - reference| < epsilon`.
    /// Integer results always compare exactly.
    pub epsilon: f64,
}

impl Default for DotConfig {
    fn default() -> Self {
        DotConfig {
            group_size: DEFAULT_GROUP_SIZE,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl DotConfig {
    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_size < 2 {
            return Err(ConfigError::InvalidGroupSize(self.group_size));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ConfigError::InvalidEpsilon(self.epsilon));
        }
        Ok(())
    }
}

/// Wall-clock time spent in each stage of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub upload: Duration,
    pub multiply: Duration,
    /// All reduction passes plus read-back of the final scalar.
    pub reduce: Duration,
    pub verify: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.upload + self.multiply + self.reduce + self.verify
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        write!(
            f,
            "upload {:.3} ms, multiply {:.3} ms, reduce {:.3} ms, verify {:.3} ms (total {:.3} ms)",
            ms(self.upload),
            ms(self.multiply),
            ms(self.reduce),
            ms(self.verify),
            ms(self.total())
        )
    }
}

/// Result of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotOutcome<T: Element> {
    /// Dot product computed on the backend.
    pub value: T,
    /// Host reference sum.
    pub reference: T::Acc,
    pub verdict: Verdict,
    /// Reduction passes executed.
    pub passes: usize,
    /// Input length after the initial zero-pad.
    pub padded_len: usize,
    pub timings: StageTimings,
}

/// Dot-product engine over one backend.
pub struct DotEngine<'a, B: ?Sized> {
    backend: &'a B,
    config: DotConfig,
}

impl<'a, B: ?Sized> DotEngine<'a, B> {
    pub fn new(backend: &'a B, config: DotConfig) -> Self {
        DotEngine { backend, config }
    }

    /// Compute `Σ a[k]·b[k]` on the backend and verify it on the host.
    ///
    /// Configuration and input lengths are checked before the backend is
    /// touched. Any backend failure aborts the run.
    pub fn run<T>(&self, a: &[T], b: &[T]) -> DotResult<DotOutcome<T>>
    where
        T: Element,
        B: Backend<T>,
    {
        self.config.validate()?;
        if a.len() != b.len() {
            return Err(ConfigError::LengthMismatch {
                a: a.len(),
                b: b.len(),
            }
            .into());
        }
        if a.is_empty() {
            return Err(ConfigError::EmptyInput.into());
        }
        let group_size = self.config.group_size;
        self.backend.check_group_size(group_size)?;

        let mut timings = StageTimings::default();

        let t0 = Instant::now();
        let a_padded = pad(a, group_size);
        let b_padded = pad(b, group_size);
        let len = a_padded.len();
        debug!(
            backend = self.backend.name(),
            elem = %T::KIND,
            len = a.len(),
            padded = len,
            group_size,
            estimated_passes = estimated_passes(len, group_size),
            "starting dot product"
        );
        let mut a_buf = self.backend.alloc(len, Access::ReadOnly)?;
        let mut b_buf = self.backend.alloc(len, Access::ReadOnly)?;
        self.backend.write(&mut a_buf, 0, &a_padded)?;
        self.backend.write(&mut b_buf, 0, &b_padded)?;
        timings.upload = t0.elapsed();

        let t0 = Instant::now();
        let products = multiply::<T, B>(self.backend, &a_buf, &b_buf, len, group_size)?;
        drop(a_buf);
        drop(b_buf);
        timings.multiply = t0.elapsed();

        let t0 = Instant::now();
        let reduction =
            ReductionScheduler::new(self.backend, group_size).reduce::<T>(products, len)?;
        timings.reduce = t0.elapsed();

        let t0 = Instant::now();
        let reference = verify::reference(a, b);
        let verdict = verify::verify(reduction.value, reference, self.config.epsilon);
        timings.verify = t0.elapsed();

        if verdict.is_match() {
            info!(
                value = %reduction.value,
                passes = reduction.passes,
                %timings,
                "dot product verified"
            );
        } else {
            warn!(
                value = %reduction.value,
                %reference,
                passes = reduction.passes,
                "dot product does not match host reference"
            );
        }

        Ok(DotOutcome {
            value: reduction.value,
            reference,
            verdict,
            passes: reduction.passes,
            padded_len: len,
            timings,
        })
    }
}
