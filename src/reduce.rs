//! Multi-pass tree reduction.
//!
//! Each pass launches one reduce kernel over the current vector: the vector
//! is split into groups of exactly `G` elements, each group sums its
//! elements into one scalar, and the per-group scalars form the next pass's
//! input. Passes repeat until one element remains.
//!
//! ```text
//!   pass 0:  L0 (aligned)          ──reduce──▶  L1 = L0 / G
//!   pass 1:  L1 → pad to mult. G   ──reduce──▶  L2 = ⌈L1 / G⌉
//!   ...
//!   pass k:  Lk ≤ G → pad to G     ──reduce──▶  1
//! ```
//!
//! An intermediate length that is not a multiple of `G` is re-padded with
//! zeros before its pass, so a group never reads past the logical end of
//! the data. The scheduler loops on the remaining length, never on a
//! precomputed trip count.

use tracing::debug;

use crate::backend::{len_scalar, Access, Backend, LaunchArgs, LaunchRanges, Operation};
use crate::element::Element;
use crate::padding::{pad_count, padded_len};
use crate::{BackendError, ConfigError, DotError, DotResult};

/// Geometry of one reduction pass, computed on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPlan {
    /// Zero-based pass index.
    pub index: usize,
    /// Logical input length before padding.
    pub len: usize,
    /// Zeros appended before the launch.
    pub pad: usize,
    /// Input length the kernel runs over; a multiple of the group size.
    pub aligned_len: usize,
    /// Number of groups, which is also the output length.
    pub groups: usize,
}

impl PassPlan {
    /// Plan pass `index` over a vector of `len` elements.
    ///
    /// Fails with [`DotError::AlignmentDefect`] if the resulting geometry
    /// cannot shrink the vector.
    pub fn new(index: usize, len: usize, group_size: usize) -> DotResult<Self> {
        let defect = || DotError::AlignmentDefect {
            pass: index,
            len,
            group_size,
        };
        if len == 0 || group_size < 2 {
            return Err(defect());
        }
        let pad = pad_count(len, group_size);
        let aligned_len = len + pad;
        if aligned_len % group_size != 0 {
            return Err(defect());
        }
        let groups = aligned_len / group_size;
        if groups == 0 || (len > 1 && groups >= len) {
            return Err(defect());
        }
        Ok(PassPlan {
            index,
            len,
            pad,
            aligned_len,
            groups,
        })
    }

    /// Whether this pass re-pads its input.
    pub fn repads(&self) -> bool {
        self.pad > 0
    }

    /// Whether this pass produces the final scalar.
    pub fn is_last(&self) -> bool {
        self.groups == 1
    }

    /// Capacity the output buffer needs so the next pass can re-pad in place.
    pub fn output_capacity(&self, group_size: usize) -> usize {
        if self.is_last() {
            1
        } else {
            padded_len(self.groups, group_size)
        }
    }
}

/// Every pass needed to reduce `len` elements, in order.
///
/// Always at least one pass, even when `len <= group_size`.
pub fn plan_passes(len: usize, group_size: usize) -> DotResult<Vec<PassPlan>> {
    if len == 0 {
        return Err(ConfigError::EmptyInput.into());
    }
    if group_size < 2 {
        return Err(ConfigError::InvalidGroupSize(group_size).into());
    }
    let mut plans = Vec::new();
    let mut len = len;
    loop {
        let plan = PassPlan::new(plans.len(), len, group_size)?;
        plans.push(plan);
        len = plan.groups;
        if plan.is_last() {
            return Ok(plans);
        }
    }
}

/// Naive pass estimate `max(1, ⌈log_G(len)⌉)`.
///
/// Used for logging and sizing only; [`plan_passes`] and the scheduler
/// derive the real count from the lengths themselves.
pub fn estimated_passes(len: usize, group_size: usize) -> usize {
    let mut passes = 0;
    let mut span = 1usize;
    while span < len {
        span = span.saturating_mul(group_size);
        passes += 1;
    }
    passes.max(1)
}

/// Result of a completed reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReductionOutcome<T> {
    /// The single remaining element.
    pub value: T,
    /// Passes executed.
    pub passes: usize,
    /// Passes that re-padded their input first.
    pub repads: usize,
}

/// Input of one pass: the vector produced by the previous pass (or the
/// multiply stage) and its logical length.
struct PassState<Buf> {
    input: Buf,
    index: usize,
    len: usize,
}

/// Drives reduce launches over a backend until one scalar remains.
pub struct ReductionScheduler<'a, B: ?Sized> {
    backend: &'a B,
    group_size: usize,
}

impl<'a, B: ?Sized> ReductionScheduler<'a, B> {
    pub fn new(backend: &'a B, group_size: usize) -> Self {
        ReductionScheduler {
            backend,
            group_size,
        }
    }

    /// Reduce `len` elements held in `input` to one scalar.
    ///
    /// `input` must have room for `padded_len(len, G)` elements. It is
    /// consumed; every pass allocates a fresh output buffer and the
    /// previous input is dropped once the pass's barrier returns.
    pub fn reduce<T>(
        &self,
        input: <B as Backend<T>>::Buffer,
        len: usize,
    ) -> DotResult<ReductionOutcome<T>>
    where
        T: Element,
        B: Backend<T>,
    {
        if len == 0 {
            return Err(ConfigError::EmptyInput.into());
        }
        if self.group_size < 2 {
            return Err(ConfigError::InvalidGroupSize(self.group_size).into());
        }

        let mut state = PassState {
            input,
            index: 0,
            len,
        };
        let mut repads = 0;
        loop {
            let plan = PassPlan::new(state.index, state.len, self.group_size)?;
            if plan.repads() {
                repads += 1;
            }
            state = self.run_pass::<T>(state, &plan)?;
            if state.len == 1 {
                break;
            }
        }

        let value = self
            .backend
            .read(&state.input, 0, 1)?
            .first()
            .copied()
            .ok_or_else(|| BackendError::Transfer("empty read-back of final scalar".into()))?;
        Ok(ReductionOutcome {
            value,
            passes: state.index,
            repads,
        })
    }

    /// Execute one pass: re-pad, launch, barrier. Returns the next state.
    fn run_pass<T>(
        &self,
        mut state: PassState<<B as Backend<T>>::Buffer>,
        plan: &PassPlan,
    ) -> DotResult<PassState<<B as Backend<T>>::Buffer>>
    where
        T: Element,
        B: Backend<T>,
    {
        let backend = self.backend;
        if plan.repads() {
            let zeros = vec![T::zero(); plan.pad];
            backend.write(&mut state.input, plan.len, &zeros)?;
        }

        let output = backend.alloc(plan.output_capacity(self.group_size), Access::ReadWrite)?;
        let ranges = LaunchRanges {
            global: plan.aligned_len,
            group: self.group_size,
        };
        let n = len_scalar(plan.aligned_len)?;
        backend.launch(
            Operation::Reduce,
            ranges,
            LaunchArgs {
                inputs: &[&state.input],
                output: &output,
                scalars: &[n],
            },
        )?;
        backend.barrier()?;

        debug!(
            pass = plan.index,
            len = plan.len,
            pad = plan.pad,
            groups = plan.groups,
            "reduction pass"
        );

        Ok(PassState {
            input: output,
            index: plan.index + 1,
            len: plan.groups,
        })
    }
}
