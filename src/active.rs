//! Active values: numbers that record the arithmetic done on them.
//!
//! [`Active<F>`] carries a value and the slot it occupies on the tape being
//! recorded on the current thread. Operators (`+ - * /`, unary `-`, and the
//! compound assignments) append records through
//! [`with_active_recorder`](crate::recorder::with_active_recorder); see
//! `traits/active_ops.rs`. The fused forms are available explicitly as
//! [`Active::fused_mul_add`] and [`Active::fused_mul_sub`], and are also
//! produced automatically when a trace is finalized.

use std::fmt::{self, Display};

use crate::float::Float;
use crate::opcode::{OpCode, UNUSED};
use crate::recorder::{with_active_recorder, RecorderThreadLocal};

/// Sentinel slot for passive constants (not on the tape yet).
pub const CONSTANT: u32 = u32::MAX;

/// A value taking part in a recording.
///
/// `Copy`, two words wide. The slot is only meaningful on the tape that
/// produced it; once that tape is finalized, evaluators keep their own
/// scratch values keyed by slot.
#[derive(Clone, Copy, Debug)]
pub struct Active<F: Float> {
    pub(crate) value: F,
    pub(crate) slot: u32,
}

impl<F: Float> Active<F> {
    /// Create a passive constant. It is written to the tape only when an
    /// operation first reads it.
    #[inline]
    pub fn constant(value: F) -> Self {
        Active {
            value,
            slot: CONSTANT,
        }
    }

    /// Create from a tape slot (internal use).
    #[inline]
    pub(crate) fn from_slot(value: F, slot: u32) -> Self {
        Active { value, slot }
    }

    /// Value computed during the recording pass.
    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    /// Tape slot, or [`CONSTANT`] for a passive constant.
    #[inline]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// True if this value has not been placed on the tape.
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.slot == CONSTANT
    }
}

impl<F: RecorderThreadLocal> Active<F> {
    /// `self + a * b` as a single fused record.
    pub fn fused_mul_add(self, a: Self, b: Self) -> Self {
        self.fused(OpCode::FusedMulAdd, a, b, self.value + a.value * b.value)
    }

    /// `self - a * b` as a single fused record.
    pub fn fused_mul_sub(self, a: Self, b: Self) -> Self {
        self.fused(OpCode::FusedMulSub, a, b, self.value - a.value * b.value)
    }

    /// Copy into a fresh slot (a `Copy` record).
    pub fn duplicate(self) -> Self {
        if self.is_constant() {
            return self;
        }
        let slot = with_active_recorder::<F, _>(|r| r.push_op(OpCode::Copy, [self.slot, UNUSED, UNUSED]));
        Active::from_slot(self.value, slot)
    }

    fn fused(self, op: OpCode, a: Self, b: Self, value: F) -> Self {
        if self.is_constant() && a.is_constant() && b.is_constant() {
            return Active::constant(value);
        }
        let slot = with_active_recorder(|r| {
            let y = r.slot_of(&self);
            let ai = r.slot_of(&a);
            let bi = r.slot_of(&b);
            r.push_op(op, [y, ai, bi])
        });
        Active::from_slot(value, slot)
    }
}

impl<F: Float> Display for Active<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.value, f)
    }
}

impl<F: Float> Default for Active<F> {
    fn default() -> Self {
        Active::constant(F::zero())
    }
}

impl<F: Float> From<F> for Active<F> {
    fn from(value: F) -> Self {
        Active::constant(value)
    }
}
