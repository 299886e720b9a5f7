//! Elementary operation codes for the tape.
//!
//! Each opcode represents one record. [`eval_forward`] evaluates a record and
//! [`reverse_partials`] returns the partial derivatives of its result with
//! respect to each slot operand.

use std::fmt;

use num_traits::Float;

/// Sentinel used in unused operand positions.
pub const UNUSED: u32 = u32::MAX;

/// Elementary operation codes.
///
/// Operands live in a `[u32; 3]` per record. Slot operands come first; the
/// marker and constant records reuse the array for side-table indices:
///
/// | opcode            | `args[0]`        | `args[1]`       | `args[2]` |
/// |-------------------|------------------|-----------------|-----------|
/// | `Const`           | constant index   | -               | -         |
/// | `MarkIndependent` | independent index| -               | -         |
/// | `MarkDependent`   | slot             | dependent index | -         |
/// | `Copy`, `Neg`     | slot             | -               | -         |
/// | binary            | slot             | slot            | -         |
/// | fused             | accumulator slot | factor slot     | factor slot |
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ── Structural ──
    /// Scalar constant from the tape's constant pool.
    Const,
    /// Input variable; binds the next independent.
    MarkIndependent,
    /// Output marker; produces no slot.
    MarkDependent,

    // ── Unary ──
    /// Plain assignment from another slot.
    Copy,
    Neg,

    // ── Binary arithmetic ──
    Add,
    Sub,
    Mul,
    Div,

    // ── Fused accumulation ──
    /// `r = y + a * b`
    FusedMulAdd,
    /// `r = y - a * b`
    FusedMulSub,
}

impl OpCode {
    /// Number of leading entries in the operand array that are slots.
    #[inline]
    pub fn slot_operands(self) -> usize {
        match self {
            OpCode::Const | OpCode::MarkIndependent => 0,
            OpCode::MarkDependent | OpCode::Copy | OpCode::Neg => 1,
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => 2,
            OpCode::FusedMulAdd | OpCode::FusedMulSub => 3,
        }
    }

    /// Whether the record writes a result slot.
    #[inline]
    pub fn produces_slot(self) -> bool {
        self != OpCode::MarkDependent
    }

    /// Whether the record is differentiable arithmetic (has adjoint rules).
    #[inline]
    pub fn is_arithmetic(self) -> bool {
        !matches!(
            self,
            OpCode::Const | OpCode::MarkIndependent | OpCode::MarkDependent
        )
    }

    /// Short mnemonic used in tape listings.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Const => "const",
            OpCode::MarkIndependent => "indep",
            OpCode::MarkDependent => "dep",
            OpCode::Copy => "copy",
            OpCode::Neg => "neg",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::FusedMulAdd => "fmadd",
            OpCode::FusedMulSub => "fmsub",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

/// Evaluate an arithmetic record in the forward direction.
///
/// `a`, `b`, `c` are the values of the slot operands in order; unused ones
/// are ignored. Fused records evaluate `a ± (b * c)` without a hardware FMA
/// so the result is bit-identical to the unfused pair of records.
#[inline]
pub fn eval_forward<T: Float>(op: OpCode, a: T, b: T, c: T) -> T {
    match op {
        OpCode::Const | OpCode::MarkIndependent | OpCode::MarkDependent => {
            unreachable!("structural records are not evaluated via eval_forward")
        }
        OpCode::Copy => a,
        OpCode::Neg => -a,
        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::FusedMulAdd => a + b * c,
        OpCode::FusedMulSub => a - b * c,
    }
}

/// Partial derivatives `[∂r/∂a, ∂r/∂b, ∂r/∂c]` of an arithmetic record.
///
/// `r` is the record's result value. Entries past
/// [`slot_operands`](OpCode::slot_operands) are zero.
#[inline]
pub fn reverse_partials<T: Float>(op: OpCode, a: T, b: T, c: T, r: T) -> [T; 3] {
    let zero = T::zero();
    let one = T::one();
    match op {
        OpCode::Const | OpCode::MarkIndependent | OpCode::MarkDependent => [zero; 3],
        OpCode::Copy => [one, zero, zero],
        OpCode::Neg => [-one, zero, zero],
        OpCode::Add => [one, one, zero],
        OpCode::Sub => [one, -one, zero],
        OpCode::Mul => [b, a, zero],
        OpCode::Div => {
            let inv = one / b;
            [inv, -r * inv, zero]
        }
        OpCode::FusedMulAdd => [one, c, b],
        OpCode::FusedMulSub => [one, -c, -b],
    }
}
