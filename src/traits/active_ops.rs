//! `std::ops` implementations for [`Active<F>`].
//!
//! Each operator records one record on the thread's active recording.
//! Operations whose operands are all passive constants fold to a constant
//! without touching the tape.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::active::Active;
use crate::opcode::{OpCode, UNUSED};
use crate::recorder::{with_active_recorder, RecorderThreadLocal};

/// Record a binary op, promoting constants as needed.
#[inline]
fn active_binary_op<F: RecorderThreadLocal>(
    lhs: Active<F>,
    rhs: Active<F>,
    op: OpCode,
    value: F,
) -> Active<F> {
    if lhs.is_constant() && rhs.is_constant() {
        return Active::constant(value);
    }
    let slot = with_active_recorder(|r| {
        let li = r.slot_of(&lhs);
        let ri = r.slot_of(&rhs);
        r.push_op(op, [li, ri, UNUSED])
    });
    Active::from_slot(value, slot)
}

/// Record a unary op.
#[inline]
fn active_unary_op<F: RecorderThreadLocal>(x: Active<F>, op: OpCode, value: F) -> Active<F> {
    if x.is_constant() {
        return Active::constant(value);
    }
    let slot = with_active_recorder::<F, _>(|r| r.push_op(op, [x.slot, UNUSED, UNUSED]));
    Active::from_slot(value, slot)
}

// ──────────────────────────────────────────────
//  Active<F> ↔ Active<F> operators
// ──────────────────────────────────────────────

impl<F: RecorderThreadLocal> Add for Active<F> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        active_binary_op(self, rhs, OpCode::Add, self.value + rhs.value)
    }
}

impl<F: RecorderThreadLocal> Sub for Active<F> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        active_binary_op(self, rhs, OpCode::Sub, self.value - rhs.value)
    }
}

impl<F: RecorderThreadLocal> Mul for Active<F> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        active_binary_op(self, rhs, OpCode::Mul, self.value * rhs.value)
    }
}

impl<F: RecorderThreadLocal> Div for Active<F> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        active_binary_op(self, rhs, OpCode::Div, self.value / rhs.value)
    }
}

impl<F: RecorderThreadLocal> Neg for Active<F> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        active_unary_op(self, OpCode::Neg, -self.value)
    }
}

// Assign variants delegate to the binary ops; `y -= a * b` is later fused.
impl<F: RecorderThreadLocal> AddAssign for Active<F> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<F: RecorderThreadLocal> SubAssign for Active<F> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<F: RecorderThreadLocal> MulAssign for Active<F> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<F: RecorderThreadLocal> DivAssign for Active<F> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

// ──────────────────────────────────────────────
//  Mixed ops: Active<F> with primitive floats
// ──────────────────────────────────────────────

// The scalar becomes a passive constant and is promoted to a `Const` record.
macro_rules! impl_active_scalar_ops {
    ($f:ty, $($trait:ident $method:ident $assign_trait:ident $assign_method:ident),*) => {
        $(
            impl $trait<$f> for Active<$f> {
                type Output = Active<$f>;
                #[inline]
                fn $method(self, rhs: $f) -> Active<$f> {
                    self.$method(Active::constant(rhs))
                }
            }

            impl $trait<Active<$f>> for $f {
                type Output = Active<$f>;
                #[inline]
                fn $method(self, rhs: Active<$f>) -> Active<$f> {
                    Active::constant(self).$method(rhs)
                }
            }

            impl $assign_trait<$f> for Active<$f> {
                #[inline]
                fn $assign_method(&mut self, rhs: $f) {
                    *self = (*self).$method(Active::constant(rhs));
                }
            }
        )*
    };
}

impl_active_scalar_ops!(
    f32,
    Add add AddAssign add_assign,
    Sub sub SubAssign sub_assign,
    Mul mul MulAssign mul_assign,
    Div div DivAssign div_assign
);
impl_active_scalar_ops!(
    f64,
    Add add AddAssign add_assign,
    Sub sub SubAssign sub_assign,
    Mul mul MulAssign mul_assign,
    Div div DivAssign div_assign
);

// ── Comparison ──

impl<F: crate::float::Float> PartialEq for Active<F> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<F: crate::float::Float> PartialOrd for Active<F> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

#[cfg(test)]
mod tests {
    use crate::active::Active;
    use crate::opcode::OpCode;
    use crate::recorder::{RecordOptions, RecordingSession};
    use crate::store::TraceId;

    #[test]
    fn constant_arithmetic_needs_no_recording() {
        let a = Active::constant(2.0_f64);
        let b = a * 3.0 + 1.0;
        assert!(b.is_constant());
        assert_eq!(b.value(), 7.0);
    }

    #[test]
    fn scalar_operands_become_const_records() {
        let mut rec =
            RecordingSession::<f64>::begin_with(TraceId(20), RecordOptions::unfused()).unwrap();
        let x = rec.mark_independent(3.0);
        let y = 2.0 * x - 1.0;
        assert_eq!(y.value(), 5.0);
        rec.mark_dependent(y);
        let tape = rec.end().unwrap();
        assert_eq!(tape.stats().constant_count, 2);
        assert_eq!(
            tape.opcodes(),
            &[
                OpCode::MarkIndependent,
                OpCode::Const,
                OpCode::Mul,
                OpCode::Const,
                OpCode::Sub,
                OpCode::MarkDependent,
            ]
        );
    }

    #[test]
    fn compound_assignment_records_each_step() {
        let mut rec =
            RecordingSession::<f64>::begin_with(TraceId(21), RecordOptions::unfused()).unwrap();
        let x = rec.mark_independent(4.0);
        let mut y = x;
        y *= x;
        y /= 2.0;
        y += -x;
        assert_eq!(y.value(), 4.0);
        assert_eq!(rec.num_records(), 6);
    }

    #[test]
    fn unary_records_on_both_float_types() {
        let mut rec = RecordingSession::<f32>::begin(TraceId(22)).unwrap();
        let x = rec.mark_independent(1.5);
        let n = -x;
        let d = x.duplicate();
        assert_eq!((n.value(), d.value()), (-1.5, 1.5));
        rec.mark_dependent(n);
        rec.mark_dependent(d);
        let tape = rec.end().unwrap();
        assert_eq!(
            &tape.opcodes()[1..3],
            &[OpCode::Neg, OpCode::Copy]
        );
        assert_eq!(tape.jacobian(&[2.0]).unwrap().as_slice(), &[-1.0, 1.0]);

        let mut rec = RecordingSession::<f64>::begin(TraceId(23)).unwrap();
        let x = rec.mark_independent(2.0);
        rec.mark_dependent(-(-x).duplicate());
        assert_eq!(rec.end().unwrap().interpret(&[4.0]).unwrap(), vec![4.0]);
    }
}
