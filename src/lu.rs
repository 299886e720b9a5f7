//! Dense LU factorization and solve, used as the reference workload.
//!
//! [`lu_factor`] and [`lu_solve`] are generic over the scalar, so the same
//! code runs on plain `f64` and on [`Active<f64>`] while recording. No
//! pivoting is done; the sample systems are diagonally dominated.
//!
//! [`Problem::trace`] records one `n x n` solve with `n*n + n` independents
//! (the matrix row-major, then the right-hand side) and `n` dependents (the
//! solution), and [`Problem::apply_drivers`] evaluates both Jacobian drivers
//! on the recorded tape.

use std::ops::{Div, DivAssign, Mul, Sub, SubAssign};
use std::sync::Arc;

use log::debug;

use crate::active::Active;
use crate::error::Result;
use crate::matrix::{Matrix, Mismatch};
use crate::store::{TapeStore, TraceId};
use crate::tape::Tape;

/// Tolerance used when comparing the sequential and parallel Jacobians.
pub const COMPARE_EPS: f64 = 1e-10;

/// Arithmetic needed by the LU kernels.
pub trait LuScalar:
    Copy + Sub<Output = Self> + Mul<Output = Self> + Div<Output = Self> + SubAssign + DivAssign
{
}

impl<T> LuScalar for T where
    T: Copy + Sub<Output = T> + Mul<Output = T> + Div<Output = T> + SubAssign + DivAssign
{
}

/// In-place LU factorization of the row-major `n x n` matrix `a`.
///
/// On return the strict lower triangle holds `L` (unit diagonal implied) and
/// the upper triangle holds `U`.
///
/// # Panics
///
/// If `a.len() != n * n`.
pub fn lu_factor<T: LuScalar>(n: usize, a: &mut [T]) {
    assert_eq!(a.len(), n * n, "lu_factor: matrix must be {}x{}", n, n);
    for j in 0..n {
        for i in 0..=j {
            for k in 0..i {
                let p = a[i * n + k] * a[k * n + j];
                a[i * n + j] -= p;
            }
        }
        for i in j + 1..n {
            for k in 0..j {
                let p = a[i * n + k] * a[k * n + j];
                a[i * n + j] -= p;
            }
            let pivot = a[j * n + j];
            a[i * n + j] /= pivot;
        }
    }
}

/// Solve `L U x = b` in place, given the output of [`lu_factor`].
///
/// # Panics
///
/// If the lengths of `lu` and `bx` do not match `n`.
pub fn lu_solve<T: LuScalar>(n: usize, lu: &[T], bx: &mut [T]) {
    assert_eq!(lu.len(), n * n, "lu_solve: matrix must be {}x{}", n, n);
    assert_eq!(bx.len(), n, "lu_solve: right-hand side must have {} entries", n);
    for i in 0..n {
        for j in 0..i {
            let p = lu[i * n + j] * bx[j];
            bx[i] -= p;
        }
    }
    for i in (0..n).rev() {
        for j in i + 1..n {
            let p = lu[i * n + j] * bx[j];
            bx[i] -= p;
        }
        bx[i] /= lu[i * n + i];
    }
}

/// A sample linear system `A x = b`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearSystem {
    pub size: usize,
    /// Row-major `size x size` matrix.
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl LinearSystem {
    /// `A = a1·a2ᵀ + diag(1, ..., n)` with `a1[i] = 0.25 i`, `a2[j] = 0.33 j`,
    /// and `b[i] = -(i + 1)`.
    pub fn sample(n: usize) -> Self {
        let a1: Vec<f64> = (0..n).map(|i| i as f64 * 0.25).collect();
        let a2: Vec<f64> = (0..n).map(|j| j as f64 * 0.33).collect();
        let mut a = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                a[i * n + j] = a1[i] * a2[j];
            }
            a[i * n + i] += (i + 1) as f64;
        }
        let b = (0..n).map(|i| -((i + 1) as f64)).collect();
        LinearSystem { size: n, a, b }
    }

    /// Independent vector: `A` row-major followed by `b`.
    pub fn args(&self) -> Vec<f64> {
        let mut args = Vec::with_capacity(self.a.len() + self.b.len());
        args.extend_from_slice(&self.a);
        args.extend_from_slice(&self.b);
        args
    }

    /// Solve with plain floating point.
    pub fn solve(&self) -> Vec<f64> {
        let mut lu = self.a.clone();
        let mut x = self.b.clone();
        lu_factor(self.size, &mut lu);
        lu_solve(self.size, &lu, &mut x);
        x
    }
}

/// One recorded LU solve.
#[derive(Clone, Debug)]
pub struct Problem {
    pub size: usize,
    pub id: TraceId,
    /// Number of independents, `size * size + size`.
    pub indep: usize,
    /// Number of dependents, `size`.
    pub depen: usize,
    /// Independent values the trace was recorded at.
    pub args: Vec<f64>,
    /// Solution computed while recording.
    pub x: Vec<f64>,
    pub tape: Arc<Tape<f64>>,
}

/// Result of running both Jacobian drivers on a [`Problem`].
#[derive(Clone, Debug)]
pub struct DriverReport {
    pub jacobian: Matrix<f64>,
    pub par_jacobian: Matrix<f64>,
    /// Entries where the two Jacobians differ by more than [`COMPARE_EPS`].
    pub mismatches: Vec<Mismatch<f64>>,
}

impl DriverReport {
    /// True if both Jacobians agree within [`COMPARE_EPS`].
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl Problem {
    /// Record the solve of [`LinearSystem::sample`]`(n)` under `id` and
    /// register the tape in `store`.
    ///
    /// # Errors
    ///
    /// [`TapeError::ConcurrentRecording`](crate::TapeError::ConcurrentRecording)
    /// if `id` is taken or the thread is already recording;
    /// [`TapeError::MalformedTrace`](crate::TapeError::MalformedTrace) for
    /// `n == 0`, which has no dependents.
    pub fn trace(store: &TapeStore<f64>, id: TraceId, n: usize) -> Result<Self> {
        let system = LinearSystem::sample(n);
        let args = system.args();
        let mut x = Vec::with_capacity(n);

        let tape = store.record(id, |rec| {
            let mut aa: Vec<Active<f64>> =
                system.a.iter().map(|&v| rec.mark_independent(v)).collect();
            let mut abx: Vec<Active<f64>> =
                system.b.iter().map(|&v| rec.mark_independent(v)).collect();
            lu_factor(n, &mut aa);
            lu_solve(n, &aa, &mut abx);
            for xi in abx {
                x.push(rec.mark_dependent(xi));
            }
        })?;
        debug!("traced LU solve of size {} as trace {}", n, id);

        Ok(Problem {
            size: n,
            id,
            indep: n * n + n,
            depen: n,
            args,
            x,
            tape,
        })
    }

    /// Replay the tape at the recorded arguments.
    pub fn replay(&self) -> Result<Vec<f64>> {
        self.tape.interpret(&self.args)
    }

    /// Sequential and parallel Jacobian at the recorded arguments, compared.
    pub fn apply_drivers(&self, num_workers: usize) -> Result<DriverReport> {
        let jacobian = self.tape.jacobian(&self.args)?;
        let par_jacobian = self.tape.par_jacobian(&self.args, num_workers)?;
        let mismatches = jacobian.mismatches(&par_jacobian, COMPARE_EPS)?;
        Ok(DriverReport {
            jacobian,
            par_jacobian,
            mismatches,
        })
    }
}
