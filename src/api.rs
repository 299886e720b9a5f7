//! Free-function entry points for tapes held in a [`TapeStore`].
//!
//! Each function resolves the trace by identifier and delegates to the
//! matching [`Tape`](crate::Tape) method. The store lookup takes only a shared
//! read lock, so these can be called from many threads at once.

use crate::error::Result;
use crate::float::Float;
use crate::matrix::Matrix;
use crate::store::{TapeStore, TraceId};

/// Replay trace `id` at `inputs` and return its dependents.
///
/// ```
/// use adtape::{interpret, TapeStore, TraceId};
///
/// let store = TapeStore::<f64>::new();
/// store
///     .record(TraceId(1), |rec| {
///         let x = rec.mark_independent(1.0);
///         let y = rec.mark_independent(2.0);
///         rec.mark_dependent(x * y - x);
///     })
///     .unwrap();
/// assert_eq!(interpret(&store, TraceId(1), &[3.0, 5.0]).unwrap(), vec![12.0]);
/// ```
pub fn interpret<F: Float>(store: &TapeStore<F>, id: TraceId, inputs: &[F]) -> Result<Vec<F>> {
    store.lookup(id)?.interpret(inputs)
}

/// Sequential Jacobian of trace `id` at `inputs`.
pub fn jacobian<F: Float>(store: &TapeStore<F>, id: TraceId, inputs: &[F]) -> Result<Matrix<F>> {
    store.lookup(id)?.jacobian(inputs)
}

/// Parallel Jacobian of trace `id` at `inputs` on `num_workers` threads.
pub fn par_jacobian<F: Float>(
    store: &TapeStore<F>,
    id: TraceId,
    inputs: &[F],
    num_workers: usize,
) -> Result<Matrix<F>> {
    store.lookup(id)?.par_jacobian(inputs, num_workers)
}

/// Vector-Jacobian product `wᵀ·J` of trace `id` at `inputs`.
pub fn vjp<F: Float>(
    store: &TapeStore<F>,
    id: TraceId,
    inputs: &[F],
    weights: &[F],
) -> Result<Vec<F>> {
    store.lookup(id)?.vjp(inputs, weights)
}
