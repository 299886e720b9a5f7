use log::{debug, trace};
use rayon::prelude::*;

use crate::config::ParallelConfig;
use crate::error::{check_len, Result, TapeError};
use crate::float::Float;
use crate::matrix::Matrix;

impl<F: Float> super::Tape<F> {
    /// Parallel Jacobian on a dedicated pool of `num_workers` threads.
    ///
    /// The output rows are split into contiguous blocks, one per worker. Each
    /// worker replays the tape into its own scratch buffer and runs the
    /// reverse sweeps for its rows, writing only into its block. Rows are
    /// computed by the same code as [`jacobian`](Self::jacobian), so the two
    /// agree bit-for-bit.
    ///
    /// `num_workers == 0` is treated as 1. No more threads than rows are
    /// started, and a single block runs on the calling thread.
    ///
    /// # Errors
    ///
    /// [`TapeError::ShapeMismatch`] on a wrong input length,
    /// [`TapeError::WorkerPool`] if the pool cannot be built. An error in any
    /// worker aborts the whole evaluation.
    pub fn par_jacobian(&self, inputs: &[F], num_workers: usize) -> Result<Matrix<F>> {
        check_len("inputs", self.independents.len(), inputs.len())?;

        let m = self.dependents.len();
        let n = self.independents.len();
        let mut jac = Matrix::zeros(m, n);
        if m == 0 || n == 0 {
            return Ok(jac);
        }

        let (blocks, rows_per_block) = block_layout(m, num_workers);
        if blocks == 1 {
            debug!("trace {}: parallel jacobian {}x{} on the calling thread", self.id, m, n);
            let mut values = Vec::new();
            self.forward_into(inputs, &mut values)?;
            let mut adjoint_buf = Vec::new();
            self.reverse_rows(&values, 0, jac.as_mut_slice(), &mut adjoint_buf);
            return Ok(jac);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(blocks)
            .thread_name(|i| format!("adtape-jac-{}", i))
            .build()
            .map_err(|e| TapeError::WorkerPool(e.to_string()))?;
        debug!(
            "trace {}: parallel jacobian {}x{} on {} workers, {} rows per block",
            self.id, m, n, blocks, rows_per_block
        );

        pool.install(|| {
            jac.as_mut_slice()
                .par_chunks_mut(rows_per_block * n)
                .enumerate()
                .try_for_each(|(block, out)| -> Result<()> {
                    let first_row = block * rows_per_block;
                    trace!(
                        "trace {}: block {} rows {}..{}",
                        self.id,
                        block,
                        first_row,
                        first_row + out.len() / n
                    );
                    let mut values = Vec::new();
                    self.forward_into(inputs, &mut values)?;
                    let mut adjoint_buf = Vec::new();
                    self.reverse_rows(&values, first_row, out, &mut adjoint_buf);
                    Ok(())
                })
        })?;
        Ok(jac)
    }

    /// [`par_jacobian`](Self::par_jacobian) with the worker count taken from
    /// [`ParallelConfig::from_env`].
    pub fn par_jacobian_env(&self, inputs: &[F]) -> Result<Matrix<F>> {
        self.par_jacobian(inputs, ParallelConfig::from_env().num_workers)
    }
}

/// Number of row blocks and rows per block for `m` rows on `num_workers`.
///
/// Every block but the last holds `rows_per_block` rows, and no block is
/// empty, so the block count never exceeds `m`.
fn block_layout(m: usize, num_workers: usize) -> (usize, usize) {
    if m == 0 {
        return (0, 0);
    }
    let workers = num_workers.clamp(1, m);
    let rows_per_block = m.div_ceil(workers);
    (m.div_ceil(rows_per_block), rows_per_block)
}
