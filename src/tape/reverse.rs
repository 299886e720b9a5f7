use crate::error::{check_len, Result};
use crate::float::Float;
use crate::opcode;

use super::forward::operand_values;

impl<F: Float> super::Tape<F> {
    /// Core reverse sweep shared by all reverse-mode drivers.
    ///
    /// Expects `adjoints` to be pre-seeded by the caller (length =
    /// `num_locations`) and `values` to hold a forward replay. Visits records
    /// last to first and accumulates into every slot operand, the accumulator
    /// and both factors of fused records included. The order of accumulation
    /// depends only on the tape, so a given seed always yields bit-identical
    /// adjoints.
    pub(super) fn reverse_sweep_core(&self, adjoints: &mut [F], values: &[F]) {
        let zero = F::zero();
        for i in (0..self.opcodes.len()).rev() {
            let op = self.opcodes[i];
            if !op.is_arithmetic() {
                continue;
            }
            let r = self.result_indices[i] as usize;
            let w = adjoints[r];
            if w == zero {
                continue;
            }
            adjoints[r] = zero;

            let args = self.arg_indices[i];
            let (va, vb, vc) = operand_values(op, values, args[0], args[1], args[2]);
            let partials = opcode::reverse_partials(op, va, vb, vc, values[r]);
            for (&slot, &p) in args.iter().zip(partials.iter()).take(op.slot_operands()) {
                let s = slot as usize;
                adjoints[s] = adjoints[s] + p * w;
            }
        }
    }

    /// Reverse sweeps for dependents `first_row..first_row + rows`, writing
    /// one Jacobian row per dependent into `out` (row-major, `rows * n`).
    ///
    /// `values` must hold a forward replay; `adjoint_buf` is scratch.
    pub(super) fn reverse_rows(
        &self,
        values: &[F],
        first_row: usize,
        out: &mut [F],
        adjoint_buf: &mut Vec<F>,
    ) {
        let n = self.independents.len();
        if n == 0 {
            return;
        }
        adjoint_buf.resize(self.num_locations as usize, F::zero());
        for (k, row) in out.chunks_mut(n).enumerate() {
            adjoint_buf.fill(F::zero());
            let seed = self.dependents[first_row + k] as usize;
            adjoint_buf[seed] = F::one();
            self.reverse_sweep_core(adjoint_buf, values);
            for (dst, &slot) in row.iter_mut().zip(&self.independents) {
                *dst = adjoint_buf[slot as usize];
            }
        }
    }

    /// Vector-Jacobian product `wᵀ·J` from a single weighted reverse sweep.
    ///
    /// # Errors
    ///
    /// [`TapeError::ShapeMismatch`](crate::TapeError::ShapeMismatch) if
    /// `inputs` or `weights` have the wrong length.
    pub fn vjp(&self, inputs: &[F], weights: &[F]) -> Result<Vec<F>> {
        check_len("weights", self.dependents.len(), weights.len())?;
        let mut values = Vec::new();
        self.forward_into(inputs, &mut values)?;

        let mut adjoints = vec![F::zero(); self.num_locations as usize];
        for (&slot, &w) in self.dependents.iter().zip(weights) {
            adjoints[slot as usize] = adjoints[slot as usize] + w;
        }
        self.reverse_sweep_core(&mut adjoints, &values);
        Ok(self
            .independents
            .iter()
            .map(|&slot| adjoints[slot as usize])
            .collect())
    }
}
