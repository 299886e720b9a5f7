use crate::error::{check_len, Result};
use crate::float::Float;
use crate::opcode::{self, OpCode};

impl<F: Float> super::Tape<F> {
    /// Replay the tape at `inputs` and return the dependents in dependent order.
    ///
    /// Each call owns its scratch buffer; concurrent calls on one tape do not
    /// interact.
    ///
    /// # Errors
    ///
    /// [`TapeError::ShapeMismatch`](crate::TapeError::ShapeMismatch) if
    /// `inputs.len()` differs from [`num_independents`](Self::num_independents).
    pub fn interpret(&self, inputs: &[F]) -> Result<Vec<F>> {
        let mut values_buf = Vec::new();
        self.forward_into(inputs, &mut values_buf)?;
        Ok(self
            .dependents
            .iter()
            .map(|&d| values_buf[d as usize])
            .collect())
    }

    /// Forward replay into a caller-provided buffer.
    ///
    /// On return `values_buf` holds the value of every slot
    /// (length [`num_locations`](Self::num_locations)). Reusing the buffer
    /// across calls avoids reallocation.
    pub fn forward_into(&self, inputs: &[F], values_buf: &mut Vec<F>) -> Result<()> {
        check_len("inputs", self.independents.len(), inputs.len())?;

        values_buf.clear();
        values_buf.resize(self.num_locations as usize, F::zero());

        for i in 0..self.opcodes.len() {
            let [a, b, c] = self.arg_indices[i];
            let r = self.result_indices[i] as usize;
            match self.opcodes[i] {
                OpCode::MarkDependent => continue,
                OpCode::Const => values_buf[r] = self.constants[a as usize],
                OpCode::MarkIndependent => values_buf[r] = inputs[a as usize],
                op => {
                    let (va, vb, vc) = operand_values(op, values_buf, a, b, c);
                    values_buf[r] = opcode::eval_forward(op, va, vb, vc);
                }
            }
        }
        Ok(())
    }
}

/// Values of a record's slot operands; positions past its arity read as zero.
#[inline]
pub(super) fn operand_values<F: Float>(
    op: OpCode,
    values: &[F],
    a: u32,
    b: u32,
    c: u32,
) -> (F, F, F) {
    let k = op.slot_operands();
    let va = values[a as usize];
    let vb = if k > 1 { values[b as usize] } else { F::zero() };
    let vc = if k > 2 { values[c as usize] } else { F::zero() };
    (va, vb, vc)
}
