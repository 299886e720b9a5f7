use log::trace;

use crate::error::Result;
use crate::float::Float;
use crate::matrix::Matrix;

impl<F: Float> super::Tape<F> {
    /// Full Jacobian `∂y/∂x` at `inputs`, shape `(num_dependents, num_independents)`.
    ///
    /// One forward replay, then one reverse sweep per dependent. Row `i`
    /// holds the partials of dependent `i`.
    ///
    /// # Errors
    ///
    /// [`TapeError::ShapeMismatch`](crate::TapeError::ShapeMismatch) if
    /// `inputs.len()` differs from [`num_independents`](Self::num_independents).
    pub fn jacobian(&self, inputs: &[F]) -> Result<Matrix<F>> {
        let mut values = Vec::new();
        self.forward_into(inputs, &mut values)?;

        let m = self.dependents.len();
        let n = self.independents.len();
        let mut jac = Matrix::zeros(m, n);
        let mut adjoint_buf = Vec::new();
        self.reverse_rows(&values, 0, jac.as_mut_slice(), &mut adjoint_buf);
        trace!("trace {}: sequential jacobian {}x{}", self.id, m, n);
        Ok(jac)
    }
}
