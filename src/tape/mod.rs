//! Finalized, immutable tapes.
//!
//! A [`Tape`] is produced by [`RecordingSession::end`](crate::RecordingSession::end)
//! and never changes afterwards. All evaluators take `&self` and allocate
//! their own scratch buffers, so one tape can be replayed from any number of
//! threads at once.
//!
//! # Limitations
//!
//! The tape records one execution path. If the recorded computation branches
//! on values, replaying at inputs that take a different branch produces
//! incorrect results.

use std::fmt;
use std::mem;

use crate::error::Result;
use crate::float::Float;
use crate::opcode::{OpCode, UNUSED};
use crate::store::TraceId;

// Submodules add impl blocks to Tape<F>
mod forward;
mod jacobian;
mod parallel;
mod reverse;

/// Size and shape statistics of a tape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TapeStats {
    /// Number of independents (inputs).
    pub independent_count: usize,
    /// Number of dependents (outputs).
    pub dependent_count: usize,
    /// Number of records, marker records included.
    pub op_count: usize,
    /// Number of slots in the scratch buffer.
    pub location_count: usize,
    /// Number of slot references (results written plus operands read).
    pub location_ref_count: usize,
    /// Number of entries in the constant pool.
    pub constant_count: usize,
    /// Peak number of slots holding a value that is still needed.
    pub max_live_locations: usize,
    /// Bytes held by the record arrays (opcodes, operands, results).
    pub op_buffer_bytes: usize,
    /// Bytes of the scratch buffer one replay allocates.
    pub value_stack_bytes: usize,
}

/// A finalized tape.
pub struct Tape<F: Float> {
    pub(crate) id: TraceId,
    pub(crate) opcodes: Vec<OpCode>,
    pub(crate) arg_indices: Vec<[u32; 3]>,
    pub(crate) result_indices: Vec<u32>,
    pub(crate) constants: Vec<F>,
    /// Slot of each independent, in independent order.
    pub(crate) independents: Vec<u32>,
    /// Slot of each dependent, in dependent order.
    pub(crate) dependents: Vec<u32>,
    /// Dependent values seen during recording.
    pub(crate) recorded_outputs: Vec<F>,
    pub(crate) num_locations: u32,
    pub(crate) stats: TapeStats,
}

impl<F: Float> Tape<F> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_records(
        id: TraceId,
        opcodes: Vec<OpCode>,
        arg_indices: Vec<[u32; 3]>,
        result_indices: Vec<u32>,
        constants: Vec<F>,
        independents: Vec<u32>,
        dependents: Vec<u32>,
        recorded_outputs: Vec<F>,
        num_locations: u32,
    ) -> Self {
        let mut tape = Tape {
            id,
            opcodes,
            arg_indices,
            result_indices,
            constants,
            independents,
            dependents,
            recorded_outputs,
            num_locations,
            stats: TapeStats::default(),
        };
        tape.stats = tape.compute_stats();
        tape
    }

    fn compute_stats(&self) -> TapeStats {
        let n = self.opcodes.len();
        let n_slots = self.num_locations as usize;

        // last_use[slot] = last record reading it; dependents stay live to the end.
        let mut last_use: Vec<usize> = vec![0; n_slots];
        let mut location_refs = 0;
        for i in 0..n {
            let op = self.opcodes[i];
            for &a in &self.arg_indices[i][..op.slot_operands()] {
                last_use[a as usize] = i;
                location_refs += 1;
            }
            let r = self.result_indices[i];
            if r != UNUSED {
                last_use[r as usize] = last_use[r as usize].max(i);
                location_refs += 1;
            }
        }
        for &d in &self.dependents {
            last_use[d as usize] = n;
        }

        // dying[i] = slots whose last reader is record i.
        let mut dying = vec![0usize; n + 1];
        for &l in &last_use {
            dying[l] += 1;
        }

        let mut live = 0usize;
        let mut peak = 0usize;
        for i in 0..n {
            if self.result_indices[i] != UNUSED {
                live += 1;
            }
            peak = peak.max(live);
            live -= dying[i];
        }

        TapeStats {
            independent_count: self.independents.len(),
            dependent_count: self.dependents.len(),
            op_count: n,
            location_count: n_slots,
            location_ref_count: location_refs,
            constant_count: self.constants.len(),
            max_live_locations: peak,
            op_buffer_bytes: n
                * (mem::size_of::<OpCode>() + mem::size_of::<[u32; 3]>() + mem::size_of::<u32>()),
            value_stack_bytes: n_slots * mem::size_of::<F>(),
        }
    }

    /// True if `other` holds the same records, constants, and markers.
    ///
    /// Constants compare by value, with NaN equal to NaN.
    pub(crate) fn same_records(&self, other: &Self) -> bool {
        self.opcodes == other.opcodes
            && self.arg_indices == other.arg_indices
            && self.result_indices == other.result_indices
            && self.independents == other.independents
            && self.dependents == other.dependents
            && self.num_locations == other.num_locations
            && self.constants.len() == other.constants.len()
            && self
                .constants
                .iter()
                .zip(&other.constants)
                .all(|(&a, &b)| a == b || (a.is_nan() && b.is_nan()))
    }

    /// Trace identifier of this tape.
    #[inline]
    pub fn id(&self) -> TraceId {
        self.id
    }

    /// Tape statistics.
    #[inline]
    pub fn stats(&self) -> &TapeStats {
        &self.stats
    }

    /// Number of independents.
    #[inline]
    pub fn num_independents(&self) -> usize {
        self.independents.len()
    }

    /// Number of dependents.
    #[inline]
    pub fn num_dependents(&self) -> usize {
        self.dependents.len()
    }

    /// Number of slots a replay needs.
    #[inline]
    pub fn num_locations(&self) -> usize {
        self.num_locations as usize
    }

    /// Number of records.
    #[inline]
    pub fn num_ops(&self) -> usize {
        self.opcodes.len()
    }

    /// Dependent values computed while recording.
    #[inline]
    pub fn recorded_outputs(&self) -> &[F] {
        &self.recorded_outputs
    }

    /// Slice view of all opcodes, in replay order.
    #[inline]
    pub fn opcodes(&self) -> &[OpCode] {
        &self.opcodes
    }

    /// Slice view of the operand arrays, parallel to [`opcodes`](Self::opcodes).
    #[inline]
    pub fn arg_indices(&self) -> &[[u32; 3]] {
        &self.arg_indices
    }

    /// Result slot of each record ([`UNUSED`] for dependent markers).
    #[inline]
    pub fn result_indices(&self) -> &[u32] {
        &self.result_indices
    }

    /// Constant pool.
    #[inline]
    pub fn constants(&self) -> &[F] {
        &self.constants
    }

    /// Slot of each independent.
    #[inline]
    pub fn independent_slots(&self) -> &[u32] {
        &self.independents
    }

    /// Slot of each dependent.
    #[inline]
    pub fn dependent_slots(&self) -> &[u32] {
        &self.dependents
    }

    /// Replay at `inputs` and pair the listing with the value of every slot.
    ///
    /// ```
    /// use adtape::RecordingSession;
    ///
    /// let mut rec = RecordingSession::<f64>::begin(3.into()).unwrap();
    /// let x = rec.mark_independent(2.0);
    /// rec.mark_dependent(x * x);
    /// let tape = rec.end().unwrap();
    ///
    /// let listing = tape.listing_at(&[5.0]).unwrap().to_string();
    /// assert!(listing.contains("mul    @0 @0 => @1 = 2.5e1"));
    /// ```
    ///
    /// # Errors
    ///
    /// [`TapeError::ShapeMismatch`](crate::TapeError::ShapeMismatch) if
    /// `inputs.len()` differs from [`num_independents`](Self::num_independents).
    pub fn listing_at(&self, inputs: &[F]) -> Result<Listing<'_, F>> {
        let mut values = Vec::new();
        self.forward_into(inputs, &mut values)?;
        Ok(Listing { tape: self, values })
    }

    fn write_listing(&self, f: &mut fmt::Formatter<'_>, values: Option<&[F]>) -> fmt::Result {
        writeln!(
            f,
            "tape {}: {} independents, {} dependents, {} records, {} locations",
            self.id,
            self.num_independents(),
            self.num_dependents(),
            self.num_ops(),
            self.num_locations
        )?;
        for (i, (&op, args)) in self.opcodes.iter().zip(&self.arg_indices).enumerate() {
            write!(f, "{:>6}  {:<6}", i, op)?;
            match op {
                OpCode::Const => write!(f, " {:e}", self.constants[args[0] as usize])?,
                OpCode::MarkIndependent => write!(f, " x[{}]", args[0])?,
                OpCode::MarkDependent => write!(f, " @{} -> y[{}]", args[0], args[1])?,
                _ => {
                    for &a in &args[..op.slot_operands()] {
                        write!(f, " @{}", a)?;
                    }
                }
            }
            let r = self.result_indices[i];
            if r != UNUSED {
                write!(f, " => @{}", r)?;
            }
            if let Some(values) = values {
                let shown = if r != UNUSED { r } else { args[0] };
                write!(f, " = {:e}", values[shown as usize])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Tape listing: a header line, then one line per record.
impl<F: Float> fmt::Display for Tape<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_listing(f, None)
    }
}

/// Tape listing annotated with slot values from one replay.
///
/// Built by [`Tape::listing_at`]. Each record that writes a slot ends in
/// `= value`; dependent markers show the value they export.
pub struct Listing<'a, F: Float> {
    tape: &'a Tape<F>,
    values: Vec<F>,
}

impl<F: Float> Listing<'_, F> {
    /// Value of every slot after the replay.
    pub fn values(&self) -> &[F] {
        &self.values
    }
}

impl<F: Float> fmt::Display for Listing<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.tape.write_listing(f, Some(&self.values))
    }
}

impl<F: Float> fmt::Debug for Tape<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tape")
            .field("id", &self.id)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
