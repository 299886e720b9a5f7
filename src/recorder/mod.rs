//! Trace recording.
//!
//! A [`RecordingSession`] owns the in-progress tape for one trace identifier
//! and installs it as the current thread's recorder. Arithmetic on
//! [`Active`] values appends records to it; [`RecordingSession::end`]
//! validates the records, fuses multiply-accumulate pairs, and freezes the
//! result into an immutable [`Tape`].
//!
//! Slots are single-assignment: every value-producing record writes a fresh
//! slot, allocated monotonically from 0.

use std::collections::BTreeSet;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use crate::active::{Active, CONSTANT};
use crate::error::{Result, TapeError};
use crate::float::Float;
use crate::opcode::{OpCode, UNUSED};
use crate::store::{Reservation, TraceId};
use crate::tape::Tape;

mod fuse;
mod thread_local;

pub use self::thread_local::{with_active_recorder, RecorderThreadLocal};
use self::thread_local::{current_trace, replace_recorder};

/// Trace identifiers with a recording in progress anywhere in the process.
static RECORDING: Mutex<BTreeSet<TraceId>> = Mutex::new(BTreeSet::new());

fn recording_ids() -> MutexGuard<'static, BTreeSet<TraceId>> {
    RECORDING.lock().unwrap_or_else(PoisonError::into_inner)
}

/// True while some thread is recording `id`.
pub(crate) fn is_recording(id: TraceId) -> bool {
    recording_ids().contains(&id)
}

/// Options controlling how a trace is recorded and finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordOptions {
    /// Rewrite `y + a*b` / `y - a*b` pairs into single fused records at
    /// finalization.
    pub fuse_accumulations: bool,
    /// Initial capacity of the record buffers.
    pub capacity: usize,
}

impl Default for RecordOptions {
    fn default() -> Self {
        RecordOptions {
            fuse_accumulations: true,
            capacity: 256,
        }
    }
}

impl RecordOptions {
    /// Default options with fusion turned off.
    pub fn unfused() -> Self {
        RecordOptions {
            fuse_accumulations: false,
            ..Self::default()
        }
    }
}

/// The in-progress tape of one recording.
///
/// Only reachable through a [`RecordingSession`] or, from operator
/// implementations, through [`with_active_recorder`].
pub struct Recorder<F: Float> {
    pub(crate) id: TraceId,
    pub(crate) opcodes: Vec<OpCode>,
    pub(crate) arg_indices: Vec<[u32; 3]>,
    pub(crate) result_indices: Vec<u32>,
    pub(crate) constants: Vec<F>,
    pub(crate) independents: Vec<u32>,
    pub(crate) dependents: Vec<u32>,
    pub(crate) recorded_outputs: Vec<F>,
    pub(crate) next_slot: u32,
    /// First invariant violation seen while recording; reported by `end()`.
    fault: Option<String>,
}

impl<F: Float> Recorder<F> {
    fn new(id: TraceId, capacity: usize) -> Self {
        Recorder {
            id,
            opcodes: Vec::with_capacity(capacity),
            arg_indices: Vec::with_capacity(capacity),
            result_indices: Vec::with_capacity(capacity),
            constants: Vec::new(),
            independents: Vec::new(),
            dependents: Vec::new(),
            recorded_outputs: Vec::new(),
            next_slot: 0,
            fault: None,
        }
    }

    /// Trace identifier this recorder writes.
    #[inline]
    pub fn id(&self) -> TraceId {
        self.id
    }

    /// Number of records appended so far.
    #[inline]
    pub fn num_records(&self) -> usize {
        self.opcodes.len()
    }

    #[inline]
    fn alloc_slot(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    #[inline]
    fn push(&mut self, op: OpCode, args: [u32; 3], result: u32) {
        self.opcodes.push(op);
        self.arg_indices.push(args);
        self.result_indices.push(result);
    }

    /// Remember the first operand that does not name a produced slot.
    fn check_operand(&mut self, slot: u32) {
        if slot >= self.next_slot && self.fault.is_none() {
            self.fault = Some(format!(
                "record {} reads slot {} which was never produced on trace {}",
                self.opcodes.len(),
                slot,
                self.id
            ));
        }
    }

    /// Record a constant. Returns its slot.
    #[inline]
    pub fn push_const(&mut self, value: F) -> u32 {
        let k = self.constants.len() as u32;
        self.constants.push(value);
        let slot = self.alloc_slot();
        self.push(OpCode::Const, [k, UNUSED, UNUSED], slot);
        slot
    }

    /// Record the next independent. Returns its slot.
    #[inline]
    pub fn push_independent(&mut self) -> u32 {
        let index = self.independents.len() as u32;
        let slot = self.alloc_slot();
        self.independents.push(slot);
        self.push(OpCode::MarkIndependent, [index, UNUSED, UNUSED], slot);
        slot
    }

    /// Record an arithmetic operation over slot operands. Returns the result slot.
    ///
    /// Operand positions past the opcode's arity must be [`UNUSED`].
    #[inline]
    pub fn push_op(&mut self, op: OpCode, args: [u32; 3]) -> u32 {
        debug_assert!(op.is_arithmetic(), "push_op called with {:?}", op);
        for &a in &args[..op.slot_operands()] {
            self.check_operand(a);
        }
        let slot = self.alloc_slot();
        self.push(op, args, slot);
        slot
    }

    /// Record `slot` as the next dependent.
    #[inline]
    pub fn push_dependent(&mut self, slot: u32, value: F) {
        self.check_operand(slot);
        let index = self.dependents.len() as u32;
        self.dependents.push(slot);
        self.recorded_outputs.push(value);
        self.push(OpCode::MarkDependent, [slot, index, UNUSED], UNUSED);
    }

    /// Ensure an active value has a slot, promoting passive constants.
    #[inline]
    pub(crate) fn slot_of(&mut self, x: &Active<F>) -> u32 {
        if x.slot == CONSTANT {
            self.push_const(x.value)
        } else {
            x.slot
        }
    }

    /// Validate, fuse, compact, and freeze the records into a tape.
    fn finish(mut self, options: RecordOptions) -> Result<Tape<F>> {
        if let Some(msg) = self.fault.take() {
            return Err(TapeError::MalformedTrace(msg));
        }
        if self.dependents.is_empty() {
            return Err(TapeError::MalformedTrace(format!(
                "trace {} has no dependents",
                self.id
            )));
        }
        let marked_indep = self
            .opcodes
            .iter()
            .filter(|&&op| op == OpCode::MarkIndependent)
            .count();
        let marked_dep = self
            .opcodes
            .iter()
            .filter(|&&op| op == OpCode::MarkDependent)
            .count();
        if marked_indep != self.independents.len() || marked_dep != self.dependents.len() {
            return Err(TapeError::MalformedTrace(format!(
                "trace {}: {} independent / {} dependent markers for {} / {} registered",
                self.id,
                marked_indep,
                marked_dep,
                self.independents.len(),
                self.dependents.len()
            )));
        }

        if options.fuse_accumulations {
            let fused = self.fuse_accumulations();
            trace!("trace {}: fused {} multiply-accumulate pairs", self.id, fused);
        }
        self.compact_slots();

        let tape = Tape::from_records(
            self.id,
            self.opcodes,
            self.arg_indices,
            self.result_indices,
            self.constants,
            self.independents,
            self.dependents,
            self.recorded_outputs,
            self.next_slot,
        );
        debug!("finalized trace {}: {:?}", tape.id(), tape.stats());
        Ok(tape)
    }
}

/// A recording in progress on the current thread.
///
/// Created by [`RecordingSession::begin`] (or [`TapeStore::begin`](crate::TapeStore::begin),
/// which also reserves the identifier). While the session is alive, arithmetic
/// on [`Active<F>`] values on this thread appends to it. The session is
/// neither `Send` nor `Sync`: no other thread can append to the tape.
///
/// ```
/// use adtape::RecordingSession;
///
/// let mut rec = RecordingSession::<f64>::begin(7.into()).unwrap();
/// let x = rec.mark_independent(3.0);
/// let y = rec.mark_independent(4.0);
/// let z = x * x + y;
/// assert_eq!(rec.mark_dependent(z), 13.0);
/// let tape = rec.end().unwrap();
///
/// let jac = tape.jacobian(&[3.0, 4.0]).unwrap();
/// assert_eq!(jac.row(0), &[6.0, 1.0]);
/// ```
pub struct RecordingSession<F: RecorderThreadLocal> {
    recorder: *mut Recorder<F>,
    options: RecordOptions,
    reservation: Option<Reservation<F>>,
}

impl<F: RecorderThreadLocal> RecordingSession<F> {
    /// Start recording trace `id` on the current thread with default options.
    ///
    /// # Errors
    ///
    /// [`TapeError::ConcurrentRecording`] if this thread is already recording,
    /// or another thread is recording `id`.
    pub fn begin(id: TraceId) -> Result<Self> {
        Self::begin_with(id, RecordOptions::default())
    }

    /// Start recording trace `id` with explicit options.
    pub fn begin_with(id: TraceId, options: RecordOptions) -> Result<Self> {
        Self::install(id, options, None)
    }

    pub(crate) fn install(
        id: TraceId,
        options: RecordOptions,
        reservation: Option<Reservation<F>>,
    ) -> Result<Self> {
        if let Some(busy) = current_trace::<F>() {
            return Err(TapeError::ConcurrentRecording(format!(
                "cannot begin trace {}: this thread is still recording trace {}",
                id, busy
            )));
        }
        if !recording_ids().insert(id) {
            return Err(TapeError::ConcurrentRecording(format!(
                "trace {} is already being recorded",
                id
            )));
        }
        let recorder = Box::into_raw(Box::new(Recorder::new(id, options.capacity)));
        replace_recorder(recorder);
        debug!("begin recording trace {}", id);
        Ok(RecordingSession {
            recorder,
            options,
            reservation,
        })
    }

    #[inline]
    fn recorder(&mut self) -> &mut Recorder<F> {
        // SAFETY: `recorder` is non-null and owned by `self` until `end`.
        unsafe { &mut *self.recorder }
    }

    /// Trace identifier being recorded.
    pub fn id(&self) -> TraceId {
        // SAFETY: as in `recorder`.
        unsafe { (*self.recorder).id }
    }

    /// Number of records appended so far.
    pub fn num_records(&self) -> usize {
        // SAFETY: as in `recorder`.
        unsafe { (*self.recorder).num_records() }
    }

    /// Bind `value` to a fresh slot as the next independent.
    pub fn mark_independent(&mut self, value: F) -> Active<F> {
        let slot = self.recorder().push_independent();
        Active::from_slot(value, slot)
    }

    /// Record `y` as the next dependent and return its recorded value.
    pub fn mark_dependent(&mut self, y: Active<F>) -> F {
        let rec = self.recorder();
        let slot = rec.slot_of(&y);
        rec.push_dependent(slot, y.value);
        y.value
    }

    /// Finalize the recording.
    ///
    /// # Errors
    ///
    /// [`TapeError::MalformedTrace`] if a record or dependent reads a slot that
    /// was never produced, or no dependent was marked.
    pub fn end(mut self) -> Result<Tape<F>> {
        let recorder = *self.detach();
        recorder.finish(self.options)
    }

    /// Finalize while keeping the store reservation alive for the caller.
    pub(crate) fn end_reserved(mut self) -> (Result<Tape<F>>, Option<Reservation<F>>) {
        let reservation = self.reservation.take();
        let recorder = *self.detach();
        (recorder.finish(self.options), reservation)
    }

    /// Uninstall the recorder from the thread and take ownership of it.
    fn detach(&mut self) -> Box<Recorder<F>> {
        let raw = std::mem::replace(&mut self.recorder, ptr::null_mut());
        let installed = replace_recorder::<F>(ptr::null_mut());
        debug_assert_eq!(installed, raw, "recorder slot changed under a live session");
        // SAFETY: `raw` came from `Box::into_raw` in `install` and is taken once.
        let recorder = unsafe { Box::from_raw(raw) };
        recording_ids().remove(&recorder.id);
        recorder
    }
}

impl<F: RecorderThreadLocal> Drop for RecordingSession<F> {
    fn drop(&mut self) {
        if !self.recorder.is_null() {
            let recorder = self.detach();
            debug!("discarding unfinished recording of trace {}", recorder.id);
        }
    }
}
