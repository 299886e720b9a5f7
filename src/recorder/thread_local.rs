//! Per-thread slot holding the recorder of the session in progress.
//!
//! Each float type has its own slot, so an `f32` and an `f64` recording can be
//! open on one thread at the same time. The slot is written only by
//! [`RecordingSession`](super::RecordingSession) through [`replace_recorder`].

use std::cell::Cell;
use std::ptr::{self, NonNull};

use crate::float::Float;
use crate::store::TraceId;

use super::Recorder;

/// Float types that can be recorded: each owns a thread-local recorder slot.
pub trait RecorderThreadLocal: Float {
    /// Run `f` on the current thread's recorder slot for `Self`.
    fn with_slot<R>(f: impl FnOnce(&Cell<*mut Recorder<Self>>) -> R) -> R;
}

macro_rules! recorder_slot {
    ($($f:ty => $slot:ident),* $(,)?) => {
        $(
            thread_local! {
                static $slot: Cell<*mut Recorder<$f>> = const { Cell::new(ptr::null_mut()) };
            }

            impl RecorderThreadLocal for $f {
                #[inline]
                fn with_slot<R>(f: impl FnOnce(&Cell<*mut Recorder<Self>>) -> R) -> R {
                    $slot.with(f)
                }
            }
        )*
    };
}

recorder_slot!(f32 => ACTIVE_F32, f64 => ACTIVE_F64);

/// Store `recorder` in this thread's slot and return the previous occupant.
#[inline]
pub(crate) fn replace_recorder<F: RecorderThreadLocal>(recorder: *mut Recorder<F>) -> *mut Recorder<F> {
    F::with_slot(|slot| slot.replace(recorder))
}

/// Trace being recorded on this thread for `F`, if any.
pub(crate) fn current_trace<F: RecorderThreadLocal>() -> Option<TraceId> {
    // SAFETY: a non-null slot points at a recorder owned by a live session
    // on this thread.
    NonNull::new(F::with_slot(Cell::get)).map(|rec| unsafe { rec.as_ref().id })
}

/// Run `f` on the recorder of this thread's session.
///
/// # Panics
///
/// If no recording for `F` is in progress on this thread.
#[inline]
pub fn with_active_recorder<F: RecorderThreadLocal, R>(f: impl FnOnce(&mut Recorder<F>) -> R) -> R {
    match NonNull::new(F::with_slot(Cell::get)) {
        // SAFETY: the session keeps the recorder alive while it sits in the
        // slot, and sessions are !Send, so no other thread holds it.
        Some(mut rec) => f(unsafe { rec.as_mut() }),
        None => panic!(
            "Active<{}> arithmetic needs a RecordingSession open on this thread",
            std::any::type_name::<F>()
        ),
    }
}
