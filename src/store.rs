//! Registry of finalized tapes.
//!
//! A [`TapeStore`] maps [`TraceId`]s to shared, immutable tapes. Lookups take
//! a shared read lock only, so any number of evaluator threads can resolve
//! tapes at once; registration and reservation are exclusive.
//!
//! An identifier is *reserved* while a recording started through
//! [`TapeStore::begin`] is in progress. A second recording or a foreign
//! [`register`](TapeStore::register) under a reserved identifier fails with
//! [`TapeError::ConcurrentRecording`]. The same holds for an identifier that
//! some thread is recording with a bare
//! [`RecordingSession::begin`](crate::RecordingSession::begin).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, warn};

use crate::error::{Result, TapeError};
use crate::float::Float;
use crate::recorder::{RecordOptions, RecorderThreadLocal, RecordingSession};
use crate::tape::Tape;

/// Process-unique identifier of one trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(pub u64);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for TraceId {
    fn from(id: u64) -> Self {
        TraceId(id)
    }
}

enum Slot<F: Float> {
    Recording,
    Ready(Arc<Tape<F>>),
}

struct StoreInner<F: Float> {
    next_id: AtomicU64,
    tapes: RwLock<HashMap<TraceId, Slot<F>>>,
}

/// Shared registry of finalized tapes.
///
/// Cloning the store is cheap and yields a handle to the same registry.
pub struct TapeStore<F: Float> {
    inner: Arc<StoreInner<F>>,
}

impl<F: Float> Clone for TapeStore<F> {
    fn clone(&self) -> Self {
        TapeStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Float> Default for TapeStore<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> fmt::Debug for TapeStore<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapeStore")
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .field("len", &self.len())
            .finish()
    }
}

impl<F: Float> TapeStore<F> {
    /// Create an empty store minting identifiers from 0.
    pub fn new() -> Self {
        Self::with_first_id(0)
    }

    /// Create an empty store minting identifiers from `first`.
    pub fn with_first_id(first: u64) -> Self {
        TapeStore {
            inner: Arc::new(StoreInner {
                next_id: AtomicU64::new(first),
                tapes: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Mint a fresh identifier. Never returns the same value twice for one store.
    pub fn mint_id(&self) -> TraceId {
        TraceId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TraceId, Slot<F>>> {
        self.inner
            .tapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TraceId, Slot<F>>> {
        self.inner
            .tapes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `id` for a recording in progress.
    fn reserve(&self, id: TraceId) -> Result<Reservation<F>> {
        let mut tapes = self.write();
        match tapes.get(&id) {
            Some(Slot::Recording) => Err(TapeError::ConcurrentRecording(format!(
                "trace {} is already being recorded",
                id
            ))),
            Some(Slot::Ready(_)) => Err(TapeError::ConcurrentRecording(format!(
                "trace {} is already finalized; discard it before recording again",
                id
            ))),
            None => {
                tapes.insert(id, Slot::Recording);
                Ok(Reservation {
                    store: self.clone(),
                    id,
                    active: true,
                })
            }
        }
    }

    /// Start recording `id` on the current thread, reserving the identifier.
    ///
    /// # Errors
    ///
    /// [`TapeError::ConcurrentRecording`] if `id` is reserved or already
    /// finalized in this store, or the thread is already recording.
    pub fn begin(&self, id: TraceId) -> Result<RecordingSession<F>>
    where
        F: RecorderThreadLocal,
    {
        self.begin_with(id, RecordOptions::default())
    }

    /// Like [`begin`](Self::begin) with explicit recording options.
    pub fn begin_with(&self, id: TraceId, options: RecordOptions) -> Result<RecordingSession<F>>
    where
        F: RecorderThreadLocal,
    {
        let reservation = self.reserve(id)?;
        RecordingSession::install(id, options, Some(reservation))
    }

    /// Record `f` under `id` and register the result, all under one reservation.
    ///
    /// ```
    /// use adtape::TapeStore;
    ///
    /// let store = TapeStore::<f64>::new();
    /// let id = store.mint_id();
    /// let tape = store
    ///     .record(id, |rec| {
    ///         let x = rec.mark_independent(2.0);
    ///         rec.mark_dependent(x * x);
    ///     })
    ///     .unwrap();
    /// assert_eq!(tape.interpret(&[3.0]).unwrap(), vec![9.0]);
    /// assert!(store.lookup(id).is_ok());
    /// ```
    pub fn record(
        &self,
        id: TraceId,
        f: impl FnOnce(&mut RecordingSession<F>),
    ) -> Result<Arc<Tape<F>>>
    where
        F: RecorderThreadLocal,
    {
        let mut session = self.begin(id)?;
        f(&mut session);
        let (tape, reservation) = session.end_reserved();
        let tape = tape?;
        match reservation {
            Some(reservation) => Ok(reservation.complete(tape)),
            None => self.register(tape),
        }
    }

    /// Register a finalized tape and return the shared handle.
    ///
    /// Registering a tape with the same records as the one already stored
    /// under its identifier is a no-op returning the stored tape.
    ///
    /// # Errors
    ///
    /// [`TapeError::ConcurrentRecording`] if the identifier is reserved or
    /// being recorded on some thread. [`TapeError::DuplicateId`] if a tape
    /// with different records is stored under it.
    pub fn register(&self, tape: Tape<F>) -> Result<Arc<Tape<F>>> {
        let id = tape.id();
        if crate::recorder::is_recording(id) {
            return Err(TapeError::ConcurrentRecording(format!(
                "trace {} is still being recorded",
                id
            )));
        }
        let mut tapes = self.write();
        match tapes.entry(id) {
            Entry::Occupied(e) => match e.get() {
                Slot::Ready(existing) if existing.same_records(&tape) => {
                    debug!("trace {} already registered; keeping stored tape", id);
                    Ok(Arc::clone(existing))
                }
                Slot::Ready(_) => {
                    warn!("trace {} registered twice with different records", id);
                    Err(TapeError::DuplicateId(id))
                }
                Slot::Recording => Err(TapeError::ConcurrentRecording(format!(
                    "trace {} is reserved by a recording in progress",
                    id
                ))),
            },
            Entry::Vacant(e) => {
                let tape = Arc::new(tape);
                e.insert(Slot::Ready(Arc::clone(&tape)));
                debug!("registered trace {}", id);
                Ok(tape)
            }
        }
    }

    /// Look up a finalized tape.
    ///
    /// # Errors
    ///
    /// [`TapeError::NotFound`] if nothing is registered under `id` (a tape
    /// still being recorded is not visible).
    pub fn lookup(&self, id: TraceId) -> Result<Arc<Tape<F>>> {
        match self.read().get(&id) {
            Some(Slot::Ready(tape)) => Ok(Arc::clone(tape)),
            _ => Err(TapeError::NotFound(id)),
        }
    }

    /// Remove a finalized tape. Handles already given out stay valid.
    pub fn discard(&self, id: TraceId) -> Option<Arc<Tape<F>>> {
        let mut tapes = self.write();
        match tapes.get(&id) {
            Some(Slot::Ready(_)) => match tapes.remove(&id) {
                Some(Slot::Ready(tape)) => Some(tape),
                _ => None,
            },
            _ => None,
        }
    }

    /// Number of finalized tapes.
    pub fn len(&self) -> usize {
        self.read()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    /// True if no finalized tape is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers of all finalized tapes, ascending.
    pub fn ids(&self) -> Vec<TraceId> {
        let mut ids: Vec<TraceId> = self
            .read()
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Ready(_)))
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Holds an identifier reserved in a [`TapeStore`] while it is recorded.
///
/// Dropping the reservation without completing it releases the identifier.
pub(crate) struct Reservation<F: Float> {
    store: TapeStore<F>,
    id: TraceId,
    active: bool,
}

impl<F: Float> Reservation<F> {
    /// Replace the reservation with the finalized tape.
    pub(crate) fn complete(mut self, tape: Tape<F>) -> Arc<Tape<F>> {
        if tape.id() != self.id {
            warn!(
                "tape for trace {} completed reservation of trace {}",
                tape.id(),
                self.id
            );
        }
        let tape = Arc::new(tape);
        self.store
            .write()
            .insert(self.id, Slot::Ready(Arc::clone(&tape)));
        self.active = false;
        debug!("registered trace {}", self.id);
        tape
    }
}

impl<F: Float> Drop for Reservation<F> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let mut tapes = self.store.write();
        if let Some(Slot::Recording) = tapes.get(&self.id) {
            tapes.remove(&self.id);
            debug!("released reservation of trace {}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_unique_and_injectable() {
        let store = TapeStore::<f64>::with_first_id(100);
        assert_eq!(store.mint_id(), TraceId(100));
        assert_eq!(store.mint_id(), TraceId(101));
        let other = store.clone();
        assert_eq!(other.mint_id(), TraceId(102));
    }

    #[test]
    fn dropped_session_releases_reservation() {
        let store = TapeStore::<f64>::new();
        let id = TraceId(80);
        {
            let _rec = store.begin(id).unwrap();
            assert!(matches!(
                store.begin(id),
                Err(TapeError::ConcurrentRecording(_))
            ));
        }
        assert!(store.begin(id).is_ok());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = TapeStore::<f64>::new();
        assert_eq!(store.lookup(TraceId(9)).err(), Some(TapeError::NotFound(TraceId(9))));
        assert!(store.is_empty());
    }
}
