//! Tape store: identifiers, reservation, registration, concurrent lookup.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use adtape::{RecordingSession, TapeError, TapeStore, TraceId};

fn square_tape(id: TraceId) -> adtape::Tape<f64> {
    let mut rec = RecordingSession::<f64>::begin(id).unwrap();
    let x = rec.mark_independent(2.0);
    rec.mark_dependent(x * x);
    rec.end().unwrap()
}

#[test]
fn minted_ids_are_unique_across_threads() {
    let store = TapeStore::<f64>::new();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || (0..250).map(|_| store.mint_id()).collect::<Vec<_>>())
        })
        .collect();
    let mut ids: Vec<TraceId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 1000);
}

#[test]
fn begin_on_reserved_id_fails() {
    let store = TapeStore::<f64>::new();
    let id = TraceId(1);
    let rec = store.begin(id).unwrap();
    let other = store.clone();
    // From another thread, so the failure comes from the reservation.
    let err = thread::spawn(move || other.begin(id).err())
        .join()
        .unwrap();
    assert!(matches!(err, Some(TapeError::ConcurrentRecording(_))));
    drop(rec);
}

#[test]
fn register_under_reserved_id_fails() {
    let store = TapeStore::<f64>::new();
    let id = TraceId(2);
    let elsewhere = square_tape(id);
    let mut rec = store.begin(id).unwrap();
    assert!(matches!(
        store.register(elsewhere),
        Err(TapeError::ConcurrentRecording(_))
    ));
    let x = rec.mark_independent(1.0);
    rec.mark_dependent(x);
    drop(rec.end().unwrap());
}

#[test]
fn reregistration_returns_stored_tape() {
    let store = TapeStore::<f64>::new();
    let id = TraceId(3);
    let first = store.register(square_tape(id)).unwrap();
    let second = store.register(square_tape(id)).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.len(), 1);
}

#[test]
fn begin_on_finalized_id_fails_until_discarded() {
    let store = TapeStore::<f64>::new();
    let id = TraceId(4);
    store
        .record(id, |rec| {
            let x = rec.mark_independent(1.0);
            rec.mark_dependent(-x);
        })
        .unwrap();
    assert!(matches!(
        store.begin(id),
        Err(TapeError::ConcurrentRecording(_))
    ));
    let old = store.discard(id).unwrap();
    assert!(store.lookup(id).is_err());
    // Handles given out before the discard stay usable.
    assert_eq!(old.interpret(&[2.0]).unwrap(), vec![-2.0]);
    assert!(store.begin(id).is_ok());
}

#[test]
fn failed_recording_releases_id() {
    let store = TapeStore::<f64>::new();
    let id = TraceId(5);
    let err = store.record(id, |rec| {
        rec.mark_independent(1.0);
    });
    assert!(matches!(err, Err(TapeError::MalformedTrace(_))));
    assert_eq!(store.lookup(id).err(), Some(TapeError::NotFound(id)));
    assert!(store.begin(id).is_ok());
}

#[test]
fn concurrent_lookups_and_evaluation() {
    let store = TapeStore::<f64>::with_first_id(10);
    let ids: Vec<TraceId> = (0..4)
        .map(|k| {
            let id = store.mint_id();
            store
                .record(id, |rec| {
                    let x = rec.mark_independent(1.0);
                    rec.mark_dependent(x * (k as f64 + 1.0));
                })
                .unwrap();
            id
        })
        .collect();
    assert_eq!(store.ids(), ids);

    let handles: Vec<_> = ids
        .iter()
        .enumerate()
        .flat_map(|(k, &id)| {
            let store = store.clone();
            (0..3).map(move |_| {
                let store = store.clone();
                thread::spawn(move || {
                    let y = adtape::interpret(&store, id, &[2.0]).unwrap();
                    let jac = adtape::par_jacobian(&store, id, &[2.0], 2).unwrap();
                    (k, y[0], jac[(0, 0)])
                })
            })
        })
        .collect();
    for h in handles {
        let (k, y, d) = h.join().unwrap();
        assert_eq!(y, 2.0 * (k as f64 + 1.0));
        assert_eq!(d, k as f64 + 1.0);
    }
}

#[test]
fn recording_on_two_threads_at_once() {
    let store = TapeStore::<f64>::with_first_id(200);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                let id = store.mint_id();
                store
                    .record(id, |rec| {
                        let x = rec.mark_independent(3.0);
                        rec.mark_dependent(x * x - x);
                    })
                    .unwrap()
                    .id()
            })
        })
        .collect();
    for h in handles {
        let id = h.join().unwrap();
        assert_eq!(adtape::jacobian(&store, id, &[3.0]).unwrap()[(0, 0)], 5.0);
    }
    assert_eq!(store.len(), 4);
}

#[test]
fn register_during_bare_recording_fails() {
    let store = TapeStore::<f64>::new();
    let id = TraceId(30);
    // Built first: once the other thread starts, the id is taken.
    let foreign = square_tape(id);

    let (started_tx, started_rx) = mpsc::channel();
    let (finish_tx, finish_rx) = mpsc::channel::<()>();
    let recorder = thread::spawn(move || {
        let mut rec = RecordingSession::<f64>::begin(id).unwrap();
        let x = rec.mark_independent(2.0);
        started_tx.send(()).unwrap();
        finish_rx.recv().unwrap();
        rec.mark_dependent(x + 1.0);
        rec.end().unwrap()
    });

    started_rx.recv().unwrap();
    assert!(matches!(
        store.register(foreign),
        Err(TapeError::ConcurrentRecording(_))
    ));
    assert!(RecordingSession::<f64>::begin(id).is_err());
    finish_tx.send(()).unwrap();
    let ours = store.register(recorder.join().unwrap()).unwrap();

    // The stored tape is the one recorded above, not the foreign square.
    assert_eq!(store.lookup(id).unwrap().interpret(&[5.0]).unwrap(), vec![6.0]);
    assert_eq!(
        store.register(square_tape(id)).err(),
        Some(TapeError::DuplicateId(id))
    );
    assert!(Arc::ptr_eq(&ours, &store.lookup(id).unwrap()));
}
