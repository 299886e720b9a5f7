//! Tape-based reverse-mode automatic differentiation.
//!
//! A computation over [`Active`] values is recorded once into a [`Tape`] by a
//! [`RecordingSession`]. The finalized tape is immutable and can be replayed
//! ([`Tape::interpret`]) and differentiated ([`Tape::jacobian`],
//! [`Tape::par_jacobian`]) any number of times, from any number of threads.
//! A [`TapeStore`] keeps finalized tapes by [`TraceId`].
//!
//! ```
//! use adtape::{TapeStore, TraceId};
//!
//! let store = TapeStore::<f64>::new();
//! let id = store.mint_id();
//! let tape = store
//!     .record(id, |rec| {
//!         let x = rec.mark_independent(2.0);
//!         let y = rec.mark_independent(3.0);
//!         rec.mark_dependent(x * y);
//!         rec.mark_dependent(x - y * y);
//!     })
//!     .unwrap();
//!
//! let jac = tape.par_jacobian(&[2.0, 3.0], 2).unwrap();
//! assert_eq!(jac.row(0), &[3.0, 2.0]);
//! assert_eq!(jac.row(1), &[1.0, -6.0]);
//! ```

pub mod active;
pub mod api;
pub mod config;
pub mod error;
pub mod float;
pub mod lu;
pub mod matrix;
pub mod opcode;
pub mod recorder;
pub mod store;
pub mod tape;
mod traits;

pub use active::{Active, CONSTANT};
pub use api::{interpret, jacobian, par_jacobian, vjp};
pub use config::ParallelConfig;
pub use error::{Result, TapeError};
pub use float::Float;
pub use matrix::{Matrix, Mismatch};
pub use opcode::OpCode;
pub use recorder::{RecordOptions, RecorderThreadLocal, RecordingSession};
pub use store::{TapeStore, TraceId};
pub use tape::{Listing, Tape, TapeStats};

/// Active value over `f64`.
pub type Active64 = Active<f64>;
/// Active value over `f32`.
pub type Active32 = Active<f32>;
