//! Multiply-accumulate fusion: fused and unfused tapes must agree.

use approx::assert_relative_eq;
use adtape::lu::{lu_factor, lu_solve, LinearSystem};
use adtape::{Active, OpCode, RecordOptions, RecordingSession, Tape, TraceId};

fn record_lu(id: u64, n: usize, options: RecordOptions) -> (Tape<f64>, Vec<f64>) {
    let system = LinearSystem::sample(n);
    let mut rec = RecordingSession::<f64>::begin_with(TraceId(id), options).unwrap();
    let mut a: Vec<Active<f64>> = system.a.iter().map(|&v| rec.mark_independent(v)).collect();
    let mut b: Vec<Active<f64>> = system.b.iter().map(|&v| rec.mark_independent(v)).collect();
    lu_factor(n, &mut a);
    lu_solve(n, &a, &mut b);
    for x in b {
        rec.mark_dependent(x);
    }
    (rec.end().unwrap(), system.args())
}

fn count(tape: &Tape<f64>, op: OpCode) -> usize {
    tape.opcodes().iter().filter(|&&o| o == op).count()
}

#[test]
fn lu_accumulations_are_fused() {
    let (fused, _) = record_lu(1, 5, RecordOptions::default());
    let (plain, _) = record_lu(2, 5, RecordOptions::unfused());

    assert!(count(&fused, OpCode::FusedMulSub) > 0);
    assert_eq!(count(&fused, OpCode::Mul), 0);
    assert_eq!(count(&plain, OpCode::FusedMulSub), 0);
    // Each fused record replaces one Mul and one Sub.
    assert_eq!(
        count(&fused, OpCode::FusedMulSub),
        count(&plain, OpCode::Mul)
    );
    assert_eq!(
        fused.num_ops() + count(&fused, OpCode::FusedMulSub),
        plain.num_ops()
    );
    assert!(fused.num_locations() < plain.num_locations());
}

#[test]
fn fused_and_unfused_jacobians_agree() {
    for n in [1usize, 2, 4, 7] {
        let (fused, args) = record_lu(10 + n as u64, n, RecordOptions::default());
        let (plain, _) = record_lu(20 + n as u64, n, RecordOptions::unfused());

        assert_eq!(fused.interpret(&args).unwrap(), plain.interpret(&args).unwrap());

        let jf = fused.jacobian(&args).unwrap();
        let jp = plain.jacobian(&args).unwrap();
        assert_eq!(jf.shape(), jp.shape());
        for (a, b) in jf.as_slice().iter().zip(jp.as_slice()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12, max_relative = 1e-12);
        }
    }
}

#[test]
fn explicit_fused_builders_differentiate() {
    let mut rec = RecordingSession::<f64>::begin(TraceId(30)).unwrap();
    let y = rec.mark_independent(1.0);
    let a = rec.mark_independent(2.0);
    let b = rec.mark_independent(3.0);
    rec.mark_dependent(y.fused_mul_add(a, b));
    rec.mark_dependent(y.fused_mul_sub(a, b));
    let tape = rec.end().unwrap();

    assert_eq!(tape.recorded_outputs(), &[7.0, -5.0]);
    let jac = tape.jacobian(&[1.0, 2.0, 3.0]).unwrap();
    assert_eq!(jac.row(0), &[1.0, 3.0, 2.0]);
    assert_eq!(jac.row(1), &[1.0, -3.0, -2.0]);
}

#[test]
fn fused_builder_with_constant_factor() {
    let mut rec = RecordingSession::<f64>::begin(TraceId(31)).unwrap();
    let y = rec.mark_independent(1.0);
    let a = rec.mark_independent(2.0);
    rec.mark_dependent(y.fused_mul_sub(a, Active::constant(4.0)));
    let tape = rec.end().unwrap();
    assert_eq!(tape.interpret(&[10.0, 1.0]).unwrap(), vec![6.0]);
    assert_eq!(tape.jacobian(&[10.0, 1.0]).unwrap().row(0), &[1.0, -4.0]);
}

#[test]
fn fused_replay_is_bit_identical_to_recording() {
    let (tape, args) = record_lu(40, 6, RecordOptions::default());
    let replayed = tape.interpret(&args).unwrap();
    assert_eq!(replayed, tape.recorded_outputs());
    assert_eq!(replayed, LinearSystem::sample(6).solve());
}
