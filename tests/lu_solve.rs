//! Recording the LU solve: replay fidelity and tape statistics.

use approx::assert_relative_eq;
use adtape::lu::{LinearSystem, Problem};
use adtape::{OpCode, TapeStore, TraceId};

#[test]
fn replay_reproduces_recorded_solution() {
    let store = TapeStore::with_first_id(100);
    for n in [1usize, 2, 5, 10] {
        let p = Problem::trace(&store, store.mint_id(), n).unwrap();
        let replayed = p.replay().unwrap();
        assert_eq!(replayed[0].to_bits(), p.x[0].to_bits(), "n = {}", n);
        assert_eq!(replayed, p.x);
    }
}

#[test]
fn statistics_describe_the_solve() {
    let store = TapeStore::with_first_id(200);
    for n in [1usize, 2, 5, 10] {
        let p = Problem::trace(&store, store.mint_id(), n).unwrap();
        let stats = p.tape.stats();
        assert_eq!(stats.independent_count, n * n + n);
        assert_eq!(stats.dependent_count, n);
        assert_eq!(stats.op_count, p.tape.opcodes().len());
        assert_eq!(stats.constant_count, 0);
        assert_eq!(stats.value_stack_bytes, 8 * stats.location_count);
        assert_eq!(stats.op_buffer_bytes, 17 * stats.op_count);
        assert!(stats.max_live_locations <= stats.location_count);
        assert!(stats.max_live_locations >= n * n + n);
        let markers = p
            .tape
            .opcodes()
            .iter()
            .filter(|&&op| matches!(op, OpCode::MarkIndependent | OpCode::MarkDependent))
            .count();
        assert_eq!(markers, n * n + 2 * n);
    }
}

#[test]
fn one_by_one_system() {
    let store = TapeStore::new();
    let p = Problem::trace(&store, TraceId(1), 1).unwrap();
    // A = [1], b = [-1]
    assert_eq!(p.args, vec![1.0, -1.0]);
    assert_eq!(p.x, vec![-1.0]);
    // x = b / a
    let jac = p.tape.jacobian(&p.args).unwrap();
    assert_eq!(jac.row(0), &[1.0, 1.0]);
}

#[test]
fn jacobian_with_respect_to_rhs_is_inverse() {
    let n = 4;
    let store = TapeStore::new();
    let p = Problem::trace(&store, TraceId(2), n).unwrap();
    let jac = p.tape.jacobian(&p.args).unwrap();
    let system = LinearSystem::sample(n);

    // ∂x/∂b = A⁻¹, so A · (∂x/∂b) = I.
    for i in 0..n {
        for j in 0..n {
            let s: f64 = (0..n)
                .map(|k| system.a[i * n + k] * jac[(k, n * n + j)])
                .sum();
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_relative_eq!(s, expected, epsilon = 1e-12);
        }
    }
}

#[test]
fn replay_at_perturbed_system_solves_it() {
    let n = 5;
    let store = TapeStore::new();
    let p = Problem::trace(&store, TraceId(3), n).unwrap();
    let mut system = LinearSystem::sample(n);
    system.a[0] += 0.5;
    system.b[n - 1] = 7.0;
    let x = p.tape.interpret(&system.args()).unwrap();
    assert_eq!(x, system.solve());
}

#[test]
fn tape_listing_covers_every_record() {
    let store = TapeStore::new();
    let p = Problem::trace(&store, TraceId(4), 3).unwrap();
    let listing = p.tape.to_string();
    assert_eq!(listing.lines().count(), 1 + p.tape.num_ops());
    assert!(listing.contains("fmsub"));
    assert!(listing.contains("div"));

    let annotated = p.tape.listing_at(&p.args).unwrap();
    let text = annotated.to_string();
    assert_eq!(text.lines().count(), 1 + p.tape.num_ops());
    // The last record exports x[2] with the value the recording produced.
    let last = text.lines().last().unwrap();
    assert!(last.contains("-> y[2]"), "{}", last);
    assert!(last.ends_with(&format!(" = {:e}", p.x[2])), "{}", last);
}
