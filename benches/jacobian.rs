use adtape::lu::Problem;
use adtape::{RecordOptions, TapeStore, TraceId};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn trace(store: &TapeStore<f64>, n: usize) -> Problem {
    Problem::trace(store, store.mint_id(), n).unwrap()
}

/// Recording the LU solve, fused vs unfused finalization.
fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_lu");
    for n in [5, 20, 40] {
        group.bench_with_input(BenchmarkId::new("fused", n), &n, |b, &n| {
            let store = TapeStore::new();
            b.iter(|| black_box(trace(&store, n)))
        });
        group.bench_with_input(BenchmarkId::new("unfused", n), &n, |b, &n| {
            let system = adtape::lu::LinearSystem::sample(n);
            let mut id = 0u64;
            b.iter(|| {
                id += 1;
                let mut rec =
                    adtape::RecordingSession::<f64>::begin_with(TraceId(id), RecordOptions::unfused())
                        .unwrap();
                let mut a: Vec<_> = system.a.iter().map(|&v| rec.mark_independent(v)).collect();
                let mut x: Vec<_> = system.b.iter().map(|&v| rec.mark_independent(v)).collect();
                adtape::lu::lu_factor(n, &mut a);
                adtape::lu::lu_solve(n, &a, &mut x);
                for xi in x {
                    rec.mark_dependent(xi);
                }
                black_box(rec.end().unwrap())
            })
        });
    }
    group.finish();
}

/// Replay of a recorded tape.
fn bench_interpret(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpret");
    let store = TapeStore::new();
    for n in [5, 20, 40] {
        let p = trace(&store, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &p, |b, p| {
            b.iter(|| black_box(p.tape.interpret(black_box(&p.args)).unwrap()))
        });
    }
    group.finish();
}

/// Sequential Jacobian vs parallel Jacobian at several worker counts.
fn bench_jacobian(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobian");
    let store = TapeStore::new();
    for n in [10, 30] {
        let p = trace(&store, n);
        group.bench_with_input(BenchmarkId::new("sequential", n), &p, |b, p| {
            b.iter(|| black_box(p.tape.jacobian(&p.args).unwrap()))
        });
        for workers in [2, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("parallel_{}", workers), n),
                &p,
                |b, p| b.iter(|| black_box(p.tape.par_jacobian(&p.args, workers).unwrap())),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_record, bench_interpret, bench_jacobian);
criterion_main!(benches);
