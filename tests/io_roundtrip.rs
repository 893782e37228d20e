//! Format round-trips: MatrixMarket -> CSR text -> memory, COO and
//! transpose laws.

use amgsolve::core::traits::{Indexing, MatVec};
use amgsolve::io;
use amgsolve::matrix::CsrMatrix;
use amgsolve::Real;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;

/// A symmetric five-point stencil written in lower-triangular
/// MatrixMarket form.
fn write_symmetric_mtx(path: &std::path::Path, nx: usize) {
    let n = nx * nx;
    let mut entries = Vec::new();
    for i in 0..nx {
        for j in 0..nx {
            let p = i * nx + j;
            entries.push((p, p, 4.0));
            if j > 0 {
                entries.push((p, p - 1, -1.0));
            }
            if i > 0 {
                entries.push((p, p - nx, -1.0));
            }
        }
    }
    let mut text = String::from("%%MatrixMarket matrix coordinate real symmetric\n");
    let _ = writeln!(text, "{} {} {}", n, n, entries.len());
    for (i, j, v) in entries {
        let _ = writeln!(text, "{} {} {v:.1}", i + 1, j + 1);
    }
    std::fs::write(path, text).unwrap();
}

/// S6: read a symmetric mtx file, write it back as native CSR, re-read,
/// and compare `A x` against the original for random probes.
#[test]
fn s6_matrix_market_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mtx_path = dir.path().join("poisson.mtx");
    let csr_path = dir.path().join("poisson.csr");
    write_symmetric_mtx(&mtx_path, 8);

    let a = io::read_mtx(&mtx_path).unwrap();
    io::write_csr(&csr_path, &a).unwrap();
    let b = io::read_csr(&csr_path).unwrap();

    assert_eq!(a.nrows(), b.nrows());
    assert_eq!(a.nnz(), b.nnz());

    let n = a.nrows();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..10 {
        let x: Vec<Real> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut y1 = vec![0.0; n];
        let mut y2 = vec![0.0; n];
        a.matvec(&x, &mut y1);
        b.matvec(&x, &mut y2);
        for (u, v) in y1.iter().zip(&y2) {
            assert!((u - v).abs() <= 10.0 * f64::EPSILON * u.abs().max(1.0));
        }
    }
}

/// CSR -> COO -> CSR preserves the matrix.
#[test]
fn csr_coo_csr_is_identity() {
    let a = CsrMatrix::from_coo(
        4,
        4,
        &[
            (0, 0, 1.5),
            (0, 3, -2.0),
            (1, 1, 3.0),
            (2, 0, 0.25),
            (2, 2, -1.0),
            (3, 3, 8.0),
        ],
    );
    let back = CsrMatrix::from_coo(4, 4, &a.to_coo());
    assert_eq!(a, back);
}

/// Double transpose is exact, with no floating-point rounding.
#[test]
fn transpose_involution_is_exact() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut triples = Vec::new();
    for i in 0..20 {
        for _ in 0..3 {
            let j = rng.gen_range(0..20);
            triples.push((i, j, rng.gen_range(-5.0..5.0)));
        }
    }
    let a = CsrMatrix::from_coo(20, 20, &triples);
    assert_eq!(a, a.transpose().transpose());
}

/// Writing and re-reading every vector format preserves the payload.
#[test]
fn vector_formats_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let v: Vec<Real> = (0..17).map(|i| (i as Real).exp() / 100.0 - 0.3).collect();

    let path = dir.path().join("x.vec");
    io::write_vec(&path, &v).unwrap();
    assert_eq!(io::read_vec(&path).unwrap(), v);
}
