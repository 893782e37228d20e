//! File adapters for the matrix and vector formats the library consumes
//! and produces. All on-disk index bases convert here, at the boundary;
//! the in-memory structures are zero-based throughout.

use crate::matrix::{BsrMatrix, CsrMatrix, StrMatrix};
use crate::{Int, Real, SolverError};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Whitespace token stream over a reader, skipping `%` comment lines
/// (MatrixMarket style).
struct Tokens {
    buf: Vec<String>,
    pos: usize,
}

impl Tokens {
    fn from_path(path: &Path) -> Result<Self, SolverError> {
        let file = File::open(path)?;
        let mut buf = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.starts_with('%') {
                continue;
            }
            buf.extend(trimmed.split_whitespace().map(str::to_owned));
        }
        Ok(Self { buf, pos: 0 })
    }

    fn next<T: FromStr>(&mut self, what: &str) -> Result<T, SolverError> {
        let tok = self
            .buf
            .get(self.pos)
            .ok_or_else(|| SolverError::Parse(format!("unexpected end of file reading {what}")))?;
        self.pos += 1;
        tok.parse::<T>()
            .map_err(|_| SolverError::Parse(format!("bad token {tok:?} while reading {what}")))
    }

    fn take<T: FromStr>(&mut self, n: usize, what: &str) -> Result<Vec<T>, SolverError> {
        (0..n).map(|_| self.next::<T>(what)).collect()
    }
}

/// Read the native CSR text format: `n`, then `n + 1` row-pointer values,
/// then `nnz` column indices, then `nnz` values. Indices on disk are
/// one-based and convert on read.
pub fn read_csr(path: impl AsRef<Path>) -> Result<CsrMatrix, SolverError> {
    let mut t = Tokens::from_path(path.as_ref())?;
    let n: usize = t.next("matrix size")?;
    let ia_raw: Vec<i64> = t.take(n + 1, "row pointers")?;
    let nnz = (ia_raw[n] - ia_raw[0]) as usize;
    let base = ia_raw[0];
    let ia: Vec<usize> = ia_raw.iter().map(|&v| (v - base) as usize).collect();
    let ja_raw: Vec<i64> = t.take(nnz, "column indices")?;
    let ja: Vec<usize> = ja_raw
        .iter()
        .map(|&v| {
            let j = v - base;
            if j < 0 || j as usize >= n {
                Err(SolverError::Parse(format!("column index {v} out of range")))
            } else {
                Ok(j as usize)
            }
        })
        .collect::<Result<_, _>>()?;
    let val: Vec<Real> = t.take(nnz, "values")?;
    Ok(CsrMatrix::from_raw(n, n, ia, ja, val))
}

/// Write the native CSR text format, one-based on disk.
pub fn write_csr(path: impl AsRef<Path>, a: &CsrMatrix) -> Result<(), SolverError> {
    use crate::core::traits::Indexing;
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{}", a.nrows())?;
    for &p in &a.ia {
        writeln!(w, "{}", p + 1)?;
    }
    for &j in &a.ja {
        writeln!(w, "{}", j + 1)?;
    }
    for &v in &a.val {
        writeln!(w, "{v:.16e}")?;
    }
    Ok(())
}

/// Read coordinate triples: `nrow ncol nnz`, then `i j v` per entry,
/// zero-based on disk.
pub fn read_coo(path: impl AsRef<Path>) -> Result<CsrMatrix, SolverError> {
    let mut t = Tokens::from_path(path.as_ref())?;
    let nrow: usize = t.next("row count")?;
    let ncol: usize = t.next("column count")?;
    let nnz: usize = t.next("nnz")?;
    let mut triples = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        let i: usize = t.next("row index")?;
        let j: usize = t.next("column index")?;
        let v: Real = t.next("value")?;
        triples.push((i, j, v));
    }
    Ok(CsrMatrix::from_coo(nrow, ncol, &triples))
}

pub fn write_coo(path: impl AsRef<Path>, a: &CsrMatrix) -> Result<(), SolverError> {
    use crate::core::traits::Indexing;
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{} {} {}", a.nrows(), a.ncols(), a.nnz())?;
    for (i, j, v) in a.to_coo() {
        writeln!(w, "{i} {j} {v:.16e}")?;
    }
    Ok(())
}

/// Read a MatrixMarket coordinate file, general or symmetric. Indices are
/// one-based; symmetric storage is expanded to the full pattern on read.
pub fn read_mtx(path: impl AsRef<Path>) -> Result<CsrMatrix, SolverError> {
    let path = path.as_ref();
    // the banner line is a comment to the tokenizer, so sniff it first
    let symmetric = {
        let file = File::open(path)?;
        let mut first = String::new();
        BufReader::new(file).read_line(&mut first)?;
        first.to_ascii_lowercase().contains("symmetric")
    };

    let mut t = Tokens::from_path(path)?;
    let nrow: usize = t.next("row count")?;
    let ncol: usize = t.next("column count")?;
    let nnz: usize = t.next("nnz")?;
    let mut triples = Vec::with_capacity(if symmetric { 2 * nnz } else { nnz });
    for _ in 0..nnz {
        let i: usize = t.next("row index")?;
        let j: usize = t.next("column index")?;
        let v: Real = t.next("value")?;
        if i < 1 || i > nrow || j < 1 || j > ncol {
            return Err(SolverError::Parse(format!("entry ({i}, {j}) out of range")));
        }
        triples.push((i - 1, j - 1, v));
        if symmetric && i != j {
            triples.push((j - 1, i - 1, v));
        }
    }
    Ok(CsrMatrix::from_coo(nrow, ncol, &triples))
}

/// Write a MatrixMarket general coordinate file.
pub fn write_mtx(path: impl AsRef<Path>, a: &CsrMatrix) -> Result<(), SolverError> {
    use crate::core::traits::Indexing;
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(w, "{} {} {}", a.nrows(), a.ncols(), a.nnz())?;
    for (i, j, v) in a.to_coo() {
        writeln!(w, "{} {} {v:.16e}", i + 1, j + 1)?;
    }
    Ok(())
}

/// Read the structured-matrix format: `nx ny nz`, `nc`, `nband`, the
/// diagonal length and entries, then per band `offset length` and
/// entries.
pub fn read_str(path: impl AsRef<Path>) -> Result<StrMatrix, SolverError> {
    let mut t = Tokens::from_path(path.as_ref())?;
    let nx: usize = t.next("nx")?;
    let ny: usize = t.next("ny")?;
    let nz: usize = t.next("nz")?;
    let nc: usize = t.next("nc")?;
    let nband: usize = t.next("nband")?;
    let ndiag: usize = t.next("diagonal length")?;
    let diag: Vec<Real> = t.take(ndiag, "diagonal entries")?;
    let mut offsets = Vec::with_capacity(nband);
    let mut offdiag = Vec::with_capacity(nband);
    for k in 0..nband {
        let offset: Int = t.next("band offset")?;
        let len: usize = t.next("band length")?;
        offsets.push(offset);
        offdiag.push(t.take(len, &format!("band {k} entries"))?);
    }
    Ok(StrMatrix::new(nx, ny, nz, nc, offsets, diag, offdiag))
}

pub fn write_str(path: impl AsRef<Path>, a: &StrMatrix) -> Result<(), SolverError> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{} {} {}", a.nx, a.ny, a.nz)?;
    writeln!(w, "{}", a.nc)?;
    writeln!(w, "{}", a.nband())?;
    writeln!(w, "{}", a.diag.len())?;
    for v in &a.diag {
        writeln!(w, "{v:.16e}")?;
    }
    for (k, band) in a.offdiag.iter().enumerate() {
        writeln!(w, "{} {}", a.offsets[k], band.len())?;
        for v in band {
            writeln!(w, "{v:.16e}")?;
        }
    }
    Ok(())
}

/// Read the BSR format: `ROW COL NNZ`, `nb`, `storage_manner`, then the
/// three arrays each preceded by its length.
pub fn read_bsr(path: impl AsRef<Path>) -> Result<BsrMatrix, SolverError> {
    let mut t = Tokens::from_path(path.as_ref())?;
    let nrowb: usize = t.next("block rows")?;
    let ncolb: usize = t.next("block cols")?;
    let nnzb: usize = t.next("block nnz")?;
    let nb: usize = t.next("block size")?;
    let storage_manner: usize = t.next("storage manner")?;
    if storage_manner != 0 {
        log::debug!("BSR storage manner {storage_manner} normalized to row-major on read");
    }
    let nia: usize = t.next("IA length")?;
    if nia != nrowb + 1 {
        return Err(SolverError::Parse(format!("IA length {nia} != {}", nrowb + 1)));
    }
    let ia: Vec<usize> = t.take(nia, "IA")?;
    let nja: usize = t.next("JA length")?;
    if nja != nnzb {
        return Err(SolverError::Parse(format!("JA length {nja} != {nnzb}")));
    }
    let ja: Vec<usize> = t.take(nja, "JA")?;
    let nval: usize = t.next("value length")?;
    if nval != nnzb * nb * nb {
        return Err(SolverError::Parse(format!("value length {nval} != {}", nnzb * nb * nb)));
    }
    let val: Vec<Real> = t.take(nval, "values")?;
    Ok(BsrMatrix::from_raw(nrowb, ncolb, nb, ia, ja, val))
}

pub fn write_bsr(path: impl AsRef<Path>, a: &BsrMatrix) -> Result<(), SolverError> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{} {} {}", a.nrowb, a.ncolb, a.nnzb())?;
    writeln!(w, "{}", a.nb)?;
    writeln!(w, "0")?;
    writeln!(w, "{}", a.ia.len())?;
    for &p in &a.ia {
        writeln!(w, "{p}")?;
    }
    writeln!(w, "{}", a.ja.len())?;
    for &j in &a.ja {
        writeln!(w, "{j}")?;
    }
    writeln!(w, "{}", a.val.len())?;
    for &v in &a.val {
        writeln!(w, "{v:.16e}")?;
    }
    Ok(())
}

/// Read a dense vector: `n`, then `n` values.
pub fn read_vec(path: impl AsRef<Path>) -> Result<Vec<Real>, SolverError> {
    let mut t = Tokens::from_path(path.as_ref())?;
    let n: usize = t.next("vector length")?;
    t.take(n, "vector entries")
}

pub fn write_vec(path: impl AsRef<Path>, v: &[Real]) -> Result<(), SolverError> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{}", v.len())?;
    for x in v {
        writeln!(w, "{x:.16e}")?;
    }
    Ok(())
}

/// Read the indexed dense-vector variant: `n`, then `index value` pairs
/// in any order.
pub fn read_vec_indexed(path: impl AsRef<Path>) -> Result<Vec<Real>, SolverError> {
    let mut t = Tokens::from_path(path.as_ref())?;
    let n: usize = t.next("vector length")?;
    let mut v = vec![0.0; n];
    for _ in 0..n {
        let i: usize = t.next("entry index")?;
        if i >= n {
            return Err(SolverError::Parse(format!("entry index {i} out of range")));
        }
        v[i] = t.next("entry value")?;
    }
    Ok(v)
}

/// Read an integer vector: `n`, then `n` values.
pub fn read_ivec(path: impl AsRef<Path>) -> Result<Vec<Int>, SolverError> {
    let mut t = Tokens::from_path(path.as_ref())?;
    let n: usize = t.next("vector length")?;
    t.take(n, "vector entries")
}

pub fn write_ivec(path: impl AsRef<Path>, v: &[Int]) -> Result<(), SolverError> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{}", v.len())?;
    for x in v {
        writeln!(w, "{x}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::MatVec;

    fn sample_csr() -> CsrMatrix {
        CsrMatrix::from_coo(
            3,
            3,
            &[(0, 0, 2.0), (0, 2, -0.5), (1, 1, 3.25), (2, 0, 1.0), (2, 2, 4.0)],
        )
    }

    #[test]
    fn csr_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csr");
        let a = sample_csr();
        write_csr(&path, &a).unwrap();
        let back = read_csr(&path).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn coo_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.coo");
        let a = sample_csr();
        write_coo(&path, &a).unwrap();
        let back = read_coo(&path).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn mtx_symmetric_expands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mtx");
        std::fs::write(
            &path,
            "%%MatrixMarket matrix coordinate real symmetric\n\
             % a comment\n\
             3 3 4\n\
             1 1 2.0\n\
             2 1 -1.0\n\
             2 2 2.0\n\
             3 2 -1.0\n",
        )
        .unwrap();
        let a = read_mtx(&path).unwrap();
        // 2 * nnz - (diagonal entries) = 2 * 4 - 2
        assert_eq!(a.nnz(), 6);
        let mut y = vec![0.0; 3];
        a.matvec(&[1.0, 1.0, 1.0], &mut y);
        assert_eq!(y, vec![1.0, 0.0, -1.0]);
    }

    #[test]
    fn vec_and_ivec_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vpath = dir.path().join("v.vec");
        let v = vec![1.5, -2.0, 0.25];
        write_vec(&vpath, &v).unwrap();
        assert_eq!(read_vec(&vpath).unwrap(), v);

        let ipath = dir.path().join("v.ivec");
        let iv: Vec<Int> = vec![3, -1, 7];
        write_ivec(&ipath, &iv).unwrap();
        assert_eq!(read_ivec(&ipath).unwrap(), iv);
    }

    #[test]
    fn indexed_vector_reads_out_of_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.ind");
        std::fs::write(&path, "3\n2 30.0\n0 10.0\n1 20.0\n").unwrap();
        assert_eq!(read_vec_indexed(&path).unwrap(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn str_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.str");
        let a = StrMatrix::new(
            4,
            1,
            1,
            1,
            vec![-1, 1],
            vec![2.0; 4],
            vec![vec![-1.0; 3], vec![-1.0; 3]],
        );
        write_str(&path, &a).unwrap();
        let back = read_str(&path).unwrap();
        assert_eq!(back.ngrid, 4);
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let mut y1 = vec![0.0; 4];
        let mut y2 = vec![0.0; 4];
        a.matvec(&x, &mut y1);
        back.matvec(&x, &mut y2);
        assert_eq!(y1, y2);
    }

    #[test]
    fn bsr_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bsr");
        let a = BsrMatrix::from_raw(
            2,
            2,
            2,
            vec![0, 2, 3],
            vec![0, 1, 1],
            (0..12).map(|k| k as Real * 0.5 + 1.0).collect(),
        );
        write_bsr(&path, &a).unwrap();
        let back = read_bsr(&path).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn truncated_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.vec");
        std::fs::write(&path, "5\n1.0\n2.0\n").unwrap();
        assert!(matches!(read_vec(&path), Err(SolverError::Parse(_))));
    }
}
