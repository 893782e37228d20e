//! Incomplete LU factorizations and their triangular solves.
//!
//! The factor is stored fused, MSR-style: `luval` keeps the *inverted*
//! diagonal tiles in slots `0..n`, slot `n` is padding, and slots `n+1..`
//! hold the off-diagonal entries row by row, L part first (columns
//! ascending), then U part. `ijlu[0..=n]` are the row pointers into that
//! shared coordinate space, `ijlu[n+1..]` the column indices, and `uptr[i]`
//! marks where row `i`'s U part begins. `nb == 1` is the scalar CSR case;
//! `nb > 1` stores `nb x nb` tiles in the same layout.

use super::Preconditioner;
use crate::config::{IluKind, IluParam};
use crate::consts::SMALL_REAL;
use crate::matrix::{smat, BsrMatrix, CsrMatrix};
use crate::{Real, SolverError};

/// A fused incomplete LU factor.
#[derive(Clone, Debug)]
pub struct IluData {
    /// Block rows.
    pub n: usize,
    /// Block size (1 = scalar).
    pub nb: usize,
    /// Stored entries including the diagonal.
    pub nzlu: usize,
    pub ijlu: Vec<usize>,
    pub uptr: Vec<usize>,
    pub luval: Vec<Real>,
}

impl IluData {
    /// Factor a CSR matrix per the requested flavor.
    pub fn setup(a: &CsrMatrix, param: &IluParam) -> Result<Self, SolverError> {
        match param.kind {
            IluKind::Ilu0 => iluk(a, 0),
            IluKind::Iluk => iluk(a, param.fill_level),
            IluKind::Ilut => ilut(a, param.fill_level, param.droptol, param.relax),
        }
    }

    /// Triangular solve `z = U^-1 L^-1 r`.
    pub fn solve(&self, r: &[Real], z: &mut [Real]) {
        let n = self.n;
        let nb = self.nb;
        assert_eq!(r.len(), n * nb);
        assert_eq!(z.len(), n * nb);
        if nb == 1 {
            // forward: L has a unit diagonal
            for i in 0..n {
                let mut s = r[i];
                for p in self.ijlu[i]..self.uptr[i] {
                    s -= self.luval[p] * z[self.ijlu[p]];
                }
                z[i] = s;
            }
            // backward, diagonal already inverted
            for i in (0..n).rev() {
                let mut s = z[i];
                for p in self.uptr[i]..self.ijlu[i + 1] {
                    s -= self.luval[p] * z[self.ijlu[p]];
                }
                z[i] = self.luval[i] * s;
            }
        } else {
            let nb2 = nb * nb;
            let mut s = vec![0.0; nb];
            let mut t = vec![0.0; nb];
            for i in 0..n {
                s.copy_from_slice(&r[i * nb..(i + 1) * nb]);
                for p in self.ijlu[i]..self.uptr[i] {
                    let j = self.ijlu[p];
                    smat::ymax(&self.luval[p * nb2..(p + 1) * nb2], &z[j * nb..(j + 1) * nb], &mut s, nb);
                }
                z[i * nb..(i + 1) * nb].copy_from_slice(&s);
            }
            for i in (0..n).rev() {
                s.copy_from_slice(&z[i * nb..(i + 1) * nb]);
                for p in self.uptr[i]..self.ijlu[i + 1] {
                    let j = self.ijlu[p];
                    smat::ymax(&self.luval[p * nb2..(p + 1) * nb2], &z[j * nb..(j + 1) * nb], &mut s, nb);
                }
                smat::mxv(&self.luval[i * nb2..(i + 1) * nb2], &s, &mut t, nb);
                z[i * nb..(i + 1) * nb].copy_from_slice(&t);
            }
        }
    }
}

/// Guard a scalar pivot.
fn guarded(d: Real, row: usize) -> Real {
    if d.abs() < SMALL_REAL {
        log::warn!("ILU pivot at row {row} is {d:e}, substituting {SMALL_REAL:e}");
        if d >= 0.0 {
            SMALL_REAL
        } else {
            -SMALL_REAL
        }
    } else {
        d
    }
}

/// Rows under construction: per-row L/U column and value lists plus U
/// fill levels, packed into the fused layout once every row is done.
struct RowsBuf {
    lcols: Vec<Vec<usize>>,
    lvals: Vec<Vec<Real>>,
    ucols: Vec<Vec<usize>>,
    uvals: Vec<Vec<Real>>,
    diag: Vec<Real>,
}

impl RowsBuf {
    fn new(n: usize) -> Self {
        Self {
            lcols: vec![Vec::new(); n],
            lvals: vec![Vec::new(); n],
            ucols: vec![Vec::new(); n],
            uvals: vec![Vec::new(); n],
            diag: vec![0.0; n],
        }
    }

    fn pack(self) -> IluData {
        let n = self.diag.len();
        let noff: usize = self.lcols.iter().map(Vec::len).sum::<usize>()
            + self.ucols.iter().map(Vec::len).sum::<usize>();
        let mut ijlu = vec![0usize; n + 1 + noff];
        let mut uptr = vec![0usize; n];
        let mut luval = vec![0.0; n + 1 + noff];
        let mut pos = n + 1;
        for i in 0..n {
            ijlu[i] = pos;
            for (&j, &v) in self.lcols[i].iter().zip(&self.lvals[i]) {
                ijlu[pos] = j;
                luval[pos] = v;
                pos += 1;
            }
            uptr[i] = pos;
            for (&j, &v) in self.ucols[i].iter().zip(&self.uvals[i]) {
                ijlu[pos] = j;
                luval[pos] = v;
                pos += 1;
            }
            luval[i] = 1.0 / guarded(self.diag[i], i);
        }
        ijlu[n] = pos;
        IluData { n, nb: 1, nzlu: n + noff, ijlu, uptr, luval }
    }
}

/// Level-of-fill factorization ILU(k); `lfil == 0` is plain ILU(0).
pub fn iluk(a: &CsrMatrix, lfil: usize) -> Result<IluData, SolverError> {
    use crate::core::traits::Indexing;
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "ILU needs a square matrix");

    let mut rows = RowsBuf::new(n);
    let mut ulev: Vec<Vec<usize>> = vec![Vec::new(); n];

    const ABSENT: usize = usize::MAX;
    let mut w = vec![0.0; n];
    let mut lev = vec![ABSENT; n];
    let mut pattern: Vec<usize> = Vec::new();

    for i in 0..n {
        pattern.clear();
        let (cols, vals) = a.row(i);
        for (&j, &v) in cols.iter().zip(vals) {
            w[j] = v;
            lev[j] = 0;
            pattern.push(j);
        }
        if lev[i] == ABSENT {
            w[i] = 0.0;
            lev[i] = 0;
            pattern.push(i);
        }
        pattern.sort_unstable();

        let mut idx = 0;
        while idx < pattern.len() && pattern[idx] < i {
            let k = pattern[idx];
            let lik = w[k] / guarded(rows.diag[k], k);
            w[k] = lik;
            for (pos, &j) in rows.ucols[k].iter().enumerate() {
                let ukj = rows.uvals[k][pos];
                let newlev = lev[k] + ulev[k][pos] + 1;
                if lev[j] != ABSENT {
                    w[j] -= lik * ukj;
                    lev[j] = lev[j].min(newlev);
                } else if newlev <= lfil {
                    w[j] = -lik * ukj;
                    lev[j] = newlev;
                    let at = pattern.partition_point(|&c| c < j);
                    pattern.insert(at, j);
                }
            }
            idx += 1;
        }

        for &j in &pattern {
            match j.cmp(&i) {
                std::cmp::Ordering::Less => {
                    rows.lcols[i].push(j);
                    rows.lvals[i].push(w[j]);
                }
                std::cmp::Ordering::Equal => rows.diag[i] = w[i],
                std::cmp::Ordering::Greater => {
                    rows.ucols[i].push(j);
                    rows.uvals[i].push(w[j]);
                    ulev[i].push(lev[j]);
                }
            }
            w[j] = 0.0;
            lev[j] = ABSENT;
        }
    }

    Ok(rows.pack())
}

/// Dual-threshold ILUT: entries below `droptol` times the row's mean
/// magnitude are dropped, then at most `lfil` entries are kept in each of
/// the L and U halves (the diagonal always survives). `relax` times the
/// dropped mass is folded back into the diagonal, MILU-style.
pub fn ilut(a: &CsrMatrix, lfil: usize, droptol: Real, relax: Real) -> Result<IluData, SolverError> {
    use crate::core::traits::Indexing;
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "ILU needs a square matrix");

    let mut rows = RowsBuf::new(n);

    const ABSENT: usize = usize::MAX;
    let mut w = vec![0.0; n];
    let mut present = vec![ABSENT; n];
    let mut pattern: Vec<usize> = Vec::new();

    for i in 0..n {
        pattern.clear();
        let (cols, vals) = a.row(i);
        let tnorm: Real =
            vals.iter().map(|v| v.abs()).sum::<Real>() / (cols.len().max(1) as Real);
        let tol_i = droptol * tnorm;

        for (&j, &v) in cols.iter().zip(vals) {
            w[j] = v;
            present[j] = i;
            pattern.push(j);
        }
        if present[i] != i {
            w[i] = 0.0;
            present[i] = i;
            pattern.push(i);
        }
        pattern.sort_unstable();

        let mut idx = 0;
        while idx < pattern.len() && pattern[idx] < i {
            let k = pattern[idx];
            let lik = w[k] / guarded(rows.diag[k], k);
            if lik.abs() <= tol_i {
                w[k] = 0.0;
                idx += 1;
                continue;
            }
            w[k] = lik;
            for (pos, &j) in rows.ucols[k].iter().enumerate() {
                let upd = lik * rows.uvals[k][pos];
                if present[j] == i {
                    w[j] -= upd;
                } else {
                    w[j] = -upd;
                    present[j] = i;
                    let at = pattern.partition_point(|&c| c < j);
                    pattern.insert(at, j);
                }
            }
            idx += 1;
        }

        // split, drop by magnitude, keep the lfil largest per half
        let mut lpart: Vec<(usize, Real)> = Vec::new();
        let mut upart: Vec<(usize, Real)> = Vec::new();
        let mut dropped = 0.0;
        for &j in &pattern {
            let v = w[j];
            match j.cmp(&i) {
                std::cmp::Ordering::Equal => rows.diag[i] = v,
                std::cmp::Ordering::Less if v != 0.0 && v.abs() > tol_i => lpart.push((j, v)),
                std::cmp::Ordering::Greater if v.abs() > tol_i => upart.push((j, v)),
                _ => dropped += v,
            }
            w[j] = 0.0;
        }
        for part in [&mut lpart, &mut upart] {
            if part.len() > lfil {
                part.sort_unstable_by(|x, y| y.1.abs().total_cmp(&x.1.abs()));
                for &(_, v) in &part[lfil..] {
                    dropped += v;
                }
                part.truncate(lfil);
            }
            part.sort_unstable_by_key(|&(j, _)| j);
        }
        rows.diag[i] += relax * dropped;
        for (j, v) in lpart {
            rows.lcols[i].push(j);
            rows.lvals[i].push(v);
        }
        for (j, v) in upart {
            rows.ucols[i].push(j);
            rows.uvals[i].push(v);
        }
    }

    Ok(rows.pack())
}

/// Block ILU(0) on a BSR matrix: the block sparsity pattern of `A`, with
/// `L_ik = A_ik U_kk^-1` and tile updates through the small dense kernels.
pub fn bsr_ilu0(a: &BsrMatrix) -> Result<IluData, SolverError> {
    let n = a.nrowb;
    assert_eq!(n, a.ncolb, "ILU needs a square matrix");
    let nb = a.nb;
    let nb2 = nb * nb;

    // tiles of each processed row, keyed by sorted column lists
    let mut lcols: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut lvals: Vec<Vec<Real>> = vec![Vec::new(); n];
    let mut ucols: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut uvals: Vec<Vec<Real>> = vec![Vec::new(); n];
    let mut diag = vec![0.0; n * nb2];

    const ABSENT: usize = usize::MAX;
    let mut slot = vec![ABSENT; n];
    let mut w: Vec<Real> = Vec::new();
    let mut pattern: Vec<usize> = Vec::new();
    let mut tmp = vec![0.0; nb2];
    let mut dinv = vec![0.0; nb2];

    for i in 0..n {
        pattern.clear();
        w.clear();
        let (bcols, btiles) = a.block_row(i);
        for (q, &j) in bcols.iter().enumerate() {
            slot[j] = pattern.len();
            pattern.push(j);
            w.extend_from_slice(&btiles[q * nb2..(q + 1) * nb2]);
        }
        if slot[i] == ABSENT {
            slot[i] = pattern.len();
            pattern.push(i);
            w.extend(std::iter::repeat(0.0).take(nb2));
        }
        let mut order: Vec<usize> = pattern.clone();
        order.sort_unstable();

        for &k in order.iter().take_while(|&&k| k < i) {
            let sk = slot[k];
            // L_ik = A_ik * U_kk^-1
            dinv.copy_from_slice(&diag[k * nb2..(k + 1) * nb2]);
            let _ = smat::inv(&mut dinv, nb);
            smat::mul(&w[sk * nb2..(sk + 1) * nb2], &dinv, &mut tmp, nb);
            w[sk * nb2..(sk + 1) * nb2].copy_from_slice(&tmp);
            let lik = tmp.clone();
            for (pos, &j) in ucols[k].iter().enumerate() {
                if slot[j] != ABSENT {
                    let sj = slot[j];
                    smat::mul(&lik, &uvals[k][pos * nb2..(pos + 1) * nb2], &mut tmp, nb);
                    for (d, &s) in w[sj * nb2..(sj + 1) * nb2].iter_mut().zip(&tmp) {
                        *d -= s;
                    }
                }
            }
        }

        for &j in &order {
            let sj = slot[j];
            let tile = &w[sj * nb2..(sj + 1) * nb2];
            match j.cmp(&i) {
                std::cmp::Ordering::Less => {
                    lcols[i].push(j);
                    lvals[i].extend_from_slice(tile);
                }
                std::cmp::Ordering::Equal => diag[i * nb2..(i + 1) * nb2].copy_from_slice(tile),
                std::cmp::Ordering::Greater => {
                    ucols[i].push(j);
                    uvals[i].extend_from_slice(tile);
                }
            }
        }
        for &j in &pattern {
            slot[j] = ABSENT;
        }
    }

    // pack into the fused layout with inverted diagonal tiles
    let noff: usize =
        lcols.iter().map(Vec::len).sum::<usize>() + ucols.iter().map(Vec::len).sum::<usize>();
    let mut ijlu = vec![0usize; n + 1 + noff];
    let mut uptr = vec![0usize; n];
    let mut luval = vec![0.0; (n + 1 + noff) * nb2];
    let mut pos = n + 1;
    for i in 0..n {
        ijlu[i] = pos;
        for (q, &j) in lcols[i].iter().enumerate() {
            ijlu[pos] = j;
            luval[pos * nb2..(pos + 1) * nb2].copy_from_slice(&lvals[i][q * nb2..(q + 1) * nb2]);
            pos += 1;
        }
        uptr[i] = pos;
        for (q, &j) in ucols[i].iter().enumerate() {
            ijlu[pos] = j;
            luval[pos * nb2..(pos + 1) * nb2].copy_from_slice(&uvals[i][q * nb2..(q + 1) * nb2]);
            pos += 1;
        }
        let dst = &mut luval[i * nb2..(i + 1) * nb2];
        dst.copy_from_slice(&diag[i * nb2..(i + 1) * nb2]);
        let _ = smat::inv(dst, nb);
    }
    ijlu[n] = pos;

    Ok(IluData { n, nb, nzlu: n + noff, ijlu, uptr, luval })
}

/// ILU preconditioner: `z = U^-1 L^-1 r` from the stored factor.
pub struct IluPc {
    pub data: IluData,
}

impl IluPc {
    pub fn new(a: &CsrMatrix, param: &IluParam) -> Result<Self, SolverError> {
        Ok(Self { data: IluData::setup(a, param)? })
    }

    pub fn from_bsr(a: &BsrMatrix) -> Result<Self, SolverError> {
        Ok(Self { data: bsr_ilu0(a)? })
    }
}

impl Preconditioner for IluPc {
    fn apply(&mut self, r: &[Real], z: &mut [Real]) -> Result<(), SolverError> {
        self.data.solve(r, z);
        Ok(())
    }
}
