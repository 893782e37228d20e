//! Smoothers on structured-grid matrices.
//!
//! With `nc > 1` every grid node is an `nc x nc` block and the diagonal
//! inverse is applied blockwise through the small dense kernels.

use super::{CfFirst, SweepOrder};
use crate::consts::SMALL_REAL;
use crate::core::traits::MatVec;
use crate::matrix::{smat, StrMatrix};
use crate::{Int, Real};

/// Invert every diagonal tile of `A` up front. Scalar grids get guarded
/// scalar inverses; singular tiles are reported and guarded inside
/// [`smat::inv`].
pub fn block_diag_inv(a: &StrMatrix) -> Vec<Real> {
    let nc = a.nc;
    let mut inv = a.diag.clone();
    if nc == 1 {
        for (i, d) in inv.iter_mut().enumerate() {
            if d.abs() < SMALL_REAL {
                log::warn!("zero diagonal at node {i}, substituting {SMALL_REAL:e}");
                *d = SMALL_REAL;
            }
            *d = 1.0 / *d;
        }
    } else {
        let nc2 = nc * nc;
        for i in 0..a.ngrid {
            let _ = smat::inv(&mut inv[i * nc2..(i + 1) * nc2], nc);
        }
    }
    inv
}

/// Gather `b_node - sum_bands A_node,col * u_col` into `rhs`.
#[inline]
fn gather_rhs(a: &StrMatrix, b: &[Real], u: &[Real], point: usize, rhs: &mut [Real]) {
    let nc = a.nc;
    rhs.copy_from_slice(&b[point * nc..(point + 1) * nc]);
    for (band, &w) in a.offsets.iter().enumerate() {
        let column = point as i64 + w as i64;
        if column < 0 || column >= a.ngrid as i64 {
            continue;
        }
        let column = column as usize;
        let slot = if w < 0 { column } else { point };
        if nc == 1 {
            rhs[0] -= a.offdiag[band][slot] * u[column];
        } else {
            smat::ymax(a.band_block(band, slot), &u[column * nc..(column + 1) * nc], rhs, nc);
        }
    }
}

#[inline]
fn apply_diag_inv(diaginv: &[Real], nc: usize, point: usize, rhs: &[Real], out: &mut [Real]) {
    if nc == 1 {
        out[0] = diaginv[point] * rhs[0];
    } else {
        let nc2 = nc * nc;
        smat::mxv(&diaginv[point * nc2..(point + 1) * nc2], rhs, out, nc);
    }
}

/// Blockwise Jacobi: every node update uses the previous iterate only.
pub fn jacobi(a: &StrMatrix, b: &[Real], u: &mut [Real], diaginv: &[Real], sweeps: usize) {
    let nc = a.nc;
    let mut uold = vec![0.0; u.len()];
    let mut rhs = vec![0.0; nc];
    for _ in 0..sweeps {
        uold.copy_from_slice(u);
        for point in 0..a.ngrid {
            gather_rhs(a, b, &uold, point, &mut rhs);
            apply_diag_inv(diaginv, nc, point, &rhs, &mut u[point * nc..(point + 1) * nc]);
        }
    }
}

#[inline]
fn relax_node(
    a: &StrMatrix,
    b: &[Real],
    u: &mut [Real],
    diaginv: &[Real],
    point: usize,
    omega: Real,
    rhs: &mut [Real],
    unew: &mut [Real],
) {
    let nc = a.nc;
    gather_rhs(a, b, u, point, rhs);
    apply_diag_inv(diaginv, nc, point, rhs, unew);
    for c in 0..nc {
        let old = u[point * nc + c];
        u[point * nc + c] = (1.0 - omega) * old + omega * unew[c];
    }
}

fn sweep(
    a: &StrMatrix,
    b: &[Real],
    u: &mut [Real],
    diaginv: &[Real],
    order: SweepOrder<'_>,
    omega: Real,
) {
    let nc = a.nc;
    let mut rhs = vec![0.0; nc];
    let mut unew = vec![0.0; nc];
    match order {
        SweepOrder::Ascend => {
            for point in 0..a.ngrid {
                relax_node(a, b, u, diaginv, point, omega, &mut rhs, &mut unew);
            }
        }
        SweepOrder::Descend => {
            for point in (0..a.ngrid).rev() {
                relax_node(a, b, u, diaginv, point, omega, &mut rhs, &mut unew);
            }
        }
        SweepOrder::User(mark) => {
            assert_eq!(mark.len(), a.ngrid, "ordering must cover every node");
            for &p in mark {
                relax_node(a, b, u, diaginv, p as usize, omega, &mut rhs, &mut unew);
            }
        }
        SweepOrder::Cf(cf, first) => {
            assert_eq!(cf.len(), a.ngrid);
            let (first_val, second_val) = match first {
                CfFirst::CThenF => (1, 0),
                CfFirst::FThenC => (0, 1),
            };
            for point in (0..a.ngrid).filter(|&p| cf[p] == first_val) {
                relax_node(a, b, u, diaginv, point, omega, &mut rhs, &mut unew);
            }
            for point in (0..a.ngrid).filter(|&p| cf[p] == second_val) {
                relax_node(a, b, u, diaginv, point, omega, &mut rhs, &mut unew);
            }
        }
    }
}

/// Blockwise Gauss-Seidel in the requested order.
pub fn gauss_seidel(
    a: &StrMatrix,
    b: &[Real],
    u: &mut [Real],
    diaginv: &[Real],
    order: SweepOrder<'_>,
    sweeps: usize,
) {
    for _ in 0..sweeps {
        sweep(a, b, u, diaginv, order, 1.0);
    }
}

/// Blockwise SOR over the same four orderings.
pub fn sor(
    a: &StrMatrix,
    b: &[Real],
    u: &mut [Real],
    diaginv: &[Real],
    omega: Real,
    order: SweepOrder<'_>,
    sweeps: usize,
) {
    for _ in 0..sweeps {
        sweep(a, b, u, diaginv, order, omega);
    }
}

/// Per-node dense subsystems for the block Schwarz smoother, factored once.
pub struct SchwarzBlocks {
    /// Neighbor list, `ngrid * nneigh`, entries `< 0` meaning "absent".
    pub neigh: Vec<Int>,
    /// Slots per node in the neighbor list.
    pub nneigh: usize,
    /// Unknowns in each node's subsystem (`present nodes * nc`).
    pub sizes: Vec<usize>,
    /// LU factors, one per node.
    pub lu: Vec<Vec<Real>>,
    /// Pivots matching the factors.
    pub pivot: Vec<Vec<Int>>,
}

/// Assemble and factor the dense subsystem of every node: the node itself
/// plus the listed neighbors, with all couplings the band structure holds
/// between them. Factorization is LU with partial pivoting.
pub fn build_schwarz_blocks(a: &StrMatrix, neigh: &[Int], nneigh: usize) -> SchwarzBlocks {
    let nc = a.nc;
    let nc2 = nc * nc;
    assert_eq!(neigh.len(), a.ngrid * nneigh, "neighbor list shape");

    let mut sizes = Vec::with_capacity(a.ngrid);
    let mut lus = Vec::with_capacity(a.ngrid);
    let mut pivots = Vec::with_capacity(a.ngrid);

    for i in 0..a.ngrid {
        // nodes of this subsystem: i first, then present neighbors
        let mut nodes = vec![i];
        for l in 0..nneigh {
            let p = neigh[i * nneigh + l];
            if p >= 0 {
                nodes.push(p as usize);
            }
        }
        let bs = nodes.len() * nc;
        let mut block = vec![0.0; bs * bs];

        for (bi, &ni) in nodes.iter().enumerate() {
            // diagonal tile of node ni
            let d = a.diag_block(ni);
            for r in 0..nc {
                for c in 0..nc {
                    block[(bi * nc + r) * bs + bi * nc + c] = d[r * nc + c];
                }
            }
            // couplings (ni, nj) present in the band structure
            for (bj, &nj) in nodes.iter().enumerate() {
                if bi == bj {
                    continue;
                }
                let w = nj as i64 - ni as i64;
                for (band, &off) in a.offsets.iter().enumerate() {
                    if off as i64 == w {
                        let slot = ni.min(nj);
                        let tile = &a.offdiag[band][slot * nc2..(slot + 1) * nc2];
                        for r in 0..nc {
                            for c in 0..nc {
                                block[(bi * nc + r) * bs + bj * nc + c] = tile[r * nc + c];
                            }
                        }
                    }
                }
            }
        }

        let mut piv = vec![0 as Int; bs];
        if let Err(e) = smat::lu_decomp(&mut block, &mut piv, bs) {
            log::warn!("schwarz block at node {i} is singular ({e}); falling back to identity");
            block = (0..bs * bs)
                .map(|k| if k / bs == k % bs { 1.0 } else { 0.0 })
                .collect();
            piv.iter_mut().enumerate().for_each(|(k, p)| *p = k as Int);
        }
        sizes.push(bs);
        lus.push(block);
        pivots.push(piv);
    }

    SchwarzBlocks { neigh: neigh.to_vec(), nneigh, sizes, lu: lus, pivot: pivots }
}

/// Block Schwarz smoother: for each node (natural or user order) solve the
/// factored local subsystem against the current residual, add the local
/// correction, and refresh the residual before the next node.
pub fn schwarz(
    a: &StrMatrix,
    b: &[Real],
    u: &mut [Real],
    blocks: &SchwarzBlocks,
    order: Option<&[Int]>,
    sweeps: usize,
) {
    let nc = a.nc;
    let nneigh = blocks.nneigh;
    let maxbs = blocks.sizes.iter().copied().max().unwrap_or(nc);
    let mut r = vec![0.0; b.len()];
    let mut ri = vec![0.0; maxbs];
    let mut e = vec![0.0; maxbs];

    for _ in 0..sweeps {
        r.copy_from_slice(b);
        a.aaxpy(-1.0, u, &mut r);

        for step in 0..a.ngrid {
            let i = match order {
                Some(ord) => ord[step] as usize,
                None => step,
            };
            let bs = blocks.sizes[i];

            // gather local residual: node i, then its present neighbors
            ri[..nc].copy_from_slice(&r[i * nc..(i + 1) * nc]);
            let mut k = 1;
            for l in 0..nneigh {
                let p = blocks.neigh[i * nneigh + l];
                if p >= 0 {
                    let p = p as usize;
                    ri[k * nc..(k + 1) * nc].copy_from_slice(&r[p * nc..(p + 1) * nc]);
                    k += 1;
                }
            }
            debug_assert_eq!(k * nc, bs);

            smat::lu_solve(&blocks.lu[i], &ri, &blocks.pivot[i], &mut e, bs);

            // scatter the correction
            for c in 0..nc {
                u[i * nc + c] += e[c];
            }
            let mut k = 1;
            for l in 0..nneigh {
                let p = blocks.neigh[i * nneigh + l];
                if p >= 0 {
                    let p = p as usize;
                    for c in 0..nc {
                        u[p * nc + c] += e[k * nc + c];
                    }
                    k += 1;
                }
            }

            // refresh the residual for the next subsystem
            r.copy_from_slice(b);
            a.aaxpy(-1.0, u, &mut r);
        }
    }
}
