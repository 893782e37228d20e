//! Hierarchy construction: coarsen, interpolate, Galerkin triple product,
//! per-level smoother data, coarsest-grid factorization.

use super::coarsening::{coarsen, prolongation_pattern};
use super::data::{AmgHierarchy, AmgLevel, CoarseSolverData};
use super::interp::interpolate;
use crate::config::{AmgParam, CoarseSolverKind, SmootherKind};
use crate::core::traits::Indexing;
use crate::matrix::{csr, CsrMatrix};
use crate::preconditioner::{DiagPc, SchwarzPc};
use crate::{Int, SolverError};

/// Largest coarsest grid the dense direct solver will factor; beyond it
/// the internal iterative solver takes over.
const MAX_DIRECT_COARSE: usize = 2000;

impl AmgHierarchy {
    /// Build the multilevel hierarchy for `A`. Coarsening stops at the
    /// configured coarse size, the level cap, or when a pass yields no new
    /// coarse points; a stall on the finest level leaves a single-level
    /// hierarchy whose cycle degenerates to the coarse solve.
    pub fn setup(a: &CsrMatrix, param: &AmgParam) -> Result<Self, SolverError> {
        assert_eq!(a.nrows(), a.ncols(), "AMG needs a square matrix");
        let mut levels: Vec<AmgLevel> = Vec::new();
        let mut cur = a.clone();

        while cur.nrows() > param.coarse_dof && levels.len() + 1 < param.max_levels {
            let res = match coarsen(&cur, param) {
                Ok(res) => res,
                Err(e) => {
                    if levels.is_empty() {
                        log::warn!("coarsening stalled on the finest level: {e}");
                    }
                    break;
                }
            };
            if res.ncoarse == 0 || res.ncoarse >= cur.nrows() {
                log::debug!(
                    "coarsening made no progress ({} of {} coarse), stopping",
                    res.ncoarse,
                    cur.nrows()
                );
                break;
            }

            let p = interpolate(&cur, &res, prolongation_pattern(&res), param.truncation);
            let r = p.transpose();
            let coarse_a = csr::rap(&r, &cur, &p);
            log::debug!(
                "level {}: {} -> {} unknowns, {} nnz",
                levels.len(),
                cur.nrows(),
                coarse_a.nrows(),
                coarse_a.nnz()
            );

            let mut level = AmgLevel::new(cur);
            level.p = Some(p);
            level.r = Some(r);
            level.cf = res.cf;
            build_smoother_data(&mut level, param)?;
            levels.push(level);
            cur = coarse_a;
        }

        let coarsest = AmgLevel::new(cur);
        let coarse = build_coarse_solver(&coarsest.a, param)?;
        levels.push(coarsest);

        if levels.len() == 1 {
            log::warn!("AMG hierarchy has a single level; cycles reduce to the coarse solve");
        }

        let h = AmgHierarchy { levels, param: param.clone(), coarse };
        h.log_complexity();
        Ok(h)
    }
}

/// Factor or configure whatever the level smoother needs beyond the
/// matrix itself.
fn build_smoother_data(level: &mut AmgLevel, param: &AmgParam) -> Result<(), SolverError> {
    match param.smoother {
        SmootherKind::Ilu => {
            level.ilu = Some(crate::preconditioner::ilu::iluk(&level.a, param.ilu_fill)?);
        }
        SmootherKind::Schwarz => {
            // one block per vertex: the vertex plus its matrix neighbors
            let n = level.a.nrows();
            let blocks: Vec<Vec<usize>> = (0..n)
                .map(|i| {
                    let mut block = vec![i];
                    block.extend(level.a.row(i).0.iter().copied().filter(|&j| j != i));
                    block
                })
                .collect();
            level.schwarz = Some(SchwarzPc::new(&level.a, blocks)?);
        }
        _ => {}
    }
    Ok(())
}

fn build_coarse_solver(a: &CsrMatrix, param: &AmgParam) -> Result<CoarseSolverData, SolverError> {
    let n = a.nrows();
    let use_direct = match param.coarse_solver {
        CoarseSolverKind::DirectLu => {
            if n > MAX_DIRECT_COARSE {
                log::warn!(
                    "coarsest grid has {n} unknowns, too large for the dense factorization; \
                     switching to the iterative coarse solver"
                );
                false
            } else {
                true
            }
        }
        CoarseSolverKind::Iterative => false,
    };

    if use_direct {
        let mut dense = vec![0.0; n * n];
        for (i, j, v) in a.to_coo() {
            dense[i * n + j] = v;
        }
        let mut pivot = vec![0 as Int; n];
        match crate::matrix::smat::lu_decomp(&mut dense, &mut pivot, n) {
            Ok(()) => return Ok(CoarseSolverData::Lu { n, lu: dense, pivot }),
            Err(e) => {
                log::warn!("coarsest-grid factorization failed ({e}); using iterations instead")
            }
        }
    }
    Ok(CoarseSolverData::Iterative { pc: DiagPc::new(a) })
}
