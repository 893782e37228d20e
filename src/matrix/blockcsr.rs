//! Block-structured matrices whose blocks are CSR matrices, the natural
//! layout for coupled saddle-point systems (velocity-pressure and
//! friends). A missing block is an all-zero block.

use crate::core::traits::{Indexing, MatVec};
use crate::matrix::CsrMatrix;
use crate::Real;

#[derive(Clone, Debug)]
pub struct BlockCsrMatrix {
    /// Block rows and columns.
    pub brow: usize,
    pub bcol: usize,
    /// Row-major grid of blocks; `None` is a zero block.
    pub blocks: Vec<Option<CsrMatrix>>,
    /// Scalar offset of each block row, `brow + 1` entries.
    pub row_offsets: Vec<usize>,
    /// Scalar offset of each block column, `bcol + 1` entries.
    pub col_offsets: Vec<usize>,
}

impl BlockCsrMatrix {
    /// Assemble from a row-major grid of optional blocks. Every present
    /// block must agree with its row and column sizes; each block row and
    /// column needs at least one present block to fix its dimension.
    pub fn new(brow: usize, bcol: usize, blocks: Vec<Option<CsrMatrix>>) -> Self {
        assert_eq!(blocks.len(), brow * bcol, "block grid shape");
        let mut row_sizes = vec![usize::MAX; brow];
        let mut col_sizes = vec![usize::MAX; bcol];
        for i in 0..brow {
            for j in 0..bcol {
                if let Some(b) = &blocks[i * bcol + j] {
                    if row_sizes[i] == usize::MAX {
                        row_sizes[i] = b.nrows();
                    } else {
                        assert_eq!(row_sizes[i], b.nrows(), "block row {i} size");
                    }
                    if col_sizes[j] == usize::MAX {
                        col_sizes[j] = b.ncols();
                    } else {
                        assert_eq!(col_sizes[j], b.ncols(), "block column {j} size");
                    }
                }
            }
        }
        assert!(
            row_sizes.iter().chain(&col_sizes).all(|&s| s != usize::MAX),
            "every block row and column needs a present block"
        );
        let mut row_offsets = vec![0usize; brow + 1];
        for i in 0..brow {
            row_offsets[i + 1] = row_offsets[i] + row_sizes[i];
        }
        let mut col_offsets = vec![0usize; bcol + 1];
        for j in 0..bcol {
            col_offsets[j + 1] = col_offsets[j] + col_sizes[j];
        }
        Self { brow, bcol, blocks, row_offsets, col_offsets }
    }

    pub fn block(&self, i: usize, j: usize) -> Option<&CsrMatrix> {
        self.blocks[i * self.bcol + j].as_ref()
    }

    /// Flatten into one CSR matrix.
    pub fn to_csr(&self) -> CsrMatrix {
        let mut triples = Vec::new();
        for i in 0..self.brow {
            for j in 0..self.bcol {
                if let Some(b) = self.block(i, j) {
                    let ro = self.row_offsets[i];
                    let co = self.col_offsets[j];
                    for (r, c, v) in b.to_coo() {
                        triples.push((ro + r, co + c, v));
                    }
                }
            }
        }
        CsrMatrix::from_coo(self.nrows(), self.ncols(), &triples)
    }
}

impl Indexing for BlockCsrMatrix {
    fn nrows(&self) -> usize {
        *self.row_offsets.last().unwrap()
    }
    fn ncols(&self) -> usize {
        *self.col_offsets.last().unwrap()
    }
}

impl MatVec for BlockCsrMatrix {
    fn matvec(&self, x: &[Real], y: &mut [Real]) {
        y.fill(0.0);
        self.aaxpy(1.0, x, y);
    }

    fn aaxpy(&self, alpha: Real, x: &[Real], y: &mut [Real]) {
        assert_eq!(x.len(), self.ncols());
        assert_eq!(y.len(), self.nrows());
        for i in 0..self.brow {
            let ys = &mut y[self.row_offsets[i]..self.row_offsets[i + 1]];
            for j in 0..self.bcol {
                if let Some(b) = self.block(i, j) {
                    let xs = &x[self.col_offsets[j]..self.col_offsets[j + 1]];
                    b.aaxpy(alpha, xs, ys);
                }
            }
        }
    }
}
