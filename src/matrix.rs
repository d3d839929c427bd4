//! This module defines the core abstraction for matrix-entry sources.
//!
//! A HODLR matrix never needs the dense `N x N` matrix it approximates. During assembly it
//! only asks for the entries of leaf blocks and for rows, columns or single entries of the
//! off-diagonal blocks it compresses. Whatever produces those values (a kernel evaluated over
//! a point set, a dense matrix kept around for testing, a closure) is modelled by the
//! [`MatrixSource`] trait, so the engine works on any of them without knowing which.
//!
//! The module also provides [`BlockView`], the lazily-evaluated rectangular window through
//! which the low-rank approximators read an off-diagonal block.

use faer::{Mat, MatRef};

/// A source of matrix entries.
///
/// Implementors only have to provide [`entry`](Self::entry) and the dimensions;
/// [`block`](Self::block) has a default implementation that evaluates entries one by one and
/// can be overridden when whole blocks are cheaper to produce.
///
/// The trait requires `Sync` because assembly evaluates independent blocks from several
/// threads at once.
///
/// # Example
///
/// ```
/// use faer::Mat;
/// use hodlr::matrix::MatrixSource;
///
/// fn trace(source: &impl MatrixSource) -> f64 {
///     (0..source.nrows()).map(|i| source.entry(i, i)).sum()
/// }
///
/// let a = Mat::from_fn(3, 3, |i, j| if i == j { 2.0 } else { 0.5 });
/// assert_eq!(trace(&a), 6.0);
/// ```
pub trait MatrixSource: Sync {
    /// Returns the number of rows of the source.
    fn nrows(&self) -> usize;

    /// Returns the number of columns of the source.
    fn ncols(&self) -> usize;

    /// Returns the entry at row `i`, column `j`.
    fn entry(&self, i: usize, j: usize) -> f64;

    /// Returns the dense `nrows x ncols` block whose top-left corner is `(row_start, col_start)`.
    fn block(&self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Mat<f64> {
        Mat::from_fn(nrows, ncols, |i, j| self.entry(row_start + i, col_start + j))
    }
}

impl MatrixSource for MatRef<'_, f64> {
    #[inline]
    fn nrows(&self) -> usize {
        MatRef::nrows(self)
    }

    #[inline]
    fn ncols(&self) -> usize {
        MatRef::ncols(self)
    }

    #[inline]
    fn entry(&self, i: usize, j: usize) -> f64 {
        self[(i, j)]
    }

    fn block(&self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Mat<f64> {
        self.submatrix(row_start, col_start, nrows, ncols).to_owned()
    }
}

impl MatrixSource for Mat<f64> {
    #[inline]
    fn nrows(&self) -> usize {
        self.as_ref().nrows()
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.as_ref().ncols()
    }

    #[inline]
    fn entry(&self, i: usize, j: usize) -> f64 {
        self[(i, j)]
    }

    fn block(&self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Mat<f64> {
        self.as_ref().block(row_start, col_start, nrows, ncols)
    }
}

/// The unconfigured source: an `N x N` matrix whose every entry is zero.
///
/// Useful as a sanity baseline; assembling over it yields rank-0 couplings everywhere.
#[derive(Clone, Copy, Debug)]
pub struct ZeroMatrix {
    size: usize,
}

impl ZeroMatrix {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl MatrixSource for ZeroMatrix {
    fn nrows(&self) -> usize {
        self.size
    }

    fn ncols(&self) -> usize {
        self.size
    }

    fn entry(&self, _i: usize, _j: usize) -> f64 {
        0.0
    }

    fn block(&self, _row_start: usize, _col_start: usize, nrows: usize, ncols: usize) -> Mat<f64> {
        Mat::zeros(nrows, ncols)
    }
}

/// A square source whose entries come from a closure `f(i, j)`.
pub struct FnMatrix<F> {
    size: usize,
    f: F,
}

impl<F> FnMatrix<F>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    pub fn new(size: usize, f: F) -> Self {
        Self { size, f }
    }
}

impl<F> MatrixSource for FnMatrix<F>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    fn nrows(&self) -> usize {
        self.size
    }

    fn ncols(&self) -> usize {
        self.size
    }

    #[inline]
    fn entry(&self, i: usize, j: usize) -> f64 {
        (self.f)(i, j)
    }
}

/// A rectangular window `[row_start, row_start + nrows) x [col_start, col_start + ncols)` of a
/// [`MatrixSource`], addressed with local indices.
///
/// Nothing is evaluated until a row, column, entry or the dense block is requested.
#[derive(Clone, Copy)]
pub struct BlockView<'a> {
    source: &'a dyn MatrixSource,
    row_start: usize,
    col_start: usize,
    nrows: usize,
    ncols: usize,
}

impl<'a> BlockView<'a> {
    pub fn new(
        source: &'a dyn MatrixSource,
        row_start: usize,
        col_start: usize,
        nrows: usize,
        ncols: usize,
    ) -> Self {
        debug_assert!(row_start + nrows <= source.nrows());
        debug_assert!(col_start + ncols <= source.ncols());
        Self {
            source,
            row_start,
            col_start,
            nrows,
            ncols,
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Global row index of the window's first row.
    #[inline]
    pub fn row_start(&self) -> usize {
        self.row_start
    }

    /// Global column index of the window's first column.
    #[inline]
    pub fn col_start(&self) -> usize {
        self.col_start
    }

    #[inline]
    pub fn entry(&self, i: usize, j: usize) -> f64 {
        self.source.entry(self.row_start + i, self.col_start + j)
    }

    /// Local row `i` as a `1 x ncols` matrix.
    pub fn row(&self, i: usize) -> Mat<f64> {
        self.source
            .block(self.row_start + i, self.col_start, 1, self.ncols)
    }

    /// Local column `j` as an `nrows x 1` matrix.
    pub fn column(&self, j: usize) -> Mat<f64> {
        self.source
            .block(self.row_start, self.col_start + j, self.nrows, 1)
    }

    /// The whole window as a dense matrix.
    pub fn dense(&self) -> Mat<f64> {
        self.source
            .block(self.row_start, self.col_start, self.nrows, self.ncols)
    }
}
