//! Adaptive cross approximation (ACA).
//!
//! ACA builds `block ≈ Σ u_k v_kᵀ` one rank-1 "cross" at a time. Each step picks a pivot
//! `(i, j)` where the residual `R_k = block − Σ_{l<k} u_l v_lᵀ` is large, takes residual row
//! `i` and residual column `j`, and adds `u_k = R_k[:, j] / R_k[i, j]`, `v_k = R_k[i, :]ᵀ`.
//! The block is only ever read one row, one column or one entry at a time, and the factors
//! grow one column per cross.
//!
//! The two variants differ in how the pivot is found:
//!
//! - [`rook_pivoting`]: starting from a row, alternate between the largest residual entry in
//!   the current row and the largest in the current column until an entry is maximal in both.
//!   Iteration stops after [`SMALL_CROSSES`] consecutive crosses with
//!   `‖u_k‖ ‖v_k‖ ≤ tolerance · ‖A_k‖_F`, provided a spread of [`SAMPLE_ROWS`] remaining rows
//!   shows no residual entry above the same bound.
//! - [`queen_pivoting`]: every step scans the residual of all remaining rows and pivots on
//!   the global maximum. The scan also yields the exact residual norm, so iteration stops
//!   once `‖R_k‖_F ≤ tolerance · ‖block‖_F`. Each step costs a pass over the whole block.

use super::LowRank;
use crate::matrix::BlockView;
use faer::Mat;

/// Consecutive small crosses required before rook pivoting considers stopping.
pub const SMALL_CROSSES: usize = 3;

/// Remaining rows sampled before rook pivoting stops.
pub const SAMPLE_ROWS: usize = 8;

/// Rank-1 cross selected by a pivot search.
struct Pivot {
    i: usize,
    j: usize,
    row: Vec<f64>,
    column: Vec<f64>,
}

/// Running state of a cross approximation.
struct CrossApproximation<'a> {
    block: BlockView<'a>,
    /// Columns `u_k`, each of length `nrows`.
    u: Vec<Vec<f64>>,
    /// Columns `v_k`, each of length `ncols`.
    v: Vec<Vec<f64>>,
    unused_rows: Vec<bool>,
    unused_columns: Vec<bool>,
    /// Squared Frobenius norm of the current approximation.
    norm_sq: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl<'a> CrossApproximation<'a> {
    fn new(block: BlockView<'a>) -> Self {
        let (nrows, ncols) = (block.nrows(), block.ncols());
        Self {
            block,
            u: Vec::new(),
            v: Vec::new(),
            unused_rows: vec![true; nrows],
            unused_columns: vec![true; ncols],
            norm_sq: 0.0,
        }
    }

    fn rank(&self) -> usize {
        self.u.len()
    }

    fn is_full(&self) -> bool {
        self.rank() == self.block.nrows().min(self.block.ncols())
    }

    fn residual_row(&self, i: usize) -> Vec<f64> {
        let mut row: Vec<f64> = self.block.row(i).row(0).iter().copied().collect();
        for (u_l, v_l) in self.u.iter().zip(&self.v) {
            let scale = u_l[i];
            for (value, v) in row.iter_mut().zip(v_l) {
                *value -= scale * v;
            }
        }
        row
    }

    fn residual_column(&self, j: usize) -> Vec<f64> {
        let mut column: Vec<f64> = self.block.column(j).col(0).iter().copied().collect();
        for (u_l, v_l) in self.u.iter().zip(&self.v) {
            let scale = v_l[j];
            for (value, u) in column.iter_mut().zip(u_l) {
                *value -= scale * u;
            }
        }
        column
    }

    fn first_unused_row(&self) -> Option<usize> {
        self.unused_rows.iter().position(|&unused| unused)
    }

    /// Marks row `i` as exhausted and returns the next candidate row, if any.
    fn retire_row(&mut self, i: usize) -> Option<usize> {
        self.unused_rows[i] = false;
        self.first_unused_row()
    }

    /// Appends the cross of `pivot` and returns `‖u_k‖ ‖v_k‖`.
    fn push(&mut self, pivot: &Pivot) -> f64 {
        let scale = 1.0 / pivot.row[pivot.j];
        let u_k: Vec<f64> = pivot.column.iter().map(|value| value * scale).collect();
        let v_k = pivot.row.clone();
        self.unused_rows[pivot.i] = false;
        self.unused_columns[pivot.j] = false;

        // ‖A_k‖² = ‖A_{k-1}‖² + 2 Σ_l (u_lᵀu_k)(v_lᵀv_k) + ‖u_k‖²‖v_k‖²
        let cross_terms: f64 = self
            .u
            .iter()
            .zip(&self.v)
            .map(|(u_l, v_l)| dot(u_l, &u_k) * dot(v_l, &v_k))
            .sum();
        let norm_u = dot(&u_k, &u_k).sqrt();
        let norm_v = dot(&v_k, &v_k).sqrt();
        self.norm_sq += 2.0 * cross_terms + (norm_u * norm_v).powi(2);
        self.u.push(u_k);
        self.v.push(v_k);
        norm_u * norm_v
    }

    /// Row to continue from: where `column` is largest, else the first unused row.
    fn next_row(&self, column: &[f64]) -> Option<usize> {
        argmax_masked(column, &self.unused_rows)
            .filter(|&(_, value)| value > 0.0)
            .map(|(i, _)| i)
            .or_else(|| self.first_unused_row())
    }

    /// First row, among up to [`SAMPLE_ROWS`] evenly spread unused rows, with a residual entry
    /// above `threshold`.
    fn sampled_row_above(&self, threshold: f64) -> Option<usize> {
        let unused: Vec<usize> = (0..self.unused_rows.len())
            .filter(|&i| self.unused_rows[i])
            .collect();
        if unused.is_empty() {
            return None;
        }
        let step = unused.len().div_ceil(SAMPLE_ROWS);
        unused.into_iter().step_by(step).find(|&i| {
            let row = self.residual_row(i);
            argmax_masked(&row, &self.unused_columns).is_some_and(|(_, value)| value > threshold)
        })
    }

    fn into_factors(self) -> LowRank {
        let k = self.rank();
        LowRank {
            u: Mat::from_fn(self.block.nrows(), k, |r, l| self.u[l][r]),
            v: Mat::from_fn(self.block.ncols(), k, |c, l| self.v[l][c]),
        }
    }
}

/// Index and absolute value of the largest-magnitude entry of `data` among positions where
/// `mask` is `true`.
fn argmax_masked(data: &[f64], mask: &[bool]) -> Option<(usize, f64)> {
    data.iter()
        .zip(mask)
        .enumerate()
        .filter(|(_, (_, unused))| **unused)
        .map(|(idx, (value, _))| (idx, value.abs()))
        .fold(None, |best, (idx, value)| match best {
            Some((_, best_value)) if best_value >= value => best,
            _ => Some((idx, value)),
        })
}

/// Finds a row with a nonzero residual, starting at `start`, and its largest entry.
fn nonzero_row(
    cross: &mut CrossApproximation<'_>,
    start: usize,
) -> Option<(usize, usize, Vec<f64>)> {
    let mut i = start;
    loop {
        let row = cross.residual_row(i);
        match argmax_masked(&row, &cross.unused_columns) {
            Some((j, value)) if value > 0.0 => return Some((i, j, row)),
            _ => i = cross.retire_row(i)?,
        }
    }
}

/// Rook search from row `start`.
fn rook_pivot(cross: &mut CrossApproximation<'_>, start: usize) -> Option<Pivot> {
    let max_moves = cross.block.nrows() + cross.block.ncols();
    let (mut i, mut j, mut row) = nonzero_row(cross, start)?;
    let mut moves = 0;
    loop {
        let column = cross.residual_column(j);
        let current = row[j].abs();
        match argmax_masked(&column, &cross.unused_rows) {
            Some((i_best, value)) if value > current && moves < max_moves => {
                // Move along the column, then re-pick the column within the new row.
                i = i_best;
                row = cross.residual_row(i);
                if let Some((j_best, _)) = argmax_masked(&row, &cross.unused_columns) {
                    j = j_best;
                }
                moves += 1;
            }
            _ => return Some(Pivot { i, j, row, column }),
        }
    }
}

/// Adaptive cross approximation with rook pivoting.
pub fn rook_pivoting(block: &BlockView<'_>, tolerance: f64) -> LowRank {
    let mut cross = CrossApproximation::new(*block);
    let mut next_row = Some(0);
    let mut small = 0;
    while let Some(start) = next_row {
        if cross.is_full() {
            break;
        }
        let Some(pivot) = rook_pivot(&mut cross, start) else {
            // Every remaining row has a zero residual.
            break;
        };
        let norm_uv = cross.push(&pivot);
        let threshold = tolerance * cross.norm_sq.sqrt();
        next_row = cross.next_row(&pivot.column);
        if norm_uv > threshold {
            small = 0;
            continue;
        }
        small += 1;
        if small >= SMALL_CROSSES {
            small = 0;
            next_row = cross.sampled_row_above(threshold);
        }
    }
    cross.into_factors()
}

/// Adaptive cross approximation with queen pivoting.
pub fn queen_pivoting(block: &BlockView<'_>, tolerance: f64) -> LowRank {
    let mut cross = CrossApproximation::new(*block);
    let mut block_norm = None;
    while !cross.is_full() {
        let mut residual_sq = 0.0;
        let mut best: Option<(usize, usize, f64, Vec<f64>)> = None;
        for i in 0..block.nrows() {
            if !cross.unused_rows[i] {
                continue;
            }
            let row = cross.residual_row(i);
            residual_sq += row
                .iter()
                .zip(&cross.unused_columns)
                .filter(|(_, unused)| **unused)
                .map(|(value, _)| value * value)
                .sum::<f64>();
            if let Some((j, value)) = argmax_masked(&row, &cross.unused_columns) {
                if best.as_ref().is_none_or(|b| value > b.2) {
                    best = Some((i, j, value, row));
                }
            }
        }
        let reference = *block_norm.get_or_insert(residual_sq.sqrt());

        match best {
            Some((i, j, value, row))
                if value > 0.0 && residual_sq.sqrt() > tolerance * reference =>
            {
                let column = cross.residual_column(j);
                cross.push(&Pivot { i, j, row, column });
            }
            _ => break,
        }
    }
    cross.into_factors()
}
