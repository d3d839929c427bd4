//! General factorization based on the Woodbury identity.
//!
//! For an internal node with children `L`, `R` the matrix splits as
//!
//! ```text
//! A = [ A_L        U₀ V₀ᵀ ]  =  D + Ū V̄ᵀ,   Ū = [ U₀  0  ],   V̄ᵀ = [ 0    V₀ᵀ ]
//!     [ U₁ V₁ᵀ     A_R    ]                    [ 0   U₁ ]          [ V₁ᵀ  0   ]
//! ```
//!
//! with `D = blockdiag(A_L, A_R)`. Given solvers for the children, the node stores
//! `W_L = A_L⁻¹ U₀`, `W_R = A_R⁻¹ U₁` and an LU decomposition of the correction matrix
//!
//! ```text
//! S = I + V̄ᵀ D⁻¹ Ū = [ I         V₀ᵀ W_R ]
//!                    [ V₁ᵀ W_L   I       ]
//! ```
//!
//! whose dimension is the total rank `r₀ + r₁` of the coupling. A solve then reads
//! `A⁻¹ b = z − blockdiag(W_L, W_R) S⁻¹ V̄ᵀ z` with `z = D⁻¹ b`, and by the matrix determinant
//! lemma `det A = det A_L · det A_R · det S`.

use super::{NodeStates, factorize_bottom_up};
use crate::{
    config::Parallelism,
    error::{HodlrError, HodlrErrorKind},
    tree::{NodeKind, PartitionTree},
};
use faer::{
    Accum, Mat, MatMut, MatRef, Par,
    linalg::{
        matmul::matmul,
        solvers::{PartialPivLu, Solve},
    },
};

/// Sign and logarithm of the absolute value of a determinant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignedLogDet {
    pub sign: f64,
    pub log_abs: f64,
}

impl SignedLogDet {
    const ONE: Self = Self {
        sign: 1.0,
        log_abs: 0.0,
    };

    fn mul(self, other: Self) -> Self {
        Self {
            sign: self.sign * other.sign,
            log_abs: self.log_abs + other.log_abs,
        }
    }
}

enum WoodburyNode {
    Leaf {
        lu: PartialPivLu<f64>,
        det: SignedLogDet,
    },
    Internal {
        w_left: Mat<f64>,
        w_right: Mat<f64>,
        /// Absent when the coupling has rank zero.
        correction: Option<PartialPivLu<f64>>,
        det: SignedLogDet,
    },
}

impl WoodburyNode {
    fn det(&self) -> SignedLogDet {
        match self {
            Self::Leaf { det, .. } | Self::Internal { det, .. } => *det,
        }
    }
}

/// Sign of the permutation given by its forward index array.
fn permutation_sign(forward: &[usize]) -> f64 {
    let mut visited = vec![false; forward.len()];
    let mut transpositions = 0;
    for start in 0..forward.len() {
        if visited[start] {
            continue;
        }
        let mut len = 0;
        let mut k = start;
        while !visited[k] {
            visited[k] = true;
            k = forward[k];
            len += 1;
        }
        transpositions += len - 1;
    }
    if transpositions % 2 == 0 { 1.0 } else { -1.0 }
}

/// LU-factorizes `block` and rejects it when a pivot is negligible relative to the largest.
///
/// `start` and `size` identify the node for error reporting.
fn checked_lu(
    block: MatRef<'_, f64>,
    start: usize,
    size: usize,
) -> Result<(PartialPivLu<f64>, SignedLogDet), HodlrError> {
    let n = block.nrows();
    let lu = block.partial_piv_lu();
    let u = lu.U();
    let largest = (0..n).map(|k| u[(k, k)].abs()).fold(0.0, f64::max);
    let threshold = n as f64 * f64::EPSILON * largest;
    if n > 0 && (largest == 0.0 || (0..n).any(|k| u[(k, k)].abs() <= threshold)) {
        return Err(HodlrErrorKind::SingularBlock { start, size }.into());
    }

    let mut det = SignedLogDet {
        sign: permutation_sign(lu.P().arrays().0),
        log_abs: 0.0,
    };
    for k in 0..n {
        let pivot = u[(k, k)];
        det.sign *= pivot.signum();
        det.log_abs += pivot.abs().ln();
    }
    Ok((lu, det))
}

/// The factorized state of a non-symmetric (or symmetric indefinite) HODLR matrix.
pub struct WoodburyFactorization {
    states: NodeStates<WoodburyNode>,
    det: SignedLogDet,
}

impl WoodburyFactorization {
    pub fn new(tree: &PartitionTree, parallelism: Parallelism) -> Result<Self, HodlrError> {
        let states = factorize_bottom_up(tree, parallelism, |states, idx| {
            factor_node(tree, states, idx)
        })?;
        let det = states
            .iter()
            .fold(SignedLogDet::ONE, |acc, node| acc.mul(node.det()));
        Ok(Self { states, det })
    }

    /// Sign and `log|det A|`.
    pub fn determinant(&self) -> SignedLogDet {
        self.det
    }

    /// Overwrites `rhs` (with `N` rows) by `A⁻¹ rhs`.
    pub fn solve_in_place(
        &self,
        tree: &PartitionTree,
        rhs: MatMut<'_, f64>,
    ) -> Result<(), HodlrError> {
        solve_subtree(tree, &self.states, PartitionTree::ROOT, rhs)
    }
}

fn factor_node(
    tree: &PartitionTree,
    states: &NodeStates<WoodburyNode>,
    idx: usize,
) -> Result<WoodburyNode, HodlrError> {
    let node = tree.node(idx);
    match &node.kind {
        NodeKind::Leaf { dense } => {
            let (lu, det) = checked_lu(dense.as_ref(), node.start, node.size)?;
            Ok(WoodburyNode::Leaf { lu, det })
        }
        NodeKind::Internal { children, coupling } => {
            let (u0, v0) = coupling.upper();
            let (u1, v1) = coupling.lower();
            let (r0, r1) = (u0.ncols(), u1.ncols());

            let mut w_left = u0.to_owned();
            solve_subtree(tree, states, children[0], w_left.as_mut())?;
            let mut w_right = u1.to_owned();
            solve_subtree(tree, states, children[1], w_right.as_mut())?;

            let rank = r0 + r1;
            if rank == 0 {
                return Ok(WoodburyNode::Internal {
                    w_left,
                    w_right,
                    correction: None,
                    det: SignedLogDet::ONE,
                });
            }

            let mut s = Mat::<f64>::identity(rank, rank);
            matmul(
                s.as_mut().submatrix_mut(0, r0, r0, r1),
                Accum::Replace,
                v0.transpose(),
                w_right.as_ref(),
                1.0,
                Par::Seq,
            );
            matmul(
                s.as_mut().submatrix_mut(r0, 0, r1, r0),
                Accum::Replace,
                v1.transpose(),
                w_left.as_ref(),
                1.0,
                Par::Seq,
            );
            let (lu, det) = checked_lu(s.as_ref(), node.start, node.size)?;
            Ok(WoodburyNode::Internal {
                w_left,
                w_right,
                correction: Some(lu),
                det,
            })
        }
    }
}

/// Overwrites `rhs` by `A_idx⁻¹ rhs`, where `A_idx` is the diagonal block of node `idx`.
fn solve_subtree(
    tree: &PartitionTree,
    states: &NodeStates<WoodburyNode>,
    idx: usize,
    mut rhs: MatMut<'_, f64>,
) -> Result<(), HodlrError> {
    let node = tree.node(idx);
    match (&node.kind, states.get(idx)?) {
        (NodeKind::Leaf { .. }, WoodburyNode::Leaf { lu, .. }) => {
            lu.solve_in_place(rhs.as_mut());
            Ok(())
        }
        (
            NodeKind::Internal { children, coupling },
            WoodburyNode::Internal {
                w_left,
                w_right,
                correction,
                ..
            },
        ) => {
            let left_size = tree.node(children[0]).size;
            let (mut top, mut bottom) = rhs.split_at_row_mut(left_size);
            solve_subtree(tree, states, children[0], top.as_mut())?;
            solve_subtree(tree, states, children[1], bottom.as_mut())?;

            let Some(correction) = correction else {
                return Ok(());
            };
            let (_, v0) = coupling.upper();
            let (_, v1) = coupling.lower();
            let (r0, r1) = (v0.ncols(), v1.ncols());

            let mut t = Mat::<f64>::zeros(r0 + r1, top.ncols());
            matmul(
                t.as_mut().subrows_mut(0, r0),
                Accum::Replace,
                v0.transpose(),
                bottom.as_ref(),
                1.0,
                Par::Seq,
            );
            matmul(
                t.as_mut().subrows_mut(r0, r1),
                Accum::Replace,
                v1.transpose(),
                top.as_ref(),
                1.0,
                Par::Seq,
            );
            correction.solve_in_place(t.as_mut());

            matmul(
                top.as_mut(),
                Accum::Add,
                w_left.as_ref(),
                t.as_ref().subrows(0, r0),
                -1.0,
                Par::Seq,
            );
            matmul(
                bottom.as_mut(),
                Accum::Add,
                w_right.as_ref(),
                t.as_ref().subrows(r0, r1),
                -1.0,
                Par::Seq,
            );
            Ok(())
        }
        _ => Err(HodlrErrorKind::NotFactorized.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::{LowRankMethod, Truncation},
        config::HodlrConfig,
    };
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn assemble(a: &Mat<f64>, leaf_size: usize, symmetric: bool) -> PartitionTree {
        let config = HodlrConfig::new(a.nrows(), leaf_size, 1e-12);
        PartitionTree::assemble(
            a,
            &config,
            LowRankMethod::Svd,
            Truncation::Tolerance(1e-12),
            symmetric,
        )
        .unwrap()
    }

    fn test_matrix(n: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Mat::from_fn(n, n, |_, _| rng.random::<f64>() - 0.5);
        Mat::from_fn(n, n, |i, j| {
            let smooth = 1.0 / (1.0 + (i as f64 - j as f64).abs());
            if i == j { n as f64 } else { smooth + 1e-3 * noise[(i, j)] }
        })
    }

    #[test]
    fn test_permutation_sign() {
        assert_eq!(permutation_sign(&[0, 1, 2]), 1.0);
        assert_eq!(permutation_sign(&[1, 0, 2]), -1.0);
        assert_eq!(permutation_sign(&[1, 2, 0]), 1.0);
        assert_eq!(permutation_sign(&[3, 2, 1, 0]), 1.0);
    }

    #[test]
    fn test_solve_inverts_dense_matrix() {
        let n = 150;
        let a = test_matrix(n, 1);
        let tree = assemble(&a, 20, false);
        let factorization = WoodburyFactorization::new(&tree, Parallelism::Rayon).unwrap();

        let mut rng = StdRng::seed_from_u64(2);
        let x = Mat::from_fn(n, 2, |_, _| rng.random::<f64>());
        let mut b = &a * &x;
        factorization.solve_in_place(&tree, b.as_mut()).unwrap();
        assert!((&b - &x).norm_l2() / x.norm_l2() < 1e-8);
    }

    #[test]
    fn test_determinant_matches_dense_lu() {
        let n = 64;
        // Negative diagonal entries make the sign non-trivial.
        let a = Mat::from_fn(n, n, |i, j| {
            if i == j {
                if i % 3 == 0 { -10.0 } else { 10.0 }
            } else {
                1.0 / (1.0 + (i as f64 - j as f64).powi(2))
            }
        });
        let tree = assemble(&a, 8, false);
        let det = WoodburyFactorization::new(&tree, Parallelism::Sequential)
            .unwrap()
            .determinant();

        let (_, expected) = checked_lu(a.as_ref(), 0, n).unwrap();
        assert_eq!(det.sign, expected.sign);
        assert!((det.log_abs - expected.log_abs).abs() < 1e-8 * expected.log_abs.abs());
    }

    #[test]
    fn test_singular_leaf_is_reported() {
        let n = 40;
        let a = Mat::from_fn(n, n, |i, j| {
            // Rows 10 and 11 are identical inside the second leaf.
            let i = if i == 11 { 10 } else { i };
            if i == j { 5.0 } else { 0.1 }
        });
        let tree = assemble(&a, 10, false);
        let err = WoodburyFactorization::new(&tree, Parallelism::Sequential)
            .err()
            .unwrap();
        assert_eq!(
            err.kind(),
            &HodlrErrorKind::SingularBlock {
                start: 10,
                size: 10
            }
        );
    }
}
