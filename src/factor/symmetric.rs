//! Symmetric factorization `A = W Wᵀ` of a symmetric positive-definite HODLR matrix.
//!
//! Leaves hold the Cholesky factor `K = L Lᵀ` of their dense block. For an internal node with
//! children `L`, `R`, coupling `A[L, R] ≈ U Vᵀ` and child factors `W_L`, `W_R`:
//!
//! ```text
//! A = D (I + [ 0      Ũ Ṽᵀ ]) Dᵀ,   D = blockdiag(W_L, W_R),   Ũ = W_L⁻¹ U,   Ṽ = W_R⁻¹ V.
//!            [ Ṽ Ũᵀ   0    ]
//! ```
//!
//! With thin QR decompositions `Ũ = Q₁ R₁`, `Ṽ = Q₂ R₂` and `Q = blockdiag(Q₁, Q₂)`, the inner
//! matrix is `I + Q K Qᵀ` where `K = [[0, R₁R₂ᵀ], [R₂R₁ᵀ, 0]]`. If `Λ Λᵀ = I + K` is a
//! Cholesky factorization of this small matrix, then `G = I + Q (Λ − I) Qᵀ` satisfies
//! `G Gᵀ = I + Q K Qᵀ`, hence `W = D G`. The inverse is `G⁻¹ = I + Q (Λ⁻¹ − I) Qᵀ`.
//!
//! `W`, `Wᵀ`, `W⁻¹` and `W⁻ᵀ` are all applied recursively without ever forming `W`, and
//! `log det A = 2 Σ log diag` over every leaf `L` and every `Λ`.

use super::{NodeStates, factorize_bottom_up};
use crate::{
    config::Parallelism,
    error::{HodlrError, HodlrErrorKind},
    tree::{NodeKind, PartitionTree},
};
use faer::{
    Accum, Mat, MatMut, MatRef, Par, Side,
    linalg::{
        matmul::matmul,
        triangular_solve::{solve_lower_triangular_in_place, solve_upper_triangular_in_place},
    },
};

/// Which transform of the symmetric factor to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactorOp {
    /// `W x`
    Factor,
    /// `Wᵀ x`
    Transpose,
    /// `W⁻¹ x`
    Inverse,
    /// `W⁻ᵀ x`
    InverseTranspose,
}

enum SymmetricNode {
    Leaf {
        l: Mat<f64>,
    },
    Internal {
        q_left: Mat<f64>,
        q_right: Mat<f64>,
        lambda: Mat<f64>,
    },
}

/// Lower-triangular Cholesky factor of `block`, or `NotPositiveDefinite` for node `start..`.
fn cholesky(block: MatRef<'_, f64>, start: usize, size: usize) -> Result<Mat<f64>, HodlrError> {
    let llt = block
        .llt(Side::Lower)
        .map_err(|_| HodlrErrorKind::NotPositiveDefinite { start, size })?;
    let l = llt.L();
    Ok(Mat::from_fn(l.nrows(), l.ncols(), |i, j| {
        if j <= i { l[(i, j)] } else { 0.0 }
    }))
}

/// `2 Σ log L_kk` for a lower-triangular factor.
fn log_det_of_factor(l: &Mat<f64>) -> f64 {
    2.0 * (0..l.nrows()).map(|k| l[(k, k)].ln()).sum::<f64>()
}

/// Applies `op` of the lower-triangular `l` to `rhs` in place.
fn apply_triangular(l: MatRef<'_, f64>, op: FactorOp, mut rhs: MatMut<'_, f64>) {
    match op {
        FactorOp::Factor => {
            let product = l * rhs.as_ref();
            rhs.copy_from(product.as_ref());
        }
        FactorOp::Transpose => {
            let product = l.transpose() * rhs.as_ref();
            rhs.copy_from(product.as_ref());
        }
        FactorOp::Inverse => solve_lower_triangular_in_place(l, rhs, Par::Seq),
        FactorOp::InverseTranspose => {
            solve_upper_triangular_in_place(l.transpose(), rhs, Par::Seq)
        }
    }
}

/// The implicit symmetric factor of an SPD HODLR matrix.
pub struct SymmetricFactorization {
    states: NodeStates<SymmetricNode>,
    log_det: f64,
}

impl SymmetricFactorization {
    pub fn new(tree: &PartitionTree, parallelism: Parallelism) -> Result<Self, HodlrError> {
        let states = factorize_bottom_up(tree, parallelism, |states, idx| {
            factor_node(tree, states, idx)
        })?;
        let log_det = states
            .iter()
            .map(|node| match node {
                SymmetricNode::Leaf { l } => log_det_of_factor(l),
                SymmetricNode::Internal { lambda, .. } => log_det_of_factor(lambda),
            })
            .sum();
        Ok(Self { states, log_det })
    }

    /// `log det A`.
    pub fn log_determinant(&self) -> f64 {
        self.log_det
    }

    /// Overwrites `rhs` (with `N` rows) by `op(W) rhs`.
    pub fn apply_in_place(
        &self,
        tree: &PartitionTree,
        op: FactorOp,
        rhs: MatMut<'_, f64>,
    ) -> Result<(), HodlrError> {
        apply_subtree(tree, &self.states, PartitionTree::ROOT, op, rhs)
    }

    /// Overwrites `rhs` by `A⁻¹ rhs = W⁻ᵀ W⁻¹ rhs`.
    pub fn solve_in_place(
        &self,
        tree: &PartitionTree,
        mut rhs: MatMut<'_, f64>,
    ) -> Result<(), HodlrError> {
        self.apply_in_place(tree, FactorOp::Inverse, rhs.as_mut())?;
        self.apply_in_place(tree, FactorOp::InverseTranspose, rhs)
    }
}

fn factor_node(
    tree: &PartitionTree,
    states: &NodeStates<SymmetricNode>,
    idx: usize,
) -> Result<SymmetricNode, HodlrError> {
    let node = tree.node(idx);
    match &node.kind {
        NodeKind::Leaf { dense } => Ok(SymmetricNode::Leaf {
            l: cholesky(dense.as_ref(), node.start, node.size)?,
        }),
        NodeKind::Internal { children, coupling } => {
            let (u, v) = coupling.upper();
            if u.ncols() == 0 {
                return Ok(SymmetricNode::Internal {
                    q_left: Mat::zeros(u.nrows(), 0),
                    q_right: Mat::zeros(v.nrows(), 0),
                    lambda: Mat::zeros(0, 0),
                });
            }

            let mut u_tilde = u.to_owned();
            apply_subtree(tree, states, children[0], FactorOp::Inverse, u_tilde.as_mut())?;
            let mut v_tilde = v.to_owned();
            apply_subtree(tree, states, children[1], FactorOp::Inverse, v_tilde.as_mut())?;

            let qr_left = u_tilde.qr();
            let qr_right = v_tilde.qr();
            let q_left = qr_left.compute_thin_Q();
            let q_right = qr_right.compute_thin_Q();
            let (k1, k2) = (q_left.ncols(), q_right.ncols());

            let mut inner = Mat::<f64>::identity(k1 + k2, k1 + k2);
            let coupled = qr_left.thin_R() * qr_right.thin_R().transpose();
            inner.as_mut().submatrix_mut(0, k1, k1, k2).copy_from(coupled.as_ref());
            inner
                .as_mut()
                .submatrix_mut(k1, 0, k2, k1)
                .copy_from(coupled.transpose());
            let lambda = cholesky(inner.as_ref(), node.start, node.size)?;

            Ok(SymmetricNode::Internal {
                q_left,
                q_right,
                lambda,
            })
        }
    }
}

/// Applies `op(G)` with `G = I + Q (Λ − I) Qᵀ` to the stacked halves `top`, `bottom`.
fn apply_correction(
    q_left: &Mat<f64>,
    q_right: &Mat<f64>,
    lambda: &Mat<f64>,
    op: FactorOp,
    mut top: MatMut<'_, f64>,
    mut bottom: MatMut<'_, f64>,
) {
    let (k1, k2) = (q_left.ncols(), q_right.ncols());
    if k1 + k2 == 0 {
        return;
    }
    let mut c = Mat::<f64>::zeros(k1 + k2, top.ncols());
    c.as_mut()
        .subrows_mut(0, k1)
        .copy_from(q_left.transpose() * top.as_ref());
    c.as_mut()
        .subrows_mut(k1, k2)
        .copy_from(q_right.transpose() * bottom.as_ref());

    let mut d = c.clone();
    apply_triangular(lambda.as_ref(), op, d.as_mut());
    d -= &c;

    matmul(
        top.as_mut(),
        Accum::Add,
        q_left.as_ref(),
        d.as_ref().subrows(0, k1),
        1.0,
        Par::Seq,
    );
    matmul(
        bottom.as_mut(),
        Accum::Add,
        q_right.as_ref(),
        d.as_ref().subrows(k1, k2),
        1.0,
        Par::Seq,
    );
}

fn apply_subtree(
    tree: &PartitionTree,
    states: &NodeStates<SymmetricNode>,
    idx: usize,
    op: FactorOp,
    mut rhs: MatMut<'_, f64>,
) -> Result<(), HodlrError> {
    let node = tree.node(idx);
    match (&node.kind, states.get(idx)?) {
        (NodeKind::Leaf { .. }, SymmetricNode::Leaf { l }) => {
            apply_triangular(l.as_ref(), op, rhs);
            Ok(())
        }
        (
            NodeKind::Internal { children, .. },
            SymmetricNode::Internal {
                q_left,
                q_right,
                lambda,
            },
        ) => {
            let left_size = tree.node(children[0]).size;
            let (mut top, mut bottom) = rhs.as_mut().split_at_row_mut(left_size);
            // W = D G: G acts first for W and W⁻ᵀ, last for Wᵀ and W⁻¹.
            let correction_first = matches!(op, FactorOp::Factor | FactorOp::InverseTranspose);
            if correction_first {
                apply_correction(q_left, q_right, lambda, op, top.as_mut(), bottom.as_mut());
            }
            apply_subtree(tree, states, children[0], op, top.as_mut())?;
            apply_subtree(tree, states, children[1], op, bottom.as_mut())?;
            if !correction_first {
                apply_correction(q_left, q_right, lambda, op, top, bottom);
            }
            Ok(())
        }
        _ => Err(HodlrErrorKind::NotFactorized.into()),
    }
}
