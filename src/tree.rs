//! The partition tree and its assembly.
//!
//! The index range `[0, N)` is split recursively into two contiguous halves (the left half
//! gets `⌈size/2⌉`) until a range holds at most `leaf_size` indices. Nodes live in a flat
//! arena indexed by `usize` handles, root first; each node records its range, its depth and
//! either
//!
//! - a dense copy of its diagonal block (leaves), or
//! - the handles of its two children and the low-rank [`Coupling`] between them (internal
//!   nodes).
//!
//! The structure is computed sequentially (it only depends on `N` and `leaf_size`); the
//! numeric payloads of all nodes are independent of each other and are evaluated in parallel.

use crate::{
    algorithms::{self, LowRank, LowRankMethod, Truncation},
    config::{HodlrConfig, Parallelism},
    error::HodlrError,
    matrix::{BlockView, MatrixSource},
};
use faer::{Accum, Mat, MatRef, Par, linalg::matmul::matmul};
use rayon::prelude::*;

/// The off-diagonal coupling of an internal node with children `L` and `R`.
///
/// `upper` approximates `A[L, R] ≈ U₀ V₀ᵀ`. For non-symmetric assembly `lower` approximates
/// `A[R, L] ≈ U₁ V₁ᵀ`; for symmetric assembly it is absent and `A[R, L] ≈ V₀ U₀ᵀ`.
#[derive(Clone, Debug)]
pub struct Coupling {
    upper: LowRank,
    lower: Option<LowRank>,
}

impl Coupling {
    /// Factors `(U₀, V₀)` of the block coupling the left rows to the right columns.
    pub fn upper(&self) -> (MatRef<'_, f64>, MatRef<'_, f64>) {
        (self.upper.u.as_ref(), self.upper.v.as_ref())
    }

    /// Factors `(U₁, V₁)` of the block coupling the right rows to the left columns.
    pub fn lower(&self) -> (MatRef<'_, f64>, MatRef<'_, f64>) {
        match &self.lower {
            Some(lower) => (lower.u.as_ref(), lower.v.as_ref()),
            None => (self.upper.v.as_ref(), self.upper.u.as_ref()),
        }
    }

    pub fn is_symmetric(&self) -> bool {
        self.lower.is_none()
    }

    /// Ranks of the upper and lower blocks.
    pub fn ranks(&self) -> (usize, usize) {
        let lower = self.lower.as_ref().unwrap_or(&self.upper);
        (self.upper.rank(), lower.rank())
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Leaf { dense: Mat<f64> },
    Internal { children: [usize; 2], coupling: Coupling },
}

/// A node of the partition tree covering rows/columns `[start, start + size)`.
#[derive(Clone, Debug)]
pub struct Node {
    pub start: usize,
    pub size: usize,
    pub depth: usize,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Range size of the left child for a node of `size` indices.
    pub fn left_size(size: usize) -> usize {
        size.div_ceil(2)
    }
}

/// Structure of a node before its payload is computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub size: usize,
    pub depth: usize,
    pub children: Option<[usize; 2]>,
}

/// Splits `[0, size)` into the arena of spans (root at index 0, pre-order).
pub(crate) fn partition(size: usize, leaf_size: usize) -> Vec<Span> {
    fn split(start: usize, size: usize, depth: usize, leaf_size: usize, spans: &mut Vec<Span>) -> usize {
        let idx = spans.len();
        spans.push(Span {
            start,
            size,
            depth,
            children: None,
        });
        if size > leaf_size {
            let left_size = Node::left_size(size);
            let left = split(start, left_size, depth + 1, leaf_size, spans);
            let right = split(start + left_size, size - left_size, depth + 1, leaf_size, spans);
            spans[idx].children = Some([left, right]);
        }
        idx
    }

    let mut spans = Vec::new();
    split(0, size, 0, leaf_size, &mut spans);
    spans
}

/// Maps `f` over `indices`, in parallel when requested. The output order matches `indices`.
pub(crate) fn map_nodes<T, F>(parallelism: Parallelism, indices: &[usize], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    match parallelism {
        Parallelism::Sequential => indices.iter().map(|&idx| f(idx)).collect(),
        Parallelism::Rayon => indices.par_iter().map(|&idx| f(idx)).collect(),
    }
}

/// Seed of the random sketch for the block with top-left corner `(row, col)`.
fn block_seed(seed: u64, row: usize, col: usize) -> u64 {
    seed ^ (row as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (col as u64).rotate_left(32)
}

/// The assembled hierarchical representation.
#[derive(Clone, Debug)]
pub struct PartitionTree {
    nodes: Vec<Node>,
    levels: Vec<Vec<usize>>,
    method: LowRankMethod,
    symmetric: bool,
}

impl PartitionTree {
    /// Builds the tree over `source` and compresses every off-diagonal coupling.
    ///
    /// With `symmetric` set only the upper coupling of each node is compressed.
    pub fn assemble(
        source: &dyn MatrixSource,
        config: &HodlrConfig,
        method: LowRankMethod,
        truncation: Truncation,
        symmetric: bool,
    ) -> Result<Self, HodlrError> {
        let spans = partition(config.size, config.leaf_size);
        let all: Vec<usize> = (0..spans.len()).collect();

        let kinds = map_nodes(config.parallelism, &all, |idx| -> Result<NodeKind, HodlrError> {
            let span = spans[idx];
            match span.children {
                None => Ok(NodeKind::Leaf {
                    dense: source.block(span.start, span.start, span.size, span.size),
                }),
                Some([left, right]) => {
                    let (l, r) = (spans[left], spans[right]);
                    let upper = BlockView::new(source, l.start, r.start, l.size, r.size);
                    let upper = algorithms::compress(
                        &upper,
                        method,
                        truncation,
                        block_seed(config.seed, l.start, r.start),
                    )?;
                    let lower = if symmetric {
                        None
                    } else {
                        let lower = BlockView::new(source, r.start, l.start, r.size, l.size);
                        Some(algorithms::compress(
                            &lower,
                            method,
                            truncation,
                            block_seed(config.seed, r.start, l.start),
                        )?)
                    };
                    Ok(NodeKind::Internal {
                        children: [left, right],
                        coupling: Coupling { upper, lower },
                    })
                }
            }
        });

        let nodes = spans
            .iter()
            .zip(kinds)
            .map(|(span, kind)| {
                Ok(Node {
                    start: span.start,
                    size: span.size,
                    depth: span.depth,
                    kind: kind?,
                })
            })
            .collect::<Result<Vec<_>, HodlrError>>()?;

        let depth = nodes.iter().map(|n| n.depth).max().unwrap_or(0);
        let mut levels = vec![Vec::new(); depth + 1];
        for (idx, node) in nodes.iter().enumerate() {
            levels[node.depth].push(idx);
        }

        Ok(Self {
            nodes,
            levels,
            method,
            symmetric,
        })
    }

    /// Handle of the root node.
    pub const ROOT: usize = 0;

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Node handles grouped by depth, root level first.
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    /// Dimension `N` of the represented matrix.
    pub fn size(&self) -> usize {
        self.nodes[Self::ROOT].size
    }

    pub fn method(&self) -> LowRankMethod {
        self.method
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Number of levels below the root (0 for a single dense block).
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Largest rank over all couplings.
    pub fn max_rank(&self) -> usize {
        self.ranks_by_level().into_iter().max().unwrap_or(0)
    }

    /// Largest coupling rank on each level (0 for levels made only of leaves).
    pub fn ranks_by_level(&self) -> Vec<usize> {
        self.levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter_map(|&idx| match &self.nodes[idx].kind {
                        NodeKind::Internal { coupling, .. } => {
                            let (upper, lower) = coupling.ranks();
                            Some(upper.max(lower))
                        }
                        NodeKind::Leaf { .. } => None,
                    })
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Computes `A X` from the compressed representation.
    pub fn apply(&self, x: MatRef<'_, f64>) -> Mat<f64> {
        let mut y = Mat::zeros(x.nrows(), x.ncols());
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Leaf { dense } => {
                    matmul(
                        y.as_mut().subrows_mut(node.start, node.size),
                        Accum::Add,
                        dense.as_ref(),
                        x.subrows(node.start, node.size),
                        1.0,
                        Par::Seq,
                    );
                }
                NodeKind::Internal { children, coupling } => {
                    let left = &self.nodes[children[0]];
                    let right = &self.nodes[children[1]];
                    let x_left = x.subrows(left.start, left.size);
                    let x_right = x.subrows(right.start, right.size);

                    let (u0, v0) = coupling.upper();
                    let projected = v0.transpose() * x_right;
                    matmul(
                        y.as_mut().subrows_mut(left.start, left.size),
                        Accum::Add,
                        u0,
                        projected.as_ref(),
                        1.0,
                        Par::Seq,
                    );

                    let (u1, v1) = coupling.lower();
                    let projected = v1.transpose() * x_left;
                    matmul(
                        y.as_mut().subrows_mut(right.start, right.size),
                        Accum::Add,
                        u1,
                        projected.as_ref(),
                        1.0,
                        Par::Seq,
                    );
                }
            }
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::ZeroMatrix;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn check_partition(spans: &[Span], idx: usize, leaf_size: usize) {
        let span = spans[idx];
        match span.children {
            None => assert!(span.size <= leaf_size),
            Some([l, r]) => {
                let (left, right) = (spans[l], spans[r]);
                assert_eq!(left.start, span.start);
                assert_eq!(right.start, left.start + left.size);
                assert_eq!(left.size + right.size, span.size);
                assert_eq!(left.depth, span.depth + 1);
                check_partition(spans, l, leaf_size);
                check_partition(spans, r, leaf_size);
            }
        }
    }

    #[test]
    fn test_partition_of_odd_size() {
        let spans = partition(1943, 123);
        assert_eq!(spans[0].size, 1943);
        check_partition(&spans, 0, 123);
        let leaves: usize = spans
            .iter()
            .filter(|s| s.children.is_none())
            .map(|s| s.size)
            .sum();
        assert_eq!(leaves, 1943);
    }

    #[test]
    fn test_left_child_gets_ceiling() {
        let spans = partition(7, 3);
        let [l, r] = spans[0].children.unwrap();
        assert_eq!(spans[l].size, 4);
        assert_eq!(spans[r].size, 3);
    }

    #[test]
    fn test_leaf_size_at_least_n_gives_single_leaf() {
        assert_eq!(partition(50, 50).len(), 1);
        assert_eq!(partition(50, 500).len(), 1);
    }

    #[test]
    fn test_zero_source_assembles_rank_zero_couplings() {
        let config = HodlrConfig::new(200, 25, 1e-10);
        let tree = PartitionTree::assemble(
            &ZeroMatrix::new(200),
            &config,
            LowRankMethod::RookPivoting,
            Truncation::Tolerance(1e-10),
            false,
        )
        .unwrap();
        assert_eq!(tree.max_rank(), 0);
        assert_eq!(tree.leaf_count(), 8);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_apply_matches_dense_product() {
        let n = 120;
        let a = Mat::from_fn(n, n, |i, j| 1.0 / (1.0 + (i as f64 - j as f64).abs()));
        let mut rng = StdRng::seed_from_u64(42);
        let x = Mat::from_fn(n, 3, |_, _| rng.random::<f64>());
        for symmetric in [false, true] {
            let config = HodlrConfig::new(n, 16, 1e-12).with_parallelism(Parallelism::Sequential);
            let tree = PartitionTree::assemble(
                &a,
                &config,
                LowRankMethod::Svd,
                Truncation::Tolerance(1e-12),
                symmetric,
            )
            .unwrap();
            let exact = &a * &x;
            let approx = tree.apply(x.as_ref());
            assert!((&exact - &approx).norm_l2() / exact.norm_l2() < 1e-10);
        }
    }

    #[test]
    fn test_parallel_and_sequential_assembly_agree() {
        let n = 90;
        let a = Mat::from_fn(n, n, |i, j| (-((i as f64 - j as f64) / 30.0).powi(2)).exp());
        let build = |parallelism| {
            let config = HodlrConfig::new(n, 10, 5.0).with_parallelism(parallelism);
            PartitionTree::assemble(
                &a,
                &config,
                LowRankMethod::RandomizedSvd,
                Truncation::Rank(5),
                false,
            )
            .unwrap()
        };
        let seq = build(Parallelism::Sequential);
        let par = build(Parallelism::Rayon);
        let x = Mat::from_fn(n, 1, |i, _| i as f64);
        assert_eq!(seq.apply(x.as_ref()), par.apply(x.as_ref()));
    }
}
