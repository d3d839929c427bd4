//! Bottom-up factorizations of an assembled [`PartitionTree`].
//!
//! Two factorizations are available:
//!
//! - [`WoodburyFactorization`]: the general path. Each leaf keeps an LU decomposition of its
//!   dense block and each internal node keeps a small correction matrix obtained from the
//!   Woodbury identity, whose size is the total rank of the node's coupling.
//! - [`SymmetricFactorization`]: for symmetric positive-definite matrices. It builds an
//!   implicit factor `W` with `A = W Wᵀ` that can be applied, transposed and inverted without
//!   ever being formed.
//!
//! Both are computed level by level, from the deepest level up to the root. The nodes of one
//! level only read the state of their descendants, so a level is processed as one batch,
//! optionally in parallel, and written back before the next level starts.

pub mod symmetric;
pub mod woodbury;

pub use symmetric::SymmetricFactorization;
pub use woodbury::WoodburyFactorization;

use crate::{
    config::Parallelism,
    error::{HodlrError, HodlrErrorKind},
    tree::{PartitionTree, map_nodes},
};

/// Factorization state of a HODLR matrix.
pub enum Factorization {
    General(WoodburyFactorization),
    Symmetric(SymmetricFactorization),
}

/// Per-node factorization state, indexed like the nodes of the tree.
pub(crate) struct NodeStates<T>(Vec<Option<T>>);

impl<T> NodeStates<T> {
    fn empty(len: usize) -> Self {
        Self((0..len).map(|_| None).collect())
    }

    /// State of node `idx`, or `NotFactorized` if it has not been computed.
    pub(crate) fn get(&self, idx: usize) -> Result<&T, HodlrError> {
        self.0
            .get(idx)
            .and_then(Option::as_ref)
            .ok_or_else(|| HodlrErrorKind::NotFactorized.into())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter().flatten()
    }
}

/// Runs `factor_node` over every node of `tree`, deepest level first.
///
/// `factor_node` receives the states computed so far; all descendants of the node it is
/// called for are guaranteed to be present. The first error, in level order, is returned.
pub(crate) fn factorize_bottom_up<T, F>(
    tree: &PartitionTree,
    parallelism: Parallelism,
    factor_node: F,
) -> Result<NodeStates<T>, HodlrError>
where
    T: Send + Sync,
    F: Fn(&NodeStates<T>, usize) -> Result<T, HodlrError> + Sync,
{
    let mut states = NodeStates::empty(tree.nodes().len());
    for (depth, level) in tree.levels().iter().enumerate().rev() {
        let computed = {
            let states = &states;
            let factor_node = &factor_node;
            map_nodes(parallelism, level, move |idx| {
                factor_node(states, idx).map(|state| (idx, state))
            })
        };
        for result in computed {
            let (idx, state) = result?;
            states.0[idx] = Some(state);
        }
        log::debug!("factorized level {depth} ({} nodes)", level.len());
    }
    Ok(states)
}
