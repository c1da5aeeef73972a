/// Paths explored by the search live in an arena. A node points back at the
/// node it was reached from, by index. A `Cycle` is a resolved path from the
/// root to a node holding the starting token again.
use std::fmt::{self, Debug};

use alloy::primitives::U256;
use itertools::Itertools;

use super::pool::PoolId;
use super::token::{TokenBook, TokenId};

/// Index of a node in a [`PathArena`]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(usize);

/// The pool a step went through, by position in the search graph and by address
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PoolRef {
    /// Position of the pool in the search graph
    pub index: usize,
    /// Pool address
    pub id: PoolId,
}

/// One step of a path. Never mutated after creation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PathNode {
    /// Node this one was reached from, `None` for the root
    pub previous: Option<NodeId>,
    /// Pool traversed to get here, `None` for the root
    pub pool: Option<PoolRef>,
    /// Token held after the step
    pub token: TokenId,
    /// Amount held after the step
    pub amount: U256,
    /// Number of swaps from the root
    pub depth: usize,
}

/// Owner of every node created during one search
#[derive(Debug, Default)]
pub struct PathArena {
    nodes: Vec<PathNode>,
}

impl PathArena {
    /// Empty arena
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Stores `node` and returns its id
    pub fn push(&mut self, node: PathNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// The node behind `id`
    #[must_use]
    pub fn get(&self, id: NodeId) -> &PathNode {
        &self.nodes[id.0]
    }

    /// Number of nodes created so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node was created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follows back references from `id` to the root
    #[must_use]
    pub fn resolve(&self, id: NodeId) -> Cycle {
        let mut nodes = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = *self.get(id);
            current = node.previous;
            nodes.push(node);
        }
        nodes.reverse();
        Cycle { nodes }
    }
}

/// A path that starts and ends at the same token
#[derive(Clone, PartialEq, Eq)]
pub struct Cycle {
    nodes: Vec<PathNode>,
}

impl Debug for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle({} {:?}: {})",
            self.input(),
            self.token(),
            self.pools().map(|pool| format!("{:?}", pool.id)).join(" -> ")
        )
    }
}

impl Cycle {
    /// Root first, last swap last
    #[must_use]
    pub fn nodes(&self) -> &[PathNode] {
        &self.nodes
    }

    /// The token the cycle starts and ends with
    #[must_use]
    pub fn token(&self) -> TokenId {
        self.nodes[0].token
    }

    /// Amount the search started with
    #[must_use]
    pub fn input(&self) -> U256 {
        self.nodes[0].amount
    }

    /// Amount the search ended with
    #[must_use]
    pub fn output(&self) -> U256 {
        self.nodes[self.nodes.len() - 1].amount
    }

    /// Number of swaps
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Whether the cycle has no swap at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pools in swap order
    pub fn pools(&self) -> impl Iterator<Item = PoolRef> + '_ {
        self.nodes.iter().filter_map(|node| node.pool)
    }

    /// `(token in, pool, token out)` for each swap
    pub fn hops(&self) -> impl Iterator<Item = (TokenId, PoolRef, TokenId)> + '_ {
        self.nodes.iter().tuple_windows().filter_map(|(from, to)| {
            to.pool.map(|pool| (from.token, pool, to.token))
        })
    }

    /// Key used to remember a cycle across searches: the pool addresses in order
    #[must_use]
    pub fn hash_key(&self) -> String {
        self.pools().map(|pool| pool.id.to_string()).join("->")
    }

    /// Output over input in percent, two decimals
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn profit_percentage(&self) -> f64 {
        if self.input().is_zero() {
            return 0.0;
        }
        let basis_points: u64 = (self.output().saturating_mul(U256::from(10_000)) / self.input())
            .saturating_to();
        basis_points as f64 / 100.0
    }

    /// `"100.5% - WETH->USDC->WETH"`
    #[must_use]
    pub fn describe(&self, tokens: &TokenBook) -> String {
        format!(
            "{}% - {}",
            self.profit_percentage(),
            self.nodes.iter().map(|node| tokens.symbol(node.token)).join("->")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;

    fn triangle() -> Cycle {
        let mut arena = PathArena::new();
        let root = arena.push(PathNode {
            previous: None,
            pool: None,
            token: token("A"),
            amount: U256::from(100),
            depth: 0,
        });
        let b = arena.push(PathNode {
            previous: Some(root),
            pool: Some(PoolRef { index: 0, id: pool_id("P1") }),
            token: token("B"),
            amount: U256::from(190),
            depth: 1,
        });
        let a = arena.push(PathNode {
            previous: Some(b),
            pool: Some(PoolRef { index: 1, id: pool_id("P2") }),
            token: token("A"),
            amount: U256::from(105),
            depth: 2,
        });
        arena.resolve(a)
    }

    #[test]
    fn test_resolve() {
        let cycle = triangle();
        assert_eq!(cycle.len(), 2);
        assert_eq!(cycle.token(), token("A"));
        assert_eq!(cycle.input(), U256::from(100));
        assert_eq!(cycle.output(), U256::from(105));
        assert_eq!(
            cycle.hops().map(|(from, pool, to)| (from, pool.id, to)).collect::<Vec<_>>(),
            vec![
                (token("A"), pool_id("P1"), token("B")),
                (token("B"), pool_id("P2"), token("A")),
            ]
        );
    }

    #[test]
    fn test_hash_key() {
        let cycle = triangle();
        assert_eq!(
            cycle.hash_key(),
            format!("{}->{}", pool_id("P1"), pool_id("P2"))
        );
    }

    #[test]
    fn test_profit_percentage() {
        assert!((triangle().profit_percentage() - 105.0).abs() < f64::EPSILON);
    }
}
