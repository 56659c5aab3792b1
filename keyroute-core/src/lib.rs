//! Key item route generation.
//!
//! A world is described as a [`Graph`] of rooms and item slots joined by
//! locked edges. [`RouteFinder`] decides which key goes into which item
//! slot so that every area stays reachable, and [`RouteSolver`] replays a
//! placement to confirm the player can never get stuck.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod builder;
pub mod collections;
mod finder;
mod graph;
mod mermaid;
mod model;
mod prerequisites;
mod route;
mod solver;

pub use builder::{DependencyGraphBuilder, GraphBuilder};
pub use finder::RouteFinder;
pub use graph::Graph;
pub use model::{Edge, EdgeKind, Key, KeyKind, Node, NodeKind, Requirement};
pub use route::{Placement, Route, Spoiler};
pub use solver::{RouteSolver, RouteSolverResult};

/// Authoring mistakes found while building a [`Graph`].
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph configuration error: node {0} was not registered with this builder")]
    UnknownNode(Node),
    #[error("graph configuration error: key {0} was not registered with this builder")]
    UnknownKey(Key),
    #[error("graph configuration error: edge {from} -> {to}: {reason}")]
    ConflictingEdge {
        from: Node,
        to: Node,
        reason: &'static str,
    },
    #[error("graph configuration error: graph has no nodes")]
    EmptyGraph,
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteFinderSettings {
    /// Seed for the shuffles and slot choices. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Slot assignments tried per candidate edge before moving on.
    pub max_retries: usize,
    /// Upper bound on placement attempts across the whole search.
    pub max_attempts: usize,
}

impl Default for RouteFinderSettings {
    fn default() -> Self {
        Self {
            seed: None,
            max_retries: 10,
            max_attempts: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fill_missing_fields() {
        let settings: RouteFinderSettings = serde_json::from_str(r#"{ "seed": 42 }"#).unwrap();
        assert_eq!(settings.seed, Some(42));
        assert_eq!(settings.max_retries, 10);
        assert_eq!(settings.max_attempts, 10_000);
    }

    #[test]
    fn errors_name_the_problem() {
        let node = Node::new(4, 0, NodeKind::Default, Some("Hall"));
        let err = GraphError::ConflictingEdge {
            from: node.clone(),
            to: node,
            reason: "duplicate edge with different kind/requirements",
        };
        assert_eq!(
            err.to_string(),
            "graph configuration error: edge #4 (Hall) -> #4 (Hall): duplicate edge with different kind/requirements"
        );
        assert_eq!(
            GraphError::EmptyGraph.to_string(),
            "graph configuration error: graph has no nodes"
        );
    }
}
