use std::sync::Arc;

use serde::Serialize;

use crate::collections::{ImmutableSet, OneToManyMap};
use crate::graph::Graph;
use crate::model::{Key, KeyKind, Node};
use crate::solver::{RouteSolver, RouteSolverResult};

/// The result of a search: which key sits in which item slot.
#[derive(Debug, Clone)]
pub struct Route {
    graph: Arc<Graph>,
    all_nodes_visited: bool,
    item_to_key: OneToManyMap<Node, Key>,
    log: String,
}

impl Route {
    pub(crate) fn new(
        graph: Arc<Graph>,
        all_nodes_visited: bool,
        item_to_key: OneToManyMap<Node, Key>,
        log: String,
    ) -> Self {
        Self {
            graph,
            all_nodes_visited,
            item_to_key,
            log,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// True when every node was reached and the placement re-verifies.
    pub fn all_nodes_visited(&self) -> bool {
        self.all_nodes_visited
    }

    pub fn item_to_key(&self) -> &OneToManyMap<Node, Key> {
        &self.item_to_key
    }

    /// Newline separated trace of the search decisions.
    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn item_contents(&self, item: &Node) -> Option<&Key> {
        self.item_to_key.get(item)
    }

    pub fn items_containing_key(&self, key: &Key) -> ImmutableSet<Node> {
        self.item_to_key.keys_containing(key)
    }

    /// `(item, key)` pairs ordered by item id.
    pub fn placements(&self) -> impl Iterator<Item = (&Node, &Key)> + '_ {
        self.item_to_key.iter()
    }

    pub fn solve(&self) -> RouteSolverResult {
        RouteSolver.solve(self)
    }

    /// Mermaid flowchart of the graph with each filled item slot showing
    /// its key.
    pub fn to_mermaid(&self, use_labels: bool) -> String {
        self.graph
            .render_mermaid(use_labels, true, Some(&self.item_to_key))
    }

    pub fn spoiler(&self) -> Spoiler {
        Spoiler {
            all_nodes_visited: self.all_nodes_visited,
            solver_result: self.solve().to_string(),
            placements: self
                .placements()
                .map(|(item, key)| Placement {
                    item: item.to_string(),
                    key: key.to_string(),
                    key_kind: key.kind(),
                })
                .collect(),
        }
    }
}

/// Serializable summary of a [`Route`].
#[derive(Debug, Clone, Serialize)]
pub struct Spoiler {
    pub all_nodes_visited: bool,
    pub solver_result: String,
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub item: String,
    pub key: String,
    pub key_kind: KeyKind,
}
