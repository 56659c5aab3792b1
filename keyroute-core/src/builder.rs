use std::sync::Arc;

use tracing::trace;

use crate::finder::RouteFinder;
use crate::graph::Graph;
use crate::model::{Edge, EdgeKind, Key, KeyKind, Node, NodeKind, Requirement};
use crate::route::Route;
use crate::{GraphError, Result};

/// Incremental, validating construction of a [`Graph`].
///
/// Keys and nodes share one id sequence starting at 1. World data is
/// usually authored per room, so the same door tends to be declared from
/// both of its sides; those declarations are merged into one edge, and
/// contradictory ones are rejected.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    next_id: u32,
    keys: Vec<Key>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    start: Option<Node>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn key(&mut self, label: &str, group: u32, kind: KeyKind) -> Key {
        let key = Key::new(self.allocate_id(), group, kind, non_empty(label));
        self.keys.push(key.clone());
        key
    }

    pub fn room(&mut self, label: &str) -> Node {
        let node = Node::new(self.allocate_id(), 0, NodeKind::Default, non_empty(label));
        self.nodes.push(node.clone());
        node
    }

    /// Registers an item slot reachable from `room` and joins the two with
    /// a two-way edge carrying `requires`.
    pub fn item(&mut self, label: &str, group: u32, room: &Node, requires: &[Requirement]) -> Result<Node> {
        self.check_node(room)?;
        self.check_requirements(requires)?;
        let item = Node::new(self.allocate_id(), group, NodeKind::Item, non_empty(label));
        self.nodes.push(item.clone());
        self.edge(room, &item, EdgeKind::TwoWay, requires)?;
        Ok(item)
    }

    /// Chooses where the player begins. Defaults to the first room.
    pub fn set_start(&mut self, node: &Node) -> Result<()> {
        self.check_node(node)?;
        self.start = Some(node.clone());
        Ok(())
    }

    pub fn door(&mut self, source: &Node, destination: &Node, requires: &[Requirement]) -> Result<Edge> {
        self.edge(source, destination, EdgeKind::TwoWay, requires)
    }

    pub fn unlock_door(&mut self, source: &Node, destination: &Node, requires: &[Requirement]) -> Result<Edge> {
        self.edge(source, destination, EdgeKind::UnlockTwoWay, requires)
    }

    pub fn one_way(&mut self, source: &Node, destination: &Node, requires: &[Requirement]) -> Result<Edge> {
        self.edge(source, destination, EdgeKind::OneWay, requires)
    }

    pub fn no_return(&mut self, source: &Node, destination: &Node, requires: &[Requirement]) -> Result<Edge> {
        self.edge(source, destination, EdgeKind::NoReturn, requires)
    }

    /// Adds an edge, or merges it with an edge already declared between the
    /// same two nodes. Returns the edge as it is stored.
    pub fn edge(
        &mut self,
        source: &Node,
        destination: &Node,
        kind: EdgeKind,
        requires: &[Requirement],
    ) -> Result<Edge> {
        self.check_node(source)?;
        self.check_node(destination)?;
        self.check_requirements(requires)?;

        if let Some(existing) = self
            .edges
            .iter()
            .find(|e| e.source() == source && e.destination() == destination)
        {
            if existing.kind() == kind && existing.requires() == requires {
                return Ok(existing.clone());
            }
            return Err(GraphError::ConflictingEdge {
                from: source.clone(),
                to: destination.clone(),
                reason: "duplicate edge with different kind/requirements",
            });
        }

        if let Some(idx) = self
            .edges
            .iter()
            .position(|e| e.source() == destination && e.destination() == source)
        {
            let merged = merge_reverse(&self.edges[idx], kind, requires)?;
            trace!("merged {source} -> {destination} into {merged}");
            self.edges[idx] = merged.clone();
            return Ok(merged);
        }

        let edge = Edge::new(source.clone(), destination.clone(), requires.to_vec(), kind);
        self.edges.push(edge.clone());
        Ok(edge)
    }

    pub fn to_graph(&self) -> Result<Graph> {
        let start = self
            .start
            .clone()
            .or_else(|| self.nodes.iter().find(|n| !n.is_item()).cloned())
            .or_else(|| self.nodes.first().cloned())
            .ok_or(GraphError::EmptyGraph)?;
        Ok(Graph::new(
            self.keys.clone(),
            self.nodes.clone(),
            self.edges.clone(),
            start,
        ))
    }

    fn check_node(&self, node: &Node) -> Result<()> {
        let known = self.nodes.iter().any(|n| {
            n.id() == node.id()
                && n.kind() == node.kind()
                && n.group() == node.group()
                && n.label() == node.label()
        });
        if known {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(node.clone()))
        }
    }

    fn check_key(&self, key: &Key) -> Result<()> {
        let known = self.keys.iter().any(|k| {
            k.id() == key.id()
                && k.kind() == key.kind()
                && k.group() == key.group()
                && k.label() == key.label()
        });
        if known {
            Ok(())
        } else {
            Err(GraphError::UnknownKey(key.clone()))
        }
    }

    fn check_requirements(&self, requires: &[Requirement]) -> Result<()> {
        for requirement in requires {
            match requirement {
                Requirement::Key { key, .. } => self.check_key(key)?,
                Requirement::Node { node, .. } => self.check_node(node)?,
            }
        }
        Ok(())
    }
}

fn non_empty(label: &str) -> Option<&str> {
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

/// Combines `existing` with a declaration running the opposite way.
fn merge_reverse(existing: &Edge, kind: EdgeKind, requires: &[Requirement]) -> Result<Edge> {
    let conflict = |reason| GraphError::ConflictingEdge {
        from: existing.destination().clone(),
        to: existing.source().clone(),
        reason,
    };
    let agrees = same_requirements(existing.requires(), requires);

    match (existing.kind(), kind) {
        (EdgeKind::OneWay | EdgeKind::NoReturn, _) | (_, EdgeKind::OneWay | EdgeKind::NoReturn) => {
            Err(conflict("one-way edge cannot share a pair of nodes with another edge"))
        }
        (EdgeKind::TwoWay, EdgeKind::TwoWay) => {
            if agrees || requires.is_empty() {
                Ok(existing.clone())
            } else if existing.requires().is_empty() {
                Ok(existing.with_requires(requires))
            } else {
                Err(conflict("two-way edge declared with different requirements on each side"))
            }
        }
        (EdgeKind::UnlockTwoWay, EdgeKind::TwoWay) => {
            if agrees || requires.is_empty() {
                Ok(existing.clone())
            } else {
                Err(conflict("two-way side conflicts with the unlocking side"))
            }
        }
        (EdgeKind::TwoWay, EdgeKind::UnlockTwoWay) => {
            if agrees || existing.requires().is_empty() {
                Ok(Edge::new(
                    existing.destination().clone(),
                    existing.source().clone(),
                    requires.to_vec(),
                    EdgeKind::UnlockTwoWay,
                ))
            } else {
                Err(conflict("unlocking side conflicts with the two-way side"))
            }
        }
        (EdgeKind::UnlockTwoWay, EdgeKind::UnlockTwoWay) => {
            Err(conflict("edge can only be unlocked from one side"))
        }
    }
}

fn same_requirements(a: &[Requirement], b: &[Requirement]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Builds a graph by naming each node's dependencies as it is created.
///
/// Every gate is a room; an item hangs off the node that leads to it.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    builder: GraphBuilder,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reusable_key(&mut self, group: u32, label: &str) -> Key {
        self.builder.key(label, group, KeyKind::Reusable)
    }

    pub fn consumable_key(&mut self, group: u32, label: &str) -> Key {
        self.builder.key(label, group, KeyKind::Consumable)
    }

    pub fn removable_key(&mut self, group: u32, label: &str) -> Key {
        self.builder.key(label, group, KeyKind::Removable)
    }

    pub fn item(&mut self, group: u32, label: &str, source: &Node, requires: &[Requirement]) -> Result<Node> {
        self.builder.item(label, group, source, requires)
    }

    /// A node with no dependencies. The first one becomes the start.
    pub fn and_gate(&mut self, label: &str) -> Node {
        self.builder.room(label)
    }

    /// A node reachable from `source` once every requirement holds.
    pub fn and_gate_from(&mut self, label: &str, source: &Node, requires: &[Requirement]) -> Result<Node> {
        self.builder.check_node(source)?;
        self.builder.check_requirements(requires)?;
        let node = self.builder.room(label);
        self.builder.door(source, &node, requires)?;
        Ok(node)
    }

    /// A node reachable from any one of `sources`.
    pub fn or_gate(&mut self, label: &str, sources: &[&Node]) -> Result<Node> {
        for source in sources {
            self.builder.check_node(source)?;
        }
        let node = self.builder.room(label);
        for source in sources {
            self.builder.door(source, &node, &[])?;
        }
        Ok(node)
    }

    pub fn one_way(&mut self, label: &str, source: &Node, requires: &[Requirement]) -> Result<Node> {
        self.builder.check_node(source)?;
        self.builder.check_requirements(requires)?;
        let node = self.builder.room(label);
        self.builder.one_way(source, &node, requires)?;
        Ok(node)
    }

    pub fn no_return(&mut self, label: &str, source: &Node, requires: &[Requirement]) -> Result<Node> {
        self.builder.check_node(source)?;
        self.builder.check_requirements(requires)?;
        let node = self.builder.room(label);
        self.builder.no_return(source, &node, requires)?;
        Ok(node)
    }

    pub fn build(&self) -> Result<Graph> {
        self.builder.to_graph()
    }

    pub fn generate_route(&self, seed: Option<u64>) -> Result<Route> {
        let graph = Arc::new(self.build()?);
        Ok(RouteFinder::new(seed).find(graph))
    }
}
