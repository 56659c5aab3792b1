//! Requirements that hold on every way into a node.
//!
//! A node's guaranteed set is the intersection, over every passage into
//! it, of what its origin guarantees, the origin itself, and the closure of
//! the passage's requirements. A key requirement closes over the items
//! currently holding that key, intersected across those items. The sets
//! are found as a fixed point: reachability only grows from the start and
//! each set only shrinks once reached, so the iteration settles.

use std::collections::{BTreeSet, HashMap};

use crate::collections::OneToManyMap;
use crate::graph::Graph;
use crate::model::{Key, KeyKind, Node, Requirement};

/// Visited nodes and reusable keys that any player standing on `node` must
/// already have. Consumable and removable keys are left out since an
/// earlier lock may have used them up.
pub(crate) fn guaranteed_requirements(
    graph: &Graph,
    placement: &OneToManyMap<Node, Key>,
    node: &Node,
) -> BTreeSet<Requirement> {
    let mut guarantees = Guarantees {
        graph,
        placement,
        sets: HashMap::new(),
    };
    guarantees.settle();
    guarantees
        .sets
        .remove(node)
        .unwrap_or_default()
        .into_iter()
        .filter(|r| match r {
            Requirement::Node { .. } => true,
            Requirement::Key { key, .. } => key.kind() == KeyKind::Reusable,
        })
        .collect()
}

struct Guarantees<'a> {
    graph: &'a Graph,
    placement: &'a OneToManyMap<Node, Key>,
    /// Absent until some passage reaches the node.
    sets: HashMap<Node, BTreeSet<Requirement>>,
}

impl Guarantees<'_> {
    fn settle(&mut self) {
        let graph = self.graph;
        self.sets.insert(graph.start().clone(), BTreeSet::new());
        loop {
            let mut changed = false;
            for node in graph.nodes() {
                if node == graph.start() {
                    continue;
                }
                let Some(set) = self.node_requirements(node) else {
                    continue;
                };
                if self.sets.get(node) != Some(&set) {
                    self.sets.insert(node.clone(), set);
                    changed = true;
                }
            }
            if !changed {
                return;
            }
        }
    }

    /// `None` while no passage into `node` is known to be usable.
    fn node_requirements(&self, node: &Node) -> Option<BTreeSet<Requirement>> {
        let graph = self.graph;
        let mut result: Option<BTreeSet<Requirement>> = None;
        for passage in graph.passages_into(node) {
            let origin = graph.origin(passage);
            let Some(mut requires) = self.visited_closure(origin) else {
                continue;
            };
            let mut reachable = true;
            for requirement in graph.edge(passage.edge).requires() {
                match self.requirement_closure(requirement) {
                    Some(closure) => requires.extend(closure),
                    None => {
                        reachable = false;
                        break;
                    }
                }
            }
            if reachable {
                result = Some(intersect(result, requires));
            }
        }
        result
    }

    /// What standing on `node` guarantees, `node` included.
    fn visited_closure(&self, node: &Node) -> Option<BTreeSet<Requirement>> {
        let mut set = self.sets.get(node)?.clone();
        set.insert(Requirement::node(node.clone()).into_soft());
        Some(set)
    }

    fn requirement_closure(&self, requirement: &Requirement) -> Option<BTreeSet<Requirement>> {
        match requirement {
            Requirement::Node { node, .. } => self.visited_closure(node),
            Requirement::Key { key, .. } => {
                let mut shared: Option<BTreeSet<Requirement>> = None;
                for holder in self.placement.keys_containing(key).iter() {
                    if let Some(requires) = self.visited_closure(holder) {
                        shared = Some(intersect(shared, requires));
                    }
                }
                let mut closure = shared?;
                closure.insert(Requirement::key(key.clone()));
                Some(closure)
            }
        }
    }
}

fn intersect(
    acc: Option<BTreeSet<Requirement>>,
    next: BTreeSet<Requirement>,
) -> BTreeSet<Requirement> {
    match acc {
        None => next,
        Some(acc) => acc.intersection(&next).cloned().collect(),
    }
}
