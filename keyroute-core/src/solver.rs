use std::collections::HashSet;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tracing::trace;

use crate::collections::{ImmutableSet, MultiSet, OneToManyMap};
use crate::graph::{Graph, Passage};
use crate::model::{Key, Node};
use crate::route::Route;

/// Bit flags describing how far a placement lets the player get.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RouteSolverResult(u8);

impl RouteSolverResult {
    pub const OK: Self = Self(0);
    /// At least one node was never reached.
    pub const NODES_REMAINING: Self = Self(1);
    /// Every open lock needs a consumable key and there are not enough
    /// copies to open all of them, so the order the player picks matters.
    pub const POTENTIAL_SOFTLOCK: Self = Self(2);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for RouteSolverResult {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RouteSolverResult {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for RouteSolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "ok");
        }
        let mut names = Vec::new();
        if self.contains(Self::NODES_REMAINING) {
            names.push("nodes-remaining");
        }
        if self.contains(Self::POTENTIAL_SOFTLOCK) {
            names.push("potential-softlock");
        }
        write!(f, "{}", names.join(" | "))
    }
}

/// Replays a placement without any randomness and reports whether every
/// node can be reached without the player getting stuck.
#[derive(Copy, Clone, Debug, Default)]
pub struct RouteSolver;

impl RouteSolver {
    pub fn solve(&self, route: &Route) -> RouteSolverResult {
        self.solve_placement(route.graph(), route.item_to_key())
    }

    pub(crate) fn solve_placement(
        &self,
        graph: &Graph,
        placement: &OneToManyMap<Node, Key>,
    ) -> RouteSolverResult {
        let run = Run { graph, placement };
        let mut state = run.visit(State::default(), graph.start());
        let stuck = loop {
            state = run.expand(state);
            match run.unlock(&state) {
                Unlock::Progress(next) => state = next,
                Unlock::Stalled => break false,
                Unlock::Stuck => break true,
            }
        };

        let mut result = RouteSolverResult::OK;
        if stuck {
            result |= RouteSolverResult::POTENTIAL_SOFTLOCK;
        }
        if state.visited.len() < graph.nodes().len() {
            result |= RouteSolverResult::NODES_REMAINING;
        }
        trace!(
            visited = state.visited.len(),
            nodes = graph.nodes().len(),
            keys = state.keys.len(),
            "solver finished: {result}"
        );
        result
    }
}

#[derive(Clone, Default)]
struct State {
    visited: ImmutableSet<Node>,
    next: ImmutableSet<Passage>,
    keys: MultiSet<Key>,
}

enum Unlock {
    Progress(State),
    Stalled,
    Stuck,
}

struct Run<'a> {
    graph: &'a Graph,
    placement: &'a OneToManyMap<Node, Key>,
}

impl Run<'_> {
    fn visit(&self, state: State, node: &Node) -> State {
        if state.visited.contains(node) {
            return state;
        }
        let visited = state.visited.insert(node.clone());
        let keys = match self.placement.get(node) {
            Some(key) if node.is_item() => state.keys.add(key.clone()),
            _ => state.keys,
        };
        let next = state.next.union(
            self.graph
                .passages_from(node)
                .into_iter()
                .filter(|&p| !visited.contains(self.graph.target(p))),
        );
        State { visited, next, keys }
    }

    fn open(&self, mut state: State, passages: &[Passage]) -> State {
        for &passage in passages {
            state.next = state.next.remove(&passage);
            state = self.visit(state, self.graph.target(passage));
        }
        state
    }

    fn is_stale(&self, state: &State, passage: Passage) -> bool {
        state.visited.contains(self.graph.target(passage))
    }

    fn nodes_visited(&self, state: &State, passage: Passage) -> bool {
        self.graph
            .edge(passage.edge)
            .required_nodes()
            .all(|n| state.visited.contains(n))
    }

    fn has_keys(&self, keys: &MultiSet<Key>, passage: Passage) -> bool {
        let edge = self.graph.edge(passage.edge);
        edge.required_keys()
            .all(|key| keys.count(key) >= self.graph.key_need(passage, key))
    }

    fn consumable_cost(&self, passage: Passage) -> usize {
        self.graph
            .edge(passage.edge)
            .required_keys()
            .filter(|k| k.is_consumable())
            .count()
    }

    /// Opens everything that needs no key until nothing changes.
    fn expand(&self, mut state: State) -> State {
        loop {
            let ready: Vec<Passage> = state
                .next
                .iter()
                .copied()
                .filter(|&p| {
                    self.is_stale(&state, p)
                        || (self.graph.edge(p.edge).required_keys().next().is_none()
                            && self.nodes_visited(&state, p))
                })
                .collect();
            if ready.is_empty() {
                return state;
            }
            state = self.open(state, &ready);
        }
    }

    fn unlock(&self, state: &State) -> Unlock {
        let mut possible: Vec<Passage> = state
            .next
            .iter()
            .copied()
            .filter(|&p| {
                !self.is_stale(state, p)
                    && self.nodes_visited(state, p)
                    && self.has_keys(&state.keys, p)
            })
            .collect();
        if possible.is_empty() {
            return Unlock::Stalled;
        }

        let free: Vec<Passage> = possible
            .iter()
            .copied()
            .filter(|p| !self.graph.edge(p.edge).required_keys().any(Key::is_consumable))
            .collect();
        if !free.is_empty() {
            return Unlock::Progress(self.open(state.clone(), &free));
        }

        // Only consumable locks remain: the cheapest one per destination,
        // all of them affordable at once.
        possible.sort_by_key(|&p| self.consumable_cost(p));
        let mut targets = HashSet::new();
        let possible: Vec<Passage> = possible
            .into_iter()
            .filter(|&p| targets.insert(self.graph.target(p).clone()))
            .collect();
        let mut keys = state.keys.clone();
        for &passage in &possible {
            if !self.has_keys(&keys, passage) {
                return Unlock::Stuck;
            }
            let spent = self
                .graph
                .edge(passage.edge)
                .required_keys()
                .filter(|k| k.is_consumable());
            keys = keys.remove_many(spent);
        }
        let state = State {
            keys,
            ..state.clone()
        };
        Unlock::Progress(self.open(state, &possible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyKind;
    use crate::GraphBuilder;

    fn place(pairs: &[(&Node, &Key)]) -> OneToManyMap<Node, Key> {
        pairs.iter().fold(OneToManyMap::new(), |map, (item, key)| {
            map.insert((*item).clone(), (*key).clone())
        })
    }

    #[test]
    fn reusable_key_opens_door() {
        let mut b = GraphBuilder::new();
        let card = b.key("Card", 0, KeyKind::Reusable);
        let hall = b.room("Hall");
        let vault = b.room("Vault");
        let desk = b.item("Desk", 0, &hall, &[]).unwrap();
        b.door(&hall, &vault, &[card.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let solver = RouteSolver;
        assert_eq!(
            solver.solve_placement(&graph, &OneToManyMap::new()),
            RouteSolverResult::NODES_REMAINING
        );
        assert!(solver.solve_placement(&graph, &place(&[(&desk, &card)])).is_ok());
    }

    #[test]
    fn key_behind_its_own_door_leaves_nodes() {
        let mut b = GraphBuilder::new();
        let card = b.key("Card", 0, KeyKind::Reusable);
        let hall = b.room("Hall");
        let vault = b.room("Vault");
        let safe = b.item("Safe", 0, &vault, &[]).unwrap();
        b.door(&hall, &vault, &[card.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let result = RouteSolver.solve_placement(&graph, &place(&[(&safe, &card)]));
        assert!(result.contains(RouteSolverResult::NODES_REMAINING));
        assert!(!result.contains(RouteSolverResult::POTENTIAL_SOFTLOCK));
    }

    #[test]
    fn node_requirement_waits_for_visit() {
        let mut b = GraphBuilder::new();
        let hall = b.room("Hall");
        let lever = b.room("Lever");
        let gate = b.room("Gate");
        b.door(&hall, &lever, &[]).unwrap();
        b.door(&hall, &gate, &[lever.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();
        assert!(RouteSolver.solve_placement(&graph, &OneToManyMap::new()).is_ok());
    }

    #[test]
    fn too_few_consumables_is_a_softlock() {
        let mut b = GraphBuilder::new();
        let small = b.key("Small Key", 0, KeyKind::Consumable);
        let hall = b.room("Hall");
        let west = b.room("West");
        let east = b.room("East");
        let drawer = b.item("Drawer", 0, &hall, &[]).unwrap();
        let chest = b.item("Chest", 0, &hall, &[]).unwrap();
        b.door(&hall, &west, &[small.clone().into()]).unwrap();
        b.door(&hall, &east, &[small.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let one = RouteSolver.solve_placement(&graph, &place(&[(&drawer, &small)]));
        assert_eq!(
            one,
            RouteSolverResult::POTENTIAL_SOFTLOCK | RouteSolverResult::NODES_REMAINING
        );
        assert_eq!(one.to_string(), "nodes-remaining | potential-softlock");

        let two = RouteSolver.solve_placement(&graph, &place(&[(&drawer, &small), (&chest, &small)]));
        assert_eq!(two, RouteSolverResult::OK);
        assert_eq!(two.to_string(), "ok");
    }

    #[test]
    fn free_doors_open_before_consumables() {
        let mut b = GraphBuilder::new();
        let small = b.key("Small Key", 0, KeyKind::Consumable);
        let card = b.key("Card", 0, KeyKind::Reusable);
        let hall = b.room("Hall");
        let office = b.room("Office");
        let store = b.room("Store");
        let drawer = b.item("Drawer", 0, &hall, &[]).unwrap();
        let desk = b.item("Desk", 0, &hall, &[]).unwrap();
        let locker = b.item("Locker", 0, &office, &[]).unwrap();
        b.door(&hall, &office, &[card.clone().into()]).unwrap();
        b.door(&hall, &store, &[small.clone().into()]).unwrap();
        b.door(&office, &store, &[small.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let placement = place(&[(&drawer, &small), (&desk, &card), (&locker, &small)]);
        assert!(RouteSolver.solve_placement(&graph, &placement).is_ok());
    }

    #[test]
    fn two_locks_into_one_room_cost_one_key() {
        let mut b = GraphBuilder::new();
        let small = b.key("Small Key", 0, KeyKind::Consumable);
        let card = b.key("Card", 0, KeyKind::Reusable);
        let hall = b.room("Hall");
        let office = b.room("Office");
        let store = b.room("Store");
        let drawer = b.item("Drawer", 0, &hall, &[]).unwrap();
        let desk = b.item("Desk", 0, &hall, &[]).unwrap();
        b.door(&hall, &office, &[card.clone().into()]).unwrap();
        b.door(&hall, &store, &[small.clone().into()]).unwrap();
        b.door(&office, &store, &[small.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let placement = place(&[(&drawer, &small), (&desk, &card)]);
        assert!(RouteSolver.solve_placement(&graph, &placement).is_ok());
    }

    #[test]
    fn cheapest_lock_into_a_room_is_the_one_paid_for() {
        let mut b = GraphBuilder::new();
        let small = b.key("Small Key", 0, KeyKind::Consumable);
        let card = b.key("Card", 0, KeyKind::Reusable);
        let hall = b.room("Hall");
        let office = b.room("Office");
        let store = b.room("Store");
        let west = b.room("West");
        let drawer = b.item("Drawer", 0, &hall, &[]).unwrap();
        let chest = b.item("Chest", 0, &hall, &[]).unwrap();
        let desk = b.item("Desk", 0, &hall, &[]).unwrap();
        b.door(&hall, &office, &[card.clone().into()]).unwrap();
        b.door(&hall, &store, &[small.clone().into(), small.clone().into()]).unwrap();
        b.door(&office, &store, &[small.clone().into()]).unwrap();
        b.door(&hall, &west, &[small.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let placement = place(&[(&drawer, &small), (&chest, &small), (&desk, &card)]);
        assert_eq!(RouteSolver.solve_placement(&graph, &placement), RouteSolverResult::OK);
    }

    #[test]
    fn removable_keys_are_counted_per_path() {
        let mut b = GraphBuilder::new();
        let crank = b.key("Crank", 0, KeyKind::Removable);
        let hall = b.room("Hall");
        let pump = b.room("Pump");
        let tank = b.room("Tank");
        let shelf = b.item("Shelf", 0, &hall, &[]).unwrap();
        let crate_ = b.item("Crate", 0, &hall, &[]).unwrap();
        b.door(&hall, &pump, &[crank.clone().into()]).unwrap();
        b.door(&pump, &tank, &[crank.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let one = RouteSolver.solve_placement(&graph, &place(&[(&shelf, &crank)]));
        assert_eq!(one, RouteSolverResult::NODES_REMAINING);

        let two = RouteSolver.solve_placement(&graph, &place(&[(&shelf, &crank), (&crate_, &crank)]));
        assert!(two.is_ok());
    }
}
