use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, trace, warn};

use crate::collections::{ImmutableList, ImmutableSet, MultiSet, OneToManyMap};
use crate::graph::{Graph, Passage};
use crate::model::{Key, Node, Requirement};
use crate::prerequisites::guaranteed_requirements;
use crate::route::Route;
use crate::solver::{RouteSolver, RouteSolverResult};
use crate::RouteFinderSettings;

/// Randomised key placement search.
///
/// Walks outwards from the start, placing keys into reachable empty item
/// slots whenever a lock blocks the way, and backtracks out of any
/// placement the [`RouteSolver`] flags as a potential softlock. The same
/// seed over the same graph always yields the same route.
#[derive(Debug, Clone, Default)]
pub struct RouteFinder {
    settings: RouteFinderSettings,
}

impl RouteFinder {
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_settings(RouteFinderSettings {
            seed,
            ..RouteFinderSettings::default()
        })
    }

    pub fn with_settings(settings: RouteFinderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RouteFinderSettings {
        &self.settings
    }

    pub fn find(&self, graph: impl Into<Arc<Graph>>) -> Route {
        let graph: Arc<Graph> = graph.into();
        let rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut search = Search {
            graph: &graph,
            rng,
            max_retries: self.settings.max_retries,
            attempts_left: self.settings.max_attempts,
        };

        let state = search.subgraph(State::default(), graph.start()).into_state();

        let explored_all = state.visited.len() == graph.nodes().len();
        let verdict = RouteSolver.solve_placement(&graph, &state.item_to_key);
        let all_nodes_visited = explored_all && verdict.is_ok();
        if explored_all && !verdict.is_ok() {
            warn!(%verdict, "search explored every node but the placement does not verify");
        } else if !all_nodes_visited {
            warn!(
                explored = state.visited.len(),
                nodes = graph.nodes().len(),
                "search ended without reaching every node"
            );
        }
        debug!(
            placed = state.item_to_key.len(),
            attempts = self.settings.max_attempts - search.attempts_left,
            all_nodes_visited,
            "route search finished"
        );

        let log = state
            .log
            .to_vec()
            .into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        Route::new(Arc::clone(&graph), all_nodes_visited, state.item_to_key, log)
    }
}

/// One branch of the search. Cloning is cheap; every field shares storage
/// with the snapshot it came from.
#[derive(Clone, Default)]
struct State {
    visited: ImmutableSet<Node>,
    keys: MultiSet<Key>,
    next: ImmutableSet<Passage>,
    spare_items: ImmutableSet<Node>,
    one_way: ImmutableSet<Node>,
    item_to_key: OneToManyMap<Node, Key>,
    log: ImmutableList<String>,
}

enum Outcome {
    /// Everything reachable from here was opened.
    Complete(State),
    /// Retries ran out with locks still closed.
    Partial(State),
    /// The placement lets the player get stuck.
    Softlock(State),
}

impl Outcome {
    fn into_state(self) -> State {
        match self {
            Outcome::Complete(state) | Outcome::Partial(state) | Outcome::Softlock(state) => state,
        }
    }
}

struct Search<'g> {
    graph: &'g Graph,
    rng: StdRng,
    max_retries: usize,
    attempts_left: usize,
}

impl Search<'_> {
    /// Starts exploring the region around `start`, assuming only what every
    /// way into it guarantees.
    fn subgraph(&mut self, mut state: State, start: &Node) -> Outcome {
        let guaranteed = guaranteed_requirements(self.graph, &state.item_to_key, start);
        state.visited = state
            .visited
            .union(guaranteed.iter().filter_map(Requirement::as_node).cloned());
        state.keys = guaranteed.iter().filter_map(Requirement::as_key).cloned().collect();
        state.next = ImmutableSet::new();
        state.one_way = ImmutableSet::new();
        state.spare_items = ImmutableSet::new();
        state.log = state.log.push(format!("Begin subgraph {start}"));
        debug!(%start, guaranteed = guaranteed.len(), "begin subgraph");

        let state = self.visit_node(state, start);
        self.fulfill(state)
    }

    fn fulfill(&mut self, state: State) -> Outcome {
        let state = self.expand(state);
        let verdict = RouteSolver.solve_placement(self.graph, &state.item_to_key);
        if verdict.contains(RouteSolverResult::POTENTIAL_SOFTLOCK) {
            trace!(placed = state.item_to_key.len(), "placement rejected as a potential softlock");
            return Outcome::Softlock(state);
        }
        if state.next.is_empty() {
            return self.next_subgraphs(state);
        }

        let mut best: Option<State> = None;
        let mut candidates: Vec<Passage> = state.next.iter().copied().collect();
        candidates.shuffle(&mut self.rng);
        for passage in candidates {
            if self.attempts_left == 0 {
                break;
            }
            let required = self.required_keys(&state, passage);
            if required.is_empty() {
                continue;
            }

            let mut tried: HashSet<Vec<Node>> = HashSet::new();
            for _ in 0..self.max_retries {
                if self.attempts_left == 0 {
                    break;
                }
                let Some(slots) = self.find_slots(&state, &required) else {
                    continue;
                };
                if !tried.insert(slots.clone()) {
                    continue;
                }
                self.attempts_left -= 1;

                let mut placed = state.clone();
                for (item, key) in slots.iter().zip(&required) {
                    placed = place_key(placed, item, key);
                }
                match self.fulfill(placed) {
                    Outcome::Complete(done) => return Outcome::Complete(done),
                    Outcome::Partial(partial) => {
                        let better = best
                            .as_ref()
                            .map_or(true, |b| partial.item_to_key.len() > b.item_to_key.len());
                        if better {
                            best = Some(partial);
                        }
                    }
                    Outcome::Softlock(_) => {}
                }
            }
        }

        trace!(
            open = state.next.len(),
            best = best.as_ref().map_or(0, |b| b.item_to_key.len()),
            "falling back to best partial placement"
        );
        match self.next_subgraphs(best.unwrap_or(state)) {
            Outcome::Complete(state) | Outcome::Partial(state) => Outcome::Partial(state),
            softlock => softlock,
        }
    }

    /// Explores the regions parked behind one-way edges, in random order.
    fn next_subgraphs(&mut self, state: State) -> Outcome {
        let mut pending: Vec<Node> = state.one_way.iter().cloned().collect();
        pending.shuffle(&mut self.rng);
        let mut state = State {
            one_way: ImmutableSet::new(),
            ..state
        };

        let mut complete = true;
        for node in pending {
            if state.visited.contains(&node) {
                continue;
            }
            match self.subgraph(state, &node) {
                Outcome::Complete(next) => state = next,
                Outcome::Partial(next) => {
                    complete = false;
                    state = next;
                }
                softlock @ Outcome::Softlock(_) => return softlock,
            }
        }
        if complete {
            Outcome::Complete(state)
        } else {
            Outcome::Partial(state)
        }
    }

    /// Opens every lock the current inventory already satisfies, repeatedly.
    fn expand(&self, mut state: State) -> State {
        loop {
            let (taken, opened) = self.take_satisfied(state);
            state = taken;
            if opened.is_empty() {
                return state;
            }
            for passage in opened {
                let target = self.graph.target(passage);
                if state.visited.contains(target) {
                    continue;
                }
                if self.graph.edge(passage.edge).kind().is_one_way() {
                    state.one_way = state.one_way.insert(target.clone());
                } else {
                    state = self.visit_node(state, target);
                }
            }
        }
    }

    /// Removes satisfied passages from the frontier, spending consumable
    /// keys as it goes. Passages leading somewhere already reached are
    /// dropped for free.
    fn take_satisfied(&self, mut state: State) -> (State, Vec<Passage>) {
        let mut opened = Vec::new();
        let mut reached: BTreeSet<Node> = BTreeSet::new();
        loop {
            let stale = |state: &State, p: Passage| {
                let target = self.graph.target(p);
                state.visited.contains(target) || reached.contains(target)
            };
            let found = state
                .next
                .iter()
                .copied()
                .find(|&p| stale(&state, p) || self.is_satisfied(&state, p));
            let Some(passage) = found else {
                break;
            };
            let is_stale = stale(&state, passage);
            state.next = state.next.remove(&passage);
            if is_stale {
                continue;
            }

            let edge = self.graph.edge(passage.edge);
            state.keys = state
                .keys
                .remove_many(edge.required_keys().filter(|k| k.is_consumable()));
            reached.insert(self.graph.target(passage).clone());
            opened.push(passage);
        }
        (state, opened)
    }

    fn visit_node(&self, mut state: State, node: &Node) -> State {
        state.visited = state.visited.insert(node.clone());
        if node.is_item() {
            match state.item_to_key.get(node) {
                Some(key) => state.keys = state.keys.add(key.clone()),
                None => state.spare_items = state.spare_items.insert(node.clone()),
            }
        }
        let passages: Vec<Passage> = self
            .graph
            .passages_from(node)
            .into_iter()
            .filter(|&p| !state.visited.contains(self.graph.target(p)))
            .collect();
        state.next = state.next.union(passages);
        state.log = state.log.push(format!("Satisfied node: {node}"));
        state
    }

    fn is_satisfied(&self, state: &State, passage: Passage) -> bool {
        let edge = self.graph.edge(passage.edge);
        edge.required_nodes().all(|n| state.visited.contains(n))
            && self.missing_keys(&state.keys, passage).is_empty()
    }

    /// Copies of each key `passage` still needs on top of `keys`.
    fn missing_keys(&self, keys: &MultiSet<Key>, passage: Passage) -> Vec<Key> {
        let distinct: BTreeSet<&Key> = self.graph.edge(passage.edge).required_keys().collect();
        let mut missing = Vec::new();
        for key in distinct {
            let need = self.graph.key_need(passage, key);
            for _ in keys.count(key)..need {
                missing.push(key.clone());
            }
        }
        missing
    }

    /// Keys to place so that `passage` opens. If those keys would also open
    /// another lock that spends a consumable, an extra copy is added for
    /// it, since expansion will spend one copy per lock.
    fn required_keys(&self, state: &State, passage: Passage) -> Vec<Key> {
        let mut required = self.missing_keys(&state.keys, passage);
        if required.is_empty() {
            return required;
        }
        let boosted = state.keys.add_many(required.iter().cloned());
        for other in state.next.iter().copied() {
            if other.edge == passage.edge || state.visited.contains(self.graph.target(other)) {
                continue;
            }
            if self.missing_keys(&boosted, other).is_empty() {
                required.extend(
                    self.missing_keys(&state.keys, other)
                        .into_iter()
                        .filter(Key::is_consumable),
                );
            }
        }
        required
    }

    /// Picks a distinct spare item for each key, or `None` when some key
    /// has nowhere to go.
    fn find_slots(&mut self, state: &State, required: &[Key]) -> Option<Vec<Node>> {
        if state.spare_items.len() < required.len() {
            return None;
        }
        let mut available: Vec<Node> = state.spare_items.iter().cloned().collect();
        available.shuffle(&mut self.rng);
        let mut slots = Vec::with_capacity(required.len());
        for key in required {
            let index = available.iter().position(|item| item.accepts(key))?;
            slots.push(available.remove(index));
        }
        Some(slots)
    }
}

fn place_key(mut state: State, item: &Node, key: &Key) -> State {
    debug!(%key, %item, "place key");
    state.spare_items = state.spare_items.remove(item);
    state.item_to_key = state.item_to_key.insert(item.clone(), key.clone());
    state.keys = state.keys.add(key.clone());
    state.log = state.log.push(format!("Place {key} at {item}"));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyKind;
    use crate::GraphBuilder;

    fn search(graph: &Graph, seed: u64) -> Search<'_> {
        Search {
            graph,
            rng: StdRng::seed_from_u64(seed),
            max_retries: 10,
            attempts_left: 10_000,
        }
    }

    fn entered(search: &Search<'_>, state: State) -> State {
        let state = search.visit_node(state, search.graph.start());
        search.expand(state)
    }

    #[test]
    fn expansion_stops_at_locks_and_parks_one_way_targets() {
        let mut b = GraphBuilder::new();
        let card = b.key("Card", 0, KeyKind::Reusable);
        let hall = b.room("Hall");
        let lab = b.room("Lab");
        let roof = b.room("Roof");
        let desk = b.item("Desk", 0, &hall, &[]).unwrap();
        b.door(&hall, &lab, &[card.into()]).unwrap();
        b.one_way(&hall, &roof, &[]).unwrap();
        let graph = b.to_graph().unwrap();

        let search = search(&graph, 1);
        let state = entered(&search, State::default());
        assert!(state.visited.contains(&hall));
        assert!(state.visited.contains(&desk));
        assert!(!state.visited.contains(&lab));
        assert!(!state.visited.contains(&roof));
        assert!(state.spare_items.contains(&desk));
        assert!(state.one_way.contains(&roof));
        assert_eq!(state.next.len(), 1);
        assert_eq!(
            state.log.to_vec(),
            vec!["Satisfied node: #2 (Hall)", "Satisfied node: #5 (Desk)"]
        );
    }

    #[test]
    fn second_way_into_an_opened_room_costs_nothing() {
        let mut b = GraphBuilder::new();
        let small = b.key("Small Key", 0, KeyKind::Consumable);
        let hall = b.room("Hall");
        let west = b.room("West");
        let vault = b.room("Vault");
        let drawer = b.item("Drawer", 0, &hall, &[]).unwrap();
        let chest = b.item("Chest", 0, &hall, &[]).unwrap();
        b.door(&hall, &west, &[]).unwrap();
        b.door(&hall, &vault, &[small.clone().into()]).unwrap();
        b.door(&west, &vault, &[small.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let placed = State {
            item_to_key: OneToManyMap::new()
                .insert(drawer, small.clone())
                .insert(chest, small.clone()),
            ..State::default()
        };
        let search = search(&graph, 1);
        let state = entered(&search, placed);
        assert!(state.visited.contains(&vault));
        assert!(state.next.is_empty());
        assert_eq!(state.keys.count(&small), 1);
    }

    #[test]
    fn consumable_lookahead_adds_a_copy_per_lock() {
        let mut b = GraphBuilder::new();
        let small = b.key("Small Key", 0, KeyKind::Consumable);
        let hall = b.room("Hall");
        let west = b.room("West");
        let east = b.room("East");
        b.item("Drawer", 0, &hall, &[]).unwrap();
        b.item("Chest", 0, &hall, &[]).unwrap();
        b.door(&hall, &west, &[small.clone().into()]).unwrap();
        b.door(&hall, &east, &[small.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let search = search(&graph, 1);
        let state = entered(&search, State::default());
        let passage = state.next.iter().copied().next().unwrap();
        assert_eq!(search.required_keys(&state, passage), vec![small.clone(), small]);
    }

    #[test]
    fn reusable_keys_are_not_doubled() {
        let mut b = GraphBuilder::new();
        let card = b.key("Card", 0, KeyKind::Reusable);
        let hall = b.room("Hall");
        let west = b.room("West");
        let east = b.room("East");
        b.item("Drawer", 0, &hall, &[]).unwrap();
        b.door(&hall, &west, &[card.clone().into()]).unwrap();
        b.door(&hall, &east, &[card.clone().into()]).unwrap();
        let graph = b.to_graph().unwrap();

        let search = search(&graph, 1);
        let state = entered(&search, State::default());
        let passage = state.next.iter().copied().next().unwrap();
        assert_eq!(search.required_keys(&state, passage), vec![card]);
    }

    #[test]
    fn slots_must_cover_the_key_group() {
        let mut b = GraphBuilder::new();
        let card = b.key("Card", 0b01, KeyKind::Reusable);
        let hall = b.room("Hall");
        b.item("Narrow", 0b10, &hall, &[]).unwrap();
        let wide = b.item("Wide", 0b11, &hall, &[]).unwrap();
        let graph = b.to_graph().unwrap();

        for seed in 0..20 {
            let mut search = search(&graph, seed);
            let state = entered(&search, State::default());
            assert_eq!(
                search.find_slots(&state, &[card.clone()]),
                Some(vec![wide.clone()])
            );
            assert_eq!(search.find_slots(&state, &[card.clone(), card.clone()]), None);
        }
    }

    #[test]
    fn settings_carry_the_seed() {
        let finder = RouteFinder::new(Some(9));
        assert_eq!(finder.settings().seed, Some(9));
        assert_eq!(finder.settings().max_retries, 10);
    }
}
