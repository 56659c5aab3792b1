use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::collections::OneToManyMap;
use crate::mermaid::{MermaidBuilder, MermaidEdgeStyle, MermaidShape};
use crate::model::{Edge, EdgeKind, Key, KeyKind, Node};

/// One way of walking an edge: forwards from its source, or backwards from
/// its destination when the edge is two-way.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub(crate) struct Passage {
    pub edge: usize,
    pub reverse: bool,
}

/// The static world: keys, nodes, edges and a start node.
///
/// Adjacency, the subgraph partition and removable key counts are derived
/// once here and never change afterwards. Build one with
/// [`GraphBuilder`](crate::GraphBuilder).
#[derive(Debug, Clone)]
pub struct Graph {
    keys: Vec<Key>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    start: Node,
    outgoing: HashMap<Node, Vec<usize>>,
    incoming: HashMap<Node, Vec<usize>>,
    subgraphs: Vec<Vec<Node>>,
    removable_counts: HashMap<(Passage, u32), usize>,
}

impl Graph {
    pub(crate) fn new(keys: Vec<Key>, nodes: Vec<Node>, edges: Vec<Edge>, start: Node) -> Self {
        let mut outgoing: HashMap<Node, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<Node, Vec<usize>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.source().clone()).or_default().push(idx);
            incoming.entry(edge.destination().clone()).or_default().push(idx);
        }

        let mut graph = Self {
            keys,
            nodes,
            edges,
            start,
            outgoing,
            incoming,
            subgraphs: Vec::new(),
            removable_counts: HashMap::new(),
        };
        graph.subgraphs = graph.partition();
        graph.removable_counts = graph.count_removable_keys();
        graph
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn start(&self) -> &Node {
        &self.start
    }

    /// Regions joined by two-way edges, in discovery order from the start.
    /// One-way and no-return edges separate regions.
    pub fn subgraphs(&self) -> &[Vec<Node>] {
        &self.subgraphs
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn node_by_label(&self, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.label() == Some(label))
    }

    pub fn key_by_label(&self, label: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.label() == Some(label))
    }

    /// Edges declared with `node` as their source.
    pub fn edges_from<'a>(&'a self, node: &Node) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edge_indices(&self.outgoing, node).map(move |idx| &self.edges[idx])
    }

    /// Edges declared with `node` as their destination.
    pub fn edges_to<'a>(&'a self, node: &Node) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edge_indices(&self.incoming, node).map(move |idx| &self.edges[idx])
    }

    fn edge_indices<'a>(
        &self,
        map: &'a HashMap<Node, Vec<usize>>,
        node: &Node,
    ) -> impl Iterator<Item = usize> + 'a {
        map.get(node).into_iter().flatten().copied()
    }

    pub(crate) fn edge(&self, idx: usize) -> &Edge {
        &self.edges[idx]
    }

    /// Ways of leaving `node`.
    pub(crate) fn passages_from(&self, node: &Node) -> Vec<Passage> {
        let forward = self
            .edge_indices(&self.outgoing, node)
            .map(|edge| Passage { edge, reverse: false });
        let backward = self
            .edge_indices(&self.incoming, node)
            .filter(|&idx| self.edges[idx].kind() == EdgeKind::TwoWay)
            .map(|edge| Passage { edge, reverse: true });
        forward.chain(backward).collect()
    }

    /// Ways of arriving at `node`.
    pub(crate) fn passages_into(&self, node: &Node) -> Vec<Passage> {
        let forward = self
            .edge_indices(&self.incoming, node)
            .map(|edge| Passage { edge, reverse: false });
        let backward = self
            .edge_indices(&self.outgoing, node)
            .filter(|&idx| self.edges[idx].kind() == EdgeKind::TwoWay)
            .map(|edge| Passage { edge, reverse: true });
        forward.chain(backward).collect()
    }

    pub(crate) fn origin(&self, passage: Passage) -> &Node {
        let edge = &self.edges[passage.edge];
        if passage.reverse {
            edge.destination()
        } else {
            edge.source()
        }
    }

    pub(crate) fn target(&self, passage: Passage) -> &Node {
        let edge = &self.edges[passage.edge];
        if passage.reverse {
            edge.source()
        } else {
            edge.destination()
        }
    }

    /// Copies of `key` that must be held to walk `passage`. Removable keys
    /// also count the copies left in locks on the cheapest way there.
    pub(crate) fn key_need(&self, passage: Passage, key: &Key) -> usize {
        if key.kind() == KeyKind::Removable {
            if let Some(&count) = self.removable_counts.get(&(passage, key.id())) {
                return count;
            }
        }
        self.edges[passage.edge].key_occurrences(key)
    }

    fn partition(&self) -> Vec<Vec<Node>> {
        let mut assigned: HashSet<Node> = HashSet::new();
        let mut subgraphs = Vec::new();
        let mut seeds: VecDeque<Node> = VecDeque::from([self.start.clone()]);
        let mut leftovers = self.nodes.iter();

        loop {
            let seed = match seeds.pop_front() {
                Some(seed) => seed,
                None => match leftovers.find(|n| !assigned.contains(*n)) {
                    Some(node) => node.clone(),
                    None => break,
                },
            };
            if !assigned.insert(seed.clone()) {
                continue;
            }

            let mut members = Vec::new();
            let mut queue = VecDeque::from([seed]);
            while let Some(node) = queue.pop_front() {
                for idx in self.edge_indices(&self.outgoing, &node) {
                    let edge = &self.edges[idx];
                    if edge.kind().is_two_way() {
                        if assigned.insert(edge.destination().clone()) {
                            queue.push_back(edge.destination().clone());
                        }
                    } else {
                        seeds.push_back(edge.destination().clone());
                    }
                }
                for idx in self.edge_indices(&self.incoming, &node) {
                    let edge = &self.edges[idx];
                    if edge.kind().is_two_way() && assigned.insert(edge.source().clone()) {
                        queue.push_back(edge.source().clone());
                    }
                }
                members.push(node);
            }
            subgraphs.push(members);
        }
        subgraphs
    }

    fn count_removable_keys(&self) -> HashMap<(Passage, u32), usize> {
        let passages: Vec<Passage> = (0..self.edges.len())
            .flat_map(|edge| {
                let forward = Passage { edge, reverse: false };
                let backward = (self.edges[edge].kind() == EdgeKind::TwoWay)
                    .then_some(Passage { edge, reverse: true });
                std::iter::once(forward).chain(backward)
            })
            .collect();
        let removable: BTreeSet<&Key> = self
            .edges
            .iter()
            .flat_map(|edge| edge.required_keys())
            .filter(|k| k.kind() == KeyKind::Removable)
            .collect();

        let mut counts = HashMap::new();
        for key in removable {
            let spent = self.fewest_removed(&passages, key);
            for &passage in &passages {
                let own = self.edges[passage.edge].key_occurrences(key);
                if own == 0 {
                    continue;
                }
                let before = spent.get(self.origin(passage)).copied().unwrap_or(0);
                counts.insert((passage, key.id()), before + own);
            }
        }
        counts
    }

    /// Fewest copies of `key` left behind in locks on any walk from the
    /// start to each reachable node.
    fn fewest_removed(&self, passages: &[Passage], key: &Key) -> HashMap<Node, usize> {
        let mut spent = HashMap::from([(self.start.clone(), 0)]);
        loop {
            let mut changed = false;
            for &passage in passages {
                let Some(&before) = spent.get(self.origin(passage)) else {
                    continue;
                };
                let cost = before + self.edges[passage.edge].key_occurrences(key);
                let target = self.target(passage);
                if spent.get(target).map_or(true, |&known| cost < known) {
                    spent.insert(target.clone(), cost);
                    changed = true;
                }
            }
            if !changed {
                return spent;
            }
        }
    }

    /// Mermaid flowchart of the graph, one Mermaid subgraph per region.
    pub fn to_mermaid(&self, use_labels: bool, include_items: bool) -> String {
        self.render_mermaid(use_labels, include_items, None)
    }

    pub(crate) fn render_mermaid(
        &self,
        use_labels: bool,
        include_items: bool,
        placement: Option<&OneToManyMap<Node, Key>>,
    ) -> String {
        let shown = |node: &Node| include_items || !node.is_item();
        let mut mb = MermaidBuilder::new();
        mb.node("S", " ", MermaidShape::Circle);

        for (index, subgraph) in self.subgraphs.iter().enumerate() {
            mb.begin_subgraph(&format!("G<sub>{index}</sub>"));
            for node in subgraph.iter().filter(|n| shown(n)) {
                let (letter, mut shape) = if node.is_item() {
                    ('I', MermaidShape::Square)
                } else {
                    ('R', MermaidShape::Circle)
                };
                let mut label = match node.label() {
                    Some(text) if use_labels && !text.is_empty() => text.to_string(),
                    _ => format!("{letter}<sub>{}</sub>", node.id()),
                };
                if let Some(key) = placement.and_then(|p| p.get(node)) {
                    label.push_str(&format!("<br/><small>{}</small>", key_name(key, use_labels)));
                    shape = MermaidShape::DoubleSquare;
                }
                mb.node(&node_name(node), &label, shape);
            }
            mb.end_subgraph();
        }

        mb.edge("S", &node_name(&self.start), "", MermaidEdgeStyle::Solid);

        for edge in &self.edges {
            if !shown(edge.source()) || !shown(edge.destination()) {
                continue;
            }
            let keys: Vec<String> = edge
                .required_keys()
                .map(|k| {
                    let icon = match k.kind() {
                        KeyKind::Consumable => "fa:fa-triangle-exclamation ",
                        KeyKind::Removable => "fa:fa-circle ",
                        KeyKind::Reusable => "",
                    };
                    format!("{icon}{}", key_name(k, use_labels))
                })
                .collect();
            let style = match edge.kind() {
                EdgeKind::TwoWay => MermaidEdgeStyle::Bidirectional,
                EdgeKind::UnlockTwoWay => MermaidEdgeStyle::BidirectionalDotted,
                EdgeKind::OneWay => MermaidEdgeStyle::Dotted,
                EdgeKind::NoReturn => MermaidEdgeStyle::Thick,
            };
            mb.edge(
                &node_name(edge.source()),
                &node_name(edge.destination()),
                &keys.join(" + "),
                style,
            );
        }
        mb.finish()
    }
}

fn node_name(node: &Node) -> String {
    format!("N{}", node.id())
}

fn key_name(key: &Key, use_labels: bool) -> String {
    match key.label() {
        Some(label) if use_labels && !label.is_empty() => label.to_string(),
        _ => format!("K<sub>{}</sub>", key.id()),
    }
}
