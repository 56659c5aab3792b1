use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// A room, or any other location the player can stand in.
    #[default]
    Default,
    /// A slot that can hold one key.
    Item,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyKind {
    /// Opening a lock never reduces the supply.
    #[default]
    Reusable,
    /// Each use permanently removes one copy from the inventory.
    Consumable,
    /// Copies are left behind in locks; the supply needed for an edge is
    /// counted along the path that reaches it.
    Removable,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Openable from either side, open both ways afterwards.
    #[default]
    TwoWay,
    /// Openable only from the source side, open both ways afterwards.
    UnlockTwoWay,
    /// Passable only from source to destination.
    OneWay,
    /// Passable once; the source side cannot be reached again.
    NoReturn,
}

impl EdgeKind {
    /// Whether the edge joins its endpoints into the same subgraph.
    pub fn is_two_way(self) -> bool {
        matches!(self, EdgeKind::TwoWay | EdgeKind::UnlockTwoWay)
    }

    pub fn is_one_way(self) -> bool {
        !self.is_two_way()
    }
}

/// A room or an item slot. Equality, ordering and hashing use the id only.
#[derive(Clone, Debug, Serialize)]
pub struct Node {
    id: u32,
    group: u32,
    kind: NodeKind,
    label: Option<Arc<str>>,
}

impl Node {
    pub fn new(id: u32, group: u32, kind: NodeKind, label: Option<&str>) -> Self {
        Self {
            id,
            group,
            kind,
            label: label.map(Arc::from),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Bit flags matched against a key's group when choosing slots.
    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_item(&self) -> bool {
        self.kind == NodeKind::Item
    }

    /// Whether `key` may be placed in this slot: every group bit the key
    /// asks for must be present on the slot.
    pub fn accepts(&self, key: &Key) -> bool {
        self.group & key.group == key.group
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "#{} ({})", self.id, label),
            None => write!(f, "#{}", self.id),
        }
    }
}

/// An unlock resource. Equality, ordering and hashing use the id only.
#[derive(Clone, Debug, Serialize)]
pub struct Key {
    id: u32,
    group: u32,
    kind: KeyKind,
    label: Option<Arc<str>>,
}

impl Key {
    pub fn new(id: u32, group: u32, kind: KeyKind, label: Option<&str>) -> Self {
        Self {
            id,
            group,
            kind,
            label: label.map(Arc::from),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_consumable(&self) -> bool {
        self.kind == KeyKind::Consumable
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "#{} ({})", self.id, label),
            None => write!(f, "#{}", self.id),
        }
    }
}

/// Something that must hold before an edge can be used: a key in the
/// inventory or a node already visited.
///
/// A soft requirement was inferred rather than authored. Softness takes
/// part in equality, so a soft and a hard requirement on the same node are
/// distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Requirement {
    Key { key: Key, soft: bool },
    Node { node: Node, soft: bool },
}

impl Requirement {
    pub fn key(key: Key) -> Self {
        Requirement::Key { key, soft: false }
    }

    pub fn node(node: Node) -> Self {
        Requirement::Node { node, soft: false }
    }

    pub fn into_soft(self) -> Self {
        match self {
            Requirement::Key { key, .. } => Requirement::Key { key, soft: true },
            Requirement::Node { node, .. } => Requirement::Node { node, soft: true },
        }
    }

    pub fn is_soft(&self) -> bool {
        match self {
            Requirement::Key { soft, .. } | Requirement::Node { soft, .. } => *soft,
        }
    }

    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Requirement::Key { key, .. } => Some(key),
            Requirement::Node { .. } => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Requirement::Node { node, .. } => Some(node),
            Requirement::Key { .. } => None,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Requirement::Key { key, .. } => key.id(),
            Requirement::Node { node, .. } => node.id(),
        }
    }
}

impl From<Key> for Requirement {
    fn from(key: Key) -> Self {
        Requirement::key(key)
    }
}

impl From<&Key> for Requirement {
    fn from(key: &Key) -> Self {
        Requirement::key(key.clone())
    }
}

impl From<Node> for Requirement {
    fn from(node: Node) -> Self {
        Requirement::node(node)
    }
}

impl From<&Node> for Requirement {
    fn from(node: &Node) -> Self {
        Requirement::node(node.clone())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Key { key, .. } => write!(f, "{key}")?,
            Requirement::Node { node, .. } => write!(f, "{node}")?,
        }
        if self.is_soft() {
            write!(f, "?")?;
        }
        Ok(())
    }
}

/// A typed connection between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Edge {
    source: Node,
    destination: Node,
    requires: Arc<[Requirement]>,
    kind: EdgeKind,
}

impl Edge {
    pub fn new(source: Node, destination: Node, requires: Vec<Requirement>, kind: EdgeKind) -> Self {
        Self {
            source,
            destination,
            requires: requires.into(),
            kind,
        }
    }

    pub fn source(&self) -> &Node {
        &self.source
    }

    pub fn destination(&self) -> &Node {
        &self.destination
    }

    pub fn requires(&self) -> &[Requirement] {
        &self.requires
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    pub fn required_keys(&self) -> impl Iterator<Item = &Key> + '_ {
        self.requires.iter().filter_map(Requirement::as_key)
    }

    pub fn required_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.requires.iter().filter_map(Requirement::as_node)
    }

    /// How many times `key` appears in the requirement list.
    pub fn key_occurrences(&self, key: &Key) -> usize {
        self.required_keys().filter(|k| *k == key).count()
    }

    pub(crate) fn with_requires(&self, requires: &[Requirement]) -> Self {
        Self {
            requires: requires.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let requires = if self.requires.is_empty() {
            String::new()
        } else {
            let list: Vec<String> = self.requires.iter().map(ToString::to_string).collect();
            format!(" [{}] ", list.join(", "))
        };
        let arrow = match self.kind {
            EdgeKind::TwoWay => ("<=", "=>"),
            EdgeKind::UnlockTwoWay => ("<-", "=>"),
            EdgeKind::OneWay => ("==", "=>"),
            EdgeKind::NoReturn => ("==", "=>|"),
        };
        write!(f, "{} {}{}{} {}", self.source, arrow.0, requires, arrow.1, self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_equality_uses_id_only() {
        let a = Node::new(3, 0, NodeKind::Default, Some("Hall"));
        let b = Node::new(3, 4, NodeKind::Item, None);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "#3 (Hall)");
        assert_eq!(b.to_string(), "#3");
    }

    #[test]
    fn slot_accepts_superset_groups() {
        let key = Key::new(1, 0b01, KeyKind::Reusable, None);
        let exact = Node::new(2, 0b01, NodeKind::Item, None);
        let wider = Node::new(3, 0b11, NodeKind::Item, None);
        let other = Node::new(4, 0b10, NodeKind::Item, None);
        assert!(exact.accepts(&key));
        assert!(wider.accepts(&key));
        assert!(!other.accepts(&key));

        let any = Key::new(5, 0, KeyKind::Reusable, None);
        assert!(other.accepts(&any));
    }

    #[test]
    fn soft_requirements_are_distinct() {
        let node = Node::new(1, 0, NodeKind::Default, None);
        let hard = Requirement::node(node.clone());
        let soft = Requirement::node(node).into_soft();
        assert_ne!(hard, soft);
        assert!(soft.is_soft());
        assert_eq!(hard.id(), soft.id());
    }

    #[test]
    fn edge_lists_keys_and_nodes() {
        let a = Node::new(1, 0, NodeKind::Default, Some("A"));
        let b = Node::new(2, 0, NodeKind::Default, Some("B"));
        let jewel = Key::new(3, 0, KeyKind::Consumable, Some("Jewel"));
        let edge = Edge::new(
            a.clone(),
            b,
            vec![jewel.clone().into(), jewel.clone().into(), a.into()],
            EdgeKind::TwoWay,
        );
        assert_eq!(edge.required_keys().count(), 2);
        assert_eq!(edge.required_nodes().count(), 1);
        assert_eq!(edge.key_occurrences(&jewel), 2);
        assert_eq!(
            edge.to_string(),
            "#1 (A) <= [#3 (Jewel), #3 (Jewel), #1 (A)] => #2 (B)"
        );
    }
}
