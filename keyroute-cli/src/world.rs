use std::collections::HashMap;

use anyhow::{bail, Context};
use serde::Deserialize;

use keyroute_core::{EdgeKind, Graph, GraphBuilder, Key, KeyKind, Node, Requirement};

/// JSON world description.
///
/// Each room lists its own items and doors. A door may be listed from both
/// of its rooms; the declarations are merged. Requirements are written as
/// `"key:<name>"` or `"room:<name>"`.
#[derive(Debug, Deserialize)]
pub struct WorldFile {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub keys: Vec<KeyDef>,
    pub rooms: Vec<RoomDef>,
}

#[derive(Debug, Deserialize)]
pub struct KeyDef {
    pub name: String,
    #[serde(default)]
    pub group: u32,
    #[serde(default)]
    pub kind: KeyKind,
}

#[derive(Debug, Deserialize)]
pub struct RoomDef {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ItemDef>,
    #[serde(default)]
    pub doors: Vec<DoorDef>,
}

#[derive(Debug, Deserialize)]
pub struct ItemDef {
    pub name: String,
    #[serde(default)]
    pub group: u32,
    #[serde(default)]
    pub requires: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DoorDef {
    pub target: String,
    #[serde(default)]
    pub kind: EdgeKind,
    #[serde(default)]
    pub requires: Vec<String>,
}

impl WorldFile {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("world file is not valid JSON")
    }

    pub fn build(&self) -> anyhow::Result<Graph> {
        let mut builder = GraphBuilder::new();

        let mut keys: HashMap<&str, Key> = HashMap::new();
        for def in &self.keys {
            let key = builder.key(&def.name, def.group, def.kind);
            if keys.insert(&def.name, key).is_some() {
                bail!("key {:?} is declared twice", def.name);
            }
        }

        let mut rooms: HashMap<&str, Node> = HashMap::new();
        for def in &self.rooms {
            let node = builder.room(&def.name);
            if rooms.insert(&def.name, node).is_some() {
                bail!("room {:?} is declared twice", def.name);
            }
        }

        for room in &self.rooms {
            let node = lookup(&rooms, &room.name, "room")?;
            for item in &room.items {
                let requires = resolve(&item.requires, &keys, &rooms)
                    .with_context(|| format!("item {:?} in room {:?}", item.name, room.name))?;
                builder
                    .item(&item.name, item.group, node, &requires)
                    .with_context(|| format!("item {:?} in room {:?}", item.name, room.name))?;
            }
        }

        for room in &self.rooms {
            let node = lookup(&rooms, &room.name, "room")?;
            for door in &room.doors {
                let context = || format!("door {:?} -> {:?}", room.name, door.target);
                let target = lookup(&rooms, &door.target, "room").with_context(context)?;
                let requires = resolve(&door.requires, &keys, &rooms).with_context(context)?;
                builder
                    .edge(node, target, door.kind, &requires)
                    .with_context(context)?;
            }
        }

        if let Some(start) = &self.start {
            let node = lookup(&rooms, start, "start room")?;
            builder.set_start(node)?;
        }
        Ok(builder.to_graph()?)
    }
}

fn lookup<'a, T>(map: &'a HashMap<&str, T>, name: &str, what: &str) -> anyhow::Result<&'a T> {
    map.get(name)
        .with_context(|| format!("unknown {what} {name:?}"))
}

fn resolve(
    requires: &[String],
    keys: &HashMap<&str, Key>,
    rooms: &HashMap<&str, Node>,
) -> anyhow::Result<Vec<Requirement>> {
    requires
        .iter()
        .map(|text| match text.split_once(':') {
            Some(("key", name)) => lookup(keys, name, "key").map(Requirement::from),
            Some(("room", name)) => lookup(rooms, name, "room").map(Requirement::from),
            _ => bail!("requirement {text:?} should be \"key:<name>\" or \"room:<name>\""),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyroute_core::RouteFinder;

    const RPD: &str = include_str!("../worlds/rpd.json");

    #[test]
    fn sample_world_builds() {
        let graph = WorldFile::parse(RPD).unwrap().build().unwrap();
        assert_eq!(graph.keys().len(), 6);
        assert_eq!(graph.nodes().len(), 29);
        // 19 item edges plus 10 doors after merging both sides.
        assert_eq!(graph.edges().len(), 29);
        assert_eq!(graph.start().label(), Some("103 - RPD FRONT"));

        let marvin = graph.node_by_label("202 - RPD MARVIN").unwrap();
        let hall = graph.node_by_label("200 - RPD MAIN HALL").unwrap();
        let one_way = graph.edges_from(marvin).find(|e| e.destination() == hall).unwrap();
        assert_eq!(one_way.kind(), EdgeKind::OneWay);
    }

    #[test]
    fn sample_world_routes() {
        let graph = WorldFile::parse(RPD).unwrap().build().unwrap();
        let route = RouteFinder::new(Some(77)).find(graph);
        assert!(route.all_nodes_visited());
        assert_eq!(route.item_to_key().len(), 7);
    }

    #[test]
    fn bad_requirement_is_reported() {
        let world = WorldFile::parse(
            r#"{ "rooms": [ { "name": "A", "items": [ { "name": "Box", "requires": ["flag:x"] } ] } ] }"#,
        )
        .unwrap();
        let err = world.build().unwrap_err();
        assert!(format!("{err:#}").contains("flag:x"));
    }

    #[test]
    fn unknown_door_target_is_reported() {
        let world = WorldFile::parse(
            r#"{ "rooms": [ { "name": "A", "doors": [ { "target": "Nowhere" } ] } ] }"#,
        )
        .unwrap();
        let err = world.build().unwrap_err();
        assert!(format!("{err:#}").contains("unknown room \"Nowhere\""));
    }

    #[test]
    fn contradictory_doors_are_reported() {
        let world = WorldFile::parse(
            r#"{
                "rooms": [
                    { "name": "A", "doors": [ { "target": "B", "kind": "one-way" } ] },
                    { "name": "B", "doors": [ { "target": "A" } ] }
                ]
            }"#,
        )
        .unwrap();
        let err = world.build().unwrap_err();
        assert!(format!("{err:#}").contains("graph configuration error"));
    }
}
