//! Projects an element subtree into nested maps.
//!
//! A node without child elements is a leaf and its value is produced by the
//! supplied leaf function. Any other node becomes a map keyed by child local
//! tag; when siblings share a tag the last one wins.

use std::collections::BTreeMap;
use std::convert::Infallible;

use serde::{Deserialize, Serialize};

use crate::tree::XmlNode;

/// Nested projection of an element subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Projected<V> {
    Leaf(V),
    Branch(BTreeMap<String, Projected<V>>),
}

impl<V> Projected<V> {
    pub fn as_leaf(&self) -> Option<&V> {
        match self {
            Self::Leaf(v) => Some(v),
            Self::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&BTreeMap<String, Projected<V>>> {
        match self {
            Self::Leaf(_) => None,
            Self::Branch(map) => Some(map),
        }
    }

    /// Follow a path of child tags.
    pub fn get(&self, path: &[&str]) -> Option<&Projected<V>> {
        path.iter()
            .try_fold(self, |node, key| node.as_branch()?.get(*key))
    }

    /// Number of leaves below (or at) this node.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Branch(map) => map.values().map(Projected::leaf_count).sum(),
        }
    }
}

/// Project `node`, mapping every leaf through `leaf`.
pub fn project<V, E, F>(node: &XmlNode, leaf: &F) -> Result<Projected<V>, E>
where
    F: Fn(&XmlNode) -> Result<V, E>,
{
    if node.is_leaf() {
        return leaf(node).map(Projected::Leaf);
    }
    let mut map = BTreeMap::new();
    for child in &node.children {
        map.insert(child.tag.clone(), project(child, leaf)?);
    }
    Ok(Projected::Branch(map))
}

/// Project `node` using each leaf's raw text as its value.
pub fn project_text(node: &XmlNode) -> Projected<String> {
    match project(node, &|n: &XmlNode| Ok::<_, Infallible>(n.text.clone())) {
        Ok(projected) => projected,
        Err(never) => match never {},
    }
}
