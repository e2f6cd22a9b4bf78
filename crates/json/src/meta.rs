//! An arena view of a document in which every node knows its parent.

use std::collections::BTreeMap;

use crate::error::JsonError;
use crate::path::{format_path, segment_path, Segment};
use crate::value::Value;

/// Index of a node within its [`MetaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub enum MetaKind {
    Container(BTreeMap<String, NodeId>),
    Array(Vec<NodeId>),
    Leaf(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaNode {
    /// How the parent reaches this node; `None` for the root.
    pub key: Option<Segment>,
    pub parent: Option<NodeId>,
    pub kind: MetaKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaTree {
    nodes: Vec<MetaNode>,
}

impl MetaTree {
    pub fn from_value(value: &Value) -> MetaTree {
        let mut tree = MetaTree { nodes: Vec::new() };
        tree.insert(value, None, None);
        tree
    }

    fn insert(&mut self, value: &Value, key: Option<Segment>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(MetaNode {
            key,
            parent,
            kind: MetaKind::Leaf(Value::Null),
        });
        let kind = match value {
            Value::Container(fields) => MetaKind::Container(
                fields
                    .iter()
                    .map(|(k, v)| {
                        let child = self.insert(v, Some(Segment::Field(k.clone())), Some(id));
                        (k.clone(), child)
                    })
                    .collect(),
            ),
            Value::Array(items) => MetaKind::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.insert(v, Some(Segment::Index(i)), Some(id)))
                    .collect(),
            ),
            leaf => MetaKind::Leaf(leaf.clone()),
        };
        self.nodes[id.0].kind = kind;
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&MetaNode> {
        self.nodes.get(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Path from the root to `id`, escaped so it can be fed back to
    /// [`segment_path`].
    pub fn path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cursor = self.get(id);
        while let Some(node) = cursor {
            if let Some(key) = &node.key {
                segments.push(key.clone());
            }
            cursor = node.parent.and_then(|p| self.get(p));
        }
        segments.reverse();
        format_path(&segments)
    }

    /// The node at `path` below `from`, or `None` if absent.
    ///
    /// Wildcards select several nodes and are rejected; use
    /// [`MetaTree::find_all`].
    pub fn find(&self, from: NodeId, path: &str) -> Result<Option<NodeId>, JsonError> {
        let mut current = from;
        for segment in segment_path(path)? {
            if segment == Segment::Wildcard {
                return Err(JsonError::MisplacedSegment {
                    segment: segment.to_string(),
                    context: "finding a single",
                });
            }
            match self.step(current, &segment)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Every node matched by `path` below `from`, expanding wildcards.
    pub fn find_all(&self, from: NodeId, path: &str) -> Result<Vec<NodeId>, JsonError> {
        let mut frontier = vec![from];
        for segment in segment_path(path)? {
            let mut next = Vec::new();
            for id in frontier {
                if segment == Segment::Wildcard {
                    match self.get(id).map(|n| &n.kind) {
                        Some(MetaKind::Array(children)) => next.extend(children.iter().copied()),
                        Some(MetaKind::Leaf(Value::Null) | MetaKind::Container(_)) | None => {}
                        Some(MetaKind::Leaf(v)) => {
                            return Err(JsonError::KeyIntoPrimitive {
                                kind: v.type_name(),
                                segment: segment.to_string(),
                            })
                        }
                    }
                } else if let Some(child) = self.step(id, &segment)? {
                    next.push(child);
                }
            }
            frontier = next;
        }
        Ok(frontier)
    }

    fn step(&self, id: NodeId, segment: &Segment) -> Result<Option<NodeId>, JsonError> {
        let Some(node) = self.get(id) else {
            return Ok(None);
        };
        match (&node.kind, segment) {
            (MetaKind::Container(fields), Segment::Field(name)) => Ok(fields.get(name).copied()),
            (MetaKind::Container(_), Segment::Index(_) | Segment::Wildcard) => Ok(None),
            (MetaKind::Container(_), other) => Err(JsonError::MisplacedSegment {
                segment: other.to_string(),
                context: "reading",
            }),
            (MetaKind::Array(items), Segment::Index(i)) => Ok(items.get(*i).copied()),
            (MetaKind::Array(_), Segment::Field(name)) => Err(JsonError::ArrayWithoutIndex {
                segment: name.clone(),
            }),
            (MetaKind::Array(_), other) => Err(JsonError::MisplacedSegment {
                segment: other.to_string(),
                context: "reading",
            }),
            (MetaKind::Leaf(Value::Null), _) => Ok(None),
            (MetaKind::Leaf(v), other) => Err(JsonError::KeyIntoPrimitive {
                kind: v.type_name(),
                segment: other.to_string(),
            }),
        }
    }

    /// Leaf nodes in document order.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.nodes.is_empty() {
            self.collect_leaves(self.root(), &mut out);
        }
        out
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match self.get(id).map(|n| &n.kind) {
            Some(MetaKind::Container(fields)) => {
                for child in fields.values() {
                    self.collect_leaves(*child, out);
                }
            }
            Some(MetaKind::Array(items)) => {
                for child in items {
                    self.collect_leaves(*child, out);
                }
            }
            Some(MetaKind::Leaf(_)) => out.push(id),
            None => {}
        }
    }

    /// Rebuilds the document rooted at `id`.
    pub fn to_value(&self, id: NodeId) -> Value {
        match self.get(id).map(|n| &n.kind) {
            Some(MetaKind::Container(fields)) => Value::Container(
                fields
                    .iter()
                    .map(|(k, child)| (k.clone(), self.to_value(*child)))
                    .collect(),
            ),
            Some(MetaKind::Array(items)) => {
                Value::Array(items.iter().map(|child| self.to_value(*child)).collect())
            }
            Some(MetaKind::Leaf(v)) => v.clone(),
            None => Value::Null,
        }
    }
}
