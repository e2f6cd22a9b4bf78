//! `whistle paths`: every leaf of a document with its path.

use whistle_json::{MetaKind, MetaTree, Value};

/// `(path, value)` for each leaf, in document order.
pub fn leaf_paths(document: &Value) -> Vec<(String, Value)> {
    let tree = MetaTree::from_value(document);
    tree.leaves()
        .into_iter()
        .filter_map(|id| match tree.get(id).map(|n| &n.kind) {
            Some(MetaKind::Leaf(value)) => Some((tree.path(id), value.clone())),
            _ => None,
        })
        .collect()
}

pub fn render_text(leaves: &[(String, Value)]) -> String {
    leaves
        .iter()
        .map(|(path, value)| format!("{}: {}", path, value))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_json(leaves: &[(String, Value)]) -> serde_json::Value {
    serde_json::Value::Object(
        leaves
            .iter()
            .map(|(path, value)| (path.clone(), serde_json::Value::from(value.clone())))
            .collect(),
    )
}
