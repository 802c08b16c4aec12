use serde::Serialize;

use crate::domain::Attributes;
use crate::format::{display_value, tag_to_string};

pub const INSPECTOR_HEADERS: &[&str] = &["Attribute Name", "Tag", "VR", "Value"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InspectorLine {
    Attribute {
        depth: usize,
        name: String,
        tag: String,
        vr: String,
        value: String,
    },
    Item {
        depth: usize,
        number: usize,
    },
}

impl InspectorLine {
    pub fn depth(&self) -> usize {
        match self {
            InspectorLine::Attribute { depth, .. } | InspectorLine::Item { depth, .. } => *depth,
        }
    }

    /// `>` once per nesting level.
    pub fn indent(&self) -> String {
        ">".repeat(self.depth())
    }
}

/// Depth-first listing of a record: each attribute, and under each sequence
/// an `Item #n` line followed by that item's attributes one level deeper.
pub fn inspect(attributes: &Attributes) -> Vec<InspectorLine> {
    let mut lines = Vec::new();
    push_attributes(attributes, 0, &mut lines);
    lines
}

fn push_attributes(attributes: &Attributes, depth: usize, lines: &mut Vec<InspectorLine>) {
    for (name, attribute) in attributes.iter() {
        lines.push(InspectorLine::Attribute {
            depth,
            name: name.to_string(),
            tag: tag_to_string(&attribute.tag),
            vr: attribute.vr.clone(),
            value: display_value(attribute),
        });
        if let Some(items) = &attribute.sequence {
            for (index, item) in items.iter().enumerate() {
                lines.push(InspectorLine::Item {
                    depth: depth + 1,
                    number: index + 1,
                });
                push_attributes(item, depth + 1, lines);
            }
        }
    }
}
