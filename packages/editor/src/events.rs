//! Change notifications and the follow-up actions a mutation leaves behind.

use crate::tree::{NodeId, Tree};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// One node's instance changed
    Modify,
    /// Several nodes' instances changed
    ModifyRange,
    /// Children were added, removed or reordered below the node
    Structure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub nodes: Vec<NodeId>,
}

impl ChangeEvent {
    pub fn modify(node: NodeId) -> Self {
        Self {
            kind: ChangeKind::Modify,
            nodes: vec![node],
        }
    }

    /// `Modify` for a single node, `ModifyRange` otherwise
    pub fn modified(nodes: Vec<NodeId>) -> Self {
        match nodes.len() {
            1 => Self::modify(nodes[0]),
            _ => Self {
                kind: ChangeKind::ModifyRange,
                nodes,
            },
        }
    }

    pub fn structure(node: NodeId) -> Self {
        Self {
            kind: ChangeKind::Structure,
            nodes: vec![node],
        }
    }
}

/// Receives change events once a mutation has committed
pub trait ChangeListener {
    fn on_change(&mut self, event: &ChangeEvent, tree: &Tree);
}

/// Work deferred until the current edit has finished; drained in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowUp {
    Select(Vec<NodeId>),
    Expand(NodeId),
    Notify(ChangeEvent),
}
