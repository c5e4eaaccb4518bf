//! Arena representation for record graphs that may alias or loop.
//!
//! A [`Record`] tree cannot express a field that points back at an ancestor.
//! [`RecordGraph`] can: nodes live in an arena and refer to their nested
//! record by [`NodeId`]. The encoder walks the graph from a root and rejects
//! any node it meets twice on the way down, since the wire format has no
//! back-references.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::EncodeError;
use crate::record::Record;

/// Index of a node inside a [`RecordGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in its arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A record whose nested reference is an arena index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordNode {
    /// Integer field.
    pub n: i64,
    /// Text field.
    pub s: String,
    /// Map field.
    pub m: BTreeMap<String, i64>,
    /// Byte sequence field.
    pub p: Vec<u8>,
    /// Nested record, possibly an ancestor.
    pub c: Option<NodeId>,
}

impl RecordNode {
    /// Creates a node with the scalar fields set and no nested record.
    #[must_use]
    pub fn new(n: i64, s: impl Into<String>) -> Self {
        Self {
            n,
            s: s.into(),
            ..Self::default()
        }
    }

    fn from_record_fields(record: &Record) -> Self {
        Self {
            n: record.n,
            s: record.s.clone(),
            m: record.m.clone(),
            p: record.p.clone(),
            c: None,
        }
    }
}

/// Arena of [`RecordNode`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordGraph {
    nodes: Vec<RecordNode>,
}

impl RecordGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its identifier.
    pub fn insert(&mut self, node: RecordNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Looks up a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&RecordNode> {
        self.nodes.get(id.0)
    }

    /// Looks up a node for modification.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut RecordNode> {
        self.nodes.get_mut(id.0)
    }

    /// Points `parent`'s nested reference at `child`, or clears it.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::DanglingNode`] if either identifier is not in
    /// this arena.
    pub fn set_child(&mut self, parent: NodeId, child: Option<NodeId>) -> Result<(), EncodeError> {
        if let Some(target) = child
            && self.get(target).is_none()
        {
            return Err(EncodeError::DanglingNode { node: target });
        }
        let node = self
            .get_mut(parent)
            .ok_or(EncodeError::DanglingNode { node: parent })?;
        node.c = child;
        Ok(())
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the arena holds no nodes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Copies a record tree into a fresh arena, returning it with the root.
    #[must_use]
    pub fn from_record(record: &Record) -> (Self, NodeId) {
        let mut graph = Self::new();
        let root = graph.insert(RecordNode::from_record_fields(record));
        let mut parent = root;
        let mut current = record.c.as_deref();
        while let Some(nested) = current {
            let id = graph.insert(RecordNode::from_record_fields(nested));
            if let Some(node) = graph.get_mut(parent) {
                node.c = Some(id);
            }
            parent = id;
            current = nested.c.as_deref();
        }
        (graph, root)
    }

    /// Copies the chain starting at `root` into a record tree.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Cycle`] if the chain revisits a node,
    /// [`EncodeError::DepthExceeded`] past `max_depth` records, and
    /// [`EncodeError::DanglingNode`] for identifiers outside the arena.
    pub fn to_record(&self, root: NodeId, max_depth: usize) -> Result<Record, EncodeError> {
        let chain = self.chain(root, max_depth)?;
        let mut built: Option<Record> = None;
        for node in chain.iter().rev() {
            let mut record = Record::new(node.n, node.s.clone())
                .with_entries(node.m.iter().map(|(key, value)| (key.clone(), *value)))
                .with_bytes(node.p.clone());
            if let Some(child) = built.take() {
                record = record.with_child(child);
            }
            built = Some(record);
        }
        built.ok_or(EncodeError::DanglingNode { node: root })
    }

    /// Resolves the nodes reachable from `root`, in order, rejecting cycles.
    pub(crate) fn chain(
        &self,
        root: NodeId,
        max_depth: usize,
    ) -> Result<Vec<&RecordNode>, EncodeError> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut next = Some(root);
        while let Some(id) = next {
            if !seen.insert(id) {
                return Err(EncodeError::Cycle { node: id });
            }
            if chain.len() == max_depth {
                return Err(EncodeError::DepthExceeded { max_depth });
            }
            let node = self.get(id).ok_or(EncodeError::DanglingNode { node: id })?;
            chain.push(node);
            next = node.c;
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_loop() -> (RecordGraph, NodeId) {
        let mut graph = RecordGraph::new();
        let root = graph.insert(RecordNode::new(1, "root"));
        let child = graph.insert(RecordNode::new(2, "child"));
        graph.set_child(root, Some(child)).expect("link child");
        graph.set_child(child, Some(root)).expect("link back");
        (graph, root)
    }

    #[test]
    fn from_record_preserves_the_chain() {
        let record = Record::new(1, "a").with_child(Record::new(2, "b"));
        let (graph, root) = RecordGraph::from_record(&record);
        assert_eq!(graph.len(), 2);
        let rebuilt = graph.to_record(root, 8).expect("rebuild");
        assert_eq!(rebuilt, record);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = RecordGraph::new();
        let root = graph.insert(RecordNode::new(7, "self"));
        graph.set_child(root, Some(root)).expect("link self");
        let error = graph.to_record(root, 8).expect_err("cycle");
        assert!(matches!(error, EncodeError::Cycle { node } if node == root));
    }

    #[test]
    fn ancestor_loop_is_a_cycle() {
        let (graph, root) = two_node_loop();
        let error = graph.chain(root, 8).expect_err("cycle");
        assert!(matches!(error, EncodeError::Cycle { .. }));
    }

    #[test]
    fn shared_node_reached_once_is_not_a_cycle() {
        let mut graph = RecordGraph::new();
        let shared = graph.insert(RecordNode::new(3, "shared"));
        let first = graph.insert(RecordNode::new(1, "first"));
        let second = graph.insert(RecordNode::new(2, "second"));
        graph.set_child(first, Some(shared)).expect("link first");
        graph.set_child(second, Some(shared)).expect("link second");

        let from_first = graph.to_record(first, 8).expect("first chain");
        let from_second = graph.to_record(second, 8).expect("second chain");
        assert_eq!(from_first.c, from_second.c);
    }

    #[test]
    fn chain_longer_than_bound_is_rejected() {
        let record =
            Record::new(1, "a").with_child(Record::new(2, "b").with_child(Record::new(3, "c")));
        let (graph, root) = RecordGraph::from_record(&record);
        assert!(graph.chain(root, 3).is_ok());
        let error = graph.chain(root, 2).expect_err("too deep");
        assert!(matches!(error, EncodeError::DepthExceeded { max_depth: 2 }));
    }

    #[test]
    fn set_child_rejects_unknown_nodes() {
        let mut graph = RecordGraph::new();
        let root = graph.insert(RecordNode::new(1, "root"));
        let error = graph
            .set_child(root, Some(NodeId(42)))
            .expect_err("dangling");
        assert!(matches!(error, EncodeError::DanglingNode { .. }));
    }
}
