//! Reconstructs the lineage tree from flat session records.
//!
//! Records only carry a pointer to their parent, so the builder assembles a
//! directed parent→child graph, validates that it is a single rooted tree and
//! then materializes [`LineageNode`]s with a deterministic child order.

use super::types::{LineageNode, ModelGroupId, SessionRecord};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Structural problems that prevent a session set from forming a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineageError {
    #[error("no root session: every session names a parent")]
    NoRoot,
    #[error("multiple root sessions: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),
    #[error("session {session_id} names unknown parent {parent_id}")]
    DanglingParent {
        session_id: String,
        parent_id: String,
    },
    #[error(
        "{unreachable} of {total} sessions are unreachable from root {root} (cycle or disconnected fragment)"
    )]
    CycleOrDisconnected {
        root: String,
        unreachable: usize,
        total: usize,
    },
    #[error("duplicate session id {0}")]
    DuplicateSession(String),
}

/// Ordering applied to the children of every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChildOrder {
    /// Lexical ascending session id
    #[default]
    SessionId,
    /// Integer ids ascending, then any non-numeric ids lexically
    NumericSessionId,
    /// Earliest start first; ties (and unknown start times) by session id
    StartTime,
}

impl ChildOrder {
    pub fn label(&self) -> &'static str {
        match self {
            ChildOrder::SessionId => "Session id",
            ChildOrder::NumericSessionId => "Session number",
            ChildOrder::StartTime => "Start time",
        }
    }

    pub fn all() -> &'static [ChildOrder] {
        &[
            ChildOrder::SessionId,
            ChildOrder::NumericSessionId,
            ChildOrder::StartTime,
        ]
    }

    pub fn compare(&self, a: &SessionRecord, b: &SessionRecord) -> Ordering {
        let by_id = || a.session_id.cmp(&b.session_id);
        match self {
            ChildOrder::SessionId => by_id(),
            ChildOrder::NumericSessionId => {
                let key = |r: &SessionRecord| match r.session_id.parse::<u64>() {
                    Ok(n) => (0u8, n),
                    Err(_) => (1u8, 0),
                };
                key(a).cmp(&key(b)).then_with(by_id)
            }
            ChildOrder::StartTime => a.started_at().cmp(&b.started_at()).then_with(by_id),
        }
    }
}

/// Turns a flat session set into a validated [`LineageNode`] tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineageTreeBuilder {
    pub child_order: ChildOrder,
}

impl LineageTreeBuilder {
    pub fn new(child_order: ChildOrder) -> Self {
        Self { child_order }
    }

    /// Build the tree for one model group out of a possibly mixed record set.
    ///
    /// Returns `Ok(None)` when the group has no sessions yet.
    pub fn build_group(
        &self,
        model_group_id: ModelGroupId,
        records: &[SessionRecord],
    ) -> Result<Option<LineageNode>, LineageError> {
        let subset: Vec<SessionRecord> = records
            .iter()
            .filter(|r| r.model_group_id == model_group_id)
            .cloned()
            .collect();
        if subset.is_empty() {
            return Ok(None);
        }
        self.build(&subset).map(Some)
    }

    /// Build the tree for records that all belong to the same model group.
    ///
    /// The result does not depend on the order of `records`. When several
    /// records violate the same rule, the smallest offending id is reported.
    pub fn build(&self, records: &[SessionRecord]) -> Result<LineageNode, LineageError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(records.len());
        let mut duplicates = BTreeSet::new();
        for (i, record) in records.iter().enumerate() {
            if index.insert(record.session_id.as_str(), i).is_some() {
                duplicates.insert(record.session_id.as_str());
            }
        }
        if let Some(dup) = duplicates.first() {
            return Err(LineageError::DuplicateSession(dup.to_string()));
        }

        let mut roots: Vec<&str> = records
            .iter()
            .filter(|r| r.is_root())
            .map(|r| r.session_id.as_str())
            .collect();
        let root = match roots.len() {
            0 => return Err(LineageError::NoRoot),
            1 => index[roots[0]],
            _ => {
                roots.sort_unstable();
                return Err(LineageError::MultipleRoots(
                    roots.into_iter().map(String::from).collect(),
                ));
            }
        };

        let mut graph: DiGraph<usize, ()> =
            DiGraph::with_capacity(records.len(), records.len().saturating_sub(1));
        let nodes: Vec<NodeIndex> = (0..records.len()).map(|i| graph.add_node(i)).collect();

        let mut dangling: Option<(&str, &str)> = None;
        for (i, record) in records.iter().enumerate() {
            let Some(parent_id) = record.parent_session_id.as_deref() else {
                continue;
            };
            match index.get(parent_id) {
                Some(&parent) => {
                    graph.add_edge(nodes[parent], nodes[i], ());
                }
                None => {
                    let candidate = (record.session_id.as_str(), parent_id);
                    if dangling.map_or(true, |d| candidate < d) {
                        dangling = Some(candidate);
                    }
                }
            }
        }
        if let Some((session_id, parent_id)) = dangling {
            return Err(LineageError::DanglingParent {
                session_id: session_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }

        // Every non-root node has exactly one incoming edge, so reaching all
        // of them from the root is equivalent to the graph being a tree.
        let mut reachable = 0;
        let mut dfs = Dfs::new(&graph, nodes[root]);
        while dfs.next(&graph).is_some() {
            reachable += 1;
        }
        if reachable != records.len() {
            return Err(LineageError::CycleOrDisconnected {
                root: records[root].session_id.clone(),
                unreachable: records.len() - reachable,
                total: records.len(),
            });
        }

        let tree = self
            .assemble(&graph, records, nodes[root])
            .ok_or(LineageError::NoRoot)?;
        tracing::debug!(
            root = %tree.id(),
            nodes = records.len(),
            depth = tree.max_depth(),
            "built lineage tree"
        );
        Ok(tree)
    }

    /// Materialize the subtree under `root` without recursing.
    ///
    /// Nodes are visited in pre-order and built in reverse, so every node's
    /// children are finished (and sit on top of `built`, first child topmost)
    /// by the time the node itself is built.
    fn assemble(
        &self,
        graph: &DiGraph<usize, ()>,
        records: &[SessionRecord],
        root: NodeIndex,
    ) -> Option<LineageNode> {
        let mut order: Vec<(NodeIndex, usize, usize)> = Vec::with_capacity(graph.node_count());
        let mut stack = vec![(root, 0)];
        while let Some((at, depth)) = stack.pop() {
            let mut children: Vec<NodeIndex> = graph.neighbors(at).collect();
            children.sort_by(|a, b| {
                self.child_order
                    .compare(&records[graph[*a]], &records[graph[*b]])
            });
            order.push((at, depth, children.len()));
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }

        let mut built: Vec<LineageNode> = Vec::new();
        for (at, depth, child_count) in order.into_iter().rev() {
            let children: Vec<LineageNode> = (0..child_count).filter_map(|_| built.pop()).collect();
            built.push(LineageNode {
                record: records[graph[at]].clone(),
                depth,
                children,
            });
        }
        built.pop()
    }
}
