//! Projection of the positioned tree into renderer-facing descriptors.

use super::builder::{ChildOrder, LineageError, LineageTreeBuilder};
use super::layout::{TreeLayout, TreeLayoutResult};
use super::types::{ModelGroupId, SessionRecord};
use egui::{Pos2, Vec2};

/// A node as the rendering surface sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub id: String,
    /// The session the node was built from
    pub payload: SessionRecord,
    pub position: Pos2,
    pub depth: usize,
    pub selected: bool,
}

/// A parent→child link as the rendering surface sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDescriptor {
    /// `e-{index}` in depth-first emission order
    pub id: String,
    pub source_id: String,
    pub target_id: String,
}

/// Complete set of descriptors for one layout pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<EdgeDescriptor>,
}

impl Projection {
    pub fn from_layout(layout: &TreeLayoutResult<'_>) -> Self {
        let nodes = layout
            .nodes
            .iter()
            .map(|positioned| NodeDescriptor {
                id: positioned.node.id().to_string(),
                payload: positioned.node.record.clone(),
                position: positioned.pos,
                depth: positioned.node.depth,
                selected: false,
            })
            .collect();

        let edges = layout
            .edges
            .iter()
            .enumerate()
            .map(|(i, edge)| EdgeDescriptor {
                id: format!("e-{i}"),
                source_id: layout.nodes[edge.parent].node.id().to_string(),
                target_id: layout.nodes[edge.child].node.id().to_string(),
            })
            .collect();

        Self { nodes, edges }
    }

    /// Flag exactly the node with id `selected`, or clear every flag when `None`.
    pub fn apply_selection(&mut self, selected: Option<&str>) {
        for node in &mut self.nodes {
            node.selected = selected == Some(node.id.as_str());
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[cfg(test)]
    pub fn selected(&self) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|n| n.selected)
    }

    /// Nearest node whose centre lies within `radius` of `pos`.
    pub fn node_at(&self, pos: Pos2, radius: f32) -> Option<&NodeDescriptor> {
        self.nodes
            .iter()
            .map(|n| (n, n.position.distance(pos)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(n, _)| n)
    }
}

/// Builder and layout settings for the full pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineageConfig {
    pub child_order: ChildOrder,
    pub layout: TreeLayout,
}

/// Build, lay out and project the lineage of one model group.
///
/// `Ok(None)` means the group has no sessions yet, which callers must show
/// differently from a structural error. Errors never yield a partial graph.
pub fn project(
    model_group_id: ModelGroupId,
    sessions: &[SessionRecord],
    viewport: Vec2,
    config: &LineageConfig,
) -> Result<Option<Projection>, LineageError> {
    let builder = LineageTreeBuilder::new(config.child_order);
    let root = match builder.build_group(model_group_id, sessions) {
        Ok(Some(root)) => root,
        Ok(None) => return Ok(None),
        Err(e) => {
            tracing::warn!(model_group_id, error = %e, "session lineage is not a tree");
            return Err(e);
        }
    };

    let layout = config.layout.layout(&root, viewport);
    let projection = Projection::from_layout(&layout);
    tracing::debug!(
        model_group_id,
        nodes = projection.nodes.len(),
        edges = projection.edges.len(),
        width = viewport.x,
        height = viewport.y,
        "projected lineage graph"
    );
    Ok(Some(projection))
}
