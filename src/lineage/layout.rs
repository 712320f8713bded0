//! Hierarchical (tidy tree) layout.
//!
//! - Depth alone decides the vertical position of a node
//! - Each node's horizontal extent is split evenly between its children
//! - Horizontal positions are compressed toward the centre of the viewport
//!
//! Layout is a pure function of the tree and the viewport, so repeated passes
//! with the same inputs produce bit-identical positions.

use super::types::LineageNode;
use egui::{Pos2, Vec2};

/// Fraction of the viewport height between two consecutive depths.
pub const VERTICAL_SPACING_FACTOR: f32 = 0.2;

/// Horizontal squeeze applied around the viewport centre so wide trees stay visible.
pub const HORIZONTAL_COMPRESSION_FACTOR: f32 = 0.6;

/// Tree layout parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeLayout {
    /// Vertical distance between depths, as a fraction of viewport height
    pub vertical_spacing: f32,
    /// Horizontal compression about the centre (1.0 = none)
    pub horizontal_compression: f32,
}

impl Default for TreeLayout {
    fn default() -> Self {
        Self {
            vertical_spacing: VERTICAL_SPACING_FACTOR,
            horizontal_compression: HORIZONTAL_COMPRESSION_FACTOR,
        }
    }
}

/// A tree node with its computed position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedNode<'a> {
    pub node: &'a LineageNode,
    pub pos: Pos2,
}

/// Parent→child link, as indices into [`TreeLayoutResult::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEdge {
    pub parent: usize,
    pub child: usize,
}

/// Output of one layout pass. Nodes and edges are in depth-first pre-order.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeLayoutResult<'a> {
    pub nodes: Vec<PositionedNode<'a>>,
    pub edges: Vec<LayoutEdge>,
}

impl TreeLayout {
    pub fn new(vertical_spacing: f32, horizontal_compression: f32) -> Self {
        Self {
            vertical_spacing,
            horizontal_compression,
        }
    }

    /// Position every node of `root` inside a `viewport`-sized area.
    pub fn layout<'a>(&self, root: &'a LineageNode, viewport: Vec2) -> TreeLayoutResult<'a> {
        let center = viewport.x / 2.0;
        let row_height = viewport.y * self.vertical_spacing;

        let mut nodes = Vec::with_capacity(root.node_count());
        let mut edges = Vec::with_capacity(nodes.capacity().saturating_sub(1));

        // (node, extent left, extent right, parent index)
        let mut stack: Vec<(&LineageNode, f32, f32, Option<usize>)> =
            vec![(root, 0.0, viewport.x, None)];

        while let Some((node, left, right, parent)) = stack.pop() {
            let raw_x = (left + right) / 2.0;
            let x = center + (raw_x - center) * self.horizontal_compression;
            let y = (node.depth - root.depth) as f32 * row_height;

            let index = nodes.len();
            nodes.push(PositionedNode {
                node,
                pos: Pos2::new(x, y),
            });
            if let Some(parent) = parent {
                edges.push(LayoutEdge {
                    parent,
                    child: index,
                });
            }

            if node.children.is_empty() {
                continue;
            }
            let share = (right - left) / node.children.len() as f32;
            // Reverse push so the first child is popped (and emitted) first
            for (i, child) in node.children.iter().enumerate().rev() {
                let child_left = left + share * i as f32;
                stack.push((child, child_left, child_left + share, Some(index)));
            }
        }

        TreeLayoutResult { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::builder::tests::session;
    use crate::lineage::builder::LineageTreeBuilder;
    use std::collections::HashMap;

    fn tree(records: &[(&str, Option<&str>)]) -> LineageNode {
        let records: Vec<_> = records.iter().map(|(id, p)| session(id, *p)).collect();
        LineageTreeBuilder::default().build(&records).unwrap()
    }

    fn position_of(result: &TreeLayoutResult<'_>, id: &str) -> Pos2 {
        result
            .nodes
            .iter()
            .find(|p| p.node.id() == id)
            .map(|p| p.pos)
            .unwrap()
    }

    #[test]
    fn single_node_is_centered_at_top() {
        let root = tree(&[("A", None)]);
        let result = TreeLayout::default().layout(&root, Vec2::new(800.0, 600.0));
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].pos, Pos2::new(400.0, 0.0));
        assert!(result.edges.is_empty());
    }

    #[test]
    fn siblings_share_row_and_differ_in_x() {
        let root = tree(&[("A", None), ("B", Some("A")), ("C", Some("A"))]);
        let height = 500.0;
        let result = TreeLayout::default().layout(&root, Vec2::new(1000.0, height));

        let (a, b, c) = (
            position_of(&result, "A"),
            position_of(&result, "B"),
            position_of(&result, "C"),
        );
        assert_eq!(a.y, 0.0);
        assert_eq!(b.y, height * 0.2);
        assert_eq!(c.y, height * 0.2);
        assert_ne!(b.x, c.x);
        assert!(b.x < c.x);
        assert_eq!(a.x, 500.0);
        assert_eq!(b.x, 350.0);
        assert_eq!(c.x, 650.0);
    }

    #[test]
    fn layout_is_idempotent() {
        let root = tree(&[
            ("r", None),
            ("a", Some("r")),
            ("b", Some("r")),
            ("c", Some("r")),
            ("a1", Some("a")),
            ("c1", Some("c")),
            ("c2", Some("c")),
        ]);
        let engine = TreeLayout::default();
        let viewport = Vec2::new(913.0, 487.0);
        let first = engine.layout(&root, viewport);
        let second = engine.layout(&root, viewport);
        assert_eq!(first, second);
        for (x, y) in first.nodes.iter().zip(&second.nodes) {
            assert_eq!(x.pos.x.to_bits(), y.pos.x.to_bits());
            assert_eq!(x.pos.y.to_bits(), y.pos.y.to_bits());
        }
    }

    #[test]
    fn depth_alone_decides_y() {
        let root = tree(&[
            ("r", None),
            ("a", Some("r")),
            ("b", Some("r")),
            ("a1", Some("a")),
            ("a2", Some("a")),
            ("a11", Some("a1")),
            ("b1", Some("b")),
        ]);
        let result = TreeLayout::default().layout(&root, Vec2::new(640.0, 480.0));

        let mut rows: HashMap<usize, f32> = HashMap::new();
        for positioned in &result.nodes {
            let y = *rows.entry(positioned.node.depth).or_insert(positioned.pos.y);
            assert_eq!(positioned.pos.y, y, "depth {} not aligned", positioned.node.depth);
        }
        assert_eq!(rows[&0], 0.0);
        assert!(rows[&1] < rows[&2] && rows[&2] < rows[&3]);
    }

    #[test]
    fn positions_stay_inside_viewport() {
        let root = tree(&[
            ("r", None),
            ("a", Some("r")),
            ("b", Some("r")),
            ("a1", Some("a")),
            ("a2", Some("a")),
            ("a3", Some("a")),
        ]);
        let result = TreeLayout::default().layout(&root, Vec2::new(300.0, 300.0));
        assert!(result.nodes.iter().all(|p| (0.0..=300.0).contains(&p.pos.x)));
    }

    #[test]
    fn edges_follow_preorder() {
        let root = tree(&[
            ("r", None),
            ("a", Some("r")),
            ("b", Some("r")),
            ("a1", Some("a")),
        ]);
        let result = TreeLayout::default().layout(&root, Vec2::new(100.0, 100.0));
        let order: Vec<&str> = result.nodes.iter().map(|p| p.node.id()).collect();
        assert_eq!(order, ["r", "a", "a1", "b"]);
        assert_eq!(
            result.edges,
            vec![
                LayoutEdge { parent: 0, child: 1 },
                LayoutEdge { parent: 1, child: 2 },
                LayoutEdge { parent: 0, child: 3 },
            ]
        );
    }

    #[test]
    fn factors_are_overridable() {
        let root = tree(&[("A", None), ("B", Some("A")), ("C", Some("A"))]);
        let result = TreeLayout::new(0.5, 1.0).layout(&root, Vec2::new(1000.0, 100.0));
        assert_eq!(position_of(&result, "B"), Pos2::new(250.0, 50.0));
        assert_eq!(position_of(&result, "C"), Pos2::new(750.0, 50.0));
    }
}
