use log::info;

use crate::bbox::BBox;
use crate::math::Vec3;

const LEAF_TRIANGLE_LIMIT: usize = 20;
const MAX_TREE_DEPTH: u32 = 64;

/// A node of the k-d tree over mesh triangle indices. Children are owned
/// exclusively by their parent and freed recursively with it.
pub enum KdNode {
    Leaf(Vec<u32>),
    Split {
        axis: usize,
        pos: f64,
        children: Box<[KdNode; 2]>,
    },
}

#[derive(Default)]
pub struct KdStats {
    pub nodes: usize,
    pub leaf_nodes: usize,
    pub max_depth: u32,
    pub sum_depth: u64,
    pub sum_leaf_triangles: usize,
}

impl KdStats {
    pub fn log(&self) {
        info!("k-d tree statistics:");
        info!("   nodes            : {}", self.nodes);
        info!("   leaf nodes       : {}", self.leaf_nodes);
        info!("   max depth        : {}", self.max_depth);
        info!(
            "   avg depth        : {:.1}",
            self.sum_depth as f64 / self.leaf_nodes.max(1) as f64
        );
        info!(
            "   avg tris per leaf: {:.1}",
            self.sum_leaf_triangles as f64 / self.leaf_nodes.max(1) as f64
        );
    }
}

impl KdNode {
    /// Builds a subtree over `triangles`, recursing until the list is small
    /// or the depth bound hits. The split is the midpoint of the current
    /// box along a round-robin axis; a triangle overlapping both halves is
    /// inserted into both children.
    pub fn build(
        bbox: &BBox,
        triangles: Vec<u32>,
        depth: u32,
        corners: &impl Fn(u32) -> (Vec3, Vec3, Vec3),
        stats: &mut KdStats,
    ) -> KdNode {
        stats.nodes += 1;
        if triangles.len() < LEAF_TRIANGLE_LIMIT || depth > MAX_TREE_DEPTH {
            stats.leaf_nodes += 1;
            stats.max_depth = stats.max_depth.max(depth);
            stats.sum_depth += u64::from(depth);
            stats.sum_leaf_triangles += triangles.len();
            return KdNode::Leaf(triangles);
        }

        let axis = (depth % 3) as usize;
        let pos = bbox.vmin[axis] + (bbox.vmax[axis] - bbox.vmin[axis]) * 0.5;
        let (left_box, right_box) = bbox.split(axis, pos);

        let mut left_tris = Vec::new();
        let mut right_tris = Vec::new();
        for idx in triangles {
            let (a, b, c) = corners(idx);
            if left_box.intersect_triangle(a, b, c) {
                left_tris.push(idx);
            }
            if right_box.intersect_triangle(a, b, c) {
                right_tris.push(idx);
            }
        }

        KdNode::Split {
            axis,
            pos,
            children: Box::new([
                KdNode::build(&left_box, left_tris, depth + 1, corners, stats),
                KdNode::build(&right_box, right_tris, depth + 1, corners, stats),
            ]),
        }
    }
}
