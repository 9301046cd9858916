//! Dirty scheduler
//!
//! Nodes are marked when their transform, parentage, visibility or a
//! render-affecting property changes. [`DirtyScheduler::flush`] runs once
//! per frame phase: it finds the highest dirty ancestor of every queued
//! node, recomputes world matrices top-down from there, and returns the
//! commits the scene must apply in that order.

use std::collections::HashSet;

use slotmap::SlotMap;

use crate::foundation::math::Mat4;

use super::node::SceneNode;
use super::NodeId;

/// A node whose render representation must be synced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    /// Node to commit
    pub node: NodeId,
    /// World matrix changed in this flush
    pub moved: bool,
}

/// Queue of nodes pending recomputation
#[derive(Debug, Default)]
pub struct DirtyScheduler {
    queue: Vec<NodeId>,
}

impl DirtyScheduler {
    /// Empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node; marking an already dirty node is free
    pub fn mark(&mut self, nodes: &mut SlotMap<NodeId, SceneNode>, id: NodeId) {
        if let Some(node) = nodes.get_mut(id) {
            if !node.dirty {
                node.dirty = true;
                self.queue.push(id);
            }
        }
    }

    /// Nodes waiting for the next flush
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Recompute world matrices of every queued node and its subtree
    pub fn flush(&mut self, nodes: &mut SlotMap<NodeId, SceneNode>) -> Vec<Commit> {
        let queue = std::mem::take(&mut self.queue);
        let mut seen = HashSet::new();
        let mut roots = Vec::new();
        for id in queue {
            let Some(mut top) = nodes.get(id).filter(|node| node.dirty).map(|_| id) else {
                continue;
            };
            let mut cursor = nodes.get(id).and_then(|node| node.parent);
            while let Some(parent) = cursor {
                let Some(node) = nodes.get(parent) else { break };
                if node.dirty {
                    top = parent;
                }
                cursor = node.parent;
            }
            if seen.insert(top) {
                roots.push(top);
            }
        }

        let mut commits = Vec::new();
        for root in roots {
            // An earlier root's subtree may already have covered this one
            if !nodes.get(root).is_some_and(|node| node.dirty) {
                continue;
            }
            let (parent_world, parent_active) = nodes
                .get(root)
                .and_then(|node| node.parent)
                .and_then(|parent| nodes.get(parent))
                .map_or((Mat4::identity(), true), |parent| (parent.world, parent.active));
            Self::recompute(nodes, root, parent_world, parent_active, &mut commits);
        }
        commits
    }

    fn recompute(
        nodes: &mut SlotMap<NodeId, SceneNode>,
        root: NodeId,
        parent_world: Mat4,
        parent_active: bool,
        commits: &mut Vec<Commit>,
    ) {
        let mut stack = vec![(root, parent_world, parent_active, false)];
        while let Some((id, parent_world, parent_active, parent_moved)) = stack.pop() {
            let Some(node) = nodes.get_mut(id) else { continue };
            let moved = node.transformed || parent_moved;
            if moved {
                node.world = parent_world * node.transform.to_matrix();
            }
            let active = parent_active && node.visible;
            if active != node.active {
                node.active = active;
                node.needs_rebuild = true;
            }
            if node.dirty || moved || node.needs_rebuild {
                commits.push(Commit { node: id, moved });
            }
            node.dirty = false;
            node.transformed = false;

            let world = node.world;
            for &child in node.children.iter().rev() {
                stack.push((child, world, active, moved));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Transform, Vec3};
    use approx::assert_relative_eq;

    fn attach(nodes: &mut SlotMap<NodeId, SceneNode>, parent: NodeId, child: NodeId) {
        nodes[child].parent = Some(parent);
        nodes[parent].children.push(child);
    }

    fn settled(nodes: &mut SlotMap<NodeId, SceneNode>, position: Vec3) -> NodeId {
        let mut node = SceneNode::group().with_transform(Transform::from_position(position));
        node.needs_rebuild = false;
        nodes.insert(node)
    }

    #[test]
    fn test_parent_move_propagates_to_clean_children() {
        let mut nodes = SlotMap::with_key();
        let mut scheduler = DirtyScheduler::new();
        let parent = settled(&mut nodes, Vec3::new(1.0, 0.0, 0.0));
        let child = settled(&mut nodes, Vec3::new(0.0, 2.0, 0.0));
        attach(&mut nodes, parent, child);
        scheduler.mark(&mut nodes, parent);
        scheduler.mark(&mut nodes, child);
        scheduler.flush(&mut nodes);

        nodes[parent].transform.position = Vec3::new(5.0, 0.0, 0.0);
        nodes[parent].transformed = true;
        scheduler.mark(&mut nodes, parent);
        let commits = scheduler.flush(&mut nodes);

        assert_eq!(
            commits,
            vec![Commit { node: parent, moved: true }, Commit { node: child, moved: true }]
        );
        assert_relative_eq!(nodes[child].world[(0, 3)], 5.0);
        assert_relative_eq!(nodes[child].world[(1, 3)], 2.0);
    }

    #[test]
    fn test_marks_collapse_into_one_commit() {
        let mut nodes = SlotMap::with_key();
        let mut scheduler = DirtyScheduler::new();
        let node = settled(&mut nodes, Vec3::zeros());
        for _ in 0..10 {
            scheduler.mark(&mut nodes, node);
        }
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.flush(&mut nodes).len(), 1);
        assert!(scheduler.flush(&mut nodes).is_empty());
    }

    #[test]
    fn test_dirty_grandchild_under_clean_child_is_reached() {
        let mut nodes = SlotMap::with_key();
        let mut scheduler = DirtyScheduler::new();
        let root = settled(&mut nodes, Vec3::zeros());
        let middle = settled(&mut nodes, Vec3::zeros());
        let leaf = settled(&mut nodes, Vec3::new(0.0, 0.0, 3.0));
        attach(&mut nodes, root, middle);
        attach(&mut nodes, middle, leaf);
        for id in [root, middle, leaf] {
            scheduler.mark(&mut nodes, id);
        }
        scheduler.flush(&mut nodes);

        nodes[root].needs_rebuild = false;
        nodes[middle].needs_rebuild = false;
        nodes[leaf].needs_rebuild = false;
        scheduler.mark(&mut nodes, leaf);
        scheduler.mark(&mut nodes, root);
        let commits = scheduler.flush(&mut nodes);
        assert_eq!(commits.len(), 2);
        assert!(!nodes[leaf].dirty);
    }

    #[test]
    fn test_hidden_parent_deactivates_subtree() {
        let mut nodes = SlotMap::with_key();
        let mut scheduler = DirtyScheduler::new();
        let parent = settled(&mut nodes, Vec3::zeros());
        let child = settled(&mut nodes, Vec3::zeros());
        attach(&mut nodes, parent, child);
        scheduler.mark(&mut nodes, parent);
        scheduler.flush(&mut nodes);
        assert!(nodes[child].active);

        nodes[parent].visible = false;
        scheduler.mark(&mut nodes, parent);
        scheduler.flush(&mut nodes);
        assert!(!nodes[child].active);
        assert!(nodes[child].needs_rebuild);
    }
}
