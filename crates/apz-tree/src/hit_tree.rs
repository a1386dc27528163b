#![forbid(unsafe_code)]

//! Hit-test tree.
//!
//! The tree mirrors the scene forest node for node and is rebuilt wholesale
//! on every snapshot. Nodes live in one `Vec` and link to each other by
//! [`NodeIndex`]; controllers are referenced by [`ControllerHandle`] only.
//!
//! # Invariants
//!
//! 1. Nodes are stored in depth-first pre-order, so a parent always precedes
//!    its children and the tree is acyclic by construction.
//! 2. `clip_chain` is the intersection of the node's own clip with every
//!    ancestor clip, in device coordinates.
//! 3. Hit testing is pure: it reads the tree and nothing else.

use apz_core::{LayerId, Point, Rect, SceneId};

use crate::registry::ControllerHandle;
use crate::scene::HitFlags;

/// Position of a node in a [`HitTestTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u32);

impl NodeIndex {
    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// Lightweight proxy for one scene node.
#[derive(Debug, Clone, PartialEq)]
pub struct HitTestNode {
    pub scene: SceneId,
    pub layer: LayerId,
    pub bounds: Rect,
    /// Accumulated ancestor clip, `None` when nothing clips this node.
    pub clip_chain: Option<Rect>,
    pub flags: HitFlags,
    pub controller: Option<ControllerHandle>,
    pub parent: Option<NodeIndex>,
    pub first_child: Option<NodeIndex>,
    pub last_child: Option<NodeIndex>,
    pub prev_sibling: Option<NodeIndex>,
    pub next_sibling: Option<NodeIndex>,
}

impl HitTestNode {
    pub fn new(scene: SceneId, layer: LayerId, bounds: Rect) -> Self {
        Self {
            scene,
            layer,
            bounds,
            clip_chain: None,
            flags: HitFlags::VISIBLE,
            controller: None,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }

    /// Whether `point` is inside this node's own bounds and clip chain.
    pub fn contains(&self, point: Point) -> bool {
        self.bounds.contains(point) && self.clip_chain.is_none_or(|clip| clip.contains(point))
    }

    #[inline]
    pub fn requires_confirmation(&self) -> bool {
        self.flags.contains(HitFlags::REQUIRES_TARGET_CONFIRMATION)
    }
}

/// Arena-backed tree of [`HitTestNode`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitTestTree {
    nodes: Vec<HitTestNode>,
}

impl HitTestTree {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn root(&self) -> Option<NodeIndex> {
        (!self.nodes.is_empty()).then_some(NodeIndex(0))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, index: NodeIndex) -> Option<&HitTestNode> {
        self.nodes.get(index.get())
    }

    /// All nodes in depth-first pre-order.
    pub fn nodes(&self) -> &[HitTestNode] {
        &self.nodes
    }

    /// Append `node` as the last (topmost) child of `parent`, or as the root.
    ///
    /// A second parentless node is ignored; the tree has exactly one root.
    pub(crate) fn push(&mut self, parent: Option<NodeIndex>, mut node: HitTestNode) -> Option<NodeIndex> {
        if parent.is_none() && !self.nodes.is_empty() {
            return None;
        }
        let index = NodeIndex(self.nodes.len() as u32);
        node.parent = parent;
        node.first_child = None;
        node.last_child = None;
        node.next_sibling = None;
        node.prev_sibling = None;
        if let Some(p) = parent {
            let prev = self.nodes.get(p.get())?.last_child;
            node.prev_sibling = prev;
            if let Some(prev) = prev {
                self.nodes[prev.get()].next_sibling = Some(index);
            }
            let parent_node = &mut self.nodes[p.get()];
            if parent_node.first_child.is_none() {
                parent_node.first_child = Some(index);
            }
            parent_node.last_child = Some(index);
        }
        self.nodes.push(node);
        Some(index)
    }

    /// Children of `index`, bottom to top.
    pub fn children(&self, index: NodeIndex) -> Children<'_> {
        Children {
            tree: self,
            next: self.node(index).and_then(|n| n.first_child),
        }
    }

    /// Deepest, topmost hittable node containing `point`.
    pub fn hit_test(&self, point: Point) -> Option<NodeIndex> {
        if !point.is_finite() {
            return None;
        }
        self.hit_from(self.root()?, point)
    }

    /// Children are searched topmost first and ahead of their parent. A
    /// clip chain that excludes `point` prunes the whole subtree.
    fn hit_from(&self, root: NodeIndex, point: Point) -> Option<NodeIndex> {
        // `(node, children_done)`; a node is tested itself only once every
        // child above it has missed.
        let mut stack = vec![(root, false)];
        while let Some((index, children_done)) = stack.pop() {
            let Some(node) = self.node(index) else {
                continue;
            };
            if children_done {
                if node.flags.contains(HitFlags::VISIBLE) && node.bounds.contains(point) {
                    return Some(index);
                }
                continue;
            }
            if node.clip_chain.is_some_and(|clip| !clip.contains(point)) {
                continue;
            }
            stack.push((index, true));
            stack.extend(self.children(index).map(|(child, _)| (child, false)));
        }
        None
    }

    /// Controller responsible for `index`: its own, or the nearest
    /// ancestor's.
    pub fn target_controller(&self, index: NodeIndex) -> Option<ControllerHandle> {
        self.ancestors(index).find_map(|n| n.controller)
    }

    /// `index` itself followed by its ancestors up to the root.
    pub fn ancestors(&self, index: NodeIndex) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(index),
        }
    }

    /// First node mirroring `(scene, layer)`, in pre-order.
    pub fn find_layer(&self, scene: SceneId, layer: LayerId) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .position(|n| n.scene == scene && n.layer == layer)
            .map(|i| NodeIndex(i as u32))
    }
}

/// Iterator over the children of one node.
pub struct Children<'a> {
    tree: &'a HitTestTree,
    next: Option<NodeIndex>,
}

impl<'a> Iterator for Children<'a> {
    type Item = (NodeIndex, &'a HitTestNode);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let node = self.tree.node(index)?;
        self.next = node.next_sibling;
        Some((index, node))
    }
}

/// Iterator from a node up to the root.
pub struct Ancestors<'a> {
    tree: &'a HitTestTree,
    next: Option<NodeIndex>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a HitTestNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.node(self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}
