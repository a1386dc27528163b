#![forbid(unsafe_code)]

//! Scene snapshot input.
//!
//! A [`SceneNode`] tree is what the scene producer hands over on every new
//! frame description. The tree manager keeps the latest snapshot per
//! [`SceneId`] and walks them into a hit-test tree.
//!
//! Bounds and clips are in device coordinates. A node may embed another
//! scene, in which case that scene's latest snapshot is grafted beneath it.

use apz_core::{LayerId, Rect, SceneId, ScrollGeometry, ScrollId};
use bitflags::bitflags;

bitflags! {
    /// Hit-test behavior of a scene node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HitFlags: u8 {
        /// The node can be hit.
        const VISIBLE = 0b01;
        /// Content may claim input on this node, so the hit result is only
        /// provisional until the control context confirms a target.
        const REQUIRES_TARGET_CONFIRMATION = 0b10;
    }
}

impl Default for HitFlags {
    fn default() -> Self {
        Self::VISIBLE
    }
}

/// Scroll metadata attached to a scrollable scene node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetadata {
    pub scroll_id: ScrollId,
    pub geometry: ScrollGeometry,
    /// The top-level scrollable document of the root scene.
    pub is_root_content: bool,
}

impl ScrollMetadata {
    pub fn new(scroll_id: ScrollId, geometry: ScrollGeometry) -> Self {
        Self {
            scroll_id,
            geometry,
            is_root_content: false,
        }
    }

    #[must_use]
    pub fn root_content(mut self) -> Self {
        self.is_root_content = true;
        self
    }
}

/// One node of a scene snapshot. Children are listed bottom to top.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub layer: LayerId,
    pub bounds: Rect,
    pub clip: Option<Rect>,
    pub hit_flags: HitFlags,
    pub scroll: Option<ScrollMetadata>,
    pub embedded_scene: Option<SceneId>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Visible, unclipped, non-scrollable node.
    pub fn new(layer: u64, bounds: Rect) -> Self {
        Self {
            layer: LayerId(layer),
            bounds,
            clip: None,
            hit_flags: HitFlags::default(),
            scroll: None,
            embedded_scene: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_clip(mut self, clip: Rect) -> Self {
        self.clip = Some(clip);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: HitFlags) -> Self {
        self.hit_flags = flags;
        self
    }

    #[must_use]
    pub fn with_scroll(mut self, scroll: ScrollMetadata) -> Self {
        self.scroll = Some(scroll);
        self
    }

    #[must_use]
    pub fn embedding(mut self, scene: SceneId) -> Self {
        self.embedded_scene = Some(scene);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = SceneNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Total number of nodes in this subtree, embedded scenes excluded.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(&node.children);
        }
        count
    }
}

impl Drop for SceneNode {
    // Snapshots can nest arbitrarily deep; flatten before dropping.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let node = SceneNode::new(1, Rect::from_size(10.0, 10.0));
        assert_eq!(node.layer, LayerId(1));
        assert_eq!(node.hit_flags, HitFlags::VISIBLE);
        assert!(node.scroll.is_none());
        assert!(node.clip.is_none());
    }

    #[test]
    fn node_count_includes_descendants() {
        let root = SceneNode::new(0, Rect::from_size(10.0, 10.0)).with_children([
            SceneNode::new(1, Rect::from_size(5.0, 5.0))
                .with_child(SceneNode::new(2, Rect::from_size(1.0, 1.0))),
            SceneNode::new(3, Rect::from_size(5.0, 5.0)),
        ]);
        assert_eq!(root.node_count(), 4);
    }

    #[test]
    fn deep_chain_counts_and_drops() {
        let mut node = SceneNode::new(0, Rect::from_size(1.0, 1.0));
        for layer in 1..200_000 {
            node = SceneNode::new(layer, Rect::from_size(1.0, 1.0)).with_child(node);
        }
        assert_eq!(node.node_count(), 200_000);
        drop(node);
    }

    #[test]
    fn root_content_marker() {
        let meta = ScrollMetadata::new(ScrollId::START, ScrollGeometry::default()).root_content();
        assert!(meta.is_root_content);
    }
}
