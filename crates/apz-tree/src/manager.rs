#![forbid(unsafe_code)]

//! Tree manager: the single entry point of the engine.
//!
//! [`TreeManager`] owns the controller registry, the current hit-test tree,
//! the latest snapshot of every scene, and the input block tracker. Every
//! method runs to completion on the caller's thread; the runtime crate wraps
//! it so that only the render/input context ever calls it.
//!
//! # Rebuild
//!
//! `rebuild_tree` stores the snapshot for its scene, then walks the forest
//! from the root scene depth-first, grafting embedded scenes under the nodes
//! that embed them. The new tree is built off to the side and swapped in
//! when the walk is done; controllers whose identity the walk did not touch
//! are retired afterwards.
//!
//! # Input routing
//!
//! A new gesture is hit-tested once. The hit node's controller (or the
//! nearest ancestor's) becomes the provisional target. When the hit node
//! asks for confirmation the block starts `Pending`: input is applied to the
//! provisional target right away and buffered, so that a later confirmation
//! naming another controller can roll the provisional target back and replay
//! the buffer on the right one.
//!
//! # Invariants
//!
//! 1. Callers never observe a half-built tree.
//! 2. Rebuilding with an unchanged forest yields an equal tree with the same
//!    controller handles.
//! 3. Stale block ids and unknown identities are no-ops that log at debug.
//! 4. Cancelling a block clears the active-gesture stamp on every controller
//!    it was driving.

use std::fmt;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use apz_core::{
    GestureConfig, InputEvent, LayerId, Modifiers, Point, PointerKind, PointerEvent, Rect,
    SceneId, ScrollGeneration, ScrollGeometry, ScrollNodeId, TapEvent, TouchEvent, TouchPhase,
    TouchPoint, WheelDeltaMode, WheelEvent,
};
use smallvec::SmallVec;
use web_time::{Duration, Instant};

use crate::content::{ContentController, NoopContentController};
use crate::controller::{GestureInput, OffsetSnapshot, ScrollController};
use crate::hit_tree::{HitTestNode, HitTestTree, NodeIndex};
use crate::input_block::{BlockId, BlockKind, BlockState, ConfirmTimeouts, InputBlockTracker};
use crate::registry::{ControllerHandle, ControllerRegistry};
use crate::scene::{ScrollMetadata, SceneNode};

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

/// Input routing tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    /// How long a pending block waits for confirmation before it is
    /// confirmed against its provisional target.
    pub timeouts: ConfirmTimeouts,
    /// Wheel events closer together than this continue one block.
    pub wheel_transaction_timeout: Duration,
    /// Pixels per line for line-mode wheel deltas.
    pub wheel_line_px: f32,
    pub gesture: GestureConfig,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            timeouts: ConfirmTimeouts::default(),
            wheel_transaction_timeout: Duration::from_millis(1500),
            wheel_line_px: 16.0,
            gesture: GestureConfig::default(),
        }
    }
}

/// How an input event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputStatus {
    /// Applied to a confirmed target.
    Handled,
    /// Applied to the provisional target while confirmation is pending.
    Speculative,
    /// No controller takes this input.
    NoTarget,
    /// Content prevented default for this block.
    ConsumedByContent,
}

/// Result of [`TreeManager::receive_input_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputResult {
    pub block_id: Option<BlockId>,
    pub status: InputStatus,
}

impl InputResult {
    const UNROUTED: Self = Self {
        block_id: None,
        status: InputStatus::NoTarget,
    };
}

/// Outcome of a control-side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Applied,
    /// The block, identity, or scene it names is gone.
    Stale,
}

/// Counters from one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildSummary {
    pub nodes: usize,
    pub controllers: usize,
    pub created: usize,
    pub retired: usize,
}

/// Counters from one [`TreeManager::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSummary {
    pub auto_confirmed: usize,
    pub long_taps: usize,
    pub wheel_transactions_ended: usize,
}

// ---------------------------------------------------------------------------
// Rebuild pass
// ---------------------------------------------------------------------------

struct BuildPass<'a> {
    scenes: &'a AHashMap<SceneId, SceneNode>,
    registry: &'a mut ControllerRegistry,
    tree: HitTestTree,
    seen: AHashMap<ScrollNodeId, ScrollGeometry>,
    first_paint: Option<SceneId>,
    stack: Vec<SceneId>,
    created: usize,
}

/// Pending step of a [`BuildPass`].
enum Visit<'a> {
    Node {
        node: &'a SceneNode,
        scene: SceneId,
        parent: Option<NodeIndex>,
        ancestor: Option<ControllerHandle>,
        clip: Option<Rect>,
    },
    Embed {
        scene: SceneId,
        at: NodeIndex,
        ancestor: Option<ControllerHandle>,
        clip: Option<Rect>,
    },
    /// Leave the innermost embedded scene.
    Exit,
}

impl<'a> BuildPass<'a> {
    /// Walk `root` and everything it embeds in pre-order.
    ///
    /// Uses an explicit work list, so snapshot depth is bounded by memory
    /// rather than by the thread's stack.
    fn walk(&mut self, root: &'a SceneNode, scene: SceneId) {
        let mut work = vec![Visit::Node {
            node: root,
            scene,
            parent: None,
            ancestor: None,
            clip: None,
        }];
        while let Some(visit) = work.pop() {
            match visit {
                Visit::Node {
                    node,
                    scene,
                    parent,
                    ancestor,
                    clip,
                } => self.visit(&mut work, node, scene, parent, ancestor, clip),
                Visit::Embed {
                    scene,
                    at,
                    ancestor,
                    clip,
                } => self.embed(&mut work, scene, at, ancestor, clip),
                Visit::Exit => {
                    self.stack.pop();
                }
            }
        }
    }

    fn visit(
        &mut self,
        work: &mut Vec<Visit<'a>>,
        node: &'a SceneNode,
        scene: SceneId,
        parent: Option<NodeIndex>,
        ancestor: Option<ControllerHandle>,
        clip: Option<Rect>,
    ) {
        let clip_chain = match (clip, node.clip) {
            (Some(outer), Some(own)) => Some(outer.intersection(&own)),
            (outer, own) => outer.or(own),
        };
        let controller = node
            .scroll
            .as_ref()
            .map(|meta| self.attach(scene, meta, ancestor));

        let mut hit = HitTestNode::new(scene, node.layer, node.bounds);
        hit.clip_chain = clip_chain;
        hit.flags = node.hit_flags;
        hit.controller = controller;
        let Some(index) = self.tree.push(parent, hit) else {
            return;
        };

        // Popped in reverse: the embedded scene first, then children bottom
        // to top.
        let inherited = controller.or(ancestor);
        work.extend(node.children.iter().rev().map(|child| Visit::Node {
            node: child,
            scene,
            parent: Some(index),
            ancestor: inherited,
            clip: clip_chain,
        }));
        if let Some(embedded) = node.embedded_scene {
            work.push(Visit::Embed {
                scene: embedded,
                at: index,
                ancestor: inherited,
                clip: clip_chain,
            });
        }
    }

    fn embed(
        &mut self,
        work: &mut Vec<Visit<'a>>,
        scene: SceneId,
        at: NodeIndex,
        ancestor: Option<ControllerHandle>,
        clip: Option<Rect>,
    ) {
        if self.stack.contains(&scene) {
            tracing::warn!(message = "apz.scene.embed_cycle", scene = scene.0);
            return;
        }
        let scenes = self.scenes;
        let Some(root) = scenes.get(&scene) else {
            tracing::debug!(message = "apz.scene.embed_missing", scene = scene.0);
            return;
        };
        self.stack.push(scene);
        work.push(Visit::Exit);
        work.push(Visit::Node {
            node: root,
            scene,
            parent: Some(at),
            ancestor,
            clip,
        });
    }

    /// Find or create the controller for a scroll node.
    ///
    /// The first sighting of an identity in a pass sets its parent link, so
    /// parents always come earlier in pre-order and the chain stays acyclic.
    fn attach(
        &mut self,
        scene: SceneId,
        meta: &ScrollMetadata,
        ancestor: Option<ControllerHandle>,
    ) -> ControllerHandle {
        let id = ScrollNodeId::new(scene, meta.scroll_id);
        let first_paint = self.first_paint == Some(scene);
        let (handle, created) = self
            .registry
            .get_or_create(id, &meta.geometry, meta.is_root_content);
        if created {
            self.created += 1;
        }

        let previous = self.seen.get(&id).copied();
        let Some(controller) = self.registry.controller_mut(handle) else {
            return handle;
        };
        match previous {
            None => {
                if !created {
                    controller.apply_geometry_update(&meta.geometry, first_paint);
                }
                controller.set_root_content(meta.is_root_content);
                controller.set_parent(ancestor.filter(|a| *a != handle));
                self.seen.insert(id, meta.geometry);
            }
            Some(prev) => {
                if prev != meta.geometry {
                    tracing::warn!(
                        message = "apz.rebuild.identity_collision",
                        id = %id
                    );
                    controller.apply_geometry_update(&meta.geometry, first_paint);
                    self.seen.insert(id, meta.geometry);
                }
                if meta.is_root_content {
                    controller.set_root_content(true);
                }
            }
        }
        handle
    }
}

// ---------------------------------------------------------------------------
// TreeManager
// ---------------------------------------------------------------------------

/// Hit testing, controller lifecycle, and input routing for one top-level
/// scene forest.
pub struct TreeManager {
    config: InputConfig,
    registry: ControllerRegistry,
    tree: HitTestTree,
    scenes: AHashMap<SceneId, SceneNode>,
    root_scene: Option<SceneId>,
    blocks: InputBlockTracker,
    content: Arc<dyn ContentController>,
}

impl fmt::Debug for TreeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeManager")
            .field("root_scene", &self.root_scene)
            .field("scenes", &self.scenes.len())
            .field("nodes", &self.tree.len())
            .field("controllers", &self.registry.len())
            .field("blocks", &self.blocks.len())
            .finish_non_exhaustive()
    }
}

impl Default for TreeManager {
    fn default() -> Self {
        Self::new(InputConfig::default(), Arc::new(NoopContentController))
    }
}

impl TreeManager {
    pub fn new(config: InputConfig, content: Arc<dyn ContentController>) -> Self {
        Self {
            registry: ControllerRegistry::new(config.gesture.clone()),
            config,
            tree: HitTestTree::new(),
            scenes: AHashMap::new(),
            root_scene: None,
            blocks: InputBlockTracker::new(),
            content,
        }
    }

    #[inline]
    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    /// Replace routing tunables. Gesture thresholds apply to every
    /// controller immediately.
    pub fn set_config(&mut self, config: InputConfig) {
        self.registry.set_gesture_config(config.gesture.clone());
        self.config = config;
    }

    #[inline]
    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    #[inline]
    pub fn tree(&self) -> &HitTestTree {
        &self.tree
    }

    #[inline]
    pub fn blocks(&self) -> &InputBlockTracker {
        &self.blocks
    }

    #[inline]
    pub fn root_scene(&self) -> Option<SceneId> {
        self.root_scene
    }

    pub fn controller(&self, id: ScrollNodeId) -> Option<&ScrollController> {
        self.registry.by_identity(id)
    }

    // -- scenes ------------------------------------------------------------

    /// Store a new snapshot for `scene` and rebuild the hit-test tree.
    ///
    /// The first scene ever rebuilt becomes the root scene unless one was
    /// set explicitly.
    pub fn rebuild_tree(
        &mut self,
        scene: SceneId,
        root: SceneNode,
        is_first_paint: bool,
    ) -> RebuildSummary {
        self.scenes.insert(scene, root);
        if self.root_scene.is_none() {
            self.root_scene = Some(scene);
        }
        self.rebuild(is_first_paint.then_some(scene))
    }

    /// Choose which scene the forest walk starts from, and rebuild.
    pub fn set_root_scene(&mut self, scene: SceneId) -> RebuildSummary {
        self.root_scene = Some(scene);
        self.rebuild(None)
    }

    /// Forget `scene`'s snapshot and rebuild without it.
    pub fn remove_scene(&mut self, scene: SceneId) -> Disposition {
        if self.scenes.remove(&scene).is_none() {
            tracing::debug!(message = "apz.scene.remove_stale", scene = scene.0);
            return Disposition::Stale;
        }
        if self.root_scene == Some(scene) {
            self.root_scene = None;
        }
        let summary = self.rebuild(None);
        tracing::info!(
            message = "apz.scene.removed",
            scene = scene.0,
            retired = summary.retired
        );
        Disposition::Applied
    }

    fn rebuild(&mut self, first_paint: Option<SceneId>) -> RebuildSummary {
        let mut pass = BuildPass {
            scenes: &self.scenes,
            registry: &mut self.registry,
            tree: HitTestTree::new(),
            seen: AHashMap::new(),
            first_paint,
            stack: Vec::new(),
            created: 0,
        };
        if let Some(root_scene) = self.root_scene
            && let Some(root) = self.scenes.get(&root_scene)
        {
            pass.stack.push(root_scene);
            pass.walk(root, root_scene);
        }
        let BuildPass {
            tree, seen, created, ..
        } = pass;

        self.tree = tree;
        let touched: AHashSet<ScrollNodeId> = seen.into_keys().collect();
        let retired = self.registry.retire_unused(&touched);
        for (id, handle) in &retired {
            for block in self.blocks.referencing(*handle) {
                tracing::debug!(
                    message = "apz.block.target_retired",
                    block = block.0,
                    target = %id
                );
                self.cancel_block(block);
            }
        }

        let summary = RebuildSummary {
            nodes: self.tree.len(),
            controllers: self.registry.len(),
            created,
            retired: retired.len(),
        };
        tracing::debug!(
            message = "apz.rebuild",
            nodes = summary.nodes,
            controllers = summary.controllers,
            created = summary.created,
            retired = summary.retired
        );
        summary
    }

    // -- hit testing -------------------------------------------------------

    /// Deepest, topmost node under `point`.
    pub fn hit_test(&self, point: Point) -> Option<NodeIndex> {
        self.tree.hit_test(point)
    }

    /// Controller that input at `point` would go to.
    pub fn hit_test_controller(&self, point: Point) -> Option<ControllerHandle> {
        self.hit_test(point)
            .and_then(|index| self.tree.target_controller(index))
    }

    /// The controller attached directly to a scene node.
    pub fn controller_of_layer(&self, scene: SceneId, layer: LayerId) -> Option<ControllerHandle> {
        let index = self.tree.find_layer(scene, layer)?;
        self.tree.node(index)?.controller
    }

    fn hit_target(&self, point: Point) -> (Option<ControllerHandle>, bool) {
        match self.hit_test(point) {
            Some(index) => (
                self.tree.target_controller(index),
                self.tree
                    .node(index)
                    .is_some_and(HitTestNode::requires_confirmation),
            ),
            None => (None, false),
        }
    }

    fn identity(&self, handle: Option<ControllerHandle>) -> Option<ScrollNodeId> {
        handle
            .and_then(|h| self.registry.controller(h))
            .map(ScrollController::id)
    }

    // -- offsets -----------------------------------------------------------

    /// Current composited offset of `id`.
    pub fn get_composited_offset(&self, id: ScrollNodeId) -> Option<Point> {
        self.registry.by_identity(id).map(ScrollController::composited_offset)
    }

    /// Every live controller's composited offset.
    pub fn composited_offsets(&self) -> impl Iterator<Item = (ScrollNodeId, Point)> + '_ {
        self.registry
            .iter()
            .map(|(_, c)| (c.id(), c.composited_offset()))
    }

    /// Adopt an offset pushed by the control side outside a snapshot.
    pub fn push_authoritative_offset(
        &mut self,
        id: ScrollNodeId,
        offset: Point,
        generation: ScrollGeneration,
    ) -> Disposition {
        let Some(controller) = self.registry.by_identity_mut(id) else {
            tracing::debug!(message = "apz.offset.push_stale", id = %id);
            return Disposition::Stale;
        };
        let adopted = controller.push_authoritative_offset(offset, generation);
        tracing::debug!(
            message = "apz.offset.push",
            id = %id,
            generation = generation.0,
            adopted
        );
        Disposition::Applied
    }

    /// Force a compositor-side offset for tests and tooling.
    pub fn set_async_scroll_offset(&mut self, id: ScrollNodeId, offset: Point) -> Disposition {
        match self.registry.by_identity_mut(id) {
            Some(controller) => {
                controller.set_async_offset(offset);
                Disposition::Applied
            }
            None => {
                tracing::debug!(message = "apz.offset.async_stale", id = %id);
                Disposition::Stale
            }
        }
    }

    // -- input -------------------------------------------------------------

    /// Route one raw input event.
    pub fn receive_input_event(&mut self, event: &InputEvent) -> InputResult {
        let result = match event {
            InputEvent::Touch(touch) => self.receive_touch(touch),
            InputEvent::Wheel(wheel) => self.receive_wheel(wheel),
            InputEvent::Pointer(pointer) => self.receive_pointer(pointer),
        };
        tracing::trace!(
            message = "apz.input",
            kind = event.kind_name(),
            block = result.block_id.map(|b| b.0),
            status = ?result.status
        );
        result
    }

    fn receive_touch(&mut self, event: &TouchEvent) -> InputResult {
        let now = event.timestamp;
        match event.phase {
            TouchPhase::Start => {
                let Some(first) = event.touches.first() else {
                    return InputResult::UNROUTED;
                };
                let (id, fresh) = match self.blocks.active(BlockKind::Touch) {
                    Some(id) => (id, false),
                    None => (self.start_block(BlockKind::Touch, first.point, now), true),
                };
                let Some(block) = self.blocks.get_mut(id) else {
                    return InputResult::UNROUTED;
                };
                block.last_event_at = now;
                let added: SmallVec<[Point; 4]> = event
                    .touches
                    .iter()
                    .filter(|t| block.upsert_contact(**t))
                    .map(|t| t.point)
                    .collect();
                if added.is_empty() {
                    return self.result(id);
                }
                let (focus, contacts) = (block.focus(), block.contacts.len());
                let skip = usize::from(fresh);
                self.retarget_for_contacts(id, &added[skip..]);
                if let Some(focus) = focus {
                    self.deliver(
                        id,
                        GestureInput::ContactStart {
                            focus,
                            contacts,
                            time: now,
                        },
                    );
                }
                self.result(id)
            }
            TouchPhase::Move => {
                let Some(id) = self.blocks.active(BlockKind::Touch) else {
                    return InputResult::UNROUTED;
                };
                let Some(block) = self.blocks.get_mut(id) else {
                    return InputResult::UNROUTED;
                };
                block.last_event_at = now;
                for touch in &event.touches {
                    if block.has_contact(touch.id) {
                        block.upsert_contact(*touch);
                    }
                }
                if let Some(focus) = block.focus() {
                    self.deliver(id, GestureInput::ContactMove { focus, time: now });
                }
                self.result(id)
            }
            TouchPhase::End | TouchPhase::Cancel => {
                let Some(id) = self.blocks.active(BlockKind::Touch) else {
                    return InputResult::UNROUTED;
                };
                let Some(block) = self.blocks.get_mut(id) else {
                    return InputResult::UNROUTED;
                };
                block.last_event_at = now;
                let input = if event.phase == TouchPhase::Cancel {
                    block.contacts.clear();
                    GestureInput::ContactCancel
                } else {
                    for touch in &event.touches {
                        block.remove_contact(touch.id);
                    }
                    GestureInput::ContactEnd {
                        focus: block.focus(),
                        remaining: block.contacts.len(),
                        time: now,
                    }
                };
                let done = block.contacts.is_empty();
                self.deliver(id, input);
                let result = self.result(id);
                if done {
                    self.finish_block(id);
                }
                result
            }
        }
    }

    fn receive_wheel(&mut self, event: &WheelEvent) -> InputResult {
        let now = event.timestamp;
        let mut delta = event.delta;
        if event.mode == WheelDeltaMode::Line {
            delta = delta.scale(self.config.wheel_line_px);
        }
        if event.modifiers.contains(Modifiers::SHIFT) {
            delta = delta.transpose();
        }

        let transaction = self.config.wheel_transaction_timeout;
        let active = self.blocks.active(BlockKind::Wheel);
        let continuing = active.filter(|id| {
            self.blocks
                .get(*id)
                .is_some_and(|b| now.saturating_duration_since(b.last_event_at) < transaction)
        });
        let id = match continuing {
            Some(id) => id,
            None => {
                if let Some(expired) = active {
                    self.finish_block(expired);
                }
                self.start_block(BlockKind::Wheel, event.point, now)
            }
        };
        if let Some(block) = self.blocks.get_mut(id) {
            block.last_event_at = now;
        }
        self.deliver(id, GestureInput::Scroll { delta });
        self.result(id)
    }

    fn receive_pointer(&mut self, event: &PointerEvent) -> InputResult {
        let now = event.timestamp;
        let contact = TouchPoint {
            id: event.id,
            point: event.point,
        };
        match event.kind {
            PointerKind::Down => {
                if let Some(stale) = self.blocks.active(BlockKind::Pointer) {
                    self.deliver(stale, GestureInput::ContactCancel);
                    self.finish_block(stale);
                }
                let id = self.start_block(BlockKind::Pointer, event.point, now);
                if let Some(block) = self.blocks.get_mut(id) {
                    block.upsert_contact(contact);
                }
                self.deliver(
                    id,
                    GestureInput::ContactStart {
                        focus: event.point,
                        contacts: 1,
                        time: now,
                    },
                );
                self.result(id)
            }
            PointerKind::Move => {
                let Some(id) = self.blocks.active(BlockKind::Pointer) else {
                    return InputResult::UNROUTED;
                };
                if let Some(block) = self.blocks.get_mut(id) {
                    block.last_event_at = now;
                    block.upsert_contact(contact);
                }
                self.deliver(
                    id,
                    GestureInput::ContactMove {
                        focus: event.point,
                        time: now,
                    },
                );
                self.result(id)
            }
            PointerKind::Up => {
                let Some(id) = self.blocks.active(BlockKind::Pointer) else {
                    return InputResult::UNROUTED;
                };
                if let Some(block) = self.blocks.get_mut(id) {
                    block.last_event_at = now;
                    block.contacts.clear();
                }
                self.deliver(
                    id,
                    GestureInput::ContactEnd {
                        focus: None,
                        remaining: 0,
                        time: now,
                    },
                );
                let result = self.result(id);
                self.finish_block(id);
                result
            }
        }
    }

    fn start_block(&mut self, kind: BlockKind, point: Point, now: Instant) -> BlockId {
        let (target, requires_confirmation) = self.hit_target(point);
        let id = self.blocks.start(kind, target, requires_confirmation, now);
        tracing::debug!(
            message = "apz.block.start",
            block = id.0,
            kind = ?kind,
            target = ?self.identity(target),
            pending = requires_confirmation
        );
        id
    }

    fn result(&self, id: BlockId) -> InputResult {
        let status = match self.blocks.get(id) {
            Some(block) if block.consumed_by_content => InputStatus::ConsumedByContent,
            Some(block) if block.target.is_some_and(|h| self.registry.is_live(h)) => {
                if block.is_pending() {
                    InputStatus::Speculative
                } else {
                    InputStatus::Handled
                }
            }
            _ => InputStatus::NoTarget,
        };
        InputResult {
            block_id: Some(id),
            status,
        }
    }

    /// Buffer `input` if the block is pending, and apply it to the current
    /// target.
    fn deliver(&mut self, id: BlockId, input: GestureInput) {
        let Some(block) = self.blocks.get_mut(id) else {
            return;
        };
        if block.consumed_by_content {
            return;
        }
        let pending = block.is_pending();
        let target = block.target;
        if pending {
            block.buffered.push(input.clone());
        }
        if let Some(handle) = target {
            self.apply_input(id, handle, &input, pending);
        }
    }

    /// Apply one input to `handle`, handing leftover delta up the parent
    /// chain.
    fn apply_input(
        &mut self,
        id: BlockId,
        handle: ControllerHandle,
        input: &GestureInput,
        defer_taps: bool,
    ) {
        let Some(controller) = self.registry.controller_mut(handle) else {
            return;
        };
        if let Some(block) = self.blocks.get_mut(id) {
            block.remember(handle, controller.snapshot());
        }
        if input.begins_gesture() {
            controller.set_active_block(id);
        }
        let before = controller.state_generation();
        let outcome = controller.consume_input(input);
        let target = controller.id();
        let mut moved: SmallVec<[ControllerHandle; 4]> = SmallVec::new();
        if controller.state_generation() != before {
            moved.push(handle);
        }

        let mut overscroll = outcome.overscroll;
        let mut next = controller.parent();
        let mut hops = self.registry.len();
        while let Some(parent) = next {
            if overscroll.is_zero() || hops == 0 {
                break;
            }
            hops -= 1;
            let Some(ancestor) = self.registry.controller_mut(parent) else {
                break;
            };
            if let Some(block) = self.blocks.get_mut(id) {
                block.remember(parent, ancestor.snapshot());
            }
            let before = ancestor.state_generation();
            overscroll = ancestor.scroll_by(overscroll);
            if ancestor.state_generation() != before {
                moved.push(parent);
            }
            next = ancestor.parent();
        }

        for handle in moved {
            self.notify_repaint(handle);
        }
        if let Some(tap) = outcome.tap {
            self.emit_tap(id, target, tap, defer_taps);
        }
    }

    fn notify_repaint(&self, handle: ControllerHandle) {
        if let Some(c) = self.registry.controller(handle) {
            self.content
                .request_content_repaint(c.id(), c.composited_offset(), c.state_generation());
        }
    }

    fn emit_tap(&mut self, id: BlockId, target: ScrollNodeId, tap: TapEvent, defer: bool) {
        if defer && let Some(block) = self.blocks.get_mut(id) {
            block.deferred_taps.push((target, tap));
            return;
        }
        self.content.handle_tap(tap.kind, tap.point, target, id);
    }

    // -- multi-touch -------------------------------------------------------

    fn retarget_for_contacts(&mut self, id: BlockId, points: &[Point]) {
        for &point in points {
            let Some(candidate) = self.hit_target(point).0 else {
                continue;
            };
            let Some(block) = self.blocks.get(id) else {
                return;
            };
            if block.consumed_by_content || block.target == Some(candidate) {
                continue;
            }
            let current = block.target;
            let chosen = self.multi_touch_choice(current, candidate);
            if chosen != current {
                self.retarget(id, chosen);
            }
        }
    }

    /// Root content wins, then the nearest common ancestor, then the
    /// current target.
    fn multi_touch_choice(
        &self,
        current: Option<ControllerHandle>,
        candidate: ControllerHandle,
    ) -> Option<ControllerHandle> {
        let Some(current) = current else {
            return Some(candidate);
        };
        let is_root =
            |h: ControllerHandle| self.registry.controller(h).is_some_and(|c| c.is_root_content());
        if is_root(current) {
            return Some(current);
        }
        if is_root(candidate) {
            return Some(candidate);
        }
        let chain = self.parent_chain(current);
        self.parent_chain(candidate)
            .into_iter()
            .find(|h| chain.contains(h))
            .or(Some(current))
    }

    fn parent_chain(&self, start: ControllerHandle) -> SmallVec<[ControllerHandle; 8]> {
        let mut chain = SmallVec::new();
        let mut next = Some(start);
        while let Some(handle) = next {
            if chain.len() > self.registry.len() {
                break;
            }
            let Some(c) = self.registry.controller(handle) else {
                break;
            };
            chain.push(handle);
            next = c.parent();
        }
        chain
    }

    fn retarget(&mut self, id: BlockId, target: Option<ControllerHandle>) {
        let Some(block) = self.blocks.get_mut(id) else {
            return;
        };
        let old = block.target;
        block.target = target;
        block.target_locked = true;
        block.rollback.clear();
        block.buffered.clear();
        block.deferred_taps.clear();
        if let Some(old) = old
            && let Some(c) = self.registry.controller_mut(old)
        {
            c.clear_gesture_state();
        }
        tracing::debug!(
            message = "apz.block.retarget",
            block = id.0,
            from = ?self.identity(old),
            to = ?self.identity(target)
        );
    }

    // -- control side ------------------------------------------------------

    /// Authoritative target for `id`. `None` means no controller should
    /// take the block.
    ///
    /// An identity with no live controller keeps the provisional target.
    pub fn confirm_target(&mut self, id: BlockId, target: Option<ScrollNodeId>) -> Disposition {
        let Some(block) = self.blocks.get(id) else {
            tracing::debug!(message = "apz.block.confirm_stale", block = id.0);
            return Disposition::Stale;
        };
        if !block.is_pending() {
            tracing::debug!(message = "apz.block.already_confirmed", block = id.0);
            return Disposition::Applied;
        }
        let resolved = match target {
            None => None,
            Some(identity) => match self.registry.get(identity) {
                Some(handle) => Some(handle),
                None => {
                    tracing::warn!(
                        message = "apz.block.confirm_unknown_target",
                        block = id.0,
                        target = %identity
                    );
                    block.target
                }
            },
        };
        self.resolve_block(id, resolved);
        Disposition::Applied
    }

    fn resolve_block(&mut self, id: BlockId, resolved: Option<ControllerHandle>) {
        let Some(block) = self.blocks.get_mut(id) else {
            return;
        };
        if !block.is_pending() {
            return;
        }

        if block.target_locked || block.target == resolved {
            block.state = BlockState::Confirmed;
            block.buffered.clear();
            let taps = std::mem::take(&mut block.deferred_taps);
            tracing::debug!(message = "apz.block.confirm", block = id.0, locked = block.target_locked);
            for (target, tap) in taps {
                self.content.handle_tap(tap.kind, tap.point, target, id);
            }
        } else {
            block.state = BlockState::Overridden;
            let old = block.target;
            let rollback = std::mem::take(&mut block.rollback);
            let buffered = std::mem::take(&mut block.buffered);
            block.deferred_taps.clear();
            block.target = resolved;
            tracing::debug!(
                message = "apz.block.override",
                block = id.0,
                from = ?self.identity(old),
                to = ?self.identity(resolved),
                replay = buffered.len()
            );

            self.roll_back(id, old, &rollback);
            if let Some(new) = resolved {
                for input in &buffered {
                    self.apply_input(id, new, input, false);
                }
            }
            if let Some(block) = self.blocks.get_mut(id) {
                block.state = BlockState::Confirmed;
            }
        }
        self.blocks.remove_if_done(id);
    }

    /// Undo what block `id` did: restore every controller it moved, newest
    /// first, and drop its gesture state on `target`.
    ///
    /// A controller that adopted an authoritative offset since its snapshot
    /// keeps that offset.
    fn roll_back(
        &mut self,
        id: BlockId,
        target: Option<ControllerHandle>,
        rollback: &[(ControllerHandle, OffsetSnapshot)],
    ) {
        for (handle, snapshot) in rollback.iter().rev() {
            let restored = self
                .registry
                .controller_mut(*handle)
                .is_some_and(|c| c.restore(snapshot));
            if restored {
                self.notify_repaint(*handle);
            }
        }
        if let Some(c) = target.and_then(|h| self.registry.controller_mut(h)) {
            c.release_gesture(id);
        }
    }

    /// Content's verdict on a block. With `prevent_default` the block is
    /// consumed: speculative changes are rolled back and the rest of the
    /// block is dropped.
    pub fn content_received_input_block(&mut self, id: BlockId, prevent_default: bool) -> Disposition {
        let Some(block) = self.blocks.get_mut(id) else {
            tracing::debug!(message = "apz.block.content_response_stale", block = id.0);
            return Disposition::Stale;
        };
        if !prevent_default {
            return Disposition::Applied;
        }
        block.consumed_by_content = true;
        block.state = BlockState::Confirmed;
        block.buffered.clear();
        block.deferred_taps.clear();
        let target = block.target.take();
        let rollback = std::mem::take(&mut block.rollback);
        tracing::debug!(
            message = "apz.block.prevented",
            block = id.0,
            restored = rollback.len()
        );
        self.roll_back(id, target, &rollback);
        self.blocks.remove_if_done(id);
        Disposition::Applied
    }

    /// Abort block `id` in whatever state it is in.
    pub fn cancel_block(&mut self, id: BlockId) -> Disposition {
        let Some(block) = self.blocks.remove(id) else {
            tracing::debug!(message = "apz.block.cancel_stale", block = id.0);
            return Disposition::Stale;
        };
        for handle in [block.target, block.provisional].into_iter().flatten() {
            if let Some(c) = self.registry.controller_mut(handle) {
                c.release_gesture(id);
            }
        }
        tracing::debug!(
            message = "apz.block.cancel",
            block = id.0,
            dropped = block.buffered.len()
        );
        Disposition::Applied
    }

    fn finish_block(&mut self, id: BlockId) {
        if let Some(block) = self.blocks.get(id) {
            for handle in [block.target, block.provisional].into_iter().flatten() {
                if let Some(c) = self.registry.controller_mut(handle) {
                    c.release_block(id);
                }
            }
        }
        self.blocks.finish(id);
    }

    // -- time --------------------------------------------------------------

    /// Advance timers: confirmation timeouts, wheel transactions, long
    /// presses.
    pub fn tick(&mut self, now: Instant) -> TickSummary {
        let mut summary = TickSummary::default();

        for id in self.blocks.expired(now, &self.config.timeouts) {
            let target = self.blocks.get(id).and_then(|b| b.target);
            tracing::info!(
                message = "apz.block.timeout",
                block = id.0,
                target = ?self.identity(target)
            );
            self.resolve_block(id, target);
            summary.auto_confirmed += 1;
        }

        if let Some(id) = self.blocks.active(BlockKind::Wheel)
            && self.blocks.get(id).is_some_and(|b| {
                now.saturating_duration_since(b.last_event_at) >= self.config.wheel_transaction_timeout
            })
        {
            self.finish_block(id);
            summary.wheel_transactions_ended += 1;
        }

        for handle in self.registry.handles() {
            let Some(c) = self.registry.controller_mut(handle) else {
                continue;
            };
            if !c.is_tracking_contact() {
                continue;
            }
            let (Some(tap), Some(block)) = (c.check_long_press(now), c.active_block()) else {
                continue;
            };
            let target = c.id();
            let defer = self.blocks.get(block).is_some_and(|b| b.is_pending());
            self.emit_tap(block, target, tap, defer);
            summary.long_taps += 1;
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
