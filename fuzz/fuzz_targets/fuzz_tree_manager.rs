#![no_main]

use apz_core::{
    InputEvent, Point, PointerEvent, PointerKind, Rect, SceneId, ScrollGeneration,
    ScrollGeometry, ScrollId, ScrollNodeId, TouchEvent, TouchPhase, WheelEvent,
};
use apz_tree::{BlockId, HitFlags, SceneNode, ScrollMetadata, TreeManager};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use web_time::{Duration, Instant};

#[derive(Debug, Arbitrary)]
struct Node {
    scroll: Option<u8>,
    bounds: (u8, u8, u8, u8),
    extent: (u16, u16),
    confirm: bool,
    embeds: Option<u8>,
    children: Vec<Node>,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Rebuild { scene: u8, root: Node, first_paint: bool },
    Remove(u8),
    SetRoot(u8),
    Touch { phase: u8, touches: Vec<(u8, u8, u8)> },
    Wheel { x: u8, y: u8, dx: i8, dy: i8 },
    Pointer { kind: u8, x: u8, y: u8 },
    Confirm { block: u8, scene: u8, scroll: Option<u8> },
    Prevent { block: u8, prevent: bool },
    Cancel(u8),
    Push { scene: u8, scroll: u8, y: i16, generation: u8 },
    Tick(u16),
}

fn build(node: &Node, layer: &mut u64, depth: usize) -> SceneNode {
    *layer += 1;
    let (x, y, w, h) = node.bounds;
    let mut out = SceneNode::new(*layer, Rect::new(x as f32, y as f32, w as f32, h as f32));
    if node.confirm {
        out = out.with_flags(HitFlags::VISIBLE | HitFlags::REQUIRES_TARGET_CONFIRMATION);
    }
    if let Some(scroll) = node.scroll {
        let geometry = ScrollGeometry::new(
            Rect::from_size(node.extent.0 as f32, node.extent.1 as f32),
            Rect::from_size(w as f32, h as f32),
        );
        out = out.with_scroll(ScrollMetadata::new(ScrollId(u64::from(scroll % 8)), geometry));
    }
    if let Some(scene) = node.embeds {
        out = out.embedding(SceneId(u64::from(scene % 4)));
    }
    if depth < 6 {
        out = out.with_children(node.children.iter().take(4).map(|c| build(c, layer, depth + 1)));
    }
    out
}

fuzz_target!(|ops: Vec<Op>| {
    let mut m = TreeManager::default();
    let mut clock = Instant::now();
    let point = |x: u8, y: u8| Point::new(x as f32, y as f32);
    let id = |scene: u8, scroll: u8| ScrollNodeId::new(SceneId(u64::from(scene % 4)), ScrollId(u64::from(scroll % 8)));

    for op in ops.iter().take(64) {
        clock += Duration::from_millis(8);
        match op {
            Op::Rebuild { scene, root, first_paint } => {
                let mut layer = 0;
                m.rebuild_tree(SceneId(u64::from(scene % 4)), build(root, &mut layer, 0), *first_paint);
            }
            Op::Remove(scene) => {
                m.remove_scene(SceneId(u64::from(scene % 4)));
            }
            Op::SetRoot(scene) => {
                m.set_root_scene(SceneId(u64::from(scene % 4)));
            }
            Op::Touch { phase, touches } => {
                let phase = match phase % 4 {
                    0 => TouchPhase::Start,
                    1 => TouchPhase::Move,
                    2 => TouchPhase::End,
                    _ => TouchPhase::Cancel,
                };
                let ev = touches
                    .iter()
                    .take(5)
                    .fold(TouchEvent::new(phase, clock), |ev, &(i, x, y)| {
                        ev.with_touch(u32::from(i % 5), point(x, y))
                    });
                m.receive_input_event(&InputEvent::from(ev));
            }
            Op::Wheel { x, y, dx, dy } => {
                let ev = WheelEvent::new(point(*x, *y), Point::new(*dx as f32, *dy as f32), clock);
                m.receive_input_event(&InputEvent::from(ev));
            }
            Op::Pointer { kind, x, y } => {
                let kind = match kind % 3 {
                    0 => PointerKind::Down,
                    1 => PointerKind::Move,
                    _ => PointerKind::Up,
                };
                m.receive_input_event(&InputEvent::from(PointerEvent::new(kind, point(*x, *y), clock)));
            }
            Op::Confirm { block, scene, scroll } => {
                m.confirm_target(BlockId(u64::from(*block % 8)), scroll.map(|s| id(*scene, s)));
            }
            Op::Prevent { block, prevent } => {
                m.content_received_input_block(BlockId(u64::from(*block % 8)), *prevent);
            }
            Op::Cancel(block) => {
                m.cancel_block(BlockId(u64::from(*block % 8)));
            }
            Op::Push { scene, scroll, y, generation } => {
                m.push_authoritative_offset(
                    id(*scene, *scroll),
                    Point::new(0.0, *y as f32),
                    ScrollGeneration(u64::from(*generation)),
                );
            }
            Op::Tick(ms) => {
                clock += Duration::from_millis(u64::from(*ms));
                m.tick(clock);
            }
        }

        for (_, c) in m.registry().iter() {
            assert!(c.geometry().offset_in_range(c.composited_offset()), "offset out of range");
        }
        for (i, node) in m.tree().nodes().iter().enumerate() {
            if let Some(parent) = node.parent {
                assert!(parent.get() < i, "parent after child in pre-order");
            }
        }
    }
});
