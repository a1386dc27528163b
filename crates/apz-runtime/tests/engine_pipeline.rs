//! The engine driven through its channels: control messages applied at
//! frame boundaries, notifications flowing back, and sampler readers on
//! other threads.

use std::sync::Arc;
use std::thread;

use apz_core::{
    InputEvent, Point, Rect, SceneId, ScrollGeneration, ScrollGeometry, ScrollId, ScrollNodeId,
    TapKind, TouchEvent, TouchPhase, WheelEvent,
};
use apz_runtime::{ApzConfig, ApzEngine, ControlMsg, notification_channel};
use apz_tree::{ContentNotification, HitFlags, InputStatus, SceneNode, ScrollMetadata};
use web_time::{Duration, Instant};

const SCENE: SceneId = SceneId(1);

fn id(scroll: u64) -> ScrollNodeId {
    ScrollNodeId::new(SCENE, ScrollId(scroll))
}

fn geometry(scrollable: f32, composition: f32) -> ScrollGeometry {
    ScrollGeometry::new(
        Rect::from_size(scrollable, scrollable),
        Rect::from_size(composition, composition),
    )
}

/// Root content (id 2) over 200x200 with a left pane (id 3) that asks for
/// confirmation.
fn scene(root_extent: f32) -> SceneNode {
    SceneNode::new(0, Rect::from_size(200.0, 200.0))
        .with_scroll(ScrollMetadata::new(ScrollId(2), geometry(root_extent, 200.0)).root_content())
        .with_child(
            SceneNode::new(1, Rect::new(0.0, 0.0, 100.0, 200.0))
                .with_flags(HitFlags::VISIBLE | HitFlags::REQUIRES_TARGET_CONFIRMATION)
                .with_scroll(ScrollMetadata::new(ScrollId(3), geometry(600.0, 200.0))),
        )
}

fn wheel(x: f32, dy: f32, t: Instant) -> InputEvent {
    WheelEvent::new(Point::new(x, 50.0), Point::new(0.0, dy), t).into()
}

#[test]
fn snapshot_takes_effect_at_next_frame() {
    let (content, _rx) = notification_channel();
    let (mut engine, control) = ApzEngine::new(&ApzConfig::default(), Arc::new(content));
    let sampler = engine.sampler();

    control.send_scene(SCENE, scene(1000.0), true).expect("send");
    assert!(engine.manager().registry().is_empty());
    assert_eq!(sampler.composited_offset(id(2)), None);

    let report = engine.begin_frame(Instant::now());
    assert_eq!(report.rebuilds, 1);
    assert_eq!(engine.manager().registry().len(), 2);
    assert_eq!(sampler.composited_offset(id(2)), Some(Point::ZERO));
    assert_eq!(sampler.composited_offset(id(3)), Some(Point::ZERO));
}

#[test]
fn burst_of_snapshots_is_coalesced() {
    let (content, _rx) = notification_channel();
    let (mut engine, control) = ApzEngine::new(&ApzConfig::default(), Arc::new(content));
    for extent in [300.0, 400.0, 500.0] {
        control.send_scene(SCENE, scene(extent), false).expect("send");
    }
    let report = engine.begin_frame(Instant::now());
    assert_eq!(report.received, 3);
    assert_eq!(report.coalesced, 2);
    assert_eq!(report.rebuilds, 1);
    let root = engine.manager().controller(id(2)).expect("root");
    assert_eq!(root.geometry().scrollable_rect.height, 500.0);
}

#[test]
fn confirmation_moves_speculative_scroll() {
    let (content, _rx) = notification_channel();
    let (mut engine, control) = ApzEngine::new(&ApzConfig::default(), Arc::new(content));
    let sampler = engine.sampler();
    control.send_scene(SCENE, scene(1000.0), true).expect("send");
    let t = Instant::now();
    engine.begin_frame(t);

    let r = engine.receive_input_event(&wheel(50.0, 30.0, t));
    assert_eq!(r.status, InputStatus::Speculative);
    let block = r.block_id.expect("block");
    engine.begin_frame(t);
    assert_eq!(sampler.composited_offset(id(3)), Some(Point::new(0.0, 30.0)));

    control.confirm_target(block, Some(id(2))).expect("send");
    let report = engine.begin_frame(t + Duration::from_millis(16));
    assert_eq!(report.stale, 0);
    assert_eq!(sampler.composited_offset(id(3)), Some(Point::ZERO));
    assert_eq!(sampler.composited_offset(id(2)), Some(Point::new(0.0, 30.0)));
}

#[test]
fn stale_control_messages_are_counted() {
    let (content, _rx) = notification_channel();
    let (mut engine, control) = ApzEngine::new(&ApzConfig::default(), Arc::new(content));
    control
        .push_offset(id(9), Point::new(0.0, 10.0), ScrollGeneration(1))
        .expect("send");
    control
        .send(ControlMsg::RemoveScene { scene: SceneId(42) })
        .expect("send");
    let report = engine.begin_frame(Instant::now());
    assert_eq!(report.stale, 2);
}

#[test]
fn taps_reach_the_control_side() {
    let (content, notifications) = notification_channel();
    let (mut engine, control) = ApzEngine::new(&ApzConfig::default(), Arc::new(content));
    control.send_scene(SCENE, scene(1000.0), true).expect("send");
    let t = Instant::now();
    engine.begin_frame(t);

    let at = |phase| -> InputEvent {
        TouchEvent::new(phase, t)
            .with_touch(0, Point::new(150.0, 50.0))
            .into()
    };
    engine.receive_input_event(&at(TouchPhase::Start));
    engine.receive_input_event(&at(TouchPhase::End));

    let taps: Vec<_> = notifications
        .drain()
        .into_iter()
        .filter_map(|n| match n {
            ContentNotification::Tap { kind, target, .. } => Some((kind, target)),
            ContentNotification::Repaint { .. } => None,
        })
        .collect();
    assert_eq!(taps, vec![(TapKind::SingleTap, id(2))]);
}

#[test]
fn control_and_readers_on_other_threads() {
    let (content, notifications) = notification_channel();
    let (mut engine, control) = ApzEngine::new(&ApzConfig::default(), Arc::new(content));
    let sampler = engine.sampler();

    let producer = thread::spawn(move || {
        for extent in (0..50).map(|i| 400.0 + i as f32 * 10.0) {
            control.send_scene(SCENE, scene(extent), false).expect("send");
        }
    });

    let reader = {
        let sampler = sampler.clone();
        thread::spawn(move || {
            let mut last = 0;
            for _ in 0..500 {
                let frame = sampler.frame();
                assert!(frame.frame >= last, "frame numbers went backwards");
                last = frame.frame;
                if let Some(offset) = frame.offsets.get(&id(2)) {
                    assert!(offset.y >= 0.0);
                }
                thread::yield_now();
            }
        })
    };

    let start = Instant::now();
    let mut clock = start;
    while !producer.is_finished() || engine.begin_frame(clock).received > 0 {
        clock += Duration::from_millis(16);
        engine.receive_input_event(&wheel(150.0, 40.0, clock));
        engine.begin_frame(clock);
    }
    producer.join().expect("producer");
    reader.join().expect("reader");
    engine.begin_frame(clock);

    let root = engine.manager().controller(id(2)).expect("root");
    assert_eq!(root.geometry().scrollable_rect.height, 890.0);
    let offset = sampler.composited_offset(id(2)).expect("published");
    assert!(root.geometry().offset_in_range(offset));
    drop(notifications);
}
