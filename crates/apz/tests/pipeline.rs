//! Full pipeline across threads: a control thread publishes scenes and
//! answers confirmations, a render thread owns the engine and routes input,
//! and the test thread reads offsets through the sampler.

use std::io::Write;
use std::sync::mpsc;
use std::thread;

use apz::prelude::*;
use apz::{BlockId, ContentNotification, Error, HitFlags, WheelEvent};
use web_time::{Duration, Instant};

const SCENE: SceneId = SceneId(1);

fn id(scroll: u64) -> ScrollNodeId {
    ScrollNodeId::new(SCENE, ScrollId(scroll))
}

/// Root content (id 2) with a pane (id 3) over its left half that asks for
/// confirmation.
fn page() -> SceneNode {
    let g = |h: f32| ScrollGeometry::new(Rect::from_size(200.0, h), Rect::from_size(200.0, 200.0));
    SceneNode::new(0, Rect::from_size(200.0, 200.0))
        .with_scroll(ScrollMetadata::new(ScrollId(2), g(2000.0)).root_content())
        .with_child(
            SceneNode::new(1, Rect::new(0.0, 0.0, 100.0, 200.0))
                .with_flags(HitFlags::VISIBLE | HitFlags::REQUIRES_TARGET_CONFIRMATION)
                .with_scroll(ScrollMetadata::new(ScrollId(3), g(800.0))),
        )
}

#[test]
fn control_render_and_sampler_threads() {
    let (mut engine, handles) = apz::start(ApzConfig::default()).expect("start");
    let sampler = engine.sampler();
    let (block_tx, block_rx) = mpsc::channel::<BlockId>();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    handles
        .control
        .send_scene(SCENE, page(), true)
        .expect("send");

    // Render/input context: one wheel notch per frame over the pane.
    let render = thread::spawn(move || {
        let start = Instant::now();
        let mut clock = start;
        engine.begin_frame(clock);
        for _ in 0..5 {
            clock += Duration::from_millis(16);
            let ev: InputEvent =
                WheelEvent::new(Point::new(50.0, 50.0), Point::new(0.0, 20.0), clock).into();
            if let Some(block) = engine.receive_input_event(&ev).block_id {
                let _ = block_tx.send(block);
            }
            engine.begin_frame(clock);
        }
        // Keep drawing frames on a frozen clock until the control side is
        // done, so the confirmation timeout cannot fire first.
        while done_rx.try_recv().is_err() {
            engine.begin_frame(clock);
            thread::yield_now();
        }
        clock += Duration::from_millis(16);
        engine.begin_frame(clock);
        engine
    });

    // Control context: the page handler says the root should scroll.
    let block = block_rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("a block was started");
    handles
        .control
        .confirm_target(block, Some(id(2)))
        .expect("send");
    drop(block_rx);
    let deadline = Instant::now() + Duration::from_secs(5);
    while sampler.composited_offset(id(2)).is_none_or(|p| p.y < 100.0) {
        assert!(Instant::now() < deadline, "root never reached 100");
        thread::yield_now();
    }
    done_tx.send(()).expect("render alive");
    let engine = render.join().expect("render thread");

    assert_eq!(sampler.composited_offset(id(2)), Some(Point::new(0.0, 100.0)));
    assert_eq!(sampler.composited_offset(id(3)), Some(Point::ZERO));
    assert_eq!(sampler.frame_number(), engine.frame_number());

    let repaints = handles
        .notifications
        .drain()
        .into_iter()
        .filter(|n| matches!(n, ContentNotification::Repaint { .. }) && n.target() == id(2))
        .count();
    assert!(repaints > 0);
}

#[test]
fn invalid_config_is_a_config_error() {
    let mut config = ApzConfig::default();
    config.channel.capacity = 0;
    assert!(matches!(apz::start(config), Err(Error::Config(_))));
}

#[test]
fn start_from_file_reads_toml() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tempfile");
    file.write_all(b"[channel]\ncapacity = 4\n").expect("write");
    let (_engine, handles) = apz::start_from_file(file.path()).expect("start");
    for _ in 0..4 {
        handles
            .control
            .try_send(apz::ControlMsg::CancelBlock { block: BlockId(0) })
            .expect("fits");
    }
    let err = handles
        .control
        .try_send(apz::ControlMsg::CancelBlock { block: BlockId(0) })
        .map_err(Error::from)
        .expect_err("full");
    assert!(matches!(err, Error::Channel(apz::ChannelError::Full)));
}
