//! Property tests for the frame loop.
//!
//! 1. **Bounded drain**: no frame applies more than
//!    `max_messages_per_frame` messages, and every sent message is
//!    eventually received.
//! 2. **Published range**: every sampled offset lies in its controller's
//!    scroll range after each frame.
//! 3. **Monotonic frames**: sampled frame numbers strictly increase.

use std::sync::Arc;

use apz_core::{Point, Rect, SceneId, ScrollGeneration, ScrollGeometry, ScrollId, ScrollNodeId};
use apz_runtime::{ApzConfig, ApzEngine, ControlMsg};
use apz_tree::{BlockId, NoopContentController, SceneNode, ScrollMetadata};
use proptest::prelude::*;
use web_time::{Duration, Instant};

fn scene(extent: f32) -> SceneNode {
    let geometry = ScrollGeometry::new(
        Rect::from_size(100.0, extent),
        Rect::from_size(100.0, 100.0),
    );
    SceneNode::new(0, Rect::from_size(100.0, 100.0))
        .with_scroll(ScrollMetadata::new(ScrollId::START, geometry).root_content())
}

fn msg_strategy() -> impl Strategy<Value = ControlMsg> {
    prop_oneof![
        (1u64..3, 50.0f32..800.0, any::<bool>()).prop_map(|(s, extent, first)| {
            ControlMsg::SceneSnapshot {
                scene: SceneId(s),
                root: scene(extent),
                is_first_paint: first,
            }
        }),
        (1u64..3).prop_map(|s| ControlMsg::RemoveScene { scene: SceneId(s) }),
        (1u64..3).prop_map(|s| ControlMsg::SetRootScene { scene: SceneId(s) }),
        (0u64..4).prop_map(|b| ControlMsg::CancelBlock { block: BlockId(b) }),
        (1u64..3, -200.0f32..1000.0, 0u64..5).prop_map(|(s, y, g)| ControlMsg::PushOffset {
            id: ScrollNodeId::new(SceneId(s), ScrollId::START),
            offset: Point::new(0.0, y),
            generation: ScrollGeneration(g),
        }),
    ]
}

proptest! {
    #[test]
    fn frames_drain_bounded_and_publish_in_range(
        msgs in proptest::collection::vec(msg_strategy(), 0..60),
        limit in 1usize..10,
    ) {
        let mut config = ApzConfig::default();
        config.channel.max_messages_per_frame = limit;
        let (mut engine, control) = ApzEngine::new(&config, Arc::new(NoopContentController));
        let sampler = engine.sampler();
        let sent = msgs.len();
        for msg in msgs {
            control.send(msg).expect("send");
        }

        let mut received = 0;
        let mut last_frame = sampler.frame_number();
        let mut clock = Instant::now();
        loop {
            clock += Duration::from_millis(16);
            let report = engine.begin_frame(clock);
            prop_assert!(report.received <= limit);
            received += report.received;

            let frame = sampler.frame();
            prop_assert!(frame.frame > last_frame);
            last_frame = frame.frame;
            for (id, offset) in &frame.offsets {
                let c = engine.manager().controller(*id).expect("published id is live");
                prop_assert!(c.geometry().offset_in_range(*offset));
            }
            if report.received == 0 {
                break;
            }
        }
        prop_assert_eq!(received, sent);
    }
}
