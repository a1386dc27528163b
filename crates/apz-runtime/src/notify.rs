#![forbid(unsafe_code)]

//! Channel-backed [`ContentController`].
//!
//! The tree manager calls its content controller synchronously on the
//! render/input context. [`ChannelContentController`] turns each call into a
//! [`ContentNotification`] and hands it to the control context without
//! blocking.

use std::sync::mpsc;

use apz_core::{Point, ScrollNodeId, TapKind};
use apz_tree::{BlockId, ContentController, ContentNotification};
use web_time::Duration;

/// Forwards notifications over an unbounded channel. A dropped receiver
/// turns every call into a no-op.
#[derive(Debug)]
pub struct ChannelContentController {
    tx: mpsc::Sender<ContentNotification>,
}

impl ChannelContentController {
    fn forward(&self, notification: ContentNotification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!(message = "apz.notify.dropped", target_id = %notification.target());
        }
    }
}

impl ContentController for ChannelContentController {
    fn handle_tap(&self, kind: TapKind, point: Point, target: ScrollNodeId, block: BlockId) {
        self.forward(ContentNotification::Tap {
            kind,
            point,
            target,
            block,
        });
    }

    fn request_content_repaint(&self, target: ScrollNodeId, offset: Point, state_generation: u64) {
        self.forward(ContentNotification::Repaint {
            target,
            offset,
            state_generation,
        });
    }
}

/// Receiving end held by the control context.
#[derive(Debug)]
pub struct NotificationReceiver {
    rx: mpsc::Receiver<ContentNotification>,
}

impl NotificationReceiver {
    /// Everything queued so far.
    pub fn drain(&self) -> Vec<ContentNotification> {
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next notification.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ContentNotification> {
        self.rx.recv_timeout(timeout).ok()
    }
}

pub fn notification_channel() -> (ChannelContentController, NotificationReceiver) {
    let (tx, rx) = mpsc::channel();
    (ChannelContentController { tx }, NotificationReceiver { rx })
}
