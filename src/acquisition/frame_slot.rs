//! Latest-frame handoff between the producer thread and the display side.
//!
//! Capacity one: publishing replaces whatever the consumer has not taken yet.
//! The producer never waits on the consumer.

use crate::hardware::frame::CameraFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Counters since the slot was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSlotStats {
    /// Frames handed in by the producer
    pub published: u64,
    /// Frames taken by the consumer
    pub consumed: u64,
    /// Frames replaced before anyone took them
    pub overwritten: u64,
}

/// Single-frame mailbox.
#[derive(Debug, Default)]
pub struct FrameSlot {
    frame: Mutex<Option<CameraFrame>>,
    ready: Notify,
    published: AtomicU64,
    consumed: AtomicU64,
    overwritten: AtomicU64,
}

impl FrameSlot {
    /// Empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, dropping any frame still waiting. Never blocks on the
    /// consumer.
    pub fn publish(&self, frame: CameraFrame) {
        let previous = self.frame.lock().replace(frame);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        self.ready.notify_one();
    }

    /// Take the waiting frame, if any.
    pub fn take(&self) -> Option<CameraFrame> {
        let frame = self.frame.lock().take();
        if frame.is_some() {
            self.consumed.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Wait until a frame has been published since the last wakeup.
    ///
    /// The frame may already have been taken by the time this returns, so
    /// follow with [`FrameSlot::take`].
    pub async fn ready(&self) {
        self.ready.notified().await;
    }

    /// No frame pending
    pub fn is_empty(&self) -> bool {
        self.frame.lock().is_none()
    }

    /// Counter snapshot
    pub fn stats(&self) -> FrameSlotStats {
        FrameSlotStats {
            published: self.published.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
        }
    }
}
