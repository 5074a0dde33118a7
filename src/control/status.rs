//! Periodic status lines for the operator.
//!
//! The poller only reads controller state; it never touches a link, so it is
//! safe to run at any rate and with either controller missing.

use crate::hardware::capabilities::{LineTransport, RegisterBus};
use crate::hardware::servo::ServoDriveController;
use crate::hardware::vibration::VibrationController;
use std::time::Duration;

/// Anything that can describe itself in one status line
pub trait StatusReport {
    /// One status line, "no link" while disconnected
    fn get_status(&self) -> String;
}

impl<B: RegisterBus> StatusReport for ServoDriveController<B> {
    fn get_status(&self) -> String {
        ServoDriveController::get_status(self)
    }
}

impl<L: LineTransport> StatusReport for VibrationController<L> {
    fn get_status(&self) -> String {
        VibrationController::get_status(self)
    }
}

fn render(source: Option<&dyn StatusReport>) -> String {
    source.map_or_else(|| "no link".to_string(), |s| s.get_status())
}

/// One rendering of both status lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Rendered servo line
    pub conveyor: String,
    /// Rendered feeder line
    pub vibration: String,
}

/// Renders status at a fixed interval, remembering the last rendering.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    interval: Duration,
    last: Option<StatusSnapshot>,
}

impl StatusPoller {
    /// Poller refreshing every `interval`
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Refresh period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Render both lines. A missing controller reads as "no link".
    pub fn poll(&mut self, conveyor: Option<&dyn StatusReport>, vibration: Option<&dyn StatusReport>) -> StatusSnapshot {
        let snapshot = StatusSnapshot {
            conveyor: format!("Conveyor: {}", render(conveyor)),
            vibration: format!("Vibration: {}", render(vibration)),
        };
        self.last = Some(snapshot.clone());
        snapshot
    }

    /// Like [`StatusPoller::poll`], but `None` when nothing changed since the
    /// previous poll.
    pub fn poll_changed(
        &mut self,
        conveyor: Option<&dyn StatusReport>,
        vibration: Option<&dyn StatusReport>,
    ) -> Option<StatusSnapshot> {
        let previous = self.last.take();
        let snapshot = self.poll(conveyor, vibration);
        (previous.as_ref() != Some(&snapshot)).then_some(snapshot)
    }

    /// Last rendering, if any
    pub fn last(&self) -> Option<&StatusSnapshot> {
        self.last.as_ref()
    }
}
