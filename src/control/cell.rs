//! The cell facade: both device controllers plus status, driven by operator
//! commands.
//!
//! Owned by the control task. Hardware failures never escape: each command
//! reports whether the device acknowledged it, and the outcome is logged.

use crate::config::CellConfig;
use crate::control::commands::ControlCommand;
use crate::control::status::{StatusPoller, StatusSnapshot};
use crate::hardware::capabilities::{LineTransport, RegisterBus};
use crate::hardware::modbus::ModbusRtuBus;
use crate::hardware::servo::ServoDriveController;
use crate::hardware::uart::SerialLine;
use crate::hardware::vibration::VibrationController;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Which links came up at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkReport {
    /// Servo drive link opened
    pub servo: bool,
    /// Feeder link opened
    pub vibration: bool,
}

/// Result of dispatching one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The device acknowledged the command
    Done,
    /// The command could not be delivered (already logged)
    Failed,
    /// The operator asked to leave
    Quit,
}

/// Owns both device controllers and the status poller; the one place operator commands reach hardware.
pub struct CellController<B: RegisterBus = ModbusRtuBus, L: LineTransport = SerialLine> {
    servo: ServoDriveController<B>,
    vibration: VibrationController<L>,
    poller: StatusPoller,
    shut_down: bool,
}

impl CellController {
    /// Controllers on the configured serial ports. Nothing is opened yet.
    pub fn new(config: &CellConfig) -> Self {
        Self::with_controllers(
            ServoDriveController::new(config.servo.clone()),
            VibrationController::new(config.vibration.clone()),
            config.control.status_interval(),
        )
    }
}

impl<B: RegisterBus, L: LineTransport> CellController<B, L> {
    /// Assemble from already built controllers
    pub fn with_controllers(
        servo: ServoDriveController<B>,
        vibration: VibrationController<L>,
        status_interval: Duration,
    ) -> Self {
        Self {
            servo,
            vibration,
            poller: StatusPoller::new(status_interval),
            shut_down: false,
        }
    }

    /// Connect both links. A failed link leaves the cell running without it.
    pub async fn startup(&mut self) -> LinkReport {
        let report = LinkReport {
            servo: self.servo.connect().await,
            vibration: self.vibration.connect().await,
        };
        if !report.servo {
            warn!("Conveyor servo unavailable; belt commands will be ignored");
        }
        if !report.vibration {
            warn!("Vibration feeder unavailable; feeder commands will be ignored");
        }
        info!(servo = report.servo, vibration = report.vibration, "Cell started");
        report
    }

    /// Run one operator command
    #[instrument(skip(self))]
    pub async fn dispatch(&mut self, command: ControlCommand) -> DispatchOutcome {
        let acknowledged = match command {
            ControlCommand::Forward => self.servo.forward().await,
            ControlCommand::Reverse => self.servo.reverse().await,
            ControlCommand::Stop => self.servo.stop().await,
            ControlCommand::SpeedUp => self.servo.increase_speed().await,
            ControlCommand::SpeedDown => self.servo.decrease_speed().await,
            ControlCommand::VibrationOn => self.vibration.vib_on(None, None).await,
            ControlCommand::VibrationOff => self.vibration.vib_off().await,
            ControlCommand::Quit => return DispatchOutcome::Quit,
        };
        if acknowledged {
            DispatchOutcome::Done
        } else {
            DispatchOutcome::Failed
        }
    }

    /// Render both status lines
    pub fn status(&mut self) -> StatusSnapshot {
        self.poller.poll(Some(&self.servo), Some(&self.vibration))
    }

    /// Render both status lines, `None` if unchanged since last time
    pub fn status_changed(&mut self) -> Option<StatusSnapshot> {
        self.poller.poll_changed(Some(&self.servo), Some(&self.vibration))
    }

    /// Status refresh period
    pub fn status_interval(&self) -> Duration {
        self.poller.interval()
    }

    /// Servo drive controller
    pub fn servo(&self) -> &ServoDriveController<B> {
        &self.servo
    }

    /// Servo drive controller, mutable
    pub fn servo_mut(&mut self) -> &mut ServoDriveController<B> {
        &mut self.servo
    }

    /// Vibration feeder controller
    pub fn vibration(&self) -> &VibrationController<L> {
        &self.vibration
    }

    /// Vibration feeder controller, mutable
    pub fn vibration_mut(&mut self) -> &mut VibrationController<L> {
        &mut self.vibration
    }

    /// Stop the belt, switch the feeder off and close both links. Safe to call
    /// more than once.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.servo.close().await;
        self.vibration.close().await;
        self.shut_down = true;
        info!("Cell shut down");
    }
}
