//! Servo drive controller (conveyor belt).
//!
//! The drive runs in JOG mode. Register 1029 is overloaded: the values 4998,
//! 4999 and 5000 are the forward / reverse / stop commands, any other value
//! is the JOG speed in rpm. Changing speed while moving therefore needs the
//! direction command re-issued after the speed write.
//!
//! Every operation reports success as a `bool` and logs failures; nothing is
//! raised to the caller.

use crate::config::ServoConfig;
use crate::hardware::capabilities::RegisterBus;
use crate::hardware::modbus::ModbusRtuBus;
use crate::hardware::ConnectionState;
use tracing::{error, info, warn};

/// Holding registers used on the drive
pub mod registers {
    /// Firmware version
    pub const VERSION: u16 = 0;
    /// Active error code
    pub const ERROR: u16 = 1;
    /// JOG command / JOG speed
    pub const JOG: u16 = 1029;
}

/// Command values written to [`registers::JOG`]
pub mod jog_codes {
    /// Jog forward at the stored speed
    pub const FORWARD: u16 = 4998;
    /// Jog in reverse at the stored speed
    pub const REVERSE: u16 = 4999;
    /// Stop jogging
    pub const STOP: u16 = 5000;
}

/// Highest value the JOG register still reads as a speed
pub const MAX_JOG_SPEED: u16 = jog_codes::FORWARD - 1;

/// Last commanded belt direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JogDirection {
    /// Not jogging
    #[default]
    Stopped,
    /// Jogging forward
    Forward,
    /// Jogging in reverse
    Reverse,
}

impl JogDirection {
    /// Value written to the JOG register for this direction
    pub const fn command_code(self) -> u16 {
        match self {
            Self::Forward => jog_codes::FORWARD,
            Self::Reverse => jog_codes::REVERSE,
            Self::Stopped => jog_codes::STOP,
        }
    }

    /// Display name
    pub const fn label(self) -> &'static str {
        match self {
            Self::Forward => "Forward",
            Self::Reverse => "Reverse",
            Self::Stopped => "Stopped",
        }
    }
}

/// Last commanded state. Optimistic: reflects what was asked for, not what the
/// drive confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoState {
    /// Last commanded direction
    pub direction: JogDirection,
    /// Last written JOG speed, rpm
    pub speed: u16,
}

/// Conveyor servo drive over a [`RegisterBus`].
pub struct ServoDriveController<B: RegisterBus = ModbusRtuBus> {
    config: ServoConfig,
    bus: B,
    connection: ConnectionState,
    state: ServoState,
}

impl ServoDriveController<ModbusRtuBus> {
    /// Controller on a real Modbus RTU port. Nothing is opened yet.
    pub fn new(config: ServoConfig) -> Self {
        Self::with_bus(config, ModbusRtuBus::new())
    }
}

impl<B: RegisterBus> ServoDriveController<B> {
    /// Controller on any register bus. Nothing is opened yet.
    pub fn with_bus(config: ServoConfig, bus: B) -> Self {
        let max = config.max_speed.min(MAX_JOG_SPEED);
        let speed = config.initial_speed.clamp(config.min_speed.min(max), max);
        Self {
            config,
            bus,
            connection: ConnectionState::Disconnected,
            state: ServoState {
                direction: JogDirection::Stopped,
                speed,
            },
        }
    }

    /// Open the serial line. A single attempt; no retries.
    pub async fn connect(&mut self) -> bool {
        let link = &self.config.link;
        match self.bus.open(link).await {
            Ok(()) => {
                self.connection = ConnectionState::Connected;
                info!(port = %link.port, baud = link.baudrate, "Servo drive connected");
                true
            }
            Err(e) => {
                self.connection = ConnectionState::Disconnected;
                error!(port = %link.port, "Servo drive connection failed: {e:#}");
                false
            }
        }
    }

    /// Link opened and not closed since
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Snapshot of the commanded state
    pub fn state(&self) -> ServoState {
        self.state
    }

    /// Drive configuration
    pub fn config(&self) -> &ServoConfig {
        &self.config
    }

    /// Command a direction. The direction is recorded before the write and
    /// kept even if the write fails.
    pub async fn jog(&mut self, direction: JogDirection) -> bool {
        if !self.is_connected() {
            warn!("Servo drive not connected, ignoring {}", direction.label());
            return false;
        }

        self.state.direction = direction;
        match self.bus.write_register(registers::JOG, direction.command_code()).await {
            Ok(()) => {
                info!(speed = self.state.speed, "JOG {}", direction.label());
                true
            }
            Err(e) => {
                error!("JOG {} failed: {e:#}", direction.label());
                false
            }
        }
    }

    /// Jog forward
    pub async fn forward(&mut self) -> bool {
        self.jog(JogDirection::Forward).await
    }

    /// Jog in reverse
    pub async fn reverse(&mut self) -> bool {
        self.jog(JogDirection::Reverse).await
    }

    /// Stop jogging
    pub async fn stop(&mut self) -> bool {
        self.jog(JogDirection::Stopped).await
    }

    /// Write a new JOG speed, clamped into the configured range.
    ///
    /// Returns `true` once the speed write is acknowledged. When the belt is
    /// moving the direction is re-issued afterwards; a failure there is only
    /// logged.
    pub async fn set_speed(&mut self, requested: i32) -> bool {
        if !self.is_connected() {
            warn!("Servo drive not connected, ignoring speed {requested}");
            return false;
        }

        let max = i32::from(self.config.max_speed.min(MAX_JOG_SPEED));
        let min = i32::from(self.config.min_speed).min(max);
        let clamped = requested.clamp(min, max);
        if clamped != requested {
            warn!("Requested speed {requested} rpm outside {min}..={max}, using {clamped}");
        }
        // In range of u16 after the clamp
        let speed = clamped as u16;

        if let Err(e) = self.bus.write_register(registers::JOG, speed).await {
            error!("Speed write failed: {e:#}");
            return false;
        }
        self.state.speed = speed;
        info!("JOG speed {speed} rpm");

        let direction = self.state.direction;
        if direction != JogDirection::Stopped && !self.jog(direction).await {
            warn!("Speed stored but {} was not re-asserted", direction.label());
        }
        true
    }

    /// Raise speed by one `jog_step`
    pub async fn increase_speed(&mut self) -> bool {
        let target = i32::from(self.state.speed) + i32::from(self.config.jog_step);
        self.set_speed(target).await
    }

    /// Lower speed by one `jog_step`
    pub async fn decrease_speed(&mut self) -> bool {
        let target = i32::from(self.state.speed) - i32::from(self.config.jog_step);
        self.set_speed(target).await
    }

    /// Firmware version register, `None` if unavailable
    pub async fn read_version(&mut self) -> Option<u16> {
        self.read_register(registers::VERSION, "version").await
    }

    /// Active drive error code, `None` if unavailable
    pub async fn read_error_code(&mut self) -> Option<u16> {
        self.read_register(registers::ERROR, "error code").await
    }

    /// Read version and error code; healthy only when the drive answers both
    /// and reports no active error.
    pub async fn check_connection(&mut self) -> bool {
        let Some(version) = self.read_version().await else {
            return false;
        };
        let Some(code) = self.read_error_code().await else {
            return false;
        };
        info!(version = %format!("{version:#06x}"), error_code = code, "Servo drive check");
        if code != 0 {
            warn!("Servo drive reports error code {code}");
        }
        code == 0
    }

    async fn read_register(&mut self, register: u16, what: &str) -> Option<u16> {
        if !self.is_connected() {
            return None;
        }
        match self.bus.read_register(register).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Reading drive {what} failed: {e:#}");
                None
            }
        }
    }

    /// One-line status, never fails
    pub fn get_status(&self) -> String {
        if !self.is_connected() {
            return "no link".to_string();
        }
        format!("{} ({} rpm)", self.state.direction.label(), self.state.speed)
    }

    /// Stop the belt, leave the drive at the park speed and close the link.
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        if !self.is_connected() {
            return;
        }
        self.stop().await;
        self.set_speed(i32::from(self.config.close_speed)).await;
        if let Err(e) = self.bus.close().await {
            warn!("Closing Modbus link failed: {e:#}");
        }
        self.connection = ConnectionState::Disconnected;
        info!("Servo drive stopped and disconnected");
    }
}
