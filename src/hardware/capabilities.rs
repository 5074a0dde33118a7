//! Hardware Capabilities
//!
//! Small capability traits at the seams between the cell logic and the three
//! hardware links:
//!
//! - `CameraSource`: blocking frame acquisition (vendor SDK or video device)
//! - `RegisterBus`: register reads/writes to the servo drive (Modbus RTU)
//! - `LineTransport`: raw text lines to the vibration feeder (UART)
//!
//! Each has a real implementation and a mock in [`crate::hardware::mock`].
//!
//! # Design Philosophy
//!
//! - Camera calls are synchronous: they run on the frame producer's own thread
//!   and may block up to their read timeout.
//! - Serial links are async (`#[async_trait]`) and owned by the control task,
//!   so they take `&mut self` and need no interior locking.
//! - All traits use `anyhow::Result`; the controllers built on top decide how
//!   failures are surfaced.

use crate::config::{ServoLinkConfig, VibrationLinkConfig};
use crate::hardware::frame::CameraFrame;
use anyhow::Result;
use async_trait::async_trait;

/// Capability: Frame Acquisition
///
/// Lifecycle: `open` → `start` → `read`* → `stop` → `release`.
///
/// # Contract
/// - `open` failures release anything partially acquired before returning.
/// - `read` returns `Ok(None)` for non-fatal misses (timeout, undecodable
///   frame, end of stream) so the caller can simply try again.
/// - `stop` and `release` are idempotent and never fail.
pub trait CameraSource: Send {
    /// Acquire the device and apply configuration
    fn open(&mut self) -> Result<()>;

    /// Begin continuous acquisition
    fn start(&mut self) -> Result<()>;

    /// Pull one frame, blocking at most the source's read timeout
    fn read(&mut self) -> Result<Option<CameraFrame>>;

    /// Halt acquisition
    fn stop(&mut self);

    /// Release the device handle
    fn release(&mut self);

    /// Human-readable source name for logs
    fn name(&self) -> &str;

    /// Most recent measured frame rate
    ///
    /// # Default Implementation
    /// Returns 0.0 (no measurement)
    fn fps(&self) -> f64 {
        0.0
    }
}

impl CameraSource for Box<dyn CameraSource> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn read(&mut self) -> Result<Option<CameraFrame>> {
        (**self).read()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn fps(&self) -> f64 {
        (**self).fps()
    }
}

/// Capability: Holding Register Access
///
/// # Contract
/// - `open` is a single attempt; on failure the bus stays closed.
/// - `write_register` completes only after the device acknowledged the write.
/// - Calls on a closed bus fail with `CellError::SerialPortNotConnected`.
#[async_trait]
pub trait RegisterBus: Send {
    /// Open the serial line with the given parameters
    async fn open(&mut self, config: &ServoLinkConfig) -> Result<()>;

    /// Write one holding register
    async fn write_register(&mut self, register: u16, value: u16) -> Result<()>;

    /// Read one holding register
    async fn read_register(&mut self, register: u16) -> Result<u16>;

    /// Close the serial line
    async fn close(&mut self) -> Result<()>;

    /// Whether `open` succeeded and `close` has not been called since
    fn is_open(&self) -> bool;
}

/// Capability: Raw Line Output
///
/// The transport writes bytes exactly as given; framing (line terminator) is
/// the caller's responsibility.
#[async_trait]
pub trait LineTransport: Send {
    /// Open the serial line with the given parameters
    async fn open(&mut self, config: &VibrationLinkConfig) -> Result<()>;

    /// Write and flush one already-terminated line
    async fn write_line(&mut self, line: &[u8]) -> Result<()>;

    /// Close the serial line
    async fn close(&mut self) -> Result<()>;

    /// Whether `open` succeeded and `close` has not been called since
    fn is_open(&self) -> bool;
}
