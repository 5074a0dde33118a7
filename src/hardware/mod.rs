//! Hardware links of the cell: camera, servo drive and vibration feeder.
//!
//! Capability traits live in [`capabilities`]; each device has a controller
//! built on one of them and a mock in [`mock`].

pub mod camera;
pub mod capabilities;
pub mod frame;
pub mod generic_camera;
pub mod industrial_camera;
pub mod mock;
pub mod modbus;
#[allow(unsafe_code)]
pub mod mvs_sdk;
pub mod overlay;
pub mod servo;
pub mod uart;
pub mod vibration;

pub use camera::{build_camera, CameraKind};
pub use capabilities::{CameraSource, LineTransport, RegisterBus};
pub use frame::{CameraFrame, FrameFormat, PixelFormat};
pub use servo::{JogDirection, ServoDriveController, ServoState};
pub use vibration::{PowerState, VibrationController, VibrationState};

/// Link state of a serial-attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not opened, or closed
    #[default]
    Disconnected,
    /// Link opened
    Connected,
}
