//! # Conveyor Cell Core Library
//!
//! Device control and acquisition for a single-operator conveyor cell: an
//! industrial camera (or any video device/file) watching the belt, a servo
//! drive moving the belt over Modbus RTU, and a vibration feeder driven by a
//! PWM board over a plain UART.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: the frame producer thread and the single-frame slot it
//!   publishes into.
//! - **`app`**: the headless operator loop used by the binary.
//! - **`config`**: `CellConfig`, loaded with figment from TOML plus
//!   `CONVEYOR_*` environment overrides.
//! - **`control`**: operator commands, key bindings, status lines and the
//!   `CellController` facade.
//! - **`error`**: the crate's `CellError`.
//! - **`hardware`**: capability traits, camera sources, the servo and
//!   vibration controllers, wire protocols and mocks.
//! - **`logging`**: tracing subscriber setup.

pub mod acquisition;
pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod hardware;
pub mod logging;

pub use config::CellConfig;
pub use error::{CellError, CellResult};
