//! Operator-facing control: commands, key bindings, status and the cell
//! facade that ties the two device controllers together.

pub mod cell;
pub mod commands;
pub mod status;

pub use cell::{CellController, DispatchOutcome, LinkReport};
pub use commands::{ControlCommand, KeyBindings};
pub use status::{StatusPoller, StatusReport, StatusSnapshot};
