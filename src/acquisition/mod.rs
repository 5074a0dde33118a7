//! Frame acquisition: a producer thread feeding a single-frame slot.

pub mod frame_slot;
pub mod producer;

pub use frame_slot::{FrameSlot, FrameSlotStats};
pub use producer::{FrameProducer, ProducerReport};
