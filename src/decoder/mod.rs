//! Wire protocol decoding: bytes to frames, frames to domain events

pub mod event;
pub mod frame;

pub use event::decode_event;
pub use frame::{Decoded, FrameDecoder};
