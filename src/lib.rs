//! List-mode event decoding and framing core for an X3X2-style detector
//! data-acquisition pipeline.
//!
//! This crate parses fixed-size 8192-byte detector packets into typed
//! events, accumulates per-channel event fields into fixed-size output
//! frames, and tracks multi-channel completion toward an overall
//! acquisition target. The entry point is
//! [`acquisition::AcquisitionController::on_packet_received`]: it is
//! synchronous, non-blocking beyond the work of one packet, and never
//! propagates an error — malformed input is counted and logged instead.
//!
//! Receiving raw packets off the wire and consuming completed frames are
//! both out of scope; see [`sink::FrameSink`] for the latter's contract.

pub mod acquisition;
pub mod channel;
pub mod control;
pub mod error;
pub mod event;
pub mod field;
pub mod memory_block;
pub mod packet;
pub mod sink;

pub use acquisition::{AcquisitionController, AcquisitionPhase};
pub use error::{Error, Result};
pub use event::AssembledEvent;
pub use field::{Field, decode_word};
pub use memory_block::{ElementKind, ElementWidth, MemoryBlock, OutputFrame};
pub use packet::Packet;
pub use sink::{FrameSink, VecFrameSink};
