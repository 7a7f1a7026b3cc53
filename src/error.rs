//! Crate-level error type.
//!
//! Per the error handling design, none of these variants are allowed to
//! escape [`crate::acquisition::AcquisitionController::on_packet_received`];
//! `MalformedPacket` and `UnconfiguredChannel` are counted and logged,
//! `LateArrival` is logged and dropped. Only [`AcquisitionController::configure`][cfg]
//! surfaces `ConfigurationError` to the caller, as a reply to a control
//! message.
//!
//! [cfg]: crate::acquisition::AcquisitionController::configure

use thiserror::Error;

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the decoding and framing core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Packet length wasn't 8192 bytes, or a terminator was seen before a
    /// channel-resolving tag-9 field, or the packet ran out before a
    /// terminator was seen.
    #[error("malformed packet: {reason}")]
    MalformedPacket {
        /// Human-readable detail for logs.
        reason: String,
    },

    /// Tag-9 resolved to a channel outside the configured set.
    #[error("channel {channel} is not configured")]
    UnconfiguredChannel {
        /// The offending channel number.
        channel: u16,
    },

    /// A control message requested an invalid configuration.
    #[error("invalid configuration: {reason}")]
    ConfigurationError {
        /// Human-readable detail, echoed back in the control reply.
        reason: String,
    },

    /// A Memory Block failed to (re)allocate its backing storage.
    #[error("allocation failure: {reason}")]
    AllocationFailure {
        /// Human-readable detail for logs.
        reason: String,
    },

    /// A packet arrived while the controller was in the `Closed` state.
    #[error("packet arrived after acquisition close")]
    LateArrival,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ConfigurationError {
            reason: format!("malformed control message: {e}"),
        }
    }
}
