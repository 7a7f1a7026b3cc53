//! Configuration & Status Surface.
//!
//! Control messages are JSON, deserialized with `serde_json` the same way
//! the teacher's `sigmf.rs` deserializes its metadata documents: optional
//! fields, `#[serde(rename = "...")]` where the wire key isn't a valid Rust
//! identifier shape, and no custom `Deserialize` impl.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionController;
use crate::error::Result;
use crate::sink::FrameSink;

const RECOGNISED_KEYS: [&str; 5] = ["channels", "frame_size", "time_frames", "reset", "flush"];

/// One control message. Recognised keys are applied in the fixed order
/// `channels`, `frame_size`, `time_frames`, `reset`, `flush`, regardless of
/// their order in the source JSON. Keys outside this set are ignored by
/// `serde`'s field-based deserialization; [`parse_control_message`] logs a
/// warning for each one before deserializing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlMessage {
    /// Reconfigure the channel set and rebuild accumulators.
    pub channels: Option<Vec<u16>>,
    /// Output block capacity in bytes; reallocates all blocks.
    pub frame_size: Option<u32>,
    /// Number of time frames per acquisition.
    pub time_frames: Option<u32>,
    /// Any present value invokes `reset()`.
    pub reset: Option<serde_json::Value>,
    /// Any present value invokes `flush_and_close()`.
    pub flush: Option<serde_json::Value>,
}

/// Reply to a control message: either accepted, or rejected with a
/// descriptive reason and the configuration left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result")]
pub enum ControlReply {
    /// The message was fully applied.
    #[serde(rename = "ok")]
    Ok,
    /// The message was rejected; no part of it was applied.
    #[serde(rename = "rejected")]
    Rejected {
        /// Human-readable rejection reason.
        reason: String,
    },
}

/// Applies `message` to `controller` in the fixed key order. `channels`
/// and `frame_size` are combined into a single `configure` call if either
/// is present (a channel-set or frame-size change always rebuilds the
/// accumulator set together, since both feed the same `configure`
/// operation). `time_frames` alone updates `num_time_frames` in place —
/// per §6, its effect is narrowly "set `num_time_frames`", not a rebuild —
/// so it never discards in-flight accumulated events.
pub fn apply_control_message<S: FrameSink>(
    controller: &mut AcquisitionController<S>,
    message: &ControlMessage,
) -> ControlReply {
    if message.channels.is_some() || message.frame_size.is_some() {
        let channels = message
            .channels
            .clone()
            .unwrap_or_else(|| controller.channels().to_vec());
        let frame_size = message.frame_size.unwrap_or_else(|| controller.frame_size_bytes());
        let time_frames = message.time_frames.unwrap_or_else(|| controller.num_time_frames());
        if let Err(e) = controller.configure(channels, frame_size, time_frames) {
            return ControlReply::Rejected { reason: e.to_string() };
        }
    } else if let Some(time_frames) = message.time_frames {
        if let Err(e) = controller.set_num_time_frames(time_frames) {
            return ControlReply::Rejected { reason: e.to_string() };
        }
    }

    if message.reset.is_some() {
        controller.reset();
    }

    if message.flush.is_some() {
        controller.flush_and_close();
    }

    ControlReply::Ok
}

/// Parse a JSON control message, logging a warning for each key that isn't
/// one of the five recognised ones.
pub fn parse_control_message(json: &str) -> Result<ControlMessage> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if let serde_json::Value::Object(fields) = &value {
        for key in fields.keys() {
            if !RECOGNISED_KEYS.contains(&key.as_str()) {
                warn!("ignoring unrecognised control message key: {key}");
            }
        }
    }
    Ok(serde_json::from_value(value)?)
}

/// Per-channel status triple: `events_recorded`, `completed`, and the last
/// decoded packet-header words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    /// Events accumulated so far.
    pub events_recorded: u64,
    /// Whether this channel has observed its final time frame.
    pub completed: bool,
    /// Most recent tag-1 value.
    pub acquisition_number: u16,
    /// Low word of the most recently assembled `time_frame`.
    pub time_frame_low: u16,
    /// Packed end-of-frame/ttl_a/ttl_b/dummy bits of the most recent event.
    pub header_bits: u8,
}

/// A full status snapshot of the Acquisition Controller, suitable for
/// serialising to the outbound status channel.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Packets discarded since the last reset/configure.
    pub dropped_packets: u64,
    /// Whether the acquisition has fully completed.
    pub acquisition_complete: bool,
    /// Per-channel status, keyed `channel_<N>`.
    #[serde(flatten)]
    pub channels: std::collections::BTreeMap<String, ChannelStatus>,
}

/// Build a [`StatusReport`] snapshot from the controller's current state.
pub fn status_report<S: FrameSink>(controller: &AcquisitionController<S>) -> StatusReport {
    let mut channels = std::collections::BTreeMap::new();
    for channel in controller.channels().iter().copied() {
        let Some(state) = controller.accumulators().channel(channel) else {
            continue;
        };
        let (acquisition_number, time_frame_low, header_bits) = state.last_header();
        channels.insert(
            format!("channel_{channel}"),
            ChannelStatus {
                events_recorded: state.events_recorded(),
                completed: state.completed(),
                acquisition_number,
                time_frame_low,
                header_bits,
            },
        );
    }
    StatusReport {
        dropped_packets: controller.dropped_packets(),
        acquisition_complete: controller.acquisition_complete(),
        channels,
    }
}
