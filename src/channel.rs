//! Channel Accumulator Set.
//!
//! Grounded in `X3X2ListModeProcessPlugin`'s per-channel `memory_blocks_`
//! map (`examples/original_source/cpp/data/frameProcessor/src/
//! X3X2ListModeProcessPlugin.cpp`), which keeps four named blocks per
//! channel and looks one up by channel index on every event. Per the
//! per-channel-state design note, channels here are a dense `BTreeMap`
//! rather than a string-keyed map, since the configured set is small.

use std::collections::BTreeMap;

use log::debug;

use crate::error::Result;
use crate::event::AssembledEvent;
use crate::memory_block::{ElementKind, ElementWidth, MemoryBlock, OutputFrame};

/// Per-channel state: the four Memory Blocks plus completion bookkeeping.
#[derive(Debug)]
pub struct ChannelState {
    time_frame: MemoryBlock,
    time_stamp: MemoryBlock,
    event_height: MemoryBlock,
    reset_flag: MemoryBlock,
    /// Set once this channel has seen an `end_of_frame` terminator for the
    /// final configured time frame.
    completed: bool,
    /// Count of non-dummy, non-end-of-frame events accumulated.
    events_recorded: u64,
    /// Most recent tag-1 value, for status reporting.
    last_acquisition_number: u16,
    /// Low word of the most recently assembled `time_frame`.
    last_time_frame_low: u16,
    /// Packed `end_of_frame`/`ttl_a`/`ttl_b`/`dummy_event` bits of the most
    /// recent event, for status reporting.
    last_header_bits: u8,
}

impl ChannelState {
    fn new(channel: u16, frame_size_bytes: u32) -> Result<Self> {
        let mut time_frame = MemoryBlock::new(
            format!("ch{channel}_time_frame"),
            ElementWidth::U64,
            ElementKind::RawU64,
        );
        let mut time_stamp = MemoryBlock::new(
            format!("ch{channel}_time_stamp"),
            ElementWidth::U64,
            ElementKind::RawU64,
        );
        let mut event_height = MemoryBlock::new(
            format!("ch{channel}_event_height"),
            ElementWidth::U16,
            ElementKind::RawU16,
        );
        let mut reset_flag = MemoryBlock::new(
            format!("ch{channel}_reset_flag"),
            ElementWidth::U8,
            ElementKind::RawU8,
        );
        time_frame.set_size(frame_size_bytes)?;
        time_stamp.set_size(frame_size_bytes)?;
        event_height.set_size(frame_size_bytes)?;
        reset_flag.set_size(frame_size_bytes)?;
        Ok(Self {
            time_frame,
            time_stamp,
            event_height,
            reset_flag,
            completed: false,
            events_recorded: 0,
            last_acquisition_number: 0,
            last_time_frame_low: 0,
            last_header_bits: 0,
        })
    }

    /// True once this channel has observed its final time frame's
    /// end-of-frame marker.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Count of events accumulated into this channel's blocks.
    #[must_use]
    pub fn events_recorded(&self) -> u64 {
        self.events_recorded
    }

    /// `(acquisition_number, time_frame_low_word, end_of_frame_bits)` from
    /// the most recent event, for [`crate::control::StatusReport`].
    #[must_use]
    pub fn last_header(&self) -> (u16, u16, u8) {
        (
            self.last_acquisition_number,
            self.last_time_frame_low,
            self.last_header_bits,
        )
    }

    fn flush(&self) -> [OutputFrame; 4] {
        [
            self.time_frame.flush(),
            self.time_stamp.flush(),
            self.event_height.flush(),
            self.reset_flag.flush(),
        ]
    }

    /// Reset payload, `frame_count`, and completion bookkeeping for this
    /// channel — the full reset invoked by
    /// [`crate::acquisition::AcquisitionController::reset`].
    fn reset(&mut self) {
        self.time_frame.reset();
        self.time_frame.reset_frame_count();
        self.time_stamp.reset();
        self.time_stamp.reset_frame_count();
        self.event_height.reset();
        self.event_height.reset_frame_count();
        self.reset_flag.reset();
        self.reset_flag.reset_frame_count();
        self.completed = false;
        self.events_recorded = 0;
        self.last_acquisition_number = 0;
        self.last_time_frame_low = 0;
        self.last_header_bits = 0;
    }
}

/// Owns every configured channel's four Memory Blocks and routes decoded
/// events to them.
#[derive(Debug, Default)]
pub struct ChannelAccumulatorSet {
    channels: BTreeMap<u16, ChannelState>,
}

impl ChannelAccumulatorSet {
    /// An empty set with no configured channels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }

    /// Replace the configured channel set, allocating fresh blocks of
    /// `frame_size_bytes` for each channel.
    pub fn configure(&mut self, channels: &[u16], frame_size_bytes: u32) -> Result<()> {
        let mut fresh = BTreeMap::new();
        for &channel in channels {
            fresh.insert(channel, ChannelState::new(channel, frame_size_bytes)?);
        }
        self.channels = fresh;
        debug!("Channel accumulator set configured for {} channel(s)", channels.len());
        Ok(())
    }

    /// True iff `channel` is in the configured set.
    #[must_use]
    pub fn is_configured(&self, channel: u16) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Configured channels in ascending order.
    pub fn channel_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.channels.keys().copied()
    }

    /// Look up a channel's state for status reporting.
    #[must_use]
    pub fn channel(&self, channel: u16) -> Option<&ChannelState> {
        self.channels.get(&channel)
    }

    /// Route one decoded event to its channel's blocks, per the per-packet
    /// emission protocol: dummy events skip accumulation but still count
    /// toward end-of-frame completion; non-dummy events append to all four
    /// blocks and bump `events_recorded`.
    ///
    /// Silently drops the event if its channel isn't configured — the
    /// Event Assembler has already rejected this case before this point is
    /// ever reached.
    pub fn dispatch(&mut self, event: AssembledEvent, num_time_frames: u32) -> Vec<OutputFrame> {
        let Some(state) = self.channels.get_mut(&event.channel) else {
            return Vec::new();
        };

        state.last_acquisition_number = event.acquisition_number;
        state.last_time_frame_low = event.time_frame as u16;
        state.last_header_bits = (event.end_of_frame as u8)
            | ((event.ttl_a as u8) << 1)
            | ((event.ttl_b as u8) << 2)
            | ((event.dummy_event as u8) << 3);

        let mut frames = Vec::new();
        if !event.dummy_event && !event.end_of_frame {
            if let Some(f) = state.time_frame.add_element(event.time_frame) {
                frames.push(f);
            }
            if let Some(f) = state.time_stamp.add_element(event.time_stamp) {
                frames.push(f);
            }
            if let Some(f) = state.event_height.add_element(event.event_height as u64) {
                frames.push(f);
            }
            if let Some(f) = state.reset_flag.add_element(event.reset_flag as u64) {
                frames.push(f);
            }
            state.events_recorded += 1;
        }

        if event.end_of_frame && event.time_frame + 1 == num_time_frames as u64 {
            state.completed = true;
            debug!("Channel {} completed acquisition", event.channel);
        }

        frames
    }

    /// True iff every configured channel has observed its final time
    /// frame. False for an empty channel set.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        !self.channels.is_empty() && self.channels.values().all(ChannelState::completed)
    }

    /// Emit a partial flush frame per block, across all channels, without
    /// mutating any block.
    pub fn flush_all(&self) -> Vec<OutputFrame> {
        self.channels.values().flat_map(ChannelState::flush).collect()
    }

    /// Reset every channel's blocks, completion flag, and counters.
    pub fn reset(&mut self) {
        for state in self.channels.values_mut() {
            state.reset();
        }
    }
}
