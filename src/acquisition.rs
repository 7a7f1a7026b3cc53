//! Acquisition Controller: the global state machine tying packet decoding,
//! per-channel accumulation, and the downstream sink together.
//!
//! Grounded in `X3X2ListModeProcessPlugin::process_frame`'s trailing
//! completion check (`if (num_completed_channels_ == num_channels_ &&
//! !acquisition_complete_) { ... }`) and its `reset()`/`configure()` pair
//! (`examples/original_source/cpp/data/frameProcessor/src/
//! X3X2ListModeProcessPlugin.cpp`). The packet-length check and the
//! decision to discard a whole packet on any processing error is this
//! crate's own, in place of the original in-place TCP buffer handling in
//! `X3X2ListModeFrameDecoder`.

use log::{info, trace, warn};

use crate::channel::ChannelAccumulatorSet;
use crate::error::{Error, Result};
use crate::event::assemble_events;
use crate::packet::Packet;
use crate::sink::FrameSink;

/// Coarse global phase, mirrored 1:1 from §4.5's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPhase {
    /// No configuration applied yet.
    Idle,
    /// Configured, no packet processed since.
    Armed,
    /// At least one packet processed, not yet complete.
    Acquiring,
    /// Every channel has completed (or an explicit flush was requested);
    /// further packets are silently dropped until reset or reconfigure.
    Closed,
}

/// Holds the global acquisition state: configured channels, frame sizing,
/// the channel accumulator set, and the downstream sink.
#[derive(Debug)]
pub struct AcquisitionController<S: FrameSink> {
    phase: AcquisitionPhase,
    channels: Vec<u16>,
    channel_offset: u16,
    frame_size_bytes: u32,
    num_time_frames: u32,
    acquisition_complete: bool,
    accumulators: ChannelAccumulatorSet,
    dropped_packets: u64,
    sink: S,
}

impl<S: FrameSink> AcquisitionController<S> {
    /// A fresh controller in `Idle`, with no configuration applied.
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self {
            phase: AcquisitionPhase::Idle,
            channels: Vec::new(),
            channel_offset: 0,
            frame_size_bytes: 0,
            num_time_frames: 0,
            acquisition_complete: false,
            accumulators: ChannelAccumulatorSet::new(),
            dropped_packets: 0,
            sink,
        }
    }

    /// Current coarse phase.
    #[must_use]
    pub fn phase(&self) -> AcquisitionPhase {
        self.phase
    }

    /// Packets discarded for any reason since the last reset/configure.
    #[must_use]
    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    /// True once every configured channel has completed.
    #[must_use]
    pub fn acquisition_complete(&self) -> bool {
        self.acquisition_complete
    }

    /// Configured channel set, in ascending order.
    #[must_use]
    pub fn channels(&self) -> &[u16] {
        &self.channels
    }

    /// Configured number of time frames.
    #[must_use]
    pub fn num_time_frames(&self) -> u32 {
        self.num_time_frames
    }

    /// Configured output block capacity, in bytes.
    #[must_use]
    pub fn frame_size_bytes(&self) -> u32 {
        self.frame_size_bytes
    }

    /// The per-channel accumulator set, for status reporting.
    #[must_use]
    pub fn accumulators(&self) -> &ChannelAccumulatorSet {
        &self.accumulators
    }

    /// The underlying sink, for tests that inspect what was pushed.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Atomically reallocate the accumulator set for a new channel list,
    /// frame size, and time-frame count. Rejects an empty channel set, a
    /// frame size too small for the widest element, or zero time frames,
    /// leaving the previous configuration untouched.
    pub fn configure(&mut self, mut channels: Vec<u16>, frame_size_bytes: u32, num_time_frames: u32) -> Result<()> {
        if channels.is_empty() {
            return Err(Error::ConfigurationError {
                reason: "channel set must not be empty".into(),
            });
        }
        if frame_size_bytes < 8 {
            return Err(Error::ConfigurationError {
                reason: format!("frame_size {frame_size_bytes} is smaller than the largest element width (8 bytes)"),
            });
        }
        if num_time_frames == 0 {
            return Err(Error::ConfigurationError {
                reason: "time_frames must be at least 1".into(),
            });
        }

        channels.sort_unstable();
        channels.dedup();
        let channel_offset = channels[0];

        self.accumulators.configure(&channels, frame_size_bytes)?;
        self.channels = channels;
        self.channel_offset = channel_offset;
        self.frame_size_bytes = frame_size_bytes;
        self.num_time_frames = num_time_frames;
        self.acquisition_complete = false;
        self.dropped_packets = 0;
        self.phase = AcquisitionPhase::Armed;
        info!(
            "Acquisition controller configured: {} channel(s), frame_size={}, time_frames={}",
            self.channels.len(),
            frame_size_bytes,
            num_time_frames
        );
        Ok(())
    }

    /// Update `num_time_frames` in place, without touching the accumulator
    /// set, completion flags, `events_recorded`, or phase. Used by a
    /// control message that sets `time_frames` alone — unlike `channels`
    /// or `frame_size`, it doesn't require reallocating any block.
    pub fn set_num_time_frames(&mut self, num_time_frames: u32) -> Result<()> {
        if num_time_frames == 0 {
            return Err(Error::ConfigurationError {
                reason: "time_frames must be at least 1".into(),
            });
        }
        self.num_time_frames = num_time_frames;
        info!("Acquisition controller time_frames set to {num_time_frames}");
        Ok(())
    }

    /// Reset every block's payload and `frame_count`, clear completion
    /// flags and `events_recorded`, and return to `Armed`. A no-op on
    /// phase if already `Idle` (nothing configured).
    pub fn reset(&mut self) {
        self.accumulators.reset();
        self.acquisition_complete = false;
        self.dropped_packets = 0;
        if self.phase != AcquisitionPhase::Idle {
            self.phase = AcquisitionPhase::Armed;
        }
        info!("Acquisition controller reset");
    }

    /// Emit a partial flush frame per block, deliver the end-of-acquisition
    /// signal, and move to `Closed`. Idempotent: a second call while
    /// already `Closed` does nothing.
    pub fn flush_and_close(&mut self) {
        if self.phase == AcquisitionPhase::Closed {
            trace!("flush_and_close called while already closed, ignoring");
            return;
        }
        for frame in self.accumulators.flush_all() {
            self.sink.push(frame);
        }
        self.sink.end_of_acquisition();
        self.acquisition_complete = true;
        self.phase = AcquisitionPhase::Closed;
        info!("Acquisition closed");
    }

    fn on_packet_completed(&mut self) {
        if !self.acquisition_complete && self.accumulators.all_completed() {
            self.flush_and_close();
        }
    }

    /// Feed one raw packet buffer through decoding, dispatch, and the
    /// completion check. Never blocks beyond the work of this one packet
    /// and never returns an error: malformed packets, unconfigured
    /// channels, and late arrivals are all counted and logged, never
    /// surfaced to the caller.
    pub fn on_packet_received(&mut self, buffer: &[u8]) {
        if self.phase == AcquisitionPhase::Closed {
            warn!("Packet arrived after acquisition close, discarding");
            self.dropped_packets += 1;
            return;
        }

        let packet = match Packet::new(buffer) {
            Ok(p) => p,
            Err(e) => {
                warn!("Dropping malformed packet: {e}");
                self.dropped_packets += 1;
                return;
            }
        };

        let channel_offset = self.channel_offset;
        let accumulators = &self.accumulators;
        let events = match assemble_events(&packet, channel_offset, |c| accumulators.is_configured(c)) {
            Ok(events) => events,
            Err(e) => {
                warn!("Dropping packet: {e}");
                self.dropped_packets += 1;
                return;
            }
        };

        if self.phase == AcquisitionPhase::Armed {
            self.phase = AcquisitionPhase::Acquiring;
        }

        let num_time_frames = self.num_time_frames;
        for event in events {
            for frame in self.accumulators.dispatch(event, num_time_frames) {
                self.sink.push(frame);
            }
        }

        self.on_packet_completed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::VecFrameSink;

    fn build_packet(fields: &[(u8, u16)]) -> Vec<u8> {
        let mut buf = vec![0u8; crate::packet::PACKET_BYTES];
        for (i, &(tag, value)) in fields.iter().enumerate() {
            let word = ((tag as u16) << 12) | (value & 0x0FFF);
            buf[i * 2..i * 2 + 2].copy_from_slice(&word.to_le_bytes());
        }
        for i in fields.len()..crate::packet::FIELDS_PER_PACKET {
            buf[i * 2..i * 2 + 2].copy_from_slice(&0xF000u16.to_le_bytes());
        }
        buf
    }

    #[test]
    fn configure_moves_idle_to_armed() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        assert_eq!(c.phase(), AcquisitionPhase::Idle);
        c.configure(vec![0], 64, 1).unwrap();
        assert_eq!(c.phase(), AcquisitionPhase::Armed);
    }

    #[test]
    fn configure_rejects_empty_channel_set() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        let err = c.configure(vec![], 64, 1).unwrap_err();
        assert!(matches!(err, Error::ConfigurationError { .. }));
        assert_eq!(c.phase(), AcquisitionPhase::Idle);
    }

    #[test]
    fn configure_rejects_zero_time_frames() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        let err = c.configure(vec![0], 64, 0).unwrap_err();
        assert!(matches!(err, Error::ConfigurationError { .. }));
    }

    #[test]
    fn s1_single_event_single_channel_no_frame_yet() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        c.configure(vec![0], 64, 1).unwrap();
        let buf = build_packet(&[(4, 0x010), (9, 0x000), (10, 0x123), (0, 0x0A5)]);
        c.on_packet_received(&buf);
        assert_eq!(c.phase(), AcquisitionPhase::Acquiring);
        assert_eq!(c.accumulators().channel(0).unwrap().events_recorded(), 1);
        assert!(c.sink().frames.is_empty());
    }

    #[test]
    fn s2_end_of_acquisition_flush() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        c.configure(vec![0], 64, 1).unwrap();
        let first = build_packet(&[(4, 0x010), (9, 0x000), (10, 0x123), (0, 0x0A5)]);
        c.on_packet_received(&first);
        let second = build_packet(&[(4, 0x001), (9, 0x000), (0, 0x001)]);
        c.on_packet_received(&second);
        assert_eq!(c.phase(), AcquisitionPhase::Closed);
        assert!(c.acquisition_complete());
        assert_eq!(c.sink().frames.len(), 4);
        assert_eq!(c.sink().end_of_acquisition_count, 1);
    }

    #[test]
    fn s3_unconfigured_channel_packet_dropped_whole() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        c.configure(vec![0, 1], 64, 1).unwrap();
        let buf = build_packet(&[(9, 0x200), (10, 0x111), (0, 0x001)]);
        c.on_packet_received(&buf);
        assert_eq!(c.dropped_packets(), 1);
        assert_eq!(c.accumulators().channel(0).unwrap().events_recorded(), 0);
        assert_eq!(c.accumulators().channel(1).unwrap().events_recorded(), 0);
    }

    #[test]
    fn s4_block_rollover_emits_one_frame_of_expected_sequence() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        c.configure(vec![0], 16, 4).unwrap();
        let p1 = build_packet(&[(9, 0x000), (10, 0x111), (0, 0x001)]);
        c.on_packet_received(&p1);
        let p2 = build_packet(&[(9, 0x000), (10, 0x222), (0, 0x002)]);
        c.on_packet_received(&p2);
        let stamps: Vec<_> = c.sink().frames_named("ch0_time_stamp").collect();
        assert_eq!(stamps.len(), 1);
        assert_eq!(stamps[0].sequence, 0);
        assert_eq!(stamps[0].payload.len(), 16);
        assert_eq!(c.accumulators().channel(0).unwrap().events_recorded(), 2);
    }

    #[test]
    fn closed_controller_drops_further_packets() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        c.configure(vec![0], 64, 1).unwrap();
        let complete = build_packet(&[(4, 0x001), (9, 0x000), (0, 0x001)]);
        c.on_packet_received(&complete);
        assert_eq!(c.phase(), AcquisitionPhase::Closed);
        let late = build_packet(&[(9, 0x000), (0, 0x002)]);
        c.on_packet_received(&late);
        assert_eq!(c.dropped_packets(), 1);
        assert_eq!(c.sink().frames.len(), 4);
    }

    #[test]
    fn flush_and_close_is_idempotent() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        c.configure(vec![0], 64, 1).unwrap();
        c.flush_and_close();
        let count_after_first = c.sink().frames.len();
        c.flush_and_close();
        assert_eq!(c.sink().frames.len(), count_after_first);
        assert_eq!(c.sink().end_of_acquisition_count, 1);
    }

    #[test]
    fn reset_reallows_packets_after_close() {
        let mut c = AcquisitionController::new(VecFrameSink::new());
        c.configure(vec![0], 64, 1).unwrap();
        let complete = build_packet(&[(4, 0x001), (9, 0x000), (0, 0x001)]);
        c.on_packet_received(&complete);
        assert_eq!(c.phase(), AcquisitionPhase::Closed);
        c.reset();
        assert_eq!(c.phase(), AcquisitionPhase::Armed);
        assert!(!c.acquisition_complete());
        assert_eq!(c.accumulators().channel(0).unwrap().events_recorded(), 0);
    }
}
