//! Event Assembler: folds one packet's worth of tagged fields into zero or
//! more fully populated events.
//!
//! Grounded in `X3X2ListModeProcessPlugin::process_frame`'s `switch (id)`
//! block (`examples/original_source/cpp/data/frameProcessor/src/
//! X3X2ListModeProcessPlugin.cpp`). The bit-slice assignments below mirror
//! that function's mask/shift pairs one for one; the per-terminator
//! single-emission behavior is the canonical (non-buggy) version — see
//! `DESIGN.md` for the double-`add_event` bug in the original this crate
//! deliberately does not reproduce.
//!
//! Unlike the original, a packet is assembled into a buffer of events
//! first and only handed to the caller on success, so an aborted packet
//! (unconfigured channel, or a dangling event with no terminator) discards
//! everything decoded so far — the atomic whole-packet-or-nothing behavior
//! the data model calls for.

use crate::error::{Error, Result};
use crate::packet::Packet;

/// One fully decoded event: one terminator's worth of state from the wire
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembledEvent {
    /// Resolved system channel (`(tag-9 value >> 8) + channel_offset`).
    pub channel: u16,
    /// 64-bit time frame, assembled from tags 4..8 and the low byte of tag 9.
    pub time_frame: u64,
    /// 48-bit time stamp, assembled from tags 10..13.
    pub time_stamp: u64,
    /// Low 12 bits of the terminating tag's value.
    pub event_height: u16,
    /// True iff the terminator was tag 14.
    pub reset_flag: bool,
    /// Tag-4 value bit 0.
    pub end_of_frame: bool,
    /// Tag-4 value bit 1.
    pub ttl_a: bool,
    /// Tag-4 value bit 2.
    pub ttl_b: bool,
    /// Tag-4 value bit 3.
    pub dummy_event: bool,
    /// Informational, from tag 1.
    pub acquisition_number: u16,
}

/// Decode every event in `packet`, resolving channels against
/// `channel_offset` and `is_configured`.
///
/// Returns `Err` and discards everything decoded so far if:
/// * a tag-9 field resolves to a channel `is_configured` rejects, or
/// * a terminator is seen before any tag-9 has resolved a channel, or
/// * the packet ends with fields touched since the last terminator (a
///   dangling, never-terminated event).
pub fn assemble_events(
    packet: &Packet<'_>,
    channel_offset: u16,
    is_configured: impl Fn(u16) -> bool,
) -> Result<Vec<AssembledEvent>> {
    let mut time_frame: u64 = 0;
    let mut time_stamp: u64 = 0;
    let mut channel: Option<u16> = None;
    let mut acquisition_number: u16 = 0;
    let mut end_of_frame = false;
    let mut ttl_a = false;
    let mut ttl_b = false;
    let mut dummy_event = false;
    // True whenever a non-padding, non-terminator field has been seen since
    // the last terminator (or packet start). Used to flag a packet that
    // ends mid-event.
    let mut dirty = false;
    let mut events = Vec::new();

    for field in packet.fields() {
        let value64 = field.value as u64;
        match field.tag {
            1 => {
                acquisition_number = field.value;
                dirty = true;
            }
            4 => {
                end_of_frame = field.value & 0x1 != 0;
                ttl_a = field.value & 0x2 != 0;
                ttl_b = field.value & 0x4 != 0;
                dummy_event = field.value & 0x8 != 0;
                let slice = (value64 >> 4) & 0xFF;
                time_frame = (time_frame & !0xFFu64) | slice;
                dirty = true;
            }
            5 => {
                time_frame = (time_frame & !(0xFFFu64 << 8)) | (value64 << 8);
                dirty = true;
            }
            6 => {
                time_frame = (time_frame & !(0xFFFu64 << 20)) | (value64 << 20);
                dirty = true;
            }
            7 => {
                time_frame = (time_frame & !(0xFFFu64 << 32)) | (value64 << 32);
                dirty = true;
            }
            8 => {
                time_frame = (time_frame & !(0xFFFu64 << 44)) | (value64 << 44);
                dirty = true;
            }
            9 => {
                let ch = (field.value >> 8) + channel_offset;
                if !is_configured(ch) {
                    return Err(Error::UnconfiguredChannel { channel: ch });
                }
                channel = Some(ch);
                time_frame = (time_frame & !(0xFFu64 << 56)) | ((value64 & 0xFF) << 56);
                dirty = true;
            }
            10 => {
                time_stamp = (time_stamp & !0xFFFu64) | value64;
                dirty = true;
            }
            11 => {
                time_stamp = (time_stamp & !(0xFFFu64 << 12)) | (value64 << 12);
                dirty = true;
            }
            12 => {
                time_stamp = (time_stamp & !(0xFFFu64 << 24)) | (value64 << 24);
                dirty = true;
            }
            13 => {
                time_stamp = (time_stamp & !(0xFFFu64 << 36)) | (value64 << 36);
                dirty = true;
            }
            0 | 14 => {
                let Some(ch) = channel else {
                    return Err(Error::MalformedPacket {
                        reason: "terminator seen before any channel-resolving tag-9".into(),
                    });
                };
                events.push(AssembledEvent {
                    channel: ch,
                    time_frame,
                    time_stamp,
                    event_height: field.value,
                    reset_flag: field.tag == 14,
                    end_of_frame,
                    ttl_a,
                    ttl_b,
                    dummy_event,
                    acquisition_number,
                });
                dirty = false;
            }
            15 => {
                // Padding, no-op.
            }
            _ => unreachable!("tag is always 0..=15"),
        }
    }

    if dirty {
        return Err(Error::MalformedPacket {
            reason: "packet ended with an unterminated event".into(),
        });
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a packet body from `(tag, value)` pairs, padding the rest with
    /// tag-15 no-ops.
    fn build_packet(fields: &[(u8, u16)]) -> Vec<u8> {
        let mut buf = vec![0u8; crate::packet::PACKET_BYTES];
        for (i, &(tag, value)) in fields.iter().enumerate() {
            let word = ((tag as u16) << 12) | (value & 0x0FFF);
            buf[i * 2..i * 2 + 2].copy_from_slice(&word.to_le_bytes());
        }
        for i in fields.len()..crate::packet::FIELDS_PER_PACKET {
            let word = 0xF000u16; // tag 15, padding
            buf[i * 2..i * 2 + 2].copy_from_slice(&word.to_le_bytes());
        }
        buf
    }

    #[test]
    fn single_event_single_channel() {
        // S1 from spec.md §8.
        let buf = build_packet(&[
            (4, 0x010),
            (9, 0x000),
            (10, 0x123),
            (0, 0x0A5),
        ]);
        let packet = Packet::new(&buf).unwrap();
        let events = assemble_events(&packet, 0, |c| c == 0).unwrap();
        assert_eq!(events.len(), 1);
        let e = events[0];
        assert_eq!(e.channel, 0);
        assert_eq!(e.time_frame, 0x01);
        assert_eq!(e.time_stamp, 0x123);
        assert_eq!(e.event_height, 0x0A5);
        assert!(!e.reset_flag);
        assert!(!e.end_of_frame);
        assert!(!e.dummy_event);
    }

    #[test]
    fn reset_flag_is_per_terminator_not_sticky() {
        // S5 from spec.md §8.
        let buf = build_packet(&[(9, 0x000), (14, 0x0FF), (0, 0x055)]);
        let packet = Packet::new(&buf).unwrap();
        let events = assemble_events(&packet, 0, |c| c == 0).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].reset_flag);
        assert_eq!(events[0].event_height, 0x0FF);
        assert!(!events[1].reset_flag);
        assert_eq!(events[1].event_height, 0x055);
    }

    #[test]
    fn unconfigured_channel_aborts_whole_packet() {
        // S3 from spec.md §8.
        let buf = build_packet(&[
            (9, 0x200), // channel 2
            (10, 0x111),
            (0, 0x001),
        ]);
        let packet = Packet::new(&buf).unwrap();
        let err = assemble_events(&packet, 0, |c| c == 0 || c == 1).unwrap_err();
        assert!(matches!(err, Error::UnconfiguredChannel { channel: 2 }));
    }

    #[test]
    fn earlier_events_in_aborted_packet_are_discarded() {
        // A clean event followed by one that resolves to an unconfigured
        // channel: the whole packet (including the earlier clean event)
        // must be discarded, per the atomic-packet invariant.
        let buf = build_packet(&[
            (9, 0x000),
            (0, 0x001),
            (9, 0x200),
            (0, 0x002),
        ]);
        let packet = Packet::new(&buf).unwrap();
        let err = assemble_events(&packet, 0, |c| c == 0).unwrap_err();
        assert!(matches!(err, Error::UnconfiguredChannel { channel: 2 }));
    }

    #[test]
    fn terminator_before_channel_resolved_is_malformed() {
        let buf = build_packet(&[(0, 0x001)]);
        let packet = Packet::new(&buf).unwrap();
        let err = assemble_events(&packet, 0, |_| true).unwrap_err();
        assert!(matches!(err, Error::MalformedPacket { .. }));
    }

    #[test]
    fn dangling_event_with_no_terminator_is_malformed() {
        let buf = build_packet(&[(9, 0x000), (10, 0x123)]);
        let packet = Packet::new(&buf).unwrap();
        let err = assemble_events(&packet, 0, |_| true).unwrap_err();
        assert!(matches!(err, Error::MalformedPacket { .. }));
    }

    #[test]
    fn unwritten_slices_are_inherited_across_events_in_one_packet() {
        // Second event doesn't rewrite tag 10 (time_stamp low slice), so it
        // inherits the first event's value for that slice — intentional
        // wire-format behavior per spec.md §4.3.
        let buf = build_packet(&[
            (9, 0x000),
            (10, 0x123),
            (0, 0x001),
            (0, 0x002),
        ]);
        let packet = Packet::new(&buf).unwrap();
        let events = assemble_events(&packet, 0, |c| c == 0).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].time_stamp, 0x123);
        assert_eq!(events[1].time_stamp, 0x123);
    }

    #[test]
    fn channel_offset_is_applied() {
        let buf = build_packet(&[(9, 0x500), (0, 0x001)]);
        let packet = Packet::new(&buf).unwrap();
        let events = assemble_events(&packet, 10, |c| c == 15).unwrap();
        assert_eq!(events[0].channel, 15);
    }
}
