//! Memory Block: a typed, fixed-size accumulator that turns a stream of
//! same-width elements into Output Frames.
//!
//! Grounded in `X3X2ListModeMemoryBlock` (`examples/original_source/cpp/data/
//! frameProcessor/src/X3X2ListModeMemoryBlocks.cpp`), generalized from a
//! single hardcoded `uint64_t`-per-event block into one parameterized by
//! [`ElementWidth`], per the polymorphism design note: no dynamic dispatch,
//! element width and kind are just data.

use log::{debug, info};

use crate::error::{Error, Result};

/// Supported per-element widths, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementWidth {
    /// One byte per element (`reset_flag`).
    U8 = 1,
    /// Two bytes per element (`event_height`).
    U16 = 2,
    /// Eight bytes per element (`time_frame`, `time_stamp`).
    U64 = 8,
}

impl ElementWidth {
    /// Width in bytes.
    #[must_use]
    pub fn bytes(self) -> u32 {
        self as u32
    }
}

/// The wire-level type of the elements a block holds, reported on the
/// emitted [`OutputFrame`] so a downstream consumer knows how to
/// reinterpret the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Raw little-endian `u64` elements.
    RawU64,
    /// Raw little-endian `u16` elements.
    RawU16,
    /// Raw `u8` elements.
    RawU8,
}

/// An immutable, owned descriptor for a completed or partially-filled block
/// of accumulated elements, ready to hand to a downstream frame sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFrame {
    /// The Memory Block's `frame_count` at the moment this frame was cut.
    pub sequence: u64,
    /// The block's name, e.g. `ch3_time_stamp`.
    pub name: String,
    /// Wire type of the elements in `payload`.
    pub element_kind: ElementKind,
    /// Reserved for future multi-dimensional framing; always empty today.
    pub dimensions: Vec<usize>,
    /// Owned element bytes, little-endian, `payload.len()` a multiple of
    /// the originating block's element width.
    pub payload: Vec<u8>,
}

/// A fixed-size byte buffer that accepts one element at a time and emits a
/// completed [`OutputFrame`] when full.
#[derive(Debug)]
pub struct MemoryBlock {
    name: String,
    element_width: ElementWidth,
    element_kind: ElementKind,
    capacity_bytes: u32,
    filled_bytes: u32,
    frame_count: u64,
    data: Vec<u8>,
}

impl MemoryBlock {
    /// Create an empty block with zero capacity. Call [`Self::set_size`]
    /// before using it.
    #[must_use]
    pub fn new(name: impl Into<String>, element_width: ElementWidth, element_kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            element_width,
            element_kind,
            capacity_bytes: 0,
            filled_bytes: 0,
            frame_count: 0,
            data: Vec::new(),
        }
    }

    /// Block name, e.g. `ch3_time_stamp`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes currently filled.
    #[must_use]
    pub fn filled_bytes(&self) -> u32 {
        self.filled_bytes
    }

    /// Total capacity in bytes, rounded down to a whole number of elements.
    #[must_use]
    pub fn capacity_bytes(&self) -> u32 {
        self.capacity_bytes
    }

    /// Set capacity, rounding down to a whole number of elements, then
    /// reallocate and zero the backing buffer. Does not reset `frame_count`.
    ///
    /// Rejects a size smaller than one element's worth of bytes as a
    /// [`Error::ConfigurationError`].
    pub fn set_size(&mut self, bytes: u32) -> Result<()> {
        let width = self.element_width.bytes();
        let capacity = (bytes / width) * width;
        if capacity == 0 {
            return Err(Error::ConfigurationError {
                reason: format!(
                    "frame_size {bytes} is smaller than one element ({width} bytes) for block {}",
                    self.name
                ),
            });
        }
        info!(
            "Reallocating memory block {} to {} bytes",
            self.name, capacity
        );
        self.capacity_bytes = capacity;
        self.data = vec![0u8; capacity as usize];
        self.filled_bytes = 0;
        Ok(())
    }

    /// Append one element's worth of `value`, written little-endian,
    /// truncated to the block's element width.
    ///
    /// Returns a completed [`OutputFrame`] if this call fills the block.
    ///
    /// # Panics
    ///
    /// Panics if the block has not been sized via [`Self::set_size`], or if
    /// called on an already-full block (callers must check
    /// [`Self::filled_bytes`] against [`Self::capacity_bytes`] first, which
    /// the Event Assembler's dispatch loop never violates since `add_element`
    /// always drains a full block via `to_frame`).
    pub fn add_element(&mut self, value: u64) -> Option<OutputFrame> {
        let width = self.element_width.bytes() as usize;
        let offset = self.filled_bytes as usize;
        assert!(
            offset + width <= self.data.len(),
            "add_element called on full or unsized block {}",
            self.name
        );
        let le = value.to_le_bytes();
        self.data[offset..offset + width].copy_from_slice(&le[..width]);
        self.filled_bytes += width as u32;

        if self.filled_bytes == self.capacity_bytes {
            Some(self.to_frame())
        } else {
            None
        }
    }

    /// Cut a full block into an [`OutputFrame`], then reset it and bump
    /// `frame_count`.
    ///
    /// Must only be called on a full block.
    pub fn to_frame(&mut self) -> OutputFrame {
        debug_assert_eq!(
            self.filled_bytes, self.capacity_bytes,
            "to_frame called on a non-full block {}",
            self.name
        );
        let frame = OutputFrame {
            sequence: self.frame_count,
            name: self.name.clone(),
            element_kind: self.element_kind,
            dimensions: Vec::new(),
            payload: self.data[..self.capacity_bytes as usize].to_vec(),
        };
        debug!(
            "Completed frame for block {} (sequence {})",
            self.name, frame.sequence
        );
        self.frame_count += 1;
        self.reset();
        frame
    }

    /// Cut a partial (possibly zero-length) [`OutputFrame`] without
    /// mutating the block. Intended for end-of-acquisition emission.
    #[must_use]
    pub fn flush(&self) -> OutputFrame {
        OutputFrame {
            sequence: self.frame_count,
            name: self.name.clone(),
            element_kind: self.element_kind,
            dimensions: Vec::new(),
            payload: self.data[..self.filled_bytes as usize].to_vec(),
        }
    }

    /// Zero the backing buffer and reset `filled_bytes` to zero. Does not
    /// touch `frame_count`.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.filled_bytes = 0;
    }

    /// Reset `frame_count` to zero.
    pub fn reset_frame_count(&mut self) {
        self.frame_count = 0;
    }
}
