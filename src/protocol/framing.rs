//! Delimiter-based frame accumulator
//!
//! Used for both links the firmware speaks: COBS frames on the host control
//! link (delimited by 0x00) and AT response lines from the modems
//! (delimited by `\n`).

use crate::config::protocol::FRAME_DELIMITER;
use heapless::Vec;

/// Line delimiter for modem responses
pub const LINE_DELIMITER: u8 = b'\n';

/// Accumulates incoming bytes and extracts complete delimited frames.
///
/// The delimiter itself is never stored. Frames longer than `N` bytes are
/// dropped whole and the accumulator resynchronises on the next delimiter.
pub struct FrameAccumulator<const N: usize> {
    buffer: Vec<u8, N>,
    delimiter: u8,
    overflowed: bool,
}

impl<const N: usize> FrameAccumulator<N> {
    /// Accumulator for COBS frames on the control link.
    pub fn new() -> Self {
        Self::with_delimiter(FRAME_DELIMITER)
    }

    /// Accumulator for `\n`-terminated modem lines.
    pub fn lines() -> Self {
        Self::with_delimiter(LINE_DELIMITER)
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            buffer: Vec::new(),
            delimiter,
            overflowed: false,
        }
    }

    /// Push a byte into the accumulator.
    ///
    /// Returns `Some(frame)` when a complete frame is detected (delimiter received).
    /// Returns `None` if more bytes are needed, the frame was empty, or the
    /// frame overflowed the buffer.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8, N>> {
        if byte == self.delimiter {
            let overflowed = core::mem::replace(&mut self.overflowed, false);
            if self.buffer.is_empty() || overflowed {
                self.buffer.clear();
                return None;
            }
            return Some(core::mem::take(&mut self.buffer));
        }

        if self.overflowed {
            return None;
        }
        if self.buffer.push(byte).is_err() {
            self.buffer.clear();
            self.overflowed = true;
        }

        None
    }

    /// Bytes of the frame in progress (used to spot prompts that have no
    /// delimiter, such as the modem's `>`).
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Reset the accumulator, discarding any partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }

    /// Returns true if no partial frame is in progress.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<const N: usize> Default for FrameAccumulator<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut acc: FrameAccumulator<16> = FrameAccumulator::new();

        assert!(acc.push(0x01).is_none());
        assert!(acc.push(0x02).is_none());

        let frame = acc.push(0x00).expect("Should return frame");
        assert_eq!(frame.as_slice(), &[0x01, 0x02]);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_empty_frames_ignored() {
        let mut acc: FrameAccumulator<16> = FrameAccumulator::new();

        assert!(acc.push(0x00).is_none());
        assert!(acc.push(0x00).is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn test_lines() {
        let mut acc: FrameAccumulator<32> = FrameAccumulator::lines();

        let mut lines = std::vec::Vec::new();
        for &byte in b"\r\nOK\r\n+CSQ: 12,0\r\n" {
            if let Some(line) = acc.push(byte) {
                lines.push(line);
            }
        }

        // "\r" alone still forms a frame; callers trim it
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].as_slice(), b"OK\r");
        assert_eq!(lines[2].as_slice(), b"+CSQ: 12,0\r");
    }

    #[test]
    fn test_overflow_drops_whole_frame() {
        let mut acc: FrameAccumulator<4> = FrameAccumulator::lines();

        for &byte in b"too long" {
            assert!(acc.push(byte).is_none());
        }
        // Remainder of the oversized line is discarded at the delimiter
        assert!(acc.push(b'\n').is_none());

        for &byte in b"OK" {
            acc.push(byte);
        }
        let frame = acc.push(b'\n').expect("Should resynchronise");
        assert_eq!(frame.as_slice(), b"OK");
    }

    #[test]
    fn test_pending_prompt() {
        let mut acc: FrameAccumulator<8> = FrameAccumulator::lines();
        acc.push(b'>');
        acc.push(b' ');
        assert_eq!(acc.pending(), b"> ");

        acc.reset();
        assert!(acc.is_empty());
    }
}
