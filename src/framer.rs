//! Telemetry frame serialization
//!
//! One frame is the ASCII text `"<sequence>,<value>;"` followed by a single
//! NUL terminator that is included in the transmitted length; existing peers
//! depend on receiving that trailing byte. The framer owns the
//! monotonically increasing sequence counter: it starts at 0, increments by
//! exactly one per frame, and never resets while the process runs.

/// End-of-frame terminator byte, counted in the transmitted length
pub const FRAME_TERMINATOR: u8 = 0;

/// Reply sent once per recognized ack token
pub const ACK_REPLY: &[u8] = b"\r\n\0";

use crate::types::FrameValue;

/// Serializes values into delimited telemetry frames
#[derive(Debug, Default)]
pub struct TelemetryFramer {
    sequence: u32,
}

impl TelemetryFramer {
    /// Create a framer with the sequence counter at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence number the next frame will carry
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Serialize `value` into a frame and advance the sequence counter.
    ///
    /// The output is `"<sequence>,<value>;"` in ASCII decimal with no
    /// embedded whitespace, plus the trailing terminator byte.
    pub fn frame(&mut self, value: FrameValue) -> Vec<u8> {
        let mut bytes = format!("{},{};", self.sequence, value).into_bytes();
        bytes.push(FRAME_TERMINATOR);
        self.sequence = self.sequence.wrapping_add(1);
        bytes
    }

    /// The CRLF reply sent after each recognized ack token, with the same
    /// trailing terminator convention as data frames.
    pub fn ack_reply(&self) -> &'static [u8] {
        ACK_REPLY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let mut framer = TelemetryFramer::new();
        assert_eq!(framer.frame(FrameValue::Unsigned(40)), b"0,40;\0");
        assert_eq!(framer.frame(FrameValue::Signed(-40)), b"1,-40;\0");
    }

    #[test]
    fn test_sequence_increments_by_one() {
        let mut framer = TelemetryFramer::new();
        for expected in 0..5u32 {
            assert_eq!(framer.sequence(), expected);
            framer.frame(FrameValue::Unsigned(0));
        }
        assert_eq!(framer.sequence(), 5);
    }

    #[test]
    fn test_formatting_is_independent_of_history() {
        // Two framers at the same sequence produce identical bytes no matter
        // what values they framed before.
        let mut a = TelemetryFramer::new();
        let mut b = TelemetryFramer::new();
        for _ in 0..5 {
            a.frame(FrameValue::Signed(-123456));
            b.frame(FrameValue::Unsigned(7));
        }
        assert_eq!(
            a.frame(FrameValue::Unsigned(120)),
            b.frame(FrameValue::Unsigned(120))
        );
        assert_eq!(a.sequence(), 6);
    }

    #[test]
    fn test_ack_reply_bytes() {
        let framer = TelemetryFramer::new();
        assert_eq!(framer.ack_reply(), b"\r\n\0");
    }

    #[test]
    fn test_sequence_wraps_at_u32_max() {
        let mut framer = TelemetryFramer {
            sequence: u32::MAX,
        };
        assert_eq!(framer.frame(FrameValue::Unsigned(1)), b"4294967295,1;\0");
        assert_eq!(framer.sequence(), 0);
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_frame_shape_holds_for_all_values(seq in any::<u32>(), value in any::<i64>()) {
            let mut framer = TelemetryFramer { sequence: seq };
            let bytes = framer.frame(FrameValue::Signed(value));

            // Property: terminator is last and counted in the length
            prop_assert_eq!(*bytes.last().unwrap(), FRAME_TERMINATOR);

            // Property: the text is exactly "<seq>,<value>;"
            let text = std::str::from_utf8(&bytes[..bytes.len() - 1]).unwrap();
            prop_assert_eq!(text, format!("{},{};", seq, value));
            prop_assert!(!text.contains(' '));
        }
    }
}
