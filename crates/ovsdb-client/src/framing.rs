//! Brace-balance reframer for the OVSDB JSON-RPC stream.
//!
//! OVSDB carries JSON-RPC over a raw TCP stream with no length prefix,
//! so message boundaries are found by balancing `{` against `}`. The
//! scanner is an explicit state machine (normal / in-string /
//! after-escape) so braces inside quoted strings never misframe a
//! message. Bytes past the first complete frame stay in a residual
//! buffer for the next call.

/// Scanner state while walking one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    AfterEscape,
}

/// Accumulates raw bytes and yields complete JSON frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    /// Creates an empty frame buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends raw bytes received from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns true if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Extracts the next complete frame, if one is buffered.
    ///
    /// Leading bytes before the first `{` are discarded. Returns
    /// `None` when the buffered data does not yet contain a balanced
    /// frame.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let start = self.buf.iter().position(|&b| b == b'{')?;
        if start > 0 {
            self.buf.drain(..start);
        }

        let mut depth = 0usize;
        let mut state = ScanState::Normal;
        let mut frame_end = None;
        for (i, &b) in self.buf.iter().enumerate() {
            match state {
                ScanState::Normal => match b {
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            frame_end = Some(i);
                            break;
                        }
                    }
                    b'"' => state = ScanState::InString,
                    _ => {}
                },
                ScanState::InString => match b {
                    b'\\' => state = ScanState::AfterEscape,
                    b'"' => state = ScanState::Normal,
                    _ => {}
                },
                ScanState::AfterEscape => state = ScanState::InString,
            }
        }
        let end = frame_end?;
        Some(self.buf.drain(..=end).collect())
    }
}
