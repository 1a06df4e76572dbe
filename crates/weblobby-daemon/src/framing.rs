//! Newline framing for the lobby protocol
//!
//! The protocol has no length prefix: a message is everything up to the next
//! `\n`. Reads can split a line anywhere, so bytes after the last delimiter are
//! kept until a later chunk completes them.

/// The only message boundary on the wire
pub const DELIMITER: u8 = b'\n';

/// Accumulates raw reads and yields complete lines
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completes, in order, without
    /// the delimiter. Invalid UTF-8 is replaced lossily.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Bytes already buffered contain no delimiter, so only scan the new part.
        let scan_from = self.buf.len();
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut cursor = scan_from;
        while let Some(offset) = self.buf[cursor..].iter().position(|&b| b == DELIMITER) {
            let end = cursor + offset;
            lines.push(String::from_utf8_lossy(&self.buf[start..end]).into_owned());
            start = end + 1;
            cursor = start;
        }

        if start > 0 {
            self.buf.drain(..start);
        }
        lines
    }

    /// Bytes received after the last delimiter
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial line (used when the session ends)
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Terminate an outgoing message with the delimiter unless it already is.
pub fn frame_outgoing(message: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(message.len() + 1);
    bytes.extend_from_slice(message.as_bytes());
    if bytes.last() != Some(&DELIMITER) {
        bytes.push(DELIMITER);
    }
    bytes
}
