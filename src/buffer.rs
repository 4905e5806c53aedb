//! Accumulator for the unconsumed tail of the socket stream

use crate::{
    constants::{FRAME_TERMINATOR, LINE_TERMINATOR, MAX_BUFFER_SIZE},
    error::{AmiError, AmiResult},
};

/// Find `pattern` in `haystack` starting at `from`.
fn find_from(haystack: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(pattern.len())
        .position(|w| w == pattern)
        .map(|p| p + from)
}

/// Bytes received but not yet decoded into frames.
///
/// After [`take_frames`](Self::take_frames) the buffer holds at most one
/// partial frame, and the next search resumes where the last one stopped, so
/// a large frame arriving in many small reads is scanned once.
#[derive(Debug, Default)]
pub(crate) struct RawBuffer {
    data: Vec<u8>,
    /// Prefix of `data` already searched without finding a terminator
    scanned: usize,
}

impl RawBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn extend_from_slice(&mut self, data: &[u8]) {
        self.data
            .extend_from_slice(data);
    }

    /// Fail when the peer keeps sending without ever closing a frame.
    pub(crate) fn check_size_limits(&self) -> AmiResult<()> {
        if self.data.len() > MAX_BUFFER_SIZE {
            return Err(AmiError::protocol_error(format!(
                "Buffer size {} exceeds limit {} without a frame terminator",
                self.data.len(),
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Split off every complete frame, scanning left to right for the frame
    /// terminator. The trailing segment after the last terminator stays
    /// buffered, unless it is a lone line terminator, in which case the buffer
    /// is emptied.
    pub(crate) fn take_frames(&mut self) -> Vec<Vec<u8>> {
        let terminator = FRAME_TERMINATOR.as_bytes();
        let mut frames = Vec::new();
        let mut start = 0;
        // A terminator may straddle the old end of the buffer.
        let mut from = self
            .scanned
            .saturating_sub(terminator.len() - 1);

        while let Some(pos) = find_from(&self.data, terminator, from) {
            frames.push(self.data[start..pos].to_vec());
            start = pos + terminator.len();
            from = start;
        }

        if start > 0 {
            self.data
                .drain(..start);
        }
        if self.data == LINE_TERMINATOR.as_bytes() {
            self.data
                .clear();
        }
        self.scanned = self.data.len();
        frames
    }

    pub(crate) fn len(&self) -> usize {
        self.data
            .len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data
            .is_empty()
    }

    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
