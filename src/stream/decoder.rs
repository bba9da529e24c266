//! Frame Decoder
//!
//! Turns a chunked byte stream into blank-line delimited frames. Chunks may
//! split a UTF-8 sequence or a delimiter anywhere; the decoder carries the
//! incomplete tail forward so the frame sequence never depends on chunking.

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use tracing::debug;

/// Separator between frames
pub const FRAME_DELIMITER: &str = "\n\n";

#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Decoded text not yet terminated by a delimiter
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode_utf8(chunk);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        self.drain_frames()
    }

    /// End of input. Returns the dangling partial frame, which is never
    /// emitted as a frame.
    pub fn finish(&mut self) -> Option<String> {
        let mut rest = std::mem::take(&mut self.buffer);
        if !self.pending.is_empty() {
            rest.push(char::REPLACEMENT_CHARACTER);
            self.pending.clear();
        }
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match e.error_len() {
                        // Invalid sequence: substitute and keep going
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Sequence continues in the next chunk
                        None => {
                            self.pending = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].find(FRAME_DELIMITER) {
            let frame = &self.buffer[start..start + offset];
            if !frame.trim().is_empty() {
                frames.push(frame.to_string());
            }
            start += offset + FRAME_DELIMITER.len();
        }

        self.buffer.drain(..start);
        frames
    }
}

/// Lazily decode a chunk stream into frames. Each call starts from a fresh
/// decoder, so one stream per run.
pub fn frames<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = (chunks, FrameDecoder::new(), VecDeque::new(), false);

    stream::unfold(state, |(mut chunks, mut decoder, mut ready, done)| async move {
        loop {
            if let Some(frame) = ready.pop_front() {
                return Some((Ok(frame), (chunks, decoder, ready, done)));
            }
            if done {
                return None;
            }
            match chunks.next().await {
                Some(Ok(chunk)) => ready.extend(decoder.push(chunk.as_ref())),
                Some(Err(e)) => return Some((Err(e), (chunks, decoder, ready, true))),
                None => {
                    if let Some(rest) = decoder.finish() {
                        debug!("Dropping unterminated trailing frame ({} bytes)", rest.len());
                    }
                    return None;
                }
            }
        }
    })
}
