//! Incremental frame decoder for `text/event-stream`-like bodies.
//!
//! Frames are separated by a blank line. Chunk boundaries may fall anywhere, including
//! inside a multi-byte UTF-8 sequence or inside a `data:` line; the unfinished tail is
//! carried to the next chunk.

const DATA_PREFIX: &str = "data: ";
const FRAME_DELIMITER: &str = "\n\n";

/// One complete frame: the `data: ` lines it carried, prefix stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<String>,
}

impl Frame {
    fn parse(raw: &str) -> Self {
        let data = raw
            .lines()
            .filter_map(|line| line.strip_prefix(DATA_PREFIX))
            .map(str::to_string)
            .collect();
        Self { data }
    }
}

/// Buffers decoded text for one response body.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of a UTF-8 sequence split by the chunk boundary.
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a delimiter.
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk; returns every frame completed by it (frames without data lines
    /// are skipped).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.decode(chunk);
        self.drain_frames()
    }

    /// End of body: decode whatever is left and return it as a final frame, if it has data.
    pub fn finish(&mut self) -> Vec<Frame> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        let mut frames = self.drain_frames();
        let rest = std::mem::take(&mut self.buffer);
        if !rest.trim().is_empty() {
            let frame = Frame::parse(&rest);
            if !frame.data.is_empty() {
                log::debug!("stream ended without trailing delimiter; flushing last frame");
                frames.push(frame);
            }
        }
        frames
    }

    /// Text currently buffered (an incomplete frame).
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    self.buffer.push_str(s);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    fn drain_frames(&mut self) -> Vec<Frame> {
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find(FRAME_DELIMITER) {
            let raw: String = self.buffer.drain(..pos).collect();
            self.buffer.drain(..FRAME_DELIMITER.len());
            let frame = Frame::parse(&raw);
            if !frame.data.is_empty() {
                frames.push(frame);
            }
        }
        frames
    }
}
