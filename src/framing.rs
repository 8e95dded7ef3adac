// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Terminator-delimited framing for consumers of the byte stream.
//!
//! The engine delivers raw chunks of up to 256 bytes with no regard for
//! message boundaries. Peers that speak in NUL-terminated messages can feed
//! those chunks through a [`FrameAccumulator`] to get whole messages back.

use tracing::debug;

/// Default message terminator.
pub const NUL: u8 = 0;

/// Initial accumulator capacity.
const INITIAL_CAPACITY: usize = 1024;

/// Collects chunks until a terminator byte completes a frame.
pub struct FrameAccumulator {
    buffer: Vec<u8>,
    terminator: u8,
}

impl FrameAccumulator {
    /// Create an accumulator splitting on NUL.
    pub fn new() -> Self {
        Self::with_terminator(NUL)
    }

    pub fn with_terminator(terminator: u8) -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_CAPACITY),
            terminator,
        }
    }

    /// Append a chunk and return every frame it completed, terminators
    /// stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while let Some(end) = rest.iter().position(|&b| b == self.terminator) {
            self.extend(&rest[..end]);
            frames.push(std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(INITIAL_CAPACITY),
            ));
            rest = &rest[end + 1..];
        }

        self.extend(rest);
        frames
    }

    /// Bytes received since the last complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Discard any partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Append, doubling capacity whenever the buffer would fill up.
    fn extend(&mut self, bytes: &[u8]) {
        let needed = self.buffer.len() + bytes.len();
        if needed >= self.buffer.capacity() {
            let mut capacity = self.buffer.capacity().max(INITIAL_CAPACITY);
            while needed >= capacity {
                capacity *= 2;
            }
            debug!("Growing frame buffer to {} bytes", capacity);
            self.buffer.reserve_exact(capacity - self.buffer.len());
        }
        self.buffer.extend_from_slice(bytes);
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `text` as one frame.
pub fn encode_frame(text: &str, terminator: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(text.len() + 1);
    frame.extend_from_slice(text.as_bytes());
    frame.push(terminator);
    frame
}
