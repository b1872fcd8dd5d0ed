//! Recording buffer: accumulates capture fragments into one utterance.
//!
//! Fragments are raw time-sequential audio and must be concatenated in
//! arrival order, never reordered. The buffer is reset at the start of every
//! listening phase so stale audio never carries over.

use crate::capture::Fragment;
use crate::error::{LoopError, LoopResult};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Default minimum viable payload size in bytes. Anything smaller is treated
/// as silence or noise and discarded without a network call.
pub const DEFAULT_VIABILITY_THRESHOLD: usize = 1000;

/// One complete spoken input, frozen into a single binary payload.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub payload: Vec<u8>,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// Accumulates fragments while listening; `finalize` freezes them into an
/// `Utterance` and clears the buffer.
pub struct RecordingBuffer {
    fragments: Vec<Fragment>,
    viability_threshold: usize,
}

impl RecordingBuffer {
    pub fn new(viability_threshold: usize) -> Self {
        Self {
            fragments: Vec::new(),
            viability_threshold,
        }
    }

    /// Drop all accumulated fragments.
    pub fn reset(&mut self) {
        self.fragments.clear();
    }

    /// Append a fragment in arrival order.
    pub fn append(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Total bytes accumulated so far.
    pub fn byte_len(&self) -> usize {
        self.fragments.iter().map(|f| f.bytes.len()).sum()
    }

    /// Concatenate all fragments into one `Utterance` payload and clear the
    /// buffer. `EmptyRecording` if nothing was appended; `TooShort` if the
    /// payload is below the viability threshold.
    pub fn finalize(&mut self, mime_type: &str) -> LoopResult<Utterance> {
        if self.fragments.is_empty() {
            return Err(LoopError::EmptyRecording);
        }

        let size = self.byte_len();
        if size < self.viability_threshold {
            debug!(
                "Discarding recording: {} bytes < {} threshold",
                size, self.viability_threshold
            );
            self.fragments.clear();
            return Err(LoopError::TooShort {
                size,
                threshold: self.viability_threshold,
            });
        }

        let mut payload = Vec::with_capacity(size);
        for fragment in self.fragments.drain(..) {
            payload.extend_from_slice(&fragment.bytes);
        }

        Ok(Utterance {
            payload,
            mime_type: mime_type.to_string(),
            created_at: Utc::now(),
        })
    }
}
