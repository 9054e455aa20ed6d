//! Tail-retaining output window.
//!
//! Chunks are kept whole in arrival order. The front chunk is evicted only
//! while the chunks behind it already cover the cap, so the window always
//! holds at least the last `cap` bytes produced (rounded up to whole chunks).

use std::collections::VecDeque;

/// Bounded accumulator for subprocess output.
#[derive(Debug)]
pub struct OutputWindow {
    cap: usize,
    chunks: VecDeque<Vec<u8>>,
    retained: usize,
    dropped: u64,
}

impl OutputWindow {
    /// Create an empty window that retains at least the last `cap` bytes.
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            chunks: VecDeque::new(),
            retained: 0,
            dropped: 0,
        }
    }

    /// Append a chunk and evict from the front until the cap holds again.
    ///
    /// A single chunk larger than the cap is kept whole.
    pub fn append(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.retained += chunk.len();
        self.chunks.push_back(chunk);

        while let Some(front) = self.chunks.front() {
            if self.chunks.len() == 1 || self.retained - front.len() < self.cap {
                break;
            }
            let evicted = front.len();
            self.chunks.pop_front();
            self.retained -= evicted;
            self.dropped += evicted as u64;
        }
    }

    /// Join the retained chunks, in order, into the final output.
    pub fn finalize(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.retained);
        for chunk in self.chunks {
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Retained byte count.
    pub fn len(&self) -> usize {
        self.retained
    }

    pub fn is_empty(&self) -> bool {
        self.retained == 0
    }

    /// Number of retained chunks.
    pub fn chunks(&self) -> usize {
        self.chunks.len()
    }

    /// The configured cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Bytes evicted from the front so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::OutputWindow;

    #[test]
    fn evicts_only_when_rest_covers_cap() {
        let mut window = OutputWindow::new(4);
        window.append(b"ab".to_vec());
        window.append(b"cd".to_vec());
        assert_eq!(window.len(), 4);
        assert_eq!(window.chunks(), 2);

        // "cd" + "e" = 3 < 4, so "ab" must stay.
        window.append(b"e".to_vec());
        assert_eq!(window.chunks(), 3);
        assert_eq!(window.len(), 5);

        // "cd" + "e" + "f" = 4 >= 4, so "ab" goes.
        window.append(b"f".to_vec());
        assert_eq!(window.chunks(), 3);
        assert_eq!(window.dropped(), 2);
        assert_eq!(window.finalize(), b"cdef");
    }

    #[test]
    fn empty_chunks_are_ignored() {
        let mut window = OutputWindow::new(8);
        window.append(Vec::new());
        assert!(window.is_empty());
        assert_eq!(window.chunks(), 0);
    }
}
