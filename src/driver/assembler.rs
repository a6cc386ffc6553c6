//! Response buffer assembly.
//!
//! # Responsibilities
//! - Copy backend body bytes into discrete output buffers
//! - Hand the front loop everything buffered so far, exactly once
//!
//! # Design Decisions
//! - One mutex guards the chain; `push` and `drain` are each one critical section
//! - Copies are made before taking the lock
//! - Inputs longer than the chunk size are split into several buffers

use bytes::Bytes;
use std::sync::{Mutex, PoisonError};

/// Ordered buffers awaiting transmission.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputChain {
    buffers: Vec<Bytes>,
    len: usize,
}

impl OutputChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, buffer: Bytes) {
        self.len += buffer.len();
        self.buffers.push(buffer);
    }

    /// Total bytes across all buffers.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn buffers(&self) -> &[Bytes] {
        &self.buffers
    }

    /// Concatenate the chain into one contiguous vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for buffer in &self.buffers {
            out.extend_from_slice(buffer);
        }
        out
    }
}

impl IntoIterator for OutputChain {
    type Item = Bytes;
    type IntoIter = std::vec::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.buffers.into_iter()
    }
}

/// Shared buffer between the back loop (producer) and the front loop (consumer).
#[derive(Debug)]
pub struct ResponseBufferAssembler {
    chunk_size: usize,
    pending: Mutex<OutputChain>,
}

impl ResponseBufferAssembler {
    /// `chunk_size` bounds each buffer in the chain; zero is treated as one.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pending: Mutex::new(OutputChain::new()),
        }
    }

    /// Copy `bytes` into new buffers and append them.
    pub fn push(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let buffers: Vec<Bytes> = bytes.chunks(self.chunk_size).map(Bytes::copy_from_slice).collect();

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for buffer in buffers {
            pending.push(buffer);
        }
    }

    /// Detach everything buffered so far, leaving the chain empty.
    pub fn drain(&self) -> OutputChain {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }

    pub fn buffered_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered_len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn drain_returns_pushed_bytes_in_order() {
        let assembler = ResponseBufferAssembler::new(4096);
        assembler.push(b"ab");
        assembler.push(b"cd");
        assembler.push(b"ef");

        let chain = assembler.drain();
        assert_eq!(chain.buffers().len(), 3);
        assert_eq!(chain.len(), 6);
        assert_eq!(chain.to_vec(), b"abcdef");
        assert!(assembler.drain().is_empty());
    }

    #[test]
    fn large_pushes_are_split_by_chunk_size() {
        let assembler = ResponseBufferAssembler::new(4);
        assembler.push(b"0123456789");

        let chain = assembler.drain();
        let sizes: Vec<_> = chain.buffers().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(chain.to_vec(), b"0123456789");
    }

    #[test]
    fn empty_push_is_ignored() {
        let assembler = ResponseBufferAssembler::new(16);
        assembler.push(b"");
        assert!(assembler.is_empty());
        assert!(assembler.drain().buffers().is_empty());
    }

    #[test]
    fn concurrent_push_and_drain_never_duplicate_or_reorder() {
        let assembler = Arc::new(ResponseBufferAssembler::new(3));
        let expected: Vec<u8> = (0..2000u32).flat_map(|i| format!("{},", i).into_bytes()).collect();

        let producer = {
            let assembler = assembler.clone();
            std::thread::spawn(move || {
                for i in 0..2000u32 {
                    assembler.push(format!("{},", i).as_bytes());
                }
            })
        };

        let mut received = Vec::new();
        while !producer.is_finished() {
            received.extend(assembler.drain().to_vec());
            std::thread::yield_now();
        }
        producer.join().unwrap();
        received.extend(assembler.drain().to_vec());

        assert_eq!(received, expected);
    }
}
