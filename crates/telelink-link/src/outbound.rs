use std::sync::{Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};

/// Bytes waiting to be written to the board.
///
/// The consumer appends whole encoded frames; the worker copies the pending
/// bytes, writes them without holding the lock, then removes exactly the
/// acknowledged prefix. Since the consumer only appends, that prefix is still
/// at the front when it is removed.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    buf: Mutex<BytesMut>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes at the back of the queue.
    pub fn push(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Copy of everything pending, or `None` if the queue is empty.
    pub fn peek(&self) -> Option<Bytes> {
        let buf = self.lock();
        if buf.is_empty() {
            None
        } else {
            Some(Bytes::copy_from_slice(&buf))
        }
    }

    /// Remove `written` bytes from the front.
    pub fn consume(&self, written: usize) {
        let mut buf = self.lock();
        let written = written.min(buf.len());
        let _ = buf.split_to(written);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        // The buffer is plain bytes; a panic elsewhere cannot leave it inconsistent.
        self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
