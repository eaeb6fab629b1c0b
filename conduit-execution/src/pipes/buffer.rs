use parking_lot::Mutex;
use std::sync::Arc;

/// Shared in-memory text accumulator
///
/// Cloning yields another handle to the same buffer, so the caller keeps one
/// handle while a [`PipeTarget`](super::PipeTarget) appends to the other.
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    inner: Arc<Mutex<String>>,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&self, text: &str) {
        self.inner.lock().push_str(text);
    }

    /// Copy of the current contents
    pub fn contents(&self) -> String {
        self.inner.lock().clone()
    }

    /// Take the contents, leaving the buffer empty
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Shared in-memory byte accumulator
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend_from_slice(&self, bytes: &[u8]) {
        self.inner.lock().extend_from_slice(bytes);
    }

    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_buffer_shared_between_clones() {
        let buffer = TextBuffer::new();
        let handle = buffer.clone();

        handle.push_str("hello ");
        handle.push_str("world");
        assert_eq!(buffer.contents(), "hello world");
        assert_eq!(buffer.take(), "hello world");
        assert!(handle.is_empty());
    }

    #[test]
    fn test_byte_buffer() {
        let buffer = ByteBuffer::new();
        buffer.extend_from_slice(&[1, 2, 3]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.take(), vec![1, 2, 3]);
        assert!(buffer.is_empty());
    }
}
