//! Append-only transcript of a session's output
//!
//! Two read views share one log: `drain_new` for the polling operation, and
//! offset-based slices for the completion loop. Neither view consumes data
//! the other still needs.

use tokio::sync::{Mutex, Notify};

#[derive(Debug, Default)]
struct BufferState {
    /// Raw bytes produced since the last reset
    data: Vec<u8>,
    /// Offset up to which `drain_new` has returned output
    drained: usize,
}

/// Session output buffer
#[derive(Debug, Default)]
pub struct OutputBuffer {
    state: Mutex<BufferState>,
    appended: Notify,
}

impl OutputBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and wake anyone waiting for output
    pub async fn append(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.state.lock().await.data.extend_from_slice(chunk);
        self.appended.notify_waiters();
    }

    /// Total number of bytes in the transcript
    pub async fn len(&self) -> usize {
        self.state.lock().await.data.len()
    }

    /// Whether nothing has been appended since the last reset
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.data.is_empty()
    }

    /// Bytes from `offset` to the end of the transcript
    ///
    /// A trailing incomplete UTF-8 sequence is held back so a caller advancing
    /// its offset by the returned length never splits a character.
    pub async fn read_from(&self, offset: usize) -> Vec<u8> {
        let state = self.state.lock().await;
        let Some(tail) = state.data.get(offset..) else {
            return Vec::new();
        };
        tail[..complete_utf8_len(tail)].to_vec()
    }

    /// Return and clear the "new since last poll" region
    pub async fn drain_new(&self) -> String {
        let mut state = self.state.lock().await;
        let start = state.drained.min(state.data.len());
        let tail = &state.data[start..];
        let end = start + complete_utf8_len(tail);
        let text = String::from_utf8_lossy(&state.data[start..end]).into_owned();
        state.drained = end;
        text
    }

    /// Mark everything currently buffered as already polled
    pub async fn mark_drained(&self) {
        let mut state = self.state.lock().await;
        state.drained = state.data.len();
    }

    /// The entire transcript since the last reset
    ///
    /// A submitted command's result is not taken from here: the completion
    /// loop keeps its own per-command transcript, so only output produced
    /// after submission is returned.
    pub async fn full_text(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().await.data).into_owned()
    }

    /// Discard the transcript and the poll cursor
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.data.clear();
        state.drained = 0;
    }

    /// Wait until more output is appended
    ///
    /// Register interest before checking the buffer, otherwise an append
    /// landing between the check and the wait is missed.
    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.appended.notified()
    }
}

/// Length of the longest prefix that does not end inside a UTF-8 sequence
///
/// Invalid bytes are not held back; only a truncated sequence at the very end.
fn complete_utf8_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            // Invalid data somewhere; only trim a dangling multi-byte start at the end.
            let tail_start = bytes.len().saturating_sub(3);
            for i in (tail_start..bytes.len()).rev() {
                let b = bytes[i];
                if b & 0xC0 == 0x80 {
                    continue;
                }
                let needed = match b {
                    0xC0..=0xDF => 2,
                    0xE0..=0xEF => 3,
                    0xF0..=0xF7 => 4,
                    _ => return bytes.len(),
                };
                return if bytes.len() - i < needed { i } else { bytes.len() };
            }
            bytes.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_drain_new_and_full_text_are_independent() {
        let buffer = OutputBuffer::new();
        buffer.append(b"hello\n").await;

        assert_eq!(buffer.drain_new().await, "hello\n");
        assert_eq!(buffer.drain_new().await, "");

        buffer.append(b"world\n").await;
        assert_eq!(buffer.full_text().await, "hello\nworld\n");
        assert_eq!(buffer.drain_new().await, "world\n");
        assert_eq!(buffer.full_text().await, "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_read_from_offset() {
        let buffer = OutputBuffer::new();
        buffer.append(b"abc").await;
        buffer.append(b"def").await;

        assert_eq!(buffer.read_from(0).await, b"abcdef".to_vec());
        assert_eq!(buffer.read_from(3).await, b"def".to_vec());
        assert!(buffer.read_from(6).await.is_empty());
        assert!(buffer.read_from(100).await.is_empty());
        // Reads never drain
        assert_eq!(buffer.drain_new().await, "abcdef");
    }

    #[tokio::test]
    async fn test_split_utf8_is_held_back() {
        let buffer = OutputBuffer::new();
        let snowman = "☃".as_bytes();
        buffer.append(b"a").await;
        buffer.append(&snowman[..1]).await;

        assert_eq!(buffer.read_from(0).await, b"a".to_vec());
        assert_eq!(buffer.drain_new().await, "a");

        buffer.append(&snowman[1..]).await;
        assert_eq!(buffer.drain_new().await, "☃");
    }

    #[tokio::test]
    async fn test_invalid_bytes_pass_through() {
        let buffer = OutputBuffer::new();
        buffer.append(&[b'x', 0xFF, b'y']).await;
        assert_eq!(buffer.read_from(0).await, vec![b'x', 0xFF, b'y']);
        assert_eq!(buffer.drain_new().await, "x\u{FFFD}y");
    }

    #[tokio::test]
    async fn test_mark_drained_and_clear() {
        let buffer = OutputBuffer::new();
        buffer.append(b"init noise").await;
        buffer.mark_drained().await;
        assert_eq!(buffer.drain_new().await, "");
        assert_eq!(buffer.full_text().await, "init noise");

        buffer.clear().await;
        assert!(buffer.is_empty().await);
        assert_eq!(buffer.len().await, 0);
        buffer.append(b"fresh").await;
        assert_eq!(buffer.drain_new().await, "fresh");
    }

    #[tokio::test]
    async fn test_notified_wakes_on_append() {
        let buffer = std::sync::Arc::new(OutputBuffer::new());
        let waiter = {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let notified = buffer.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if buffer.is_empty().await {
                    notified.await;
                }
                buffer.full_text().await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        buffer.append(b"ping").await;
        assert_eq!(waiter.await.unwrap(), "ping");
    }
}
