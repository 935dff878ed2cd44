use std::sync::{Arc, Mutex, PoisonError};

/// Callback receiving raw output bytes from the interpreter.
pub type OutputSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Accumulates interpreter output as text.
///
/// Bytes are decoded as UTF-8 incrementally: a multi-byte character split
/// across two chunks is held back until it completes. Invalid sequences
/// become U+FFFD.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Decoded>>,
}

#[derive(Debug, Default)]
struct Decoded {
    text: String,
    pending: Vec<u8>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that appends into this buffer.
    pub fn sink(&self) -> OutputSink {
        let buffer = self.clone();
        Arc::new(move |bytes: &[u8]| buffer.append_bytes(bytes))
    }

    pub fn append_bytes(&self, bytes: &[u8]) {
        let mut inner = self.lock();
        let mut data = std::mem::take(&mut inner.pending);
        data.extend_from_slice(bytes);

        let mut rest = data.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    inner.text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // Validated by from_utf8 above
                    inner.text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            inner.text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more bytes
                            inner.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.text.clear();
        inner.pending.clear();
    }

    /// Everything received so far. A dangling partial character is rendered
    /// as U+FFFD but kept pending.
    pub fn contents(&self) -> String {
        let inner = self.lock();
        let mut text = inner.text.clone();
        if !inner.pending.is_empty() {
            text.push(char::REPLACEMENT_CHARACTER);
        }
        text
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Decoded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
