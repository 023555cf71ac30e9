//! In-memory stdout/stderr sinks shared between a run and its session.

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// A cloneable byte sink that keeps everything written to it.
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl OutputCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the captured bytes as text.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl io::Write for OutputCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_capture_shared_between_clones() {
        let capture = OutputCapture::new();
        let mut writer = capture.clone();
        writeln!(writer, "Updating (dev)").unwrap();
        writeln!(writer, "error: update failed").unwrap();

        assert_eq!(capture.contents(), "Updating (dev)\nerror: update failed\n");
        assert!(!capture.is_empty());
    }

    #[test]
    fn test_capture_lossy_utf8() {
        let capture = OutputCapture::new();
        assert!(capture.is_empty());
        capture.clone().write_all(b"ok \xff").unwrap();
        assert_eq!(capture.contents(), "ok \u{fffd}");
    }
}
