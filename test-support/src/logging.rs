//! Log capture for tests.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

/// An in-memory writer for `tracing_subscriber::fmt`.
///
/// Clones share the same buffer, so one clone can be handed to the
/// subscriber while the test keeps another to inspect the output.
///
/// # Examples
///
/// ```rust
/// use std::io::Write;
/// use test_support::logging::CaptureWriter;
/// use tracing_subscriber::fmt::MakeWriter;
///
/// let capture = CaptureWriter::default();
/// capture.make_writer().write_all(b"hello").expect("write");
/// assert_eq!(capture.contents(), "hello");
/// ```
#[derive(Debug, Default, Clone)]
pub struct CaptureWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CaptureWriter {
    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for CaptureWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
