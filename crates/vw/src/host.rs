//! Host that writes rendered views to a stream.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use vw_pipeline::Host;

/// Emits rendered output to a writer (stdout in the CLI).
pub(crate) struct WriterHost<W> {
    active: bool,
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterHost<W> {
    pub(crate) fn new(active: bool, writer: W) -> Self {
        Self {
            active,
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Host for WriterHost<W> {
    fn engine_active(&self) -> bool {
        self.active
    }

    fn emit(&self, output: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(output.as_bytes())?;
        writer.flush()
    }
}
