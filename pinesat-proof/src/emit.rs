//! Buffered output with the shared I/O error policy.
//!
//! A proof write error is logged once and the tracer is treated as closed; further events are
//! dropped. Errors from proof emission never propagate into the solver.

use std::io::{self, BufWriter, Write};

/// Buffered proof output.
pub(crate) struct Emitter<W: Write> {
    target: BufWriter<W>,
    closed: bool,
}

impl<W: Write> Emitter<W> {
    pub fn new(target: W) -> Emitter<W> {
        Emitter {
            target: BufWriter::new(target),
            closed: false,
        }
    }

    /// Run an emission step unless the output is closed.
    pub fn with(&mut self, f: impl FnOnce(&mut BufWriter<W>) -> io::Result<()>) {
        if self.closed {
            return;
        }
        if let Err(err) = f(&mut self.target) {
            log::error!("error writing proof: {}", err);
            self.closed = true;
        }
    }

    pub fn flush(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.target.flush() {
            log::error!("error flushing proof: {}", err);
            self.closed = true;
        }
    }

    /// Recover the underlying writer, flushing buffered output.
    pub fn into_inner(self) -> W {
        self.target
            .into_inner()
            .unwrap_or_else(|err| panic!("proof buffer flush failed: {}", err.error()))
    }
}
