// report.rs — The fixed console lines of a benchmark run.
//
// Format (one line each, in this order):
//
//   reading file '<input>'
//   Gauss blur with kernel <k> with CPU buffer
//   CPU: <W>x<H> Duration: <ms>(ms)
//   Gauss blur with kernel <k> with accelerator buffer (<backend>)
//   Accelerator: <W>x<H> Duration: <ms>(ms)
//
// Scripts parse these, so the wording is stable. Diagnostics go through
// `tracing` to stderr instead.

use std::io::{self, Write};
use std::path::Path;

pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Reporter { out }
    }

    pub fn reading(&mut self, path: &Path) -> io::Result<()> {
        writeln!(self.out, "reading file '{}'", path.display())
    }

    /// Announce a blur about to run on `buffer` ("CPU buffer", ...).
    pub fn announce(&mut self, kernel_size: usize, buffer: &str) -> io::Result<()> {
        writeln!(self.out, "Gauss blur with kernel {kernel_size} with {buffer}")
    }

    pub fn duration(
        &mut self,
        label: &str,
        width: usize,
        height: usize,
        millis: u128,
    ) -> io::Result<()> {
        writeln!(self.out, "{label}: {width}x{height} Duration: {millis}(ms)")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
