use crate::config::StageConf;
use crate::stage::{Sink, Source};
use crate::PipeResult;
use std::io::{self, Write};

/// Create a source reading the process's inherited standard input.
pub fn new_stdin(_conf: &StageConf) -> PipeResult<Source> {
    Ok(Box::new(io::stdin()))
}

/// Create a sink writing to the process's inherited standard output.
pub fn new_stdout(_conf: &StageConf) -> PipeResult<Box<dyn Sink>> {
    Ok(Box::new(StdoutSink {
        stdout: io::stdout(),
    }))
}

/// Create a sink accepting and dropping all writes, for dry runs.
pub fn new_discard(_conf: &StageConf) -> PipeResult<Box<dyn Sink>> {
    Ok(Box::new(DiscardSink))
}

struct StdoutSink {
    stdout: io::Stdout,
}

impl Write for StdoutSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

impl Sink for StdoutSink {
    fn close(&mut self) -> PipeResult<()> {
        // stdout is owned by the process, closing is just a flush
        self.stdout
            .flush()
            .map_err(|e| crate::PipeError::new_io(crate::PipeErrorKind::Close, e))
    }
}

struct DiscardSink;

impl Write for DiscardSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Sink for DiscardSink {
    fn close(&mut self) -> PipeResult<()> {
        Ok(())
    }
}
