use crate::stage::Sink;
use crate::{PipeError, PipeErrorKind, PipeResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io;
use std::io::Write;
use std::thread::JoinHandle;

/// Number of in-flight chunks a relay buffers before the writing side blocks.
pub const DEFAULT_RELAY_CAPACITY: usize = 16;

/// Create a new bounded relay, returning the write and read half.
///
/// A relay is the in-process hand-off used to expose a push style or blocking producer as a pull
/// style byte stream. It holds at most `capacity` chunks: a write blocks the producing thread
/// until the reader drains the backlog, which gives natural backpressure through the whole chain.
/// Exactly one thread writes and exactly one thread reads.
///
/// The writer finishes the stream either cleanly with [`RelayWriter::finish`], or with
/// [`RelayWriter::fail`], which surfaces the error on the next downstream read. Workers feeding a
/// relay must always report failure through [`RelayWriter::fail`]; dropping the writer after an
/// unreported error would let downstream observe a clean, silently truncated stream.
pub fn relay(capacity: usize) -> (RelayWriter, RelayReader) {
    let (tx, rx) = bounded(capacity);
    (
        RelayWriter { tx: Some(tx) },
        RelayReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
        },
    )
}

/// The writing half of a relay.
#[derive(Debug)]
pub struct RelayWriter {
    tx: Option<Sender<io::Result<Vec<u8>>>>,
}

impl RelayWriter {
    /// Close the relay with a clean end-of-stream. The reader will observe EOF once the buffered
    /// chunks are drained.
    pub fn finish(&mut self) {
        self.tx.take();
    }

    /// Close the relay with an error. The reader observes the error after draining the chunks
    /// written before the failure.
    pub fn fail(&mut self, e: io::Error) {
        if let Some(tx) = self.tx.take() {
            // the reader may already be gone, in which case nobody is left to care
            let _ = tx.send(Err(e));
        }
    }

    fn sender(&self) -> io::Result<&Sender<io::Result<Vec<u8>>>> {
        self.tx.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "write on a finished relay")
        })
    }
}

impl io::Write for RelayWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.sender()?.send(Ok(buf.to_vec())).is_err() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "relay reader closed",
            ));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The reading half of a relay.
#[derive(Debug)]
pub struct RelayReader {
    rx: Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl io::Read for RelayReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                // all writers gone without error: clean end-of-stream
                Err(_) => return Ok(0),
            }
        }
        let n = (self.chunk.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// A consumer-bridge sink: writes feed the relay, a worker thread drains it into the wrapped
/// pull style consumer, and closing finishes the relay and joins the worker for its verdict.
/// Used by every sink that wraps a consumer wanting to own the read side of the stream.
///
/// A worker that dies mid stream drops its reader, so the next push would only see a broken
/// relay; the write side joins the worker at that point and surfaces its actual error instead.
pub struct BridgedSink {
    writer: Option<RelayWriter>,
    worker: Option<JoinHandle<io::Result<()>>>,
}

impl BridgedSink {
    /// Create a bridged sink from the write half of a relay and the worker draining the read
    /// half.
    pub fn new(writer: RelayWriter, worker: JoinHandle<io::Result<()>>) -> BridgedSink {
        BridgedSink {
            writer: Some(writer),
            worker: Some(worker),
        }
    }

    /// Collect the worker's verdict after the relay broke under a write. The reader is only
    /// dropped once the worker is about to return, so the join is near instant.
    fn worker_verdict(&mut self, fallback: io::Error) -> io::Error {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return fallback,
        };
        match worker.join() {
            Ok(Err(e)) => e,
            Ok(Ok(())) => fallback,
            Err(_) => io::Error::new(io::ErrorKind::Other, "sink worker panicked"),
        }
    }
}

impl Write for BridgedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = match self.writer {
            Some(ref mut writer) => writer,
            None => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed"));
            }
        };
        match writer.write(buf) {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Err(self.worker_verdict(e)),
            res => res,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Sink for BridgedSink {
    fn close(&mut self) -> PipeResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.finish();
        }
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Ok(()),
        };
        match worker.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PipeError::new_io(PipeErrorKind::Close, e)),
            Err(_) => Err(PipeError::new_msg(
                PipeErrorKind::Close,
                "sink worker panicked".to_string(),
            )),
        }
    }
}
