use crate::PipeResult;
use std::io;

/// A source stage only produces bytes. Any blocking reader qualifies, as long as it is ready to
/// serve reads immediately after construction. A source signals end-of-stream by returning a read
/// of 0 bytes, and MUST surface a production failure as a read error rather than a clean
/// end-of-stream.
pub type Source = Box<dyn io::Read + Send>;

/// A filter stage consumes the bytes of an upstream stage and produces transformed bytes.
///
/// A filter is constructed from its own configuration without knowing its upstream; the upstream
/// is supplied exactly once through [`Filter::link`] before the first read. This split exists
/// because several filters need config derived resources (a parsed keyring, a spawned subprocess)
/// before any data flows, and some wrapped primitives block on their first input before they can
/// be read from.
pub trait Filter: io::Read + Send {
    /// Attach the upstream stage this filter reads from. Must be called exactly once, before the
    /// first read. Implementations must not block the caller: any blocking work triggered by
    /// linking happens on an internally managed worker thread.
    fn link(&mut self, upstream: Source) -> PipeResult<()>;
}

/// A sink stage only consumes bytes, and finalizes on close.
pub trait Sink: io::Write + Send {
    /// Finalize the sink and release its resources. Called exactly once, after all writes. Any
    /// buffered but unreported error (e.g. from a worker thread draining this sink) is returned
    /// here.
    fn close(&mut self) -> PipeResult<()>;
}
