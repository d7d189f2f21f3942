use crate::config::StageConf;
use crate::stage::{Sink, Source};
use crate::{PipeError, PipeErrorKind, PipeResult};
use std::fs::File;
use std::io::{self, Write};

/// Create a source reading the file at the `path` config key. Fails fast if the path is missing,
/// empty, or can't be opened.
pub fn new_source(conf: &StageConf) -> PipeResult<Source> {
    let path = conf.get("path").map(String::as_str).unwrap_or("");
    if path.is_empty() {
        return Err(PipeError::parameter("path"));
    }
    let file = File::open(path).map_err(|e| {
        PipeError::new_io(PipeErrorKind::Parameter(format!("path {}", path)), e)
    })?;
    Ok(Box::new(file))
}

/// Create a sink writing to the file at the `path` config key, truncating an existing file.
pub fn new_sink(conf: &StageConf) -> PipeResult<Box<dyn Sink>> {
    let path = conf.get("path").map(String::as_str).unwrap_or("");
    if path.is_empty() {
        return Err(PipeError::parameter("path"));
    }
    let file = File::create(path).map_err(|e| {
        PipeError::new_io(PipeErrorKind::Parameter(format!("path {}", path)), e)
    })?;
    Ok(Box::new(FileSink { file }))
}

struct FileSink {
    file: File,
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Sink for FileSink {
    fn close(&mut self) -> PipeResult<()> {
        self.file
            .sync_all()
            .map_err(|e| PipeError::new_io(PipeErrorKind::Close, e))
    }
}

#[cfg(test)]
mod tests {
    use super::{new_sink, new_source};
    use crate::config::StageConf;
    use std::io::{Read, Write};

    fn conf(path: &str) -> StageConf {
        let mut conf = StageConf::new();
        conf.insert("path".to_string(), path.to_string());
        conf
    }

    #[test]
    fn missing_path_is_rejected() {
        assert!(new_source(&StageConf::new()).is_err());
        assert!(new_sink(&StageConf::new()).is_err());
    }

    #[test]
    fn nonexistent_source_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        assert!(new_source(&conf(path.to_str().unwrap())).is_err());
    }

    #[test]
    fn sink_then_source_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        let conf = conf(path.to_str().unwrap());

        let mut sink = new_sink(&conf).unwrap();
        sink.write_all(b"file adapter").unwrap();
        sink.close().unwrap();

        let mut source = new_source(&conf).unwrap();
        let mut out = String::new();
        source.read_to_string(&mut out).unwrap();
        assert_eq!(out, "file adapter");
    }
}
