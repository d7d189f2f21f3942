use crate::config::StageConf;
use crate::relay::{relay, RelayReader, DEFAULT_RELAY_CAPACITY};
use crate::stage::{Filter, Source};
use crate::PipeResult;
use log::error;
use std::io::{self, Read, Write};
use std::thread;

/// Create a snappy frame compression filter.
pub fn new_compress(_conf: &StageConf) -> PipeResult<Box<dyn Filter>> {
    Ok(Box::new(SnappyFilter { reader: None }))
}

/// Create a snappy frame decompression filter.
pub fn new_decompress(_conf: &StageConf) -> PipeResult<Box<dyn Filter>> {
    Ok(Box::new(UnsnappyFilter { decoder: None }))
}

/// Producer-bridge around the write side snappy frame encoder, same shape as the gzip filter.
struct SnappyFilter {
    reader: Option<RelayReader>,
}

impl Read for SnappyFilter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader {
            Some(ref mut reader) => reader.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "snappy filter is not linked",
            )),
        }
    }
}

impl Filter for SnappyFilter {
    fn link(&mut self, mut upstream: Source) -> PipeResult<()> {
        let (writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
        self.reader = Some(reader);
        thread::spawn(move || {
            let mut encoder = snap::write::FrameEncoder::new(writer);
            let res = io::copy(&mut upstream, &mut encoder).and_then(|_| encoder.flush());
            match encoder.into_inner() {
                Ok(mut writer) => match res {
                    Ok(()) => writer.finish(),
                    Err(e) => {
                        error!("snappy worker failed: {}", e);
                        writer.fail(e);
                    }
                },
                // flushing the trailing frame failed, the reader is already gone
                Err(e) => error!("snappy worker failed: {}", e.error()),
            }
        });
        Ok(())
    }
}

struct UnsnappyFilter {
    decoder: Option<snap::read::FrameDecoder<Source>>,
}

impl Read for UnsnappyFilter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.decoder {
            Some(ref mut decoder) => decoder.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "unsnappy filter is not linked",
            )),
        }
    }
}

impl Filter for UnsnappyFilter {
    fn link(&mut self, upstream: Source) -> PipeResult<()> {
        self.decoder = Some(snap::read::FrameDecoder::new(upstream));
        Ok(())
    }
}
