use crate::config::StageConf;
use crate::relay::{relay, RelayReader, DEFAULT_RELAY_CAPACITY};
use crate::stage::{Filter, Source};
use crate::PipeResult;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::error;
use std::io::{self, Read};
use std::thread;

/// Create a gzip compression filter.
pub fn new_compress(_conf: &StageConf) -> PipeResult<Box<dyn Filter>> {
    Ok(Box::new(GzipFilter { reader: None }))
}

/// Create a gzip decompression filter.
pub fn new_decompress(_conf: &StageConf) -> PipeResult<Box<dyn Filter>> {
    Ok(Box::new(GunzipFilter { decoder: None }))
}

/// Compression side. The gzip encoder wants to own the write side of the stream, so this is a
/// producer-bridge: linking starts a worker which pumps the upstream through the encoder into a
/// relay, and reads simply drain that relay.
struct GzipFilter {
    reader: Option<RelayReader>,
}

impl Read for GzipFilter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader {
            Some(ref mut reader) => reader.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "gzip filter is not linked",
            )),
        }
    }
}

impl Filter for GzipFilter {
    fn link(&mut self, mut upstream: Source) -> PipeResult<()> {
        let (writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
        self.reader = Some(reader);
        thread::spawn(move || {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            let res = io::copy(&mut upstream, &mut encoder)
                .and_then(|_| encoder.try_finish());
            match res {
                Ok(()) => encoder.get_mut().finish(),
                Err(e) => {
                    error!("gzip worker failed: {}", e);
                    encoder.get_mut().fail(e);
                }
            }
        });
        Ok(())
    }
}

/// Decompression side. The gzip decoder is itself a pull style reader, so it directly wraps the
/// upstream, no worker needed.
struct GunzipFilter {
    decoder: Option<GzDecoder<Source>>,
}

impl Read for GunzipFilter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.decoder {
            Some(ref mut decoder) => decoder.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "gunzip filter is not linked",
            )),
        }
    }
}

impl Filter for GunzipFilter {
    fn link(&mut self, upstream: Source) -> PipeResult<()> {
        self.decoder = Some(GzDecoder::new(upstream));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{new_compress, new_decompress};
    use crate::config::StageConf;
    use rand::Rng;
    use std::io::{Cursor, Read};

    #[test]
    fn compress_then_decompress_restores_input() {
        let mut data = vec![0u8; 1 << 16];
        rand::thread_rng().fill(&mut data[..]);

        let mut compress = new_compress(&StageConf::new()).unwrap();
        compress
            .link(Box::new(Cursor::new(data.clone())))
            .unwrap();
        let mut compressed = Vec::new();
        compress.read_to_end(&mut compressed).unwrap();

        let mut decompress = new_decompress(&StageConf::new()).unwrap();
        decompress
            .link(Box::new(Cursor::new(compressed)))
            .unwrap();
        let mut restored = Vec::new();
        decompress.read_to_end(&mut restored).unwrap();

        assert_eq!(restored, data);
    }

    #[test]
    fn compressed_stream_is_gzip() {
        let mut compress = new_compress(&StageConf::new()).unwrap();
        compress
            .link(Box::new(Cursor::new(b"Hello World".to_vec())))
            .unwrap();
        let mut compressed = Vec::new();
        compress.read_to_end(&mut compressed).unwrap();
        // gzip magic
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn garbage_input_fails_decompression() {
        let mut decompress = new_decompress(&StageConf::new()).unwrap();
        decompress
            .link(Box::new(Cursor::new(b"not a gzip stream".to_vec())))
            .unwrap();
        let mut out = Vec::new();
        assert!(decompress.read_to_end(&mut out).is_err());
    }
}
