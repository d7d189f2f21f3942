use crate::config::StageConf;
use crate::stage::{Filter, Source};
use crate::{PipeError, PipeErrorKind, PipeResult};
use std::io::{self, Read};

/// Create a rot13 filter. The transform is its own inverse, so the same filter both "encrypts"
/// and "decrypts".
pub fn new(_conf: &StageConf) -> PipeResult<Box<dyn Filter>> {
    Ok(Box::new(Rot13Filter { upstream: None }))
}

/// A stateless per byte substitution applied on every pull. Linking only stores the upstream,
/// there is no worker thread.
struct Rot13Filter {
    upstream: Option<Source>,
}

impl Read for Rot13Filter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let upstream = self.upstream.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "rot13 filter is not linked")
        })?;
        let n = upstream.read(buf)?;
        for b in &mut buf[..n] {
            match *b {
                b'A'..=b'M' | b'a'..=b'm' => *b += 13,
                b'N'..=b'Z' | b'n'..=b'z' => *b -= 13,
                _ => {}
            }
        }
        Ok(n)
    }
}

impl Filter for Rot13Filter {
    fn link(&mut self, upstream: Source) -> PipeResult<()> {
        self.upstream = Some(upstream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::new;
    use crate::config::StageConf;
    use std::io::{Cursor, Read};

    fn apply(input: &[u8]) -> Vec<u8> {
        let mut filter = new(&StageConf::new()).unwrap();
        filter
            .link(Box::new(Cursor::new(input.to_vec())))
            .unwrap();
        let mut out = Vec::new();
        filter.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn rotates_both_cases_and_leaves_the_rest() {
        assert_eq!(apply(b"Hello World"), b"Uryyb Jbeyq");
    }

    #[test]
    fn is_its_own_inverse() {
        assert_eq!(apply(&apply(b"Hello World")), b"Hello World");
    }

    #[test]
    fn read_before_link_is_an_error() {
        let mut filter = new(&StageConf::new()).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            filter.read(&mut buf).unwrap_err().kind(),
            std::io::ErrorKind::NotConnected
        );
    }
}
