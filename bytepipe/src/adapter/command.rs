use crate::config::StageConf;
use crate::relay::{relay, RelayReader, DEFAULT_RELAY_CAPACITY};
use crate::stage::{Filter, Sink, Source};
use crate::{PipeError, PipeErrorKind, PipeResult};
use log::error;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;

/// Create a source reading the standard output of the subprocess given by the `command` config
/// key. A non-zero exit is reported as a stream error, never as a clean end-of-stream.
pub fn new_source(conf: &StageConf) -> PipeResult<Source> {
    let mut child = spawn(conf, Stdio::null(), Stdio::piped())?;
    let stdout = child.stdout.take().expect("child stdout is piped");
    Ok(Box::new(pump_child(child, stdout)))
}

/// Create a filter piping bytes through the subprocess given by the `command` config key: the
/// upstream is fed to its standard input, its standard output becomes this filter's stream.
pub fn new_filter(conf: &StageConf) -> PipeResult<Box<dyn Filter>> {
    let mut child = spawn(conf, Stdio::piped(), Stdio::piped())?;
    let stdin = child.stdin.take().expect("child stdin is piped");
    let stdout = child.stdout.take().expect("child stdout is piped");
    Ok(Box::new(CommandFilter {
        stdin: Some(stdin),
        reader: pump_child(child, stdout),
    }))
}

/// Create a sink feeding writes to the standard input of the subprocess given by the `command`
/// config key. Closing the sink closes the child's input and waits for it to exit.
pub fn new_sink(conf: &StageConf) -> PipeResult<Box<dyn Sink>> {
    let mut child = spawn(conf, Stdio::piped(), Stdio::inherit())?;
    let stdin = child.stdin.take().expect("child stdin is piped");
    Ok(Box::new(CommandSink {
        stdin: Some(stdin),
        child,
    }))
}

fn spawn(conf: &StageConf, stdin: Stdio, stdout: Stdio) -> PipeResult<Child> {
    let line = conf.get("command").map(String::as_str).unwrap_or("");
    if line.is_empty() {
        return Err(PipeError::parameter("command"));
    }
    let parts = shlex::split(line).ok_or_else(|| {
        PipeError::new_msg(
            PipeErrorKind::Parameter("command".to_string()),
            format!("couldn't parse command line {:?}", line),
        )
    })?;
    let (program, args) = parts
        .split_first()
        .ok_or_else(|| PipeError::parameter("command"))?;

    Command::new(program)
        .args(args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            PipeError::new_io(
                PipeErrorKind::Parameter(format!("command {}", program)),
                e,
            )
        })
}

/// Pump the child's standard output into a relay on a worker which also reaps the child. The
/// worker owns the child handle exclusively from here until it observes process exit, and closes
/// the relay with an error if the child exits unsuccessfully.
fn pump_child(mut child: Child, mut stdout: impl Read + Send + 'static) -> RelayReader {
    let (mut writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
    thread::spawn(move || {
        let copied = io::copy(&mut stdout, &mut writer);
        let status = child.wait();
        match (copied, status) {
            (Ok(_), Ok(status)) if status.success() => writer.finish(),
            (Ok(_), Ok(status)) => writer.fail(io::Error::new(
                io::ErrorKind::Other,
                format!("command exited with {}", status),
            )),
            (Ok(_), Err(e)) | (Err(e), _) => {
                error!("command worker failed: {}", e);
                writer.fail(e);
            }
        }
    });
    reader
}

struct CommandFilter {
    stdin: Option<ChildStdin>,
    reader: RelayReader,
}

impl Read for CommandFilter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // without an upstream the child never sees input and may never produce output
        if self.stdin.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "command filter is not linked",
            ));
        }
        self.reader.read(buf)
    }
}

impl Filter for CommandFilter {
    fn link(&mut self, mut upstream: Source) -> PipeResult<()> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| PipeError::new_msg(
                PipeErrorKind::Link("command".to_string()),
                "command filter is already linked".to_string(),
            ))?;
        thread::spawn(move || {
            if let Err(e) = io::copy(&mut upstream, &mut stdin) {
                // the child sees its input close early and decides its own exit status; a
                // failure surfaces through the stdout worker
                error!("feeding command input failed: {}", e);
            }
            // dropping stdin closes the child's input
        });
        Ok(())
    }
}

struct CommandSink {
    stdin: Option<ChildStdin>,
    child: Child,
}

impl Write for CommandSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stdin {
            Some(ref mut stdin) => stdin.write(buf),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "command sink is closed",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stdin {
            Some(ref mut stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl Sink for CommandSink {
    fn close(&mut self) -> PipeResult<()> {
        // closing stdin lets the child observe end-of-stream and exit
        self.stdin.take();
        let status = self
            .child
            .wait()
            .map_err(|e| PipeError::new_io(PipeErrorKind::Close, e))?;
        if !status.success() {
            return Err(PipeError::new_msg(
                PipeErrorKind::Close,
                format!("command exited with {}", status),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{new_filter, new_source};
    use crate::config::StageConf;
    use std::io::Read;

    fn conf(command: &str) -> StageConf {
        let mut conf = StageConf::new();
        conf.insert("command".to_string(), command.to_string());
        conf
    }

    #[test]
    fn missing_command_is_rejected() {
        assert!(new_source(&StageConf::new()).is_err());
        assert!(new_filter(&StageConf::new()).is_err());
    }

    #[test]
    fn source_streams_command_output() {
        let mut source = new_source(&conf("echo hello")).unwrap();
        let mut out = String::new();
        source.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn filter_pipes_through_command() {
        let mut filter = new_filter(&conf("cat")).unwrap();
        filter
            .link(Box::new(std::io::Cursor::new(b"identity".to_vec())))
            .unwrap();
        let mut out = String::new();
        filter.read_to_string(&mut out).unwrap();
        assert_eq!(out, "identity");
    }

    #[test]
    fn nonzero_exit_is_a_stream_error() {
        let mut source = new_source(&conf("false")).unwrap();
        let mut out = Vec::new();
        assert!(source.read_to_end(&mut out).is_err());
    }
}
