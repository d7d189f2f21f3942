use crate::config::StageConf;
use crate::relay::{relay, RelayWriter, DEFAULT_RELAY_CAPACITY};
use crate::stage::Source;
use crate::{PipeError, PipeErrorKind, PipeResult};
use log::error;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
const METADATA_ENTRY: &str = "container.json";

/// Create a source streaming a tar archive of a docker container's volumes, looked up over the
/// daemon's unix socket (`socket` config key, `/var/run/docker.sock` by default) by the `name`
/// config key. The archive leads with a `container.json` entry holding the daemon's raw inspect
/// response, followed by every volume tree with entries named after the host path minus the
/// leading slash. A container without volumes is a construction error.
pub fn new_source(conf: &StageConf) -> PipeResult<Source> {
    let name = conf.get("name").map(String::as_str).unwrap_or("");
    if name.is_empty() {
        return Err(PipeError::parameter("name"));
    }
    let socket = conf
        .get("socket")
        .map(String::as_str)
        .unwrap_or(DEFAULT_SOCKET)
        .to_string();

    let (container, metadata) = inspect(&socket, name).map_err(|e| {
        PipeError::new_msg(
            PipeErrorKind::Parameter("name".to_string()),
            format!("couldn't inspect container {}: {}", name, e),
        )
    })?;
    if container.volumes.is_empty() {
        return Err(PipeError::new_msg(
            PipeErrorKind::Parameter("name".to_string()),
            format!("container {} has no volumes", name),
        ));
    }

    let (writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
    thread::spawn(move || {
        let mut builder = tar::Builder::new(writer);
        builder.follow_symlinks(false);
        let res = store(&mut builder, &container, &metadata).and_then(|_| builder.finish());
        match res {
            Ok(()) => builder.get_mut().finish(),
            Err(e) => {
                error!("packing container volumes failed: {}", e);
                builder.get_mut().fail(e);
            }
        }
    });
    Ok(Box::new(reader))
}

fn store(
    builder: &mut tar::Builder<RelayWriter>,
    container: &ContainerInfo,
    metadata: &[u8],
) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(metadata.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    );
    builder.append_data(&mut header, METADATA_ENTRY, metadata)?;

    for path in container.volumes.values() {
        let name = path.strip_prefix('/').unwrap_or(path);
        builder.append_dir_all(name, Path::new(path))?;
    }
    Ok(())
}

/// One-shot HTTP/1.0 inspect request over the daemon socket. HTTP/1.0 keeps the exchange simple:
/// the daemon closes the connection after the response, so the body is everything after the
/// header block.
fn inspect(socket: &str, name: &str) -> io::Result<(ContainerInfo, Vec<u8>)> {
    let mut stream = UnixStream::connect(socket)?;
    write!(
        stream,
        "GET /containers/{}/json HTTP/1.0\r\nHost: docker\r\n\r\n",
        name
    )?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;

    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed daemon response"))?;
    let head = String::from_utf8_lossy(&response[..split]);
    let body = response[split + 4..].to_vec();

    let status: u16 = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed status line"))?;
    if !(200..400).contains(&status) {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("daemon returned HTTP {}: {}", status, String::from_utf8_lossy(&body)),
        ));
    }

    let container: ContainerInfo = serde_json::from_slice(&body)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok((container, body))
}

#[derive(Debug, Deserialize)]
struct ContainerInfo {
    #[serde(default, rename = "Volumes")]
    volumes: HashMap<String, String>,
}
