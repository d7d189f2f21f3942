use crate::config::StageConf;
use crate::relay::{relay, BridgedSink, DEFAULT_RELAY_CAPACITY};
use crate::stage::{Sink, Source};
use crate::{PipeError, PipeErrorKind, PipeResult};
use log::error;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

/// Create a source streaming a tar archive of the directory tree (or single file) named by the
/// `path` config key. Entries are named relative to the tree root, so `/var/lib/app` packs as
/// `app/...`.
pub fn new_source(conf: &StageConf) -> PipeResult<Source> {
    let path = required_path(conf)?;
    if !path.exists() {
        return Err(PipeError::new_msg(
            PipeErrorKind::Parameter("path".to_string()),
            format!("{} does not exist", path.display()),
        ));
    }

    let (writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
    thread::spawn(move || {
        let mut builder = tar::Builder::new(writer);
        builder.follow_symlinks(false);
        let res = pack(&mut builder, &path).and_then(|_| builder.finish());
        match res {
            Ok(()) => builder.get_mut().finish(),
            Err(e) => {
                error!("packing {} failed: {}", path.display(), e);
                builder.get_mut().fail(e);
            }
        }
    });
    Ok(Box::new(reader))
}

/// Create a sink unpacking a tar stream into the existing directory named by the `path` config
/// key. Permissions, modification times and ownership recorded in the archive are restored.
pub fn new_sink(conf: &StageConf) -> PipeResult<Box<dyn Sink>> {
    let path = required_path(conf)?;
    if !path.is_dir() {
        return Err(PipeError::new_msg(
            PipeErrorKind::Parameter("path".to_string()),
            format!("{} is not an existing directory", path.display()),
        ));
    }

    let (writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
    let worker = thread::spawn(move || {
        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_preserve_ownerships(true);
        archive.unpack(&path)
    });
    Ok(Box::new(BridgedSink::new(writer, worker)))
}

fn required_path(conf: &StageConf) -> PipeResult<PathBuf> {
    let path = conf.get("path").map(String::as_str).unwrap_or("");
    if path.is_empty() {
        return Err(PipeError::parameter("path"));
    }
    Ok(PathBuf::from(path))
}

fn pack(builder: &mut tar::Builder<crate::relay::RelayWriter>, path: &Path) -> io::Result<()> {
    let name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    if path.is_dir() {
        builder.append_dir_all(&name, path)
    } else {
        builder.append_path_with_name(path, &name)
    }
}

#[cfg(test)]
mod tests {
    use super::{new_sink, new_source};
    use crate::config::StageConf;
    use crate::stage::Sink;
    use std::fs;
    use std::io::{Read, Write};
    use std::os::unix::fs::PermissionsExt;

    fn pathconf(path: &std::path::Path) -> StageConf {
        let mut conf = StageConf::new();
        conf.insert("path".to_string(), path.display().to_string());
        conf
    }

    #[test]
    fn missing_or_nonexistent_path_is_rejected() {
        assert!(new_source(&StageConf::new()).is_err());
        assert!(new_sink(&StageConf::new()).is_err());
        let gone = std::path::Path::new("/definitely/not/here");
        assert!(new_source(&pathconf(gone)).is_err());
        assert!(new_sink(&pathconf(gone)).is_err());
    }

    #[test]
    fn pack_then_unpack_restores_the_tree() {
        let src = tempfile::tempdir().unwrap();
        let tree = src.path().join("tree");
        fs::create_dir_all(tree.join("sub")).unwrap();
        fs::write(tree.join("a.txt"), b"Hello World").unwrap();
        fs::write(tree.join("sub/b.txt"), b"nested").unwrap();
        fs::set_permissions(tree.join("a.txt"), fs::Permissions::from_mode(0o750)).unwrap();

        let mut source = new_source(&pathconf(&tree)).unwrap();
        let mut archive = Vec::new();
        source.read_to_end(&mut archive).unwrap();
        // ustar magic at offset 257 of the first header block
        assert_eq!(&archive[257..262], b"ustar");

        let dst = tempfile::tempdir().unwrap();
        let mut sink = new_sink(&pathconf(dst.path())).unwrap();
        sink.write_all(&archive).unwrap();
        sink.close().unwrap();

        assert_eq!(
            fs::read(dst.path().join("tree/a.txt")).unwrap(),
            b"Hello World"
        );
        assert_eq!(
            fs::read(dst.path().join("tree/sub/b.txt")).unwrap(),
            b"nested"
        );
        let mode = fs::metadata(dst.path().join("tree/a.txt"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn garbage_stream_fails_at_close() {
        let dst = tempfile::tempdir().unwrap();
        let mut sink = new_sink(&pathconf(dst.path())).unwrap();
        // short garbage is buffered by the relay, the failure surfaces at close
        let _ = sink.write_all(&[0x42; 1024]);
        assert!(sink.close().is_err());
    }

    #[test]
    fn long_garbage_stream_reports_the_unpack_error() {
        let dst = tempfile::tempdir().unwrap();
        let mut sink = new_sink(&pathconf(dst.path())).unwrap();
        // far more chunks than the relay buffers, so writes outlive the worker; the error must
        // still be the unpack failure, not a broken relay
        let err = (0..512)
            .find_map(|_| sink.write_all(&[0x42; 65536]).err())
            .expect("writes should fail once unpacking died");
        assert!(!err.to_string().contains("relay reader closed"), "{}", err);
    }

    #[test]
    fn unpack_into_pre_existing_directories() {
        let src = tempfile::tempdir().unwrap();
        let tree = src.path().join("tree");
        fs::create_dir_all(tree.join("sub")).unwrap();
        fs::write(tree.join("sub/data.txt"), b"fresh").unwrap();

        let mut source = new_source(&pathconf(&tree)).unwrap();
        let mut archive = Vec::new();
        source.read_to_end(&mut archive).unwrap();

        // the destination already contains the directories the archive wants to create, plus an
        // unrelated file which must survive
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(dst.path().join("tree/sub")).unwrap();
        fs::write(dst.path().join("tree/keep.txt"), b"already here").unwrap();

        let mut sink = new_sink(&pathconf(dst.path())).unwrap();
        sink.write_all(&archive).unwrap();
        sink.close().unwrap();

        assert_eq!(
            fs::read(dst.path().join("tree/sub/data.txt")).unwrap(),
            b"fresh"
        );
        assert_eq!(
            fs::read(dst.path().join("tree/keep.txt")).unwrap(),
            b"already here"
        );
    }
}
