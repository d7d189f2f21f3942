use bytepipe::pipeline::Pipeline;
use bytepipe::registry::Registry;
use std::fs;
use std::path::Path;

fn write_config(dir: &Path, doc: &str) -> std::path::PathBuf {
    let path = dir.join("pipeline.json");
    fs::write(&path, doc).unwrap();
    path
}

#[test]
fn file_to_file_through_rot13() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    fs::write(&input, b"Hello World").unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"{{
                "input": {{"type": "file", "config": {{"path": "{}"}}}},
                "filters": {{"type": "rot13"}},
                "output": {{"type": "file", "config": {{"path": "{}"}}}}
            }}"#,
            input.display(),
            output.display()
        ),
    );

    let copied = Pipeline::new(&config, &Registry::with_defaults())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(copied, 11);
    assert_eq!(fs::read(&output).unwrap(), b"Uryyb Jbeyq");
}

#[test]
fn compression_chain_is_transparent() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    let data: Vec<u8> = (0..1 << 16).map(|i| (i % 251) as u8).collect();
    fs::write(&input, &data).unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"{{
                "input": {{"type": "file", "config": {{"path": "{}"}}}},
                "filters": {{"type": "gzip", "next": {{"type": "gunzip"}}}},
                "output": {{"type": "file", "config": {{"path": "{}"}}}}
            }}"#,
            input.display(),
            output.display()
        ),
    );

    Pipeline::new(&config, &Registry::with_defaults())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(fs::read(&output).unwrap(), data);
}

#[test]
fn subprocess_filter_runs_inside_a_chain() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    fs::write(&input, b"through the child").unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"{{
                "input": {{"type": "file", "config": {{"path": "{}"}}}},
                "filters": {{"type": "rot13", "next": {{"type": "command", "config": {{"command": "cat"}}, "next": {{"type": "rot13"}}}}}},
                "output": {{"type": "file", "config": {{"path": "{}"}}}}
            }}"#,
            input.display(),
            output.display()
        ),
    );

    Pipeline::new(&config, &Registry::with_defaults())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(fs::read(&output).unwrap(), b"through the child");
}

#[test]
fn tar_tree_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("tree");
    fs::create_dir_all(tree.join("docs")).unwrap();
    fs::write(tree.join("docs/readme.md"), b"# backup me").unwrap();
    let restore = dir.path().join("restore");
    fs::create_dir(&restore).unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"{{
                "input": {{"type": "tar", "config": {{"path": "{}"}}}},
                "filters": {{"type": "snappy", "next": {{"type": "unsnappy"}}}},
                "output": {{"type": "untar", "config": {{"path": "{}"}}}}
            }}"#,
            tree.display(),
            restore.display()
        ),
    );

    Pipeline::new(&config, &Registry::with_defaults())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(
        fs::read(restore.join("tree/docs/readme.md")).unwrap(),
        b"# backup me"
    );
}

#[test]
fn failing_subprocess_sink_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, b"doomed").unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"{{
                "input": {{"type": "file", "config": {{"path": "{}"}}}},
                "output": {{"type": "command", "config": {{"command": "false"}}}}
            }}"#,
            input.display()
        ),
    );

    let res = Pipeline::new(&config, &Registry::with_defaults())
        .unwrap()
        .run();
    assert!(res.is_err());
}
