use std::fs;

use knit_util::path_processing::{RunPathOptions, find_up, is_dir, is_file, path_exists, run_path, temp_file_name_in};
use tempfile::tempdir;

#[test]
fn existence_checks_never_error() {
    let root = tempdir().unwrap();
    let file = root.path().join("data.txt");
    fs::write(&file, "hello").unwrap();

    assert!(path_exists(&file));
    assert!(is_file(&file));
    assert!(!is_dir(&file));

    assert!(path_exists(root.path()));
    assert!(is_dir(root.path()));
    assert!(!is_file(root.path()));

    let missing = root.path().join("missing");
    assert!(!path_exists(&missing));
    assert!(!is_file(&missing));
    assert!(!is_dir(&missing));
}

#[test]
fn find_up_returns_nearest_match() {
    let root = tempdir().unwrap();
    let nested = root.path().join("a").join("b").join("c");
    fs::create_dir_all(&nested).unwrap();
    fs::write(root.path().join("marker.toml"), "").unwrap();
    fs::write(root.path().join("a").join("marker.toml"), "").unwrap();

    assert_eq!(find_up("marker.toml", &nested), Some(root.path().join("a").join("marker.toml")));
    assert_eq!(find_up("marker.toml", root.path()), Some(root.path().join("marker.toml")));
    assert_eq!(find_up("knit-no-such-file.d0e8", &nested), None);
}

#[test]
fn temp_names_do_not_exist_yet() {
    let root = tempdir().unwrap();
    let candidate = temp_file_name_in(root.path(), Some("log"));
    assert!(!path_exists(&candidate));
    assert!(candidate.to_string_lossy().ends_with(".log"));
}

#[cfg(unix)]
#[test]
fn run_path_falls_back_to_process_path() {
    let root = tempdir().unwrap();
    let options = RunPathOptions {
        cwd: root.path().to_path_buf(),
        add_exec_path: false,
        ..RunPathOptions::default()
    };

    temp_env::with_var("PATH", Some("/custom/bin"), || {
        let joined = run_path(&options).unwrap();
        let entries: Vec<_> = std::env::split_paths(&joined).collect();
        assert_eq!(entries.first(), Some(&root.path().join("node_modules/.bin")));
        assert_eq!(entries.last(), Some(&std::path::PathBuf::from("/custom/bin")));
    });
}
