mod common;

use common::{test_config, write_file};
use dircrypt::{scan_directory, Engine, EngineError};
use tempfile::TempDir;

#[test]
fn counts_files_folders_and_bytes() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"0123456789");
    write_file(dir.path(), "empty", b"");
    write_file(dir.path(), "nested/deeper/b.bin", &[7u8; 100]);
    std::fs::create_dir(dir.path().join("hollow")).unwrap();

    let info = Engine::new(&test_config()).scan(dir.path(), true).unwrap();
    assert_eq!(info.file_count, 3);
    assert_eq!(info.folder_count, 3);
    assert_eq!(info.total_size_bytes, 110);
    assert_eq!(info.unreadable_entries, 0);
    assert_eq!(info.operating_system, std::env::consts::OS);
}

#[test]
fn scanning_is_repeatable_and_read_only() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "x/y.txt", b"hello");

    let first = scan_directory(dir.path()).unwrap();
    let second = scan_directory(dir.path()).unwrap();
    assert_eq!(first.files, second.files);
    assert_eq!(common::snapshot(dir.path()), vec![("x/y.txt".to_string(), b"hello".to_vec())]);
}

#[test]
fn single_file_scan() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "one.txt", b"abc");

    let info = Engine::new(&test_config())
        .scan(&dir.path().join("one.txt"), false)
        .unwrap();
    assert_eq!((info.file_count, info.folder_count, info.total_size_bytes), (1, 0, 3));
}

#[test]
fn missing_root_is_path_not_found() {
    let dir = TempDir::new().unwrap();
    let result = scan_directory(&dir.path().join("nope"));
    assert!(matches!(result, Err(EngineError::PathNotFound(_))));
}

#[test]
fn file_root_is_not_a_directory() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "f", b"");
    let result = scan_directory(&dir.path().join("f"));
    assert!(matches!(result, Err(EngineError::InvalidParameters(_))));
}

#[cfg(unix)]
#[test]
fn symlinks_are_never_followed() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "real/data.txt", b"data");
    std::os::unix::fs::symlink(dir.path(), dir.path().join("real/loop")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("real/data.txt"), dir.path().join("alias.txt")).unwrap();

    let scan = scan_directory(dir.path()).unwrap();
    assert_eq!(scan.file_count(), 1);
    assert_eq!(scan.folder_count(), 1);
    assert_eq!(scan.skipped.len(), 2);

    let info = dircrypt::OperationalInfo::from_scan(&scan);
    assert_eq!(info.skipped_links, 2);
}

#[cfg(unix)]
#[test]
fn unreadable_subdirectory_is_an_entry_error() {
    use std::fs::{self, Permissions};
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"alpha");
    write_file(dir.path(), "locked/hidden.txt", b"secret");
    write_file(dir.path(), "z.txt", b"zulu");
    let locked = dir.path().join("locked");
    fs::set_permissions(&locked, Permissions::from_mode(0o000)).unwrap();

    // Privileged users read through mode bits; nothing to check then.
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let scan = scan_directory(dir.path());
    fs::set_permissions(&locked, Permissions::from_mode(0o755)).unwrap();
    let scan = scan.unwrap();

    assert_eq!(scan.errors.len(), 1);
    assert_eq!(scan.errors[0].path, locked);
    assert!(matches!(scan.errors[0].error, EngineError::PermissionDenied(_)));
    let names: Vec<_> = scan.files.iter().map(|f| f.path.file_name().unwrap().to_owned()).collect();
    assert_eq!(names, vec!["a.txt", "z.txt"]);
}
