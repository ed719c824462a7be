//! Overlay view over a real directory tree.

use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use scribe::overlay::{TokioFileSource, VirtualFileSystem};
use scribe::protocol::extract_edits;

fn app() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/a.ts"), "export const a = 1;").unwrap();
    fs::write(dir.path().join("src/old.ts"), "legacy").unwrap();
    fs::write(dir.path().join("src/keep.ts"), "kept").unwrap();
    dir
}

#[tokio::test]
async fn pending_edits_shadow_the_disk_without_touching_it() {
    let dir = app();
    let mut overlay = VirtualFileSystem::new(dir.path(), Arc::new(TokioFileSource));
    overlay.apply_changes(&extract_edits(concat!(
        "<delete path=\"src/old.ts\"></delete>",
        "<rename from=\"src/keep.ts\" to=\"src/moved.ts\"></rename>",
        "<write path=\"src/a.ts\">export const a = 2;</write>",
        "<write path=\"./src/new.ts\">fresh</write>",
    )));

    assert_eq!(
        overlay.read_file("src/a.ts").await.unwrap().as_deref(),
        Some("export const a = 2;")
    );
    assert_eq!(overlay.read_file("src/new.ts").await.unwrap().as_deref(), Some("fresh"));
    assert_eq!(overlay.read_file("src/moved.ts").await.unwrap().as_deref(), Some("kept"));
    assert_eq!(overlay.read_file("src/keep.ts").await.unwrap(), None);
    assert_eq!(overlay.read_file("src/old.ts").await.unwrap(), None);
    assert!(!overlay.file_exists("src/old.ts").await);
    assert!(overlay.file_exists("src/moved.ts").await);

    let absolute = dir.path().join("src/a.ts");
    assert_eq!(
        overlay.read_file(&absolute.to_string_lossy()).await.unwrap().as_deref(),
        Some("export const a = 2;")
    );

    assert_eq!(overlay.pending_writes(), vec!["src/a.ts", "src/new.ts"]);
    assert_eq!(overlay.deleted_paths(), vec!["src/keep.ts", "src/old.ts"]);

    assert_eq!(fs::read_to_string(dir.path().join("src/a.ts")).unwrap(), "export const a = 1;");
    assert!(dir.path().join("src/old.ts").exists());
    assert!(!dir.path().join("src/new.ts").exists());
}

#[tokio::test]
async fn untouched_and_missing_files_read_through() {
    let dir = app();
    let overlay = VirtualFileSystem::new(dir.path(), Arc::new(TokioFileSource));

    assert_eq!(overlay.read_file("src/old.ts").await.unwrap().as_deref(), Some("legacy"));
    assert_eq!(overlay.read_file("src/nope.ts").await.unwrap(), None);
    assert!(!overlay.file_exists("src").await, "directories are not files");
}

#[tokio::test]
async fn rewriting_a_deleted_path_restores_it() {
    let dir = app();
    let mut overlay = VirtualFileSystem::new(dir.path(), Arc::new(TokioFileSource));
    overlay.apply_changes(&extract_edits(
        "<delete path=\"src/old.ts\"></delete><write path=\"src/old.ts\">reborn</write>",
    ));
    assert_eq!(overlay.read_file("src/old.ts").await.unwrap().as_deref(), Some("reborn"));
    assert!(overlay.deleted_paths().is_empty());
}
