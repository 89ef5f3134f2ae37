//! End-to-end archive dispatch: workspace policy, path scheme, and the
//! artifact-path rewrite on the work.

use std::path::{Path, PathBuf};

use conveyor_common::{ArchiveMethod, Site, Work, Workspace};

fn workspace(mount: &Path, methods: &str, storage: &str) -> Workspace {
    let raw = format!(
        r#"
workspace: testing
sites: [local]
archive:
  mounts:
    local: {}
config:
  archive:
    products:
      methods: [{methods}]
      storage: {storage}
    plots:
      methods: [{methods}]
      storage: {storage}
    results: true
"#,
        mount.display()
    );
    Workspace::from_yaml(&raw).unwrap()
}

fn archived_work(dir: &Path) -> Work {
    let product = dir.join("spectra.h5");
    let plot = dir.join("waterfall.png");
    std::fs::write(&product, b"data").unwrap();
    std::fs::write(&plot, b"plot").unwrap();
    let mut work = Work::new("demo", Site::Local, "tester").unwrap();
    work.id = Some("abc123".into());
    work.products = Some(vec![product.display().to_string()]);
    work.plots = Some(vec![plot.display().to_string()]);
    work
}

fn archive_dir(work: &Work, mount: &Path) -> PathBuf {
    let date = chrono::Local::now().format("%Y%m%d").to_string();
    mount.join("workflow").join(date).join("demo").join("abc123")
}

#[tokio::test]
async fn copy_archives_and_rewrites_paths() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = workspace(dir.path(), "bypass, copy, delete, move", "posix");
    let mut work = archived_work(dir.path());
    let original = work.products.clone().unwrap();

    conveyor_archive::run(&mut work, &workspace).await;

    let dest = archive_dir(&work, dir.path());
    let archived = work.products.unwrap();
    assert_eq!(
        archived[0],
        dest.join("spectra.h5").display().to_string()
    );
    assert!(Path::new(&archived[0]).exists());
    assert!(Path::new(&original[0]).exists());
}

#[tokio::test]
async fn move_archives_and_removes_source() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = workspace(dir.path(), "bypass, copy, delete, move", "posix");
    let mut work = archived_work(dir.path());
    work.config.archive.products = ArchiveMethod::Move;
    let original = work.products.clone().unwrap();

    conveyor_archive::run(&mut work, &workspace).await;

    assert!(!Path::new(&original[0]).exists());
    assert!(Path::new(&work.products.unwrap()[0]).exists());
}

#[tokio::test]
async fn delete_empties_artifact_list() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = workspace(dir.path(), "bypass, copy, delete, move", "posix");
    let mut work = archived_work(dir.path());
    work.config.archive.plots = ArchiveMethod::Delete;
    let original = work.plots.clone().unwrap();

    conveyor_archive::run(&mut work, &workspace).await;

    assert!(!Path::new(&original[0]).exists());
    assert_eq!(work.plots, Some(vec![]));
}

#[tokio::test]
async fn disallowed_method_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    // Workspace only allows bypass; work asks for copy.
    let workspace = workspace(dir.path(), "bypass", "posix");
    let mut work = archived_work(dir.path());
    let original = work.products.clone().unwrap();

    conveyor_archive::run(&mut work, &workspace).await;

    // Nothing moved, nothing rewritten.
    assert_eq!(work.products.unwrap(), original);
    assert!(Path::new(&original[0]).exists());
}

#[tokio::test]
async fn missing_mount_skips_archival() {
    let dir = tempfile::tempdir().unwrap();
    let raw = "workspace: empty\nsites: [local]\n";
    let workspace = Workspace::from_yaml(raw).unwrap();
    let mut work = archived_work(dir.path());
    let original = work.products.clone().unwrap();

    conveyor_archive::run(&mut work, &workspace).await;

    assert_eq!(work.products.unwrap(), original);
}

#[test]
fn destination_follows_the_path_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = workspace(dir.path(), "copy", "posix");
    let mut work = Work::new("demo", Site::Local, "tester").unwrap();
    work.id = Some("abc123".into());

    let dest = conveyor_archive::destination(&work, &workspace).unwrap();
    assert_eq!(dest, archive_dir(&work, dir.path()));

    // Works without an assigned id cannot be archived.
    work.id = None;
    assert!(conveyor_archive::destination(&work, &workspace).is_none());
}
