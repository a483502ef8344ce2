#![allow(clippy::unwrap_used, missing_docs)]

use std::fs;

use pathgraph::{GraphOptions, PathGraph, WalkOptions};
use tempfile::TempDir;

fn scratch_graph(tmp: &TempDir) -> (PathGraph, String) {
    // Canonicalize so symlinked temp roots (e.g. /tmp on some hosts) don't
    // skew path comparisons.
    let root = tmp
        .path()
        .canonicalize()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    let pg = PathGraph::new(GraphOptions::new().cwd(root.as_str())).unwrap();
    (pg, root)
}

#[test]
fn readdir_sees_real_entries() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("sub")).unwrap();
    fs::write(tmp.path().join("file.txt"), b"hello").unwrap();
    let (pg, _root) = scratch_graph(&tmp);

    let kids = pg.readdir_sync(pg.cwd());
    let mut names: Vec<String> = kids.iter().map(|&id| pg.basename(id)).collect();
    names.sort();
    assert_eq!(names, ["file.txt", "sub"]);

    let file = kids
        .iter()
        .copied()
        .find(|&id| pg.is_named(id, "file.txt"))
        .unwrap();
    assert!(pg.is_file(file));
}

#[test]
fn lstat_reads_real_sizes() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("five.bin"), b"12345").unwrap();
    let (pg, _root) = scratch_graph(&tmp);

    let id = pg.lstat_sync("five.bin").expect("file exists");
    let stat = pg.stat(id).expect("stat captured");
    assert_eq!(stat.size, 5);
}

#[test]
fn walk_collects_a_real_tree() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("a/b")).unwrap();
    fs::write(tmp.path().join("a/one"), b"1").unwrap();
    fs::write(tmp.path().join("a/b/two"), b"2").unwrap();
    let (pg, root) = scratch_graph(&tmp);

    let mut paths = pg.walk_paths_sync(pg.cwd(), WalkOptions::default());
    paths.sort();
    let expect: Vec<String> = ["", "/a", "/a/b", "/a/b/two", "/a/one"]
        .iter()
        .map(|suffix| format!("{root}{suffix}"))
        .collect();
    assert_eq!(paths, expect);
}

#[test]
fn missing_entries_resolve_to_nothing() {
    let tmp = TempDir::new().unwrap();
    let (pg, _root) = scratch_graph(&tmp);

    assert!(pg.lstat_sync("no/such/thing").is_none());
    assert!(pg.readdir_sync("no/such/thing").is_empty());
}

#[tokio::test]
async fn async_provider_reads_the_real_tree() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("x"), b"x").unwrap();
    let (pg, _root) = scratch_graph(&tmp);

    let kids = pg.readdir(pg.cwd()).await;
    assert_eq!(kids.len(), 1);
    assert!(pg.is_named(kids[0], "x"));
    assert!(pg.lstat(kids[0]).await.is_some());
}

#[cfg(unix)]
#[test]
fn symlinks_resolve_through_the_real_fs() {
    use std::os::unix::fs::symlink;

    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("target")).unwrap();
    symlink("target", tmp.path().join("link")).unwrap();
    let (pg, root) = scratch_graph(&tmp);

    pg.readdir_sync(pg.cwd());
    let link = pg.node("link");
    assert!(pg.is_symlink(link));

    let resolved = pg.readlink_sync(link).expect("target resolves");
    assert_eq!(pg.fullpath(resolved), format!("{root}/target"));

    let real = pg.realpath_sync(link).expect("realpath resolves");
    assert_eq!(pg.fullpath(real), format!("{root}/target"));
}

#[cfg(unix)]
#[test]
fn follow_walks_through_real_symlinked_dirs() {
    use std::os::unix::fs::symlink;

    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("real")).unwrap();
    fs::write(tmp.path().join("real/inner"), b"i").unwrap();
    symlink("real", tmp.path().join("alias")).unwrap();
    let (pg, root) = scratch_graph(&tmp);

    let paths = pg.walk_paths_sync(pg.cwd(), WalkOptions::default().follow(true));
    assert!(paths.contains(&format!("{root}/real/inner")));
    // The aliased directory's contents are reached exactly once.
    let inner_count = paths
        .iter()
        .filter(|p| p.ends_with("/inner"))
        .count();
    assert_eq!(inner_count, 1);
}
