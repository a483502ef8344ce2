#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::rc::Rc;

use common::MockFs;
use pathgraph::{FsProvider, GraphError, GraphOptions, PathGraph, Platform};

fn graph_at(cwd: &str, fs: &Rc<MockFs>) -> PathGraph {
    PathGraph::new(
        GraphOptions::new()
            .cwd(cwd)
            .platform(Platform::Posix)
            .provider(Rc::clone(fs) as Rc<dyn FsProvider>),
    )
    .expect("posix graph")
}

#[test]
fn resolve_joins_right_to_left() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/home/me", &fs);

    assert_eq!(pg.resolve(&["a", "b"]), "/home/me/a/b");
    assert_eq!(pg.resolve(&["ignored", "/abs", "x"]), "/abs/x");
    assert_eq!(pg.resolve(&["a", "..", "b"]), "/home/me/b");
    assert_eq!(pg.resolve(&["a/b/../c"]), "/home/me/a/c");
}

#[test]
fn resolve_composes() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/home/me", &fs);

    let ab = pg.resolve(&["a", "b"]);
    assert_eq!(pg.resolve(&[ab.as_str(), "c"]), pg.resolve(&["a", "b", "c"]));
}

#[test]
fn resolve_boundaries() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/home/me", &fs);

    assert_eq!(pg.resolve(&[]), "/home/me");
    assert_eq!(pg.resolve(&[""]), "/home/me");
    assert_eq!(pg.resolve(&["."]), "/home/me");
    // Dot-dot never escapes the root.
    assert_eq!(pg.resolve(&["/.."]), "/");
    assert_eq!(pg.resolve(&["/../../.."]), "/");
    assert_eq!(pg.node("/.."), pg.node("/"));
}

#[test]
fn dirname_basename_round_trip() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/", &fs);

    for path in ["/a/b/c", "/x", "/a/b"] {
        let full = pg.resolve(&[path]);
        let rejoined = format!("{}/{}", pg.dirname(path), pg.basename(path));
        assert_eq!(pg.node(rejoined.as_str()), pg.node(full.as_str()));
    }
    // Root edge case: the dirname of a root is the root itself.
    assert_eq!(pg.dirname("/"), "/");
    assert_eq!(pg.basename("/"), "/");
}

#[test]
fn depth_counts_from_the_root() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/", &fs);

    assert_eq!(pg.depth("/"), 0);
    assert_eq!(pg.depth("/a"), 1);
    assert_eq!(pg.depth("/a/b/c"), 3);
}

#[test]
fn relative_paths_hang_off_the_cwd() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/a/b/c", &fs);

    assert_eq!(pg.relative(pg.cwd()), "");
    assert_eq!(pg.relative("/a/b"), "..");
    assert_eq!(pg.relative("/a"), "../..");
    assert_eq!(pg.relative("/a/b/f"), "../f");
    assert_eq!(pg.relative("/a/b/c/deep/er"), "deep/er");
    assert_eq!(pg.relative_posix("/a"), "../..");
}

#[test]
fn relative_escapes_the_cwd_chain_through_the_root() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/a/b/c", &fs);

    // Targets that share cwd's root but sit outside its ancestor chain
    // climb all the way up before descending.
    assert_eq!(pg.relative("/z"), "../../../z");
    assert_eq!(pg.relative_posix("/z"), "../../../z");
    assert_eq!(pg.relative("/a/q"), "../../q");
    assert_eq!(pg.relative("/z/deep/er"), "../../../z/deep/er");
    // The root itself is pure ascent.
    assert_eq!(pg.relative("/"), "../../..");
    assert_eq!(pg.relative_posix("/"), "../../..");
}

#[test]
fn relative_with_the_root_as_cwd() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/", &fs);

    assert_eq!(pg.relative(pg.cwd()), "");
    assert_eq!(pg.relative_posix(pg.cwd()), "");
    assert_eq!(pg.relative("/z"), "z");
    assert_eq!(pg.relative("/a/b"), "a/b");
    assert_eq!(pg.relative_posix("/a/b"), "a/b");
}

#[test]
fn chdir_rewrites_relative_strings() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/a/b/c", &fs);

    // Prime the memoized relatives along the cwd chain.
    assert_eq!(pg.relative("/a/b"), "..");
    assert_eq!(pg.relative("/a"), "../..");

    pg.chdir("/a");
    assert_eq!(pg.relative(pg.cwd()), "");
    assert_eq!(pg.relative("/a"), "");
    assert_eq!(pg.relative("/a/b"), "b");
    assert_eq!(pg.relative("/a/b/f"), "b/f");
    assert_eq!(pg.cwd(), pg.node("/a"));
}

#[test]
fn chdir_invalidates_the_resolve_cache() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/one", &fs);

    assert_eq!(pg.resolve(&["x"]), "/one/x");
    pg.chdir("/two");
    assert_eq!(pg.resolve(&["x"]), "/two/x");
}

#[test]
fn chdir_accepts_relative_paths() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/a", &fs);

    pg.chdir("b/c");
    assert_eq!(pg.fullpath(pg.cwd()), "/a/b/c");
    pg.chdir("..");
    assert_eq!(pg.fullpath(pg.cwd()), "/a/b");
}

#[test]
fn is_named_survives_unicode_normalization() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/", &fs);

    // Interned composed, queried decomposed.
    let composed = pg.node("/caf\u{e9}");
    assert!(pg.is_named(composed, "cafe\u{301}"));
    assert_eq!(pg.node("/cafe\u{301}"), composed);
}

#[test]
fn resolve_posix_matches_resolve_on_posix() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/srv", &fs);

    assert_eq!(pg.resolve_posix(&["a", "b"]), pg.resolve(&["a", "b"]));
}

#[test]
fn repeated_resolves_share_interned_nodes() {
    let fs = Rc::new(MockFs::new());
    let pg = graph_at("/", &fs);

    let first = pg.node("/deep/tree/leaf");
    let second = pg.node("deep/tree/leaf");
    assert_eq!(first, second);
}

// ── Construction ────────────────────────────────────────────────────────

#[test]
fn relative_cwd_resolves_against_the_host() {
    let pg = PathGraph::new(GraphOptions::new().platform(Platform::host()))
        .expect("host defaults");
    // The host cwd is absolute, so the graph's cwd must be too.
    assert!(
        Platform::host().is_absolute(&pg.fullpath(pg.cwd())),
        "cwd must resolve to an absolute path"
    );
}

#[test]
fn file_url_cwd_is_accepted() {
    let fs = Rc::new(MockFs::new());
    let pg = PathGraph::new(
        GraphOptions::new()
            .cwd("file:///srv/data%20dir")
            .platform(Platform::Posix)
            .provider(Rc::clone(&fs) as Rc<dyn FsProvider>),
    )
    .expect("file URL cwd");
    assert_eq!(pg.fullpath(pg.cwd()), "/srv/data dir");
}

#[test]
fn malformed_file_url_is_rejected() {
    let err = PathGraph::new(
        GraphOptions::new()
            .cwd("file://remotehost/srv")
            .platform(Platform::Posix),
    )
    .expect_err("non-local authority");
    assert!(matches!(err, GraphError::InvalidFileUrl(_)));
}
