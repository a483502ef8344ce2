//! The graph handle and its query surface.
//!
//! [`PathGraph`] owns the arena state behind a `RefCell` and orchestrates
//! all provider IO around it. The graph is deliberately `!Sync`: everything
//! runs on one logical thread, async operations suspend only at provider
//! awaits, and no state borrow is ever held across an await.

use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::rc::Rc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::children::DEFAULT_CHILDREN_CACHE_SIZE;
use crate::flags::NodeState;
use crate::node::{GraphState, NodeId};
use crate::platform::{Platform, file_url_to_path, is_file_url};
use crate::provider::{FsErrorKind, FsProvider, RealFs, Stat};
use crate::resolve_cache::{ResolveCache, join_key};

/// An entry argument: either a path string (resolved against the cwd) or a
/// node handle from an earlier query.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    /// A relative or absolute path string.
    Path(&'a str),
    /// An existing node.
    Node(NodeId),
}

impl<'a> From<&'a str> for Entry<'a> {
    fn from(path: &'a str) -> Self {
        Self::Path(path)
    }
}

impl From<NodeId> for Entry<'_> {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

/// Why a graph could not be constructed. The only fallible public surface.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The cwd is not absolute under the selected platform, even after
    /// joining it to the host's working directory.
    #[error("invalid cwd {0:?}: not absolute for the selected platform")]
    InvalidCwd(String),
    /// The cwd was given as a `file://` URL that does not decode to a path.
    #[error("invalid file URL for cwd: {0:?}")]
    InvalidFileUrl(String),
    /// The host refused to report its working directory.
    #[error("could not read host working directory: {0}")]
    HostCwd(#[from] std::io::Error),
}

/// Construction options for [`PathGraph`], all defaulted from the host.
#[derive(Default)]
pub struct GraphOptions {
    cwd: Option<String>,
    platform: Option<Platform>,
    nocase: Option<bool>,
    children_cache_size: Option<usize>,
    provider: Option<Rc<dyn FsProvider>>,
}

impl GraphOptions {
    /// Start from all defaults: host platform, host cwd, host filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting working directory, as a path or `file://` URL.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Path conventions to speak, overriding host detection.
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Case-insensitive name matching, overriding the platform default.
    #[must_use]
    pub fn nocase(mut self, nocase: bool) -> Self {
        self.nocase = Some(nocase);
        self
    }

    /// Children-cache capacity in size units (a list costs `len + 1`).
    #[must_use]
    pub fn children_cache_size(mut self, units: usize) -> Self {
        self.children_cache_size = Some(units);
        self
    }

    /// Filesystem provider to consume instead of the host filesystem.
    #[must_use]
    pub fn provider(mut self, provider: Rc<dyn FsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// A cached filesystem path graph.
///
/// Stateful, aggressively caching counterpart to `resolve` / `lstat` /
/// `readdir` / `readlink` / `realpath` / recursive walks. Results reflect
/// the filesystem as first observed and may be out of date; there is no
/// invalidation short of building a new graph.
pub struct PathGraph {
    state: RefCell<GraphState>,
    provider: Rc<dyn FsProvider>,
    inflight: RefCell<HashMap<NodeId, watch::Receiver<()>>>,
    resolve_cache: RefCell<ResolveCache>,
    resolve_cache_posix: RefCell<ResolveCache>,
    platform: Platform,
    nocase: bool,
}

impl std::fmt::Debug for PathGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathGraph")
            .field("platform", &self.platform)
            .field("nocase", &self.nocase)
            .finish_non_exhaustive()
    }
}

impl PathGraph {
    /// Build a graph from `options`.
    pub fn new(options: GraphOptions) -> Result<Self, GraphError> {
        let platform = options.platform.unwrap_or_else(Platform::host);
        let nocase = options.nocase.unwrap_or_else(|| platform.nocase_default());
        let cache_units = options
            .children_cache_size
            .unwrap_or(DEFAULT_CHILDREN_CACHE_SIZE);
        let provider: Rc<dyn FsProvider> = options.provider.unwrap_or_else(|| Rc::new(RealFs));

        let raw = match options.cwd {
            Some(cwd) => cwd,
            None => env::current_dir()?.to_string_lossy().into_owned(),
        };
        let cwd = if is_file_url(&raw) {
            file_url_to_path(platform, &raw).ok_or(GraphError::InvalidFileUrl(raw))?
        } else {
            raw
        };
        let cwd = if platform.is_absolute(&cwd) {
            cwd
        } else {
            let base = env::current_dir()?.to_string_lossy().into_owned();
            let joined = format!("{base}{}{cwd}", platform.sep());
            if !platform.is_absolute(&joined) {
                return Err(GraphError::InvalidCwd(cwd));
            }
            joined
        };
        if platform.root_len(&cwd) == 0 {
            return Err(GraphError::InvalidCwd(cwd));
        }

        Ok(Self {
            state: RefCell::new(GraphState::new(platform, nocase, cache_units, &cwd)),
            provider,
            inflight: RefCell::new(HashMap::new()),
            resolve_cache: RefCell::new(ResolveCache::new()),
            resolve_cache_posix: RefCell::new(ResolveCache::new()),
            platform,
            nocase,
        })
    }

    /// The platform profile this graph speaks.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Whether name matching ignores case.
    #[must_use]
    pub fn nocase(&self) -> bool {
        self.nocase
    }

    /// The current working directory node.
    #[must_use]
    pub fn cwd(&self) -> NodeId {
        self.state.borrow().cwd
    }

    /// Intern an entry and return its node handle.
    ///
    /// Pure graph bookkeeping, no IO: unknown components come back as
    /// provisional nodes whose existence is unconfirmed until a readdir or
    /// lstat says otherwise.
    pub fn node<'a>(&self, entry: impl Into<Entry<'a>>) -> NodeId {
        self.entry_node(entry)
    }

    pub(crate) fn entry_node<'a>(&self, entry: impl Into<Entry<'a>>) -> NodeId {
        match entry.into() {
            Entry::Node(id) => id,
            Entry::Path(path) => {
                let mut st = self.state.borrow_mut();
                let cwd = st.cwd;
                st.resolve_from(cwd, path)
            }
        }
    }

    // ── String resolution ───────────────────────────────────────────────

    /// Resolve path segments against the cwd to an absolute native path.
    ///
    /// Segments combine right to left, stopping at the first absolute one.
    #[must_use]
    pub fn resolve(&self, segments: &[&str]) -> String {
        let key = join_key(self.platform, segments);
        if let Some(hit) = self.resolve_cache.borrow_mut().get(&key) {
            return hit;
        }
        let out = {
            let mut st = self.state.borrow_mut();
            let cwd = st.cwd;
            let node = st.resolve_from(cwd, &key);
            st.fullpath(node)
        };
        self.resolve_cache.borrow_mut().insert(key, out.clone());
        out
    }

    /// [`PathGraph::resolve`], emitting the forward-slash form.
    #[must_use]
    pub fn resolve_posix(&self, segments: &[&str]) -> String {
        let key = join_key(self.platform, segments);
        if let Some(hit) = self.resolve_cache_posix.borrow_mut().get(&key) {
            return hit;
        }
        let out = {
            let mut st = self.state.borrow_mut();
            let cwd = st.cwd;
            let node = st.resolve_from(cwd, &key);
            st.fullpath_posix(node)
        };
        self.resolve_cache_posix
            .borrow_mut()
            .insert(key, out.clone());
        out
    }

    /// Move the graph's cwd, rewriting affected cached relative strings.
    pub fn chdir(&self, path: &str) {
        {
            let mut st = self.state.borrow_mut();
            let old = st.cwd;
            let new = st.resolve_from(old, path);
            st.set_as_cwd(new, Some(old));
        }
        self.resolve_cache.borrow_mut().clear();
        self.resolve_cache_posix.borrow_mut().clear();
        debug!(path, "chdir");
    }

    // ── Entry accessors ─────────────────────────────────────────────────

    /// Basename of the entry.
    #[must_use]
    pub fn basename<'a>(&self, entry: impl Into<Entry<'a>>) -> String {
        let id = self.entry_node(entry);
        self.state.borrow().name(id)
    }

    /// Absolute path of the entry's parent (of the entry itself at a root).
    #[must_use]
    pub fn dirname<'a>(&self, entry: impl Into<Entry<'a>>) -> String {
        let id = self.entry_node(entry);
        let mut st = self.state.borrow_mut();
        let target = st.parent(id).unwrap_or(id);
        st.fullpath(target)
    }

    /// Path of the entry relative to the cwd, native separators.
    #[must_use]
    pub fn relative<'a>(&self, entry: impl Into<Entry<'a>>) -> String {
        let id = self.entry_node(entry);
        self.state.borrow_mut().relative(id)
    }

    /// Path of the entry relative to the cwd, forward slashes.
    #[must_use]
    pub fn relative_posix<'a>(&self, entry: impl Into<Entry<'a>>) -> String {
        let id = self.entry_node(entry);
        self.state.borrow_mut().relative_posix(id)
    }

    /// Depth below the root (roots are 0).
    #[must_use]
    pub fn depth<'a>(&self, entry: impl Into<Entry<'a>>) -> usize {
        let id = self.entry_node(entry);
        self.state.borrow_mut().depth(id)
    }

    /// Absolute native path of a node.
    #[must_use]
    pub fn fullpath(&self, id: NodeId) -> String {
        self.state.borrow_mut().fullpath(id)
    }

    /// Absolute forward-slash path of a node.
    #[must_use]
    pub fn fullpath_posix(&self, id: NodeId) -> String {
        self.state.borrow_mut().fullpath_posix(id)
    }

    /// Structural parent of a node; `None` at roots.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.state.borrow().parent(id)
    }

    /// The root node above `id`.
    #[must_use]
    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.state.borrow().root(id)
    }

    /// The node's packed type/state word.
    #[must_use]
    pub fn node_state(&self, id: NodeId) -> NodeState {
        self.state.borrow().flags(id)
    }

    /// Whether the node is known to be a directory.
    #[must_use]
    pub fn is_dir(&self, id: NodeId) -> bool {
        self.node_state(id).is_dir()
    }

    /// Whether the node is known to be a regular file.
    #[must_use]
    pub fn is_file(&self, id: NodeId) -> bool {
        self.node_state(id).is_file()
    }

    /// Whether the node is known to be a symbolic link.
    #[must_use]
    pub fn is_symlink(&self, id: NodeId) -> bool {
        self.node_state(id).is_symlink()
    }

    /// Whether the node's type has never been observed.
    #[must_use]
    pub fn is_unknown(&self, id: NodeId) -> bool {
        self.node_state(id).is_unknown()
    }

    /// Captured lstat fields, if an lstat has succeeded here.
    #[must_use]
    pub fn stat(&self, id: NodeId) -> Option<Stat> {
        self.state.borrow().stat(id)
    }

    /// Name comparison through normalized match keys.
    ///
    /// This is the only correct way to compare entry names: direct `name`
    /// comparison breaks on Unicode normalization differences and, on
    /// case-insensitive graphs, on case.
    #[must_use]
    pub fn is_named(&self, id: NodeId, name: &str) -> bool {
        self.state.borrow().is_named(id, name)
    }

    /// The already-resolved symlink target, if readlink has succeeded.
    #[must_use]
    pub fn cached_link_target(&self, id: NodeId) -> Option<NodeId> {
        self.state.borrow().link_target(id)
    }

    /// The already-resolved realpath, if realpath has succeeded.
    #[must_use]
    pub fn cached_realpath(&self, id: NodeId) -> Option<NodeId> {
        self.state.borrow().realpath_cached(id)
    }

    // ── Readdir ─────────────────────────────────────────────────────────

    /// List an entry's children, from cache when authoritative.
    ///
    /// Nodes that cannot have children yield an empty list without IO.
    /// Errors are absorbed into node state and also yield an empty list.
    pub fn readdir_sync<'a>(&self, entry: impl Into<Entry<'a>>) -> Vec<NodeId> {
        let id = self.entry_node(entry);
        let full = {
            let mut st = self.state.borrow_mut();
            if !st.flags(id).can_readdir() {
                return Vec::new();
            }
            st.ensure_children(id);
            if st.flags(id).contains(NodeState::READDIR_CALLED) {
                return st.real_children(id);
            }
            st.fullpath(id)
        };
        match self.provider.readdir_sync(&full) {
            Ok(entries) => self.state.borrow_mut().ingest_readdir(id, &entries),
            Err(e) => {
                debug!(path = %full, error = %e, "readdir failed");
                self.state
                    .borrow_mut()
                    .readdir_fail(id, FsErrorKind::classify(&e));
                Vec::new()
            }
        }
    }

    /// Async [`PathGraph::readdir_sync`].
    ///
    /// Single-flight per node: concurrent callers for one node share one
    /// provider call and observe its terminal state.
    pub async fn readdir<'a>(&self, entry: impl Into<Entry<'a>>) -> Vec<NodeId> {
        let id = self.entry_node(entry);
        let mut joined = false;
        loop {
            let full = {
                let mut st = self.state.borrow_mut();
                if !st.flags(id).can_readdir() {
                    return Vec::new();
                }
                st.ensure_children(id);
                if st.flags(id).contains(NodeState::READDIR_CALLED) {
                    return st.real_children(id);
                }
                if joined {
                    // The flight we joined failed and recorded its state;
                    // report what it left behind rather than reissuing.
                    return st.real_children(id);
                }
                st.fullpath(id)
            };

            let waiting = self.inflight.borrow().get(&id).cloned();
            if let Some(mut rx) = waiting {
                joined = true;
                // Err here just means the sender dropped, i.e. finished.
                let _ = rx.changed().await;
                continue;
            }

            let (tx, rx) = watch::channel(());
            self.inflight.borrow_mut().insert(id, rx);
            let result = self.provider.readdir(&full).await;
            self.inflight.borrow_mut().remove(&id);
            let out = match result {
                Ok(entries) => self.state.borrow_mut().ingest_readdir(id, &entries),
                Err(e) => {
                    debug!(path = %full, error = %e, "readdir failed");
                    self.state
                        .borrow_mut()
                        .readdir_fail(id, FsErrorKind::classify(&e));
                    Vec::new()
                }
            };
            drop(tx);
            return out;
        }
    }

    /// [`PathGraph::readdir_sync`], emitting full path strings.
    pub fn readdir_paths_sync<'a>(&self, entry: impl Into<Entry<'a>>) -> Vec<String> {
        self.readdir_sync(entry)
            .into_iter()
            .map(|id| self.fullpath(id))
            .collect()
    }

    /// [`PathGraph::readdir`], emitting full path strings.
    pub async fn readdir_paths<'a>(&self, entry: impl Into<Entry<'a>>) -> Vec<String> {
        let kids = self.readdir(entry).await;
        kids.into_iter().map(|id| self.fullpath(id)).collect()
    }

    // ── Lstat ───────────────────────────────────────────────────────────

    /// Stat the entry without following a final symlink.
    ///
    /// `None` when the node is known missing or the stat fails; failures
    /// are absorbed into node state.
    pub fn lstat_sync<'a>(&self, entry: impl Into<Entry<'a>>) -> Option<NodeId> {
        let id = self.entry_node(entry);
        let full = {
            let mut st = self.state.borrow_mut();
            if st.flags(id).contains(NodeState::ENOENT) {
                return None;
            }
            st.fullpath(id)
        };
        match self.provider.lstat_sync(&full) {
            Ok(stat) => {
                self.state.borrow_mut().apply_stat(id, stat);
                Some(id)
            }
            Err(e) => {
                debug!(path = %full, error = %e, "lstat failed");
                self.state
                    .borrow_mut()
                    .lstat_fail(id, FsErrorKind::classify(&e));
                None
            }
        }
    }

    /// Async [`PathGraph::lstat_sync`].
    pub async fn lstat<'a>(&self, entry: impl Into<Entry<'a>>) -> Option<NodeId> {
        let id = self.entry_node(entry);
        let full = {
            let mut st = self.state.borrow_mut();
            if st.flags(id).contains(NodeState::ENOENT) {
                return None;
            }
            st.fullpath(id)
        };
        match self.provider.lstat(&full).await {
            Ok(stat) => {
                self.state.borrow_mut().apply_stat(id, stat);
                Some(id)
            }
            Err(e) => {
                debug!(path = %full, error = %e, "lstat failed");
                self.state
                    .borrow_mut()
                    .lstat_fail(id, FsErrorKind::classify(&e));
                None
            }
        }
    }

    // ── Readlink ────────────────────────────────────────────────────────

    /// Resolve the entry's symlink target to a node.
    pub fn readlink_sync<'a>(&self, entry: impl Into<Entry<'a>>) -> Option<NodeId> {
        let id = self.entry_node(entry);
        let full = {
            let mut st = self.state.borrow_mut();
            if let Some(t) = st.link_target(id) {
                return Some(t);
            }
            if !st.can_readlink(id) {
                return None;
            }
            st.fullpath(id)
        };
        match self.provider.readlink_sync(&full) {
            Ok(target) => self.state.borrow_mut().apply_readlink(id, &target),
            Err(e) => {
                debug!(path = %full, error = %e, "readlink failed");
                self.state
                    .borrow_mut()
                    .readlink_fail(id, FsErrorKind::classify(&e));
                None
            }
        }
    }

    /// Async [`PathGraph::readlink_sync`].
    pub async fn readlink<'a>(&self, entry: impl Into<Entry<'a>>) -> Option<NodeId> {
        let id = self.entry_node(entry);
        let full = {
            let mut st = self.state.borrow_mut();
            if let Some(t) = st.link_target(id) {
                return Some(t);
            }
            if !st.can_readlink(id) {
                return None;
            }
            st.fullpath(id)
        };
        match self.provider.readlink(&full).await {
            Ok(target) => self.state.borrow_mut().apply_readlink(id, &target),
            Err(e) => {
                debug!(path = %full, error = %e, "readlink failed");
                self.state
                    .borrow_mut()
                    .readlink_fail(id, FsErrorKind::classify(&e));
                None
            }
        }
    }

    // ── Realpath ────────────────────────────────────────────────────────

    /// Fully dereference the entry to a node.
    pub fn realpath_sync<'a>(&self, entry: impl Into<Entry<'a>>) -> Option<NodeId> {
        let id = self.entry_node(entry);
        let full = {
            let mut st = self.state.borrow_mut();
            if let Some(r) = st.realpath_cached(id) {
                return Some(r);
            }
            if !st.can_realpath(id) {
                return None;
            }
            st.fullpath(id)
        };
        match self.provider.realpath_sync(&full) {
            Ok(real) => Some(self.state.borrow_mut().apply_realpath(id, &real)),
            Err(e) => {
                debug!(path = %full, error = %e, "realpath failed");
                self.state.borrow_mut().mark_enorealpath(id);
                None
            }
        }
    }

    /// Async [`PathGraph::realpath_sync`].
    pub async fn realpath<'a>(&self, entry: impl Into<Entry<'a>>) -> Option<NodeId> {
        let id = self.entry_node(entry);
        let full = {
            let mut st = self.state.borrow_mut();
            if let Some(r) = st.realpath_cached(id) {
                return Some(r);
            }
            if !st.can_realpath(id) {
                return None;
            }
            st.fullpath(id)
        };
        match self.provider.realpath(&full).await {
            Ok(real) => Some(self.state.borrow_mut().apply_realpath(id, &real)),
            Err(e) => {
                debug!(path = %full, error = %e, "realpath failed");
                self.state.borrow_mut().mark_enorealpath(id);
                None
            }
        }
    }

}
