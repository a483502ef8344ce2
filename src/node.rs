//! The path-node arena and its state machine.
//!
//! Nodes live in a per-graph arena and are addressed by [`NodeId`]; parent
//! links, symlink targets, and realpath results are all ids, never owning
//! references, so evicting a children list from the cache releases every
//! interior pointer at once. Everything in this module is synchronous
//! in-memory bookkeeping — IO and async orchestration live in `graph`.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::trace;

use crate::children::{Children, ChildrenCache};
use crate::flags::NodeState;
use crate::normalize::match_key;
use crate::platform::Platform;
use crate::provider::{DirEntry, FsErrorKind, Stat};

/// Handle to one node in a graph's arena.
///
/// Ids are copyable, hashable, and only meaningful against the graph that
/// issued them. A node is never destroyed, so an id never dangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One named entry in the tree, existent or not.
#[derive(Debug)]
pub(crate) struct NodeData {
    /// Basename as observed; may be case-corrected once by readdir.
    pub name: String,
    /// Pre-normalized comparison key.
    pub match_name: Rc<str>,
    /// Structural parent; `None` exactly for roots.
    pub parent: Option<NodeId>,
    /// The root above this node (self for roots).
    pub root: NodeId,
    /// Packed type/state word.
    pub flags: NodeState,
    /// Resolved symlink target, once readlink has succeeded.
    pub link_target: Option<NodeId>,
    /// Fully dereferenced node, once realpath has succeeded.
    pub realpath: Option<NodeId>,
    /// Captured lstat result.
    pub stat: Option<Stat>,
    pub fullpath: Option<String>,
    pub fullpath_posix: Option<String>,
    pub relative: Option<String>,
    pub relative_posix: Option<String>,
    pub depth: Option<usize>,
}

/// All mutable graph state: arena, children cache, roots registry, cwd.
///
/// Wrapped in a `RefCell` by [`crate::PathGraph`]; no method here suspends,
/// so borrows never cross an await point.
pub(crate) struct GraphState {
    pub platform: Platform,
    pub nocase: bool,
    arena: Vec<NodeData>,
    pub children: ChildrenCache,
    roots: HashMap<String, NodeId>,
    pub cwd: NodeId,
}

impl GraphState {
    /// Build the state for an already-validated absolute cwd path.
    pub fn new(platform: Platform, nocase: bool, cache_units: usize, cwd_path: &str) -> Self {
        let mut state = Self {
            platform,
            nocase,
            arena: Vec::new(),
            children: ChildrenCache::new(cache_units),
            roots: HashMap::new(),
            cwd: NodeId::new(0),
        };
        let root_len = platform.root_len(cwd_path);
        debug_assert!(root_len > 0, "constructor validated cwd absoluteness");
        let root = state.get_root(&cwd_path[..root_len]);
        let mut cur = root;
        for part in cwd_path[root_len..].split(|c| platform.is_sep(c)) {
            cur = state.child(cur, part);
        }
        state.cwd = cur;
        state.set_as_cwd(cur, None);
        state
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.arena[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.arena[id.index()]
    }

    // ── Basic accessors ─────────────────────────────────────────────────

    pub fn flags(&self, id: NodeId) -> NodeState {
        self.node(id).flags
    }

    pub fn name(&self, id: NodeId) -> String {
        self.node(id).name.clone()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn root(&self, id: NodeId) -> NodeId {
        self.node(id).root
    }

    pub fn stat(&self, id: NodeId) -> Option<Stat> {
        self.node(id).stat
    }

    pub fn link_target(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).link_target
    }

    pub fn realpath_cached(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).realpath
    }

    pub fn is_named(&self, id: NodeId, name: &str) -> bool {
        match_key(name, self.nocase) == self.node(id).match_name
    }

    pub fn depth(&mut self, id: NodeId) -> usize {
        if let Some(d) = self.node(id).depth {
            return d;
        }
        let d = match self.node(id).parent {
            None => 0,
            Some(p) => self.depth(p) + 1,
        };
        self.node_mut(id).depth = Some(d);
        d
    }

    // ── Node allocation and interning ───────────────────────────────────

    fn alloc(&mut self, name: String, parent: Option<NodeId>, flags: NodeState) -> NodeId {
        let id = NodeId::new(u32::try_from(self.arena.len()).unwrap_or_else(|_| {
            unreachable!("arena outgrew u32 ids")
        }));
        let match_name = match_key(&name, self.nocase);
        let root = parent.map_or(id, |p| self.node(p).root);
        self.arena.push(NodeData {
            name,
            match_name,
            parent,
            root,
            flags,
            link_target: None,
            realpath: None,
            stat: None,
            fullpath: None,
            fullpath_posix: None,
            relative: None,
            relative_posix: None,
            depth: None,
        });
        id
    }

    /// Root node for a raw root string, created and registered on first use.
    pub fn get_root(&mut self, raw: &str) -> NodeId {
        let key = self.platform.normalize_root(raw);
        if let Some(&id) = self.roots.get(&key) {
            return id;
        }
        trace!(root = %key, "registering new root");
        let id = self.alloc(key.clone(), None, NodeState::IFDIR);
        self.roots.insert(key, id);
        id
    }

    /// Intern one path component under `parent`.
    ///
    /// `""` and `"."` are the parent itself, `".."` its parent (or itself
    /// at a root). Anything else is matched against the existing children
    /// by normalized key; a miss appends a provisional child, born ENOENT
    /// when the parent can no longer legitimately have children.
    pub fn child(&mut self, parent: NodeId, part: &str) -> NodeId {
        if part.is_empty() || part == "." {
            return parent;
        }
        if part == ".." {
            return self.node(parent).parent.unwrap_or(parent);
        }

        self.ensure_children(parent);
        let key = match_key(part, self.nocase);
        if let Some(list) = self.children.peek(parent) {
            for &kid in &list.nodes {
                if self.arena[kid.index()].match_name == key {
                    return kid;
                }
            }
        }

        let born = if self.flags(parent).can_readdir() {
            NodeState::empty()
        } else {
            NodeState::ENOENT
        };
        let kid = self.alloc(part.to_owned(), Some(parent), born);
        self.children.with_list(parent, |l| l.nodes.push(kid));
        self.flush_evictions();
        kid
    }

    /// Resolve a possibly-rooted path string from `base`.
    pub fn resolve_from(&mut self, base: NodeId, path: &str) -> NodeId {
        if path.is_empty() {
            return base;
        }
        let root_len = self.platform.root_len(path);
        let (mut cur, rest) = if root_len > 0 {
            (self.get_root(&path[..root_len]), &path[root_len..])
        } else {
            (base, path)
        };
        let platform = self.platform;
        for part in rest.split(|c| platform.is_sep(c)) {
            cur = self.child(cur, part);
        }
        cur
    }

    // ── Children bookkeeping ────────────────────────────────────────────

    /// Guarantee a cached children list for `id`, rebuilding an empty one
    /// (and dropping READDIR_CALLED) after an eviction.
    pub fn ensure_children(&mut self, id: NodeId) {
        if !self.children.contains(id) {
            self.node_mut(id).flags.remove(NodeState::READDIR_CALLED);
            self.children.insert_empty(id);
            self.flush_evictions();
        }
    }

    /// The real region of `id`'s children.
    pub fn real_children(&mut self, id: NodeId) -> Vec<NodeId> {
        self.children
            .with_list(id, |l| l.nodes[..l.provisional].to_vec())
            .unwrap_or_default()
    }

    fn flush_evictions(&mut self) {
        for parent in self.children.evict_over_cap() {
            self.arena[parent.index()]
                .flags
                .remove(NodeState::READDIR_CALLED);
        }
    }

    // ── Readdir ingestion ───────────────────────────────────────────────

    /// Fold a successful readdir listing into `id`'s children: promote or
    /// create an entry per observed name, then condemn the provisional
    /// leftovers. Returns the real region.
    pub fn ingest_readdir(&mut self, id: NodeId, entries: &[DirEntry]) -> Vec<NodeId> {
        self.ensure_children(id);
        let mut list = self.children.take(id).unwrap_or_default();

        for entry in entries {
            self.ingest_entry(id, &mut list, entry);
        }
        self.node_mut(id).flags.insert(NodeState::READDIR_CALLED);

        let real = list.nodes[..list.provisional].to_vec();
        let leftovers = list.nodes[list.provisional..].to_vec();
        trace!(
            parent = id.index(),
            real = real.len(),
            leftover = leftovers.len(),
            "readdir ingested"
        );
        self.children.put(id, list);
        self.flush_evictions();
        for kid in leftovers {
            self.mark_enoent(kid);
        }
        real
    }

    fn ingest_entry(&mut self, parent: NodeId, list: &mut Children, entry: &DirEntry) {
        let key = match_key(&entry.name, self.nocase);
        let ifmt = NodeState::from_entry_type(entry.kind);

        let found = (list.provisional..list.nodes.len())
            .find(|&i| self.arena[list.nodes[i].index()].match_name == key);
        if let Some(i) = found {
            // Promote: adopt the observed type and spelling, move into the
            // real region.
            let kid = list.nodes[i];
            let node = self.node_mut(kid);
            node.flags = node.flags.with_ifmt(ifmt);
            if node.name != entry.name {
                node.name.clone_from(&entry.name);
            }
            if i != list.provisional {
                list.nodes.remove(i);
                list.nodes.insert(0, kid);
            }
            list.provisional += 1;
            return;
        }

        let kid = self.alloc(
            entry.name.clone(),
            Some(parent),
            NodeState::empty().with_ifmt(ifmt),
        );
        list.nodes.insert(0, kid);
        list.provisional += 1;
    }

    /// Absorb a readdir failure per its classification.
    pub fn readdir_fail(&mut self, id: NodeId, kind: FsErrorKind) {
        match kind {
            FsErrorKind::NotADirectory | FsErrorKind::NotPermitted => self.mark_enotdir(id),
            FsErrorKind::NotFound => self.mark_enoent(id),
            _ => {
                // Unusual failure: distrust the real region, change nothing
                // else.
                self.children.with_list(id, |l| l.provisional = 0);
            }
        }
    }

    // ── Negative-state propagation ──────────────────────────────────────

    /// This node definitely does not exist; neither do its descendants.
    pub fn mark_enoent(&mut self, id: NodeId) {
        let flags = self.flags(id);
        if flags.contains(NodeState::ENOENT) {
            return;
        }
        self.node_mut(id).flags = (flags | NodeState::ENOENT) - NodeState::IFMT;
        self.mark_children_enoent(id);
    }

    /// This node can never have children.
    pub fn mark_enotdir(&mut self, id: NodeId) {
        let flags = self.flags(id);
        if flags.contains(NodeState::ENOTDIR) {
            return;
        }
        let mut next = flags;
        if next.ifmt() == NodeState::IFDIR {
            next -= NodeState::IFMT;
        }
        self.node_mut(id).flags = next | NodeState::ENOTDIR;
        self.mark_children_enoent(id);
    }

    /// Realpath failed here; the node also can't be walked into.
    pub fn mark_enorealpath(&mut self, id: NodeId) {
        self.node_mut(id).flags.insert(NodeState::ENOREALPATH);
        self.mark_enotdir(id);
    }

    fn mark_children_enoent(&mut self, id: NodeId) {
        let kids = self.children.with_list(id, |l| {
            l.provisional = 0;
            l.nodes.clone()
        });
        for kid in kids.unwrap_or_default() {
            self.mark_enoent(kid);
        }
    }

    // ── Lstat / readlink / realpath bookkeeping ─────────────────────────

    /// Record a successful lstat.
    pub fn apply_stat(&mut self, id: NodeId, stat: Stat) {
        let ifmt = NodeState::from_mode(stat.mode);
        let node = self.node_mut(id);
        node.stat = Some(stat);
        node.flags = node.flags.with_ifmt(ifmt) | NodeState::LSTAT_CALLED;
    }

    /// Absorb an lstat failure.
    pub fn lstat_fail(&mut self, id: NodeId, kind: FsErrorKind) {
        match kind {
            FsErrorKind::NotADirectory => {
                if let Some(p) = self.parent(id) {
                    self.mark_enotdir(p);
                }
            }
            FsErrorKind::NotFound => self.mark_enoent(id),
            _ => {}
        }
    }

    /// Whether readlink may be attempted.
    pub fn can_readlink(&self, id: NodeId) -> bool {
        if self.node(id).link_target.is_some() {
            return true;
        }
        if self.node(id).parent.is_none() {
            return false;
        }
        let flags = self.flags(id);
        let ifmt = flags.ifmt();
        if !ifmt.is_empty() && ifmt != NodeState::IFLNK {
            return false;
        }
        !flags.intersects(NodeState::ENOREADLINK | NodeState::ENOENT)
    }

    /// Resolve and cache a readlink result against the node's parent.
    pub fn apply_readlink(&mut self, id: NodeId, target: &str) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let resolved = self.resolve_from(parent, target);
        self.node_mut(id).link_target = Some(resolved);
        Some(resolved)
    }

    /// Absorb a readlink failure.
    pub fn readlink_fail(&mut self, id: NodeId, kind: FsErrorKind) {
        self.node_mut(id).flags.insert(NodeState::ENOREADLINK);
        match kind {
            FsErrorKind::NotFound => self.mark_enoent(id),
            FsErrorKind::InvalidArgument => {
                // Something is there, but it isn't a link; the type is no
                // longer trusted.
                self.node_mut(id).flags -= NodeState::IFMT;
            }
            FsErrorKind::NotADirectory => {
                if let Some(p) = self.parent(id) {
                    self.mark_enotdir(p);
                }
            }
            _ => {}
        }
    }

    /// Whether realpath may be attempted.
    pub fn can_realpath(&self, id: NodeId) -> bool {
        !self.flags(id).intersects(
            NodeState::ENOREALPATH | NodeState::ENOREADLINK | NodeState::ENOENT,
        )
    }

    /// Resolve and cache a realpath result.
    pub fn apply_realpath(&mut self, id: NodeId, real: &str) -> NodeId {
        let resolved = self.resolve_from(id, real);
        self.node_mut(id).realpath = Some(resolved);
        resolved
    }

    // ── Cached path strings ─────────────────────────────────────────────

    /// Absolute path in the platform's native separators.
    pub fn fullpath(&mut self, id: NodeId) -> String {
        if let Some(fp) = &self.node(id).fullpath {
            return fp.clone();
        }
        let fp = match self.node(id).parent {
            None => self.node(id).name.clone(),
            Some(p) => {
                let base = self.fullpath(p);
                let name = &self.node(id).name;
                if self.node(p).parent.is_none() {
                    // Root names carry their own trailing separator.
                    format!("{base}{name}")
                } else {
                    format!("{base}{}{name}", self.platform.sep())
                }
            }
        };
        self.node_mut(id).fullpath = Some(fp.clone());
        fp
    }

    /// Absolute path in forward-slash form; on Windows, `//?/`-prefixed for
    /// drive-lettered roots.
    pub fn fullpath_posix(&mut self, id: NodeId) -> String {
        if let Some(fp) = &self.node(id).fullpath_posix {
            return fp.clone();
        }
        let fp = if self.platform.sep() == '/' {
            self.fullpath(id)
        } else {
            match self.node(id).parent {
                None => {
                    let root = self.node(id).name.replace('\\', "/");
                    let b = root.as_bytes();
                    if b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && b[2] == b'/' {
                        format!("//?/{root}")
                    } else {
                        root
                    }
                }
                Some(p) => {
                    let base = self.fullpath_posix(p);
                    let name = &self.node(id).name;
                    if base.ends_with('/') {
                        format!("{base}{name}")
                    } else {
                        format!("{base}/{name}")
                    }
                }
            }
        };
        self.node_mut(id).fullpath_posix = Some(fp.clone());
        fp
    }

    fn relative_with(&mut self, id: NodeId, posix: bool) -> String {
        let cached = if posix {
            self.node(id).relative_posix.clone()
        } else {
            self.node(id).relative.clone()
        };
        if let Some(r) = cached {
            return r;
        }
        let sep = if posix { '/' } else { self.platform.sep() };
        let cwd_root = self.node(self.cwd).root;
        let Some(p) = self.node(id).parent else {
            // The cwd seeding stops short of the root, so its contribution
            // is derived here: one ".." per cwd level. A foreign root has
            // no relative form and keeps its absolute name. Neither result
            // is memoized; the ups count moves with every chdir.
            if id == cwd_root {
                let cwd = self.cwd;
                let ups = self.depth(cwd);
                return vec![".."; ups].join(&sep.to_string());
            }
            return self.node(id).name.clone();
        };
        let base = self.relative_with(p, posix);
        let name = &self.node(id).name;
        let r = if base.is_empty() {
            name.clone()
        } else if self.node(p).parent.is_none() && p != cwd_root {
            // Only an absolute foreign-root base carries its own trailing
            // separator; a ".." chain never does.
            format!("{base}{name}")
        } else {
            format!("{base}{sep}{name}")
        };
        let node = self.node_mut(id);
        if posix {
            node.relative_posix = Some(r.clone());
        } else {
            node.relative = Some(r.clone());
        }
        r
    }

    /// Path relative to the graph's cwd, native separators.
    pub fn relative(&mut self, id: NodeId) -> String {
        self.relative_with(id, false)
    }

    /// Path relative to the graph's cwd, forward slashes.
    pub fn relative_posix(&mut self, id: NodeId) -> String {
        self.relative_with(id, true)
    }

    // ── Cwd bookkeeping ─────────────────────────────────────────────────

    /// Install `new` as cwd: seed `".." × k` relatives up its ancestry and
    /// un-memoize the old cwd's chain where the two diverge.
    pub fn set_as_cwd(&mut self, new: NodeId, old: Option<NodeId>) {
        if old == Some(new) {
            return;
        }
        let sep = self.platform.sep();
        let mut rewritten = HashSet::new();

        let mut cursor = Some(new);
        let mut ups = 0usize;
        while let Some(id) = cursor {
            if self.node(id).parent.is_none() {
                break;
            }
            rewritten.insert(id);
            let parts = vec![".."; ups];
            let node = self.node_mut(id);
            node.relative = Some(parts.join(&sep.to_string()));
            node.relative_posix = Some(parts.join("/"));
            cursor = self.node(id).parent;
            ups += 1;
        }

        let mut cursor = old;
        while let Some(id) = cursor {
            if self.node(id).parent.is_none() || rewritten.contains(&id) {
                break;
            }
            let node = self.node_mut(id);
            node.relative = None;
            node.relative_posix = None;
            cursor = self.node(id).parent;
        }
        self.cwd = new;
    }
}
