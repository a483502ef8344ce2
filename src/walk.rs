//! Recursive walk engine: array, iterator, and stream surfaces over one
//! traversal core.
//!
//! The async stream is pull-based, which is what bounds the producer: no
//! directory is listed until the consumer polls past everything already
//! buffered, so a paused consumer stalls IO instead of buffering the world.

use std::collections::{HashSet, VecDeque};

use futures::Stream;

use crate::flags::NodeState;
use crate::graph::{Entry, PathGraph};
use crate::node::NodeId;

/// Predicate over nodes, given the graph for inspection.
pub type WalkPredicate<'a> = Box<dyn Fn(&PathGraph, NodeId) -> bool + 'a>;

/// Options shared by every walk surface.
pub struct WalkOptions<'a> {
    /// Descend into symlinked directories by realpath identity.
    pub follow: bool,
    /// Gates emission only; rejected entries are still descended into.
    pub filter: Option<WalkPredicate<'a>>,
    /// Gates descent only; rejected directories are still emitted.
    pub walk_filter: Option<WalkPredicate<'a>>,
}

impl Default for WalkOptions<'_> {
    fn default() -> Self {
        Self {
            follow: false,
            filter: None,
            walk_filter: None,
        }
    }
}

impl<'a> WalkOptions<'a> {
    /// Follow symlinked directories.
    #[must_use]
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Emit only entries the predicate accepts.
    #[must_use]
    pub fn filter(mut self, f: impl Fn(&PathGraph, NodeId) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(f));
        self
    }

    /// Descend only into directories the predicate accepts.
    #[must_use]
    pub fn walk_filter(mut self, f: impl Fn(&PathGraph, NodeId) -> bool + 'a) -> Self {
        self.walk_filter = Some(Box::new(f));
        self
    }
}

/// The shared traversal state: a FIFO of directories to list, the visited
/// set that suppresses cycles, and a buffer of accepted emissions.
struct Traversal<'a> {
    graph: &'a PathGraph,
    opts: WalkOptions<'a>,
    queue: VecDeque<NodeId>,
    visited: HashSet<NodeId>,
    buffer: VecDeque<NodeId>,
}

impl<'a> Traversal<'a> {
    fn new(graph: &'a PathGraph, start: NodeId, opts: WalkOptions<'a>) -> Self {
        let mut traversal = Self {
            graph,
            opts,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            buffer: VecDeque::new(),
        };
        if traversal.accepts(start) {
            traversal.buffer.push_back(start);
        }
        traversal.visited.insert(start);
        traversal.queue.push_back(start);
        traversal
    }

    fn accepts(&self, id: NodeId) -> bool {
        self.opts
            .filter
            .as_ref()
            .is_none_or(|f| f(self.graph, id))
    }

    /// Descend iff this is a directory that can have children, has not been
    /// visited, and passes the walk filter.
    fn should_walk(&self, id: NodeId) -> bool {
        let state = self.graph.node_state(id);
        state.is_dir()
            && !state.intersects(NodeState::ENOCHILD)
            && !self.visited.contains(&id)
            && self
                .opts
                .walk_filter
                .as_ref()
                .is_none_or(|f| f(self.graph, id))
    }

    fn enqueue(&mut self, id: NodeId) {
        self.visited.insert(id);
        self.queue.push_back(id);
    }

    fn next_sync(&mut self) -> Option<NodeId> {
        loop {
            if let Some(out) = self.buffer.pop_front() {
                return Some(out);
            }
            let dir = self.queue.pop_front()?;
            for entry in self.graph.readdir_sync(dir) {
                if self.accepts(entry) {
                    self.buffer.push_back(entry);
                }
                let mut candidate = entry;
                if self.graph.is_symlink(entry) {
                    if !self.opts.follow {
                        continue;
                    }
                    let Some(real) = self.graph.realpath_sync(entry) else {
                        continue;
                    };
                    if self.graph.is_unknown(real) {
                        let _ = self.graph.lstat_sync(real);
                    }
                    candidate = real;
                }
                if self.should_walk(candidate) {
                    self.enqueue(candidate);
                }
            }
        }
    }

    async fn next_async(&mut self) -> Option<NodeId> {
        loop {
            if let Some(out) = self.buffer.pop_front() {
                return Some(out);
            }
            let dir = self.queue.pop_front()?;
            for entry in self.graph.readdir(dir).await {
                if self.accepts(entry) {
                    self.buffer.push_back(entry);
                }
                let mut candidate = entry;
                if self.graph.is_symlink(entry) {
                    if !self.opts.follow {
                        continue;
                    }
                    let Some(real) = self.graph.realpath(entry).await else {
                        continue;
                    };
                    if self.graph.is_unknown(real) {
                        let _ = self.graph.lstat(real).await;
                    }
                    candidate = real;
                }
                if self.should_walk(candidate) {
                    self.enqueue(candidate);
                }
            }
        }
    }
}

/// Lazy synchronous walk.
pub struct WalkSyncIter<'a> {
    traversal: Traversal<'a>,
}

impl Iterator for WalkSyncIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        self.traversal.next_sync()
    }
}

impl PathGraph {
    /// Walk from `entry` and collect every accepted node.
    pub fn walk_sync<'a>(
        &'a self,
        entry: impl Into<Entry<'a>>,
        opts: WalkOptions<'a>,
    ) -> Vec<NodeId> {
        self.iterate_sync(entry, opts).collect()
    }

    /// [`PathGraph::walk_sync`], emitting full path strings.
    pub fn walk_paths_sync<'a>(
        &'a self,
        entry: impl Into<Entry<'a>>,
        opts: WalkOptions<'a>,
    ) -> Vec<String> {
        self.iterate_sync(entry, opts)
            .map(|id| self.fullpath(id))
            .collect()
    }

    /// Walk lazily; directories are listed only as the iterator advances.
    pub fn iterate_sync<'a>(
        &'a self,
        entry: impl Into<Entry<'a>>,
        opts: WalkOptions<'a>,
    ) -> WalkSyncIter<'a> {
        let start = self.entry_node(entry);
        WalkSyncIter {
            traversal: Traversal::new(self, start, opts),
        }
    }

    /// Alias of [`PathGraph::iterate_sync`]; the synchronous stream shape.
    pub fn stream_sync<'a>(
        &'a self,
        entry: impl Into<Entry<'a>>,
        opts: WalkOptions<'a>,
    ) -> WalkSyncIter<'a> {
        self.iterate_sync(entry, opts)
    }

    /// Async walk collecting every accepted node.
    pub async fn walk<'a>(
        &'a self,
        entry: impl Into<Entry<'a>>,
        opts: WalkOptions<'a>,
    ) -> Vec<NodeId> {
        let start = self.entry_node(entry);
        let mut traversal = Traversal::new(self, start, opts);
        let mut out = Vec::new();
        while let Some(id) = traversal.next_async().await {
            out.push(id);
        }
        out
    }

    /// [`PathGraph::walk`], emitting full path strings.
    pub async fn walk_paths<'a>(
        &'a self,
        entry: impl Into<Entry<'a>>,
        opts: WalkOptions<'a>,
    ) -> Vec<String> {
        let ids = self.walk(entry, opts).await;
        ids.into_iter().map(|id| self.fullpath(id)).collect()
    }

    /// Pull-based async walk stream.
    ///
    /// Nothing past the already-buffered emissions is listed until the
    /// consumer polls for more.
    pub fn stream<'a>(
        &'a self,
        entry: impl Into<Entry<'a>>,
        opts: WalkOptions<'a>,
    ) -> impl Stream<Item = NodeId> + 'a {
        let start = self.entry_node(entry);
        let traversal = Traversal::new(self, start, opts);
        futures::stream::unfold(traversal, |mut traversal| async move {
            traversal.next_async().await.map(|id| (id, traversal))
        })
    }

    /// Alias of [`PathGraph::stream`]; the async-iteration shape.
    pub fn iterate<'a>(
        &'a self,
        entry: impl Into<Entry<'a>>,
        opts: WalkOptions<'a>,
    ) -> impl Stream<Item = NodeId> + 'a {
        self.stream(entry, opts)
    }
}
