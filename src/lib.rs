//! Cached filesystem path graph.
//!
//! A [`PathGraph`] is a process-local, incrementally built in-memory
//! picture of a directory tree. It answers path-resolution, metadata,
//! link-resolution, and recursive-walk queries with aggressive caching and
//! bounded memory — a faster, stateful alternative to stateless `resolve` /
//! `lstat` / `readdir` / `readlink` / `realpath` calls when the same
//! subtree is queried many times (globbing, bulk indexing, watchers).
//!
//! # Caching contract
//!
//! The graph is a snapshot: results reflect the filesystem as first
//! observed and may be out of date. Negative results (missing entries,
//! non-directories, unreadable links) are cached just as aggressively as
//! positive ones. Memory is bounded by the children-array cache; evicted
//! listings are transparently re-fetched on the next query.
//!
//! # Concurrency
//!
//! Single-threaded cooperative: the graph is not `Sync` and async
//! operations suspend only at filesystem awaits. Concurrent async readdir
//! calls against one node coalesce into a single IO.
//!
//! ```no_run
//! use pathgraph::{GraphOptions, PathGraph, WalkOptions};
//!
//! # fn main() -> Result<(), pathgraph::GraphError> {
//! let graph = PathGraph::new(GraphOptions::new().cwd("/srv/data"))?;
//! for id in graph.walk_sync("repos", WalkOptions::default()) {
//!     println!("{}", graph.fullpath(id));
//! }
//! # Ok(())
//! # }
//! ```

mod children;
mod flags;
mod graph;
mod node;
mod normalize;
mod platform;
mod provider;
mod resolve_cache;
mod walk;

pub use flags::NodeState;
pub use graph::{Entry, GraphError, GraphOptions, PathGraph};
pub use node::NodeId;
pub use platform::Platform;
pub use provider::{DirEntry, DirEntryType, FsErrorKind, FsProvider, RealFs, Stat};
pub use walk::{WalkOptions, WalkPredicate, WalkSyncIter};
