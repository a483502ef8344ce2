//! Children arrays and the bounded LRU that owns them.
//!
//! Parents never hold their child list directly; every list lives in the
//! [`ChildrenCache`] keyed by the parent's id. Evicting a list is always
//! safe: the parent's READDIR_CALLED bit is dropped with it, so the next
//! readdir reissues IO instead of trusting a list that no longer exists.

use hashlink::LinkedHashMap;
use tracing::trace;

use crate::node::NodeId;

/// Default cache capacity in size units.
pub const DEFAULT_CHILDREN_CACHE_SIZE: usize = 16 * 1024;

/// An ordered child list split into a real and a provisional region.
///
/// `nodes[..provisional]` were observed by the last owning readdir;
/// `nodes[provisional..]` were synthesized to satisfy resolution and may or
/// may not exist.
#[derive(Debug, Default, Clone)]
pub(crate) struct Children {
    /// The child nodes, real region first.
    pub nodes: Vec<NodeId>,
    /// Index of the first provisional entry.
    pub provisional: usize,
}

/// Bounded LRU over parent → children-list entries.
///
/// Each list accounts for `len + 1` size units (the parent plus its
/// children). Exceeding the cap evicts least-recently-touched lists, except
/// the most recent one, which may be mid-build; a single oversized list
/// therefore survives exactly until the next list is touched. Recency is
/// maintained with the remove-then-reinsert idiom: a fresh insert always
/// lands at the back of the map's order.
#[derive(Debug)]
pub(crate) struct ChildrenCache {
    map: LinkedHashMap<NodeId, Children>,
    units: usize,
    cap: usize,
}

impl ChildrenCache {
    pub fn new(cap: usize) -> Self {
        Self {
            map: LinkedHashMap::new(),
            units: 0,
            cap: cap.max(2),
        }
    }

    /// Whether a list is currently cached for `parent`.
    pub fn contains(&self, parent: NodeId) -> bool {
        self.map.contains_key(&parent)
    }

    /// Read-only view of a list, without refreshing its LRU position.
    pub fn peek(&self, parent: NodeId) -> Option<&Children> {
        self.map.get(&parent)
    }

    /// Insert an empty list for `parent`, marking it most recent.
    pub fn insert_empty(&mut self, parent: NodeId) {
        if let Some(old) = self.map.remove(&parent) {
            self.units -= old.nodes.len() + 1;
        }
        self.map.insert(parent, Children::default());
        self.units += 1;
    }

    /// Remove and return the list for `parent`, releasing its units.
    pub fn take(&mut self, parent: NodeId) -> Option<Children> {
        let list = self.map.remove(&parent)?;
        self.units -= list.nodes.len() + 1;
        Some(list)
    }

    /// Store a list for `parent` as most recent.
    pub fn put(&mut self, parent: NodeId, list: Children) {
        if let Some(old) = self.map.remove(&parent) {
            self.units -= old.nodes.len() + 1;
        }
        self.units += list.nodes.len() + 1;
        self.map.insert(parent, list);
    }

    /// Mutate `parent`'s list, refreshing its LRU position and keeping the
    /// unit accounting in step with any length change.
    pub fn with_list<R>(&mut self, parent: NodeId, f: impl FnOnce(&mut Children) -> R) -> Option<R> {
        let mut list = self.take(parent)?;
        let out = f(&mut list);
        self.put(parent, list);
        Some(out)
    }

    /// Evict least-recently-used lists until the accounting fits the cap,
    /// sparing the most recent entry. Returns the parents whose lists were
    /// dropped so the caller can clear their READDIR_CALLED bits.
    pub fn evict_over_cap(&mut self) -> Vec<NodeId> {
        let mut evicted = Vec::new();
        while self.units > self.cap && self.map.len() > 1 {
            let Some((parent, list)) = self.map.pop_front() else {
                break;
            };
            self.units -= list.nodes.len() + 1;
            trace!(
                parent = parent.index(),
                len = list.nodes.len(),
                "evicting children list"
            );
            evicted.push(parent);
        }
        evicted
    }

    #[cfg(test)]
    pub fn unit_total(&self) -> usize {
        self.units
    }
}
