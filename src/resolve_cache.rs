//! Bounded memo for string-level `resolve()` results.

use hashlink::LruCache;

use crate::platform::Platform;

const RESOLVE_CACHE_CAP: usize = 256;

/// String → resolved-fullpath LRU.
///
/// Keyed by the joined input segments (see [`join_key`]), not by the
/// resolved output, so repeated lookups of the same arguments at the same
/// cwd cost one map probe.
#[derive(Debug)]
pub(crate) struct ResolveCache {
    map: LruCache<String, String>,
}

impl ResolveCache {
    pub fn new() -> Self {
        Self {
            map: LruCache::new(RESOLVE_CACHE_CAP),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Drop everything. Called on chdir: relative keys resolve differently
    /// under the new cwd.
    pub fn clear(&mut self) {
        self.map = LruCache::new(RESOLVE_CACHE_CAP);
    }
}

/// Collapse resolve arguments into one cache key.
///
/// Segments are consumed right to left and prepended with `/`, skipping
/// empty and `"."` segments, stopping at the first absolute segment —
/// everything left of an absolute path cannot affect the result.
pub(crate) fn join_key(platform: Platform, segments: &[&str]) -> String {
    let mut key = String::new();
    for seg in segments.iter().rev() {
        if seg.is_empty() || *seg == "." {
            continue;
        }
        if key.is_empty() {
            key = (*seg).to_owned();
        } else {
            key = format!("{seg}/{key}");
        }
        if platform.is_absolute(seg) {
            break;
        }
    }
    key
}
