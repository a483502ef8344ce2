//! Match-key normalization for name comparison.
//!
//! Names are compared through a pre-normalized key: NFKD, lowercased first
//! when the graph is case-insensitive. Two process-wide (per-thread) maps
//! memoize the work, one per case mode; they are append-only and grow
//! monotonically, a deliberate memory/time trade shared by every graph on
//! the thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use unicode_normalization::UnicodeNormalization as _;

thread_local! {
    static KEYS: RefCell<HashMap<String, Rc<str>>> = RefCell::new(HashMap::new());
    static KEYS_NOCASE: RefCell<HashMap<String, Rc<str>>> = RefCell::new(HashMap::new());
}

fn compute(name: &str, nocase: bool) -> Rc<str> {
    if nocase {
        Rc::from(name.to_lowercase().nfkd().collect::<String>())
    } else {
        Rc::from(name.nfkd().collect::<String>())
    }
}

/// The comparison key for `name` under the given case mode.
///
/// Returned keys are shared: repeated calls with the same input hand back
/// clones of one allocation.
pub fn match_key(name: &str, nocase: bool) -> Rc<str> {
    let cache = if nocase { &KEYS_NOCASE } else { &KEYS };
    cache.with(|map| {
        if let Some(hit) = map.borrow().get(name) {
            return Rc::clone(hit);
        }
        let key = compute(name, nocase);
        map.borrow_mut().insert(name.to_owned(), Rc::clone(&key));
        key
    })
}
