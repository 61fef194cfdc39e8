// Whale Index, spec §4.6. The one place where data races are possible by
// construction (spec §9): all mutation goes through `replace`, and the
// inner mapping is never exposed directly.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use alloy_primitives::Address;

use crate::state::HolderDetail;

pub struct WhaleIndex {
    // whale address -> token address -> rank
    inner: Mutex<HashMap<Address, HashMap<Address, u32>>>,
}

impl Default for WhaleIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl WhaleIndex {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Atomic swap of one token's whale set. Held briefly; never across I/O
    /// (spec §5 locking rules).
    pub fn replace(
        &self,
        token: Address,
        old_set: &HashSet<Address>,
        new_set: &HashSet<Address>,
        new_details: &HashMap<Address, HolderDetail>,
    ) {
        let mut index = self.inner.lock().unwrap();

        for addr in old_set.difference(new_set) {
            if let Some(inner) = index.get_mut(addr) {
                inner.remove(&token);
                if inner.is_empty() {
                    index.remove(addr);
                }
            }
        }

        for addr in new_set {
            if let Some(detail) = new_details.get(addr) {
                index.entry(*addr).or_default().insert(token, detail.rank);
            }
        }
    }

    pub fn lookup(&self, addr: Address) -> Option<HashMap<Address, u32>> {
        self.inner.lock().unwrap().get(&addr).cloned()
    }

    /// Rank of `addr` restricted to `token`, or `None` if `addr` is not a
    /// whale of that token.
    pub fn rank_for(&self, addr: Address, token: Address) -> Option<u32> {
        self.inner
            .lock()
            .unwrap()
            .get(&addr)
            .and_then(|tokens| tokens.get(&token))
            .copied()
    }
}
