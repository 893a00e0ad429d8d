//! Identity Registry
//!
//! Bidirectional association between raw composite values and their
//! observed wrappers, keyed by identity. The raw-to-wrapper direction
//! lives here, one map per flavor family; the wrapper-to-raw direction
//! is the wrapper core's own `raw` field.
//!
//! Entries hold weak references only: registering a wrapper never
//! extends its lifetime, and a dead entry is purged the next time it is
//! looked up. The same raw value can be registered in both families at
//! once (a mutable and a readonly wrapper over one raw), but at most
//! once per family.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use super::observed::{Family, ObservedCore};

pub(crate) struct Registry {
    raw_to_mutable: RwLock<HashMap<u64, Weak<ObservedCore>>>,
    raw_to_readonly: RwLock<HashMap<u64, Weak<ObservedCore>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            raw_to_mutable: RwLock::new(HashMap::new()),
            raw_to_readonly: RwLock::new(HashMap::new()),
        }
    }

    fn map(&self, family: Family) -> &RwLock<HashMap<u64, Weak<ObservedCore>>> {
        match family {
            Family::Mutable => &self.raw_to_mutable,
            Family::Readonly => &self.raw_to_readonly,
        }
    }

    /// Look up the live wrapper for a raw identity, if one exists.
    ///
    /// A dead entry (all wrapper handles dropped) is removed and
    /// reported absent; absence is a normal outcome, not a failure.
    pub(crate) fn lookup(&self, raw_id: u64, family: Family) -> Option<Arc<ObservedCore>> {
        let found = self
            .map(family)
            .read()
            .expect("registry lock poisoned")
            .get(&raw_id)
            .cloned();
        match found {
            None => None,
            Some(weak) => match weak.upgrade() {
                Some(core) => Some(core),
                None => {
                    self.map(family)
                        .write()
                        .expect("registry lock poisoned")
                        .remove(&raw_id);
                    None
                }
            },
        }
    }

    /// Record the wrapper for a raw identity.
    pub(crate) fn register(&self, raw_id: u64, core: &Arc<ObservedCore>, family: Family) {
        self.map(family)
            .write()
            .expect("registry lock poisoned")
            .insert(raw_id, Arc::downgrade(core));
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, raw_id: u64, family: Family) -> bool {
        self.map(family)
            .read()
            .expect("registry lock poisoned")
            .contains_key(&raw_id)
    }
}
