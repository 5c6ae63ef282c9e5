//! The replicated-store boundary.
//!
//! The live application runs over a peer-replicated key/value store; this
//! core only ever talks to the [`ReplicatedStore`] trait. Instead of
//! inspecting change notifications, consumers compare the monotonic version
//! stamp and re-derive everything from the local replica when it moved.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::config::EstimationError;

/// Table of agenda items, keyed by item id.
pub const ITEMS: &str = "items";
/// Table with one ranking record per participant.
pub const TOP_VOTES: &str = "topVotes";
/// Table with one record per (participant, item) estimate.
pub const ESTIMATES: &str = "estimates";
/// Table (and key) of the shared session lifecycle flag.
pub const STATE: &str = "state";
/// Table (and key) of the per-voter selection quota.
pub const DOTS_PER_VOTER: &str = "dotsPerVoter";

/// Separator between the participant name and the item id in estimate keys.
pub const ESTIMATE_KEY_SEPARATOR: &str = "_for_";

pub trait ReplicatedStore {
    /// Upserts a record. Replication order and conflict resolution are the
    /// implementation's concern; the contract here is last write wins per
    /// key on the local replica.
    fn put(&self, table: &str, key: &str, value: &str);

    /// Reads one record from the local replica.
    fn get(&self, table: &str, key: &str) -> Option<String>;

    /// Iterates all currently known records of a table.
    fn for_each(&self, table: &str, f: &mut dyn FnMut(&str, &str));

    /// Monotonic stamp, bumped by every local write and every replicated
    /// change that reached this replica.
    fn version(&self) -> u64;

    /// Joins an existing collaborative session by its node id.
    fn connect_to_node(&self, node_id: &str) -> Result<(), EstimationError>;
}

/// In-memory, single-process replica.
///
/// Stands in for the networked store in tests and offline replays. Every
/// participant of a replay shares one instance, which makes them trivially
/// "connected".
#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<HashMap<String, BTreeMap<String, String>>>,
    version: Cell<u64>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Bumps the version stamp without writing, the way an incoming
    /// replicated change notification would.
    pub fn touch(&self) {
        self.version.set(self.version.get() + 1);
    }
}

impl ReplicatedStore for MemoryStore {
    fn put(&self, table: &str, key: &str, value: &str) {
        debug!("put {}/{} = {:?}", table, key, value);
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.touch();
    }

    fn get(&self, table: &str, key: &str) -> Option<String> {
        self.tables
            .borrow()
            .get(table)
            .and_then(|records| records.get(key).cloned())
    }

    fn for_each(&self, table: &str, f: &mut dyn FnMut(&str, &str)) {
        if let Some(records) = self.tables.borrow().get(table) {
            for (key, value) in records.iter() {
                f(key, value);
            }
        }
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn connect_to_node(&self, node_id: &str) -> Result<(), EstimationError> {
        debug!("connect_to_node({}) on a local store", node_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.get(ITEMS, "anna0"), None);
        store.put(ITEMS, "anna0", "Docs: write the guide");
        assert_eq!(
            store.get(ITEMS, "anna0"),
            Some("Docs: write the guide".to_string())
        );
    }

    #[test]
    fn every_write_bumps_the_version() {
        let store = MemoryStore::new();
        let v0 = store.version();
        store.put(STATE, STATE, "running");
        assert!(store.version() > v0);
        let v1 = store.version();
        store.touch();
        assert!(store.version() > v1);
    }

    #[test]
    fn for_each_visits_records_in_key_order() {
        let store = MemoryStore::new();
        store.put(ITEMS, "b", "2");
        store.put(ITEMS, "a", "1");
        let mut seen: Vec<String> = Vec::new();
        store.for_each(ITEMS, &mut |key, _| seen.push(key.to_string()));
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }
}
