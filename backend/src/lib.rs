//! The ordered key-value backend underlying the state-delta tree: every
//! entry is addressed by a [`StateKey`], with range iteration in the key's
//! canonical sort order, a small set of named metadata slots for chain-wide
//! bookkeeping, and a monotonic revision counter advanced by commits.

use std::cell::RefCell;
use std::collections::BTreeMap;

use chain_shared::StateKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend metadata slot {0:?} not found")]
    MetadataNotFound(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// An ordered key-value store. Implementations need not be thread-safe on
/// their own; callers (the state-delta tree) serialize writers.
pub trait Backend {
    /// Reads the raw bytes stored at `key`, or `None` if absent.
    fn get(&self, key: &StateKey) -> Option<Vec<u8>>;

    /// Writes `value` at `key`. A zero-length value deletes the key, per the
    /// state-object model: absence and an empty value are distinct only at
    /// the overlay layer, never once committed to the backend.
    fn put(&self, key: StateKey, value: Vec<u8>);

    fn remove(&self, key: &StateKey);

    /// Raw accessors keyed directly by `StateKey::sort_bytes()`, used by the
    /// state-delta tree when squashing an overlay (which only has the
    /// combined space+key bytes, not a space value to reconstruct a
    /// [`StateKey`] from) into the backend on commit.
    fn get_sort_key(&self, sort_key: &[u8]) -> Option<Vec<u8>>;
    fn put_sort_key(&self, sort_key: Vec<u8>, value: Vec<u8>);
    fn remove_sort_key(&self, sort_key: &[u8]);

    /// Iterates entries in `space` starting at `from_key` (inclusive) in
    /// `direction`, in canonical key order.
    fn range<'a>(
        &'a self,
        space: &chain_shared::Space,
        from_key: &[u8],
        direction: Direction,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

    /// The backend's own committed revision, advanced once per state-delta
    /// tree commit. Distinct from an individual delta node's revision.
    fn revision(&self) -> u64;
    fn advance_revision(&self);

    fn get_metadata(&self, slot: &str) -> Option<Vec<u8>>;
    fn put_metadata(&self, slot: &str, value: Vec<u8>);
}

/// An in-memory [`Backend`], used for tests and as the reference
/// implementation; a durable backend (e.g. RocksDB-backed) would implement
/// the same trait against a real ordered store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RefCell<BTreeMap<Vec<u8>, Vec<u8>>>,
    metadata: RefCell<BTreeMap<String, Vec<u8>>>,
    revision: RefCell<u64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn space_prefix(space: &chain_shared::Space) -> [u8; 21] {
        let probe = StateKey::new(space.clone(), Vec::new());
        let mut out = [0u8; 21];
        out.copy_from_slice(&probe.sort_bytes());
        out
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &StateKey) -> Option<Vec<u8>> {
        self.entries.borrow().get(&key.sort_bytes()).cloned()
    }

    fn put(&self, key: StateKey, value: Vec<u8>) {
        let sort_key = key.sort_bytes();
        if value.is_empty() {
            self.entries.borrow_mut().remove(&sort_key);
        } else {
            self.entries.borrow_mut().insert(sort_key, value);
        }
    }

    fn remove(&self, key: &StateKey) {
        self.entries.borrow_mut().remove(&key.sort_bytes());
    }

    fn get_sort_key(&self, sort_key: &[u8]) -> Option<Vec<u8>> {
        self.entries.borrow().get(sort_key).cloned()
    }

    fn put_sort_key(&self, sort_key: Vec<u8>, value: Vec<u8>) {
        if value.is_empty() {
            self.entries.borrow_mut().remove(&sort_key);
        } else {
            self.entries.borrow_mut().insert(sort_key, value);
        }
    }

    fn remove_sort_key(&self, sort_key: &[u8]) {
        self.entries.borrow_mut().remove(sort_key);
    }

    fn range<'a>(
        &'a self,
        space: &chain_shared::Space,
        from_key: &[u8],
        direction: Direction,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a> {
        let prefix = Self::space_prefix(space);
        let mut start = prefix.to_vec();
        start.extend_from_slice(from_key);

        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = self
            .entries
            .borrow()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k[prefix.len()..].to_vec(), v.clone()))
            .collect();

        let relative_from = from_key.to_vec();
        match direction {
            Direction::Forward => Box::new(
                snapshot
                    .into_iter()
                    .filter(move |(k, _)| k.as_slice() >= relative_from.as_slice()),
            ),
            Direction::Reverse => {
                let mut items: Vec<_> = snapshot
                    .into_iter()
                    .filter(|(k, _)| k.as_slice() <= relative_from.as_slice())
                    .collect();
                items.reverse();
                Box::new(items.into_iter())
            }
        }
    }

    fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn advance_revision(&self) {
        *self.revision.borrow_mut() += 1;
    }

    fn get_metadata(&self, slot: &str) -> Option<Vec<u8>> {
        self.metadata.borrow().get(slot).cloned()
    }

    fn put_metadata(&self, slot: &str, value: Vec<u8>) {
        self.metadata.borrow_mut().insert(slot.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_shared::Space;

    #[test]
    fn put_then_get_round_trips() {
        let backend = MemoryBackend::new();
        let key = StateKey::new(Space::Metadata, b"chain-id".to_vec());
        backend.put(key.clone(), b"abc".to_vec());
        assert_eq!(backend.get(&key), Some(b"abc".to_vec()));
    }

    #[test]
    fn zero_length_value_deletes() {
        let backend = MemoryBackend::new();
        let key = StateKey::new(Space::Metadata, b"k".to_vec());
        backend.put(key.clone(), b"abc".to_vec());
        backend.put(key.clone(), Vec::new());
        assert_eq!(backend.get(&key), None);
    }

    #[test]
    fn range_only_sees_its_own_space_in_order() {
        let backend = MemoryBackend::new();
        backend.put(
            StateKey::new(Space::Metadata, b"a".to_vec()),
            b"1".to_vec(),
        );
        backend.put(
            StateKey::new(Space::Metadata, b"c".to_vec()),
            b"3".to_vec(),
        );
        backend.put(
            StateKey::new(Space::Metadata, b"b".to_vec()),
            b"2".to_vec(),
        );
        backend.put(
            StateKey::new(Space::SystemCallDispatch, b"a".to_vec()),
            b"other".to_vec(),
        );

        let items: Vec<_> = backend
            .range(&Space::Metadata, b"", Direction::Forward)
            .collect();
        assert_eq!(
            items,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn metadata_slots_are_independent_of_entries() {
        let backend = MemoryBackend::new();
        backend.put_metadata("head", b"xyz".to_vec());
        assert_eq!(backend.get_metadata("head"), Some(b"xyz".to_vec()));
        assert_eq!(backend.get_metadata("missing"), None);
    }

    #[test]
    fn revision_advances_monotonically() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.revision(), 0);
        backend.advance_revision();
        backend.advance_revision();
        assert_eq!(backend.revision(), 2);
    }
}
