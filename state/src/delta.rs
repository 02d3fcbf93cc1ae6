//! Fork-aware overlay tree over a [`Backend`]: each node records only its
//! own puts/deletes relative to its parent; a read walks ancestors toward
//! the root, and `commit` squashes a root-to-node path into the backend.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chain_backend::{Backend, Direction};
use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::{hash as compute_hash, zero_hash, BlockHeader, Hash, Space, SupportedHashes};

use crate::merkle::{MerkleOps, TreeWalker};

struct StateNode {
    id: Hash,
    parent_id: Option<Hash>,
    revision: u64,
    finalized: bool,
    header: Option<BlockHeader>,
    /// `None` is a deletion marker; `Some` is a recorded put. Keyed by the
    /// full `StateKey::sort_bytes()` so writes across spaces never collide.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    merkle_root: RefCell<Option<Hash>>,
    arrival: u64,
}

fn space_prefix(space: &Space) -> Vec<u8> {
    chain_shared::StateKey::new(space.clone(), Vec::new()).sort_bytes()
}

fn full_key(space: &Space, key: &[u8]) -> Vec<u8> {
    chain_shared::StateKey::new(space.clone(), key.to_vec()).sort_bytes()
}

struct HashConcatOps;

impl MerkleOps<Hash> for HashConcatOps {
    fn get_hash(&self, _node_id: u64) -> Option<Hash> {
        None
    }

    fn empty_hash(&self) -> Hash {
        zero_hash(SupportedHashes::Sha2_256.code()).expect("sha2-256 is always supported")
    }

    fn reduce(&self, _node_id: u64, left: Hash, right: Hash) -> Hash {
        let mut buf = left.to_bytes();
        buf.extend_from_slice(&right.to_bytes());
        compute_hash(SupportedHashes::Sha2_256.code(), &buf).expect("sha2-256 is always supported")
    }
}

/// A fork-aware, versioned view over `B`. Writers are expected to be
/// serialized by the caller (the controller owns a single writer, per the
/// node's concurrency model); reads of finalized nodes are safe to
/// interleave with that writer since finalized writes never change.
pub struct DeltaTree<B: Backend> {
    backend: B,
    nodes: RefCell<HashMap<Hash, Rc<StateNode>>>,
    children: RefCell<HashMap<Hash, Vec<Hash>>>,
    root_id: RefCell<Hash>,
    head_id: RefCell<Hash>,
    arrival_counter: Cell<u64>,
}

impl<B: Backend> DeltaTree<B> {
    pub fn new(backend: B, root_id: Hash) -> Self {
        let root = Rc::new(StateNode {
            id: root_id,
            parent_id: None,
            revision: 0,
            finalized: true,
            header: None,
            writes: BTreeMap::new(),
            merkle_root: RefCell::new(None),
            arrival: 0,
        });
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        let mut children = HashMap::new();
        children.insert(root_id, Vec::new());
        DeltaTree {
            backend,
            nodes: RefCell::new(nodes),
            children: RefCell::new(children),
            root_id: RefCell::new(root_id),
            head_id: RefCell::new(root_id),
            arrival_counter: Cell::new(1),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn root_id(&self) -> Hash {
        self.root_id.borrow().clone()
    }

    fn get_node(&self, id: Hash) -> Result<Rc<StateNode>> {
        self.nodes
            .borrow()
            .get(&id)
            .cloned()
            .ok_or_else(|| chain_error!(StateNodeNotFound; "unknown state node"))
    }

    pub fn create_child(
        &self,
        parent_id: Hash,
        new_id: Hash,
        header: Option<BlockHeader>,
    ) -> Result<Hash> {
        let parent = self.get_node(parent_id)?;
        if self.nodes.borrow().contains_key(&new_id) {
            return Err(chain_error!(UnexpectedState; "state node already exists"));
        }
        let arrival = self.arrival_counter.get();
        self.arrival_counter.set(arrival + 1);
        let child = Rc::new(StateNode {
            id: new_id,
            parent_id: Some(parent_id),
            revision: parent.revision + 1,
            finalized: false,
            header,
            writes: BTreeMap::new(),
            merkle_root: RefCell::new(None),
            arrival,
        });
        self.nodes.borrow_mut().insert(new_id, child);
        self.children.borrow_mut().entry(new_id).or_default();
        self.children
            .borrow_mut()
            .entry(parent_id)
            .or_default()
            .push(new_id);
        Ok(new_id)
    }

    /// Finalizing requires exclusive access to the node's write set, so it
    /// takes the node out, mutates it, and puts it back -- there are no
    /// other live references once construction in `create_child` returns.
    pub fn finalize(&self, node_id: Hash) -> Result<()> {
        let node = self.get_node(node_id)?;
        let finalized = StateNode {
            id: node.id,
            parent_id: node.parent_id,
            revision: node.revision,
            finalized: true,
            header: node.header.clone(),
            writes: node.writes.clone(),
            merkle_root: RefCell::new(node.merkle_root.borrow().clone()),
            arrival: node.arrival,
        };
        self.nodes.borrow_mut().insert(node_id, Rc::new(finalized));
        self.maybe_advance_head(node_id);
        Ok(())
    }

    fn maybe_advance_head(&self, candidate: Hash) {
        let node = match self.nodes.borrow().get(&candidate).cloned() {
            Some(n) if n.finalized => n,
            _ => return,
        };
        let head = self.get_node(self.head_id.borrow().clone()).ok();
        let should_replace = match head {
            None => true,
            Some(h) => {
                node.revision > h.revision
                    || (node.revision == h.revision && node.arrival < h.arrival)
            }
        };
        if should_replace {
            *self.head_id.borrow_mut() = candidate;
        }
    }

    fn is_ancestor_of(&self, ancestor: Hash, descendant: Hash) -> bool {
        let mut cur = descendant;
        loop {
            if cur == ancestor {
                return true;
            }
            match self.nodes.borrow().get(&cur).and_then(|n| n.parent_id) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    fn discard_subtree(&self, node_id: Hash) {
        let kids = self.children.borrow_mut().remove(&node_id).unwrap_or_default();
        for kid in kids {
            self.discard_subtree(kid);
        }
        self.nodes.borrow_mut().remove(&node_id);
    }

    pub fn discard(&self, node_id: Hash) -> Result<()> {
        self.get_node(node_id)?;
        if self.is_ancestor_of(node_id, self.head_id.borrow().clone()) {
            return Err(chain_error!(CannotDiscard; "head descends from this node"));
        }
        if let Some(parent_id) = self.get_node(node_id)?.parent_id {
            if let Some(siblings) = self.children.borrow_mut().get_mut(&parent_id) {
                siblings.retain(|c| *c != node_id);
            }
        }
        self.discard_subtree(node_id);
        Ok(())
    }

    /// Root-to-node inclusive ancestor chain.
    fn ancestor_chain(&self, node_id: Hash) -> Result<Vec<Hash>> {
        let mut chain = vec![node_id];
        let mut cur = self.get_node(node_id)?;
        while let Some(parent_id) = cur.parent_id {
            chain.push(parent_id);
            cur = self.get_node(parent_id)?;
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn commit(&self, node_id: Hash) -> Result<()> {
        if node_id == self.root_id() {
            return Err(chain_error!(InternalError; "cannot commit the root"));
        }
        let chain = self.ancestor_chain(node_id)?;

        for ancestor_id in chain.iter().skip(1) {
            let ancestor = self.get_node(*ancestor_id)?;
            for (sort_key, write) in ancestor.writes.iter() {
                match write {
                    Some(value) => self.backend.put_sort_key(sort_key.clone(), value.clone()),
                    None => self.backend.remove_sort_key(sort_key),
                }
            }
        }
        self.backend.advance_revision();

        for (i, ancestor_id) in chain[..chain.len() - 1].iter().enumerate() {
            let keep = chain[i + 1];
            let siblings: Vec<Hash> = self
                .children
                .borrow()
                .get(ancestor_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|c| *c != keep)
                .collect();
            for sibling in siblings {
                self.discard_subtree(sibling);
            }
        }

        for ancestor_id in chain[..chain.len() - 1].iter() {
            self.nodes.borrow_mut().remove(ancestor_id);
            self.children.borrow_mut().remove(ancestor_id);
        }

        let node = self.get_node(node_id)?;
        let new_root = StateNode {
            id: node_id,
            parent_id: None,
            revision: 0,
            finalized: true,
            header: node.header.clone(),
            writes: BTreeMap::new(),
            merkle_root: RefCell::new(None),
            arrival: node.arrival,
        };
        self.nodes.borrow_mut().insert(node_id, Rc::new(new_root));
        self.children.borrow_mut().entry(node_id).or_default();
        *self.root_id.borrow_mut() = node_id;
        Ok(())
    }

    pub fn get(&self, node_id: Hash, space: &Space, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let full = full_key(space, key);
        let mut cur = self.get_node(node_id)?;
        loop {
            if let Some(write) = cur.writes.get(&full) {
                return Ok(write.clone());
            }
            match cur.parent_id {
                Some(parent_id) => cur = self.get_node(parent_id)?,
                None => return Ok(self.backend.get_sort_key(&full)),
            }
        }
    }

    fn replace_node_writes(&self, node_id: Hash, mutate: impl FnOnce(&mut BTreeMap<Vec<u8>, Option<Vec<u8>>>)) -> Result<()> {
        let node = self.get_node(node_id)?;
        if node.finalized {
            return Err(chain_error!(UnexpectedState; "state node is finalized"));
        }
        let mut writes = node.writes.clone();
        mutate(&mut writes);
        let replacement = StateNode {
            id: node.id,
            parent_id: node.parent_id,
            revision: node.revision,
            finalized: node.finalized,
            header: node.header.clone(),
            writes,
            merkle_root: RefCell::new(None),
            arrival: node.arrival,
        };
        self.nodes.borrow_mut().insert(node_id, Rc::new(replacement));
        Ok(())
    }

    /// Writes of a zero-byte value delete the key, per the state-object model.
    pub fn put(&self, node_id: Hash, space: &Space, key: &[u8], value: Vec<u8>) -> Result<()> {
        let full = full_key(space, key);
        self.replace_node_writes(node_id, move |writes| {
            if value.is_empty() {
                writes.insert(full, None);
            } else {
                writes.insert(full, Some(value));
            }
        })
    }

    pub fn remove(&self, node_id: Hash, space: &Space, key: &[u8]) -> Result<()> {
        let full = full_key(space, key);
        self.replace_node_writes(node_id, move |writes| {
            writes.insert(full, None);
        })
    }

    pub fn range(
        &self,
        node_id: Hash,
        space: &Space,
        from_key: &[u8],
        direction: Direction,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let chain = self.ancestor_chain(node_id)?;
        let prefix = space_prefix(space);
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

        for (relative_key, value) in self.backend.range(space, from_key, direction) {
            merged.insert(relative_key, Some(value));
        }
        for ancestor_id in chain {
            let ancestor = self.get_node(ancestor_id)?;
            for (sort_key, write) in ancestor.writes.iter() {
                if let Some(relative) = sort_key.strip_prefix(prefix.as_slice()) {
                    merged.insert(relative.to_vec(), write.clone());
                }
            }
        }

        let mut items: Vec<(Vec<u8>, Vec<u8>)> = merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|value| (k, value)))
            .filter(|(k, _)| match direction {
                Direction::Forward => k.as_slice() >= from_key,
                Direction::Reverse => k.as_slice() <= from_key,
            })
            .collect();
        match direction {
            Direction::Forward => items.sort_by(|a, b| a.0.cmp(&b.0)),
            Direction::Reverse => items.sort_by(|a, b| b.0.cmp(&a.0)),
        }
        Ok(items)
    }

    pub fn merkle_root(&self, node_id: Hash) -> Result<Hash> {
        let node = self.get_node(node_id)?;
        if let Some(cached) = node.merkle_root.borrow().clone() {
            return Ok(cached);
        }
        let ops = HashConcatOps;
        let mut walker = TreeWalker::new(&ops);
        for (key, write) in node.writes.iter() {
            let value_hash = match write {
                Some(bytes) => compute_hash(SupportedHashes::Sha2_256.code(), bytes)
                    .expect("sha2-256 is always supported"),
                None => ops.empty_hash(),
            };
            let mut leaf_input = key.clone();
            leaf_input.extend_from_slice(&value_hash.to_bytes());
            let leaf_hash = compute_hash(SupportedHashes::Sha2_256.code(), &leaf_input)
                .expect("sha2-256 is always supported");
            walker.push_leaf(leaf_hash);
        }
        let root = walker.close();
        *node.merkle_root.borrow_mut() = Some(root);
        Ok(root)
    }

    pub fn head(&self) -> Hash {
        self.head_id.borrow().clone()
    }

    pub fn fork_heads(&self) -> Vec<Hash> {
        let nodes = self.nodes.borrow();
        let children = self.children.borrow();
        nodes
            .values()
            .filter(|n| n.finalized)
            .filter(|n| {
                !has_finalized_descendant(&nodes, &children, n.id)
            })
            .map(|n| n.id)
            .collect()
    }
}

fn has_finalized_descendant(
    nodes: &HashMap<Hash, Rc<StateNode>>,
    children: &HashMap<Hash, Vec<Hash>>,
    id: Hash,
) -> bool {
    children.get(&id).into_iter().flatten().any(|child_id| {
        nodes
            .get(child_id)
            .map(|c| c.finalized)
            .unwrap_or(false)
            || has_finalized_descendant(nodes, children, *child_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_backend::MemoryBackend;
    use chain_shared::{zero_hash, ErrorCode, SupportedHashes};

    fn root_hash() -> Hash {
        zero_hash(SupportedHashes::Sha2_256.code()).unwrap()
    }

    fn leaf_hash(byte: u8) -> Hash {
        compute_hash(SupportedHashes::Sha2_256.code(), &[byte]).unwrap()
    }

    #[test]
    fn read_walks_ancestors_to_find_youngest_write() {
        let tree = DeltaTree::new(MemoryBackend::new(), root_hash());
        let a = tree.create_child(tree.root_id(), leaf_hash(1), None).unwrap();
        tree.put(a, &Space::Metadata, b"k", b"v1".to_vec()).unwrap();
        tree.finalize(a).unwrap();
        let b = tree.create_child(a, leaf_hash(2), None).unwrap();
        assert_eq!(tree.get(b, &Space::Metadata, b"k").unwrap(), Some(b"v1".to_vec()));
        tree.put(b, &Space::Metadata, b"k", b"v2".to_vec()).unwrap();
        assert_eq!(tree.get(b, &Space::Metadata, b"k").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(tree.get(a, &Space::Metadata, b"k").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn writes_to_finalized_node_fail() {
        let tree = DeltaTree::new(MemoryBackend::new(), root_hash());
        let a = tree.create_child(tree.root_id(), leaf_hash(1), None).unwrap();
        tree.finalize(a).unwrap();
        let err = tree.put(a, &Space::Metadata, b"k", b"v".to_vec()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedState);
    }

    #[test]
    fn read_on_unknown_node_fails() {
        let tree = DeltaTree::new(MemoryBackend::new(), root_hash());
        let err = tree.get(leaf_hash(99), &Space::Metadata, b"k").unwrap_err();
        assert_eq!(err.code, ErrorCode::StateNodeNotFound);
    }

    #[test]
    fn commit_materializes_writes_into_backend_and_reseats_root() {
        let tree = DeltaTree::new(MemoryBackend::new(), root_hash());
        let a = tree.create_child(tree.root_id(), leaf_hash(1), None).unwrap();
        tree.put(a, &Space::Metadata, b"k", b"v1".to_vec()).unwrap();
        tree.finalize(a).unwrap();
        tree.commit(a).unwrap();
        assert_eq!(tree.root_id(), a);
        assert_eq!(
            tree.backend().get(&chain_shared::StateKey::new(Space::Metadata, b"k".to_vec())),
            Some(b"v1".to_vec())
        );
    }

    #[test]
    fn commit_of_root_fails() {
        let tree = DeltaTree::new(MemoryBackend::new(), root_hash());
        let err = tree.commit(tree.root_id()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
    }

    #[test]
    fn discard_removes_subtree_but_not_head_ancestor() {
        let tree = DeltaTree::new(MemoryBackend::new(), root_hash());
        let a = tree.create_child(tree.root_id(), leaf_hash(1), None).unwrap();
        tree.finalize(a).unwrap();
        let b = tree.create_child(a, leaf_hash(2), None).unwrap();
        tree.finalize(b).unwrap();
        assert_eq!(tree.head(), b);
        assert!(tree.discard(a).is_err());
        let sibling = tree.create_child(a, leaf_hash(3), None).unwrap();
        tree.discard(sibling).unwrap();
        assert!(tree.get(sibling, &Space::Metadata, b"k").is_err());
    }

    #[test]
    fn range_forward_merges_backend_and_overlay_from_the_boundary_key() {
        let backend = MemoryBackend::new();
        backend.put(chain_shared::StateKey::new(Space::Metadata, b"a".to_vec()), b"1".to_vec());
        backend.put(chain_shared::StateKey::new(Space::Metadata, b"c".to_vec()), b"3".to_vec());
        let tree = DeltaTree::new(backend, root_hash());
        let node = tree.create_child(tree.root_id(), leaf_hash(1), None).unwrap();
        tree.put(node, &Space::Metadata, b"b", b"2".to_vec()).unwrap();

        let items = tree.range(node, &Space::Metadata, b"a", Direction::Forward).unwrap();
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
    fn range_reverse_merges_backend_and_overlay_up_to_the_boundary_key() {
        let backend = MemoryBackend::new();
        backend.put(chain_shared::StateKey::new(Space::Metadata, b"a".to_vec()), b"1".to_vec());
        backend.put(chain_shared::StateKey::new(Space::Metadata, b"c".to_vec()), b"3".to_vec());
        let tree = DeltaTree::new(backend, root_hash());
        let node = tree.create_child(tree.root_id(), leaf_hash(1), None).unwrap();
        tree.put(node, &Space::Metadata, b"b", b"2".to_vec()).unwrap();

        // Before the fix this hardcoded Direction::Forward on the backend
        // call, so "a" (strictly below the "b" boundary) never made it into
        // the merged map and was silently dropped.
        let items = tree.range(node, &Space::Metadata, b"b", Direction::Reverse).unwrap();
        assert_eq!(
            items,
            vec![(b"b".to_vec(), b"2".to_vec()), (b"a".to_vec(), b"1".to_vec())]
        );
    }

    #[test]
    fn fork_heads_reports_leaves_with_no_finalized_descendant() {
        let tree = DeltaTree::new(MemoryBackend::new(), root_hash());
        let a = tree.create_child(tree.root_id(), leaf_hash(1), None).unwrap();
        tree.finalize(a).unwrap();
        let b = tree.create_child(a, leaf_hash(2), None).unwrap();
        tree.finalize(b).unwrap();
        let c = tree.create_child(a, leaf_hash(3), None).unwrap();
        tree.finalize(c).unwrap();
        let heads = tree.fork_heads();
        assert!(heads.contains(&b));
        assert!(heads.contains(&c));
        assert!(!heads.contains(&a));
    }
}
