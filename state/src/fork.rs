//! An index over known block states, organized by id, previous-id and
//! height, supporting branch-diff queries and head/root selection.

use std::collections::{BTreeMap, HashMap};

use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::{BlockHeader, Hash};

/// A block plus the metadata the fork database indexes it by. Callers
/// supply whatever block representation they like (a full [`Block`] or
/// just its header); only these fields matter here.
#[derive(Clone, Debug)]
pub struct BlockState {
    pub id: Hash,
    pub previous_id: Hash,
    pub height: u64,
    pub header: BlockHeader,
    arrival: u64,
}

struct Entry {
    state: BlockState,
    children: Vec<Hash>,
}

/// Indexes block states by id, previous id and height. The root is a
/// sentinel entry (usually the last irreversible block) that every other
/// entry must eventually chain back to via `previous_id`.
pub struct ForkDatabase {
    entries: HashMap<Hash, Entry>,
    by_previous: HashMap<Hash, Vec<Hash>>,
    by_height: BTreeMap<u64, Vec<Hash>>,
    root_id: Hash,
    head_id: Hash,
    arrival_counter: u64,
}

impl ForkDatabase {
    /// Resets the database to a single root entry; `root` is treated as
    /// already irreversible and is not itself subject to `remove`.
    pub fn new(root: BlockState) -> Self {
        let root_id = root.id;
        let mut entries = HashMap::new();
        entries.insert(
            root_id,
            Entry {
                state: root,
                children: Vec::new(),
            },
        );
        let mut by_height = BTreeMap::new();
        by_height.insert(root_id_height(&entries, root_id), vec![root_id]);
        ForkDatabase {
            entries,
            by_previous: HashMap::new(),
            by_height,
            root_id,
            head_id: root_id,
            arrival_counter: 1,
        }
    }

    pub fn root(&self) -> &BlockState {
        &self.entries[&self.root_id].state
    }

    pub fn head(&self) -> &BlockState {
        &self.entries[&self.head_id].state
    }

    pub fn fetch(&self, id: &Hash) -> Result<&BlockState> {
        self.entries
            .get(id)
            .map(|e| &e.state)
            .ok_or_else(|| chain_error!(StateNodeNotFound; "unknown block id"))
    }

    pub fn fetch_by_number(&self, height: u64) -> Vec<&BlockState> {
        self.by_height
            .get(&height)
            .into_iter()
            .flatten()
            .map(|id| &self.entries[id].state)
            .collect()
    }

    /// Walks from `head_id` toward the root looking for a block at `height`.
    pub fn search_on_branch(&self, head_id: &Hash, height: u64) -> Option<&BlockState> {
        let mut cur = *head_id;
        loop {
            let entry = self.entries.get(&cur)?;
            if entry.state.height == height {
                return Some(&entry.state);
            }
            if entry.state.height < height || cur == self.root_id {
                return None;
            }
            cur = entry.state.previous_id;
        }
    }

    /// Adds a block state. Fails `unlinkable` if `previous_id` is neither
    /// the root nor a known block. On a duplicate id: a no-op if
    /// `ignore_duplicate`, else fails `duplicate`.
    pub fn add(&mut self, mut state: BlockState, ignore_duplicate: bool) -> Result<()> {
        if self.entries.contains_key(&state.id) {
            if ignore_duplicate {
                return Ok(());
            }
            return Err(chain_error!(UnexpectedState; "duplicate block id"));
        }
        if !self.entries.contains_key(&state.previous_id) {
            return Err(chain_error!(UnexpectedState; "unlinkable block: unknown previous id"));
        }
        state.arrival = self.arrival_counter;
        self.arrival_counter += 1;
        let id = state.id;
        let previous_id = state.previous_id;
        let height = state.height;

        self.entries.insert(
            id,
            Entry {
                state,
                children: Vec::new(),
            },
        );
        self.entries
            .get_mut(&previous_id)
            .expect("checked above")
            .children
            .push(id);
        self.by_previous.entry(previous_id).or_default().push(id);
        self.by_height.entry(height).or_default().push(id);

        self.maybe_advance_head(id);
        Ok(())
    }

    fn maybe_advance_head(&mut self, candidate: Hash) {
        let candidate_entry = &self.entries[&candidate].state;
        let head_entry = &self.entries[&self.head_id].state;
        let replace = candidate_entry.height > head_entry.height
            || (candidate_entry.height == head_entry.height
                && candidate_entry.arrival < head_entry.arrival);
        if replace {
            self.head_id = candidate;
        }
    }

    /// Removes `id` and all its descendants. Fails if that would remove head.
    pub fn remove(&mut self, id: &Hash) -> Result<()> {
        if !self.entries.contains_key(id) {
            return Err(chain_error!(StateNodeNotFound; "unknown block id"));
        }
        if self.is_ancestor_of(id, &self.head_id) {
            return Err(chain_error!(CannotDiscard; "head descends from this block"));
        }
        self.remove_subtree(*id);
        Ok(())
    }

    fn remove_subtree(&mut self, id: Hash) {
        let entry = match self.entries.remove(&id) {
            Some(e) => e,
            None => return,
        };
        for child in entry.children {
            self.remove_subtree(child);
        }
        if let Some(siblings) = self.by_previous.get_mut(&entry.state.previous_id) {
            siblings.retain(|s| *s != id);
        }
        if let Some(same_height) = self.by_height.get_mut(&entry.state.height) {
            same_height.retain(|s| *s != id);
        }
    }

    fn is_ancestor_of(&self, ancestor: &Hash, descendant: &Hash) -> bool {
        let mut cur = *descendant;
        loop {
            if cur == *ancestor {
                return true;
            }
            if cur == self.root_id {
                return false;
            }
            match self.entries.get(&cur) {
                Some(e) => cur = e.state.previous_id,
                None => return false,
            }
        }
    }

    fn path_to_root(&self, id: &Hash) -> Vec<Hash> {
        let mut path = vec![*id];
        let mut cur = *id;
        while cur != self.root_id {
            match self.entries.get(&cur) {
                Some(e) => {
                    cur = e.state.previous_id;
                    path.push(cur);
                }
                None => break,
            }
        }
        path
    }

    /// Equalizes `a` and `b` by height, then walks in lock-step to the
    /// nearest common ancestor, returning the disjoint branch from each
    /// endpoint up to (excluding) that ancestor, ordered from the endpoint
    /// backward.
    pub fn fetch_branch_from(&self, a: &Hash, b: &Hash) -> Result<(Vec<BlockState>, Vec<BlockState>)> {
        self.fetch(a)?;
        self.fetch(b)?;
        let path_a = self.path_to_root(a);
        let path_b = self.path_to_root(b);

        let set_b: std::collections::HashSet<_> = path_b.iter().collect();
        let mut branch_a = Vec::new();
        let mut common = None;
        for id in &path_a {
            if set_b.contains(id) {
                common = Some(*id);
                break;
            }
            branch_a.push(*id);
        }
        let common = common.unwrap_or(self.root_id);

        let mut branch_b = Vec::new();
        for id in &path_b {
            if *id == common {
                break;
            }
            branch_b.push(*id);
        }

        Ok((
            branch_a.into_iter().map(|id| self.entries[&id].state.clone()).collect(),
            branch_b.into_iter().map(|id| self.entries[&id].state.clone()).collect(),
        ))
    }

    /// The new root must be an ancestor of head. Siblings branching off any
    /// removed ancestor are deleted; the new root itself is retained but
    /// becomes a leaf of the discarded ancestry (its `previous_id` stays
    /// put for historical reference, but it has no entry backing it anymore).
    pub fn advance_root(&mut self, id: &Hash) -> Result<()> {
        if !self.is_ancestor_of(id, &self.head_id) {
            return Err(chain_error!(UnexpectedState; "new root must be an ancestor of head"));
        }
        let path = self.path_to_root(id);
        // path = [id, ..., root_id]; discard siblings along the way, then drop ancestors.
        for window in path.windows(2).rev() {
            let (child, parent) = (window[0], window[1]);
            let siblings: Vec<Hash> = self
                .entries
                .get(&parent)
                .map(|e| e.children.iter().filter(|c| **c != child).copied().collect())
                .unwrap_or_default();
            for sibling in siblings {
                self.remove_subtree(sibling);
            }
        }
        for ancestor in path.iter().skip(1) {
            self.entries.remove(ancestor);
        }
        self.root_id = *id;
        Ok(())
    }
}

fn root_id_height(entries: &HashMap<Hash, Entry>, id: Hash) -> u64 {
    entries[&id].state.height
}

impl BlockState {
    pub fn new(id: Hash, previous_id: Hash, height: u64, header: BlockHeader) -> Self {
        BlockState {
            id,
            previous_id,
            height,
            header,
            arrival: 0,
        }
    }
}
