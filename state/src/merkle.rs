//! The in-order-numbered binary Merkle tree-walker shared by the delta
//! tree's per-node write roots and by block application's transaction
//! Merkle root. Leaf `i` is numbered `2i`; the node spanning leaves
//! `[start, start + 2^level)` is numbered `2*start + 2^level - 1`, so a
//! level-1 parent of adjacent leaves `2i`/`2i+2` lands on `2i + 1`.

/// Hashing/caching operations the walker defers to its caller.
pub trait MerkleOps<H: Clone> {
    /// A previously computed hash for this node id, if the caller caches them.
    fn get_hash(&self, node_id: u64) -> Option<H>;
    fn empty_hash(&self) -> H;
    /// Combines `left` with `right`. `right` is `None` when the node's right
    /// child is absent (not a zero hash); callers must degrade to `left`
    /// unchanged in that case, per the walker's own `close()` behavior below
    /// -- `reduce` is only ever invoked here with both children present.
    fn reduce(&self, node_id: u64, left: H, right: H) -> H;
}

fn node_id(start: u64, level: u32) -> u64 {
    2 * start + (1u64 << level) - 1
}

struct Pending<H> {
    start: u64,
    level: u32,
    hash: H,
}

/// Streaming builder: feed leaves in strictly ascending order, then `close()`.
pub struct TreeWalker<'a, H: Clone, O: MerkleOps<H>> {
    ops: &'a O,
    frontier: Vec<Pending<H>>,
    next_leaf: u64,
}

impl<'a, H: Clone, O: MerkleOps<H>> TreeWalker<'a, H, O> {
    pub fn new(ops: &'a O) -> Self {
        TreeWalker {
            ops,
            frontier: Vec::new(),
            next_leaf: 0,
        }
    }

    /// Feeds the next leaf hash, merging it into the left frontier.
    pub fn push_leaf(&mut self, hash: H) {
        let start = self.next_leaf;
        self.next_leaf += 1;
        self.frontier.push(Pending {
            start,
            level: 0,
            hash,
        });
        self.collapse();
    }

    /// Merges adjacent equal-level pairs on the frontier, right-to-left.
    fn collapse(&mut self) {
        loop {
            let len = self.frontier.len();
            if len < 2 {
                return;
            }
            if self.frontier[len - 1].level != self.frontier[len - 2].level {
                return;
            }
            let right = self.frontier.pop().unwrap();
            let left = self.frontier.pop().unwrap();
            let level = left.level + 1;
            let id = node_id(left.start, level);
            let combined = match self.ops.get_hash(id) {
                Some(cached) => cached,
                None => self.ops.reduce(id, left.hash, right.hash),
            };
            self.frontier.push(Pending {
                start: left.start,
                level,
                hash: combined,
            });
        }
    }

    /// Flushes the frontier into a single root. Unequal-level neighbors
    /// (an incomplete rightmost subtree) degrade to the left hash unchanged,
    /// per the "null right child" rule -- `reduce` is never called for them.
    pub fn close(mut self) -> H {
        if self.frontier.is_empty() {
            return self.ops.empty_hash();
        }
        while self.frontier.len() > 1 {
            let right = self.frontier.pop().unwrap();
            let left = self.frontier.pop().unwrap();
            let combined = if left.level == right.level {
                let id = node_id(left.start, left.level + 1);
                match self.ops.get_hash(id) {
                    Some(cached) => cached,
                    None => self.ops.reduce(id, left.hash, right.hash),
                }
            } else {
                left.hash
            };
            self.frontier.push(Pending {
                start: left.start,
                level: left.level + 1,
                hash: combined,
            });
        }
        self.frontier.pop().unwrap().hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCacheConcat;

    impl MerkleOps<String> for NoCacheConcat {
        fn get_hash(&self, _node_id: u64) -> Option<String> {
            None
        }
        fn empty_hash(&self) -> String {
            "EMPTY".to_string()
        }
        fn reduce(&self, _node_id: u64, left: String, right: String) -> String {
            format!("({left}+{right})")
        }
    }

    #[test]
    fn empty_sequence_returns_empty_hash() {
        let ops = NoCacheConcat;
        let walker: TreeWalker<String, _> = TreeWalker::new(&ops);
        assert_eq!(walker.close(), "EMPTY");
    }

    #[test]
    fn single_leaf_passes_through_unchanged() {
        let ops = NoCacheConcat;
        let mut walker = TreeWalker::new(&ops);
        walker.push_leaf("a".to_string());
        assert_eq!(walker.close(), "a");
    }

    #[test]
    fn power_of_two_leaves_fully_pair_up() {
        let ops = NoCacheConcat;
        let mut walker = TreeWalker::new(&ops);
        for leaf in ["a", "b", "c", "d"] {
            walker.push_leaf(leaf.to_string());
        }
        assert_eq!(walker.close(), "((a+b)+(c+d))");
    }

    #[test]
    fn odd_leaf_count_degrades_trailing_element() {
        let ops = NoCacheConcat;
        let mut walker = TreeWalker::new(&ops);
        for leaf in ["a", "b", "c"] {
            walker.push_leaf(leaf.to_string());
        }
        // c has no sibling at any level until the final collapse, where it
        // degrades through unchanged rather than being reduced against nothing.
        assert_eq!(walker.close(), "((a+b)+c)");
    }

    #[test]
    fn leaf_and_parent_ids_follow_the_in_order_numbering() {
        assert_eq!(node_id(0, 0), 0);
        assert_eq!(node_id(1, 0), 2);
        assert_eq!(node_id(0, 1), 1);
        assert_eq!(node_id(2, 1), 5);
    }
}
