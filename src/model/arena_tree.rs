//! Arena-indexed AVL tree with per-subtree summaries.
//!
//! This is the shared skeleton of the line index, the anchor tree and the
//! segment collections. Nodes live in a `Vec` of slots and refer to each other
//! by index, so there are no reference cycles and no `RefCell` juggling. Every
//! node caches the summary of its whole subtree, computed with an associative
//! (not necessarily commutative) `Summary::combine` in in-order sequence.
//!
//! The tree is positional: order is defined by where nodes are inserted, never
//! by comparing keys. Callers locate positions through custom descents using
//! `root`/`left`/`right` and the cached summaries.

use std::cmp::max;
use std::fmt::Debug;

/// Monoid summary cached per subtree.
pub(crate) trait Summary: Copy + Default + Debug + PartialEq {
    /// Combines the summary of a sequence with the summary of the sequence
    /// immediately following it.
    fn combine(self, right: Self) -> Self;
}

impl Summary for usize {
    fn combine(self, right: Self) -> Self {
        self + right
    }
}

/// A value stored in an [`ArenaTree`].
pub(crate) trait Item {
    type Summary: Summary;

    fn summary(&self) -> Self::Summary;
}

/// Generation-checked handle to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Node<T: Item> {
    value: T,
    summary: T::Summary,
    height: i32,
    parent: Option<u32>,
    left: Option<u32>,
    right: Option<u32>,
}

#[derive(Debug, Clone)]
struct Slot<T: Item> {
    generation: u32,
    node: Option<Node<T>>,
}

#[derive(Debug, Clone)]
pub(crate) struct ArenaTree<T: Item> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    root: Option<u32>,
    len: usize,
}

impl<T: Item> Default for ArenaTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---
// Slot access
// ---

impl<T: Item> ArenaTree<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    /// Number of nodes owned by the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    fn node(&self, index: u32) -> &Node<T> {
        match self.slots.get(index as usize).and_then(|s| s.node.as_ref()) {
            Some(node) => node,
            None => panic!("arena tree link points at vacant slot {index}"),
        }
    }

    fn node_mut(&mut self, index: u32) -> &mut Node<T> {
        match self
            .slots
            .get_mut(index as usize)
            .and_then(|s| s.node.as_mut())
        {
            Some(node) => node,
            None => panic!("arena tree link points at vacant slot {index}"),
        }
    }

    fn id_of(&self, index: u32) -> NodeId {
        NodeId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn resolve(&self, id: NodeId) -> Option<u32> {
        let slot = self.slots.get(id.index as usize)?;
        (slot.generation == id.generation && slot.node.is_some()).then_some(id.index)
    }

    fn allocate(&mut self, value: T) -> u32 {
        let node = Node {
            summary: value.summary(),
            value,
            height: 1,
            parent: None,
            left: None,
            right: None,
        };
        self.len += 1;
        if let Some(index) = self.free.pop() {
            self.slots[index as usize].node = Some(node);
            index
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            (self.slots.len() - 1) as u32
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.resolve(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.resolve(id).map(|i| &self.node(i).value)
    }

    /// Mutable access to a value. The caller must not change anything that
    /// feeds into the value's summary; use [`ArenaTree::modify`] for that.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        let index = self.resolve(id)?;
        Some(&mut self.node_mut(index).value)
    }

    /// Mutates a value and recomputes the cached summaries up to the root.
    pub fn modify<R>(&mut self, id: NodeId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let index = self.resolve(id)?;
        let result = f(&mut self.node_mut(index).value);
        let mut current = Some(index);
        while let Some(c) = current {
            self.update(c);
            current = self.node(c).parent;
        }
        Some(result)
    }
}

// ---
// Navigation
// ---

impl<T: Item> ArenaTree<T> {
    pub fn root(&self) -> Option<NodeId> {
        self.root.map(|i| self.id_of(i))
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        let index = self.resolve(id)?;
        self.node(index).left.map(|i| self.id_of(i))
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        let index = self.resolve(id)?;
        self.node(index).right.map(|i| self.id_of(i))
    }

    /// Summary of the subtree rooted at `id`.
    pub fn subtree_summary(&self, id: NodeId) -> T::Summary {
        self.resolve(id)
            .map(|i| self.node(i).summary)
            .unwrap_or_default()
    }

    /// Like [`ArenaTree::subtree_summary`], with the empty summary for `None`.
    pub fn summary_of(&self, id: Option<NodeId>) -> T::Summary {
        id.map(|id| self.subtree_summary(id)).unwrap_or_default()
    }

    /// Summary of the whole sequence.
    pub fn total(&self) -> T::Summary {
        self.sum(self.root)
    }

    fn sum(&self, index: Option<u32>) -> T::Summary {
        index.map(|i| self.node(i).summary).unwrap_or_default()
    }

    fn height(&self, index: Option<u32>) -> i32 {
        index.map_or(0, |i| self.node(i).height)
    }

    fn leftmost(&self, mut index: u32) -> u32 {
        while let Some(l) = self.node(index).left {
            index = l;
        }
        index
    }

    fn rightmost(&self, mut index: u32) -> u32 {
        while let Some(r) = self.node(index).right {
            index = r;
        }
        index
    }

    pub fn first(&self) -> Option<NodeId> {
        self.root.map(|r| self.id_of(self.leftmost(r)))
    }

    pub fn last(&self) -> Option<NodeId> {
        self.root.map(|r| self.id_of(self.rightmost(r)))
    }

    fn next_index(&self, index: u32) -> Option<u32> {
        if let Some(r) = self.node(index).right {
            return Some(self.leftmost(r));
        }
        let mut current = index;
        while let Some(p) = self.node(current).parent {
            if self.node(p).left == Some(current) {
                return Some(p);
            }
            current = p;
        }
        None
    }

    fn prev_index(&self, index: u32) -> Option<u32> {
        if let Some(l) = self.node(index).left {
            return Some(self.rightmost(l));
        }
        let mut current = index;
        while let Some(p) = self.node(current).parent {
            if self.node(p).right == Some(current) {
                return Some(p);
            }
            current = p;
        }
        None
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        let index = self.resolve(id)?;
        self.next_index(index).map(|i| self.id_of(i))
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        let index = self.resolve(id)?;
        self.prev_index(index).map(|i| self.id_of(i))
    }

    /// Summary of every node strictly before `id` in sequence order. O(log n).
    pub fn summary_before(&self, id: NodeId) -> T::Summary {
        let Some(index) = self.resolve(id) else {
            return T::Summary::default();
        };
        let mut acc = self.sum(self.node(index).left);
        let mut current = index;
        while let Some(p) = self.node(current).parent {
            let parent = self.node(p);
            if parent.right == Some(current) {
                acc = self
                    .sum(parent.left)
                    .combine(parent.value.summary())
                    .combine(acc);
            }
            current = p;
        }
        acc
    }

    /// In-order iteration over `(id, value)` pairs.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            tree: self,
            next: self.root.map(|r| self.leftmost(r)),
        }
    }
}

pub(crate) struct Iter<'a, T: Item> {
    tree: &'a ArenaTree<T>,
    next: Option<u32>,
}

impl<'a, T: Item> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        self.next = self.tree.next_index(index);
        Some((self.tree.id_of(index), &self.tree.node(index).value))
    }
}

// ---
// Structural changes
// ---

impl<T: Item> ArenaTree<T> {
    /// Inserts `value` immediately before `at`, or at the end for `None`.
    pub fn insert_before(&mut self, at: Option<NodeId>, value: T) -> NodeId {
        let at = at.and_then(|id| self.resolve(id));
        let index = self.allocate(value);
        self.link_before(at, index);
        self.id_of(index)
    }

    pub fn push_back(&mut self, value: T) -> NodeId {
        self.insert_before(None, value)
    }

    /// Removes a node and returns its value. Stale ids yield `None`.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let index = self.resolve(id)?;
        self.unlink(index);
        let slot = &mut self.slots[index as usize];
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        Some(node.value)
    }

    /// Takes a node out of the sequence while keeping its id valid. The node
    /// must be re-linked with [`ArenaTree::attach_before`] before any other
    /// structural change.
    pub fn detach(&mut self, id: NodeId) -> bool {
        match self.resolve(id) {
            Some(index) => {
                self.unlink(index);
                true
            }
            None => false,
        }
    }

    /// Re-links a detached node before `at` (or at the end for `None`).
    pub fn attach_before(&mut self, at: Option<NodeId>, id: NodeId) -> bool {
        let Some(index) = self.resolve(id) else {
            return false;
        };
        let at = at.and_then(|at| self.resolve(at));
        self.link_before(at, index);
        true
    }

    fn link_before(&mut self, at: Option<u32>, index: u32) {
        let Some(root) = self.root else {
            self.root = Some(index);
            self.update(index);
            return;
        };
        let parent = match at {
            None => {
                let p = self.rightmost(root);
                self.node_mut(p).right = Some(index);
                p
            }
            Some(at) => match self.node(at).left {
                None => {
                    self.node_mut(at).left = Some(index);
                    at
                }
                Some(l) => {
                    let p = self.rightmost(l);
                    self.node_mut(p).right = Some(index);
                    p
                }
            },
        };
        self.node_mut(index).parent = Some(parent);
        self.update(index);
        self.fix_upward(Some(parent));
    }

    fn unlink(&mut self, index: u32) {
        let (parent, left, right) = {
            let n = self.node(index);
            (n.parent, n.left, n.right)
        };
        let fix_from = match (left, right) {
            (None, child) | (child, None) => {
                if let Some(c) = child {
                    self.node_mut(c).parent = parent;
                }
                self.replace_child(parent, index, child);
                parent
            }
            (Some(l), Some(r)) => {
                let successor = self.leftmost(r);
                let fix_from = if successor == r {
                    successor
                } else {
                    let successor_parent = self.node(successor).parent;
                    let successor_right = self.node(successor).right;
                    if let Some(sp) = successor_parent {
                        self.node_mut(sp).left = successor_right;
                    }
                    if let Some(sr) = successor_right {
                        self.node_mut(sr).parent = successor_parent;
                    }
                    self.node_mut(successor).right = Some(r);
                    self.node_mut(r).parent = Some(successor);
                    successor_parent.unwrap_or(successor)
                };
                self.node_mut(successor).left = Some(l);
                self.node_mut(l).parent = Some(successor);
                self.node_mut(successor).parent = parent;
                self.replace_child(parent, index, Some(successor));
                Some(fix_from)
            }
        };

        let node = self.node_mut(index);
        node.parent = None;
        node.left = None;
        node.right = None;
        self.update(index);
        self.fix_upward(fix_from);
    }

    fn replace_child(&mut self, parent: Option<u32>, old: u32, new: Option<u32>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let node = self.node_mut(p);
                if node.left == Some(old) {
                    node.left = new;
                } else {
                    node.right = new;
                }
            }
        }
    }

    fn update(&mut self, index: u32) {
        let (left, right) = {
            let n = self.node(index);
            (n.left, n.right)
        };
        let height = 1 + max(self.height(left), self.height(right));
        let summary = self
            .sum(left)
            .combine(self.node(index).value.summary())
            .combine(self.sum(right));
        let node = self.node_mut(index);
        node.height = height;
        node.summary = summary;
    }

    fn fix_upward(&mut self, mut current: Option<u32>) {
        while let Some(c) = current {
            let parent = self.node(c).parent;
            self.rebalance(c);
            current = parent;
        }
    }

    fn balance_factor(&self, index: u32) -> i32 {
        let n = self.node(index);
        self.height(n.left) - self.height(n.right)
    }

    fn rebalance(&mut self, index: u32) -> u32 {
        self.update(index);
        let balance = self.balance_factor(index);
        if balance > 1 {
            if let Some(l) = self.node(index).left {
                if self.balance_factor(l) < 0 {
                    self.rotate_left(l);
                }
            }
            return self.rotate_right(index);
        }
        if balance < -1 {
            if let Some(r) = self.node(index).right {
                if self.balance_factor(r) > 0 {
                    self.rotate_right(r);
                }
            }
            return self.rotate_left(index);
        }
        index
    }

    fn rotate_left(&mut self, x: u32) -> u32 {
        let Some(y) = self.node(x).right else {
            return x;
        };
        let parent = self.node(x).parent;
        let inner = self.node(y).left;
        self.node_mut(x).right = inner;
        if let Some(b) = inner {
            self.node_mut(b).parent = Some(x);
        }
        self.node_mut(y).left = Some(x);
        self.node_mut(y).parent = parent;
        self.replace_child(parent, x, Some(y));
        self.node_mut(x).parent = Some(y);
        self.update(x);
        self.update(y);
        y
    }

    fn rotate_right(&mut self, x: u32) -> u32 {
        let Some(y) = self.node(x).left else {
            return x;
        };
        let parent = self.node(x).parent;
        let inner = self.node(y).right;
        self.node_mut(x).left = inner;
        if let Some(b) = inner {
            self.node_mut(b).parent = Some(x);
        }
        self.node_mut(y).right = Some(x);
        self.node_mut(y).parent = parent;
        self.replace_child(parent, x, Some(y));
        self.node_mut(x).parent = Some(y);
        self.update(x);
        self.update(y);
        y
    }
}

// ---
// Invariants
// ---

impl<T: Item> ArenaTree<T> {
    /// Verifies parent links, AVL balance, cached heights and summaries.
    pub fn check_invariants(&self) -> Result<(), String> {
        let Some(root) = self.root else {
            return if self.len == 0 {
                Ok(())
            } else {
                Err(format!("empty tree reports {} nodes", self.len))
            };
        };
        if self.node(root).parent.is_some() {
            return Err(format!("root {root} has a parent"));
        }
        let mut count = 0;
        self.check_subtree(root, &mut count)?;
        if count != self.len {
            return Err(format!("reachable nodes {count} != len {}", self.len));
        }
        Ok(())
    }

    fn check_subtree(&self, index: u32, count: &mut usize) -> Result<(), String> {
        *count += 1;
        let node = self.node(index);
        for child in [node.left, node.right].into_iter().flatten() {
            if self.node(child).parent != Some(index) {
                return Err(format!("node {child} does not point back to parent {index}"));
            }
            self.check_subtree(child, count)?;
        }
        let height = 1 + max(self.height(node.left), self.height(node.right));
        if height != node.height {
            return Err(format!(
                "node {index}: cached height {} != {height}",
                node.height
            ));
        }
        let balance = self.height(node.left) - self.height(node.right);
        if balance.abs() > 1 {
            return Err(format!("node {index}: balance factor {balance}"));
        }
        let summary = self
            .sum(node.left)
            .combine(node.value.summary())
            .combine(self.sum(node.right));
        if summary != node.summary {
            return Err(format!(
                "node {index}: cached summary {:?} != {summary:?}",
                node.summary
            ));
        }
        Ok(())
    }
}
