//! Relative-offset anchor tree.
//!
//! Anchors are nodes of an [`ArenaTree`] in offset order. A node stores only
//! the distance from its predecessor anchor (or from the document start), so
//! an anchor's offset is the sum of every distance up to and including its
//! own. An edit touches the nodes at or inside the edited range plus the first
//! node after it; everything further right shifts implicitly.
//!
//! Handles address anchors through a slot table with generations. Each slot
//! holds a weak reference to the handle's liveness token, which lets the tree
//! reclaim anchors nobody can observe any more.

use std::rc::{Rc, Weak};

use crate::error::{DocumentError, Result};
use crate::model::anchor::AnchorMovement;
use crate::model::arena_tree::{ArenaTree, Item, NodeId};
use crate::model::edit::OffsetChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AnchorKey {
    pub slot: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct AnchorNode {
    /// Distance from the previous anchor.
    length: usize,
    slot: u32,
}

impl Item for AnchorNode {
    type Summary = usize;

    fn summary(&self) -> usize {
        self.length
    }
}

#[derive(Debug)]
struct LiveAnchor {
    node: NodeId,
    movement: AnchorMovement,
    survive_deletion: bool,
    token: Weak<()>,
}

#[derive(Debug)]
enum SlotState {
    Vacant,
    Live(LiveAnchor),
    Deleted { token: Weak<()> },
}

#[derive(Debug)]
struct AnchorSlot {
    generation: u32,
    state: SlotState,
}

#[derive(Debug, Default)]
pub(crate) struct AnchorTree {
    tree: ArenaTree<AnchorNode>,
    slots: Vec<AnchorSlot>,
    free: Vec<u32>,
}

impl AnchorTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of anchors still tracked (deleted anchors are not counted).
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    fn position(&self, node: NodeId) -> usize {
        self.tree.summary_before(node) + self.tree.get(node).map_or(0, |n| n.length)
    }

    /// First anchor strictly after `offset`, with its position.
    fn first_after(&self, offset: usize) -> Option<(NodeId, usize)> {
        let mut current = self.tree.root();
        let mut base = 0;
        let mut found = None;
        while let Some(node) = current {
            let pos = base
                + self.tree.summary_of(self.tree.left(node))
                + self.tree.get(node).map_or(0, |n| n.length);
            if pos > offset {
                found = Some((node, pos));
                current = self.tree.left(node);
            } else {
                base = pos;
                current = self.tree.right(node);
            }
        }
        found
    }

    fn live(&self, key: AnchorKey) -> Result<&LiveAnchor> {
        match self.slots.get(key.slot as usize) {
            Some(slot) if slot.generation == key.generation => match &slot.state {
                SlotState::Live(live) => Ok(live),
                SlotState::Deleted { .. } => Err(DocumentError::AnchorDeleted),
                SlotState::Vacant => Err(DocumentError::ForeignHandle),
            },
            _ => Err(DocumentError::ForeignHandle),
        }
    }

    fn live_mut(&mut self, key: AnchorKey) -> Result<&mut LiveAnchor> {
        match self.slots.get_mut(key.slot as usize) {
            Some(slot) if slot.generation == key.generation => match &mut slot.state {
                SlotState::Live(live) => Ok(live),
                SlotState::Deleted { .. } => Err(DocumentError::AnchorDeleted),
                SlotState::Vacant => Err(DocumentError::ForeignHandle),
            },
            _ => Err(DocumentError::ForeignHandle),
        }
    }

    fn live_slot(&self, slot: u32) -> Option<&LiveAnchor> {
        match &self.slots.get(slot as usize)?.state {
            SlotState::Live(live) => Some(live),
            _ => None,
        }
    }

    fn live_slot_mut(&mut self, slot: u32) -> Option<&mut LiveAnchor> {
        match &mut self.slots.get_mut(slot as usize)?.state {
            SlotState::Live(live) => Some(live),
            _ => None,
        }
    }

    fn is_dropped(&self, slot: u32) -> bool {
        self.live_slot(slot)
            .is_some_and(|live| live.token.strong_count() == 0)
    }

    fn vacate(&mut self, slot: u32) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            entry.state = SlotState::Vacant;
            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(slot);
        }
    }

    /// Creates an anchor at `offset`, after any anchors already there. The
    /// caller has validated the offset against the document.
    pub fn create(
        &mut self,
        offset: usize,
        movement: AnchorMovement,
        survive_deletion: bool,
    ) -> (AnchorKey, Rc<()>) {
        let token = Rc::new(());
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(AnchorSlot {
                    generation: 0,
                    state: SlotState::Vacant,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let node = match self.first_after(offset) {
            Some((next, next_pos)) => {
                let gap = next_pos - offset;
                let before = self.tree.get(next).map_or(0, |n| n.length) - gap;
                self.tree.modify(next, |n| n.length = gap);
                self.tree.insert_before(
                    Some(next),
                    AnchorNode {
                        length: before,
                        slot,
                    },
                )
            }
            None => {
                let last_pos = self.tree.total();
                self.tree.push_back(AnchorNode {
                    length: offset - last_pos,
                    slot,
                })
            }
        };

        let entry = &mut self.slots[slot as usize];
        entry.state = SlotState::Live(LiveAnchor {
            node,
            movement,
            survive_deletion,
            token: Rc::downgrade(&token),
        });
        let key = AnchorKey {
            slot,
            generation: entry.generation,
        };
        (key, token)
    }

    pub fn offset(&self, key: AnchorKey) -> Result<usize> {
        let node = self.live(key)?.node;
        Ok(self.position(node))
    }

    pub fn is_deleted(&self, key: AnchorKey) -> Result<bool> {
        match self.live(key) {
            Ok(_) => Ok(false),
            Err(DocumentError::AnchorDeleted) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub fn movement(&self, key: AnchorKey) -> Result<AnchorMovement> {
        Ok(self.live(key)?.movement)
    }

    pub fn set_movement(&mut self, key: AnchorKey, movement: AnchorMovement) -> Result<()> {
        self.live_mut(key)?.movement = movement;
        Ok(())
    }

    pub fn survive_deletion(&self, key: AnchorKey) -> Result<bool> {
        Ok(self.live(key)?.survive_deletion)
    }

    pub fn set_survive_deletion(&mut self, key: AnchorKey, survive: bool) -> Result<()> {
        self.live_mut(key)?.survive_deletion = survive;
        Ok(())
    }

    /// Removes a node, handing its distance to the successor.
    fn remove_node(&mut self, node: NodeId) {
        let length = self.tree.get(node).map_or(0, |n| n.length);
        if let Some(next) = self.tree.next(node) {
            self.tree.modify(next, |n| n.length += length);
        }
        self.tree.remove(node);
    }

    /// Forgets an anchor. Deleted anchors can be released too.
    pub fn release(&mut self, key: AnchorKey) -> Result<()> {
        match self.live(key) {
            Ok(live) => {
                let node = live.node;
                self.remove_node(node);
            }
            Err(DocumentError::AnchorDeleted) => {}
            Err(e) => return Err(e),
        }
        self.vacate(key.slot);
        Ok(())
    }

    /// Reclaims every anchor whose handles were all dropped. Returns how many
    /// slots were freed.
    pub fn purge(&mut self) -> usize {
        let mut reclaimed = 0;
        for slot in 0..self.slots.len() as u32 {
            let dead_node = match &self.slots[slot as usize].state {
                SlotState::Live(live) if live.token.strong_count() == 0 => Some(Some(live.node)),
                SlotState::Deleted { token } if token.strong_count() == 0 => Some(None),
                _ => None,
            };
            if let Some(node) = dead_node {
                if let Some(node) = node {
                    self.remove_node(node);
                }
                self.vacate(slot);
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            tracing::debug!(
                "anchor sweep reclaimed {} slots, {} anchors remain",
                reclaimed,
                self.len()
            );
        }
        reclaimed
    }

    /// Moves anchors for an edit. Must be called exactly once per edit, with
    /// lengths in characters.
    pub fn apply(&mut self, change: &OffsetChange) {
        if self.tree.is_empty() {
            return;
        }
        if change.removal_length == 0 {
            if change.insertion_length > 0 {
                self.apply_insertion(change.offset, change.insertion_length);
            }
            return;
        }
        self.apply_replacement(change);
    }

    fn apply_insertion(&mut self, offset: usize, inserted: usize) {
        let after = self.first_after(offset);
        let candidate = match after {
            Some((next, _)) => self.tree.prev(next),
            None => self.tree.last(),
        };
        let candidate_pos = match after {
            Some((next, next_pos)) => next_pos - self.tree.get(next).map_or(0, |n| n.length),
            None => self.tree.total(),
        };

        let mut group = Vec::new();
        if let Some(first) = candidate.filter(|_| candidate_pos == offset) {
            let mut current = first;
            group.push(current);
            while self.tree.get(current).map_or(0, |n| n.length) == 0 {
                match self.tree.prev(current) {
                    Some(prev) => {
                        group.push(prev);
                        current = prev;
                    }
                    None => break,
                }
            }
            group.reverse();
        }

        tracing::trace!(
            "anchors: insert {} at {}, {} anchors at the insertion point",
            inserted,
            offset,
            group.len()
        );
        self.spread_insertion(&group, after.map(|(next, _)| next), inserted);
    }

    fn apply_replacement(&mut self, change: &OffsetChange) {
        let Some((first, first_pos)) = self.first_after(change.offset) else {
            return;
        };
        let removal_end = change.removal_end();
        let predecessor_pos = first_pos - self.tree.get(first).map_or(0, |n| n.length);

        let mut inside = Vec::new();
        let mut boundary = Some((first, first_pos));
        while let Some((node, pos)) = boundary {
            if pos >= removal_end {
                break;
            }
            inside.push(node);
            boundary = self
                .tree
                .next(node)
                .map(|next| (next, pos + self.tree.get(next).map_or(0, |n| n.length)));
        }

        let mut survivors = Vec::new();
        let mut deleted = 0;
        for node in inside {
            let Some(slot) = self.tree.get(node).map(|n| n.slot) else {
                continue;
            };
            if self.is_dropped(slot) {
                self.tree.remove(node);
                self.vacate(slot);
                continue;
            }
            let (survive, token) = self
                .live_slot(slot)
                .map_or((false, Weak::new()), |live| {
                    (live.survive_deletion, live.token.clone())
                });
            if survive {
                survivors.push(node);
            } else {
                self.slots[slot as usize].state = SlotState::Deleted { token };
                self.tree.remove(node);
                deleted += 1;
            }
        }

        let mut kept_pos = predecessor_pos;
        for (k, node) in survivors.iter().enumerate() {
            let length = if k == 0 { change.offset - kept_pos } else { 0 };
            self.tree.modify(*node, |n| n.length = length);
        }
        if !survivors.is_empty() {
            kept_pos = change.offset;
        }
        if let Some((node, pos)) = boundary {
            let length = pos - change.removal_length - kept_pos;
            self.tree.modify(node, |n| n.length = length);
        }

        tracing::trace!(
            "anchors: replace {}+{} with {}, {} collapsed, {} deleted",
            change.offset,
            change.removal_length,
            change.insertion_length,
            survivors.len(),
            deleted
        );

        if change.insertion_length > 0 {
            self.spread_insertion(
                &survivors,
                boundary.map(|(node, _)| node),
                change.insertion_length,
            );
        }
    }

    /// Splits the anchors of `group` (all at one offset, in order) around
    /// `inserted` new characters: `BeforeInsertion` anchors stay in front,
    /// `AfterInsertion` anchors move behind. `after` is the first anchor past
    /// the group.
    fn spread_insertion(&mut self, group: &[NodeId], after: Option<NodeId>, inserted: usize) {
        let mut paired: Vec<(AnchorMovement, u32)> = group
            .iter()
            .filter_map(|node| self.tree.get(*node).map(|n| n.slot))
            .map(|slot| {
                let movement = self
                    .live_slot(slot)
                    .map_or(AnchorMovement::AfterInsertion, |live| live.movement);
                (movement, slot)
            })
            .collect();
        // Stable: anchors keep their relative order on each side.
        paired.sort_by_key(|(movement, _)| *movement == AnchorMovement::AfterInsertion);

        let mut first_after = None;
        for (node, (movement, slot)) in group.iter().zip(paired.iter()) {
            if let Some(n) = self.tree.get_mut(*node) {
                n.slot = *slot;
            }
            if let Some(live) = self.live_slot_mut(*slot) {
                live.node = *node;
            }
            if first_after.is_none() && *movement == AnchorMovement::AfterInsertion {
                first_after = Some(*node);
            }
        }

        if let Some(node) = first_after.or(after) {
            self.tree.modify(node, |n| n.length += inserted);
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        self.tree.check_invariants()?;
        let mut live = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if let SlotState::Live(anchor) = &slot.state {
                live += 1;
                match self.tree.get(anchor.node) {
                    Some(node) if node.slot as usize == index => {}
                    _ => return Err(format!("anchor slot {index} lost its node")),
                }
            }
        }
        if live != self.tree.len() {
            return Err(format!(
                "{} live anchor slots but {} tree nodes",
                live,
                self.tree.len()
            ));
        }
        Ok(())
    }
}
