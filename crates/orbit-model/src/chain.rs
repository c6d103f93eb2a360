use std::collections::HashSet;

use crate::chart::Chart;
use crate::error::ChainError;
use crate::ids::NoteId;
use crate::note::{ChainRole, Note};

impl Chart {
    /// First note of the chain containing `id`.
    pub fn chain_head(&self, id: NoteId) -> Option<&Note> {
        let mut current = self.note(id)?;
        for _ in 0..self.note_count() {
            match current.prev.and_then(|p| self.note(p)) {
                Some(prev) => current = prev,
                None => return Some(current),
            }
        }
        tracing::warn!(%id, "chain walk did not terminate; returning last visited note");
        Some(current)
    }

    /// Last note of the chain containing `id`.
    pub fn chain_tail(&self, id: NoteId) -> Option<&Note> {
        let mut current = self.note(id)?;
        for _ in 0..self.note_count() {
            match current.next.and_then(|n| self.note(n)) {
                Some(next) => current = next,
                None => return Some(current),
            }
        }
        tracing::warn!(%id, "chain walk did not terminate; returning last visited note");
        Some(current)
    }

    /// Every note of the chain containing `id`, head to tail. A note outside
    /// any chain yields just itself; a missing id yields nothing.
    pub fn references(&self, id: NoteId) -> Vec<&Note> {
        let Some(head) = self.chain_head(id) else {
            return Vec::new();
        };
        let mut chain = vec![head];
        let mut seen = HashSet::from([head.id]);
        let mut current = head;
        while let Some(next) = current.next.and_then(|n| self.note(n)) {
            if !seen.insert(next.id) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Check the structural invariants of every hold/trace chain: links are
    /// symmetric and resolve, chains are acyclic and tick-ordered, and each
    /// member's type matches its family and role.
    pub fn verify_chains(&self) -> Result<(), ChainError> {
        for note in self.notes() {
            if note.prev.is_none() && note.next.is_none() {
                if note.note_type.chain_role().is_some_and(|r| r != ChainRole::Start) {
                    return Err(ChainError::WrongRole(note.id));
                }
                continue;
            }
            let Some(family) = note.note_type.chain_family() else {
                return Err(ChainError::NotChainMember(note.id));
            };

            if let Some(prev_id) = note.prev {
                let prev = self.note(prev_id).ok_or(ChainError::Dangling {
                    from: note.id,
                    to: prev_id,
                })?;
                if prev.next != Some(note.id) {
                    return Err(ChainError::Asymmetric {
                        from: prev_id,
                        to: note.id,
                    });
                }
            }
            if let Some(next_id) = note.next {
                let next = self.note(next_id).ok_or(ChainError::Dangling {
                    from: note.id,
                    to: next_id,
                })?;
                if next.prev != Some(note.id) {
                    return Err(ChainError::Asymmetric {
                        from: note.id,
                        to: next_id,
                    });
                }
                if next.full_tick() < note.full_tick() {
                    return Err(ChainError::Unordered(note.id));
                }
                if next.note_type.chain_family() != Some(family) {
                    return Err(ChainError::WrongRole(next_id));
                }
            }

            let expected = match (note.prev, note.next) {
                (None, _) => ChainRole::Start,
                (Some(_), Some(_)) => ChainRole::Segment,
                (Some(_), None) => ChainRole::End,
            };
            if note.note_type.chain_role() != Some(expected) {
                return Err(ChainError::WrongRole(note.id));
            }
        }

        // Links are symmetric at this point, so anything unreachable from a
        // head sits on a headless loop.
        let mut reached = HashSet::new();
        for head in self.notes().filter(|n| n.prev.is_none() && n.next.is_some()) {
            let mut current = head;
            reached.insert(current.id);
            while let Some(next) = current.next.and_then(|n| self.note(n)) {
                if !reached.insert(next.id) {
                    return Err(ChainError::Cycle(next.id));
                }
                current = next;
            }
        }
        if let Some(looped) = self
            .notes()
            .find(|n| n.prev.is_some() && !reached.contains(&n.id))
        {
            return Err(ChainError::Cycle(looped.id));
        }
        Ok(())
    }
}
