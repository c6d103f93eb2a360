use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a note within a chart and across collaborating peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub u64);

/// Stable identity of a gimmick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GimmickId(pub u64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{:x}", self.0)
    }
}

impl fmt::Display for GimmickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{:x}", self.0)
    }
}

const SERIAL_BITS: u32 = 48;
const SERIAL_MASK: u64 = (1 << SERIAL_BITS) - 1;

/// Hands out ids as `namespace << 48 | serial`.
///
/// Each collaborating peer uses its own namespace, so ids allocated
/// independently never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    namespace: u16,
    next_serial: u64,
}

impl IdAllocator {
    pub fn new(namespace: u16) -> Self {
        Self {
            namespace,
            next_serial: 1,
        }
    }

    pub fn namespace(&self) -> u16 {
        self.namespace
    }

    /// Switch namespace without reusing serials already handed out.
    pub fn set_namespace(&mut self, namespace: u16) {
        self.namespace = namespace;
    }

    pub fn next_note(&mut self) -> NoteId {
        NoteId(self.next_raw())
    }

    pub fn next_gimmick(&mut self) -> GimmickId {
        GimmickId(self.next_raw())
    }

    /// Make sure future serials in this namespace skip past `raw`.
    pub fn observe(&mut self, raw: u64) {
        if raw >> SERIAL_BITS == self.namespace as u64 {
            self.next_serial = self.next_serial.max((raw & SERIAL_MASK) + 1);
        }
    }

    /// Restart serials; used when a chart is cleared.
    pub fn reset(&mut self) {
        self.next_serial = 1;
    }

    fn next_raw(&mut self) -> u64 {
        let raw = ((self.namespace as u64) << SERIAL_BITS) | (self.next_serial & SERIAL_MASK);
        self.next_serial += 1;
        raw
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_do_not_collide() {
        let mut a = IdAllocator::new(0);
        let mut b = IdAllocator::new(1);
        let ids_a: Vec<_> = (0..4).map(|_| a.next_note()).collect();
        let ids_b: Vec<_> = (0..4).map(|_| b.next_note()).collect();
        for id in &ids_a {
            assert!(!ids_b.contains(id));
        }
    }

    #[test]
    fn observe_skips_past_foreign_serials_in_same_namespace() {
        let mut alloc = IdAllocator::new(2);
        alloc.observe((2u64 << 48) | 41);
        alloc.observe((3u64 << 48) | 900);
        assert_eq!(alloc.next_note().0, (2u64 << 48) | 42);
    }

    #[test]
    fn notes_and_gimmicks_share_a_counter() {
        let mut alloc = IdAllocator::default();
        let n = alloc.next_note();
        let g = alloc.next_gimmick();
        assert_ne!(n.0, g.0);
    }
}
