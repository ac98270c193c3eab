// ABOUTME: Allocates monotonically increasing, parity-correct stream ids
// ABOUTME: Client-initiated connections use odd ids, server-initiated (acceptor) use even

use std::collections::HashSet;
use std::sync::Mutex;

/// 31-bit stream ids wrap just below the reserved-bit boundary.
const MAX_STREAM_ID: u32 = (1u32 << 31) - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    Odd,
    Even,
}

impl Parity {
    /// The parity used by the side of the connection that sent SETUP.
    pub fn for_setup_sender() -> Self {
        Parity::Odd
    }

    pub fn for_setup_receiver() -> Self {
        Parity::Even
    }

    pub fn matches_id(self, id: u32) -> bool {
        match self {
            Parity::Odd => id % 2 == 1,
            Parity::Even => id % 2 == 0,
        }
    }

    fn first(self) -> u32 {
        match self {
            Parity::Odd => 1,
            Parity::Even => 2,
        }
    }
}

/// Issues ids of one parity, never reusing an id still present in the active-stream set.
///
/// `next()` takes the active-id set as an argument (rather than owning it) because the
/// connection owns that map exclusively — see the "cyclic lifetime" design note — and
/// the supplier must not assume anything about it beyond membership testing.
pub struct StreamIdSupplier {
    parity: Parity,
    last: Mutex<u32>,
}

impl StreamIdSupplier {
    pub fn new(parity: Parity) -> Self {
        Self {
            parity,
            last: Mutex::new(0),
        }
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// Smallest integer greater than the last-issued id, of the correct parity, that is
    /// not currently active. Wraps to the smallest id of the correct parity once the
    /// sequential search would exceed `MAX_STREAM_ID`.
    pub fn next(&self, active: &HashSet<u32>) -> u32 {
        let mut last = self.last.lock().unwrap();
        let mut candidate = next_of_parity(*last, self.parity);
        loop {
            if candidate > MAX_STREAM_ID {
                candidate = self.parity.first();
            }
            if !active.contains(&candidate) {
                *last = candidate;
                return candidate;
            }
            candidate = next_of_parity(candidate, self.parity);
        }
    }

    /// True iff `id` could have been legitimately issued by this supplier already —
    /// i.e. it has the right parity and does not exceed the highest id issued so far
    /// (accounting for one wrap). Used to tell "late frame for an id we closed" apart
    /// from "frame for an id that was never allocated", which is a fatal framing error.
    pub fn is_before_or_current(&self, id: u32) -> bool {
        if !self.parity.matches_id(id) {
            return false;
        }
        let last = *self.last.lock().unwrap();
        id <= last || last == 0
    }
}

fn next_of_parity(last: u32, parity: Parity) -> u32 {
    let candidate = last.saturating_add(1);
    if parity.matches_id(candidate) {
        candidate
    } else {
        candidate.saturating_add(1)
    }
}

/// Validates that an inbound stream-initiating frame's id has the parity expected of
/// the peer that did *not* send SETUP from our point of view, i.e. the opposite of our
/// own issuing parity.
pub fn peer_parity(local: Parity) -> Parity {
    match local {
        Parity::Odd => Parity::Even,
        Parity::Even => Parity::Odd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_smallest_unused_odd_ids() {
        let supplier = StreamIdSupplier::new(Parity::Odd);
        let mut active = HashSet::new();
        assert_eq!(supplier.next(&active), 1);
        active.insert(1);
        assert_eq!(supplier.next(&active), 3);
        active.insert(3);
        active.remove(&1);
        // 1 is free again but the supplier only searches forward from `last`.
        assert_eq!(supplier.next(&active), 5);
    }

    #[test]
    fn even_supplier_starts_at_two() {
        let supplier = StreamIdSupplier::new(Parity::Even);
        let active = HashSet::new();
        assert_eq!(supplier.next(&active), 2);
    }

    #[test]
    fn wraps_to_smallest_unused_of_parity_past_max() {
        let supplier = StreamIdSupplier::new(Parity::Odd);
        *supplier.last.lock().unwrap() = MAX_STREAM_ID;
        let mut active = HashSet::new();
        active.insert(1);
        assert_eq!(supplier.next(&active), 3);
    }

    #[test]
    fn is_before_or_current_rejects_wrong_parity() {
        let supplier = StreamIdSupplier::new(Parity::Odd);
        let active = HashSet::new();
        let _ = supplier.next(&active);
        assert!(!supplier.is_before_or_current(2));
    }

    #[test]
    fn is_before_or_current_rejects_never_issued() {
        let supplier = StreamIdSupplier::new(Parity::Odd);
        let active = HashSet::new();
        assert_eq!(supplier.next(&active), 1);
        assert!(supplier.is_before_or_current(1));
        assert!(!supplier.is_before_or_current(101));
    }
}
