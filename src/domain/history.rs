/// Bounded movement history: the replay buffer behind the glitch
/// mechanic. While the level glitches, non-glitching things re-walk
/// these recorded positions instead of acting live.

use std::collections::VecDeque;

use super::action::Move;

/// Recorded positions kept per thing; oldest evicted first.
pub const MAX_HISTORY: usize = 10;

/// Ring of recorded moves with a cyclic read cursor.
///
/// The cursor survives `clear` — a thing that drains its energy and
/// later refills keeps replaying from wherever it left off, wrapping
/// on the next read.
#[derive(Clone, Debug, Default)]
pub struct History {
    entries: VecDeque<Move>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        History {
            entries: VecDeque::with_capacity(MAX_HISTORY),
            cursor: 0,
        }
    }

    /// Append a recorded move, evicting the oldest entry at capacity.
    pub fn record(&mut self, mv: Move) {
        if self.entries.len() == MAX_HISTORY {
            self.entries.pop_front();
        }
        self.entries.push_back(mv);
    }

    /// Next recorded move. The cursor wraps to 0 past the end, checked
    /// before the read.
    pub fn replay(&mut self) -> Option<Move> {
        if self.entries.is_empty() {
            return None;
        }
        if self.cursor >= self.entries.len() {
            self.cursor = 0;
        }
        let mv = self.entries[self.cursor];
        self.cursor += 1;
        Some(mv)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut h = History::new();
        for i in 0..15 {
            h.record(Move::snap(i as f64, 0.0));
        }
        assert_eq!(h.len(), MAX_HISTORY);
        // Entries 0..4 were evicted; the head is entry 5.
        assert_eq!(h.replay(), Some(Move::snap(5.0, 0.0)));
    }

    #[test]
    fn cursor_wraps_past_end() {
        let mut h = History::new();
        h.record(Move::snap(1.0, 1.0));
        h.record(Move::snap(2.0, 2.0));
        h.record(Move::snap(3.0, 3.0));

        assert_eq!(h.replay(), Some(Move::snap(1.0, 1.0)));
        assert_eq!(h.replay(), Some(Move::snap(2.0, 2.0)));
        assert_eq!(h.replay(), Some(Move::snap(3.0, 3.0)));
        // Fourth read wraps back to the head.
        assert_eq!(h.replay(), Some(Move::snap(1.0, 1.0)));
    }

    #[test]
    fn replay_on_empty_is_none() {
        let mut h = History::new();
        assert_eq!(h.replay(), None);
        h.record(Move::snap(4.0, 4.0));
        h.clear();
        assert_eq!(h.replay(), None);
    }

    #[test]
    fn cursor_survives_clear() {
        let mut h = History::new();
        for i in 0..3 {
            h.record(Move::snap(i as f64, 0.0));
        }
        h.replay();
        h.replay();
        h.clear();
        h.record(Move::snap(9.0, 9.0));
        // Cursor was at 2, past the single refilled entry: wraps to 0.
        assert_eq!(h.replay(), Some(Move::snap(9.0, 9.0)));
    }
}
