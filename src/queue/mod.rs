//! Prioritized command queue.
//!
//! Descending priority, FIFO within equal priority, bounded at
//! `max_commands_per_tick × 4`. Over-limit enqueues evict the
//! lowest-priority tail so a burst of routine orders can never starve an
//! urgent one. Drains are atomic and at-most-once: a drained command is
//! gone from the engine.

use tracing::warn;

use crate::types::Command;

pub struct CommandQueue {
    /// Sorted descending by priority, insertion order within a priority
    entries: Vec<Command>,
    capacity: usize,
    dropped: u64,
}

impl CommandQueue {
    /// Capacity multiplier over the host's per-tick drain cap.
    pub const CAPACITY_FACTOR: usize = 4;

    pub fn new(max_commands_per_tick: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: max_commands_per_tick.max(1) * Self::CAPACITY_FACTOR,
            dropped: 0,
        }
    }

    pub fn set_max_commands_per_tick(&mut self, max_commands_per_tick: usize) {
        self.capacity = max_commands_per_tick.max(1) * Self::CAPACITY_FACTOR;
    }

    /// Insert preserving order. Returns false when the command was dropped
    /// because the queue is full of higher-priority work.
    pub fn enqueue(&mut self, command: Command) -> bool {
        if self.entries.len() >= self.capacity {
            // The tail is the lowest-priority, newest entry
            let tail_priority = self.entries.last().map(|c| c.priority).unwrap_or(0);
            if command.priority <= tail_priority {
                self.dropped += 1;
                warn!(
                    command_type = %command.command_type,
                    priority = command.priority,
                    "queue full, dropping incoming low-priority command"
                );
                return false;
            }
            if let Some(evicted) = self.entries.pop() {
                self.dropped += 1;
                warn!(
                    command_type = %evicted.command_type,
                    priority = evicted.priority,
                    "queue full, evicting lowest-priority tail"
                );
            }
        }

        // First index with strictly lower priority keeps FIFO within ties
        let at = self
            .entries
            .partition_point(|c| c.priority >= command.priority);
        self.entries.insert(at, command);
        true
    }

    /// Remove and return up to `max_n` highest-priority commands.
    pub fn drain(&mut self, max_n: usize) -> Vec<Command> {
        let take = max_n.min(self.entries.len());
        self.entries.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard everything (AO teardown).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Peek without removing, highest priority first.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommandPayload, CommandType, Position};

    fn command(priority: u8, tag: &str) -> Command {
        Command {
            command_type: CommandType::MoveTo,
            group_id: tag.to_string(),
            payload: CommandPayload::MoveTo {
                position: Position::new(0.0, 0.0, 0.0),
                speed: None,
                formation: None,
                behaviour: None,
                combat_mode: None,
            },
            priority,
            timestamp_ms: 0,
            cycle: 1,
            validated: true,
            objective_id: None,
        }
    }

    #[test]
    fn drains_by_priority_then_fifo() {
        let mut queue = CommandQueue::new(10);
        queue.enqueue(command(3, "a"));
        queue.enqueue(command(9, "b"));
        queue.enqueue(command(3, "c"));
        queue.enqueue(command(9, "d"));

        let drained = queue.drain(10);
        let tags: Vec<&str> = drained.iter().map(|c| c.group_id.as_str()).collect();
        assert_eq!(tags, vec!["b", "d", "a", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_respects_cap_and_removes() {
        let mut queue = CommandQueue::new(10);
        for i in 0..5 {
            queue.enqueue(command(5, &format!("g{i}")));
        }
        let first = queue.drain(2);
        assert_eq!(first.len(), 2);
        assert_eq!(queue.len(), 3);
        // At-most-once: a second drain never sees the first batch
        let second = queue.drain(10);
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|c| c.group_id != "g0" && c.group_id != "g1"));
    }

    #[test]
    fn overflow_evicts_lowest_tail() {
        let mut queue = CommandQueue::new(1); // capacity 4
        for i in 0..4 {
            queue.enqueue(command(2, &format!("low{i}")));
        }
        assert!(queue.enqueue(command(8, "urgent")));
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.dropped(), 1);
        let drained = queue.drain(4);
        assert_eq!(drained[0].group_id, "urgent");
        assert!(drained.iter().all(|c| c.group_id != "low3"));
    }

    #[test]
    fn overflow_drops_incoming_when_lowest() {
        let mut queue = CommandQueue::new(1);
        for i in 0..4 {
            queue.enqueue(command(5, &format!("g{i}")));
        }
        assert!(!queue.enqueue(command(3, "straggler")));
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn clear_empties() {
        let mut queue = CommandQueue::new(2);
        queue.enqueue(command(5, "x"));
        queue.clear();
        assert!(queue.is_empty());
    }
}
