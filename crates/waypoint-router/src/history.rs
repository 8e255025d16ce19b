use std::collections::VecDeque;

use waypoint_core::{ConversationTurn, Role};

/// Bounded conversation history
///
/// When over capacity the oldest turns go first. A user turn and the
/// assistant reply that follows it are dropped together so the window never
/// starts with an orphaned reply.
#[derive(Debug, Clone)]
pub struct History {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl History {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// Append a turn and trim to capacity
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);

        while self.turns.len() > self.max_turns {
            let starts_pair = matches!(
                (self.turns.front(), self.turns.get(1)),
                (Some(first), Some(second)) if first.role == Role::User && second.role == Role::Assistant
            );

            self.turns.pop_front();
            if starts_pair {
                self.turns.pop_front();
            }
        }

        // a reply whose user turn is gone is dropped too
        while self.turns.front().is_some_and(|t| t.role == Role::Assistant) && self.turns.len() > 1 {
            self.turns.pop_front();
        }
    }

    /// All retained turns, oldest first
    pub fn window(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// The last `n` turns, oldest first
    pub fn window_for_discovery(&self, n: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// Number of user turns retained
    pub fn turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::User).count()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
