//! Rolling conversation window and the sanitize step applied before every
//! backend call.

use std::collections::VecDeque;

use crate::state::{ChatRole, ConversationTurn};

pub const DEFAULT_HISTORY_WINDOW: usize = 6;

/// Bounded, oldest-first window of the most recent turns.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Owned copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Snapshot with [`sanitize`] already applied.
    pub fn sanitized(&self) -> Vec<ConversationTurn> {
        sanitize(&self.snapshot())
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

/// Make a turn list acceptable to the backend's chat protocol.
///
/// Blank turns are dropped first, then everything before the first user turn.
/// The result is either empty or starts with a user turn.
pub fn sanitize(turns: &[ConversationTurn]) -> Vec<ConversationTurn> {
    let non_blank: Vec<&ConversationTurn> = turns
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .collect();

    match non_blank.iter().position(|turn| turn.role == ChatRole::User) {
        Some(first_user) => non_blank[first_user..]
            .iter()
            .map(|turn| (*turn).clone())
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_leading_assistant_turns() {
        let turns = vec![
            ConversationTurn::assistant("Salam! Necə kömək edim?"),
            ConversationTurn::assistant("Ödənişin var?"),
            ConversationTurn::user("Azercell"),
            ConversationTurn::assistant("Nə qədər?"),
        ];
        let sanitized = sanitize(&turns);
        assert_eq!(sanitized.len(), 2);
        assert_eq!(sanitized[0], ConversationTurn::user("Azercell"));
    }

    #[test]
    fn test_no_user_turn_yields_empty() {
        let turns = vec![
            ConversationTurn::assistant("welcome"),
            ConversationTurn::assistant("anything else?"),
        ];
        assert!(sanitize(&turns).is_empty());
    }

    #[test]
    fn test_blank_turns_removed_before_search() {
        // The blank user turn must not anchor the window.
        let turns = vec![
            ConversationTurn::user("   "),
            ConversationTurn::assistant("receipt follows"),
            ConversationTurn::user("5 manat"),
        ];
        let sanitized = sanitize(&turns);
        assert_eq!(sanitized, vec![ConversationTurn::user("5 manat")]);
    }

    #[test]
    fn test_sanitized_output_starts_with_user_for_all_role_mixes() {
        // Exhaust every role/blankness combination of length four.
        for mask in 0u32..256 {
            let turns: Vec<ConversationTurn> = (0..4)
                .map(|i| {
                    let role_bit = (mask >> (i * 2)) & 1;
                    let blank_bit = (mask >> (i * 2 + 1)) & 1;
                    let text = if blank_bit == 1 { " " } else { "x" };
                    if role_bit == 1 {
                        ConversationTurn::user(text)
                    } else {
                        ConversationTurn::assistant(text)
                    }
                })
                .collect();
            let sanitized = sanitize(&turns);
            if let Some(first) = sanitized.first() {
                assert_eq!(first.role, ChatRole::User, "mask {mask:#010b}");
            }
            assert!(sanitized.iter().all(|t| !t.text.trim().is_empty()));
        }
    }

    #[test]
    fn test_window_keeps_most_recent_turns() {
        let mut window = HistoryWindow::new(3);
        for i in 0..5 {
            window.push(ConversationTurn::user(format!("turn {i}")));
        }
        let snapshot = window.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].text, "turn 2");
        assert_eq!(snapshot[2].text, "turn 4");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut window = HistoryWindow::new(0);
        window.push(ConversationTurn::user("a"));
        window.push(ConversationTurn::user("b"));
        assert_eq!(window.len(), 1);
        assert_eq!(window.capacity(), 1);
    }
}
