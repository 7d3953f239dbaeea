use std::collections::VecDeque;

use super::state::GameState;

/// Bounded list of state snapshots, oldest first. Pushing past the limit
/// drops the oldest snapshot.
#[derive(Debug, Clone, Default)]
pub struct History {
    snapshots: VecDeque<GameState>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    pub fn record(&mut self, state: &GameState) {
        if self.limit == 0 {
            return;
        }
        while self.snapshots.len() >= self.limit {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(state.clone());
    }

    pub fn latest(&self) -> Option<&GameState> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameState> {
        self.snapshots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::GameConfig;

    #[test]
    fn oldest_snapshot_is_evicted_at_limit() {
        let mut history = History::new(2);
        let mut state = GameState::new(GameConfig::default(), Vec::new());
        for turn in 1..=3 {
            state.turn_number = turn;
            history.record(&state);
        }
        let turns: Vec<u32> = history.iter().map(|snapshot| snapshot.turn_number).collect();
        assert_eq!(turns, vec![2, 3]);
        assert_eq!(history.latest().map(|snapshot| snapshot.turn_number), Some(3));
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let mut history = History::new(0);
        history.record(&GameState::new(GameConfig::default(), Vec::new()));
        assert!(history.is_empty());
    }
}
