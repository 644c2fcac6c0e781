//! Bet configuration and automatic bet de-escalation.
//!
//! Total stake = bet level x active line count. When the stake exceeds the balance
//! the ledger looks for the richest affordable configuration instead of refusing
//! the spin outright.

use serde::{Deserialize, Serialize};

use crate::Credits;

/// A (bet level, line count) pair the ledger may switch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BetAdjustment {
    pub level_index: usize,
    pub lines: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetConfig {
    levels: Vec<Credits>,
    level_index: usize,
    max_lines: u32,
    lines: u32,
}

impl BetConfig {
    /// Build a configuration with every line active.
    ///
    /// Levels are sorted ascending; an out-of-range index is clamped to the top level.
    pub fn new(mut levels: Vec<Credits>, level_index: usize, max_lines: u32) -> Self {
        levels.sort_unstable();
        levels.dedup();
        let level_index = level_index.min(levels.len().saturating_sub(1));
        let max_lines = max_lines.max(1);
        Self {
            levels,
            level_index,
            max_lines,
            lines: max_lines,
        }
    }

    pub fn levels(&self) -> &[Credits] {
        &self.levels
    }

    pub fn level_index(&self) -> usize {
        self.level_index
    }

    pub fn level(&self) -> Credits {
        self.levels.get(self.level_index).copied().unwrap_or(0)
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn max_lines(&self) -> u32 {
        self.max_lines
    }

    pub fn total_bet(&self) -> Credits {
        self.level().saturating_mul(Credits::from(self.lines))
    }

    /// Select a bet level. Returns false if the index does not exist.
    pub fn select_level(&mut self, index: usize) -> bool {
        if index < self.levels.len() {
            self.level_index = index;
            true
        } else {
            false
        }
    }

    /// Select the active line count. Returns false if outside `1..=max_lines`.
    pub fn select_lines(&mut self, lines: u32) -> bool {
        if (1..=self.max_lines).contains(&lines) {
            self.lines = lines;
            true
        } else {
            false
        }
    }

    /// Search for the first affordable configuration.
    ///
    /// Line counts are walked from the maximum downward and, for each line count,
    /// bet levels from the highest downward; the first pair whose product does not
    /// exceed `balance` wins. Keeping the line count high first means the player
    /// keeps every payline active whenever some level allows it.
    pub fn fit_to_balance(&self, balance: Credits) -> Option<BetAdjustment> {
        (1..=self.max_lines).rev().find_map(|lines| {
            self.levels
                .iter()
                .enumerate()
                .rev()
                .find(|(_, level)| {
                    level
                        .checked_mul(Credits::from(lines))
                        .is_some_and(|total| total <= balance)
                })
                .map(|(level_index, _)| BetAdjustment { level_index, lines })
        })
    }

    pub fn apply(&mut self, adjustment: BetAdjustment) {
        self.select_level(adjustment.level_index);
        self.select_lines(adjustment.lines);
    }
}

impl Default for BetConfig {
    fn default() -> Self {
        Self::new(vec![1, 2, 5, 10, 20, 50], 0, 10)
    }
}
