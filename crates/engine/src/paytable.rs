//! Symbols, paylines and win evaluation for a 5x3 video slot.
//!
//! Line wins pay left to right for three or more matching symbols, as a multiple
//! of the bet level (the per-line bet). The scatter pays nothing on lines; three
//! or more anywhere in the window award free spins.

use reelnexus_domain::{Credits, LineWin, PaytableEntry};

pub const REELS: usize = 5;
pub const ROWS: usize = 3;
pub const MAX_LINES: u32 = 10;

pub const SCATTER: u8 = 7;
pub const SCATTER_TRIGGER: usize = 3;
pub const FREE_SPINS_AWARD: u32 = 5;

const SYMBOL_NAMES: [&str; 8] = [
    "Cherry", "Lemon", "Orange", "Plum", "Bell", "Bar", "Seven", "Scatter",
];

/// Multipliers for 3, 4 and 5 of a kind, indexed by symbol.
const PAYS: [[u32; 3]; 7] = [
    [5, 10, 25],
    [5, 15, 30],
    [10, 20, 50],
    [10, 25, 75],
    [20, 50, 150],
    [25, 100, 250],
    [50, 200, 1000],
];

/// Row visited on each reel, one entry per payline.
const PAYLINES: [[usize; REELS]; MAX_LINES as usize] = [
    [1, 1, 1, 1, 1],
    [0, 0, 0, 0, 0],
    [2, 2, 2, 2, 2],
    [0, 1, 2, 1, 0],
    [2, 1, 0, 1, 2],
    [0, 0, 1, 2, 2],
    [2, 2, 1, 0, 0],
    [1, 0, 0, 0, 1],
    [1, 2, 2, 2, 1],
    [0, 1, 1, 1, 0],
];

/// Reel strip shared by all five reels; low symbols are more frequent.
pub const STRIP: [u8; 32] = [
    0, 1, 2, 0, 3, 1, 4, 0, 2, 5, 1, 0, 3, 7, 2, 1, 0, 4, 1, 3, 6, 0, 2, 1, 5, 0, 3, 7, 1, 2,
    0, 4,
];

pub fn paytable() -> Vec<PaytableEntry> {
    PAYS.iter()
        .enumerate()
        .map(|(symbol, pays)| PaytableEntry {
            symbol: symbol as u8,
            name: SYMBOL_NAMES[symbol].to_string(),
            pays: *pays,
        })
        .collect()
}

/// Visible window for the given strip stops, one column per reel.
pub fn window(stops: [usize; REELS]) -> Vec<Vec<u8>> {
    stops
        .iter()
        .map(|stop| {
            (0..ROWS)
                .map(|row| STRIP[(stop + row) % STRIP.len()])
                .collect()
        })
        .collect()
}

/// Evaluate the first `lines` paylines of `window` at `bet_level` per line.
pub fn evaluate_lines(window: &[Vec<u8>], lines: u32, bet_level: Credits) -> Vec<LineWin> {
    PAYLINES
        .iter()
        .take(lines.min(MAX_LINES) as usize)
        .enumerate()
        .filter_map(|(index, rows)| {
            let symbols: Vec<u8> = rows
                .iter()
                .enumerate()
                .filter_map(|(reel, row)| window.get(reel).and_then(|col| col.get(*row)).copied())
                .collect();
            let first = *symbols.first()?;
            if first == SCATTER {
                return None;
            }
            let count = symbols.iter().take_while(|s| **s == first).count();
            if count < 3 {
                return None;
            }
            let multiplier = PAYS.get(first as usize)?[count - 3];
            Some(LineWin {
                line: index as u32 + 1,
                symbol: first,
                count: count as u8,
                amount: Credits::from(multiplier).saturating_mul(bet_level),
            })
        })
        .collect()
}

pub fn count_scatters(window: &[Vec<u8>]) -> usize {
    window.iter().flatten().filter(|s| **s == SCATTER).count()
}
