//! In-memory reference authority.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use reelnexus_domain::{Credits, PlayerId, SpinId};
use reelnexus_shared::{SpinRequest, SpinResult};

use crate::authority::GameAuthority;
use crate::error::AuthorityError;
use crate::paytable::{self, FREE_SPINS_AWARD, MAX_LINES, REELS, SCATTER_TRIGGER};

#[derive(Debug, Clone, Default)]
struct Wallet {
    balance: Credits,
    free_spins: u32,
    total_spins: u64,
    last_spin: Option<SpinId>,
}

struct EngineState {
    wallets: HashMap<PlayerId, Wallet>,
    rng: StdRng,
}

/// A 5x3, ten-line video slot holding one wallet per player.
///
/// Wallets are opened on first contact with `starting_balance`.
pub struct SlotEngine {
    starting_balance: Credits,
    state: Mutex<EngineState>,
}

impl SlotEngine {
    pub fn new(starting_balance: Credits) -> Self {
        Self::with_rng(starting_balance, StdRng::from_entropy())
    }

    /// Deterministic engine for tests and replays.
    pub fn seeded(starting_balance: Credits, seed: u64) -> Self {
        Self::with_rng(starting_balance, StdRng::seed_from_u64(seed))
    }

    fn with_rng(starting_balance: Credits, rng: StdRng) -> Self {
        Self {
            starting_balance,
            state: Mutex::new(EngineState {
                wallets: HashMap::new(),
                rng,
            }),
        }
    }

    fn validate(request: &SpinRequest) -> Result<(), AuthorityError> {
        let ctx = &request.context;
        if !(1..=MAX_LINES).contains(&ctx.lines) {
            return Err(AuthorityError::invalid_bet(format!(
                "line count {} outside 1..={MAX_LINES}",
                ctx.lines
            )));
        }
        if ctx.bet_level == 0 {
            return Err(AuthorityError::invalid_bet("bet level must be positive"));
        }
        let expected = if ctx.free_spin {
            0
        } else {
            ctx.bet_level
                .checked_mul(Credits::from(ctx.lines))
                .ok_or_else(|| {
                    AuthorityError::invalid_bet(format!(
                        "stake {} x {} lines overflows",
                        ctx.bet_level, ctx.lines
                    ))
                })?
        };
        if request.bet_amount != expected {
            return Err(AuthorityError::invalid_bet(format!(
                "stake {} does not match {} x {} lines",
                request.bet_amount, ctx.bet_level, ctx.lines
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GameAuthority for SlotEngine {
    async fn spin(&self, request: &SpinRequest) -> Result<SpinResult, AuthorityError> {
        Self::validate(request)?;
        let ctx = &request.context;

        let mut guard = self.state.lock().await;
        let EngineState { wallets, rng } = &mut *guard;
        let wallet = wallets
            .entry(ctx.player_id.clone())
            .or_insert_with(|| Wallet {
                balance: self.starting_balance,
                ..Wallet::default()
            });

        if ctx.free_spin {
            if wallet.free_spins == 0 {
                return Err(AuthorityError::invalid_bet("no free spins remaining"));
            }
            wallet.free_spins -= 1;
        } else {
            if request.bet_amount > wallet.balance {
                return Err(AuthorityError::InsufficientFunds {
                    required: request.bet_amount,
                    available: wallet.balance,
                });
            }
            wallet.balance -= request.bet_amount;
        }

        let mut stops = [0usize; REELS];
        for stop in stops.iter_mut() {
            *stop = rng.gen_range(0..paytable::STRIP.len());
        }
        let reels = paytable::window(stops);
        let line_wins = paytable::evaluate_lines(&reels, ctx.lines, ctx.bet_level);
        let win_amount = line_wins
            .iter()
            .fold(0, |total: Credits, w| total.saturating_add(w.amount));
        let free_spins_awarded = if paytable::count_scatters(&reels) >= SCATTER_TRIGGER {
            FREE_SPINS_AWARD
        } else {
            0
        };

        wallet.balance = wallet.balance.saturating_add(win_amount);
        wallet.free_spins += free_spins_awarded;
        wallet.total_spins += 1;
        wallet.last_spin = Some(ctx.spin_id);

        tracing::debug!(
            player_id = %ctx.player_id,
            spin_id = %ctx.spin_id,
            bet = request.bet_amount,
            win = win_amount,
            free_spins_awarded,
            "Spin settled"
        );

        Ok(SpinResult {
            spin_id: ctx.spin_id,
            reels,
            win_amount,
            line_wins,
            free_spins_awarded,
            balance: Some(wallet.balance),
        })
    }

    async fn balance(&self, player_id: &PlayerId) -> Result<Credits, AuthorityError> {
        let state = self.state.lock().await;
        Ok(state
            .wallets
            .get(player_id)
            .map_or(self.starting_balance, |w| w.balance))
    }

    async fn game_state(&self, player_id: &PlayerId) -> Result<Value, AuthorityError> {
        let state = self.state.lock().await;
        let wallet = state.wallets.get(player_id).cloned().unwrap_or(Wallet {
            balance: self.starting_balance,
            ..Wallet::default()
        });
        Ok(json!({
            "playerId": player_id,
            "balance": wallet.balance,
            "freeSpinsRemaining": wallet.free_spins,
            "totalSpins": wallet.total_spins,
            "lastSpinId": wallet.last_spin,
            "maxLines": MAX_LINES,
            "paytable": paytable::paytable(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelnexus_domain::SessionId;
    use reelnexus_shared::SpinContext;

    fn request(bet_level: Credits, lines: u32) -> SpinRequest {
        SpinRequest {
            bet_amount: bet_level * Credits::from(lines),
            context: SpinContext {
                player_id: PlayerId::new("p1"),
                session_id: SessionId::new(),
                spin_id: SpinId::new(),
                bet_level,
                lines,
                free_spin: false,
            },
        }
    }

    #[tokio::test]
    async fn balance_moves_by_stake_and_win() {
        let engine = SlotEngine::seeded(1_000, 7);
        let player = PlayerId::new("p1");

        for _ in 0..20 {
            let before = engine.balance(&player).await.unwrap();
            let result = engine.spin(&request(2, 10)).await.unwrap();
            assert_eq!(result.balance, Some(before - 20 + result.win_amount));
            assert_eq!(
                result.win_amount,
                result.line_wins.iter().map(|w| w.amount).sum::<Credits>()
            );
        }
    }

    #[tokio::test]
    async fn stake_above_balance_is_refused_without_debit() {
        let engine = SlotEngine::seeded(50, 1);
        let err = engine.spin(&request(10, 10)).await.unwrap_err();
        assert!(matches!(
            err,
            AuthorityError::InsufficientFunds {
                required: 100,
                available: 50
            }
        ));
        assert_eq!(engine.balance(&PlayerId::new("p1")).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn free_spin_needs_an_award() {
        let engine = SlotEngine::seeded(100, 1);
        let mut free = request(1, 10);
        free.bet_amount = 0;
        free.context.free_spin = true;
        assert!(matches!(
            engine.spin(&free).await,
            Err(AuthorityError::InvalidBet(_))
        ));
    }

    #[tokio::test]
    async fn mismatched_stake_is_invalid() {
        let engine = SlotEngine::seeded(100, 1);
        let mut bad = request(1, 10);
        bad.bet_amount = 7;
        assert!(matches!(
            engine.spin(&bad).await,
            Err(AuthorityError::InvalidBet(_))
        ));
        assert!(matches!(
            engine.spin(&request(1, 11)).await,
            Err(AuthorityError::InvalidBet(_))
        ));
    }

    #[tokio::test]
    async fn overflowing_stake_is_invalid() {
        let engine = SlotEngine::seeded(100, 1);
        let mut huge = request(1, 10);
        huge.context.bet_level = Credits::MAX;
        huge.bet_amount = Credits::MAX.wrapping_mul(10);
        assert!(matches!(
            engine.spin(&huge).await,
            Err(AuthorityError::InvalidBet(_))
        ));
        assert_eq!(engine.balance(&PlayerId::new("p1")).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn game_state_reports_wallet() {
        let engine = SlotEngine::seeded(500, 3);
        let result = engine.spin(&request(1, 5)).await.unwrap();
        let state = engine.game_state(&PlayerId::new("p1")).await.unwrap();
        assert_eq!(state["totalSpins"], 1);
        assert_eq!(state["balance"], result.balance.unwrap());
        assert_eq!(state["freeSpinsRemaining"], result.free_spins_awarded);
        assert_eq!(state["paytable"].as_array().map(Vec::len), Some(7));
    }
}
