//! Game settlement arithmetic
//!
//! The game reports post-match balances. Before the wager moves, each
//! participant's chain balance is brought to the pre-match figure implied by
//! the report: `winner - wager` for the winner, `loser + wager` for the loser.

use crate::types::{RelayError, Result};

/// Correction applied to one participant before the wager transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceAdjustment {
    None,
    /// Treasury sends this amount to the participant
    TopUp(u64),
    /// Participant returns this surplus to the treasury
    Refund(u64),
}

/// Expected pre-match balances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementTargets {
    pub winner: u64,
    pub loser: u64,
}

/// Rejects reports that cannot describe a real match
pub fn targets(winner_balance: u64, loser_balance: u64, wager: u64) -> Result<SettlementTargets> {
    let winner = winner_balance.checked_sub(wager).ok_or_else(|| {
        RelayError::Inconsistent(format!(
            "winner balance {} is below wager {}",
            winner_balance, wager
        ))
    })?;
    let loser = loser_balance.checked_add(wager).ok_or_else(|| {
        RelayError::Inconsistent(format!(
            "loser balance {} plus wager {} overflows",
            loser_balance, wager
        ))
    })?;
    Ok(SettlementTargets { winner, loser })
}

/// Shortfalls are always topped up; surpluses only beyond `tolerance`
pub fn adjustment(actual: u64, expected: u64, tolerance: u64) -> BalanceAdjustment {
    if actual < expected {
        BalanceAdjustment::TopUp(expected - actual)
    } else if actual - expected > tolerance {
        BalanceAdjustment::Refund(actual - expected)
    } else {
        BalanceAdjustment::None
    }
}
