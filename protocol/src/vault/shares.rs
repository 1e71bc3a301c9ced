//! # Share Ledger
//!
//! Per-account share balances, total share supply and the collateral
//! ("active stake") backing live shares. Every change is checkpointed so the
//! slasher can ask who held what at a past capture timestamp.
//!
//! Price is `active_stake / total_shares`. The first deposit (or any deposit
//! into an empty vault) mints 1:1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checkpoints::Checkpoints;
use crate::math::{mul_div, Rounding};
use crate::types::{Address, Amount, ErrorCategory, Shares, Timestamp};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by share accounting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    /// The account holds fewer shares than requested.
    #[error("insufficient shares: {account} has {available}, requested {requested}")]
    InsufficientShares {
        /// The debited account.
        account: Address,
        /// Its balance.
        available: Shares,
        /// The amount requested.
        requested: Shares,
    },

    /// Shares exist but no collateral backs them (fully slashed).
    #[error("vault is insolvent: {total_shares} shares backed by zero stake")]
    Insolvent {
        /// Outstanding shares.
        total_shares: Shares,
    },

    /// A total would overflow `u128`.
    #[error("share accounting overflow")]
    Overflow,
}

impl ShareError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Resource
    }
}

// ---------------------------------------------------------------------------
// ShareLedger
// ---------------------------------------------------------------------------

/// Share balances and the stake behind them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    balances: BTreeMap<Address, Shares>,
    total_shares: Shares,
    active_stake: Amount,
    share_history: BTreeMap<Address, Checkpoints>,
    total_shares_history: Checkpoints,
    active_stake_history: Checkpoints,
}

impl ShareLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares held by `account`.
    pub fn balance_of(&self, account: &Address) -> Shares {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Total live shares.
    pub fn total_shares(&self) -> Shares {
        self.total_shares
    }

    /// Collateral backing live shares.
    pub fn active_stake(&self) -> Amount {
        self.active_stake
    }

    /// Active stake in effect at `at`.
    pub fn active_stake_at(&self, at: Timestamp) -> Amount {
        self.active_stake_history.upper_lookup(at)
    }

    /// Total shares in effect at `at`.
    pub fn total_shares_at(&self, at: Timestamp) -> Shares {
        self.total_shares_history.upper_lookup(at)
    }

    /// Shares held by `account` at `at`.
    pub fn balance_of_at(&self, account: &Address, at: Timestamp) -> Shares {
        self.share_history
            .get(account)
            .map(|cp| cp.upper_lookup(at))
            .unwrap_or(0)
    }

    /// Fewest shares `account` held at any point from `at` until now. Shares
    /// that left the account after `at` never count again, even if the
    /// balance was later topped up.
    pub fn min_balance_since(&self, account: &Address, at: Timestamp) -> Shares {
        self.share_history
            .get(account)
            .map(|cp| cp.min_since(at))
            .unwrap_or(0)
    }

    /// Accounts that held shares at `at`, with their balances.
    pub fn holders_at(&self, at: Timestamp) -> Vec<(Address, Shares)> {
        self.share_history
            .iter()
            .map(|(account, cp)| (*account, cp.upper_lookup(at)))
            .filter(|(_, shares)| *shares > 0)
            .collect()
    }

    /// Shares minted for a deposit of `amount`, rounded down.
    ///
    /// # Errors
    ///
    /// [`ShareError::Insolvent`] when shares exist but the stake is zero,
    /// [`ShareError::Overflow`] when either total would overflow.
    pub fn preview_deposit(&self, amount: Amount) -> Result<Shares, ShareError> {
        let shares = if self.total_shares == 0 {
            amount
        } else if self.active_stake == 0 {
            return Err(ShareError::Insolvent {
                total_shares: self.total_shares,
            });
        } else {
            mul_div(amount, self.total_shares, self.active_stake, Rounding::Down)
                .ok_or(ShareError::Overflow)?
        };

        self.active_stake
            .checked_add(amount)
            .ok_or(ShareError::Overflow)?;
        self.total_shares
            .checked_add(shares)
            .ok_or(ShareError::Overflow)?;
        Ok(shares)
    }

    /// Collateral owed for burning `shares`, rounded down.
    ///
    /// Burning the entire supply returns the entire stake so no dust is
    /// left behind without shares to claim it.
    pub fn preview_withdraw(&self, shares: Shares) -> Amount {
        self.value_of(shares, self.active_stake, self.total_shares)
    }

    /// Collateral value of `account`'s live shares.
    pub fn stake_of(&self, account: &Address) -> Amount {
        self.preview_withdraw(self.balance_of(account))
    }

    /// Credits `shares` to `account` backed by `amount` of new stake.
    pub fn mint(
        &mut self,
        account: Address,
        amount: Amount,
        shares: Shares,
        now: Timestamp,
    ) -> Result<(), ShareError> {
        let total_shares = self
            .total_shares
            .checked_add(shares)
            .ok_or(ShareError::Overflow)?;
        let active_stake = self
            .active_stake
            .checked_add(amount)
            .ok_or(ShareError::Overflow)?;
        let balance = self
            .balance_of(&account)
            .checked_add(shares)
            .ok_or(ShareError::Overflow)?;

        self.set_balance(account, balance, now);
        self.set_totals(total_shares, active_stake, now);
        Ok(())
    }

    /// Burns `shares` from `account`, removing `amount` of stake.
    pub fn burn(
        &mut self,
        account: Address,
        shares: Shares,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), ShareError> {
        let available = self.balance_of(&account);
        if shares > available {
            return Err(ShareError::InsufficientShares {
                account,
                available,
                requested: shares,
            });
        }
        let active_stake = self
            .active_stake
            .checked_sub(amount)
            .ok_or(ShareError::Overflow)?;
        let total_shares = self
            .total_shares
            .checked_sub(shares)
            .ok_or(ShareError::Overflow)?;

        self.set_balance(account, available - shares, now);
        self.set_totals(total_shares, active_stake, now);
        Ok(())
    }

    /// Moves shares between accounts. Stake and supply are unchanged.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        shares: Shares,
        now: Timestamp,
    ) -> Result<(), ShareError> {
        let available = self.balance_of(&from);
        if shares > available {
            return Err(ShareError::InsufficientShares {
                account: from,
                available,
                requested: shares,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(&to)
            .checked_add(shares)
            .ok_or(ShareError::Overflow)?;

        self.set_balance(from, available - shares, now);
        self.set_balance(to, credited, now);
        Ok(())
    }

    /// Shares to burn from a balance to cover a loss of `loss` collateral,
    /// given the stake and supply at that moment.
    ///
    /// Rounds up so remaining holders never subsidise the slashed account.
    /// A loss equal to the balance's whole value burns the whole balance.
    pub fn shares_for_loss(balance: Shares, loss: Amount, stake: Amount, supply: Shares) -> Shares {
        if loss == 0 || balance == 0 {
            return 0;
        }
        let value = Self::value_at(balance, stake, supply);
        if loss >= value {
            return balance;
        }
        mul_div(loss, supply, stake, Rounding::Up)
            .unwrap_or(balance)
            .min(balance)
    }

    /// Value of `shares` at an arbitrary stake/supply.
    pub fn value_at(shares: Shares, stake: Amount, supply: Shares) -> Amount {
        if supply == 0 || shares == 0 {
            return 0;
        }
        if shares >= supply {
            return stake;
        }
        mul_div(shares, stake, supply, Rounding::Down).unwrap_or(0)
    }

    /// Sum of all balances. Equal to [`total_shares`](Self::total_shares)
    /// unless the ledger is corrupt.
    pub fn sum_of_balances(&self) -> Option<Shares> {
        self.balances
            .values()
            .try_fold(0u128, |acc, shares| acc.checked_add(*shares))
    }

    fn value_of(&self, shares: Shares, stake: Amount, supply: Shares) -> Amount {
        Self::value_at(shares, stake, supply)
    }

    fn set_balance(&mut self, account: Address, balance: Shares, now: Timestamp) {
        if balance == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
        self.share_history
            .entry(account)
            .or_default()
            .push(now, balance);
    }

    fn set_totals(&mut self, total_shares: Shares, active_stake: Amount, now: Timestamp) {
        self.total_shares = total_shares;
        self.active_stake = active_stake;
        self.total_shares_history.push(now, total_shares);
        self.active_stake_history.push(now, active_stake);
    }
}
