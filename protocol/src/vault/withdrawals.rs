//! # Withdrawal Queue
//!
//! Burned shares become a claim on collateral, keyed by `(claimer, epoch)`.
//! A claim for epoch `e` is redeemable once the current epoch is past `e`.
//!
//! Each claim keeps the individual withdrawals ("tranches") that make it up,
//! with the instant each was created. A slash whose capture timestamp
//! precedes a tranche can still draw from it: that collateral was live stake
//! at capture time.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount, EpochIndex, ErrorCategory, Shares, Timestamp};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the withdrawal queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The claim's epoch has not fully elapsed.
    #[error("epoch {epoch} has not elapsed (current epoch {current})")]
    EpochNotElapsed {
        /// The requested epoch.
        epoch: EpochIndex,
        /// The epoch at the time of the call.
        current: EpochIndex,
    },

    /// No unredeemed claim exists for this account and epoch.
    #[error("nothing to claim for {account} in epoch {epoch}")]
    NothingToClaim {
        /// The claimer.
        account: Address,
        /// The requested epoch.
        epoch: EpochIndex,
    },

    /// A redeem call named no epochs.
    #[error("no epochs requested")]
    EmptyBatch,

    /// A claim total would overflow `u128`.
    #[error("withdrawal accounting overflow")]
    Overflow,
}

impl QueueError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::EpochNotElapsed { .. } => ErrorCategory::Timing,
            QueueError::EmptyBatch => ErrorCategory::Validation,
            QueueError::NothingToClaim { .. } | QueueError::Overflow => ErrorCategory::Resource,
        }
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// One withdrawal folded into a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTranche {
    /// When the shares were burned.
    pub created_at: Timestamp,
    /// Shares burned.
    pub shares: Shares,
    /// Collateral still owed for this withdrawal.
    pub amount: Amount,
}

/// Collateral owed to a claimer for one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalClaim {
    /// Shares burned into this claim.
    pub shares: Shares,
    /// Collateral owed.
    pub amount: Amount,
    /// Individual withdrawals, oldest first.
    pub tranches: Vec<ClaimTranche>,
}

// ---------------------------------------------------------------------------
// WithdrawalQueue
// ---------------------------------------------------------------------------

/// All unredeemed withdrawal claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQueue {
    claims: BTreeMap<Address, BTreeMap<EpochIndex, WithdrawalClaim>>,
    epoch_totals: BTreeMap<EpochIndex, Amount>,
    pending: Amount,
}

impl WithdrawalQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// The claim held by `claimer` for `epoch`, if any.
    pub fn claim(&self, claimer: &Address, epoch: EpochIndex) -> Option<&WithdrawalClaim> {
        self.claims.get(claimer).and_then(|by_epoch| by_epoch.get(&epoch))
    }

    /// Collateral owed to `claimer` for `epoch`.
    pub fn claimable(&self, claimer: &Address, epoch: EpochIndex) -> Amount {
        self.claim(claimer, epoch).map(|c| c.amount).unwrap_or(0)
    }

    /// Collateral owed across all claimers for `epoch`.
    pub fn epoch_total(&self, epoch: EpochIndex) -> Amount {
        self.epoch_totals.get(&epoch).copied().unwrap_or(0)
    }

    /// Collateral owed across all claims.
    pub fn pending_total(&self) -> Amount {
        self.pending
    }

    /// Accounts with at least one open claim.
    pub fn claimers(&self) -> impl Iterator<Item = &Address> {
        self.claims.keys()
    }

    /// Adds a withdrawal to `claimer`'s claim for `epoch`.
    pub fn record(
        &mut self,
        claimer: Address,
        epoch: EpochIndex,
        shares: Shares,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), QueueError> {
        let existing = self.claim(&claimer, epoch).cloned().unwrap_or_default();
        let claim_shares = existing
            .shares
            .checked_add(shares)
            .ok_or(QueueError::Overflow)?;
        let claim_amount = existing
            .amount
            .checked_add(amount)
            .ok_or(QueueError::Overflow)?;
        let epoch_total = self
            .epoch_total(epoch)
            .checked_add(amount)
            .ok_or(QueueError::Overflow)?;
        let pending = self.pending.checked_add(amount).ok_or(QueueError::Overflow)?;

        let claim = self
            .claims
            .entry(claimer)
            .or_default()
            .entry(epoch)
            .or_default();
        claim.shares = claim_shares;
        claim.amount = claim_amount;
        claim.tranches.push(ClaimTranche {
            created_at: now,
            shares,
            amount,
        });
        self.epoch_totals.insert(epoch, epoch_total);
        self.pending = pending;
        Ok(())
    }

    /// Total redeemable by `claimer` for `epochs`, without consuming it.
    ///
    /// Duplicate epochs are counted once. Fails if any epoch has not elapsed
    /// or holds nothing.
    pub fn preview_redeem(
        &self,
        claimer: &Address,
        epochs: &[EpochIndex],
        current: EpochIndex,
    ) -> Result<Amount, QueueError> {
        if epochs.is_empty() {
            return Err(QueueError::EmptyBatch);
        }
        let unique: BTreeSet<EpochIndex> = epochs.iter().copied().collect();
        let mut total: Amount = 0;
        for epoch in unique {
            if current <= epoch {
                return Err(QueueError::EpochNotElapsed { epoch, current });
            }
            let amount = self.claimable(claimer, epoch);
            if amount == 0 {
                return Err(QueueError::NothingToClaim {
                    account: *claimer,
                    epoch,
                });
            }
            total = total.checked_add(amount).ok_or(QueueError::Overflow)?;
        }
        Ok(total)
    }

    /// Removes `claimer`'s claims for `epochs` and returns their total.
    ///
    /// All-or-nothing: on error no claim is touched.
    pub fn consume(
        &mut self,
        claimer: &Address,
        epochs: &[EpochIndex],
        current: EpochIndex,
    ) -> Result<Amount, QueueError> {
        let total = self.preview_redeem(claimer, epochs, current)?;
        let unique: BTreeSet<EpochIndex> = epochs.iter().copied().collect();

        let mut removed = Vec::with_capacity(unique.len());
        if let Some(by_epoch) = self.claims.get_mut(claimer) {
            for epoch in &unique {
                if let Some(claim) = by_epoch.remove(epoch) {
                    removed.push((*epoch, claim.amount));
                }
            }
            if by_epoch.is_empty() {
                self.claims.remove(claimer);
            }
        }
        for (epoch, amount) in removed {
            self.reduce_totals(epoch, amount);
        }
        Ok(total)
    }

    /// Collateral in `account`'s claims that was still live stake at
    /// `capture`.
    pub fn slashable_after(&self, account: &Address, capture: Timestamp) -> Amount {
        self.claims
            .get(account)
            .map(|by_epoch| {
                by_epoch
                    .values()
                    .flat_map(|claim| claim.tranches.iter())
                    .filter(|t| t.created_at > capture)
                    .fold(0u128, |acc, t| acc.saturating_add(t.amount))
            })
            .unwrap_or(0)
    }

    /// Removes up to `loss` from `account`'s claims created after `capture`,
    /// newest withdrawal first. Returns the amount actually removed.
    pub fn apply_slash(&mut self, account: &Address, capture: Timestamp, loss: Amount) -> Amount {
        let Some(by_epoch) = self.claims.get_mut(account) else {
            return 0;
        };

        let mut order: Vec<(Timestamp, EpochIndex, usize)> = by_epoch
            .iter()
            .flat_map(|(epoch, claim)| {
                claim
                    .tranches
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.created_at > capture)
                    .map(move |(idx, t)| (t.created_at, *epoch, idx))
            })
            .collect();
        order.sort_unstable_by(|a, b| b.cmp(a));

        let mut remaining = loss;
        let mut taken_per_epoch: BTreeMap<EpochIndex, Amount> = BTreeMap::new();
        for (_, epoch, idx) in order {
            if remaining == 0 {
                break;
            }
            let Some(claim) = by_epoch.get_mut(&epoch) else {
                continue;
            };
            let tranche = &mut claim.tranches[idx];
            let take = tranche.amount.min(remaining);
            tranche.amount -= take;
            claim.amount -= take;
            remaining -= take;
            *taken_per_epoch.entry(epoch).or_insert(0) += take;
        }

        by_epoch.retain(|_, claim| {
            claim.tranches.retain(|t| t.amount > 0);
            claim.amount > 0
        });
        if by_epoch.is_empty() {
            self.claims.remove(account);
        }
        for (epoch, taken) in &taken_per_epoch {
            self.reduce_totals(*epoch, *taken);
        }
        loss - remaining
    }

    /// Recomputes the per-epoch and overall totals from the claims and
    /// compares them with the tracked values.
    pub fn totals_consistent(&self) -> bool {
        let mut per_epoch: BTreeMap<EpochIndex, Amount> = BTreeMap::new();
        let mut pending: Amount = 0;
        for by_epoch in self.claims.values() {
            for (epoch, claim) in by_epoch {
                let tranche_sum = claim
                    .tranches
                    .iter()
                    .fold(0u128, |acc, t| acc.saturating_add(t.amount));
                if tranche_sum != claim.amount {
                    return false;
                }
                let slot = per_epoch.entry(*epoch).or_insert(0);
                *slot = slot.saturating_add(claim.amount);
                pending = pending.saturating_add(claim.amount);
            }
        }
        per_epoch.retain(|_, total| *total > 0);
        let tracked: BTreeMap<EpochIndex, Amount> = self
            .epoch_totals
            .iter()
            .filter(|(_, total)| **total > 0)
            .map(|(e, t)| (*e, *t))
            .collect();
        per_epoch == tracked && pending == self.pending
    }

    fn reduce_totals(&mut self, epoch: EpochIndex, amount: Amount) {
        let remaining = self.epoch_total(epoch).saturating_sub(amount);
        if remaining == 0 {
            self.epoch_totals.remove(&epoch);
        } else {
            self.epoch_totals.insert(epoch, remaining);
        }
        self.pending = self.pending.saturating_sub(amount);
    }
}
