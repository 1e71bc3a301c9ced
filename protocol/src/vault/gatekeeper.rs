//! # Deposit Gatekeeper
//!
//! A pure predicate over the vault's [`DepositPolicy`]. The limit is checked
//! before the whitelist, so a non-whitelisted depositor asking for too much
//! sees `LimitExceeded`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount, ErrorCategory};

/// Why a deposit was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateDenial {
    /// The deposit would push total stake over the limit.
    #[error("deposit limit exceeded: projected {projected}, limit {limit}")]
    LimitExceeded {
        /// Stake after the deposit (saturating).
        projected: Amount,
        /// The configured limit.
        limit: Amount,
    },

    /// The whitelist is on and the depositor is not in it.
    #[error("depositor not whitelisted: {0}")]
    NotWhitelisted(Address),
}

impl GateDenial {
    /// Classifies this denial.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Resource
    }
}

/// Deposit limit and whitelist settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPolicy {
    /// Whether [`limit`](Self::limit) is enforced.
    pub limit_enabled: bool,
    /// Maximum total stake.
    pub limit: Amount,
    /// Whether only whitelisted accounts may deposit.
    pub whitelist_enabled: bool,
    whitelisted: BTreeSet<Address>,
}

impl DepositPolicy {
    /// A policy with the given switches and an empty whitelist.
    pub fn new(whitelist_enabled: bool, limit_enabled: bool, limit: Amount) -> Self {
        Self {
            limit_enabled,
            limit,
            whitelist_enabled,
            whitelisted: BTreeSet::new(),
        }
    }

    /// Whether `account` is on the whitelist. The zero address never is.
    pub fn is_whitelisted(&self, account: &Address) -> bool {
        !account.is_zero() && self.whitelisted.contains(account)
    }

    /// Adds or removes `account`. Returns whether membership changed.
    /// The zero address is ignored.
    pub fn set_whitelisted(&mut self, account: Address, status: bool) -> bool {
        if account.is_zero() {
            return false;
        }
        if status {
            self.whitelisted.insert(account)
        } else {
            self.whitelisted.remove(&account)
        }
    }

    /// Decides whether `depositor` may add `amount` to `current_stake`.
    pub fn authorize(
        &self,
        depositor: &Address,
        amount: Amount,
        current_stake: Amount,
    ) -> Result<(), GateDenial> {
        if self.limit_enabled {
            let projected = current_stake.saturating_add(amount);
            if current_stake.checked_add(amount).is_none() || projected > self.limit {
                return Err(GateDenial::LimitExceeded {
                    projected,
                    limit: self.limit,
                });
            }
        }
        if self.whitelist_enabled && !self.is_whitelisted(depositor) {
            return Err(GateDenial::NotWhitelisted(*depositor));
        }
        Ok(())
    }
}
