//! # Collateral Token
//!
//! The vault does not implement a token standard; it consumes one through
//! the [`AssetToken`] trait, seen from the vault's own address:
//! `transfer_in` pulls collateral from a depositor, `transfer_out` pays a
//! recipient, `balance_of` reads any holder.
//!
//! [`TokenLedger`] is the in-memory collateral used by deployments built in
//! this workspace. Balances are plain `u128` with checked arithmetic, and
//! individual accounts can be frozen so that transfers touching them fail
//! (which is how a failing collaborator is simulated).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount, ErrorCategory};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the collateral token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The sender holds less than the transfer amount.
    #[error("insufficient balance: {account} has {available}, needs {requested}")]
    InsufficientBalance {
        /// The debited account.
        account: Address,
        /// Its current balance.
        available: Amount,
        /// The amount requested.
        requested: Amount,
    },

    /// A credit would overflow `u128`.
    #[error("balance overflow: {account} holds {current}, credit {credit}")]
    Overflow {
        /// The credited account.
        account: Address,
        /// Its balance before the failed credit.
        current: Amount,
        /// The amount that overflowed.
        credit: Amount,
    },

    /// Transfers to or from a frozen account are rejected.
    #[error("account is frozen: {0}")]
    Frozen(Address),

    /// Collateral cannot be sent to the zero address.
    #[error("invalid recipient: zero address")]
    InvalidRecipient,
}

impl TokenError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TokenError::InvalidRecipient => ErrorCategory::Validation,
            _ => ErrorCategory::Resource,
        }
    }
}

// ---------------------------------------------------------------------------
// AssetToken
// ---------------------------------------------------------------------------

/// Collateral as seen from one holder (the vault or the router).
pub trait AssetToken {
    /// The address this handle moves funds for.
    fn holder(&self) -> Address;

    /// Moves `amount` from `from` to the holder.
    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), TokenError>;

    /// Moves `amount` from the holder to `to`.
    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), TokenError>;

    /// Balance of any account.
    fn balance_of(&self, account: &Address) -> Amount;
}

// ---------------------------------------------------------------------------
// TokenLedger
// ---------------------------------------------------------------------------

/// In-memory collateral balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    balances: BTreeMap<Address, Amount>,
    total_supply: Amount,
    frozen: BTreeSet<Address>,
}

impl TokenLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the ledger for sharing between holders.
    pub fn shared(self) -> Arc<RwLock<TokenLedger>> {
        Arc::new(RwLock::new(self))
    }

    /// Creates `amount` new tokens for `to`.
    pub fn mint(&mut self, to: Address, amount: Amount) -> Result<Amount, TokenError> {
        if to.is_zero() {
            return Err(TokenError::InvalidRecipient);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::Overflow {
                account: to,
                current: self.total_supply,
                credit: amount,
            })?;
        let balance = self.credit(to, amount)?;
        self.total_supply = supply;
        Ok(balance)
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// All checks run before either balance changes.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::InvalidRecipient);
        }
        if self.frozen.contains(from) {
            return Err(TokenError::Frozen(*from));
        }
        if self.frozen.contains(to) {
            return Err(TokenError::Frozen(*to));
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                account: *from,
                available,
                requested: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let current = self.balance_of(to);
        if current.checked_add(amount).is_none() {
            return Err(TokenError::Overflow {
                account: *to,
                current,
                credit: amount,
            });
        }

        self.balances.insert(*from, available - amount);
        self.credit(*to, amount)?;
        Ok(())
    }

    /// Balance of `account`; unknown accounts hold zero.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Total minted supply.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Blocks all transfers to and from `account`.
    pub fn freeze(&mut self, account: Address) {
        self.frozen.insert(account);
    }

    /// Lifts a freeze.
    pub fn unfreeze(&mut self, account: &Address) {
        self.frozen.remove(account);
    }

    fn credit(&mut self, account: Address, amount: Amount) -> Result<Amount, TokenError> {
        let balance = self.balances.entry(account).or_insert(0);
        let new_balance = balance.checked_add(amount).ok_or(TokenError::Overflow {
            account,
            current: *balance,
            credit: amount,
        })?;
        *balance = new_balance;
        Ok(new_balance)
    }
}

// ---------------------------------------------------------------------------
// SharedToken
// ---------------------------------------------------------------------------

/// An [`AssetToken`] handle onto a shared [`TokenLedger`].
#[derive(Debug, Clone)]
pub struct SharedToken {
    ledger: Arc<RwLock<TokenLedger>>,
    holder: Address,
}

impl SharedToken {
    /// Creates a handle that moves funds on behalf of `holder`.
    pub fn new(ledger: Arc<RwLock<TokenLedger>>, holder: Address) -> Self {
        Self { ledger, holder }
    }

    /// The underlying shared ledger.
    pub fn ledger(&self) -> &Arc<RwLock<TokenLedger>> {
        &self.ledger
    }
}

impl AssetToken for SharedToken {
    fn holder(&self) -> Address {
        self.holder
    }

    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), TokenError> {
        self.ledger.write().transfer(from, &self.holder, amount)
    }

    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), TokenError> {
        self.ledger.write().transfer(&self.holder, to, amount)
    }

    fn balance_of(&self, account: &Address) -> Amount {
        self.ledger.read().balance_of(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_credits_and_tracks_supply() {
        let mut ledger = TokenLedger::new();
        let alice = Address::derive("alice");
        ledger.mint(alice, 1_000).unwrap();
        ledger.mint(alice, 500).unwrap();
        assert_eq!(ledger.balance_of(&alice), 1_500);
        assert_eq!(ledger.total_supply(), 1_500);
    }

    #[test]
    fn transfer_moves_funds() {
        let mut ledger = TokenLedger::new();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        ledger.mint(alice, 1_000).unwrap();
        ledger.transfer(&alice, &bob, 400).unwrap();
        assert_eq!(ledger.balance_of(&alice), 600);
        assert_eq!(ledger.balance_of(&bob), 400);
    }

    #[test]
    fn insufficient_balance_rejected() {
        let mut ledger = TokenLedger::new();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        ledger.mint(alice, 100).unwrap();
        let err = ledger.transfer(&alice, &bob, 200).unwrap_err();
        assert!(matches!(
            err,
            TokenError::InsufficientBalance {
                available: 100,
                requested: 200,
                ..
            }
        ));
        assert_eq!(ledger.balance_of(&alice), 100);
    }

    #[test]
    fn overflow_rejected_without_side_effects() {
        let mut ledger = TokenLedger::new();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        ledger.mint(alice, 10).unwrap();
        ledger.mint(bob, u128::MAX - 10).unwrap();
        ledger.balances.insert(bob, u128::MAX);
        assert!(matches!(
            ledger.transfer(&alice, &bob, 10),
            Err(TokenError::Overflow { .. })
        ));
        assert_eq!(ledger.balance_of(&alice), 10);
    }

    #[test]
    fn frozen_account_blocks_transfers() {
        let mut ledger = TokenLedger::new();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        ledger.mint(alice, 100).unwrap();
        ledger.freeze(bob);
        assert_eq!(
            ledger.transfer(&alice, &bob, 10),
            Err(TokenError::Frozen(bob))
        );
        ledger.unfreeze(&bob);
        ledger.transfer(&alice, &bob, 10).unwrap();
    }

    #[test]
    fn zero_recipient_rejected() {
        let mut ledger = TokenLedger::new();
        let alice = Address::derive("alice");
        ledger.mint(alice, 100).unwrap();
        assert_eq!(
            ledger.transfer(&alice, &Address::ZERO, 10),
            Err(TokenError::InvalidRecipient)
        );
    }

    #[test]
    fn shared_handles_see_one_ledger() {
        let ledger = TokenLedger::new().shared();
        let alice = Address::derive("alice");
        let vault = Address::derive("vault");
        ledger.write().mint(alice, 1_000).unwrap();

        let mut handle = SharedToken::new(ledger.clone(), vault);
        handle.transfer_in(&alice, 700).unwrap();
        handle.transfer_out(&alice, 200).unwrap();

        assert_eq!(handle.balance_of(&vault), 500);
        assert_eq!(ledger.read().balance_of(&alice), 500);
        assert_eq!(handle.holder(), vault);
    }
}
