//! # Domain Events
//!
//! Mutating operations do no I/O. Instead each returns a [`Receipt`] with
//! the operation's result and the events it produced, in order. Whoever
//! hosts the vault decides how to publish them.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, EpochIndex, Shares, Timestamp};

/// Result of a successful mutating operation plus the events it emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt<T, E> {
    /// The operation's return value.
    pub value: T,
    /// Events in emission order.
    pub events: Vec<E>,
}

impl<T, E> Receipt<T, E> {
    /// A receipt with a single event.
    pub fn new(value: T, event: E) -> Self {
        Self {
            value,
            events: vec![event],
        }
    }

    /// A receipt with several events.
    pub fn with_events(value: T, events: Vec<E>) -> Self {
        Self { value, events }
    }

    /// Converts every event into a wider event type.
    pub fn widen<F: From<E>>(self) -> Receipt<T, F> {
        Receipt {
            value: self.value,
            events: self.events.into_iter().map(F::from).collect(),
        }
    }
}

/// Loss charged to one account by an executed slash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLoss {
    /// The slashed account.
    pub account: Address,
    /// Collateral removed from its withdrawal claims.
    pub from_claims: Amount,
    /// Collateral removed from its live shares.
    pub from_shares: Amount,
    /// Shares burned to cover `from_shares`.
    pub shares_burned: Shares,
}

impl AccountLoss {
    /// Total collateral removed from the account.
    pub fn total(&self) -> Amount {
        self.from_claims + self.from_shares
    }
}

/// Events emitted by the tokenized vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    /// Collateral deposited and shares minted.
    Deposit {
        /// Who paid the collateral.
        depositor: Address,
        /// Who received the shares.
        on_behalf_of: Address,
        /// Collateral deposited.
        amount: Amount,
        /// Shares minted.
        shares: Shares,
    },
    /// Shares burned into a withdrawal claim.
    Withdraw {
        /// Whose shares were burned.
        account: Address,
        /// Who may redeem the claim.
        claimer: Address,
        /// Epoch the claim is recorded under.
        epoch: EpochIndex,
        /// Shares burned.
        shares: Shares,
        /// Collateral owed by the claim.
        amount: Amount,
    },
    /// Withdrawal claims redeemed.
    Claim {
        /// The claimer.
        account: Address,
        /// Who received the collateral.
        recipient: Address,
        /// Epochs redeemed.
        epochs: Vec<EpochIndex>,
        /// Collateral paid out.
        amount: Amount,
    },
    /// Shares moved between accounts.
    Transfer {
        /// Sender.
        from: Address,
        /// Receiver.
        to: Address,
        /// Shares moved.
        shares: Shares,
    },
    /// Collateral removed by an executed slash.
    OnSlash {
        /// The slash's capture timestamp.
        capture_timestamp: Timestamp,
        /// Collateral removed.
        amount: Amount,
        /// Where the collateral was sent.
        recipient: Address,
        /// Per-account breakdown.
        losses: Vec<AccountLoss>,
    },
    /// Depositor whitelist switched on or off.
    SetDepositWhitelist {
        /// New flag.
        status: bool,
    },
    /// A depositor was added to or removed from the whitelist.
    SetDepositorWhitelistStatus {
        /// The depositor.
        account: Address,
        /// New membership.
        status: bool,
    },
    /// Deposit limit switched on or off.
    SetIsDepositLimit {
        /// New flag.
        status: bool,
    },
    /// Deposit limit value changed.
    SetDepositLimit {
        /// New limit.
        limit: Amount,
    },
}
