//! # Burner Router
//!
//! Receives slashed collateral from the vault and routes it to a receiver
//! chosen by `(network, operator)`:
//!
//! ```text
//! operator-network receiver  →  network receiver  →  global receiver
//! ```
//!
//! Every receiver and the router's delay are governed two-phase: governance
//! proposes, the delay runs, then anyone may accept. The delay gives stakers
//! time to leave before a new receiver takes effect, so it should stay above
//! two epochs. A proposed delay change is measured against the delay that
//! is current when the proposal is made.
//!
//! ## State Machine (per setting)
//!
//! ```text
//!   ┌──────────┐  propose   ┌──────────┐
//!   │ Settled  │───────────►│ Pending  │──┐ propose (different value,
//!   └──────────┘◄───────────└──────────┘◄─┘ timer restarts)
//!                 accept
//!            (now >= requested_at + delay)
//! ```
//!
//! Pending proposals never expire. Proposing the committed value while a
//! different one is pending parks the committed value instead, so accepting
//! it changes nothing.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use stvault_protocol::access::{AccessError, AccessGate, Role};
use stvault_protocol::config::DeploymentConfig;
use stvault_protocol::events::Receipt;
use stvault_protocol::token::{AssetToken, TokenError};
use stvault_protocol::types::{Address, Amount, ErrorCategory, Timestamp};
use thiserror::Error;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the burner router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Caller lacks the governance role.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The proposal matches the pending value, or the committed value when
    /// nothing is pending.
    #[error("value already set")]
    AlreadySet,

    /// A proposed delay is not a positive whole number of seconds.
    #[error("delay must be positive (got {delay_secs}s)")]
    InvalidDelay {
        /// The rejected delay, in seconds.
        delay_secs: i64,
    },

    /// Nothing is pending, or the delay has not run out.
    #[error("setting not ready (ready at {ready_at:?})")]
    NotReady {
        /// When the pending value becomes acceptable, if one is pending.
        ready_at: Option<Timestamp>,
    },

    /// No receiver resolves for this pair; slashed funds would be lost.
    #[error("no receiver configured for network {network}, operator {operator}")]
    NoReceiverConfigured {
        /// The slashing network.
        network: Address,
        /// The slashed operator.
        operator: Address,
    },

    /// The receiver has nothing routed to it.
    #[error("nothing routed to {receiver}")]
    InsufficientBalance {
        /// The receiver asked about.
        receiver: Address,
    },

    /// The collateral token refused a transfer.
    #[error("token transfer failed: {0}")]
    Token(#[from] TokenError),

    /// A balance would overflow `u128`.
    #[error("router accounting overflow")]
    Overflow,
}

impl SettingsError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SettingsError::Access(e) => e.category(),
            SettingsError::AlreadySet => ErrorCategory::StateConflict,
            SettingsError::InvalidDelay { .. } => ErrorCategory::Validation,
            SettingsError::NotReady { .. } => ErrorCategory::Timing,
            SettingsError::NoReceiverConfigured { .. }
            | SettingsError::InsufficientBalance { .. }
            | SettingsError::Overflow => ErrorCategory::Resource,
            SettingsError::Token(e) => e.category(),
        }
    }
}

// ---------------------------------------------------------------------------
// DelayedSetting
// ---------------------------------------------------------------------------

/// Whether a setting has a proposal in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingState {
    /// No proposal pending.
    Settled,
    /// A proposal is waiting for its delay.
    Pending,
}

impl std::fmt::Display for SettingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingState::Settled => write!(f, "Settled"),
            SettingState::Pending => write!(f, "Pending"),
        }
    }
}

/// A proposed value waiting for its delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingValue<T> {
    /// The proposed value.
    pub value: T,
    /// When it was proposed.
    pub requested_at: Timestamp,
    /// Delay in force when it was proposed, in seconds.
    pub delay_secs: i64,
}

impl<T> PendingValue<T> {
    /// Earliest instant the proposal can be accepted.
    pub fn ready_at(&self) -> Timestamp {
        self.requested_at + Duration::seconds(self.delay_secs)
    }
}

/// A value that changes only through propose, wait, accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedSetting<T> {
    current: T,
    pending: Option<PendingValue<T>>,
}

impl<T: Clone + PartialEq> DelayedSetting<T> {
    /// A settled setting holding `current`.
    pub fn new(current: T) -> Self {
        Self {
            current,
            pending: None,
        }
    }

    /// The committed value.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// The proposal in flight, if any.
    pub fn pending(&self) -> Option<&PendingValue<T>> {
        self.pending.as_ref()
    }

    /// Settled or pending.
    pub fn state(&self) -> SettingState {
        if self.pending.is_some() {
            SettingState::Pending
        } else {
            SettingState::Settled
        }
    }

    /// Parks `value` until `now + delay`. Returns when it becomes acceptable.
    pub fn propose(
        &mut self,
        value: T,
        now: Timestamp,
        delay: Duration,
    ) -> Result<Timestamp, SettingsError> {
        let unchanged = match &self.pending {
            Some(pending) => pending.value == value,
            None => self.current == value,
        };
        if unchanged {
            return Err(SettingsError::AlreadySet);
        }
        let pending = PendingValue {
            value,
            requested_at: now,
            delay_secs: delay.num_seconds(),
        };
        let ready_at = pending.ready_at();
        self.pending = Some(pending);
        Ok(ready_at)
    }

    /// Commits the pending value once its delay has run out. Returns the
    /// newly committed value.
    pub fn accept(&mut self, now: Timestamp) -> Result<T, SettingsError> {
        match self.pending.take() {
            Some(pending) if now >= pending.ready_at() => {
                self.current = pending.value;
                Ok(self.current.clone())
            }
            other => {
                let ready_at = other.as_ref().map(PendingValue::ready_at);
                self.pending = other;
                Err(SettingsError::NotReady { ready_at })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the burner router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterEvent {
    /// A global receiver change was proposed.
    SetGlobalReceiver {
        /// Proposed receiver (zero clears it).
        receiver: Address,
        /// When it can be accepted.
        ready_at: Timestamp,
    },
    /// The global receiver change took effect.
    AcceptGlobalReceiver {
        /// New receiver.
        receiver: Address,
    },
    /// A per-network receiver change was proposed.
    SetNetworkReceiver {
        /// The network.
        network: Address,
        /// Proposed receiver (zero removes the override).
        receiver: Address,
        /// When it can be accepted.
        ready_at: Timestamp,
    },
    /// A per-network receiver change took effect.
    AcceptNetworkReceiver {
        /// The network.
        network: Address,
        /// New receiver.
        receiver: Address,
    },
    /// A per-(network, operator) receiver change was proposed.
    SetOperatorNetworkReceiver {
        /// The network.
        network: Address,
        /// The operator.
        operator: Address,
        /// Proposed receiver (zero removes the override).
        receiver: Address,
        /// When it can be accepted.
        ready_at: Timestamp,
    },
    /// A per-(network, operator) receiver change took effect.
    AcceptOperatorNetworkReceiver {
        /// The network.
        network: Address,
        /// The operator.
        operator: Address,
        /// New receiver.
        receiver: Address,
    },
    /// A delay change was proposed.
    SetDelay {
        /// Proposed delay in seconds.
        delay_secs: i64,
        /// When it can be accepted.
        ready_at: Timestamp,
    },
    /// The delay change took effect.
    AcceptDelay {
        /// New delay in seconds.
        delay_secs: i64,
    },
    /// Slashed collateral was assigned to a receiver.
    OnSlash {
        /// The slashing network.
        network: Address,
        /// The slashed operator.
        operator: Address,
        /// Where it will be paid.
        receiver: Address,
        /// Collateral assigned.
        amount: Amount,
    },
    /// Routed collateral was paid out.
    TriggerTransfer {
        /// Who was paid.
        receiver: Address,
        /// Amount paid.
        amount: Amount,
    },
}

// ---------------------------------------------------------------------------
// BurnerRouter
// ---------------------------------------------------------------------------

/// Serializable router bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterState {
    /// Router delay in seconds.
    pub delay: DelayedSetting<i64>,
    /// Fallback receiver.
    pub global_receiver: DelayedSetting<Address>,
    /// Per-network overrides.
    pub network_receivers: BTreeMap<Address, DelayedSetting<Address>>,
    /// Per-(network, operator) overrides, keyed network first.
    pub operator_network_receivers: BTreeMap<Address, BTreeMap<Address, DelayedSetting<Address>>>,
    /// Collateral owed to each receiver.
    pub balances: BTreeMap<Address, Amount>,
    /// Token balance accounted for by `balances`.
    pub last_balance: Amount,
}

/// Routes slashed collateral through governed receivers.
#[derive(Debug)]
pub struct BurnerRouter<T: AssetToken> {
    address: Address,
    gate: AccessGate,
    token: T,
    exit_window: Duration,
    state: RouterState,
}

impl<T: AssetToken> BurnerRouter<T> {
    /// Creates a router at `token.holder()` with the configuration's initial
    /// delay and receivers.
    pub fn new(config: &DeploymentConfig, gate: AccessGate, token: T) -> Self {
        let mut network_receivers = BTreeMap::new();
        for entry in &config.network_receivers {
            network_receivers.insert(entry.network, DelayedSetting::new(entry.receiver));
        }
        let mut operator_network_receivers: BTreeMap<
            Address,
            BTreeMap<Address, DelayedSetting<Address>>,
        > = BTreeMap::new();
        for entry in &config.operator_network_receivers {
            operator_network_receivers
                .entry(entry.network)
                .or_default()
                .insert(entry.operator, DelayedSetting::new(entry.receiver));
        }
        let address = token.holder();
        info!(
            %address,
            delay_secs = config.burner_delay().num_seconds(),
            global_receiver = %config.global_receiver,
            "burner router deployed"
        );
        Self {
            address,
            gate,
            token,
            exit_window: config.epoch_duration() * 2,
            state: RouterState {
                delay: DelayedSetting::new(config.burner_delay().num_seconds()),
                global_receiver: DelayedSetting::new(config.global_receiver),
                network_receivers,
                operator_network_receivers,
                balances: BTreeMap::new(),
                last_balance: 0,
            },
        }
    }

    // ---- Views ----

    /// The router's address (where the vault sends slashed collateral).
    pub fn address(&self) -> Address {
        self.address
    }

    /// Committed delay.
    pub fn delay(&self) -> Duration {
        Duration::seconds(*self.state.delay.current())
    }

    /// The delay setting, including any pending change.
    pub fn delay_setting(&self) -> &DelayedSetting<i64> {
        &self.state.delay
    }

    /// Committed global receiver (zero if unset).
    pub fn global_receiver(&self) -> Address {
        *self.state.global_receiver.current()
    }

    /// The global receiver setting, including any pending change.
    pub fn global_receiver_setting(&self) -> &DelayedSetting<Address> {
        &self.state.global_receiver
    }

    /// Committed override for `network` (zero if none).
    pub fn network_receiver(&self, network: &Address) -> Address {
        self.state
            .network_receivers
            .get(network)
            .map(|s| *s.current())
            .unwrap_or(Address::ZERO)
    }

    /// The override setting for `network`, if one was ever proposed.
    pub fn network_receiver_setting(&self, network: &Address) -> Option<&DelayedSetting<Address>> {
        self.state.network_receivers.get(network)
    }

    /// Committed override for `(network, operator)` (zero if none).
    pub fn operator_network_receiver(&self, network: &Address, operator: &Address) -> Address {
        self.operator_network_receiver_setting(network, operator)
            .map(|s| *s.current())
            .unwrap_or(Address::ZERO)
    }

    /// The override setting for `(network, operator)`, if one was ever
    /// proposed.
    pub fn operator_network_receiver_setting(
        &self,
        network: &Address,
        operator: &Address,
    ) -> Option<&DelayedSetting<Address>> {
        self.state
            .operator_network_receivers
            .get(network)
            .and_then(|by_operator| by_operator.get(operator))
    }

    /// Receiver that a slash by `network` on `operator` would be paid to.
    pub fn route(&self, network: &Address, operator: &Address) -> Option<Address> {
        [
            self.operator_network_receiver(network, operator),
            self.network_receiver(network),
            self.global_receiver(),
        ]
        .into_iter()
        .find(|receiver| !receiver.is_zero())
    }

    /// Like [`route`](Self::route), failing closed.
    pub fn resolve_receiver(
        &self,
        network: &Address,
        operator: &Address,
    ) -> Result<Address, SettingsError> {
        self.route(network, operator)
            .ok_or(SettingsError::NoReceiverConfigured {
                network: *network,
                operator: *operator,
            })
    }

    /// Collateral waiting to be paid to `receiver`.
    pub fn balance_of(&self, receiver: &Address) -> Amount {
        self.state.balances.get(receiver).copied().unwrap_or(0)
    }

    /// Collateral accounted for across all receivers.
    pub fn total_routed(&self) -> Amount {
        self.state.last_balance
    }

    /// The collateral token handle.
    pub fn token(&self) -> &T {
        &self.token
    }

    /// Copy of all mutable bookkeeping.
    pub fn snapshot(&self) -> RouterState {
        self.state.clone()
    }

    // ---- Governance ----

    /// Proposes a new global receiver. Zero clears it.
    pub fn set_global_receiver(
        &mut self,
        caller: &Address,
        receiver: Address,
        now: Timestamp,
    ) -> Result<Receipt<Timestamp, RouterEvent>, SettingsError> {
        self.gate.require(caller, Role::SettingsGovernance)?;
        let delay = self.delay();
        let ready_at = self.state.global_receiver.propose(receiver, now, delay)?;
        info!(router = %self.address, %receiver, %ready_at, "global receiver proposed");
        Ok(Receipt::new(
            ready_at,
            RouterEvent::SetGlobalReceiver { receiver, ready_at },
        ))
    }

    /// Commits the pending global receiver. Callable by anyone.
    pub fn accept_global_receiver(
        &mut self,
        now: Timestamp,
    ) -> Result<Receipt<Address, RouterEvent>, SettingsError> {
        let receiver = self.state.global_receiver.accept(now)?;
        info!(router = %self.address, %receiver, "global receiver accepted");
        Ok(Receipt::new(
            receiver,
            RouterEvent::AcceptGlobalReceiver { receiver },
        ))
    }

    /// Proposes a receiver override for `network`. Zero removes it.
    pub fn set_network_receiver(
        &mut self,
        caller: &Address,
        network: Address,
        receiver: Address,
        now: Timestamp,
    ) -> Result<Receipt<Timestamp, RouterEvent>, SettingsError> {
        self.gate.require(caller, Role::SettingsGovernance)?;
        let delay = self.delay();
        let mut setting = self
            .state
            .network_receivers
            .get(&network)
            .cloned()
            .unwrap_or_else(|| DelayedSetting::new(Address::ZERO));
        let ready_at = setting.propose(receiver, now, delay)?;
        self.state.network_receivers.insert(network, setting);

        info!(router = %self.address, %network, %receiver, %ready_at, "network receiver proposed");
        Ok(Receipt::new(
            ready_at,
            RouterEvent::SetNetworkReceiver {
                network,
                receiver,
                ready_at,
            },
        ))
    }

    /// Commits the pending override for `network`. Callable by anyone.
    pub fn accept_network_receiver(
        &mut self,
        network: Address,
        now: Timestamp,
    ) -> Result<Receipt<Address, RouterEvent>, SettingsError> {
        let setting = self
            .state
            .network_receivers
            .get_mut(&network)
            .ok_or(SettingsError::NotReady { ready_at: None })?;
        let receiver = setting.accept(now)?;
        info!(router = %self.address, %network, %receiver, "network receiver accepted");
        Ok(Receipt::new(
            receiver,
            RouterEvent::AcceptNetworkReceiver { network, receiver },
        ))
    }

    /// Proposes a receiver override for `(network, operator)`. Zero removes
    /// it.
    pub fn set_operator_network_receiver(
        &mut self,
        caller: &Address,
        network: Address,
        operator: Address,
        receiver: Address,
        now: Timestamp,
    ) -> Result<Receipt<Timestamp, RouterEvent>, SettingsError> {
        self.gate.require(caller, Role::SettingsGovernance)?;
        let delay = self.delay();
        let mut setting = self
            .operator_network_receiver_setting(&network, &operator)
            .cloned()
            .unwrap_or_else(|| DelayedSetting::new(Address::ZERO));
        let ready_at = setting.propose(receiver, now, delay)?;
        self.state
            .operator_network_receivers
            .entry(network)
            .or_default()
            .insert(operator, setting);

        info!(
            router = %self.address,
            %network,
            %operator,
            %receiver,
            %ready_at,
            "operator-network receiver proposed"
        );
        Ok(Receipt::new(
            ready_at,
            RouterEvent::SetOperatorNetworkReceiver {
                network,
                operator,
                receiver,
                ready_at,
            },
        ))
    }

    /// Commits the pending override for `(network, operator)`. Callable by
    /// anyone.
    pub fn accept_operator_network_receiver(
        &mut self,
        network: Address,
        operator: Address,
        now: Timestamp,
    ) -> Result<Receipt<Address, RouterEvent>, SettingsError> {
        let setting = self
            .state
            .operator_network_receivers
            .get_mut(&network)
            .and_then(|by_operator| by_operator.get_mut(&operator))
            .ok_or(SettingsError::NotReady { ready_at: None })?;
        let receiver = setting.accept(now)?;
        info!(
            router = %self.address,
            %network,
            %operator,
            %receiver,
            "operator-network receiver accepted"
        );
        Ok(Receipt::new(
            receiver,
            RouterEvent::AcceptOperatorNetworkReceiver {
                network,
                operator,
                receiver,
            },
        ))
    }

    /// Proposes a new delay. The change itself waits out the current delay.
    /// The delay must be at least one second.
    pub fn set_delay(
        &mut self,
        caller: &Address,
        delay: Duration,
        now: Timestamp,
    ) -> Result<Receipt<Timestamp, RouterEvent>, SettingsError> {
        self.gate.require(caller, Role::SettingsGovernance)?;
        let delay_secs = delay.num_seconds();
        if delay_secs <= 0 {
            return Err(SettingsError::InvalidDelay { delay_secs });
        }
        let current = self.delay();
        let ready_at = self.state.delay.propose(delay_secs, now, current)?;

        if delay <= self.exit_window {
            warn!(
                router = %self.address,
                delay_secs,
                exit_window_secs = self.exit_window.num_seconds(),
                "proposed delay no longer covers two epochs"
            );
        }
        info!(router = %self.address, delay_secs, %ready_at, "delay proposed");
        Ok(Receipt::new(
            ready_at,
            RouterEvent::SetDelay {
                delay_secs,
                ready_at,
            },
        ))
    }

    /// Commits the pending delay. Callable by anyone.
    pub fn accept_delay(
        &mut self,
        now: Timestamp,
    ) -> Result<Receipt<Duration, RouterEvent>, SettingsError> {
        let delay_secs = self.state.delay.accept(now)?;
        info!(router = %self.address, delay_secs, "delay accepted");
        Ok(Receipt::new(
            Duration::seconds(delay_secs),
            RouterEvent::AcceptDelay { delay_secs },
        ))
    }

    // ---- Routing ----

    /// Assigns collateral that arrived since the last call to the receiver
    /// for `(network, operator)`.
    ///
    /// The vault transfers first, then the slasher calls this; the amount is
    /// whatever the router's token balance grew by.
    pub fn on_slash(
        &mut self,
        network: Address,
        operator: Address,
    ) -> Result<Receipt<Amount, RouterEvent>, SettingsError> {
        let receiver = self.resolve_receiver(&network, &operator)?;
        let balance = self.token.balance_of(&self.address);
        let amount = balance.saturating_sub(self.state.last_balance);
        let owed = self
            .balance_of(&receiver)
            .checked_add(amount)
            .ok_or(SettingsError::Overflow)?;

        self.state.balances.insert(receiver, owed);
        self.state.last_balance = balance;

        info!(
            router = %self.address,
            %network,
            %operator,
            %receiver,
            amount = %amount,
            "slash routed"
        );
        Ok(Receipt::new(
            amount,
            RouterEvent::OnSlash {
                network,
                operator,
                receiver,
                amount,
            },
        ))
    }

    /// Pays everything routed to `receiver`. Callable by anyone.
    pub fn trigger_transfer(
        &mut self,
        receiver: Address,
    ) -> Result<Receipt<Amount, RouterEvent>, SettingsError> {
        let amount = self.balance_of(&receiver);
        if amount == 0 {
            return Err(SettingsError::InsufficientBalance { receiver });
        }
        let last_balance = self
            .state
            .last_balance
            .checked_sub(amount)
            .ok_or(SettingsError::Overflow)?;

        self.token.transfer_out(&receiver, amount)?;

        self.state.balances.remove(&receiver);
        self.state.last_balance = last_balance;

        info!(router = %self.address, %receiver, amount = %amount, "routed collateral paid");
        Ok(Receipt::new(
            amount,
            RouterEvent::TriggerTransfer { receiver, amount },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use stvault_protocol::access::RoleTable;
    use stvault_protocol::token::{SharedToken, TokenLedger};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn router() -> (BurnerRouter<SharedToken>, Address) {
        let admin = Address::derive("admin");
        let governance = Address::derive("governance");
        let gate = AccessGate::new(RoleTable::new(admin));
        gate.grant_role(&admin, Role::SettingsGovernance, governance)
            .unwrap();
        let config = DeploymentConfig::reference(governance, t0());
        let token = SharedToken::new(TokenLedger::new().shared(), Address::derive("router"));
        (BurnerRouter::new(&config, gate, token), governance)
    }

    #[test]
    fn delayed_setting_lifecycle() {
        let mut setting = DelayedSetting::new(1u8);
        assert_eq!(setting.state(), SettingState::Settled);
        assert_eq!(
            setting.propose(1, t0(), Duration::days(1)),
            Err(SettingsError::AlreadySet)
        );

        let ready = setting.propose(2, t0(), Duration::days(1)).unwrap();
        assert_eq!(ready, t0() + Duration::days(1));
        assert_eq!(
            setting.propose(2, t0(), Duration::days(1)),
            Err(SettingsError::AlreadySet)
        );
        assert!(matches!(
            setting.accept(ready - Duration::seconds(1)),
            Err(SettingsError::NotReady { ready_at: Some(_) })
        ));
        assert_eq!(setting.accept(ready), Ok(2));
        assert_eq!(*setting.current(), 2);
        assert_eq!(
            setting.accept(ready),
            Err(SettingsError::NotReady { ready_at: None })
        );
    }

    #[test]
    fn superseding_restarts_timer() {
        let mut setting = DelayedSetting::new(1u8);
        setting.propose(2, t0(), Duration::days(1)).unwrap();
        let later = t0() + Duration::hours(12);
        let ready = setting.propose(3, later, Duration::days(1)).unwrap();
        assert_eq!(ready, later + Duration::days(1));
        assert!(setting.accept(t0() + Duration::days(1)).is_err());
        assert_eq!(setting.accept(ready), Ok(3));
    }

    #[test]
    fn proposing_committed_value_parks_a_cancel() {
        let mut setting = DelayedSetting::new(1u8);
        setting.propose(2, t0(), Duration::days(1)).unwrap();
        setting.propose(1, t0(), Duration::days(1)).unwrap();
        assert_eq!(setting.accept(t0() + Duration::days(1)), Ok(1));
        assert_eq!(*setting.current(), 1);
    }

    #[test]
    fn routing_precedence() {
        let (mut router, governance) = router();
        let (network, operator) = (Address::derive("network"), Address::derive("operator"));
        assert_eq!(router.route(&network, &operator), Some(governance));

        let net_receiver = Address::derive("net-treasury");
        router
            .set_network_receiver(&governance, network, net_receiver, t0())
            .unwrap();
        let op_receiver = Address::derive("op-treasury");
        router
            .set_operator_network_receiver(&governance, network, operator, op_receiver, t0())
            .unwrap();
        // Nothing changes until accepted.
        assert_eq!(router.route(&network, &operator), Some(governance));

        let ready = t0() + router.delay();
        router.accept_network_receiver(network, ready).unwrap();
        assert_eq!(router.route(&network, &operator), Some(net_receiver));
        router
            .accept_operator_network_receiver(network, operator, ready)
            .unwrap();
        assert_eq!(router.route(&network, &operator), Some(op_receiver));
        assert_eq!(
            router.route(&network, &Address::derive("other-operator")),
            Some(net_receiver)
        );
    }

    #[test]
    fn cleared_receivers_fail_closed() {
        let (mut router, governance) = router();
        router
            .set_global_receiver(&governance, Address::ZERO, t0())
            .unwrap();
        router
            .accept_global_receiver(t0() + router.delay())
            .unwrap();
        let (network, operator) = (Address::derive("network"), Address::derive("operator"));
        assert_eq!(
            router.resolve_receiver(&network, &operator),
            Err(SettingsError::NoReceiverConfigured { network, operator })
        );
    }

    #[test]
    fn governance_role_required() {
        let (mut router, _) = router();
        let mallory = Address::derive("mallory");
        let err = router
            .set_global_receiver(&mallory, mallory, t0())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authorization);
        assert_eq!(router.global_receiver_setting().state(), SettingState::Settled);
    }

    #[test]
    fn non_positive_delay_rejected() {
        let (mut router, governance) = router();
        for delay in [Duration::zero(), Duration::days(-1), Duration::milliseconds(500)] {
            let err = router.set_delay(&governance, delay, t0()).unwrap_err();
            assert!(matches!(err, SettingsError::InvalidDelay { .. }));
            assert_eq!(err.category(), ErrorCategory::Validation);
        }
        assert_eq!(router.delay(), Duration::days(31));
        assert!(router.accept_delay(t0()).is_err());
    }

    #[test]
    fn routed_funds_paid_on_trigger() {
        let (mut router, governance) = router();
        let (network, operator) = (Address::derive("network"), Address::derive("operator"));
        router
            .token()
            .ledger()
            .write()
            .mint(router.address(), 250)
            .unwrap();
        let routed = router.on_slash(network, operator).unwrap();
        assert_eq!(routed.value, 250);
        assert_eq!(router.balance_of(&governance), 250);

        assert_eq!(router.trigger_transfer(governance).unwrap().value, 250);
        assert_eq!(router.token().balance_of(&governance), 250);
        assert_eq!(
            router.trigger_transfer(governance),
            Err(SettingsError::InsufficientBalance {
                receiver: governance
            })
        );
    }
}
