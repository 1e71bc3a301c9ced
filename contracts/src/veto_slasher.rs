//! # Veto Slasher
//!
//! Slashing happens in two steps separated by a veto window:
//!
//! 1. The slasher requests a slash of `amount` for `(network, operator)`
//!    captured at a past timestamp.
//! 2. Until `veto_deadline` the veto authority may cancel it. After the
//!    deadline the slasher executes it; the vault removes the collateral and
//!    the burner router assigns it to a receiver.
//!
//! ## State Machine
//!
//! ```text
//!    ┌───────────┐   veto (now <= deadline)   ┌─────────┐
//!    │ Requested │───────────────────────────►│ Vetoed  │
//!    └─────┬─────┘                            └─────────┘
//!          │ execute (now > deadline)
//!    ┌─────▼─────┐
//!    │ Executed  │
//!    └───────────┘
//! ```
//!
//! ## Exposure
//!
//! A capture timestamp is only usable within one epoch. Slashable stake at
//! a capture is the vault's active stake then, less everything slashed for
//! the same pair since. Captures older than the newest executed one are
//! refused, so two slashes cannot both claim the same stake.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use stvault_protocol::access::{AccessError, AccessGate, Role};
use stvault_protocol::checkpoints::Checkpoints;
use stvault_protocol::events::Receipt;
use stvault_protocol::token::AssetToken;
use stvault_protocol::types::{Address, Amount, ErrorCategory, Timestamp};
use stvault_protocol::vault::{TokenizedVault, VaultError};
use thiserror::Error;
use tracing::{debug, info};

use crate::burner_router::{BurnerRouter, SettingsError};
use crate::events::Event;

/// Index of a slash request, in request order.
pub type SlashIndex = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the slashing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlashError {
    /// Caller lacks the slasher or veto role.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The vault refused to apply the slash.
    #[error("vault rejected slash: {0}")]
    Vault(#[from] VaultError),

    /// The burner router could not take the slash.
    #[error("router rejected slash: {0}")]
    Settings(#[from] SettingsError),

    /// The capture is in the future, too old, or before the vault existed.
    #[error("invalid capture timestamp {capture} at {now}")]
    InvalidCaptureTimestamp {
        /// Requested capture.
        capture: Timestamp,
        /// Time of the request.
        now: Timestamp,
    },

    /// A zero slash was requested.
    #[error("slash amount must be non-zero")]
    ZeroAmount,

    /// More was requested than is slashable at the capture.
    #[error("requested {requested} exceeds slashable stake {slashable}")]
    AmountExceedsSlashable {
        /// Requested amount.
        requested: Amount,
        /// Slashable stake at the capture.
        slashable: Amount,
    },

    /// No request has this index.
    #[error("unknown slash request {0}")]
    UnknownRequest(SlashIndex),

    /// The request was already executed or vetoed.
    #[error("slash request {index} already resolved ({status})")]
    AlreadyResolved {
        /// The request.
        index: SlashIndex,
        /// Its terminal status.
        status: SlashStatus,
    },

    /// The veto window has closed.
    #[error("veto deadline {deadline} passed at {now}")]
    DeadlinePassed {
        /// The request's veto deadline.
        deadline: Timestamp,
        /// Time of the veto attempt.
        now: Timestamp,
    },

    /// The veto window is still open.
    #[error("veto window open until {deadline} (now {now})")]
    TooEarly {
        /// The request's veto deadline.
        deadline: Timestamp,
        /// Time of the execution attempt.
        now: Timestamp,
    },

    /// The capture's epoch window has closed.
    #[error("slash period for capture {capture} ended at {ended_at}")]
    SlashPeriodEnded {
        /// The request's capture.
        capture: Timestamp,
        /// `capture + epoch_duration`.
        ended_at: Timestamp,
    },

    /// A newer capture has already been slashed for this pair.
    #[error("capture {capture} precedes latest slashed capture {latest}")]
    OutdatedCaptureTimestamp {
        /// The request's capture.
        capture: Timestamp,
        /// Latest executed capture.
        latest: Timestamp,
    },

    /// Nothing is left to take at the capture.
    #[error("nothing slashable for request {0}")]
    InsufficientSlash(SlashIndex),

    /// A cumulative total would overflow `u128`.
    #[error("slash accounting overflow")]
    Overflow,
}

impl SlashError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SlashError::Access(e) => e.category(),
            SlashError::Vault(e) => e.category(),
            SlashError::Settings(e) => e.category(),
            SlashError::InvalidCaptureTimestamp { .. }
            | SlashError::ZeroAmount
            | SlashError::AmountExceedsSlashable { .. }
            | SlashError::UnknownRequest(_) => ErrorCategory::Validation,
            SlashError::AlreadyResolved { .. } | SlashError::OutdatedCaptureTimestamp { .. } => {
                ErrorCategory::StateConflict
            }
            SlashError::DeadlinePassed { .. }
            | SlashError::TooEarly { .. }
            | SlashError::SlashPeriodEnded { .. } => ErrorCategory::Timing,
            SlashError::InsufficientSlash(_) | SlashError::Overflow => ErrorCategory::Resource,
        }
    }
}

// ---------------------------------------------------------------------------
// SlashRequest
// ---------------------------------------------------------------------------

/// Where a slash request stands. `Executed` and `Vetoed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashStatus {
    /// Waiting for the veto window to close.
    Requested,
    /// Collateral was removed.
    Executed {
        /// Amount actually slashed.
        amount: Amount,
        /// When it was executed.
        at: Timestamp,
    },
    /// Cancelled by the veto authority.
    Vetoed {
        /// When it was vetoed.
        at: Timestamp,
    },
}

impl std::fmt::Display for SlashStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlashStatus::Requested => write!(f, "Requested"),
            SlashStatus::Executed { .. } => write!(f, "Executed"),
            SlashStatus::Vetoed { .. } => write!(f, "Vetoed"),
        }
    }
}

/// One slash request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRequest {
    /// Position in the request log.
    pub index: SlashIndex,
    /// The slashing network.
    pub network: Address,
    /// The slashed operator.
    pub operator: Address,
    /// Requested amount.
    pub amount: Amount,
    /// Instant that fixes whose stake is exposed.
    pub capture_timestamp: Timestamp,
    /// When the request was made.
    pub requested_at: Timestamp,
    /// Last instant a veto is accepted.
    pub veto_deadline: Timestamp,
    /// Current status.
    pub status: SlashStatus,
}

impl SlashRequest {
    /// Whether the request reached a terminal state.
    pub fn is_resolved(&self) -> bool {
        !matches!(self.status, SlashStatus::Requested)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the slashing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlasherEvent {
    /// A slash was requested.
    RequestSlash {
        /// The new request.
        index: SlashIndex,
        /// The slashing network.
        network: Address,
        /// The slashed operator.
        operator: Address,
        /// Requested amount.
        amount: Amount,
        /// Capture timestamp.
        capture_timestamp: Timestamp,
        /// Veto deadline.
        veto_deadline: Timestamp,
    },
    /// A request was vetoed.
    VetoSlash {
        /// The request.
        index: SlashIndex,
        /// Who vetoed.
        resolver: Address,
    },
    /// A request was executed.
    ExecuteSlash {
        /// The request.
        index: SlashIndex,
        /// Amount actually slashed.
        amount: Amount,
    },
}

// ---------------------------------------------------------------------------
// VetoSlasher
// ---------------------------------------------------------------------------

/// Serializable slasher bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlasherState {
    /// Every request ever made.
    pub requests: Vec<SlashRequest>,
    /// Cumulative executed slash per network, then operator.
    pub cumulative: BTreeMap<Address, BTreeMap<Address, Checkpoints>>,
    /// Newest executed capture per network, then operator.
    pub latest_capture: BTreeMap<Address, BTreeMap<Address, Timestamp>>,
}

/// Request, veto and execute slashes against one vault.
#[derive(Debug)]
pub struct VetoSlasher {
    address: Address,
    gate: AccessGate,
    veto_duration: Duration,
    state: SlasherState,
}

impl VetoSlasher {
    /// Creates a slasher at `address` with the given veto window.
    pub fn new(address: Address, gate: AccessGate, veto_duration: Duration) -> Self {
        info!(%address, veto_secs = veto_duration.num_seconds(), "veto slasher deployed");
        Self {
            address,
            gate,
            veto_duration,
            state: SlasherState::default(),
        }
    }

    // ---- Views ----

    /// The slasher's address (bound in the vault as its slasher).
    pub fn address(&self) -> Address {
        self.address
    }

    /// Length of the veto window.
    pub fn veto_duration(&self) -> Duration {
        self.veto_duration
    }

    /// Request by index.
    pub fn request(&self, index: SlashIndex) -> Option<&SlashRequest> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.state.requests.get(i))
    }

    /// Number of requests ever made.
    pub fn requests_len(&self) -> usize {
        self.state.requests.len()
    }

    /// Total executed for `(network, operator)`.
    pub fn cumulative_slash(&self, network: &Address, operator: &Address) -> Amount {
        self.cumulative(network, operator)
            .map(Checkpoints::latest)
            .unwrap_or(0)
    }

    /// Total executed for `(network, operator)` as of `at`.
    pub fn cumulative_slash_at(
        &self,
        network: &Address,
        operator: &Address,
        at: Timestamp,
    ) -> Amount {
        self.cumulative(network, operator)
            .map(|cp| cp.upper_lookup(at))
            .unwrap_or(0)
    }

    /// Newest capture executed for `(network, operator)`.
    pub fn latest_slashed_capture(
        &self,
        network: &Address,
        operator: &Address,
    ) -> Option<Timestamp> {
        self.state
            .latest_capture
            .get(network)
            .and_then(|by_operator| by_operator.get(operator))
            .copied()
    }

    /// Stake of `vault` still slashable for `(network, operator)` at
    /// `capture`, evaluated at `now`.
    pub fn slashable_stake<T: AssetToken>(
        &self,
        vault: &TokenizedVault<T>,
        network: &Address,
        operator: &Address,
        capture: Timestamp,
        now: Timestamp,
    ) -> Amount {
        let epoch = vault.epoch_clock().duration();
        if now > capture + epoch {
            return 0;
        }
        if let Some(latest) = self.latest_slashed_capture(network, operator) {
            if capture < latest {
                return 0;
            }
        }
        let slashed_since = self
            .cumulative_slash(network, operator)
            .saturating_sub(self.cumulative_slash_at(network, operator, capture));
        vault.active_stake_at(capture).saturating_sub(slashed_since)
    }

    /// Copy of all mutable bookkeeping.
    pub fn snapshot(&self) -> SlasherState {
        self.state.clone()
    }

    // ---- Operations ----

    /// Requests a slash of `amount` for `(network, operator)` captured at
    /// `capture`.
    ///
    /// # Errors
    ///
    /// - [`SlashError::Access`] unless `caller` holds [`Role::Slasher`].
    /// - [`SlashError::InvalidCaptureTimestamp`] unless
    ///   `now + veto - epoch <= capture < now` and the vault existed at
    ///   `capture`.
    /// - [`SlashError::ZeroAmount`] for a zero amount.
    /// - [`SlashError::AmountExceedsSlashable`] when `amount` exceeds
    ///   [`slashable_stake`](Self::slashable_stake).
    #[allow(clippy::too_many_arguments)]
    pub fn request_slash<T: AssetToken>(
        &mut self,
        caller: &Address,
        vault: &TokenizedVault<T>,
        network: Address,
        operator: Address,
        amount: Amount,
        capture: Timestamp,
        now: Timestamp,
    ) -> Result<Receipt<SlashIndex, SlasherEvent>, SlashError> {
        self.gate.require(caller, Role::Slasher)?;

        let earliest = now + self.veto_duration - vault.epoch_clock().duration();
        if capture >= now || capture < earliest || capture < vault.deployed_at() {
            return Err(SlashError::InvalidCaptureTimestamp { capture, now });
        }
        if amount == 0 {
            return Err(SlashError::ZeroAmount);
        }
        let slashable = self.slashable_stake(vault, &network, &operator, capture, now);
        if amount > slashable {
            return Err(SlashError::AmountExceedsSlashable {
                requested: amount,
                slashable,
            });
        }

        let index = self.state.requests.len() as SlashIndex;
        let veto_deadline = now + self.veto_duration;
        self.state.requests.push(SlashRequest {
            index,
            network,
            operator,
            amount,
            capture_timestamp: capture,
            requested_at: now,
            veto_deadline,
            status: SlashStatus::Requested,
        });

        info!(
            slasher = %self.address,
            index,
            %network,
            %operator,
            amount = %amount,
            %capture,
            %veto_deadline,
            "slash requested"
        );
        Ok(Receipt::new(
            index,
            SlasherEvent::RequestSlash {
                index,
                network,
                operator,
                amount,
                capture_timestamp: capture,
                veto_deadline,
            },
        ))
    }

    /// Cancels a pending request. Allowed up to and including the deadline.
    pub fn veto_slash(
        &mut self,
        caller: &Address,
        index: SlashIndex,
        now: Timestamp,
    ) -> Result<Receipt<(), SlasherEvent>, SlashError> {
        self.gate.require(caller, Role::VetoAuthority)?;
        let request = self.pending_request(index)?;
        if now > request.veto_deadline {
            return Err(SlashError::DeadlinePassed {
                deadline: request.veto_deadline,
                now,
            });
        }

        self.set_status(index, SlashStatus::Vetoed { at: now });
        info!(slasher = %self.address, index, resolver = %caller, "slash vetoed");
        Ok(Receipt::new(
            (),
            SlasherEvent::VetoSlash {
                index,
                resolver: *caller,
            },
        ))
    }

    /// Executes a request whose veto window has closed.
    ///
    /// Slashes up to `min(requested, slashable)` from `vault`, split across
    /// capture-time holders in proportion to their shares and bounded by what
    /// each can still cover. Sends the result to `router` and assigns it to
    /// the receiver for the request's pair.
    /// Fails closed if no receiver is configured.
    pub fn execute_slash<T: AssetToken, R: AssetToken>(
        &mut self,
        caller: &Address,
        index: SlashIndex,
        vault: &mut TokenizedVault<T>,
        router: &mut BurnerRouter<R>,
        now: Timestamp,
    ) -> Result<Receipt<Amount, Event>, SlashError> {
        self.gate.require(caller, Role::Slasher)?;
        let request = self.pending_request(index)?.clone();
        if now <= request.veto_deadline {
            return Err(SlashError::TooEarly {
                deadline: request.veto_deadline,
                now,
            });
        }
        let capture = request.capture_timestamp;
        let ended_at = capture + vault.epoch_clock().duration();
        if now > ended_at {
            return Err(SlashError::SlashPeriodEnded { capture, ended_at });
        }
        if let Some(latest) = self.latest_slashed_capture(&request.network, &request.operator) {
            if capture < latest {
                return Err(SlashError::OutdatedCaptureTimestamp { capture, latest });
            }
        }

        let slashable =
            self.slashable_stake(vault, &request.network, &request.operator, capture, now);
        let target = request.amount.min(slashable);
        let plan = vault.plan_slash(capture, target);
        if plan.total == 0 {
            return Err(SlashError::InsufficientSlash(index));
        }
        router.resolve_receiver(&request.network, &request.operator)?;
        let cumulative = self
            .cumulative_slash(&request.network, &request.operator)
            .checked_add(plan.total)
            .ok_or(SlashError::Overflow)?;
        debug!(
            slasher = %self.address,
            index,
            requested = %request.amount,
            slashable = %slashable,
            total = %plan.total,
            "executing slash"
        );

        let vault_receipt = vault.on_slash(&self.address, capture, target, router.address(), now)?;
        let amount = vault_receipt.value.total;
        let router_receipt = router.on_slash(request.network, request.operator)?;

        self.state
            .cumulative
            .entry(request.network)
            .or_default()
            .entry(request.operator)
            .or_default()
            .push(now, cumulative);
        let latest = self
            .state
            .latest_capture
            .entry(request.network)
            .or_default()
            .entry(request.operator)
            .or_insert(capture);
        if capture > *latest {
            *latest = capture;
        }
        self.set_status(index, SlashStatus::Executed { amount, at: now });

        info!(slasher = %self.address, index, amount = %amount, "slash executed");
        let mut events: Vec<Event> = vault_receipt.events.into_iter().map(Event::from).collect();
        events.extend(router_receipt.events.into_iter().map(Event::from));
        events.push(Event::from(SlasherEvent::ExecuteSlash { index, amount }));
        Ok(Receipt::with_events(amount, events))
    }

    fn pending_request(&self, index: SlashIndex) -> Result<&SlashRequest, SlashError> {
        let request = self.request(index).ok_or(SlashError::UnknownRequest(index))?;
        if request.is_resolved() {
            return Err(SlashError::AlreadyResolved {
                index,
                status: request.status,
            });
        }
        Ok(request)
    }

    fn set_status(&mut self, index: SlashIndex, status: SlashStatus) {
        if let Some(request) = usize::try_from(index)
            .ok()
            .and_then(|i| self.state.requests.get_mut(i))
        {
            request.status = status;
        }
    }

    fn cumulative(&self, network: &Address, operator: &Address) -> Option<&Checkpoints> {
        self.state
            .cumulative
            .get(network)
            .and_then(|by_operator| by_operator.get(operator))
    }
}
