//! # Tokenized Vault
//!
//! The vault is where stake lives. Depositors hand collateral to the vault
//! and receive shares; withdrawing burns shares into a claim that becomes
//! redeemable once its epoch has passed; slashing removes collateral from
//! whoever held stake at the slash's capture timestamp.
//!
//! ## Architecture
//!
//! ```text
//! shares.rs     : share balances, total supply, active stake, history
//! withdrawals.rs: per-(claimer, epoch) claims and their tranches
//! gatekeeper.rs : deposit limit and whitelist predicate
//! mod.rs        : TokenizedVault, composing the above with the token
//! ```
//!
//! ## Invariants
//!
//! 1. **Conservation.** `active_stake + pending claims` always equals
//!    `deposited - redeemed - slashed`, and equals the vault's collateral
//!    balance.
//! 2. **Shares add up.** The sum of all balances is the total supply.
//! 3. **All-or-nothing.** Every operation validates, then performs its one
//!    token transfer, then mutates. A failure leaves the vault untouched.

pub mod gatekeeper;
pub mod shares;
pub mod withdrawals;

pub use gatekeeper::{DepositPolicy, GateDenial};
pub use shares::{ShareError, ShareLedger};
pub use withdrawals::{ClaimTranche, QueueError, WithdrawalClaim, WithdrawalQueue};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::access::{AccessError, AccessGate, Role};
use crate::config::DeploymentConfig;
use crate::epoch::EpochClock;
use crate::events::{AccountLoss, Receipt, VaultEvent};
use crate::math::{mul_div, Rounding};
use crate::token::{AssetToken, TokenError};
use crate::types::{Address, Amount, EpochIndex, ErrorCategory, Shares, Timestamp};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Role check failed.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The collateral token refused a transfer.
    #[error("token transfer failed: {0}")]
    Token(#[from] TokenError),

    /// Share accounting rejected the operation.
    #[error(transparent)]
    Shares(#[from] ShareError),

    /// Withdrawal queue rejected the operation.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The deposit gatekeeper denied the deposit.
    #[error("deposit rejected: {0}")]
    GatekeeperRejected(#[from] GateDenial),

    /// Amounts and share counts must be positive.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The zero address cannot receive shares, claims or collateral.
    #[error("invalid account: {0}")]
    InvalidAccount(Address),

    /// The setting already has the requested value.
    #[error("value already set")]
    AlreadySet,

    /// The deposit is too small to mint a single share.
    #[error("deposit of {amount} mints zero shares")]
    DepositTooSmall {
        /// The rejected deposit.
        amount: Amount,
    },

    /// A running total would overflow `u128`.
    #[error("vault accounting overflow")]
    Overflow,

    /// A conservation check failed.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

impl VaultError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            VaultError::Access(e) => e.category(),
            VaultError::Token(e) => e.category(),
            VaultError::Shares(e) => e.category(),
            VaultError::Queue(e) => e.category(),
            VaultError::GatekeeperRejected(e) => e.category(),
            VaultError::ZeroAmount | VaultError::InvalidAccount(_) => ErrorCategory::Validation,
            VaultError::DepositTooSmall { .. } => ErrorCategory::Validation,
            VaultError::AlreadySet => ErrorCategory::StateConflict,
            VaultError::Overflow | VaultError::InvariantViolated(_) => ErrorCategory::Resource,
        }
    }
}

// ---------------------------------------------------------------------------
// Return types
// ---------------------------------------------------------------------------

/// What a withdrawal produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalTicket {
    /// Who may redeem.
    pub claimer: Address,
    /// Epoch the claim is recorded under.
    pub epoch: EpochIndex,
    /// Shares burned.
    pub shares: Shares,
    /// Collateral owed.
    pub amount: Amount,
}

/// How an executed slash would be distributed, computed without mutating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashPlan {
    /// The capture timestamp the plan was computed for.
    pub capture_timestamp: Timestamp,
    /// Amount asked for.
    pub requested: Amount,
    /// Amount that will actually be removed.
    pub total: Amount,
    /// Per-account losses, in capture-time share order.
    pub losses: Vec<AccountLoss>,
}

/// Serializable vault bookkeeping. Everything an operation may mutate
/// lives here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    /// Share balances and stake.
    pub shares: ShareLedger,
    /// Unredeemed withdrawal claims.
    pub withdrawals: WithdrawalQueue,
    /// Deposit limit and whitelist.
    pub policy: DepositPolicy,
    /// Component allowed to call [`TokenizedVault::on_slash`].
    pub slasher: Address,
    /// Collateral ever deposited.
    pub total_deposited: Amount,
    /// Collateral ever paid out to claimers.
    pub total_redeemed: Amount,
    /// Collateral ever removed by slashing.
    pub total_slashed: Amount,
}

// ---------------------------------------------------------------------------
// TokenizedVault
// ---------------------------------------------------------------------------

/// Epoch-based staking vault with transferable shares.
#[derive(Debug)]
pub struct TokenizedVault<T: AssetToken> {
    address: Address,
    name: String,
    symbol: String,
    clock: EpochClock,
    deployed_at: Timestamp,
    gate: AccessGate,
    token: T,
    state: VaultState,
}

impl<T: AssetToken> TokenizedVault<T> {
    /// Creates a vault at `token.holder()` from a deployment configuration.
    pub fn new(config: &DeploymentConfig, gate: AccessGate, token: T, now: Timestamp) -> Self {
        let address = token.holder();
        info!(%address, name = %config.name, symbol = %config.symbol, "vault deployed");
        Self {
            address,
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            clock: EpochClock::new(config.epoch_zero, config.epoch_duration()),
            deployed_at: now,
            gate,
            token,
            state: VaultState {
                shares: ShareLedger::new(),
                withdrawals: WithdrawalQueue::new(),
                policy: DepositPolicy::new(
                    config.deposit_whitelist,
                    config.is_deposit_limit,
                    config.deposit_limit,
                ),
                slasher: Address::ZERO,
                total_deposited: 0,
                total_redeemed: 0,
                total_slashed: 0,
            },
        }
    }

    // ---- Views ----

    /// The vault's address (its collateral account).
    pub fn address(&self) -> Address {
        self.address
    }

    /// Share token name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Share token symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The epoch schedule.
    pub fn epoch_clock(&self) -> &EpochClock {
        &self.clock
    }

    /// Epoch containing `now`.
    pub fn current_epoch(&self, now: Timestamp) -> EpochIndex {
        self.clock.current_epoch(now)
    }

    /// When the vault was created.
    pub fn deployed_at(&self) -> Timestamp {
        self.deployed_at
    }

    /// The slashing component, or zero if none is bound yet.
    pub fn slasher(&self) -> Address {
        self.state.slasher
    }

    /// Total live shares.
    pub fn total_shares(&self) -> Shares {
        self.state.shares.total_shares()
    }

    /// Collateral backing live shares.
    pub fn active_stake(&self) -> Amount {
        self.state.shares.active_stake()
    }

    /// Active stake plus collateral owed to claimers.
    pub fn total_stake(&self) -> Amount {
        self.active_stake()
            .saturating_add(self.state.withdrawals.pending_total())
    }

    /// Shares held by `account`.
    pub fn balance_of(&self, account: &Address) -> Shares {
        self.state.shares.balance_of(account)
    }

    /// Collateral value of `account`'s shares.
    pub fn stake_of(&self, account: &Address) -> Amount {
        self.state.shares.stake_of(account)
    }

    /// Collateral owed to `claimer` for `epoch`.
    pub fn claimable(&self, claimer: &Address, epoch: EpochIndex) -> Amount {
        self.state.withdrawals.claimable(claimer, epoch)
    }

    /// Collateral owed to all claimers for `epoch`.
    pub fn withdrawals_of_epoch(&self, epoch: EpochIndex) -> Amount {
        self.state.withdrawals.epoch_total(epoch)
    }

    /// Active stake at `at`.
    pub fn active_stake_at(&self, at: Timestamp) -> Amount {
        self.state.shares.active_stake_at(at)
    }

    /// Total live shares at `at`.
    pub fn active_shares_at(&self, at: Timestamp) -> Shares {
        self.state.shares.total_shares_at(at)
    }

    /// Shares held by `account` at `at`.
    pub fn active_shares_of_at(&self, account: &Address, at: Timestamp) -> Shares {
        self.state.shares.balance_of_at(account, at)
    }

    /// Shares minted for `amount` at the current price.
    pub fn preview_deposit(&self, amount: Amount) -> Result<Shares, VaultError> {
        Ok(self.state.shares.preview_deposit(amount)?)
    }

    /// Collateral owed for burning `shares` at the current price.
    pub fn preview_withdraw(&self, shares: Shares) -> Amount {
        self.state.shares.preview_withdraw(shares)
    }

    /// Current deposit policy.
    pub fn policy(&self) -> &DepositPolicy {
        &self.state.policy
    }

    /// Whether `account` is a whitelisted depositor.
    pub fn is_depositor_whitelisted(&self, account: &Address) -> bool {
        self.state.policy.is_whitelisted(account)
    }

    /// The collateral token handle.
    pub fn token(&self) -> &T {
        &self.token
    }

    /// Copy of all mutable bookkeeping.
    pub fn snapshot(&self) -> VaultState {
        self.state.clone()
    }

    // ---- Binding ----

    /// Binds the slashing component. Admin only, once.
    pub fn set_slasher(&mut self, caller: &Address, slasher: Address) -> Result<(), VaultError> {
        self.gate.require(caller, Role::DefaultAdmin)?;
        if slasher.is_zero() {
            return Err(VaultError::InvalidAccount(slasher));
        }
        if !self.state.slasher.is_zero() {
            return Err(VaultError::AlreadySet);
        }
        self.state.slasher = slasher;
        info!(vault = %self.address, %slasher, "slasher bound");
        Ok(())
    }

    // ---- Staking ----

    /// Pulls `amount` of collateral from `depositor` and mints shares to
    /// `on_behalf_of`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] for a zero deposit.
    /// - [`VaultError::InvalidAccount`] if `on_behalf_of` is zero.
    /// - [`VaultError::GatekeeperRejected`] when the limit or whitelist
    ///   denies `depositor`.
    /// - [`VaultError::DepositTooSmall`] if no share would be minted.
    /// - [`VaultError::Token`] if the collateral transfer fails.
    pub fn deposit(
        &mut self,
        depositor: &Address,
        on_behalf_of: Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Receipt<Shares, VaultEvent>, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if on_behalf_of.is_zero() {
            return Err(VaultError::InvalidAccount(on_behalf_of));
        }
        self.state
            .policy
            .authorize(depositor, amount, self.active_stake())?;

        let shares = self.state.shares.preview_deposit(amount)?;
        if shares == 0 {
            return Err(VaultError::DepositTooSmall { amount });
        }
        let total_deposited = self
            .state
            .total_deposited
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;

        self.token.transfer_in(depositor, amount)?;

        self.state.shares.mint(on_behalf_of, amount, shares, now)?;
        self.state.total_deposited = total_deposited;

        info!(
            vault = %self.address,
            %depositor,
            %on_behalf_of,
            amount = %amount,
            shares = %shares,
            "deposit"
        );
        Ok(Receipt::new(
            shares,
            VaultEvent::Deposit {
                depositor: *depositor,
                on_behalf_of,
                amount,
                shares,
            },
        ))
    }

    /// Burns `shares` from `account` and records the collateral they are
    /// worth as a claim for `claimer` in the current epoch.
    pub fn withdraw(
        &mut self,
        account: &Address,
        claimer: Address,
        shares: Shares,
        now: Timestamp,
    ) -> Result<Receipt<WithdrawalTicket, VaultEvent>, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if claimer.is_zero() {
            return Err(VaultError::InvalidAccount(claimer));
        }
        let available = self.balance_of(account);
        if shares > available {
            return Err(ShareError::InsufficientShares {
                account: *account,
                available,
                requested: shares,
            }
            .into());
        }
        let amount = self.state.shares.preview_withdraw(shares);
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let epoch = self.clock.current_epoch(now);

        self.state
            .withdrawals
            .record(claimer, epoch, shares, amount, now)?;
        self.state.shares.burn(*account, shares, amount, now)?;

        info!(
            vault = %self.address,
            %account,
            %claimer,
            epoch,
            shares = %shares,
            amount = %amount,
            "withdrawal queued"
        );
        let ticket = WithdrawalTicket {
            claimer,
            epoch,
            shares,
            amount,
        };
        Ok(Receipt::new(
            ticket,
            VaultEvent::Withdraw {
                account: *account,
                claimer,
                epoch,
                shares,
                amount,
            },
        ))
    }

    /// Redeems `claimer`'s claims for `epochs` and pays `recipient`.
    ///
    /// Every epoch must have elapsed and hold a non-zero claim; otherwise
    /// nothing is redeemed.
    pub fn redeem(
        &mut self,
        claimer: &Address,
        recipient: Address,
        epochs: &[EpochIndex],
        now: Timestamp,
    ) -> Result<Receipt<Amount, VaultEvent>, VaultError> {
        if recipient.is_zero() {
            return Err(VaultError::InvalidAccount(recipient));
        }
        let current = self.clock.current_epoch(now);
        let amount = self
            .state
            .withdrawals
            .preview_redeem(claimer, epochs, current)?;
        let total_redeemed = self
            .state
            .total_redeemed
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;

        self.token.transfer_out(&recipient, amount)?;

        self.state.withdrawals.consume(claimer, epochs, current)?;
        self.state.total_redeemed = total_redeemed;

        let mut redeemed: Vec<EpochIndex> = epochs.to_vec();
        redeemed.sort_unstable();
        redeemed.dedup();
        info!(vault = %self.address, %claimer, %recipient, amount = %amount, ?redeemed, "claimed");
        Ok(Receipt::new(
            amount,
            VaultEvent::Claim {
                account: *claimer,
                recipient,
                epochs: redeemed,
                amount,
            },
        ))
    }

    /// Redeems a single epoch.
    pub fn redeem_one(
        &mut self,
        claimer: &Address,
        recipient: Address,
        epoch: EpochIndex,
        now: Timestamp,
    ) -> Result<Receipt<Amount, VaultEvent>, VaultError> {
        self.redeem(claimer, recipient, &[epoch], now)
    }

    /// Moves shares from `from` to `to`.
    ///
    /// Both balances are checkpointed: `to` is not exposed to captures
    /// taken before the transfer, and `from` stays exposed only up to the
    /// fewest shares it has held since the capture.
    pub fn transfer_shares(
        &mut self,
        from: &Address,
        to: Address,
        shares: Shares,
        now: Timestamp,
    ) -> Result<Receipt<(), VaultEvent>, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if to.is_zero() {
            return Err(VaultError::InvalidAccount(to));
        }
        self.state.shares.transfer(*from, to, shares, now)?;
        debug!(vault = %self.address, %from, %to, shares = %shares, "shares transferred");
        Ok(Receipt::new(
            (),
            VaultEvent::Transfer {
                from: *from,
                to,
                shares,
            },
        ))
    }

    // ---- Deposit policy ----

    /// Switches the depositor whitelist on or off.
    pub fn set_deposit_whitelist(
        &mut self,
        caller: &Address,
        status: bool,
    ) -> Result<Receipt<(), VaultEvent>, VaultError> {
        self.gate.require(caller, Role::DepositWhitelistAdmin)?;
        if self.state.policy.whitelist_enabled == status {
            return Err(VaultError::AlreadySet);
        }
        self.state.policy.whitelist_enabled = status;
        info!(vault = %self.address, status, "deposit whitelist toggled");
        Ok(Receipt::new((), VaultEvent::SetDepositWhitelist { status }))
    }

    /// Adds `account` to or removes it from the whitelist.
    pub fn set_depositor_whitelist_status(
        &mut self,
        caller: &Address,
        account: Address,
        status: bool,
    ) -> Result<Receipt<(), VaultEvent>, VaultError> {
        self.gate.require(caller, Role::DepositorWhitelistAdmin)?;
        if account.is_zero() {
            return Err(VaultError::InvalidAccount(account));
        }
        if !self.state.policy.set_whitelisted(account, status) {
            return Err(VaultError::AlreadySet);
        }
        info!(vault = %self.address, %account, status, "depositor whitelist updated");
        Ok(Receipt::new(
            (),
            VaultEvent::SetDepositorWhitelistStatus { account, status },
        ))
    }

    /// Switches deposit limit enforcement on or off.
    pub fn set_is_deposit_limit(
        &mut self,
        caller: &Address,
        status: bool,
    ) -> Result<Receipt<(), VaultEvent>, VaultError> {
        self.gate.require(caller, Role::DepositLimitAdmin)?;
        if self.state.policy.limit_enabled == status {
            return Err(VaultError::AlreadySet);
        }
        self.state.policy.limit_enabled = status;
        info!(vault = %self.address, status, "deposit limit toggled");
        Ok(Receipt::new((), VaultEvent::SetIsDepositLimit { status }))
    }

    /// Sets the deposit limit value.
    pub fn set_deposit_limit(
        &mut self,
        caller: &Address,
        limit: Amount,
    ) -> Result<Receipt<(), VaultEvent>, VaultError> {
        self.gate.require(caller, Role::DepositLimitAdmin)?;
        if self.state.policy.limit == limit {
            return Err(VaultError::AlreadySet);
        }
        self.state.policy.limit = limit;
        info!(vault = %self.address, limit = %limit, "deposit limit set");
        Ok(Receipt::new((), VaultEvent::SetDepositLimit { limit }))
    }

    // ---- Slashing ----

    /// Collateral that a slash captured at `capture` can still reach for
    /// `account`: its claims created after capture plus the current value of
    /// the shares it has held without a break since capture.
    ///
    /// Shares that left after capture are reached only through the claim
    /// they turned into, so shares deposited or received later are never
    /// exposed.
    pub fn collectable_of(&self, account: &Address, capture: Timestamp) -> (Amount, Amount) {
        let from_claims = self.state.withdrawals.slashable_after(account, capture);
        let exposed_shares = self.state.shares.min_balance_since(account, capture);
        let from_shares = self.state.shares.preview_withdraw(exposed_shares);
        (from_claims, from_shares)
    }

    /// Computes how a slash of `amount` captured at `capture` would be
    /// split, without changing anything.
    ///
    /// Each account holding shares at capture owes
    /// `amount * shares_at_capture / supply_at_capture`. Everyone pays the
    /// floor of that; the rounding remainder adds one unit to the largest
    /// capture-time holders that can cover it (ties by address). No account
    /// pays more than the ceiling of its own share, and none pays more than
    /// it can still cover, so the plan's total is lower than `amount` when
    /// some capture-time holders have moved their stake out of reach.
    pub fn plan_slash(&self, capture: Timestamp, amount: Amount) -> SlashPlan {
        let supply = self.state.shares.total_shares_at(capture);
        let mut holders = self.state.shares.holders_at(capture);
        let empty = SlashPlan {
            capture_timestamp: capture,
            requested: amount,
            total: 0,
            losses: Vec::new(),
        };
        if supply == 0 || holders.is_empty() || amount == 0 {
            return empty;
        }
        // Largest first, ties by address.
        holders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let exposure: Vec<(Amount, Amount)> = holders
            .iter()
            .map(|(account, _)| self.collectable_of(account, capture))
            .collect();

        // (floor, ceil) of each holder's proportional share.
        let owed: Vec<(Amount, Amount)> = holders
            .iter()
            .map(|(_, held)| {
                let floor = mul_div(amount, *held, supply, Rounding::Down).unwrap_or(0);
                let ceil = mul_div(amount, *held, supply, Rounding::Up).unwrap_or(floor);
                (floor, ceil)
            })
            .collect();
        let owed_floor = owed.iter().fold(0u128, |acc, (f, _)| acc.saturating_add(*f));
        let mut remainder = amount.saturating_sub(owed_floor);

        let mut losses: Vec<Amount> = Vec::with_capacity(holders.len());
        for ((floor, ceil), (claims, shares)) in owed.iter().zip(&exposure) {
            let coverable = claims.saturating_add(*shares);
            let mut due = *floor;
            if remainder > 0 && ceil > floor && *ceil <= coverable {
                due = *ceil;
                remainder -= 1;
            }
            losses.push(due.min(coverable));
        }
        let total = losses.iter().fold(0u128, |acc, l| acc.saturating_add(*l));
        if total == 0 {
            return empty;
        }

        // Burn amounts depend on the price as earlier burns land, so walk
        // them in the same order `on_slash` applies them.
        let mut stake = self.state.shares.active_stake();
        let mut live = self.state.shares.total_shares();
        let mut breakdown = Vec::with_capacity(holders.len());
        for (((account, _), (claims, _)), loss) in holders.iter().zip(&exposure).zip(&losses) {
            if *loss == 0 {
                continue;
            }
            let from_claims = (*loss).min(*claims);
            let from_shares = *loss - from_claims;
            let shares_burned = ShareLedger::shares_for_loss(
                self.state.shares.balance_of(account),
                from_shares,
                stake,
                live,
            );
            stake = stake.saturating_sub(from_shares);
            live = live.saturating_sub(shares_burned);
            breakdown.push(AccountLoss {
                account: *account,
                from_claims,
                from_shares,
                shares_burned,
            });
        }

        debug!(
            vault = %self.address,
            %capture,
            requested = %amount,
            total = %total,
            accounts = breakdown.len(),
            "slash planned"
        );
        SlashPlan {
            capture_timestamp: capture,
            requested: amount,
            total,
            losses: breakdown,
        }
    }

    /// Removes up to `amount` of collateral exposed at `capture` and sends
    /// it to `recipient`. Only the bound slasher may call this.
    ///
    /// Returns the plan that was applied; its `total` may be lower than
    /// `amount` when less is collectable.
    pub fn on_slash(
        &mut self,
        caller: &Address,
        capture: Timestamp,
        amount: Amount,
        recipient: Address,
        now: Timestamp,
    ) -> Result<Receipt<SlashPlan, VaultEvent>, VaultError> {
        if self.state.slasher.is_zero() || *caller != self.state.slasher {
            return Err(AccessError::Unauthorized {
                account: *caller,
                role: Role::Slasher,
            }
            .into());
        }
        if recipient.is_zero() {
            return Err(VaultError::InvalidAccount(recipient));
        }
        let plan = self.plan_slash(capture, amount);
        if plan.total == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let total_slashed = self
            .state
            .total_slashed
            .checked_add(plan.total)
            .ok_or(VaultError::Overflow)?;

        self.token.transfer_out(&recipient, plan.total)?;

        for loss in &plan.losses {
            if loss.from_claims > 0 {
                self.state
                    .withdrawals
                    .apply_slash(&loss.account, capture, loss.from_claims);
            }
            if loss.from_shares > 0 || loss.shares_burned > 0 {
                self.state
                    .shares
                    .burn(loss.account, loss.shares_burned, loss.from_shares, now)?;
            }
        }
        self.state.total_slashed = total_slashed;

        info!(
            vault = %self.address,
            %capture,
            amount = %plan.total,
            %recipient,
            "slashed"
        );
        let event = VaultEvent::OnSlash {
            capture_timestamp: capture,
            amount: plan.total,
            recipient,
            losses: plan.losses.clone(),
        };
        Ok(Receipt::new(plan, event))
    }

    // ---- Audit ----

    /// Verifies the conservation invariants against the token balance.
    pub fn check_invariants(&self) -> Result<(), VaultError> {
        let shares = &self.state.shares;
        let sum = shares
            .sum_of_balances()
            .ok_or_else(|| VaultError::InvariantViolated("share balances overflow".into()))?;
        if sum != shares.total_shares() {
            return Err(VaultError::InvariantViolated(format!(
                "sum of balances {sum} != total shares {}",
                shares.total_shares()
            )));
        }
        if !self.state.withdrawals.totals_consistent() {
            return Err(VaultError::InvariantViolated(
                "withdrawal totals disagree with claims".into(),
            ));
        }

        let held = shares
            .active_stake()
            .checked_add(self.state.withdrawals.pending_total())
            .ok_or(VaultError::Overflow)?;
        let expected = self
            .state
            .total_deposited
            .checked_sub(self.state.total_redeemed)
            .and_then(|v| v.checked_sub(self.state.total_slashed))
            .ok_or_else(|| VaultError::InvariantViolated("outflows exceed deposits".into()))?;
        if held != expected {
            return Err(VaultError::InvariantViolated(format!(
                "stake plus claims {held} != deposited minus outflows {expected}"
            )));
        }
        let balance = self.token.balance_of(&self.address);
        if balance != held {
            return Err(VaultError::InvariantViolated(format!(
                "token balance {balance} != stake plus claims {held}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RoleTable;
    use crate::token::{SharedToken, TokenLedger};
    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::RwLock;
    use std::sync::Arc;

    struct Fixture {
        vault: TokenizedVault<SharedToken>,
        ledger: Arc<RwLock<TokenLedger>>,
        admin: Address,
        slasher: Address,
        zero: Timestamp,
    }

    fn fixture() -> Fixture {
        let zero = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let admin = Address::derive("admin");
        let slasher = Address::derive("slasher");
        let gate = AccessGate::new(RoleTable::new(admin));
        for role in [
            Role::DepositWhitelistAdmin,
            Role::DepositorWhitelistAdmin,
            Role::DepositLimitAdmin,
        ] {
            gate.grant_role(&admin, role, admin).unwrap();
        }
        let ledger = TokenLedger::new().shared();
        for name in ["alice", "bob", "carol"] {
            ledger
                .write()
                .mint(Address::derive(name), 1_000_000)
                .unwrap();
        }
        let config = DeploymentConfig::reference(Address::derive("treasury"), zero);
        let token = SharedToken::new(ledger.clone(), Address::derive("vault"));
        let mut vault = TokenizedVault::new(&config, gate, token, zero);
        vault.set_slasher(&admin, slasher).unwrap();
        Fixture {
            vault,
            ledger,
            admin,
            slasher,
            zero,
        }
    }

    fn days(n: i64) -> Duration {
        Duration::days(n)
    }

    #[test]
    fn deposit_mints_one_to_one_then_at_price() {
        let mut f = fixture();
        let alice = Address::derive("alice");
        let receipt = f.vault.deposit(&alice, alice, 1_000, f.zero).unwrap();
        assert_eq!(receipt.value, 1_000);
        assert_eq!(f.vault.balance_of(&alice), 1_000);
        assert_eq!(f.vault.active_stake(), 1_000);
        assert_eq!(f.ledger.read().balance_of(&f.vault.address()), 1_000);
        f.vault.check_invariants().unwrap();
    }

    #[test]
    fn deposit_on_behalf_credits_beneficiary() {
        let mut f = fixture();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        f.vault.deposit(&alice, bob, 500, f.zero).unwrap();
        assert_eq!(f.vault.balance_of(&bob), 500);
        assert_eq!(f.vault.balance_of(&alice), 0);
        assert_eq!(f.ledger.read().balance_of(&alice), 999_500);
    }

    #[test]
    fn zero_deposit_rejected() {
        let mut f = fixture();
        let alice = Address::derive("alice");
        assert_eq!(
            f.vault.deposit(&alice, alice, 0, f.zero),
            Err(VaultError::ZeroAmount)
        );
        assert!(matches!(
            f.vault.deposit(&alice, Address::ZERO, 10, f.zero),
            Err(VaultError::InvalidAccount(_))
        ));
    }

    #[test]
    fn failed_transfer_leaves_vault_untouched() {
        let mut f = fixture();
        let dave = Address::derive("dave");
        let before = f.vault.snapshot();
        let err = f.vault.deposit(&dave, dave, 10, f.zero).unwrap_err();
        assert!(matches!(err, VaultError::Token(TokenError::InsufficientBalance { .. })));
        assert_eq!(f.vault.snapshot(), before);
    }

    #[test]
    fn withdraw_then_redeem_after_epoch() {
        let mut f = fixture();
        let alice = Address::derive("alice");
        f.vault.deposit(&alice, alice, 1_000, f.zero).unwrap();
        let ticket = f
            .vault
            .withdraw(&alice, alice, 400, f.zero + days(1))
            .unwrap()
            .value;
        assert_eq!(ticket.epoch, 0);
        assert_eq!(ticket.amount, 400);
        assert_eq!(f.vault.claimable(&alice, 0), 400);

        let err = f
            .vault
            .redeem_one(&alice, alice, 0, f.zero + days(2))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Timing);

        let paid = f
            .vault
            .redeem_one(&alice, alice, 0, f.zero + days(15))
            .unwrap()
            .value;
        assert_eq!(paid, 400);
        assert_eq!(f.ledger.read().balance_of(&alice), 999_400);
        f.vault.check_invariants().unwrap();
    }

    #[test]
    fn withdraw_more_than_balance_rejected() {
        let mut f = fixture();
        let alice = Address::derive("alice");
        f.vault.deposit(&alice, alice, 100, f.zero).unwrap();
        assert!(matches!(
            f.vault.withdraw(&alice, alice, 101, f.zero),
            Err(VaultError::Shares(ShareError::InsufficientShares { .. }))
        ));
    }

    #[test]
    fn policy_setters_are_role_gated_and_reject_no_ops() {
        let mut f = fixture();
        let mallory = Address::derive("mallory");
        assert!(matches!(
            f.vault.set_deposit_whitelist(&mallory, true),
            Err(VaultError::Access(AccessError::Unauthorized { .. }))
        ));
        f.vault.set_deposit_whitelist(&f.admin, true).unwrap();
        assert_eq!(
            f.vault.set_deposit_whitelist(&f.admin, true),
            Err(VaultError::AlreadySet)
        );

        let alice = Address::derive("alice");
        assert!(matches!(
            f.vault.deposit(&alice, alice, 10, f.zero),
            Err(VaultError::GatekeeperRejected(GateDenial::NotWhitelisted(_)))
        ));
        f.vault
            .set_depositor_whitelist_status(&f.admin, alice, true)
            .unwrap();
        f.vault.deposit(&alice, alice, 10, f.zero).unwrap();

        assert!(matches!(
            f.vault
                .set_depositor_whitelist_status(&f.admin, Address::ZERO, true),
            Err(VaultError::InvalidAccount(_))
        ));
        assert_eq!(
            f.vault.set_deposit_limit(&f.admin, 0),
            Err(VaultError::AlreadySet)
        );
    }

    #[test]
    fn only_bound_slasher_can_slash() {
        let mut f = fixture();
        let alice = Address::derive("alice");
        f.vault.deposit(&alice, alice, 100, f.zero).unwrap();
        let err = f
            .vault
            .on_slash(&alice, f.zero, 10, Address::derive("burner"), f.zero + days(1))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authorization);
        assert_eq!(
            f.vault.set_slasher(&f.admin, Address::derive("other")),
            Err(VaultError::AlreadySet)
        );
    }

    #[test]
    fn proportional_slash_sixty_forty() {
        let mut f = fixture();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        f.vault.deposit(&alice, alice, 60, f.zero).unwrap();
        f.vault.deposit(&bob, bob, 40, f.zero).unwrap();

        let burner = Address::derive("burner");
        let capture = f.zero + days(1);
        let plan = f
            .vault
            .on_slash(&f.slasher, capture, 10, burner, f.zero + days(2))
            .unwrap()
            .value;
        assert_eq!(plan.total, 10);
        let loss_of = |who: Address| {
            plan.losses
                .iter()
                .find(|l| l.account == who)
                .map(|l| l.total())
                .unwrap_or(0)
        };
        assert_eq!(loss_of(alice), 6);
        assert_eq!(loss_of(bob), 4);
        assert_eq!(f.vault.stake_of(&alice), 54);
        assert_eq!(f.vault.stake_of(&bob), 36);
        assert_eq!(f.ledger.read().balance_of(&burner), 10);
        f.vault.check_invariants().unwrap();
    }

    #[test]
    fn remainder_goes_to_largest_holder() {
        let mut f = fixture();
        let (alice, bob, carol) = (
            Address::derive("alice"),
            Address::derive("bob"),
            Address::derive("carol"),
        );
        f.vault.deposit(&alice, alice, 50, f.zero).unwrap();
        f.vault.deposit(&bob, bob, 30, f.zero).unwrap();
        f.vault.deposit(&carol, carol, 20, f.zero).unwrap();

        // 7 * {50, 30, 20} / 100 floors to {3, 2, 1}; one unit left over.
        let plan = f.vault.plan_slash(f.zero, 7);
        assert_eq!(plan.total, 7);
        assert_eq!(plan.losses[0].account, alice);
        assert_eq!(plan.losses[0].total(), 4);
        assert_eq!(plan.losses[1].total(), 2);
        assert_eq!(plan.losses[2].total(), 1);
    }

    #[test]
    fn withdrawal_before_capture_is_protected() {
        let mut f = fixture();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        f.vault.deposit(&alice, alice, 50, f.zero).unwrap();
        f.vault.deposit(&bob, bob, 50, f.zero).unwrap();
        f.vault.withdraw(&alice, alice, 50, f.zero + days(1)).unwrap();

        let plan = f.vault.plan_slash(f.zero + days(2), 20);
        assert_eq!(plan.losses.len(), 1);
        assert_eq!(plan.losses[0].account, bob);
        assert_eq!(plan.total, 20);
    }

    #[test]
    fn withdrawal_after_capture_is_slashed_from_claim() {
        let mut f = fixture();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        f.vault.deposit(&alice, alice, 50, f.zero).unwrap();
        f.vault.deposit(&bob, bob, 50, f.zero).unwrap();
        f.vault.withdraw(&alice, alice, 50, f.zero + days(2)).unwrap();

        let receipt = f
            .vault
            .on_slash(
                &f.slasher,
                f.zero + days(1),
                20,
                Address::derive("burner"),
                f.zero + days(3),
            )
            .unwrap();
        let alice_loss = receipt
            .value
            .losses
            .iter()
            .find(|l| l.account == alice)
            .copied()
            .unwrap();
        assert_eq!(alice_loss.from_claims, 10);
        assert_eq!(alice_loss.shares_burned, 0);
        assert_eq!(f.vault.claimable(&alice, 0), 40);
        assert_eq!(f.vault.stake_of(&bob), 40);
        f.vault.check_invariants().unwrap();
    }

    #[test]
    fn slash_bounded_by_collectable() {
        let mut f = fixture();
        let alice = Address::derive("alice");
        f.vault.deposit(&alice, alice, 100, f.zero).unwrap();
        let plan = f.vault.plan_slash(f.zero, 1_000);
        assert_eq!(plan.total, 100);
        assert_eq!(plan.losses[0].shares_burned, 100);

        f.vault
            .on_slash(&f.slasher, f.zero, 1_000, Address::derive("burner"), f.zero + days(1))
            .unwrap();
        assert_eq!(f.vault.total_shares(), 0);
        assert_eq!(f.vault.active_stake(), 0);
        f.vault.check_invariants().unwrap();

        // Nothing left to slash.
        assert_eq!(f.vault.plan_slash(f.zero, 1).total, 0);
    }

    #[test]
    fn transferred_shares_carry_no_capture_exposure() {
        let mut f = fixture();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        f.vault.deposit(&alice, alice, 100, f.zero).unwrap();
        f.vault.transfer_shares(&alice, bob, 100, f.zero + days(2)).unwrap();

        // Bob held nothing at capture; Alice holds nothing now.
        assert_eq!(f.vault.plan_slash(f.zero + days(1), 10).total, 0);
        assert_eq!(f.vault.active_shares_of_at(&alice, f.zero + days(1)), 100);
        assert_eq!(f.vault.active_shares_of_at(&bob, f.zero + days(3)), 100);
    }

    #[test]
    fn escaped_holder_loss_is_not_shifted() {
        let mut f = fixture();
        let (alice, bob, carol) = (
            Address::derive("alice"),
            Address::derive("bob"),
            Address::derive("carol"),
        );
        f.vault.deposit(&alice, alice, 60, f.zero).unwrap();
        f.vault.deposit(&bob, bob, 40, f.zero).unwrap();
        f.vault.transfer_shares(&bob, carol, 40, f.zero + days(2)).unwrap();

        let plan = f.vault.plan_slash(f.zero + days(1), 10);
        assert_eq!(plan.total, 6);
        assert_eq!(plan.losses.len(), 1);
        assert_eq!(plan.losses[0].account, alice);
        assert_eq!(plan.losses[0].total(), 6);
    }

    #[test]
    fn redeemed_claim_does_not_shift_loss() {
        let mut f = fixture();
        let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
        f.vault.deposit(&alice, alice, 50, f.zero).unwrap();
        f.vault.deposit(&bob, bob, 50, f.zero).unwrap();
        let capture = f.zero + days(13);
        f.vault.withdraw(&alice, alice, 50, capture + Duration::hours(12)).unwrap();
        f.vault.redeem_one(&alice, alice, 0, f.zero + days(14)).unwrap();

        f.vault
            .on_slash(&f.slasher, capture, 20, Address::derive("burner"), f.zero + days(17))
            .unwrap();
        assert_eq!(f.vault.stake_of(&bob), 40);
        f.vault.check_invariants().unwrap();
    }

    #[test]
    fn redeposit_after_capture_is_not_exposed() {
        let mut f = fixture();
        let (alice, bob, carol) = (
            Address::derive("alice"),
            Address::derive("bob"),
            Address::derive("carol"),
        );
        f.vault.deposit(&alice, alice, 50, f.zero).unwrap();
        f.vault.deposit(&bob, bob, 50, f.zero).unwrap();
        let capture = f.zero + days(1);
        f.vault.withdraw(&alice, alice, 50, f.zero + days(2)).unwrap();
        f.vault.deposit(&alice, alice, 50, f.zero + days(2)).unwrap();
        f.vault.transfer_shares(&bob, carol, 50, f.zero + days(2)).unwrap();

        assert_eq!(f.vault.collectable_of(&alice, capture), (50, 0));
        let plan = f
            .vault
            .on_slash(&f.slasher, capture, 100, Address::derive("burner"), f.zero + days(3))
            .unwrap()
            .value;
        assert_eq!(plan.total, 50);
        assert_eq!(plan.losses[0].from_claims, 50);
        assert_eq!(plan.losses[0].shares_burned, 0);
        assert_eq!(f.vault.stake_of(&alice), 50);
        assert_eq!(f.vault.claimable(&alice, 0), 0);
        assert_eq!(f.vault.stake_of(&carol), 50);
        f.vault.check_invariants().unwrap();
    }
}
