//! # Deployment
//!
//! Wires one vault, its burner router and its veto slasher to a shared role
//! table and collateral ledger, the way a factory would deploy them
//! together. Every operation reads the deployment's [`Clock`] once and
//! passes that instant down, so a call behaves like a single transaction.
//!
//! Component addresses are derived from the share symbol, so two
//! deployments with different symbols never collide on one ledger.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use stvault_protocol::access::{AccessError, AccessGate, Role, RoleTable};
use stvault_protocol::config::{ConfigError, DeploymentConfig};
use stvault_protocol::epoch::Clock;
use stvault_protocol::events::Receipt;
use stvault_protocol::token::{SharedToken, TokenError, TokenLedger};
use stvault_protocol::types::{Address, Amount, EpochIndex, ErrorCategory, Shares, Timestamp};
use stvault_protocol::vault::{TokenizedVault, VaultError, VaultState, WithdrawalTicket};
use thiserror::Error;
use tracing::info;

use crate::burner_router::{BurnerRouter, RouterState, SettingsError};
use crate::events::Event;
use crate::veto_slasher::{SlashError, SlashIndex, SlasherState, VetoSlasher};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a composed deployment.
#[derive(Debug, Error)]
pub enum DeploymentError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A role check or role change failed.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// A direct ledger operation failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// A vault operation failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A router operation failed.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// A slashing operation failed.
    #[error(transparent)]
    Slash(#[from] SlashError),

    /// The router's books disagree with its collateral balance.
    #[error("router invariant violated: {0}")]
    InvariantViolated(String),
}

impl DeploymentError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DeploymentError::Config(e) => e.category(),
            DeploymentError::Access(e) => e.category(),
            DeploymentError::Token(e) => e.category(),
            DeploymentError::Vault(e) => e.category(),
            DeploymentError::Settings(e) => e.category(),
            DeploymentError::Slash(e) => e.category(),
            DeploymentError::InvariantViolated(_) => ErrorCategory::StateConflict,
        }
    }
}

// ---------------------------------------------------------------------------
// Roles and snapshots
// ---------------------------------------------------------------------------

/// Accounts granted roles at deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRoles {
    /// Default admin; also administers the deposit whitelist and limit.
    pub admin: Address,
    /// Proposes router receiver and delay changes.
    pub governance: Address,
    /// The network allowed to request and execute slashes.
    pub network: Address,
    /// The veto authority.
    pub resolver: Address,
}

/// Everything a deployment may mutate, for audits and before/after checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    /// Instant the snapshot was taken.
    pub taken_at: Timestamp,
    /// Role membership.
    pub roles: RoleTable,
    /// Collateral balances.
    pub ledger: TokenLedger,
    /// Vault bookkeeping.
    pub vault: VaultState,
    /// Router bookkeeping.
    pub router: RouterState,
    /// Slasher bookkeeping.
    pub slasher: SlasherState,
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// A vault, burner router and veto slasher sharing one role table and one
/// collateral ledger.
pub struct Deployment<C: Clock> {
    config: DeploymentConfig,
    roles: DeploymentRoles,
    clock: C,
    gate: AccessGate,
    ledger: Arc<RwLock<TokenLedger>>,
    vault: TokenizedVault<SharedToken>,
    router: BurnerRouter<SharedToken>,
    slasher: VetoSlasher,
}

impl<C: Clock> Deployment<C> {
    /// Validates `config`, grants `roles` and deploys the three components
    /// with the slasher bound to the vault.
    pub fn new(
        config: DeploymentConfig,
        roles: DeploymentRoles,
        clock: C,
    ) -> Result<Self, DeploymentError> {
        config.validate()?;
        let now = clock.now();

        let gate = AccessGate::new(RoleTable::new(roles.admin));
        let grants = [
            (Role::DepositWhitelistAdmin, roles.admin),
            (Role::DepositorWhitelistAdmin, roles.admin),
            (Role::DepositLimitAdmin, roles.admin),
            (Role::SettingsGovernance, roles.governance),
            (Role::Slasher, roles.network),
            (Role::VetoAuthority, roles.resolver),
        ];
        for (role, account) in grants {
            gate.grant_role(&roles.admin, role, account)?;
        }

        let ledger = TokenLedger::new().shared();
        let vault_address = Address::derive(&format!("{}/vault", config.symbol));
        let router_address = Address::derive(&format!("{}/burner-router", config.symbol));
        let slasher_address = Address::derive(&format!("{}/veto-slasher", config.symbol));

        let mut vault = TokenizedVault::new(
            &config,
            gate.clone(),
            SharedToken::new(ledger.clone(), vault_address),
            now,
        );
        let router = BurnerRouter::new(
            &config,
            gate.clone(),
            SharedToken::new(ledger.clone(), router_address),
        );
        let slasher = VetoSlasher::new(slasher_address, gate.clone(), config.veto_duration());
        vault.set_slasher(&roles.admin, slasher.address())?;

        info!(
            symbol = %config.symbol,
            vault = %vault_address,
            router = %router_address,
            slasher = %slasher_address,
            "deployment created"
        );
        Ok(Self {
            config,
            roles,
            clock,
            gate,
            ledger,
            vault,
            router,
            slasher,
        })
    }

    /// Loads a JSON configuration from `path` and deploys it.
    pub fn from_config_file(
        path: impl AsRef<Path>,
        roles: DeploymentRoles,
        clock: C,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = DeploymentConfig::from_file(path)
            .with_context(|| format!("loading deployment config from {}", path.display()))?;
        Self::new(config, roles, clock).context("deploying vault components")
    }

    // ---- Views ----

    /// The configuration this deployment was created from.
    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// The accounts granted roles at deployment.
    pub fn roles(&self) -> &DeploymentRoles {
        &self.roles
    }

    /// The deployment's clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current instant according to the clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Current epoch according to the clock.
    pub fn current_epoch(&self) -> EpochIndex {
        self.vault.current_epoch(self.clock.now())
    }

    /// The shared access gate.
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    /// The vault.
    pub fn vault(&self) -> &TokenizedVault<SharedToken> {
        &self.vault
    }

    /// The burner router.
    pub fn router(&self) -> &BurnerRouter<SharedToken> {
        &self.router
    }

    /// The veto slasher.
    pub fn slasher(&self) -> &VetoSlasher {
        &self.slasher
    }

    /// Collateral held by `account` on the shared ledger.
    pub fn collateral_of(&self, account: &Address) -> Amount {
        self.ledger.read().balance_of(account)
    }

    /// Stake still slashable for `(network, operator)` at `capture`.
    pub fn slashable_stake(
        &self,
        network: &Address,
        operator: &Address,
        capture: Timestamp,
    ) -> Amount {
        self.slasher
            .slashable_stake(&self.vault, network, operator, capture, self.clock.now())
    }

    /// Copy of all mutable state.
    pub fn snapshot(&self) -> DeploymentSnapshot {
        DeploymentSnapshot {
            taken_at: self.clock.now(),
            roles: self.gate.snapshot(),
            ledger: self.ledger.read().clone(),
            vault: self.vault.snapshot(),
            router: self.router.snapshot(),
            slasher: self.slasher.snapshot(),
        }
    }

    /// Checks vault conservation and that the router's books match its
    /// collateral balance.
    pub fn check_invariants(&self) -> Result<(), DeploymentError> {
        self.vault.check_invariants()?;
        let held = self.collateral_of(&self.router.address());
        let routed = self.router.total_routed();
        if held != routed {
            return Err(DeploymentError::InvariantViolated(format!(
                "router holds {held} but accounts for {routed}"
            )));
        }
        Ok(())
    }

    // ---- Collateral ----

    /// Issues fresh collateral to `to`. Stands in for the external token's
    /// own issuance.
    pub fn mint_collateral(
        &mut self,
        to: Address,
        amount: Amount,
    ) -> Result<Amount, DeploymentError> {
        Ok(self.ledger.write().mint(to, amount)?)
    }

    // ---- Roles ----

    /// Grants `role` to `account`.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<bool, DeploymentError> {
        Ok(self.gate.grant_role(caller, role, account)?)
    }

    /// Revokes `role` from `account`.
    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
    ) -> Result<bool, DeploymentError> {
        Ok(self.gate.revoke_role(caller, role, account)?)
    }

    // ---- Vault ----

    /// See [`TokenizedVault::deposit`].
    pub fn deposit(
        &mut self,
        depositor: &Address,
        on_behalf_of: Address,
        amount: Amount,
    ) -> Result<Receipt<Shares, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.vault.deposit(depositor, on_behalf_of, amount, now)?.widen())
    }

    /// See [`TokenizedVault::withdraw`].
    pub fn withdraw(
        &mut self,
        account: &Address,
        claimer: Address,
        shares: Shares,
    ) -> Result<Receipt<WithdrawalTicket, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.vault.withdraw(account, claimer, shares, now)?.widen())
    }

    /// See [`TokenizedVault::redeem`].
    pub fn redeem(
        &mut self,
        claimer: &Address,
        recipient: Address,
        epochs: &[EpochIndex],
    ) -> Result<Receipt<Amount, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.vault.redeem(claimer, recipient, epochs, now)?.widen())
    }

    /// See [`TokenizedVault::transfer_shares`].
    pub fn transfer_shares(
        &mut self,
        from: &Address,
        to: Address,
        shares: Shares,
    ) -> Result<Receipt<(), Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.vault.transfer_shares(from, to, shares, now)?.widen())
    }

    /// See [`TokenizedVault::set_deposit_whitelist`].
    pub fn set_deposit_whitelist(
        &mut self,
        caller: &Address,
        status: bool,
    ) -> Result<Receipt<(), Event>, DeploymentError> {
        Ok(self.vault.set_deposit_whitelist(caller, status)?.widen())
    }

    /// See [`TokenizedVault::set_depositor_whitelist_status`].
    pub fn set_depositor_whitelist_status(
        &mut self,
        caller: &Address,
        account: Address,
        status: bool,
    ) -> Result<Receipt<(), Event>, DeploymentError> {
        Ok(self
            .vault
            .set_depositor_whitelist_status(caller, account, status)?
            .widen())
    }

    /// See [`TokenizedVault::set_is_deposit_limit`].
    pub fn set_is_deposit_limit(
        &mut self,
        caller: &Address,
        status: bool,
    ) -> Result<Receipt<(), Event>, DeploymentError> {
        Ok(self.vault.set_is_deposit_limit(caller, status)?.widen())
    }

    /// See [`TokenizedVault::set_deposit_limit`].
    pub fn set_deposit_limit(
        &mut self,
        caller: &Address,
        limit: Amount,
    ) -> Result<Receipt<(), Event>, DeploymentError> {
        Ok(self.vault.set_deposit_limit(caller, limit)?.widen())
    }

    // ---- Router ----

    /// Proposes a new global receiver. Returns when it can be accepted.
    pub fn set_global_receiver(
        &mut self,
        caller: &Address,
        receiver: Address,
    ) -> Result<Receipt<Timestamp, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.router.set_global_receiver(caller, receiver, now)?.widen())
    }

    /// Commits the pending global receiver.
    pub fn accept_global_receiver(&mut self) -> Result<Receipt<Address, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.router.accept_global_receiver(now)?.widen())
    }

    /// Proposes a receiver override for `network`.
    pub fn set_network_receiver(
        &mut self,
        caller: &Address,
        network: Address,
        receiver: Address,
    ) -> Result<Receipt<Timestamp, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self
            .router
            .set_network_receiver(caller, network, receiver, now)?
            .widen())
    }

    /// Commits the pending override for `network`.
    pub fn accept_network_receiver(
        &mut self,
        network: Address,
    ) -> Result<Receipt<Address, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.router.accept_network_receiver(network, now)?.widen())
    }

    /// Proposes a receiver override for `(network, operator)`.
    pub fn set_operator_network_receiver(
        &mut self,
        caller: &Address,
        network: Address,
        operator: Address,
        receiver: Address,
    ) -> Result<Receipt<Timestamp, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self
            .router
            .set_operator_network_receiver(caller, network, operator, receiver, now)?
            .widen())
    }

    /// Commits the pending override for `(network, operator)`.
    pub fn accept_operator_network_receiver(
        &mut self,
        network: Address,
        operator: Address,
    ) -> Result<Receipt<Address, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self
            .router
            .accept_operator_network_receiver(network, operator, now)?
            .widen())
    }

    /// Proposes a new router delay.
    pub fn set_delay(
        &mut self,
        caller: &Address,
        delay: Duration,
    ) -> Result<Receipt<Timestamp, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.router.set_delay(caller, delay, now)?.widen())
    }

    /// Commits the pending router delay.
    pub fn accept_delay(&mut self) -> Result<Receipt<Duration, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.router.accept_delay(now)?.widen())
    }

    /// Pays out everything routed to `receiver`.
    pub fn trigger_transfer(
        &mut self,
        receiver: Address,
    ) -> Result<Receipt<Amount, Event>, DeploymentError> {
        Ok(self.router.trigger_transfer(receiver)?.widen())
    }

    // ---- Slashing ----

    /// Requests a slash on behalf of `network` (which must hold the slasher
    /// role) against `operator`.
    pub fn request_slash(
        &mut self,
        network: &Address,
        operator: Address,
        amount: Amount,
        capture: Timestamp,
    ) -> Result<Receipt<SlashIndex, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self
            .slasher
            .request_slash(network, &self.vault, *network, operator, amount, capture, now)?
            .widen())
    }

    /// Vetoes a pending slash request.
    pub fn veto_slash(
        &mut self,
        resolver: &Address,
        index: SlashIndex,
    ) -> Result<Receipt<(), Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self.slasher.veto_slash(resolver, index, now)?.widen())
    }

    /// Executes a slash request whose veto window has closed.
    pub fn execute_slash(
        &mut self,
        caller: &Address,
        index: SlashIndex,
    ) -> Result<Receipt<Amount, Event>, DeploymentError> {
        let now = self.clock.now();
        Ok(self
            .slasher
            .execute_slash(caller, index, &mut self.vault, &mut self.router, now)?)
    }
}

impl<C: Clock> std::fmt::Debug for Deployment<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("symbol", &self.config.symbol)
            .field("vault", &self.vault.address())
            .field("router", &self.router.address())
            .field("slasher", &self.slasher.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stvault_protocol::epoch::ManualClock;

    fn roles() -> DeploymentRoles {
        DeploymentRoles {
            admin: Address::derive("admin"),
            governance: Address::derive("governance"),
            network: Address::derive("network"),
            resolver: Address::derive("resolver"),
        }
    }

    fn deploy() -> Deployment<ManualClock> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let config = DeploymentConfig::reference(Address::derive("governance"), start);
        Deployment::new(config, roles(), ManualClock::new(start)).unwrap()
    }

    #[test]
    fn roles_are_granted_and_slasher_bound() {
        let d = deploy();
        let r = roles();
        assert!(d.gate().require(&r.network, Role::Slasher).is_ok());
        assert!(d.gate().require(&r.resolver, Role::VetoAuthority).is_ok());
        assert!(d.gate().require(&r.governance, Role::SettingsGovernance).is_ok());
        assert!(d.gate().require(&r.admin, Role::DepositLimitAdmin).is_ok());
        assert_eq!(d.vault().slasher(), d.slasher().address());
        d.check_invariants().unwrap();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut config = DeploymentConfig::reference(Address::derive("governance"), start);
        config.burner_delay_secs = config.epoch_duration_secs * 2;
        let err = Deployment::new(config, roles(), ManualClock::new(start)).unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::Config(ConfigError::DelayBelowExitWindow { .. })
        ));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn component_addresses_are_distinct() {
        let d = deploy();
        let addresses = [
            d.vault().address(),
            d.router().address(),
            d.slasher().address(),
        ];
        assert_ne!(addresses[0], addresses[1]);
        assert_ne!(addresses[1], addresses[2]);
        assert_ne!(addresses[0], addresses[2]);
    }

    #[test]
    fn loads_from_config_file() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let config = DeploymentConfig::reference(Address::derive("governance"), start);
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let d =
            Deployment::from_config_file(file.path(), roles(), ManualClock::new(start)).unwrap();
        assert_eq!(d.config(), &config);

        let missing = Deployment::from_config_file(
            file.path().with_extension("missing"),
            roles(),
            ManualClock::new(start),
        );
        let message = format!("{:#}", missing.unwrap_err());
        assert!(message.contains("loading deployment config"));
    }
}
