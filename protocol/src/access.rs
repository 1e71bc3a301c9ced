//! # Access Control Gate
//!
//! Role-based authorization consulted by every privileged operation.
//!
//! Components never look roles up in a global: each one is handed an
//! [`AccessGate`] at construction and asks it to [`require`](AccessGate::require)
//! the role before touching state. A failed check returns
//! [`AccessError::Unauthorized`] and the operation stops there.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::types::{Address, ErrorCategory};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the access gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The caller does not hold the role the operation requires.
    #[error("unauthorized: {account} lacks role {role}")]
    Unauthorized {
        /// The rejected caller.
        account: Address,
        /// The role that was required.
        role: Role,
    },

    /// Roles cannot be granted to the zero address.
    #[error("invalid account: {0}")]
    InvalidAccount(Address),
}

impl AccessError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AccessError::Unauthorized { .. } => ErrorCategory::Authorization,
            AccessError::InvalidAccount(_) => ErrorCategory::Validation,
        }
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Capabilities a caller can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Grants and revokes every other role.
    DefaultAdmin,
    /// Turns the depositor whitelist on or off.
    DepositWhitelistAdmin,
    /// Adds and removes individual whitelisted depositors.
    DepositorWhitelistAdmin,
    /// Turns the deposit limit on or off and sets its value.
    DepositLimitAdmin,
    /// Requests and executes slashes.
    Slasher,
    /// Vetoes pending slashes.
    VetoAuthority,
    /// Proposes burner router receiver and delay changes.
    SettingsGovernance,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::DefaultAdmin => write!(f, "DefaultAdmin"),
            Role::DepositWhitelistAdmin => write!(f, "DepositWhitelistAdmin"),
            Role::DepositorWhitelistAdmin => write!(f, "DepositorWhitelistAdmin"),
            Role::DepositLimitAdmin => write!(f, "DepositLimitAdmin"),
            Role::Slasher => write!(f, "Slasher"),
            Role::VetoAuthority => write!(f, "VetoAuthority"),
            Role::SettingsGovernance => write!(f, "SettingsGovernance"),
        }
    }
}

/// Anything that can answer "does this account hold this role?".
pub trait RoleRegistry {
    /// Returns `true` if `account` currently holds `role`.
    fn has_role(&self, account: &Address, role: Role) -> bool;
}

// ---------------------------------------------------------------------------
// RoleTable
// ---------------------------------------------------------------------------

/// In-memory role membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleTable {
    members: BTreeMap<Role, BTreeSet<Address>>,
}

impl RoleTable {
    /// Creates a table where `admin` holds [`Role::DefaultAdmin`].
    pub fn new(admin: Address) -> Self {
        let mut table = Self::default();
        if !admin.is_zero() {
            table.insert(Role::DefaultAdmin, admin);
        }
        table
    }

    /// Every holder of `role`.
    pub fn holders(&self, role: Role) -> Vec<Address> {
        self.members
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn insert(&mut self, role: Role, account: Address) -> bool {
        self.members.entry(role).or_default().insert(account)
    }

    fn remove(&mut self, role: Role, account: &Address) -> bool {
        self.members
            .get_mut(&role)
            .map(|set| set.remove(account))
            .unwrap_or(false)
    }
}

impl RoleRegistry for RoleTable {
    fn has_role(&self, account: &Address, role: Role) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// AccessGate
// ---------------------------------------------------------------------------

/// Shared handle to a [`RoleTable`].
///
/// Clones see the same membership, so a role granted through one component's
/// gate is immediately visible to every other component.
#[derive(Debug, Clone)]
pub struct AccessGate {
    table: Arc<RwLock<RoleTable>>,
}

impl AccessGate {
    /// Wraps a role table.
    pub fn new(table: RoleTable) -> Self {
        Self {
            table: Arc::new(RwLock::new(table)),
        }
    }

    /// Fails with [`AccessError::Unauthorized`] unless `caller` holds `role`.
    pub fn require(&self, caller: &Address, role: Role) -> Result<(), AccessError> {
        if self.table.read().has_role(caller, role) {
            Ok(())
        } else {
            Err(AccessError::Unauthorized {
                account: *caller,
                role,
            })
        }
    }

    /// Grants `role` to `account`. Returns `false` if it was already held.
    ///
    /// # Errors
    ///
    /// [`AccessError::Unauthorized`] unless `caller` is a default admin,
    /// [`AccessError::InvalidAccount`] for the zero address.
    pub fn grant_role(
        &self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<bool, AccessError> {
        self.require(caller, Role::DefaultAdmin)?;
        if account.is_zero() {
            return Err(AccessError::InvalidAccount(account));
        }
        let added = self.table.write().insert(role, account);
        if added {
            info!(%role, %account, "role granted");
        }
        Ok(added)
    }

    /// Revokes `role` from `account`. Returns `false` if it was not held.
    pub fn revoke_role(
        &self,
        caller: &Address,
        role: Role,
        account: &Address,
    ) -> Result<bool, AccessError> {
        self.require(caller, Role::DefaultAdmin)?;
        let removed = self.table.write().remove(role, account);
        if removed {
            info!(%role, %account, "role revoked");
        }
        Ok(removed)
    }

    /// Copy of the current membership.
    pub fn snapshot(&self) -> RoleTable {
        self.table.read().clone()
    }
}

impl RoleRegistry for AccessGate {
    fn has_role(&self, account: &Address, role: Role) -> bool {
        self.table.read().has_role(account, role)
    }
}
