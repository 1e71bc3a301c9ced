// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Staked Vault Contracts
//!
//! Governance and slashing on top of the `stvault-protocol` vault:
//!
//! - **Burner Router**: where slashed collateral goes. Receivers (global,
//!   per network, per network and operator) and the router delay itself
//!   change only through propose, wait, accept.
//! - **Veto Slasher**: slash requests that a veto authority may cancel
//!   until a deadline, then execute against the stake captured at a past
//!   timestamp.
//! - **Deployment**: one vault, router and slasher wired to a shared role
//!   table, collateral ledger and clock.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Every privileged operation names its caller and checks a role.
//! 4. Every public state type is serializable (serde) so it can be
//!    snapshotted and compared.

pub mod burner_router;
pub mod deployment;
pub mod events;
pub mod veto_slasher;

pub use burner_router::{BurnerRouter, DelayedSetting, SettingsError};
pub use deployment::{Deployment, DeploymentError, DeploymentRoles, DeploymentSnapshot};
pub use events::Event;
pub use veto_slasher::{SlashError, SlashRequest, SlashStatus, VetoSlasher};
