// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Staked Vault Protocol: Core Library
//!
//! The staking side of an epoch-based restaking vault: collateral goes in,
//! transferable shares come out, withdrawals queue for an epoch before they
//! can be redeemed, and slashes remove collateral from whoever held stake at
//! a past capture timestamp.
//!
//! ## Architecture
//!
//! - **types**: Addresses, amounts, timestamps, error categories.
//! - **config**: Deployment parameters and the reference constants.
//! - **logging**: `tracing` subscriber setup.
//! - **epoch**: Epoch arithmetic and clock sources.
//! - **checkpoints**: Time-indexed history used for capture lookups.
//! - **math**: Overflow-free `a * b / d` for share conversions.
//! - **access**: Role-based access gate.
//! - **token**: The collateral token interface and an in-memory ledger.
//! - **events**: Receipts and domain events returned by every mutation.
//! - **vault**: Share ledger, withdrawal queue, deposit gatekeeper and the
//!   tokenized vault composing them.
//!
//! Governance delays and the slashing pipeline live in the
//! `stvault-contracts` crate.
//!
//! ## Design Philosophy
//!
//! 1. Every operation takes `now` explicitly; nothing reads a global clock.
//! 2. Every money operation uses checked arithmetic.
//! 3. Failed operations leave state exactly as it was.
//! 4. Mutations return events instead of publishing them.

pub mod access;
pub mod checkpoints;
pub mod config;
pub mod epoch;
pub mod events;
pub mod logging;
pub mod math;
pub mod token;
pub mod types;
pub mod vault;

pub use types::{Address, Amount, EpochIndex, ErrorCategory, Shares, Timestamp};
