//! Integration tests for staking: deposits, withdrawals, redemption and
//! deposit policy, driven through a full deployment.

mod common;

use chrono::Duration;
use common::*;
use stvault_contracts::deployment::DeploymentError;
use stvault_protocol::types::ErrorCategory;
use stvault_protocol::vault::{GateDenial, QueueError, ShareError, VaultError};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn full_lifecycle_deposit_withdraw_redeem() {
    let mut d = deploy();
    let alice = account("alice");
    d.mint_collateral(alice, 1_000).unwrap();

    // 1. Deposit at 1:1
    let minted = d.deposit(&alice, alice, 1_000).unwrap().value;
    assert_eq!(minted, 1_000);
    assert_eq!(d.current_epoch(), 0);

    // 2. Withdraw everything into epoch 0
    let ticket = d.withdraw(&alice, alice, 1_000).unwrap().value;
    assert_eq!(ticket.epoch, 0);
    assert_eq!(ticket.amount, 1_000);
    assert_eq!(d.vault().balance_of(&alice), 0);
    assert_eq!(d.vault().claimable(&alice, 0), 1_000);

    // 3. Too early
    let err = d.redeem(&alice, alice, &[0]).unwrap_err();
    assert!(matches!(
        err,
        DeploymentError::Vault(VaultError::Queue(QueueError::EpochNotElapsed {
            epoch: 0,
            current: 0
        }))
    ));
    assert_eq!(err.category(), ErrorCategory::Timing);

    // 4. Two epochs later
    advance(&d, Duration::days(28));
    assert_eq!(d.current_epoch(), 2);
    let paid = d.redeem(&alice, alice, &[0]).unwrap().value;
    assert_eq!(paid, 1_000);
    assert_eq!(d.collateral_of(&alice), 1_000);
    d.check_invariants().unwrap();

    // 5. Consumed claims are gone
    assert!(matches!(
        d.redeem(&alice, alice, &[0]),
        Err(DeploymentError::Vault(VaultError::Queue(
            QueueError::NothingToClaim { .. }
        )))
    ));
}

#[test]
fn batch_redeem_across_epochs() {
    let mut d = deploy();
    let alice = stake(&mut d, "alice", 900);

    d.withdraw(&alice, alice, 300).unwrap();
    advance(&d, Duration::days(14));
    d.withdraw(&alice, alice, 300).unwrap();
    advance(&d, Duration::days(14));

    let bob = account("bob");
    let paid = d.redeem(&alice, bob, &[0, 1]).unwrap().value;
    assert_eq!(paid, 600);
    assert_eq!(d.collateral_of(&bob), 600);
    assert_eq!(d.vault().stake_of(&alice), 300);
    d.check_invariants().unwrap();
}

#[test]
fn batch_with_unelapsed_epoch_redeems_nothing() {
    let mut d = deploy();
    let alice = stake(&mut d, "alice", 500);
    d.withdraw(&alice, alice, 200).unwrap();
    advance(&d, Duration::days(14));
    d.withdraw(&alice, alice, 100).unwrap();

    let before = state_json(&d);
    assert!(d.redeem(&alice, alice, &[0, 1]).is_err());
    assert_eq!(state_json(&d), before);
    assert_eq!(d.redeem(&alice, alice, &[0]).unwrap().value, 200);
}

#[test]
fn withdraw_to_another_claimer() {
    let mut d = deploy();
    let alice = stake(&mut d, "alice", 400);
    let carol = account("carol");

    d.withdraw(&alice, carol, 400).unwrap();
    advance(&d, Duration::days(15));
    assert!(d.redeem(&alice, alice, &[0]).is_err());
    assert_eq!(d.redeem(&carol, carol, &[0]).unwrap().value, 400);
}

#[test]
fn withdraw_more_than_balance_fails() {
    let mut d = deploy();
    let alice = stake(&mut d, "alice", 100);
    let err = d.withdraw(&alice, alice, 101).unwrap_err();
    assert!(matches!(
        err,
        DeploymentError::Vault(VaultError::Shares(ShareError::InsufficientShares {
            available: 100,
            requested: 101,
            ..
        }))
    ));
    assert_eq!(err.category(), ErrorCategory::Resource);
}

#[test]
fn deposit_on_behalf_and_share_transfer() {
    let mut d = deploy();
    let alice = account("alice");
    let bob = account("bob");
    d.mint_collateral(alice, 1_000).unwrap();

    d.deposit(&alice, bob, 1_000).unwrap();
    assert_eq!(d.vault().balance_of(&alice), 0);
    assert_eq!(d.vault().balance_of(&bob), 1_000);

    d.transfer_shares(&bob, alice, 250).unwrap();
    assert_eq!(d.vault().balance_of(&alice), 250);
    assert_eq!(d.vault().balance_of(&bob), 750);
    d.check_invariants().unwrap();
}

// ---------------------------------------------------------------------------
// Deposit policy
// ---------------------------------------------------------------------------

#[test]
fn deposit_limit_is_inclusive() {
    let mut d = deploy();
    let admin = roles().admin;
    d.set_is_deposit_limit(&admin, true).unwrap();
    d.set_deposit_limit(&admin, 1_000_000).unwrap();

    let alice = stake(&mut d, "alice", 600_000);
    d.mint_collateral(alice, 400_001).unwrap();

    let err = d.deposit(&alice, alice, 400_001).unwrap_err();
    assert!(matches!(
        err,
        DeploymentError::Vault(VaultError::GatekeeperRejected(GateDenial::LimitExceeded {
            projected: 1_000_001,
            limit: 1_000_000
        }))
    ));
    d.deposit(&alice, alice, 400_000).unwrap();
    assert_eq!(d.vault().active_stake(), 1_000_000);
}

#[test]
fn whitelist_gates_depositors() {
    let mut d = deploy();
    let admin = roles().admin;
    let alice = account("alice");
    d.mint_collateral(alice, 100).unwrap();

    d.set_deposit_whitelist(&admin, true).unwrap();
    assert!(matches!(
        d.deposit(&alice, alice, 100),
        Err(DeploymentError::Vault(VaultError::GatekeeperRejected(
            GateDenial::NotWhitelisted(_)
        )))
    ));

    d.set_depositor_whitelist_status(&admin, alice, true).unwrap();
    d.deposit(&alice, alice, 100).unwrap();

    // Same value again is a no-op error.
    assert!(matches!(
        d.set_depositor_whitelist_status(&admin, alice, true),
        Err(DeploymentError::Vault(VaultError::AlreadySet))
    ));
}

#[test]
fn policy_changes_need_roles() {
    let mut d = deploy();
    let mallory = account("mallory");
    let err = d.set_is_deposit_limit(&mallory, true).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
    assert!(!d.vault().policy().limit_enabled);
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[test]
fn failed_operations_leave_state_unchanged() {
    let mut d = deploy();
    let admin = roles().admin;
    let alice = stake(&mut d, "alice", 1_000);
    d.set_is_deposit_limit(&admin, true).unwrap();
    d.set_deposit_limit(&admin, 1_500).unwrap();
    d.mint_collateral(alice, 5_000).unwrap();
    let before = state_json(&d);

    assert!(d.deposit(&alice, alice, 501).is_err());
    assert!(d.deposit(&alice, alice, 0).is_err());
    assert!(d.withdraw(&alice, alice, 1_001).is_err());
    assert!(d.redeem(&alice, alice, &[0]).is_err());
    assert!(d.transfer_shares(&alice, account("bob"), 2_000).is_err());
    assert!(d.set_deposit_limit(&account("mallory"), 10).is_err());
    assert!(d.set_delay(&alice, Duration::days(40)).is_err());
    assert!(d.accept_delay().is_err());

    assert_eq!(state_json(&d), before);
    d.check_invariants().unwrap();
}

#[test]
fn uncovered_deposit_fails_without_minting() {
    let mut d = deploy();
    let alice = account("alice");
    d.mint_collateral(alice, 10).unwrap();
    let before = state_json(&d);

    let err = d.deposit(&alice, alice, 11).unwrap_err();
    assert!(matches!(err, DeploymentError::Vault(VaultError::Token(_))));
    assert_eq!(state_json(&d), before);
    assert_eq!(d.vault().total_shares(), 0);
}
