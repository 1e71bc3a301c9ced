//! Shared harness for the integration tests.

#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use stvault_contracts::deployment::{Deployment, DeploymentRoles};
use stvault_protocol::config::DeploymentConfig;
use stvault_protocol::epoch::ManualClock;
use stvault_protocol::types::{Address, Amount, Timestamp};

pub fn start() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn roles() -> DeploymentRoles {
    DeploymentRoles {
        admin: Address::derive("admin"),
        governance: Address::derive("governance"),
        network: Address::derive("network"),
        resolver: Address::derive("resolver"),
    }
}

pub fn operator() -> Address {
    Address::derive("operator")
}

pub fn account(label: &str) -> Address {
    Address::derive(label)
}

/// Reference deployment paying slashes to the governance account.
pub fn deploy() -> Deployment<ManualClock> {
    deploy_with(DeploymentConfig::reference(roles().governance, start()))
}

pub fn deploy_with(config: DeploymentConfig) -> Deployment<ManualClock> {
    Deployment::new(config, roles(), ManualClock::new(start())).unwrap()
}

/// Mints collateral to `label` and deposits all of it for itself.
pub fn stake(d: &mut Deployment<ManualClock>, label: &str, amount: Amount) -> Address {
    let who = account(label);
    d.mint_collateral(who, amount).unwrap();
    d.deposit(&who, who, amount).unwrap();
    who
}

pub fn advance(d: &Deployment<ManualClock>, by: Duration) {
    d.clock().advance(by);
}

/// Moves past the veto deadline of a request made now.
pub fn past_veto(d: &Deployment<ManualClock>) {
    advance(d, d.config().veto_duration() + Duration::seconds(1));
}

pub fn state_json(d: &Deployment<ManualClock>) -> String {
    serde_json::to_string(&d.snapshot()).unwrap()
}
