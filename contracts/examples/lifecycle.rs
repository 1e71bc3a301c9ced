//! Walk-through of a staked vault deployment.
//!
//! Deposits from two stakers, a withdrawal, a governed receiver change, a
//! vetoed slash and an executed one, with the resulting balances printed
//! after each step. Time is simulated with a manual clock.
//!
//! Run with:
//!   cargo run -p stvault-contracts --example lifecycle
//!
//! Set `STVAULT_LOG_FORMAT=json` for JSON log lines, `RUST_LOG` to filter.

use anyhow::Context;
use chrono::{Duration, TimeZone, Utc};

use stvault_contracts::deployment::{Deployment, DeploymentRoles};
use stvault_protocol::config::DeploymentConfig;
use stvault_protocol::epoch::{Clock, ManualClock};
use stvault_protocol::logging::{init_logging, LogFormat};
use stvault_protocol::Address;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

fn section(title: &str) {
    println!();
    println!("{BOLD}{CYAN}== {title}{RESET}");
}

fn ok(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn main() -> anyhow::Result<()> {
    let format = std::env::var("STVAULT_LOG_FORMAT")
        .map(|s| LogFormat::from_str_lossy(&s))
        .unwrap_or(LogFormat::Pretty);
    init_logging("stvault_protocol=warn,stvault_contracts=info", format)
        .context("installing log subscriber")?;

    let start = Utc
        .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .context("invalid start date")?;
    let roles = DeploymentRoles {
        admin: Address::derive("admin"),
        governance: Address::derive("governance"),
        network: Address::derive("network"),
        resolver: Address::derive("resolver"),
    };
    let clock = ManualClock::new(start);
    let config = DeploymentConfig::reference(roles.governance, start);
    let mut d = Deployment::new(config, roles, clock.clone()).context("deploying")?;

    section("Deployment");
    field("vault", d.vault().address());
    field("router", d.router().address());
    field("slasher", d.slasher().address());

    section("Deposits");
    let alice = Address::derive("alice");
    let bob = Address::derive("bob");
    for (who, amount) in [(alice, 6_000u128), (bob, 4_000)] {
        d.mint_collateral(who, amount)?;
        let shares = d.deposit(&who, who, amount)?.value;
        ok(&format!("{who} deposited {amount}, minted {shares} shares"));
    }
    field("active stake", d.vault().active_stake());

    section("Withdrawal");
    clock.advance(Duration::days(2));
    let ticket = d.withdraw(&bob, bob, 1_000)?.value;
    ok(&format!(
        "bob queued {} shares worth {} in epoch {}",
        ticket.shares, ticket.amount, ticket.epoch
    ));

    section("Governed receiver change");
    let treasury = Address::derive("treasury");
    let ready_at = d.set_global_receiver(&roles.governance, treasury)?.value;
    field("ready at", ready_at);
    if d.accept_global_receiver().is_err() {
        println!("{DIM}  accept refused before the delay, as expected{RESET}");
    }

    section("Vetoed slash");
    let capture = clock.now() - Duration::hours(1);
    let operator = Address::derive("operator");
    let vetoed = d
        .request_slash(&roles.network, operator, 2_000, capture)?
        .value;
    d.veto_slash(&roles.resolver, vetoed)?;
    ok(&format!("request {vetoed} vetoed"));

    section("Executed slash");
    let index = d
        .request_slash(&roles.network, operator, 900, capture)?
        .value;
    clock.advance(d.config().veto_duration() + Duration::seconds(1));
    let slashed = d.execute_slash(&roles.network, index)?.value;
    ok(&format!("request {index} slashed {slashed}"));
    field("alice stake", d.vault().stake_of(&alice));
    field("bob stake", d.vault().stake_of(&bob));
    field("bob claim", d.vault().claimable(&bob, ticket.epoch));

    let receiver = d.router().global_receiver();
    let paid = d.trigger_transfer(receiver)?.value;
    ok(&format!("router paid {paid} to {receiver}"));

    d.check_invariants().context("post-run audit")?;
    ok("invariants hold");
    Ok(())
}
