//! # Deployment Configuration & Constants
//!
//! Every timing constant of the staking vault lives here, together with the
//! [`DeploymentConfig`] that wires a vault, its burner router and its veto
//! slasher together.
//!
//! The three durations are not independent. A staker who disagrees with a
//! pending receiver change must be able to exit before it lands, and exiting
//! takes up to two epochs (withdraw late in epoch `e`, redeem in `e + 1`).
//! Hence the burner delay must exceed two epoch durations, and the veto
//! window must fit inside a single epoch so a slash can still be executed
//! while its capture is in range.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount, ErrorCategory};

// ---------------------------------------------------------------------------
// Reference deployment
// ---------------------------------------------------------------------------

const DAY_SECS: u64 = 24 * 60 * 60;

/// Epoch length of the reference deployment: two weeks.
pub const EPOCH_DURATION_SECS: u64 = 14 * DAY_SECS;

/// Delay between proposing and accepting a burner router change: 31 days.
pub const BURNER_DELAY_SECS: u64 = 31 * DAY_SECS;

/// Window during which a requested slash can be vetoed: 3 days.
pub const VETO_DURATION_SECS: u64 = 3 * DAY_SECS;

/// Share token name of the reference deployment.
pub const DEFAULT_SHARE_NAME: &str = "Staked Spark";

/// Share token symbol of the reference deployment.
pub const DEFAULT_SHARE_SYMBOL: &str = "stSPK";

/// Returns [`EPOCH_DURATION_SECS`] as a `chrono::Duration`.
pub fn epoch_duration() -> Duration {
    secs(EPOCH_DURATION_SECS)
}

/// Returns [`BURNER_DELAY_SECS`] as a `chrono::Duration`.
pub fn burner_delay() -> Duration {
    secs(BURNER_DELAY_SECS)
}

/// Returns [`VETO_DURATION_SECS`] as a `chrono::Duration`.
pub fn veto_duration() -> Duration {
    secs(VETO_DURATION_SECS)
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a deployment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for [`DeploymentConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Epochs must have a positive length.
    #[error("epoch duration must be non-zero")]
    ZeroEpochDuration,

    /// The veto window does not fit inside one epoch.
    #[error("veto duration {veto_secs}s must be shorter than the epoch duration {epoch_secs}s")]
    VetoDurationTooLong {
        /// Configured veto window.
        veto_secs: u64,
        /// Configured epoch length.
        epoch_secs: u64,
    },

    /// The burner delay would not let stakers exit before a change lands.
    #[error("burner delay {delay_secs}s must exceed two epochs ({min_secs}s)")]
    DelayBelowExitWindow {
        /// Configured burner delay.
        delay_secs: u64,
        /// Two epoch durations.
        min_secs: u64,
    },

    /// Share token name or symbol is empty.
    #[error("share token name and symbol must be non-empty")]
    EmptyMetadata,

    /// A deposit limit value was given while the limit is disabled.
    #[error("deposit limit {limit} configured but limit enforcement is disabled")]
    InconsistentDepositLimit {
        /// The stray limit value.
        limit: Amount,
    },

    /// The same receiver override is listed twice.
    #[error("duplicate receiver override for network {network}")]
    DuplicateReceiver {
        /// Network whose override is duplicated.
        network: Address,
    },
}

impl ConfigError {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

// ---------------------------------------------------------------------------
// DeploymentConfig
// ---------------------------------------------------------------------------

/// Receiver override for all operators of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkReceiver {
    /// The network whose slashes are redirected.
    pub network: Address,
    /// Where those slashes go.
    pub receiver: Address,
}

/// Receiver override for one operator within one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorNetworkReceiver {
    /// The network the operator serves.
    pub network: Address,
    /// The slashed operator.
    pub operator: Address,
    /// Where those slashes go.
    pub receiver: Address,
}

/// Parameters fixed when a vault deployment is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Share token name.
    pub name: String,
    /// Share token symbol.
    pub symbol: String,
    /// Start of epoch 0.
    pub epoch_zero: DateTime<Utc>,
    /// Epoch length in seconds.
    pub epoch_duration_secs: u64,
    /// Whether only whitelisted depositors may deposit.
    #[serde(default)]
    pub deposit_whitelist: bool,
    /// Whether the deposit limit is enforced.
    #[serde(default)]
    pub is_deposit_limit: bool,
    /// Maximum active stake when the limit is enforced.
    #[serde(default)]
    pub deposit_limit: Amount,
    /// Burner router delay in seconds.
    pub burner_delay_secs: u64,
    /// Veto window in seconds.
    pub veto_duration_secs: u64,
    /// Fallback receiver of slashed collateral. Zero means unset.
    pub global_receiver: Address,
    /// Initial per-network receiver overrides.
    #[serde(default)]
    pub network_receivers: Vec<NetworkReceiver>,
    /// Initial per-(network, operator) receiver overrides.
    #[serde(default)]
    pub operator_network_receivers: Vec<OperatorNetworkReceiver>,
}

impl DeploymentConfig {
    /// The reference deployment: two-week epochs, 31-day burner delay,
    /// 3-day veto window, no deposit whitelist or limit.
    pub fn reference(global_receiver: Address, epoch_zero: DateTime<Utc>) -> Self {
        Self {
            name: DEFAULT_SHARE_NAME.to_string(),
            symbol: DEFAULT_SHARE_SYMBOL.to_string(),
            epoch_zero,
            epoch_duration_secs: EPOCH_DURATION_SECS,
            deposit_whitelist: false,
            is_deposit_limit: false,
            deposit_limit: 0,
            burner_delay_secs: BURNER_DELAY_SECS,
            veto_duration_secs: VETO_DURATION_SECS,
            global_receiver,
            network_receivers: Vec::new(),
            operator_network_receivers: Vec::new(),
        }
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Epoch length as a `chrono::Duration`.
    pub fn epoch_duration(&self) -> Duration {
        secs(self.epoch_duration_secs)
    }

    /// Burner delay as a `chrono::Duration`.
    pub fn burner_delay(&self) -> Duration {
        secs(self.burner_delay_secs)
    }

    /// Veto window as a `chrono::Duration`.
    pub fn veto_duration(&self) -> Duration {
        secs(self.veto_duration_secs)
    }

    /// Checks the deployment-time invariants between the durations and
    /// the initial router and deposit settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() || self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptyMetadata);
        }
        if self.epoch_duration_secs == 0 {
            return Err(ConfigError::ZeroEpochDuration);
        }
        if self.veto_duration_secs >= self.epoch_duration_secs {
            return Err(ConfigError::VetoDurationTooLong {
                veto_secs: self.veto_duration_secs,
                epoch_secs: self.epoch_duration_secs,
            });
        }
        let min_secs = self.epoch_duration_secs.saturating_mul(2);
        if self.burner_delay_secs <= min_secs {
            return Err(ConfigError::DelayBelowExitWindow {
                delay_secs: self.burner_delay_secs,
                min_secs,
            });
        }
        if !self.is_deposit_limit && self.deposit_limit != 0 {
            return Err(ConfigError::InconsistentDepositLimit {
                limit: self.deposit_limit,
            });
        }

        let mut networks = BTreeSet::new();
        for entry in &self.network_receivers {
            if !networks.insert(entry.network) {
                return Err(ConfigError::DuplicateReceiver {
                    network: entry.network,
                });
            }
        }
        let mut pairs = BTreeSet::new();
        for entry in &self.operator_network_receivers {
            if !pairs.insert((entry.network, entry.operator)) {
                return Err(ConfigError::DuplicateReceiver {
                    network: entry.network,
                });
            }
        }
        Ok(())
    }
}
