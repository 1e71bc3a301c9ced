//! Unified event stream for a composed deployment.

use serde::{Deserialize, Serialize};
use stvault_protocol::events::VaultEvent;

use crate::burner_router::RouterEvent;
use crate::veto_slasher::SlasherEvent;

/// Any event emitted by a deployment's components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// From the tokenized vault.
    Vault(VaultEvent),
    /// From the burner router.
    Router(RouterEvent),
    /// From the veto slasher.
    Slasher(SlasherEvent),
}

impl From<VaultEvent> for Event {
    fn from(event: VaultEvent) -> Self {
        Event::Vault(event)
    }
}

impl From<RouterEvent> for Event {
    fn from(event: RouterEvent) -> Self {
        Event::Router(event)
    }
}

impl From<SlasherEvent> for Event {
    fn from(event: SlasherEvent) -> Self {
        Event::Slasher(event)
    }
}
