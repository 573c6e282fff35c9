//! Magic-link lifecycle.
//!
//! An explicit finite state machine for an issued magic link, replacing
//! implicit state derivation from polling results.
//!
//! ```text
//! Pending ───VerifyStart──► Loading ───VerifySuccess──► Consumed
//!    │                         │
//!    │ StatusConsumed          │ VerifyFailed ──► Pending
//!    │ (another context)       │ VerifyExpired ─► Expired
//!    ▼                         ▼
//! Consumed                  Expired
//! ```

use chrono::{DateTime, Utc};
use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub magic_link(Pending)

    Pending => {
        VerifyStart => Loading,
        // Status polling observed consumption in another context.
        StatusConsumed => Consumed,
        StatusExpired => Expired
    },
    Loading => {
        VerifySuccess => Consumed,
        // Bad or mistyped code; the link itself is still live.
        VerifyFailed => Pending,
        VerifyExpired => Expired
    }
}

pub use magic_link::Input as MagicLinkInput;
pub use magic_link::State as MagicLinkState;
pub use magic_link::StateMachine as MagicLinkMachine;

impl MagicLinkState {
    /// Terminal states accept no further input.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MagicLinkState::Consumed | MagicLinkState::Expired)
    }
}

/// A magic link the server has issued but not yet consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMagicLink {
    /// Server-issued link id, used for status polling and verification.
    pub id: String,
    /// Identifier the link was sent to.
    pub identifier: String,
    /// Whether this link was issued because the device looked new.
    #[serde(default)]
    pub new_device: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Server-reported status of an issued link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagicLinkStatus {
    Pending,
    Consumed,
    Expired,
}

impl MagicLinkStatus {
    /// The FSM input a polled status corresponds to, if any.
    pub fn as_input(&self) -> Option<MagicLinkInput> {
        match self {
            MagicLinkStatus::Pending => None,
            MagicLinkStatus::Consumed => Some(MagicLinkInput::StatusConsumed),
            MagicLinkStatus::Expired => Some(MagicLinkInput::StatusExpired),
        }
    }
}

/// An issued link paired with its consumption machine. Hosts hold one per
/// outstanding link and feed it poll results.
pub struct MagicLinkFlow {
    pub link: PendingMagicLink,
    machine: MagicLinkMachine,
}

impl MagicLinkFlow {
    pub fn new(link: PendingMagicLink) -> Self {
        Self {
            link,
            machine: MagicLinkMachine::new(),
        }
    }

    pub fn state(&self) -> &MagicLinkState {
        self.machine.state()
    }

    /// Apply a polled status. Returns true when the flow transitioned.
    pub fn apply_status(&mut self, status: MagicLinkStatus) -> bool {
        let Some(input) = status.as_input() else {
            return false;
        };
        self.machine.consume(&input).is_ok()
    }
}
