//! Port state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an N-1 port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    /// Port accepts and transmits PDUs.
    #[default]
    Enabled,
    /// Port queues PDUs but the scheduler does not drain it.
    Disabled,
    /// Enabled, with a pending enable that cancels the next disable.
    DoNotDisable,
    /// Unbound; destroyed once the last handle is released.
    Deallocated,
}

impl PortState {
    /// Returns true if the scheduler may drain the port.
    pub const fn is_enabled(&self) -> bool {
        matches!(self, PortState::Enabled | PortState::DoNotDisable)
    }

    /// Returns true if the port is disabled.
    pub const fn is_disabled(&self) -> bool {
        matches!(self, PortState::Disabled)
    }

    /// Returns true if the port has been unbound.
    pub const fn is_deallocated(&self) -> bool {
        matches!(self, PortState::Deallocated)
    }

    /// State after an `enable` request.
    pub const fn on_enable(self) -> PortState {
        match self {
            PortState::Enabled => PortState::DoNotDisable,
            PortState::Deallocated => PortState::Deallocated,
            _ => PortState::Enabled,
        }
    }

    /// State after a `disable` request.
    pub const fn on_disable(self) -> PortState {
        match self {
            PortState::Enabled => PortState::Disabled,
            PortState::DoNotDisable => PortState::Enabled,
            other => other,
        }
    }

    /// State after a write reported "would block".
    pub const fn on_would_block(self) -> PortState {
        match self {
            PortState::DoNotDisable => PortState::Enabled,
            PortState::Deallocated => PortState::Deallocated,
            _ => PortState::Disabled,
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Enabled => "enabled",
            PortState::Disabled => "disabled",
            PortState::DoNotDisable => "do_not_disable",
            PortState::Deallocated => "deallocated",
        };
        write!(f, "{}", s)
    }
}
