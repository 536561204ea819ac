//! Switch Status Graph
//!
//! States are explicit and enumerable; the allowed edges live in one table
//! ([`SwitchStatus::allowed_targets`]) and nowhere else.
//!
//! ```text
//! ACTIVE ──► OVERDUE ──► GRACE_PERIOD ──► PENDING_VERIFICATION ──► VERIFIED ──► EXECUTED
//!                              └──────────────────────────────────────┘
//! any live state ──► ACTIVE | CANCELED | PAUSED      CANCELED ──► ACTIVE
//! PAUSED ──► ACTIVE | CANCELED                       EXECUTED is terminal
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchStatus {
    /// Owner is checking in on schedule.
    Active,
    /// Check-in deadline missed.
    Overdue,
    /// Buffer window after a missed check-in.
    GracePeriod,
    /// Waiting on the verifier quorum.
    PendingVerification,
    /// Release confirmed; final delay running.
    Verified,
    /// Messages released. Terminal.
    Executed,
    /// Stopped by the owner.
    Canceled,
    /// Stopped pending human intervention.
    Paused,
}

use SwitchStatus::*;

impl SwitchStatus {
    /// Every status, in graph order.
    pub const ALL: [SwitchStatus; 8] = [
        Active,
        Overdue,
        GracePeriod,
        PendingVerification,
        Verified,
        Executed,
        Canceled,
        Paused,
    ];

    /// Statuses from which an owner check-in is accepted.
    pub const CHECK_IN_STATES: [SwitchStatus; 5] =
        [Active, Overdue, GracePeriod, PendingVerification, Verified];

    /// Adjacency table of the transition graph.
    pub const fn allowed_targets(self) -> &'static [SwitchStatus] {
        match self {
            Active => &[Overdue, Canceled, Paused],
            Overdue => &[GracePeriod, Active, Canceled, Paused],
            GracePeriod => &[PendingVerification, Verified, Active, Canceled, Paused],
            PendingVerification => &[Verified, Active, Canceled, Paused],
            Verified => &[Executed, Active, Canceled, Paused],
            Executed => &[],
            Canceled => &[Active],
            Paused => &[Active, Canceled],
        }
    }

    /// Whether `self → target` is an edge of the graph.
    pub fn can_transition_to(self, target: SwitchStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Whether the status has no outgoing edges.
    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Whether an owner check-in is valid from this status.
    pub fn accepts_check_in(self) -> bool {
        Self::CHECK_IN_STATES.contains(&self)
    }

    /// Whether the owner may edit the switch configuration.
    pub fn is_editable(self) -> bool {
        matches!(self, Active | Overdue | Paused | Canceled)
    }

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Active => "ACTIVE",
            Overdue => "OVERDUE",
            GracePeriod => "GRACE_PERIOD",
            PendingVerification => "PENDING_VERIFICATION",
            Verified => "VERIFIED",
            Executed => "EXECUTED",
            Canceled => "CANCELED",
            Paused => "PAUSED",
        }
    }
}

impl fmt::Display for SwitchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwitchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown switch status: {}", s))
    }
}
