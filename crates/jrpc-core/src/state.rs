//! Connection lifecycle state machine

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Inactive,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether `self -> next` is an allowed lifecycle step.
    ///
    /// `Inactive -> Closing` covers closing a connection that was never started.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Inactive, Active) | (Inactive, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }

    pub fn is_active(self) -> bool {
        self == ConnectionState::Active
    }

    pub fn is_closed(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Inactive => "inactive",
            ConnectionState::Active => "active",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}
