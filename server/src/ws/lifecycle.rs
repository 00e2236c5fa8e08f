//! Per-connection lifecycle: `Connecting -> Admitted -> Registered -> Closed`.
//!
//! A refused attempt goes straight from `Connecting` to `Closed`. There are no
//! retries and no way back from `Closed`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Admitted,
    Registered,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Admitted)
                | (Connecting, Closed)
                | (Admitted, Registered)
                | (Admitted, Closed)
                | (Registered, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Admitted => "admitted",
            Self::Registered => "registered",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    connection_id: String,
    state: ConnectionState,
}

impl Lifecycle {
    pub fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            state: ConnectionState::Connecting,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn admitted(&mut self) {
        self.advance(ConnectionState::Admitted);
    }

    pub fn registered(&mut self) {
        self.advance(ConnectionState::Registered);
    }

    pub fn closed(&mut self) {
        self.advance(ConnectionState::Closed);
    }

    fn advance(&mut self, next: ConnectionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                connection_id = %self.connection_id,
                from = %self.state,
                to = %next,
                "Ignoring invalid connection state transition"
            );
            return;
        }
        tracing::debug!(
            connection_id = %self.connection_id,
            from = %self.state,
            to = %next,
            "Connection state changed"
        );
        self.state = next;
    }
}
