//! Stream Subscriber Lifecycle
//!
//! Identity and lifecycle state of one live stream client.
//!
//! ```text
//! Connecting ──handshake ok──► Active ──disconnect / send failure / shutdown──► Closed
//!      │                                                                          ▲
//!      └──────────────────────handshake failed or timed out───────────────────────┘
//! ```
//!
//! `Closed` is terminal.

use std::fmt;

use uuid::Uuid;

/// Unique identifier for a stream subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberState {
    /// WebSocket handshake in progress; not yet registered.
    Connecting,
    /// Registered with the hub and eligible for broadcasts.
    Active,
    /// Terminal; removed from the registry and transport released.
    Closed,
}

impl SubscriberState {
    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Active | Self::Closed) | (Self::Active, Self::Closed)
        )
    }

    /// Apply a transition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the move is not allowed; the state
    /// is left unchanged.
    pub fn transition(&mut self, next: Self) -> Result<(), InvalidTransition> {
        if self.can_transition_to(next) {
            *self = next;
            Ok(())
        } else {
            Err(InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }

    /// Whether the subscriber can receive broadcasts.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid subscriber transition {from} -> {to}")]
pub struct InvalidTransition {
    /// State before the attempted move.
    pub from: SubscriberState,
    /// Requested state.
    pub to: SubscriberState,
}

/// Why a subscriber left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Client closed the connection.
    ClientClosed,
    /// Outbound queue full: the socket writer is stalled.
    Lagging,
    /// Socket write failed or exceeded the send timeout.
    SendFailed,
    /// Transport read error.
    TransportError,
    /// Process shutdown.
    Shutdown,
}

impl CloseReason {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::Lagging => "lagging",
            Self::SendFailed => "send_failed",
            Self::TransportError => "transport_error",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
