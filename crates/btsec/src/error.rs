//! Error types for the btsec library
//!
//! This module defines the error taxonomy shared by the pairing state
//! machines, the key store and the session-control surface.

use crate::gap::PeerIdentity;
use std::fmt;
use thiserror::Error;

/// Why a pairing session ended in the `Aborted` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A bond-cancel request was honoured
    Cancelled,
    /// The ACL link went away while pairing was in flight
    Disconnected,
    /// The callback registration was removed
    Unregistered,
    /// The application answered a prompt with a value of the wrong kind
    InvalidResponse,
    /// The peer delivered a key that was not advertised for distribution
    UnexpectedKey,
    /// Pairing completed without every advertised key being delivered
    KeyDistributionIncomplete,
    /// The transport refused to carry a command for this session
    TransportFailure,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => write!(f, "cancelled"),
            AbortReason::Disconnected => write!(f, "disconnected"),
            AbortReason::Unregistered => write!(f, "callbacks unregistered"),
            AbortReason::InvalidResponse => write!(f, "invalid application response"),
            AbortReason::UnexpectedKey => write!(f, "unexpected key distributed"),
            AbortReason::KeyDistributionIncomplete => write!(f, "key distribution incomplete"),
            AbortReason::TransportFailure => write!(f, "transport failure"),
        }
    }
}

/// Security manager errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("Invalid service id: {0}")]
    InvalidServiceId(u16),

    #[error("A pairing session is already active for {0}")]
    SessionAlreadyActive(PeerIdentity),

    #[error("IO capabilities cannot satisfy MITM protection")]
    InsufficientIoCapability,

    #[error("Secure Connections required but not offered by peer")]
    SecureConnectionsRequired,

    #[error("User rejected pairing")]
    UserRejected,

    #[error("Protocol timeout")]
    ProtocolTimeout,

    #[error("Remote authentication failure (status 0x{0:02X})")]
    RemoteAuthFailure(u8),

    #[error("Pairing aborted: {0}")]
    Aborted(AbortReason),

    #[error("No active pairing session for {0}")]
    NoActiveSession(PeerIdentity),

    #[error("Security callbacks already registered")]
    AlreadyRegistered,

    #[error("Security callbacks not registered")]
    NotRegistered,

    #[error("Passkey out of range: {0}")]
    InvalidPasskey(u32),

    #[error("Invalid bond record: {0}")]
    InvalidRecord(String),

    #[error("Key storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for security manager operations
pub type SecurityResult<T> = Result<T, SecurityError>;
