//! btsec - Bluetooth Security Manager
//!
//! This library implements the security manager of a Bluetooth host stack:
//! pairing over BR/EDR Secure Simple Pairing and LE SMP, key storage, and a
//! per-peer trusted service policy. The HCI/SMP transport and the
//! application are supplied by the caller through the
//! [`SecurityTransport`] and [`SecurityCallbacks`] traits.

pub mod config;
pub mod error;
pub mod gap;
pub mod security;
pub mod trust;

// Re-export common types for convenience
pub use config::SecurityConfig;
pub use error::{AbortReason, SecurityError, SecurityResult};
pub use gap::{AddressType, BdAddr, PeerIdentity};
pub use security::{
    AssociationModel, AuthRequirement, BondRecord, ClassicEvent, Decision, IoCapability, KeyStore,
    LeEvent, MemoryKeyStore, PairingDirection, PairingRequirement, Response, SecurityCallbacks,
    SecurityCommand, SecurityLevel, SecurityManager, SecurityTransport, Transport,
};
pub use trust::{TrustRegistry, TrustedServiceMask, MAX_SERVICES};
