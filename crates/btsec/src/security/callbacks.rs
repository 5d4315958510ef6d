//! Application callbacks
//!
//! The application installs one [`SecurityCallbacks`] object. Decisions it
//! can make immediately are returned from the call; otherwise it returns
//! [`Decision::Pending`] and answers later through
//! [`SecurityManager::respond`](super::SecurityManager::respond).

use super::keys::{LinkKey, StoredKey};
use super::types::*;
use crate::error::{SecurityError, SecurityResult};
use crate::gap::PeerIdentity;
use log::{debug, warn};
use std::sync::{Arc, RwLock};

/// Outcome of a pairing as reported to `auth_complete`
pub type PairingResult = Result<SecurityLevel, SecurityError>;

/// Positive answer to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Accept a numeric comparison, Just Works confirmation or security request
    Confirm,
    Passkey(u32),
    Pin(PinCode),
    /// OOB data received from the peer
    Oob(OobData),
    /// LE legacy OOB temporary key
    TemporaryKey([u8; 16]),
    /// Grant access to a service, optionally trusting the peer for it
    Authorize { remember: bool },
}

/// What a callback decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Reply(Response),
    Reject,
    /// The answer will come later through `respond` or `reject`
    Pending,
}

/// Simple Pairing prompts and notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimplePairingRequest {
    Confirm {
        peer: PeerIdentity,
        numeric_value: u32,
        /// No value to compare; the user only accepts the pairing
        just_works: bool,
        local_io: IoCapability,
        remote_io: IoCapability,
    },
    PasskeyNotify { peer: PeerIdentity, passkey: u32 },
    PasskeyRequest { peer: PeerIdentity },
    RemoteOobRequest { peer: PeerIdentity },
    LocalOobReady { data: OobData },
}

impl SimplePairingRequest {
    pub fn peer(&self) -> Option<PeerIdentity> {
        match self {
            SimplePairingRequest::Confirm { peer, .. }
            | SimplePairingRequest::PasskeyNotify { peer, .. }
            | SimplePairingRequest::PasskeyRequest { peer }
            | SimplePairingRequest::RemoteOobRequest { peer } => Some(*peer),
            SimplePairingRequest::LocalOobReady { .. } => None,
        }
    }
}

/// LE prompts and notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeRequest {
    SecurityRequest { peer: PeerIdentity, auth_req: AuthRequirement },
    PasskeyNotify { peer: PeerIdentity, passkey: u32 },
    PasskeyRequest { peer: PeerIdentity },
    NumericCompare { peer: PeerIdentity, value: u32 },
    OobRequest { peer: PeerIdentity },
    ScOobRequest { peer: PeerIdentity },
    Keypress {
        peer: PeerIdentity,
        notification: KeypressNotificationType,
    },
    ScLocalOobReady { data: OobData },
}

impl LeRequest {
    pub fn peer(&self) -> Option<PeerIdentity> {
        match self {
            LeRequest::SecurityRequest { peer, .. }
            | LeRequest::PasskeyNotify { peer, .. }
            | LeRequest::PasskeyRequest { peer }
            | LeRequest::NumericCompare { peer, .. }
            | LeRequest::OobRequest { peer }
            | LeRequest::ScOobRequest { peer }
            | LeRequest::Keypress { peer, .. } => Some(*peer),
            LeRequest::ScLocalOobReady { .. } => None,
        }
    }
}

/// Capability set supplied by the application
pub trait SecurityCallbacks: Send + Sync {
    /// May `peer` use `service_id`?
    fn authorize(&self, peer: &PeerIdentity, service_id: u16) -> Decision;

    /// Legacy pairing needs a PIN
    fn pin_request(&self, peer: &PeerIdentity, min_16_digit: bool) -> Decision;

    /// A new link key was stored
    fn link_key(&self, peer: &PeerIdentity, key: &LinkKey);

    /// Pairing with `peer` finished
    fn auth_complete(&self, peer: &PeerIdentity, transport: Transport, result: &PairingResult);

    /// A `cancel_bond` was carried out
    fn bond_cancel_complete(&self, peer: &PeerIdentity, result: &SecurityResult<()>);

    fn simple_pairing(&self, request: &SimplePairingRequest) -> Decision;

    fn le_event(&self, request: &LeRequest) -> Decision;

    /// An LE key was stored
    fn le_key_update(&self, peer: &PeerIdentity, key: &StoredKey);
}

/// Holds the single installed [`SecurityCallbacks`] object.
///
/// Each call clones the `Arc` out of the lock first, so callbacks run with no
/// lock held and may call back into the manager.
#[derive(Default)]
pub struct CallbackDispatcher {
    callbacks: RwLock<Option<Arc<dyn SecurityCallbacks>>>,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, callbacks: Arc<dyn SecurityCallbacks>) -> SecurityResult<()> {
        let mut slot = self
            .callbacks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(SecurityError::AlreadyRegistered);
        }
        *slot = Some(callbacks);
        Ok(())
    }

    /// Remove the registrant and hand it back
    pub fn uninstall(&self) -> SecurityResult<Arc<dyn SecurityCallbacks>> {
        let mut slot = self
            .callbacks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.take().ok_or(SecurityError::NotRegistered)
    }

    pub fn is_installed(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Arc<dyn SecurityCallbacks>> {
        self.callbacks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run a decision callback; with nothing installed the answer is a rejection
    fn decide(&self, call: impl FnOnce(&dyn SecurityCallbacks) -> Decision) -> Decision {
        match self.current() {
            Some(callbacks) => call(callbacks.as_ref()),
            None => {
                debug!("No callbacks installed, rejecting");
                Decision::Reject
            }
        }
    }

    fn notify(&self, what: &str, call: impl FnOnce(&dyn SecurityCallbacks)) {
        match self.current() {
            Some(callbacks) => call(callbacks.as_ref()),
            None => warn!("No callbacks installed, dropping {} notification", what),
        }
    }

    pub fn authorize(&self, peer: &PeerIdentity, service_id: u16) -> Decision {
        self.decide(|cb| cb.authorize(peer, service_id))
    }

    pub fn pin_request(&self, peer: &PeerIdentity, min_16_digit: bool) -> Decision {
        self.decide(|cb| cb.pin_request(peer, min_16_digit))
    }

    pub fn simple_pairing(&self, request: &SimplePairingRequest) -> Decision {
        self.decide(|cb| cb.simple_pairing(request))
    }

    pub fn le_event(&self, request: &LeRequest) -> Decision {
        self.decide(|cb| cb.le_event(request))
    }

    pub fn link_key(&self, peer: &PeerIdentity, key: &LinkKey) {
        self.notify("link key", |cb| cb.link_key(peer, key));
    }

    pub fn auth_complete(&self, peer: &PeerIdentity, transport: Transport, result: &PairingResult) {
        self.notify("auth complete", |cb| cb.auth_complete(peer, transport, result));
    }

    pub fn bond_cancel_complete(&self, peer: &PeerIdentity, result: &SecurityResult<()>) {
        self.notify("bond cancel", |cb| cb.bond_cancel_complete(peer, result));
    }

    pub fn le_key_update(&self, peer: &PeerIdentity, key: &StoredKey) {
        self.notify("LE key", |cb| cb.le_key_update(peer, key));
    }
}
