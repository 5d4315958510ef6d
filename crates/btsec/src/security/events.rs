//! Events consumed from the transport layer
//!
//! Each variant carries only the fields meaningful for that event.

use super::keys::{LinkKey, StoredKey};
use super::types::*;
use crate::gap::PeerIdentity;

/// Classic Simple Pairing (and legacy PIN) events reported by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassicEvent {
    /// Controller asks for our IO capability
    IoCapRequest { peer: PeerIdentity },
    /// Peer reported its IO capability
    IoCapResponse {
        peer: PeerIdentity,
        io_capability: IoCapability,
        oob_data_present: bool,
        auth_req: AuthRequirement,
    },
    /// Both sides display `numeric_value`; the user must confirm
    UserConfirmationRequest { peer: PeerIdentity, numeric_value: u32 },
    /// Display `passkey` so the user can type it on the peer
    UserPasskeyNotify { peer: PeerIdentity, passkey: u32 },
    /// The user must type the passkey shown on the peer
    UserPasskeyRequest { peer: PeerIdentity },
    /// Result of reading our own OOB data; not tied to a peer
    LocalOobDataReady { data: OobData },
    /// Controller needs the OOB data received from the peer
    RemoteOobDataRequest { peer: PeerIdentity },
    /// Legacy pairing needs a PIN code
    PinCodeRequest { peer: PeerIdentity, min_16_digit: bool },
    /// New link key generated
    LinkKeyNotification { peer: PeerIdentity, key: LinkKey },
    /// Simple Pairing finished with an HCI status
    SimplePairingComplete { peer: PeerIdentity, status: u8 },
    /// Authentication finished with an HCI status
    AuthenticationComplete { peer: PeerIdentity, status: u8 },
}

impl ClassicEvent {
    /// Peer the event concerns, `None` for adapter-wide events
    pub fn peer(&self) -> Option<PeerIdentity> {
        match self {
            ClassicEvent::IoCapRequest { peer }
            | ClassicEvent::IoCapResponse { peer, .. }
            | ClassicEvent::UserConfirmationRequest { peer, .. }
            | ClassicEvent::UserPasskeyNotify { peer, .. }
            | ClassicEvent::UserPasskeyRequest { peer }
            | ClassicEvent::RemoteOobDataRequest { peer }
            | ClassicEvent::PinCodeRequest { peer, .. }
            | ClassicEvent::LinkKeyNotification { peer, .. }
            | ClassicEvent::SimplePairingComplete { peer, .. }
            | ClassicEvent::AuthenticationComplete { peer, .. } => Some(*peer),
            ClassicEvent::LocalOobDataReady { .. } => None,
        }
    }

    /// Whether this event may open a session for a peer that has none
    pub(crate) fn opens_session(&self) -> bool {
        matches!(
            self,
            ClassicEvent::IoCapRequest { .. }
                | ClassicEvent::IoCapResponse { .. }
                | ClassicEvent::PinCodeRequest { .. }
        )
    }
}

/// Final status of an LE pairing as reported by SMP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LePairingStatus {
    Success,
    /// Pairing Failed with an SMP reason code
    Failed(u8),
    /// SMP transaction timer expired
    Timeout,
}

/// LE Security Manager events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeEvent {
    /// Peripheral asks us to start pairing
    SecurityRequest { peer: PeerIdentity, auth_req: AuthRequirement },
    /// SMP asks for our pairing features; a responder already knows the peer's
    IoCapRequest {
        peer: PeerIdentity,
        peer_features: Option<LePairingFeatures>,
    },
    /// Peer's pairing response reached the initiator
    PeerFeatures {
        peer: PeerIdentity,
        features: LePairingFeatures,
    },
    PasskeyNotify { peer: PeerIdentity, passkey: u32 },
    PasskeyRequest { peer: PeerIdentity },
    /// Legacy OOB temporary key needed
    OobRequest { peer: PeerIdentity },
    NumericCompareRequest { peer: PeerIdentity, value: u32 },
    KeypressNotify {
        peer: PeerIdentity,
        notification: KeypressNotificationType,
    },
    /// Secure Connections OOB data for the peer needed
    ScOobRequest { peer: PeerIdentity },
    /// Our Secure Connections OOB data was generated; not tied to a peer
    ScLocalOobReady { data: OobData },
    /// One distributed key arrived
    KeyDistributionUpdate { peer: PeerIdentity, key: StoredKey },
    Complete {
        peer: PeerIdentity,
        status: LePairingStatus,
    },
}

impl LeEvent {
    pub fn peer(&self) -> Option<PeerIdentity> {
        match self {
            LeEvent::SecurityRequest { peer, .. }
            | LeEvent::IoCapRequest { peer, .. }
            | LeEvent::PeerFeatures { peer, .. }
            | LeEvent::PasskeyNotify { peer, .. }
            | LeEvent::PasskeyRequest { peer }
            | LeEvent::OobRequest { peer }
            | LeEvent::NumericCompareRequest { peer, .. }
            | LeEvent::KeypressNotify { peer, .. }
            | LeEvent::ScOobRequest { peer }
            | LeEvent::KeyDistributionUpdate { peer, .. }
            | LeEvent::Complete { peer, .. } => Some(*peer),
            LeEvent::ScLocalOobReady { .. } => None,
        }
    }

    pub(crate) fn opens_session(&self) -> bool {
        matches!(
            self,
            LeEvent::SecurityRequest { .. } | LeEvent::IoCapRequest { .. }
        )
    }
}
