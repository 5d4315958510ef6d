//! Commands the security manager hands to the HCI/SMP transport

use super::types::*;
use crate::error::SecurityResult;
use crate::gap::PeerIdentity;

/// One outbound security command for a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityCommand {
    /// Start classic authentication on the ACL link
    AuthenticationRequested,
    IoCapabilityReply {
        io_capability: IoCapability,
        oob_data_present: bool,
        /// Classic encoding, see [`AuthRequirement::to_classic`]
        auth_req: u8,
    },
    UserConfirmationReply { accept: bool },
    /// `None` is the negative reply
    UserPasskeyReply { passkey: Option<u32> },
    RemoteOobDataReply { data: Option<OobData> },
    PinCodeReply { pin: Option<PinCode> },
    /// Start SMP pairing as initiator
    LePair,
    LeSecurityGrant { granted: bool },
    LeIoCapabilityReply { features: LePairingFeatures },
    LePasskeyReply { passkey: Option<u32> },
    LeConfirmReply { accept: bool },
    LeOobReply { tk: Option<[u8; 16]> },
    LeScOobReply { data: Option<OobData> },
    LePairingFailed { reason: u8 },
    /// Abandon whatever pairing is in progress on `transport`
    CancelPairing { transport: Transport },
}

/// Outbound half of the HCI/SMP transport
pub trait SecurityTransport: Send + Sync {
    fn send(&self, peer: &PeerIdentity, command: SecurityCommand) -> SecurityResult<()>;
}
