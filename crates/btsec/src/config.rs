//! Security manager configuration

use crate::security::constants::{PAIRING_TIMEOUT_GENERAL, SMP_MAX_ENCRYPTION_KEY_SIZE};
use crate::security::types::*;
use std::time::Duration;

/// Local pairing parameters
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// IO capability advertised to peers
    pub io_capability: IoCapability,
    /// Requirements used for pairings started by a peer
    pub auth_requirement: AuthRequirement,
    /// Whether OOB data is available for pairings started by a peer
    pub oob_data_present: bool,
    /// Maximum LE encryption key size
    pub max_key_size: u8,
    /// LE keys the initiator distributes
    pub init_keys: KeyDistribution,
    /// LE keys the responder distributes
    pub resp_keys: KeyDistribution,
    /// Idle time after which a session is aborted
    pub pairing_timeout: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            io_capability: IoCapability::DisplayYesNo,
            auth_requirement: AuthRequirement::BONDING,
            oob_data_present: false,
            max_key_size: SMP_MAX_ENCRYPTION_KEY_SIZE,
            init_keys: KeyDistribution::ENC | KeyDistribution::ID | KeyDistribution::SIGN,
            resp_keys: KeyDistribution::ENC | KeyDistribution::ID | KeyDistribution::SIGN,
            pairing_timeout: Duration::from_millis(PAIRING_TIMEOUT_GENERAL),
        }
    }
}

impl SecurityConfig {
    /// Requirement applied when a peer starts pairing over `transport`
    pub fn requirement(&self, transport: Transport) -> PairingRequirement {
        PairingRequirement {
            transport,
            auth: self.auth_requirement,
            oob_data_present: self.oob_data_present,
        }
    }

    /// Pairing features we advertise over SMP. Secure Connections support is
    /// always advertised; the flag in `requirement` only makes it mandatory.
    pub fn le_features(&self, requirement: &PairingRequirement) -> LePairingFeatures {
        LePairingFeatures {
            io_capability: self.io_capability,
            oob_data_present: requirement.oob_data_present,
            auth_req: requirement.auth | AuthRequirement::SECURE_CONNECTIONS,
            max_key_size: self.max_key_size,
            init_keys: self.init_keys,
            resp_keys: self.resp_keys,
        }
    }
}
