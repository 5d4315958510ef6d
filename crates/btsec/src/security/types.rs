//! Type definitions shared by the classic and LE pairing state machines
use super::constants::*;
use crate::error::{SecurityError, SecurityResult};
use bitflags::bitflags;
use std::fmt;

/// IO Capability types for pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoCapability {
    /// Display only capability
    DisplayOnly,
    /// Display with yes/no capability
    DisplayYesNo,
    /// Keyboard only
    KeyboardOnly,
    /// No input, no output
    NoInputNoOutput,
    /// Both keyboard and display
    KeyboardDisplay,
    /// Capability not reported by the peer
    Unknown,
}

impl IoCapability {
    /// The five capabilities a device can actually advertise
    pub const ALL: [IoCapability; 5] = [
        IoCapability::DisplayOnly,
        IoCapability::DisplayYesNo,
        IoCapability::KeyboardOnly,
        IoCapability::NoInputNoOutput,
        IoCapability::KeyboardDisplay,
    ];

    /// Convert to u8 value for protocol
    pub fn to_u8(&self) -> u8 {
        match self {
            IoCapability::DisplayOnly => IO_CAPABILITY_DISPLAY_ONLY,
            IoCapability::DisplayYesNo => IO_CAPABILITY_DISPLAY_YES_NO,
            IoCapability::KeyboardOnly => IO_CAPABILITY_KEYBOARD_ONLY,
            IoCapability::NoInputNoOutput => IO_CAPABILITY_NO_INPUT_NO_OUTPUT,
            IoCapability::KeyboardDisplay => IO_CAPABILITY_KEYBOARD_DISPLAY,
            IoCapability::Unknown => IO_CAPABILITY_UNKNOWN,
        }
    }

    /// Convert from u8 value from protocol; unassigned values map to `Unknown`
    pub fn from_u8(value: u8) -> Self {
        match value {
            IO_CAPABILITY_DISPLAY_ONLY => IoCapability::DisplayOnly,
            IO_CAPABILITY_DISPLAY_YES_NO => IoCapability::DisplayYesNo,
            IO_CAPABILITY_KEYBOARD_ONLY => IoCapability::KeyboardOnly,
            IO_CAPABILITY_NO_INPUT_NO_OUTPUT => IoCapability::NoInputNoOutput,
            IO_CAPABILITY_KEYBOARD_DISPLAY => IoCapability::KeyboardDisplay,
            _ => IoCapability::Unknown,
        }
    }

    /// Whether the device can show a six digit value
    pub fn has_display(&self) -> bool {
        matches!(
            self,
            IoCapability::DisplayOnly | IoCapability::DisplayYesNo | IoCapability::KeyboardDisplay
        )
    }

    /// Whether the device can enter a six digit value
    pub fn has_keyboard(&self) -> bool {
        matches!(self, IoCapability::KeyboardOnly | IoCapability::KeyboardDisplay)
    }
}

impl fmt::Display for IoCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoCapability::DisplayOnly => write!(f, "Display Only"),
            IoCapability::DisplayYesNo => write!(f, "Display Yes/No"),
            IoCapability::KeyboardOnly => write!(f, "Keyboard Only"),
            IoCapability::NoInputNoOutput => write!(f, "No Input No Output"),
            IoCapability::KeyboardDisplay => write!(f, "Keyboard Display"),
            IoCapability::Unknown => write!(f, "Unknown"),
        }
    }
}

bitflags! {
    /// Authentication requirements, stored in the LE `auth_req` layout
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AuthRequirement: u8 {
        const BONDING = SMP_AUTH_REQ_BONDING;
        const MITM = SMP_AUTH_REQ_MITM;
        /// Set locally: refuse pairing without P-256. Set by a peer: P-256 supported.
        const SECURE_CONNECTIONS = SMP_AUTH_REQ_SC;
        const KEYPRESS = SMP_AUTH_REQ_KEYPRESS;
        const H7 = SMP_AUTH_REQ_H7;
    }
}

impl AuthRequirement {
    pub fn mitm(&self) -> bool {
        self.contains(AuthRequirement::MITM)
    }

    pub fn bonding(&self) -> bool {
        self.contains(AuthRequirement::BONDING)
    }

    pub fn secure_connections(&self) -> bool {
        self.contains(AuthRequirement::SECURE_CONNECTIONS)
    }

    /// Decode an LE `auth_req` octet, dropping reserved bits
    pub fn from_le(value: u8) -> Self {
        Self::from_bits_truncate(value)
    }

    pub fn to_le(&self) -> u8 {
        self.bits()
    }

    /// Decode the classic HCI authentication requirement (0x00..=0x05)
    pub fn from_classic(value: u8) -> Self {
        let mut auth = AuthRequirement::empty();
        if value & CLASSIC_AUTH_MITM_BIT != 0 {
            auth |= AuthRequirement::MITM;
        }
        if value & CLASSIC_AUTH_BONDING_MASK != 0 {
            auth |= AuthRequirement::BONDING;
        }
        auth
    }

    /// Encode as the classic HCI authentication requirement
    pub fn to_classic(&self, dedicated: bool) -> u8 {
        let mut value = 0;
        if self.mitm() {
            value |= CLASSIC_AUTH_MITM_BIT;
        }
        if self.bonding() {
            value |= if dedicated {
                CLASSIC_AUTH_DEDICATED_BONDING
            } else {
                CLASSIC_AUTH_GENERAL_BONDING
            };
        }
        value
    }
}

bitflags! {
    /// Key distribution as advertised in an SMP pairing request/response
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyDistribution: u8 {
        /// Encryption key (LTK, EDIV, RAND)
        const ENC = SMP_KEY_DIST_ENC_KEY;
        /// Identity key (IRK, identity address)
        const ID = SMP_KEY_DIST_ID_KEY;
        /// Signing key (CSRK)
        const SIGN = SMP_KEY_DIST_SIGN_KEY;
        /// Cross-transport link key derivation
        const LINK = SMP_KEY_DIST_LINK_KEY;
    }
}

bitflags! {
    /// Per-peer LE key kinds: `P*` received from the peer, `L*` our own
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LeKeyMask: u8 {
        const PENC = LE_KEY_PENC;
        const PID = LE_KEY_PID;
        const PCSRK = LE_KEY_PCSRK;
        const PLK = LE_KEY_PLK;
        const LENC = LE_KEY_LENC;
        const LID = LE_KEY_LID;
        const LCSRK = LE_KEY_LCSRK;
        const LLK = LE_KEY_LLK;
    }
}

impl LeKeyMask {
    /// Keys expected from a distribution: what the peer sends and what we send.
    ///
    /// Identity and link-key derivation are tracked elsewhere, so only the
    /// five per-bond keys are produced.
    pub fn expected(peer_sends: KeyDistribution, local_sends: KeyDistribution) -> Self {
        let mut mask = LeKeyMask::empty();
        if peer_sends.contains(KeyDistribution::ENC) {
            mask |= LeKeyMask::PENC;
        }
        if peer_sends.contains(KeyDistribution::ID) {
            mask |= LeKeyMask::PID;
        }
        if peer_sends.contains(KeyDistribution::SIGN) {
            mask |= LeKeyMask::PCSRK;
        }
        if local_sends.contains(KeyDistribution::ENC) {
            mask |= LeKeyMask::LENC;
        }
        if local_sends.contains(KeyDistribution::SIGN) {
            mask |= LeKeyMask::LCSRK;
        }
        mask
    }
}

/// Physical transport a session runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// BR/EDR Simple Pairing
    Classic,
    /// LE Security Manager Protocol
    Le,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Classic => write!(f, "BR/EDR"),
            Transport::Le => write!(f, "LE"),
        }
    }
}

/// Which side started the pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingDirection {
    /// Local device initiated (typically Central device)
    Initiator,
    /// Remote device initiated (typically Peripheral device)
    Responder,
}

/// Strength of a bond
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SecurityLevel {
    /// No bond / no security
    #[default]
    None = 0,
    /// Encrypted, but the pairing had no MITM protection
    Unauthenticated = 1,
    /// Encrypted with MITM protection
    Authenticated = 2,
}

impl SecurityLevel {
    /// LE bond level: authenticated only when MITM protection was achieved
    /// and Secure Connections was used.
    pub fn from_le_pairing(mitm_achieved: bool, secure_connections: bool) -> Self {
        if mitm_achieved && secure_connections {
            SecurityLevel::Authenticated
        } else {
            SecurityLevel::Unauthenticated
        }
    }

    pub fn is_authenticated(&self) -> bool {
        *self >= SecurityLevel::Authenticated
    }

    pub fn to_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SecurityLevel::None),
            1 => Some(SecurityLevel::Unauthenticated),
            2 => Some(SecurityLevel::Authenticated),
            _ => None,
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityLevel::None => write!(f, "None"),
            SecurityLevel::Unauthenticated => write!(f, "Unauthenticated"),
            SecurityLevel::Authenticated => write!(f, "Authenticated"),
        }
    }
}

/// User-interaction procedure used by a pairing session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationModel {
    /// Just Works method - no user interaction
    JustWorks,
    /// Numeric Comparison - user confirms matching numbers
    NumericComparison,
    /// Passkey Entry - one device enters a passkey
    PasskeyEntry,
    /// Out of Band data
    OutOfBand,
}

impl AssociationModel {
    /// Whether the model protects against a man in the middle
    pub fn provides_mitm(&self) -> bool {
        !matches!(self, AssociationModel::JustWorks)
    }
}

impl fmt::Display for AssociationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationModel::JustWorks => write!(f, "Just Works"),
            AssociationModel::NumericComparison => write!(f, "Numeric Comparison"),
            AssociationModel::PasskeyEntry => write!(f, "Passkey Entry"),
            AssociationModel::OutOfBand => write!(f, "Out of Band"),
        }
    }
}

bitflags! {
    /// Security state of a peer as reported to upper layers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SecurityFlags: u8 {
        const AUTHORIZED = 0x01;
        const AUTHENTICATED = 0x02;
        const ENCRYPTED = 0x04;
        const KEY_KNOWN = 0x10;
        const KEY_AUTHENTICATED = 0x20;
    }
}

bitflags! {
    /// What a service demands of a link before a peer may use it
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ServiceRequirement: u8 {
        const AUTHORIZE = 0x01;
        const AUTHENTICATE = 0x02;
        const ENCRYPT = 0x04;
        const MITM = 0x08;
        const SECURE_CONNECTIONS = 0x10;
    }
}

/// Keypress notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypressNotificationType {
    /// Entry started
    EntryStarted,
    /// Digit entered
    DigitEntered,
    /// Digit erased
    DigitErased,
    /// Cleared
    Cleared,
    /// Entry completed
    EntryCompleted,
}

impl KeypressNotificationType {
    /// Convert to u8 value for protocol
    pub fn to_u8(&self) -> u8 {
        match self {
            KeypressNotificationType::EntryStarted => SMP_KEYPRESS_ENTRY_STARTED,
            KeypressNotificationType::DigitEntered => SMP_KEYPRESS_DIGIT_ENTERED,
            KeypressNotificationType::DigitErased => SMP_KEYPRESS_DIGIT_ERASED,
            KeypressNotificationType::Cleared => SMP_KEYPRESS_CLEARED,
            KeypressNotificationType::EntryCompleted => SMP_KEYPRESS_ENTRY_COMPLETED,
        }
    }

    /// Convert from u8 value from protocol
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SMP_KEYPRESS_ENTRY_STARTED => Some(KeypressNotificationType::EntryStarted),
            SMP_KEYPRESS_DIGIT_ENTERED => Some(KeypressNotificationType::DigitEntered),
            SMP_KEYPRESS_DIGIT_ERASED => Some(KeypressNotificationType::DigitErased),
            SMP_KEYPRESS_CLEARED => Some(KeypressNotificationType::Cleared),
            SMP_KEYPRESS_ENTRY_COMPLETED => Some(KeypressNotificationType::EntryCompleted),
            _ => None,
        }
    }
}

/// Out of Band pairing data (hash C and randomizer R)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OobData {
    /// Confirm value (C)
    pub c: [u8; 16],
    /// Random value (R)
    pub r: [u8; 16],
}

/// Legacy pairing PIN code, 1 to 16 octets
#[derive(Clone, PartialEq, Eq)]
pub struct PinCode(Vec<u8>);

impl PinCode {
    pub fn new(pin: &[u8]) -> SecurityResult<Self> {
        if pin.len() < PIN_CODE_MIN_LEN || pin.len() > PIN_CODE_MAX_LEN {
            return Err(SecurityError::InvalidRecord(format!(
                "PIN length {} outside {}..={}",
                pin.len(),
                PIN_CODE_MIN_LEN,
                PIN_CODE_MAX_LEN
            )));
        }
        Ok(Self(pin.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinCode(<{} digits>)", self.0.len())
    }
}

/// Validate a passkey or numeric comparison value
pub fn check_passkey(value: u32) -> SecurityResult<u32> {
    if value > MAX_PASSKEY {
        Err(SecurityError::InvalidPasskey(value))
    } else {
        Ok(value)
    }
}

/// What the caller wants out of a pairing it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingRequirement {
    pub transport: Transport,
    pub auth: AuthRequirement,
    /// Local OOB data is available for this peer
    pub oob_data_present: bool,
}

impl PairingRequirement {
    pub fn classic(auth: AuthRequirement) -> Self {
        Self {
            transport: Transport::Classic,
            auth,
            oob_data_present: false,
        }
    }

    pub fn le(auth: AuthRequirement) -> Self {
        Self {
            transport: Transport::Le,
            auth,
            oob_data_present: false,
        }
    }

    pub fn with_oob(mut self) -> Self {
        self.oob_data_present = true;
        self
    }
}

/// Pairing features exchanged by SMP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LePairingFeatures {
    /// IO Capability
    pub io_capability: IoCapability,
    /// OOB data flag
    pub oob_data_present: bool,
    /// Authentication requirements
    pub auth_req: AuthRequirement,
    /// Maximum encryption key size (7-16)
    pub max_key_size: u8,
    /// Keys the initiator will distribute
    pub init_keys: KeyDistribution,
    /// Keys the responder will distribute
    pub resp_keys: KeyDistribution,
}

impl Default for LePairingFeatures {
    fn default() -> Self {
        Self {
            io_capability: IoCapability::NoInputNoOutput,
            oob_data_present: false,
            auth_req: AuthRequirement::BONDING,
            max_key_size: SMP_MAX_ENCRYPTION_KEY_SIZE,
            init_keys: KeyDistribution::ENC | KeyDistribution::ID | KeyDistribution::SIGN,
            resp_keys: KeyDistribution::ENC | KeyDistribution::ID | KeyDistribution::SIGN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_auth_req_encoding() {
        assert_eq!(AuthRequirement::empty().to_classic(false), 0x00);
        assert_eq!(AuthRequirement::MITM.to_classic(false), 0x01);
        assert_eq!(AuthRequirement::BONDING.to_classic(true), 0x02);
        assert_eq!((AuthRequirement::BONDING | AuthRequirement::MITM).to_classic(true), 0x03);
        assert_eq!(AuthRequirement::BONDING.to_classic(false), 0x04);
        assert_eq!((AuthRequirement::BONDING | AuthRequirement::MITM).to_classic(false), 0x05);

        for raw in 0u8..=5 {
            let auth = AuthRequirement::from_classic(raw);
            assert_eq!(auth.mitm(), raw & 1 != 0);
            assert_eq!(auth.bonding(), raw >= 2);
        }
    }

    #[test]
    fn test_le_auth_req_drops_reserved_bits() {
        let auth = AuthRequirement::from_le(0xFD);
        assert!(auth.bonding());
        assert!(auth.mitm());
        assert!(auth.secure_connections());
        assert_eq!(auth.to_le(), 0x3D);
    }

    #[test]
    fn test_io_capability_round_trip() {
        for cap in IoCapability::ALL {
            assert_eq!(IoCapability::from_u8(cap.to_u8()), cap);
        }
        assert_eq!(IoCapability::from_u8(0x09), IoCapability::Unknown);
    }

    #[test]
    fn test_expected_key_mask() {
        let all = KeyDistribution::ENC | KeyDistribution::ID | KeyDistribution::SIGN;
        assert_eq!(
            LeKeyMask::expected(all, all),
            LeKeyMask::PENC | LeKeyMask::PID | LeKeyMask::PCSRK | LeKeyMask::LENC | LeKeyMask::LCSRK
        );
        assert_eq!(
            LeKeyMask::expected(KeyDistribution::ID, KeyDistribution::empty()),
            LeKeyMask::PID
        );
    }

    #[test]
    fn test_le_security_level() {
        assert_eq!(SecurityLevel::from_le_pairing(true, true), SecurityLevel::Authenticated);
        assert_eq!(SecurityLevel::from_le_pairing(true, false), SecurityLevel::Unauthenticated);
        assert_eq!(SecurityLevel::from_le_pairing(false, true), SecurityLevel::Unauthenticated);
        assert_eq!(SecurityLevel::from_le_pairing(false, false), SecurityLevel::Unauthenticated);
    }

    #[test]
    fn test_passkey_range() {
        assert_eq!(check_passkey(0), Ok(0));
        assert_eq!(check_passkey(999_999), Ok(999_999));
        assert_eq!(check_passkey(1_000_000), Err(SecurityError::InvalidPasskey(1_000_000)));
    }

    #[test]
    fn test_pin_code_length() {
        assert!(PinCode::new(b"").is_err());
        assert!(PinCode::new(b"0000").is_ok());
        assert!(PinCode::new(&[b'1'; 16]).is_ok());
        assert!(PinCode::new(&[b'1'; 17]).is_err());
    }
}
