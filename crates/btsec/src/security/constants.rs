//! Constants for classic Simple Pairing and the LE Security Manager

// IO Capability values (shared by HCI and SMP)
pub const IO_CAPABILITY_DISPLAY_ONLY: u8 = 0x00;
pub const IO_CAPABILITY_DISPLAY_YES_NO: u8 = 0x01;
pub const IO_CAPABILITY_KEYBOARD_ONLY: u8 = 0x02;
pub const IO_CAPABILITY_NO_INPUT_NO_OUTPUT: u8 = 0x03;
pub const IO_CAPABILITY_KEYBOARD_DISPLAY: u8 = 0x04;
pub const IO_CAPABILITY_UNKNOWN: u8 = 0xFF;

// Classic authentication requirement encoding
pub const CLASSIC_AUTH_MITM_BIT: u8 = 0x01;
pub const CLASSIC_AUTH_DEDICATED_BONDING: u8 = 0x02;
pub const CLASSIC_AUTH_GENERAL_BONDING: u8 = 0x04;
pub const CLASSIC_AUTH_BONDING_MASK: u8 = 0x06;

// LE authentication requirement bit masks
pub const SMP_AUTH_REQ_BONDING: u8 = 0x01;
pub const SMP_AUTH_REQ_MITM: u8 = 0x04;
pub const SMP_AUTH_REQ_SC: u8 = 0x08;
pub const SMP_AUTH_REQ_KEYPRESS: u8 = 0x10;
pub const SMP_AUTH_REQ_H7: u8 = 0x20;

// SMP key distribution bit masks
pub const SMP_KEY_DIST_ENC_KEY: u8 = 0x01;
pub const SMP_KEY_DIST_ID_KEY: u8 = 0x02;
pub const SMP_KEY_DIST_SIGN_KEY: u8 = 0x04;
pub const SMP_KEY_DIST_LINK_KEY: u8 = 0x08;

// Per-peer LE key kinds: peer keys in the low nibble, local keys in the high
pub const LE_KEY_PENC: u8 = SMP_KEY_DIST_ENC_KEY;
pub const LE_KEY_PID: u8 = SMP_KEY_DIST_ID_KEY;
pub const LE_KEY_PCSRK: u8 = SMP_KEY_DIST_SIGN_KEY;
pub const LE_KEY_PLK: u8 = SMP_KEY_DIST_LINK_KEY;
pub const LE_KEY_LENC: u8 = SMP_KEY_DIST_ENC_KEY << 4;
pub const LE_KEY_LID: u8 = SMP_KEY_DIST_ID_KEY << 4;
pub const LE_KEY_LCSRK: u8 = SMP_KEY_DIST_SIGN_KEY << 4;
pub const LE_KEY_LLK: u8 = SMP_KEY_DIST_LINK_KEY << 4;

// SMP encryption key size limits
pub const SMP_MIN_ENCRYPTION_KEY_SIZE: u8 = 7;
pub const SMP_MAX_ENCRYPTION_KEY_SIZE: u8 = 16;

// Pairing Failed reason codes
pub const SMP_REASON_PASSKEY_ENTRY_FAILED: u8 = 0x01;
pub const SMP_REASON_OOB_NOT_AVAILABLE: u8 = 0x02;
pub const SMP_REASON_AUTHENTICATION_REQUIREMENTS: u8 = 0x03;
pub const SMP_REASON_CONFIRM_VALUE_FAILED: u8 = 0x04;
pub const SMP_REASON_PAIRING_NOT_SUPPORTED: u8 = 0x05;
pub const SMP_REASON_ENCRYPTION_KEY_SIZE: u8 = 0x06;
pub const SMP_REASON_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const SMP_REASON_UNSPECIFIED_REASON: u8 = 0x08;
pub const SMP_REASON_REPEATED_ATTEMPTS: u8 = 0x09;
pub const SMP_REASON_INVALID_PARAMETERS: u8 = 0x0A;
pub const SMP_REASON_DHKEY_CHECK_FAILED: u8 = 0x0B;
pub const SMP_REASON_NUMERIC_COMPARISON_FAILED: u8 = 0x0C;

// Keypress notification types
pub const SMP_KEYPRESS_ENTRY_STARTED: u8 = 0x00;
pub const SMP_KEYPRESS_DIGIT_ENTERED: u8 = 0x01;
pub const SMP_KEYPRESS_DIGIT_ERASED: u8 = 0x02;
pub const SMP_KEYPRESS_CLEARED: u8 = 0x03;
pub const SMP_KEYPRESS_ENTRY_COMPLETED: u8 = 0x04;

// HCI status codes relevant to authentication
pub const HCI_SUCCESS: u8 = 0x00;
pub const HCI_ERR_AUTH_FAILURE: u8 = 0x05;
pub const HCI_ERR_KEY_MISSING: u8 = 0x06;
pub const HCI_ERR_CONNECTION_TIMEOUT: u8 = 0x08;
pub const HCI_ERR_PEER_USER: u8 = 0x13;
pub const HCI_ERR_PAIRING_NOT_ALLOWED: u8 = 0x18;
pub const HCI_ERR_LMP_RESPONSE_TIMEOUT: u8 = 0x22;
pub const HCI_ERR_UNIT_KEY_USED: u8 = 0x26;
pub const HCI_ERR_INSUFFICIENT_SECURITY: u8 = 0x2F;
pub const HCI_ERR_SIMPLE_PAIRING_NOT_SUPPORTED: u8 = 0x37;

// HCI link key types
pub const LINK_KEY_TYPE_COMBINATION: u8 = 0x00;
pub const LINK_KEY_TYPE_LOCAL_UNIT: u8 = 0x01;
pub const LINK_KEY_TYPE_REMOTE_UNIT: u8 = 0x02;
pub const LINK_KEY_TYPE_DEBUG_COMBINATION: u8 = 0x03;
pub const LINK_KEY_TYPE_UNAUTH_COMBINATION: u8 = 0x04;
pub const LINK_KEY_TYPE_AUTH_COMBINATION: u8 = 0x05;
pub const LINK_KEY_TYPE_CHANGED_COMBINATION: u8 = 0x06;
pub const LINK_KEY_TYPE_UNAUTH_COMBINATION_P256: u8 = 0x07;
pub const LINK_KEY_TYPE_AUTH_COMBINATION_P256: u8 = 0x08;

// Passkeys and comparison values are six decimal digits
pub const MAX_PASSKEY: u32 = 999_999;

// Legacy PIN code length limits
pub const PIN_CODE_MIN_LEN: usize = 1;
pub const PIN_CODE_MAX_LEN: usize = 16;

// Pairing timeout (in milliseconds)
pub const PAIRING_TIMEOUT_GENERAL: u64 = 30000;
