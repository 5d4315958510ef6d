//! Well-known security service identifiers

/// Number of service slots in a trusted-service mask
pub const MAX_SERVICES: usize = 75;

pub const SERVICE_SDP_SERVER: u16 = 0;
pub const SERVICE_SERIAL_PORT: u16 = 1;
pub const SERVICE_LAN_ACCESS: u16 = 2;
pub const SERVICE_DUN: u16 = 3;
pub const SERVICE_IRMC_SYNC: u16 = 4;
pub const SERVICE_OBEX: u16 = 6;
pub const SERVICE_OBEX_FTP: u16 = 7;
pub const SERVICE_HEADSET: u16 = 8;
pub const SERVICE_CORDLESS: u16 = 9;
pub const SERVICE_INTERCOM: u16 = 10;
pub const SERVICE_HEADSET_AG: u16 = 12;
pub const SERVICE_BPP_JOB: u16 = 22;
pub const SERVICE_BNEP_PANU: u16 = 25;
pub const SERVICE_BNEP_GN: u16 = 26;
pub const SERVICE_BNEP_NAP: u16 = 27;
pub const SERVICE_HF_HANDSFREE: u16 = 28;
pub const SERVICE_AG_HANDSFREE: u16 = 29;
pub const SERVICE_HIDH_SEC_CTRL: u16 = 32;
pub const SERVICE_HIDH_NOSEC_CTRL: u16 = 33;
pub const SERVICE_HIDH_INTR: u16 = 34;
pub const SERVICE_BIP: u16 = 35;
pub const SERVICE_AVDTP: u16 = 37;
pub const SERVICE_AVDTP_NOSEC: u16 = 38;
pub const SERVICE_AVCTP: u16 = 39;
pub const SERVICE_SAP: u16 = 40;
pub const SERVICE_PBAP: u16 = 41;
pub const SERVICE_RFC_MUX: u16 = 42;
pub const SERVICE_AVCTP_BROWSE: u16 = 43;
pub const SERVICE_MAP: u16 = 44;
pub const SERVICE_HDP_SNK: u16 = 48;
pub const SERVICE_ATT: u16 = 50;
pub const SERVICE_HIDD_SEC_CTRL: u16 = 51;
pub const SERVICE_HIDD_NOSEC_CTRL: u16 = 52;
pub const SERVICE_HIDD_INTR: u16 = 53;
pub const SERVICE_HEARING_AID_LEFT: u16 = 54;
pub const SERVICE_HEARING_AID_RIGHT: u16 = 55;

/// First id not assigned to a well-known service; profiles may claim ids
/// from here up to `MAX_SERVICES - 1`
pub const SERVICE_FIRST_EMPTY: u16 = 56;
