//! Persisted per-peer bond record
//!
//! The record is the contract with whatever performs non-volatile storage:
//! the link key or LE key set, the bond's security level and the trusted
//! service mask. It has a compact binary form and a hex text form suitable
//! for line-oriented config files.

use super::keys::*;
use super::types::SecurityLevel;
use crate::error::{SecurityError, SecurityResult};
use crate::gap::{AddressType, BdAddr};
use crate::trust::TrustedServiceMask;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

const RECORD_VERSION: u8 = 1;

const HAS_LINK_KEY: u8 = 0x01;
const HAS_PENC: u8 = 0x02;
const HAS_PID: u8 = 0x04;
const HAS_PCSRK: u8 = 0x08;
const HAS_LENC: u8 = 0x10;
const HAS_LCSRK: u8 = 0x20;

/// Everything the security manager persists for one peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondRecord {
    pub keys: BondKeys,
    pub security_level: SecurityLevel,
    pub trusted: TrustedServiceMask,
}

fn truncated(_: std::io::Error) -> SecurityError {
    SecurityError::InvalidRecord("record truncated".into())
}

fn read_level(cursor: &mut Cursor<&[u8]>) -> SecurityResult<SecurityLevel> {
    let raw = cursor.read_u8().map_err(truncated)?;
    SecurityLevel::from_u8(raw)
        .ok_or_else(|| SecurityError::InvalidRecord(format!("bad security level {raw}")))
}

fn read_key(cursor: &mut Cursor<&[u8]>) -> SecurityResult<[u8; 16]> {
    let mut key = [0u8; 16];
    cursor.read_exact(&mut key).map_err(truncated)?;
    Ok(key)
}

impl BondRecord {
    pub fn new(keys: BondKeys, trusted: TrustedServiceMask) -> Self {
        let security_level = keys.security_level();
        Self {
            keys,
            security_level,
            trusted,
        }
    }

    /// Serialize to the binary layout
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        self.write_to(&mut out).expect("writing to a Vec cannot fail");
        out
    }

    /// Write the binary layout to `out`
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let le = &self.keys.le;

        let mut present = 0u8;
        if self.keys.link_key.is_some() {
            present |= HAS_LINK_KEY;
        }
        if le.peer_encryption.is_some() {
            present |= HAS_PENC;
        }
        if le.peer_identity.is_some() {
            present |= HAS_PID;
        }
        if le.peer_signature.is_some() {
            present |= HAS_PCSRK;
        }
        if le.local_encryption.is_some() {
            present |= HAS_LENC;
        }
        if le.local_signature.is_some() {
            present |= HAS_LCSRK;
        }

        out.write_u8(RECORD_VERSION)?;
        out.write_u8(self.security_level.to_u8())?;
        out.write_u8(present)?;

        if let Some(link_key) = &self.keys.link_key {
            out.write_all(&link_key.key)?;
            out.write_u8(link_key.key_type.to_u8())?;
        }
        if let Some(key) = &le.peer_encryption {
            out.write_all(&key.ltk)?;
            out.write_all(&key.rand)?;
            out.write_u16::<LittleEndian>(key.ediv)?;
            out.write_u8(key.security_level.to_u8())?;
            out.write_u8(key.key_size)?;
        }
        if let Some(key) = &le.peer_identity {
            out.write_all(&key.irk)?;
            out.write_u8(key.identity_address_type.to_u8())?;
            out.write_all(&key.identity_address.bytes)?;
        }
        if let Some(key) = &le.peer_signature {
            out.write_all(&key.csrk)?;
            out.write_u32::<LittleEndian>(key.counter)?;
            out.write_u8(key.security_level.to_u8())?;
        }
        if let Some(key) = &le.local_encryption {
            out.write_all(&key.ltk)?;
            out.write_u16::<LittleEndian>(key.div)?;
            out.write_u8(key.key_size)?;
            out.write_u8(key.security_level.to_u8())?;
        }
        if let Some(key) = &le.local_signature {
            out.write_all(&key.csrk)?;
            out.write_u16::<LittleEndian>(key.div)?;
            out.write_u32::<LittleEndian>(key.counter)?;
            out.write_u8(key.security_level.to_u8())?;
        }

        let words = self.trusted.words();
        out.write_u8(words.len() as u8)?;
        for word in words {
            out.write_u32::<LittleEndian>(*word)?;
        }
        Ok(())
    }

    /// Parse the binary layout
    pub fn decode(data: &[u8]) -> SecurityResult<Self> {
        let mut cursor = Cursor::new(data);

        let version = cursor.read_u8().map_err(truncated)?;
        if version != RECORD_VERSION {
            return Err(SecurityError::InvalidRecord(format!(
                "unsupported record version {version}"
            )));
        }
        let security_level = read_level(&mut cursor)?;
        let present = cursor.read_u8().map_err(truncated)?;

        let mut keys = BondKeys::default();

        if present & HAS_LINK_KEY != 0 {
            let key = read_key(&mut cursor)?;
            let raw = cursor.read_u8().map_err(truncated)?;
            let key_type = LinkKeyType::from_u8(raw)
                .ok_or_else(|| SecurityError::InvalidRecord(format!("bad link key type {raw}")))?;
            keys.link_key = Some(LinkKey::new(key, key_type));
        }
        if present & HAS_PENC != 0 {
            let ltk = read_key(&mut cursor)?;
            let mut rand = [0u8; 8];
            cursor.read_exact(&mut rand).map_err(truncated)?;
            let ediv = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let security_level = read_level(&mut cursor)?;
            let key_size = cursor.read_u8().map_err(truncated)?;
            keys.le.peer_encryption = Some(PeerEncryptionKey {
                ltk,
                rand,
                ediv,
                security_level,
                key_size,
            });
        }
        if present & HAS_PID != 0 {
            let irk = read_key(&mut cursor)?;
            let raw = cursor.read_u8().map_err(truncated)?;
            let identity_address_type = AddressType::from_u8(raw)
                .ok_or_else(|| SecurityError::InvalidRecord(format!("bad address type {raw}")))?;
            let mut addr = [0u8; 6];
            cursor.read_exact(&mut addr).map_err(truncated)?;
            keys.le.peer_identity = Some(PeerIdentityKey {
                irk,
                identity_address_type,
                identity_address: BdAddr::new(addr),
            });
        }
        if present & HAS_PCSRK != 0 {
            let csrk = read_key(&mut cursor)?;
            let counter = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
            let security_level = read_level(&mut cursor)?;
            keys.le.peer_signature = Some(PeerSignatureKey {
                csrk,
                counter,
                security_level,
            });
        }
        if present & HAS_LENC != 0 {
            let ltk = read_key(&mut cursor)?;
            let div = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let key_size = cursor.read_u8().map_err(truncated)?;
            let security_level = read_level(&mut cursor)?;
            keys.le.local_encryption = Some(LocalEncryptionKey {
                ltk,
                div,
                key_size,
                security_level,
            });
        }
        if present & HAS_LCSRK != 0 {
            let csrk = read_key(&mut cursor)?;
            let div = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let counter = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
            let security_level = read_level(&mut cursor)?;
            keys.le.local_signature = Some(LocalSignatureKey {
                csrk,
                div,
                counter,
                security_level,
            });
        }

        let word_count = cursor.read_u8().map_err(truncated)? as usize;
        let mut words = Vec::with_capacity(word_count);
        for _ in 0..word_count {
            words.push(cursor.read_u32::<LittleEndian>().map_err(truncated)?);
        }
        let trusted = TrustedServiceMask::from_words(&words)?;

        if (cursor.position() as usize) != data.len() {
            return Err(SecurityError::InvalidRecord("trailing bytes".into()));
        }

        Ok(Self {
            keys,
            security_level,
            trusted,
        })
    }

    /// Hex text form of [`BondRecord::encode`]
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    pub fn from_hex(text: &str) -> SecurityResult<Self> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| SecurityError::InvalidRecord(format!("bad hex: {e}")))?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::SERVICE_HEADSET;

    fn full_record() -> BondRecord {
        let mut keys = BondKeys::default();
        keys.link_key = Some(LinkKey::new([0x11; 16], LinkKeyType::AuthenticatedP256));
        keys.le.peer_encryption = Some(PeerEncryptionKey {
            ltk: [0x22; 16],
            rand: [1, 2, 3, 4, 5, 6, 7, 8],
            ediv: 0xBEEF,
            security_level: SecurityLevel::Authenticated,
            key_size: 16,
        });
        keys.le.peer_identity = Some(PeerIdentityKey {
            irk: [0x33; 16],
            identity_address_type: AddressType::Random,
            identity_address: BdAddr::new([6, 5, 4, 3, 2, 1]),
        });
        keys.le.local_signature = Some(LocalSignatureKey {
            csrk: [0x44; 16],
            div: 0x0102,
            counter: 9,
            security_level: SecurityLevel::Authenticated,
        });

        let mut trusted = TrustedServiceMask::new();
        trusted.set(SERVICE_HEADSET).unwrap();
        trusted.set(74).unwrap();
        BondRecord::new(keys, trusted)
    }

    #[test]
    fn test_hex_round_trip() {
        let record = full_record();
        assert_eq!(record.security_level, SecurityLevel::Authenticated);

        let text = record.to_hex();
        assert!(text.starts_with("0102"));
        assert_eq!(BondRecord::from_hex(&text).unwrap(), record);
    }

    #[test]
    fn test_empty_record_layout() {
        let record = BondRecord::default();
        let bytes = record.encode();
        // version, level, presence, word count, three zero words
        assert_eq!(bytes.len(), 3 + 1 + 12);
        assert_eq!(&bytes[..4], &[RECORD_VERSION, 0, 0, 3]);
        assert_eq!(BondRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_rejects_corruption() {
        let bytes = full_record().encode();

        assert!(BondRecord::decode(&bytes[..bytes.len() - 1]).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(BondRecord::decode(&trailing).is_err());

        let mut version = bytes.clone();
        version[0] = 9;
        assert!(BondRecord::decode(&version).is_err());

        assert!(BondRecord::from_hex("zz").is_err());
    }

    #[test]
    fn test_write_to_stops_at_full_buffer() {
        let record = full_record();
        let bytes = record.encode();

        let mut exact = vec![0u8; bytes.len()];
        record.write_to(&mut Cursor::new(&mut exact[..])).unwrap();
        assert_eq!(exact, bytes);

        let mut short = vec![0u8; bytes.len() - 1];
        let err = record.write_to(&mut Cursor::new(&mut short[..])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
