use crate::gap::constants::*;
use std::fmt;

/// LE address type as carried in HCI and SMP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl AddressType {
    pub fn to_u8(&self) -> u8 {
        match self {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
            AddressType::PublicIdentity => PUBLIC_IDENTITY_ADDRESS,
            AddressType::RandomIdentity => RANDOM_IDENTITY_ADDRESS,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            PUBLIC_DEVICE_ADDRESS => Some(AddressType::Public),
            RANDOM_DEVICE_ADDRESS => Some(AddressType::Random),
            PUBLIC_IDENTITY_ADDRESS => Some(AddressType::PublicIdentity),
            RANDOM_IDENTITY_ADDRESS => Some(AddressType::RandomIdentity),
            _ => None,
        }
    }
}

/// Bluetooth device address, stored little-endian as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [b0, b1, b2, b3, b4, b5] = self.bytes;
        write!(f, "{b5:02X}:{b4:02X}:{b3:02X}:{b2:02X}:{b1:02X}:{b0:02X}")
    }
}

/// Stable identity of a remote device: its address plus address type.
///
/// Every per-peer table in the security manager is keyed by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    pub address: BdAddr,
    pub address_type: AddressType,
}

impl PeerIdentity {
    pub fn new(address: BdAddr, address_type: AddressType) -> Self {
        Self {
            address,
            address_type,
        }
    }

    /// Identity for a BR/EDR peer, which always uses its public address
    pub fn public(bytes: [u8; 6]) -> Self {
        Self::new(BdAddr::new(bytes), AddressType::Public)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.address_type {
            AddressType::Public => "public",
            AddressType::Random => "random",
            AddressType::PublicIdentity => "public id",
            AddressType::RandomIdentity => "random id",
        };
        write!(f, "{} ({})", self.address, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_is_msb_first() {
        let addr = BdAddr::new([0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(addr.to_string(), "00:11:22:33:44:55");
    }

    #[test]
    fn test_address_type_round_trip() {
        for raw in 0u8..4 {
            let kind = AddressType::from_u8(raw).unwrap();
            assert_eq!(kind.to_u8(), raw);
        }
        assert_eq!(AddressType::from_u8(0x7F), None);
    }

    #[test]
    fn test_peer_identity_distinguishes_address_type() {
        let addr = BdAddr::new([1, 2, 3, 4, 5, 6]);
        let public = PeerIdentity::new(addr, AddressType::Public);
        let random = PeerIdentity::new(addr, AddressType::Random);
        assert_ne!(public, random);
        assert_eq!(public, PeerIdentity::public([1, 2, 3, 4, 5, 6]));
        assert_eq!(random.to_string(), "06:05:04:03:02:01 (random)");
    }
}
