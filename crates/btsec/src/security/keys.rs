//! Key management for the security manager
//!
//! This module holds the key material produced by pairing: classic link
//! keys and the per-bond LE keys (LTK, IRK, CSRK and their local-role
//! counterparts). The [`KeyStore`] exclusively owns persisted keys; pairing
//! sessions only write through to it.

use super::constants::*;
use super::types::*;
use crate::error::{SecurityError, SecurityResult};
use crate::gap::{AddressType, BdAddr, PeerIdentity};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Classic link key types as reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKeyType {
    Combination,
    LocalUnit,
    RemoteUnit,
    DebugCombination,
    UnauthenticatedCombination,
    AuthenticatedCombination,
    ChangedCombination,
    UnauthenticatedP256,
    AuthenticatedP256,
}

impl LinkKeyType {
    pub fn to_u8(&self) -> u8 {
        match self {
            LinkKeyType::Combination => LINK_KEY_TYPE_COMBINATION,
            LinkKeyType::LocalUnit => LINK_KEY_TYPE_LOCAL_UNIT,
            LinkKeyType::RemoteUnit => LINK_KEY_TYPE_REMOTE_UNIT,
            LinkKeyType::DebugCombination => LINK_KEY_TYPE_DEBUG_COMBINATION,
            LinkKeyType::UnauthenticatedCombination => LINK_KEY_TYPE_UNAUTH_COMBINATION,
            LinkKeyType::AuthenticatedCombination => LINK_KEY_TYPE_AUTH_COMBINATION,
            LinkKeyType::ChangedCombination => LINK_KEY_TYPE_CHANGED_COMBINATION,
            LinkKeyType::UnauthenticatedP256 => LINK_KEY_TYPE_UNAUTH_COMBINATION_P256,
            LinkKeyType::AuthenticatedP256 => LINK_KEY_TYPE_AUTH_COMBINATION_P256,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            LINK_KEY_TYPE_COMBINATION => Some(LinkKeyType::Combination),
            LINK_KEY_TYPE_LOCAL_UNIT => Some(LinkKeyType::LocalUnit),
            LINK_KEY_TYPE_REMOTE_UNIT => Some(LinkKeyType::RemoteUnit),
            LINK_KEY_TYPE_DEBUG_COMBINATION => Some(LinkKeyType::DebugCombination),
            LINK_KEY_TYPE_UNAUTH_COMBINATION => Some(LinkKeyType::UnauthenticatedCombination),
            LINK_KEY_TYPE_AUTH_COMBINATION => Some(LinkKeyType::AuthenticatedCombination),
            LINK_KEY_TYPE_CHANGED_COMBINATION => Some(LinkKeyType::ChangedCombination),
            LINK_KEY_TYPE_UNAUTH_COMBINATION_P256 => Some(LinkKeyType::UnauthenticatedP256),
            LINK_KEY_TYPE_AUTH_COMBINATION_P256 => Some(LinkKeyType::AuthenticatedP256),
            _ => None,
        }
    }

    /// Whether the pairing that produced this key had MITM protection
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            LinkKeyType::AuthenticatedCombination | LinkKeyType::AuthenticatedP256
        )
    }

    /// Whether the key came out of a P-256 (Secure Connections) exchange
    pub fn is_p256(&self) -> bool {
        matches!(
            self,
            LinkKeyType::UnauthenticatedP256 | LinkKeyType::AuthenticatedP256
        )
    }

    /// Downgrade an authenticated type to its unauthenticated sibling
    pub fn unauthenticated(self) -> Self {
        match self {
            LinkKeyType::AuthenticatedCombination => LinkKeyType::UnauthenticatedCombination,
            LinkKeyType::AuthenticatedP256 => LinkKeyType::UnauthenticatedP256,
            other => other,
        }
    }
}

/// Classic BR/EDR link key
#[derive(Clone, PartialEq, Eq)]
pub struct LinkKey {
    /// Key value
    pub key: [u8; 16],
    /// How the key was generated
    pub key_type: LinkKeyType,
}

impl LinkKey {
    pub fn new(key: [u8; 16], key_type: LinkKeyType) -> Self {
        Self { key, key_type }
    }

    pub fn security_level(&self) -> SecurityLevel {
        if self.key_type.is_authenticated() {
            SecurityLevel::Authenticated
        } else {
            SecurityLevel::Unauthenticated
        }
    }
}

impl fmt::Debug for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkKey")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

/// Long Term Key received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEncryptionKey {
    pub ltk: [u8; 16],
    /// RAND (Random number)
    pub rand: [u8; 8],
    /// EDIV (Encrypted Diversifier)
    pub ediv: u16,
    pub security_level: SecurityLevel,
    pub key_size: u8,
}

/// Identity Resolving Key and identity address received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentityKey {
    pub irk: [u8; 16],
    pub identity_address_type: AddressType,
    pub identity_address: BdAddr,
}

/// Connection Signature Resolving Key received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSignatureKey {
    pub csrk: [u8; 16],
    /// Counter for incoming signed data
    pub counter: u32,
    pub security_level: SecurityLevel,
}

/// Long Term Key we distributed while acting as peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEncryptionKey {
    pub ltk: [u8; 16],
    /// Diversifier used to regenerate the LTK
    pub div: u16,
    pub key_size: u8,
    pub security_level: SecurityLevel,
}

/// Signing key we distributed to the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSignatureKey {
    pub csrk: [u8; 16],
    pub div: u16,
    /// Counter for outgoing signed data
    pub counter: u32,
    pub security_level: SecurityLevel,
}

impl LocalSignatureKey {
    /// Increment the signing counter
    pub fn increment_counter(&mut self) -> u32 {
        self.counter = self.counter.wrapping_add(1);
        self.counter
    }
}

/// Which key a [`StoredKey`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Link,
    PeerEncryption,
    PeerIdentity,
    PeerSignature,
    LocalEncryption,
    LocalSignature,
}

impl KeyKind {
    pub const ALL: [KeyKind; 6] = [
        KeyKind::Link,
        KeyKind::PeerEncryption,
        KeyKind::PeerIdentity,
        KeyKind::PeerSignature,
        KeyKind::LocalEncryption,
        KeyKind::LocalSignature,
    ];

    /// LE distribution bit for this kind, `None` for classic link keys
    pub fn le_mask(&self) -> Option<LeKeyMask> {
        match self {
            KeyKind::Link => None,
            KeyKind::PeerEncryption => Some(LeKeyMask::PENC),
            KeyKind::PeerIdentity => Some(LeKeyMask::PID),
            KeyKind::PeerSignature => Some(LeKeyMask::PCSRK),
            KeyKind::LocalEncryption => Some(LeKeyMask::LENC),
            KeyKind::LocalSignature => Some(LeKeyMask::LCSRK),
        }
    }
}

/// One piece of persisted key material
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredKey {
    Link(LinkKey),
    PeerEncryption(PeerEncryptionKey),
    PeerIdentity(PeerIdentityKey),
    PeerSignature(PeerSignatureKey),
    LocalEncryption(LocalEncryptionKey),
    LocalSignature(LocalSignatureKey),
}

impl StoredKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            StoredKey::Link(_) => KeyKind::Link,
            StoredKey::PeerEncryption(_) => KeyKind::PeerEncryption,
            StoredKey::PeerIdentity(_) => KeyKind::PeerIdentity,
            StoredKey::PeerSignature(_) => KeyKind::PeerSignature,
            StoredKey::LocalEncryption(_) => KeyKind::LocalEncryption,
            StoredKey::LocalSignature(_) => KeyKind::LocalSignature,
        }
    }

    /// Security level tag; identity keys carry none of their own
    pub fn security_level(&self) -> Option<SecurityLevel> {
        match self {
            StoredKey::Link(key) => Some(key.security_level()),
            StoredKey::PeerEncryption(key) => Some(key.security_level),
            StoredKey::PeerIdentity(_) => None,
            StoredKey::PeerSignature(key) => Some(key.security_level),
            StoredKey::LocalEncryption(key) => Some(key.security_level),
            StoredKey::LocalSignature(key) => Some(key.security_level),
        }
    }

    /// Stamp the bond's security level onto an LE key
    pub fn set_security_level(&mut self, level: SecurityLevel) {
        match self {
            StoredKey::PeerEncryption(key) => key.security_level = level,
            StoredKey::PeerSignature(key) => key.security_level = level,
            StoredKey::LocalEncryption(key) => key.security_level = level,
            StoredKey::LocalSignature(key) => key.security_level = level,
            StoredKey::Link(_) | StoredKey::PeerIdentity(_) => {}
        }
    }
}

/// Up to five independently exchanged LE keys for one bonded peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeKeySet {
    pub peer_encryption: Option<PeerEncryptionKey>,
    pub peer_identity: Option<PeerIdentityKey>,
    pub peer_signature: Option<PeerSignatureKey>,
    pub local_encryption: Option<LocalEncryptionKey>,
    pub local_signature: Option<LocalSignatureKey>,
}

impl LeKeySet {
    /// Distribution bits of the keys present
    pub fn mask(&self) -> LeKeyMask {
        let mut mask = LeKeyMask::empty();
        mask.set(LeKeyMask::PENC, self.peer_encryption.is_some());
        mask.set(LeKeyMask::PID, self.peer_identity.is_some());
        mask.set(LeKeyMask::PCSRK, self.peer_signature.is_some());
        mask.set(LeKeyMask::LENC, self.local_encryption.is_some());
        mask.set(LeKeyMask::LCSRK, self.local_signature.is_some());
        mask
    }

    pub fn is_empty(&self) -> bool {
        self.mask().is_empty()
    }
}

/// Everything persisted for one peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondKeys {
    pub link_key: Option<LinkKey>,
    pub le: LeKeySet,
}

impl BondKeys {
    pub fn insert(&mut self, key: StoredKey) {
        match key {
            StoredKey::Link(k) => self.link_key = Some(k),
            StoredKey::PeerEncryption(k) => self.le.peer_encryption = Some(k),
            StoredKey::PeerIdentity(k) => self.le.peer_identity = Some(k),
            StoredKey::PeerSignature(k) => self.le.peer_signature = Some(k),
            StoredKey::LocalEncryption(k) => self.le.local_encryption = Some(k),
            StoredKey::LocalSignature(k) => self.le.local_signature = Some(k),
        }
    }

    pub fn get(&self, kind: KeyKind) -> Option<StoredKey> {
        match kind {
            KeyKind::Link => self.link_key.clone().map(StoredKey::Link),
            KeyKind::PeerEncryption => {
                self.le.peer_encryption.clone().map(StoredKey::PeerEncryption)
            }
            KeyKind::PeerIdentity => self.le.peer_identity.clone().map(StoredKey::PeerIdentity),
            KeyKind::PeerSignature => self.le.peer_signature.clone().map(StoredKey::PeerSignature),
            KeyKind::LocalEncryption => {
                self.le.local_encryption.clone().map(StoredKey::LocalEncryption)
            }
            KeyKind::LocalSignature => {
                self.le.local_signature.clone().map(StoredKey::LocalSignature)
            }
        }
    }

    /// Number of keys held
    pub fn count(&self) -> usize {
        KeyKind::ALL.iter().filter(|kind| self.get(**kind).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Level of the bond: the link key's, else the LTK's, else the weakest LE key's
    pub fn security_level(&self) -> SecurityLevel {
        if let Some(link_key) = &self.link_key {
            return link_key.security_level();
        }
        if let Some(ltk) = &self.le.peer_encryption {
            return ltk.security_level;
        }
        if let Some(ltk) = &self.le.local_encryption {
            return ltk.security_level;
        }
        KeyKind::ALL
            .iter()
            .filter_map(|kind| self.get(*kind))
            .filter_map(|key| key.security_level())
            .min()
            .unwrap_or(SecurityLevel::None)
    }

    /// Whether a key usable for link encryption is known
    pub fn has_encryption_key(&self) -> bool {
        self.link_key.is_some()
            || self.le.peer_encryption.is_some()
            || self.le.local_encryption.is_some()
    }
}

/// Key Store trait for persistent storage of security keys
pub trait KeyStore: Send + Sync {
    /// Store `key` for `peer`, replacing any key of the same kind
    fn put(&self, peer: &PeerIdentity, key: StoredKey) -> SecurityResult<()>;

    /// Look up one key
    fn get(&self, peer: &PeerIdentity, kind: KeyKind) -> SecurityResult<Option<StoredKey>>;

    /// All keys held for `peer`
    fn bond(&self, peer: &PeerIdentity) -> SecurityResult<Option<BondKeys>>;

    /// Store a set of keys for `peer` in one step
    fn put_all(&self, peer: &PeerIdentity, keys: Vec<StoredKey>) -> SecurityResult<()>;

    /// Forget `peer`; returns the number of keys removed
    fn delete_peer(&self, peer: &PeerIdentity) -> SecurityResult<usize>;

    /// Forget every bond; returns the number of keys removed
    fn delete_all(&self) -> SecurityResult<usize>;

    /// Get all bonded peers
    fn peers(&self) -> SecurityResult<Vec<PeerIdentity>>;
}

/// In-memory implementation of KeyStore
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    /// Device key storage
    keys: RwLock<HashMap<PeerIdentity, BondKeys>>,
}

fn poisoned<T>(_: T) -> SecurityError {
    SecurityError::Storage("key store lock poisoned".into())
}

impl MemoryKeyStore {
    /// Create a new empty in-memory key store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn put(&self, peer: &PeerIdentity, key: StoredKey) -> SecurityResult<()> {
        let mut store = self.keys.write().map_err(poisoned)?;
        store.entry(*peer).or_default().insert(key);
        Ok(())
    }

    fn get(&self, peer: &PeerIdentity, kind: KeyKind) -> SecurityResult<Option<StoredKey>> {
        let store = self.keys.read().map_err(poisoned)?;
        Ok(store.get(peer).and_then(|bond| bond.get(kind)))
    }

    fn bond(&self, peer: &PeerIdentity) -> SecurityResult<Option<BondKeys>> {
        let store = self.keys.read().map_err(poisoned)?;
        Ok(store.get(peer).cloned())
    }

    fn put_all(&self, peer: &PeerIdentity, keys: Vec<StoredKey>) -> SecurityResult<()> {
        let mut store = self.keys.write().map_err(poisoned)?;
        let bond = store.entry(*peer).or_default();
        for key in keys {
            bond.insert(key);
        }
        Ok(())
    }

    fn delete_peer(&self, peer: &PeerIdentity) -> SecurityResult<usize> {
        let mut store = self.keys.write().map_err(poisoned)?;
        Ok(store.remove(peer).map_or(0, |bond| bond.count()))
    }

    fn delete_all(&self) -> SecurityResult<usize> {
        // Swap the whole map under one write lock so readers see all or nothing
        let removed = std::mem::take(&mut *self.keys.write().map_err(poisoned)?);
        Ok(removed.values().map(BondKeys::count).sum())
    }

    fn peers(&self) -> SecurityResult<Vec<PeerIdentity>> {
        let store = self.keys.read().map_err(poisoned)?;
        Ok(store.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::Arc;
    use std::thread;

    fn peer(n: u8) -> PeerIdentity {
        PeerIdentity::public([n, 0, 0, 0, 0xAA, 0xBB])
    }

    fn random_link_key() -> LinkKey {
        LinkKey::new(rand::thread_rng().gen(), LinkKeyType::AuthenticatedP256)
    }

    #[test]
    fn test_put_get_replace() {
        let store = MemoryKeyStore::new();
        let p = peer(1);
        assert_eq!(store.get(&p, KeyKind::Link).unwrap(), None);

        let first = random_link_key();
        store.put(&p, StoredKey::Link(first.clone())).unwrap();
        assert_eq!(store.get(&p, KeyKind::Link).unwrap(), Some(StoredKey::Link(first)));

        let second = LinkKey::new([7; 16], LinkKeyType::UnauthenticatedP256);
        store.put(&p, StoredKey::Link(second.clone())).unwrap();
        assert_eq!(store.get(&p, KeyKind::Link).unwrap(), Some(StoredKey::Link(second)));
        assert_eq!(store.get(&p, KeyKind::PeerEncryption).unwrap(), None);
    }

    #[test]
    fn test_delete_all_reports_count() {
        let store = MemoryKeyStore::new();
        let n = 12u8;
        for i in 0..n {
            store.put(&peer(i), StoredKey::Link(random_link_key())).unwrap();
        }

        assert_eq!(store.delete_all().unwrap(), n as usize);
        for i in 0..n {
            assert_eq!(store.get(&peer(i), KeyKind::Link).unwrap(), None);
        }
        assert!(store.peers().unwrap().is_empty());
        assert_eq!(store.delete_all().unwrap(), 0);
    }

    #[test]
    fn test_delete_peer_counts_every_kind() {
        let store = MemoryKeyStore::new();
        let p = peer(3);
        store
            .put_all(
                &p,
                vec![
                    StoredKey::PeerEncryption(PeerEncryptionKey {
                        ltk: [1; 16],
                        rand: [2; 8],
                        ediv: 0x1234,
                        security_level: SecurityLevel::Authenticated,
                        key_size: 16,
                    }),
                    StoredKey::PeerSignature(PeerSignatureKey {
                        csrk: [3; 16],
                        counter: 0,
                        security_level: SecurityLevel::Authenticated,
                    }),
                ],
            )
            .unwrap();
        store.put(&peer(4), StoredKey::Link(random_link_key())).unwrap();

        assert_eq!(store.delete_peer(&p).unwrap(), 2);
        assert_eq!(store.delete_peer(&p).unwrap(), 0);
        assert_eq!(store.peers().unwrap(), vec![peer(4)]);
    }

    #[test]
    fn test_delete_all_never_tears_a_lookup() {
        let store = Arc::new(MemoryKeyStore::new());
        let p = peer(1);
        let key = LinkKey::new([0x5A; 16], LinkKeyType::AuthenticatedCombination);
        store.put(&p, StoredKey::Link(key.clone())).unwrap();

        let reader = {
            let store = Arc::clone(&store);
            let key = key.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    match store.get(&p, KeyKind::Link).unwrap() {
                        Some(StoredKey::Link(found)) => assert_eq!(found, key),
                        None => {}
                        Some(other) => panic!("unexpected key {:?}", other),
                    }
                }
            })
        };

        assert_eq!(store.delete_all().unwrap(), 1);
        reader.join().unwrap();
        assert_eq!(store.get(&p, KeyKind::Link).unwrap(), None);
    }

    #[test]
    fn test_bond_security_level() {
        let mut bond = BondKeys::default();
        assert_eq!(bond.security_level(), SecurityLevel::None);

        bond.insert(StoredKey::PeerSignature(PeerSignatureKey {
            csrk: [0; 16],
            counter: 0,
            security_level: SecurityLevel::Unauthenticated,
        }));
        assert_eq!(bond.security_level(), SecurityLevel::Unauthenticated);

        bond.insert(StoredKey::Link(LinkKey::new([0; 16], LinkKeyType::AuthenticatedP256)));
        assert_eq!(bond.security_level(), SecurityLevel::Authenticated);
        assert!(bond.has_encryption_key());
    }

    #[test]
    fn test_link_key_debug_hides_material() {
        let key = LinkKey::new([0xAB; 16], LinkKeyType::Combination);
        let text = format!("{:?}", key);
        assert!(!text.contains("171"));
        assert!(text.contains("Combination"));
    }
}
