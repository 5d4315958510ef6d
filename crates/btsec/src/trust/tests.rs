//! Unit tests for the trusted-service registry

use super::*;
use crate::error::SecurityError;

fn peer(last: u8) -> PeerIdentity {
    PeerIdentity::public([last, 0x11, 0x22, 0x33, 0x44, 0x55])
}

#[test]
fn test_set_then_is_trusted_for_every_service() {
    let mut registry = TrustRegistry::new();
    let p = peer(1);

    for id in 0..MAX_SERVICES as u16 {
        registry.set(&p, id).unwrap();
        assert!(registry.is_trusted(&p, id).unwrap(), "service {id}");
    }

    for id in 0..MAX_SERVICES as u16 {
        registry.clear(&p, id).unwrap();
        assert!(!registry.is_trusted(&p, id).unwrap(), "service {id}");
    }
    assert!(!registry.has_any(&p));
}

#[test]
fn test_out_of_range_leaves_mask_unchanged() {
    let mut registry = TrustRegistry::new();
    let p = peer(1);
    registry.set(&p, SERVICE_SDP_SERVER).unwrap();
    registry.set(&p, SERVICE_HEARING_AID_RIGHT).unwrap();
    registry.set(&p, 74).unwrap();
    let before = registry.mask(&p);

    for bad in [75u16, 76, 95, 96, 1000, u16::MAX] {
        assert_eq!(registry.set(&p, bad), Err(SecurityError::InvalidServiceId(bad)));
        assert_eq!(registry.clear(&p, bad), Err(SecurityError::InvalidServiceId(bad)));
        assert_eq!(
            registry.is_trusted(&p, bad),
            Err(SecurityError::InvalidServiceId(bad))
        );
    }

    assert_eq!(registry.mask(&p), before);
    for id in 0..MAX_SERVICES as u16 {
        assert_eq!(
            registry.is_trusted(&p, id).unwrap(),
            before.contains(id).unwrap()
        );
    }
}

#[test]
fn test_out_of_range_on_unknown_peer_creates_nothing() {
    let mut registry = TrustRegistry::new();
    let p = peer(9);
    assert!(registry.set(&p, 200).is_err());
    assert!(!registry.has_any(&p));
}

#[test]
fn test_peers_are_isolated() {
    let mut registry = TrustRegistry::new();
    let a = peer(1);
    let b = peer(2);

    registry.set(&a, SERVICE_HEADSET).unwrap();
    assert!(registry.is_trusted(&a, SERVICE_HEADSET).unwrap());
    assert!(!registry.is_trusted(&b, SERVICE_HEADSET).unwrap());

    registry.set(&b, SERVICE_PBAP).unwrap();
    registry.clear_all(&a);
    assert!(!registry.has_any(&a));
    assert!(registry.is_trusted(&b, SERVICE_PBAP).unwrap());
}

#[test]
fn test_copy_replaces_destination() {
    let mut registry = TrustRegistry::new();
    let a = peer(1);
    let b = peer(2);
    let empty = peer(3);

    registry.set(&a, SERVICE_AVDTP).unwrap();
    registry.set(&a, SERVICE_AVCTP).unwrap();
    registry.set(&b, SERVICE_MAP).unwrap();

    registry.copy(&a, &b);
    assert!(registry.is_trusted(&b, SERVICE_AVDTP).unwrap());
    assert!(registry.is_trusted(&b, SERVICE_AVCTP).unwrap());
    assert!(!registry.is_trusted(&b, SERVICE_MAP).unwrap());

    // Copying an empty mask clears the destination
    registry.copy(&empty, &b);
    assert!(!registry.has_any(&b));
    assert!(registry.has_any(&a));
}
