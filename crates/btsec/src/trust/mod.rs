//! Per-peer trusted-service policy
//!
//! A peer with a service's bit set is pre-authorized for that service and is
//! not prompted through the authorize callback again.

mod bitset;
mod services;

pub use self::bitset::*;
pub use self::services::*;

use crate::error::SecurityResult;
use crate::gap::PeerIdentity;
use std::collections::HashMap;

/// Trusted services for one peer
pub type TrustedServiceMask = ServiceBitSet<MAX_SERVICES>;

/// Trusted-service masks for every known peer
#[derive(Debug, Default)]
pub struct TrustRegistry {
    masks: HashMap<PeerIdentity, TrustedServiceMask>,
}

impl TrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `service_id` as trusted for `peer`
    pub fn set(&mut self, peer: &PeerIdentity, service_id: u16) -> SecurityResult<()> {
        // Validate before creating an entry for an unknown peer
        TrustedServiceMask::new().contains(service_id)?;
        self.masks.entry(*peer).or_default().set(service_id)
    }

    /// Remove trust for `service_id` from `peer`
    pub fn clear(&mut self, peer: &PeerIdentity, service_id: u16) -> SecurityResult<()> {
        match self.masks.get_mut(peer) {
            Some(mask) => {
                mask.clear(service_id)?;
                if mask.is_empty() {
                    self.masks.remove(peer);
                }
                Ok(())
            }
            None => TrustedServiceMask::new().clear(service_id),
        }
    }

    pub fn is_trusted(&self, peer: &PeerIdentity, service_id: u16) -> SecurityResult<bool> {
        match self.masks.get(peer) {
            Some(mask) => mask.contains(service_id),
            None => TrustedServiceMask::new().contains(service_id),
        }
    }

    /// Overwrite `dst`'s mask with a copy of `src`'s
    pub fn copy(&mut self, src: &PeerIdentity, dst: &PeerIdentity) {
        match self.masks.get(src).cloned() {
            Some(mask) => {
                self.masks.insert(*dst, mask);
            }
            None => {
                self.masks.remove(dst);
            }
        }
    }

    pub fn clear_all(&mut self, peer: &PeerIdentity) {
        self.masks.remove(peer);
    }

    /// Mask for `peer`, empty if nothing is trusted
    pub fn mask(&self, peer: &PeerIdentity) -> TrustedServiceMask {
        self.masks.get(peer).cloned().unwrap_or_default()
    }

    /// Replace `peer`'s mask wholesale, used when restoring a bond
    pub fn restore(&mut self, peer: &PeerIdentity, mask: TrustedServiceMask) {
        if mask.is_empty() {
            self.masks.remove(peer);
        } else {
            self.masks.insert(*peer, mask);
        }
    }

    pub fn has_any(&self, peer: &PeerIdentity) -> bool {
        self.masks.get(peer).map_or(false, |m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests;
