//! Pairing sessions and the peer-keyed session table

use super::callbacks::{LeRequest, PairingResult, Response, SimplePairingRequest};
use super::classic::{ClassicPairing, ClassicState};
use super::events::{ClassicEvent, LeEvent};
use super::keys::{LinkKey, StoredKey};
use super::le::{LePairing, LeState};
use super::transport::SecurityCommand;
use super::types::*;
use crate::error::{SecurityError, SecurityResult};
use crate::gap::PeerIdentity;
use crate::trust::TrustRegistry;
use log::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Prompt a session is waiting on the application to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prompt {
    /// Numeric comparison or Just Works confirmation
    Confirm,
    Passkey,
    RemoteOob,
    Pin { min_16_digit: bool },
    /// A displayed passkey; only a rejection changes anything
    Notification,
    SecurityGrant,
    TemporaryKey,
    ScOob,
}

/// Side effects of one state machine step, carried out once the table lock
/// is released
#[derive(Debug)]
pub(crate) enum Effect {
    Send(PeerIdentity, SecurityCommand),
    AskSimplePairing(SimplePairingRequest),
    AskLe(LeRequest),
    /// Like `AskLe` but the decision is ignored
    NotifyLe(LeRequest),
    AskPin(PeerIdentity, bool),
    LinkKey(PeerIdentity, LinkKey),
    LeKey(PeerIdentity, StoredKey),
    AuthComplete(PeerIdentity, Transport, PairingResult),
    BondCancelComplete(PeerIdentity, SecurityResult<()>),
}

/// Effects collected while a session is advanced
#[derive(Debug, Default)]
pub(crate) struct Effects(pub(crate) Vec<Effect>);

impl Effects {
    pub(crate) fn send(&mut self, peer: PeerIdentity, command: SecurityCommand) {
        self.0.push(Effect::Send(peer, command));
    }

    pub(crate) fn push(&mut self, effect: Effect) {
        self.0.push(effect);
    }
}

/// Where a state machine step left the session
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    /// Pairing succeeded; `keys` are committed before anything is reported
    Complete {
        level: SecurityLevel,
        keys: Vec<StoredKey>,
    },
    Abort(SecurityError),
}

/// Fixed parameters of a session
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionInfo {
    pub(crate) peer: PeerIdentity,
    pub(crate) direction: PairingDirection,
    pub(crate) local_io: IoCapability,
    pub(crate) requirement: PairingRequirement,
}

/// Protocol-specific half of a session
#[derive(Debug)]
pub(crate) enum Machine {
    Classic(ClassicPairing),
    Le(LePairing),
}

/// Observable state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Classic(ClassicState),
    Le(LeState),
}

/// One in-progress pairing with one peer
#[derive(Debug)]
pub(crate) struct PairingSession {
    pub(crate) info: SessionInfo,
    pub(crate) machine: Machine,
    last_activity: Instant,
}

impl PairingSession {
    pub(crate) fn new(info: SessionInfo, machine: Machine) -> Self {
        Self {
            info,
            machine,
            last_activity: Instant::now(),
        }
    }

    pub(crate) fn transport(&self) -> Transport {
        self.info.requirement.transport
    }

    pub(crate) fn state(&self) -> SessionState {
        match &self.machine {
            Machine::Classic(classic) => SessionState::Classic(classic.state()),
            Machine::Le(le) => SessionState::Le(le.state()),
        }
    }

    pub(crate) fn prompt(&self) -> Option<Prompt> {
        match &self.machine {
            Machine::Classic(classic) => classic.prompt(),
            Machine::Le(le) => le.prompt(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Kick off the session once it is in the table
    pub(crate) fn start(&mut self, fx: &mut Effects) {
        let info = self.info;
        match &mut self.machine {
            Machine::Classic(classic) => classic.start(&info, fx),
            Machine::Le(le) => le.start(&info, fx),
        }
    }

    pub(crate) fn handle_classic(&mut self, event: &ClassicEvent, fx: &mut Effects) -> Step {
        self.touch();
        let info = self.info;
        match &mut self.machine {
            Machine::Classic(classic) => classic.handle_event(&info, event, fx),
            Machine::Le(_) => {
                debug!("Ignoring classic event for {}: LE pairing in progress", info.peer);
                Step::Continue
            }
        }
    }

    pub(crate) fn handle_le(&mut self, event: &LeEvent, fx: &mut Effects) -> Step {
        self.touch();
        let info = self.info;
        match &mut self.machine {
            Machine::Le(le) => le.handle_event(&info, event, fx),
            Machine::Classic(_) => {
                debug!("Ignoring LE event for {}: classic pairing in progress", info.peer);
                Step::Continue
            }
        }
    }

    /// Deliver the application's answer (`None` is a rejection)
    pub(crate) fn reply(&mut self, reply: Option<Response>, fx: &mut Effects) -> Step {
        self.touch();
        let info = self.info;
        match &mut self.machine {
            Machine::Classic(classic) => classic.handle_reply(&info, reply, fx),
            Machine::Le(le) => le.handle_reply(&info, reply, fx),
        }
    }
}

/// Per-peer link state outside of any session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LinkState {
    /// Authenticated by a pairing on the current connection
    pub(crate) authenticated: bool,
    pub(crate) encrypted: bool,
    /// Granted access by the authorize callback on the current connection
    pub(crate) authorized: bool,
}

/// Peer-keyed arena of sessions plus the state they read and update
#[derive(Debug, Default)]
pub(crate) struct SessionTable {
    sessions: HashMap<PeerIdentity, PairingSession>,
    links: HashMap<PeerIdentity, LinkState>,
    pub(crate) trust: TrustRegistry,
}

impl SessionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a session; a peer holds at most one
    pub(crate) fn insert(
        &mut self,
        session: PairingSession,
    ) -> SecurityResult<&mut PairingSession> {
        let peer = session.info.peer;
        if self.sessions.contains_key(&peer) {
            return Err(SecurityError::SessionAlreadyActive(peer));
        }
        Ok(self.sessions.entry(peer).or_insert(session))
    }

    pub(crate) fn get(&self, peer: &PeerIdentity) -> Option<&PairingSession> {
        self.sessions.get(peer)
    }

    pub(crate) fn get_mut(&mut self, peer: &PeerIdentity) -> Option<&mut PairingSession> {
        self.sessions.get_mut(peer)
    }

    pub(crate) fn remove(&mut self, peer: &PeerIdentity) -> Option<PairingSession> {
        self.sessions.remove(peer)
    }

    pub(crate) fn peers(&self) -> Vec<PeerIdentity> {
        self.sessions.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Peers whose sessions saw no activity for `timeout`
    pub(crate) fn expired(&self, now: Instant, timeout: Duration) -> Vec<PeerIdentity> {
        self.sessions
            .iter()
            .filter(|(_, session)| session.idle_for(now) >= timeout)
            .map(|(peer, _)| *peer)
            .collect()
    }

    pub(crate) fn link(&self, peer: &PeerIdentity) -> LinkState {
        self.links.get(peer).copied().unwrap_or_default()
    }

    pub(crate) fn link_mut(&mut self, peer: &PeerIdentity) -> &mut LinkState {
        self.links.entry(*peer).or_default()
    }

    pub(crate) fn drop_link(&mut self, peer: &PeerIdentity) {
        self.links.remove(peer);
    }
}
