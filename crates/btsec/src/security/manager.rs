//! Security manager
//!
//! Owns the session table, the trust registry and the callback registration,
//! and drives both pairing state machines from transport events and
//! application replies.
//!
//! Events and replies go through one inbox that is drained by whichever
//! caller finds it idle, so each input is processed to completion before the
//! next one starts. State machine steps run under the table lock and only
//! produce effects; transport sends and callbacks run after the lock is
//! released, which lets callbacks call back into the manager.

use super::callbacks::*;
use super::events::{ClassicEvent, LeEvent};
use super::keys::*;
use super::classic::ClassicPairing;
use super::le::LePairing;
use super::record::BondRecord;
use super::session::*;
use super::transport::{SecurityCommand, SecurityTransport};
use super::types::*;
use crate::config::SecurityConfig;
use crate::error::{AbortReason, SecurityError, SecurityResult};
use crate::gap::PeerIdentity;
use crate::trust::TrustedServiceMask;
use log::{debug, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Why a service access check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenial {
    NotEncrypted,
    NotAuthenticated,
    MitmRequired,
    SecureConnectionsRequired,
    NotAuthorized,
}

/// Answer to [`SecurityManager::check_service_access`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    /// The authorize callback will answer through `authorize_reply`
    Pending,
    Denied(AccessDenial),
}

enum Input {
    Classic(ClassicEvent),
    Le(LeEvent),
    Reply {
        peer: PeerIdentity,
        reply: Option<Response>,
    },
    TransportFailure(PeerIdentity),
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<Input>,
    draining: bool,
}

/// Clears `draining` if a callback unwinds out of the drain loop
struct DrainGuard<'a>(&'a Mutex<Inbox>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut inbox = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            inbox.draining = false;
        }
    }
}

/// Bluetooth security manager
pub struct SecurityManager {
    config: SecurityConfig,
    key_store: Arc<dyn KeyStore>,
    transport: Arc<dyn SecurityTransport>,
    callbacks: CallbackDispatcher,
    table: Mutex<SessionTable>,
    inbox: Mutex<Inbox>,
}

fn uses_secure_connections(bond: &BondKeys) -> bool {
    if let Some(link_key) = &bond.link_key {
        return link_key.key_type.is_p256();
    }
    // LE bonds are only authenticated when Secure Connections was used
    bond.le.peer_encryption.as_ref().map(|k| k.security_level)
        .or_else(|| bond.le.local_encryption.as_ref().map(|k| k.security_level))
        .map_or(false, |level| level.is_authenticated())
}

impl SecurityManager {
    /// Create a new security manager
    pub fn new(
        config: SecurityConfig,
        key_store: Arc<dyn KeyStore>,
        transport: Arc<dyn SecurityTransport>,
    ) -> Self {
        Self {
            config,
            key_store,
            transport,
            callbacks: CallbackDispatcher::new(),
            table: Mutex::new(SessionTable::new()),
            inbox: Mutex::new(Inbox::default()),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.key_store
    }

    fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the application callbacks
    pub fn install(&self, callbacks: Arc<dyn SecurityCallbacks>) -> SecurityResult<()> {
        self.callbacks.install(callbacks)?;
        info!("Security callbacks installed");
        Ok(())
    }

    /// Remove the application callbacks and abort every session.
    ///
    /// The registrant is removed under the table lock, so no new session can
    /// open once the aborts are collected. The aborted sessions still report
    /// to the registrant that owned them.
    pub fn uninstall(&self) -> SecurityResult<()> {
        let mut fx = Effects::default();
        let removed = {
            let mut table = self.table();
            let removed = self.callbacks.uninstall()?;
            for peer in table.peers() {
                self.abort_session(
                    &mut table,
                    &peer,
                    SecurityError::Aborted(AbortReason::Unregistered),
                    true,
                    &mut fx,
                );
            }
            removed
        };
        info!("Security callbacks removed");

        for effect in fx.0 {
            match effect {
                Effect::Send(peer, command) => {
                    trace!("{} <- {:?}", peer, command);
                    if let Err(error) = self.transport.send(&peer, command) {
                        warn!("Transport failed for {}: {}", peer, error);
                    }
                }
                Effect::AuthComplete(peer, transport, result) => {
                    removed.auth_complete(&peer, transport, &result)
                }
                other => debug!("Dropping {:?} after uninstall", other),
            }
        }
        Ok(())
    }

    fn new_session(
        &self,
        peer: PeerIdentity,
        direction: PairingDirection,
        requirement: PairingRequirement,
    ) -> PairingSession {
        let info = SessionInfo {
            peer,
            direction,
            local_io: self.config.io_capability,
            requirement,
        };
        let machine = match requirement.transport {
            Transport::Classic => Machine::Classic(ClassicPairing::new()),
            Transport::Le => Machine::Le(LePairing::new(
                self.config.le_features(&requirement),
                requirement.auth.secure_connections(),
            )),
        };
        PairingSession::new(info, machine)
    }

    /// Start pairing with `peer`
    pub fn start_pairing(
        &self,
        peer: PeerIdentity,
        direction: PairingDirection,
        requirement: PairingRequirement,
    ) -> SecurityResult<()> {
        let mut fx = Effects::default();
        {
            let mut table = self.table();
            // `uninstall` removes the registrant under this lock
            if !self.callbacks.is_installed() {
                return Err(SecurityError::NotRegistered);
            }
            let session = table.insert(self.new_session(peer, direction, requirement))?;
            session.start(&mut fx);
        }
        info!(
            "Starting {} pairing with {} as {:?}",
            requirement.transport, peer, direction
        );

        self.run_effects(fx);
        Ok(())
    }

    /// Cancel the pairing in progress with `peer`.
    ///
    /// A cancelled session never stores keys and reports through
    /// `bond_cancel_complete` only.
    pub fn cancel_bond(&self, peer: &PeerIdentity) -> SecurityResult<()> {
        let mut fx = Effects::default();
        {
            let mut table = self.table();
            let session = table
                .remove(peer)
                .ok_or(SecurityError::NoActiveSession(*peer))?;
            info!(
                "Pairing with {} in {:?}: {}",
                peer,
                session.state(),
                SecurityError::Aborted(AbortReason::Cancelled)
            );
            fx.send(
                *peer,
                SecurityCommand::CancelPairing {
                    transport: session.transport(),
                },
            );
            fx.push(Effect::BondCancelComplete(*peer, Ok(())));
        }

        self.run_effects(fx);
        Ok(())
    }

    /// Answer the prompt outstanding for `peer`
    pub fn respond(&self, peer: &PeerIdentity, response: Response) -> SecurityResult<()> {
        if let Response::Passkey(passkey) = response {
            check_passkey(passkey)?;
        }
        self.expect_prompt(peer)?;
        self.submit(Input::Reply {
            peer: *peer,
            reply: Some(response),
        });
        Ok(())
    }

    /// Reject the prompt outstanding for `peer`
    pub fn reject(&self, peer: &PeerIdentity) -> SecurityResult<()> {
        self.expect_prompt(peer)?;
        self.submit(Input::Reply {
            peer: *peer,
            reply: None,
        });
        Ok(())
    }

    fn expect_prompt(&self, peer: &PeerIdentity) -> SecurityResult<()> {
        self.table()
            .get(peer)
            .and_then(PairingSession::prompt)
            .map(|_| ())
            .ok_or(SecurityError::NoActiveSession(*peer))
    }

    /// Feed a classic pairing event from the controller
    pub fn handle_classic_event(&self, event: ClassicEvent) {
        self.submit(Input::Classic(event));
    }

    /// Feed an LE pairing event from SMP
    pub fn handle_le_event(&self, event: LeEvent) {
        self.submit(Input::Le(event));
    }

    /// Current state of the session with `peer`, if any
    pub fn session_state(&self, peer: &PeerIdentity) -> Option<SessionState> {
        self.table().get(peer).map(PairingSession::state)
    }

    pub fn active_sessions(&self) -> usize {
        self.table().len()
    }

    /// Abort sessions idle for longer than the configured pairing timeout
    pub fn process_timeouts(&self) -> usize {
        let mut fx = Effects::default();
        let expired = {
            let mut table = self.table();
            let expired = table.expired(Instant::now(), self.config.pairing_timeout);
            for peer in &expired {
                self.abort_session(&mut table, peer, SecurityError::ProtocolTimeout, true, &mut fx);
            }
            expired.len()
        };
        if expired > 0 {
            debug!("Timed out {} pairing session(s)", expired);
        }
        self.run_effects(fx);
        expired
    }

    /// Link encryption was switched on or off
    pub fn encryption_changed(&self, peer: &PeerIdentity, enabled: bool) {
        debug!("Encryption {} for {}", if enabled { "on" } else { "off" }, peer);
        self.table().link_mut(peer).encrypted = enabled;
    }

    /// The link to `peer` went away
    pub fn disconnected(&self, peer: &PeerIdentity) {
        let mut fx = Effects::default();
        {
            let mut table = self.table();
            self.abort_session(
                &mut table,
                peer,
                SecurityError::Aborted(AbortReason::Disconnected),
                false,
                &mut fx,
            );
            table.drop_link(peer);
        }
        self.run_effects(fx);
    }

    /// Set or clear trust in `service_id` for `peer`
    pub fn set_trusted(
        &self,
        peer: &PeerIdentity,
        service_id: u16,
        trusted: bool,
    ) -> SecurityResult<()> {
        let mut table = self.table();
        if trusted {
            table.trust.set(peer, service_id)
        } else {
            table.trust.clear(peer, service_id)
        }
    }

    pub fn is_trusted(&self, peer: &PeerIdentity, service_id: u16) -> SecurityResult<bool> {
        self.table().trust.is_trusted(peer, service_id)
    }

    /// Give `dst` the trusted services of `src`
    pub fn copy_trust(&self, src: &PeerIdentity, dst: &PeerIdentity) {
        self.table().trust.copy(src, dst);
    }

    pub fn trusted_services(&self, peer: &PeerIdentity) -> TrustedServiceMask {
        self.table().trust.mask(peer)
    }

    /// Security state of `peer` as seen by upper layers
    pub fn security_flags(&self, peer: &PeerIdentity) -> SecurityResult<SecurityFlags> {
        let bond = self.key_store.bond(peer)?;
        let link = self.table().link(peer);

        let mut flags = SecurityFlags::empty();
        if let Some(bond) = bond.filter(BondKeys::has_encryption_key) {
            flags |= SecurityFlags::KEY_KNOWN;
            flags.set(
                SecurityFlags::KEY_AUTHENTICATED,
                bond.security_level().is_authenticated(),
            );
        }
        flags.set(SecurityFlags::AUTHENTICATED, link.authenticated);
        flags.set(SecurityFlags::ENCRYPTED, link.encrypted);
        flags.set(SecurityFlags::AUTHORIZED, link.authorized);
        Ok(flags)
    }

    /// Decide whether `peer` may use `service_id`, asking the authorize
    /// callback when the service needs authorization and the peer is not
    /// trusted for it.
    pub fn check_service_access(
        &self,
        peer: &PeerIdentity,
        service_id: u16,
        requirement: ServiceRequirement,
    ) -> SecurityResult<AccessStatus> {
        let trusted = self.is_trusted(peer, service_id)?;
        let flags = self.security_flags(peer)?;

        if requirement.contains(ServiceRequirement::ENCRYPT)
            && !flags.contains(SecurityFlags::ENCRYPTED)
        {
            return Ok(AccessStatus::Denied(AccessDenial::NotEncrypted));
        }
        if requirement.contains(ServiceRequirement::AUTHENTICATE)
            && !flags.contains(SecurityFlags::AUTHENTICATED)
            && !flags.contains(SecurityFlags::KEY_KNOWN | SecurityFlags::ENCRYPTED)
        {
            return Ok(AccessStatus::Denied(AccessDenial::NotAuthenticated));
        }
        if requirement.contains(ServiceRequirement::MITM)
            && !flags.contains(SecurityFlags::KEY_AUTHENTICATED)
        {
            return Ok(AccessStatus::Denied(AccessDenial::MitmRequired));
        }
        if requirement.contains(ServiceRequirement::SECURE_CONNECTIONS) {
            let bond = self.key_store.bond(peer)?;
            if !bond.as_ref().map_or(false, uses_secure_connections) {
                return Ok(AccessStatus::Denied(AccessDenial::SecureConnectionsRequired));
            }
        }
        if !requirement.contains(ServiceRequirement::AUTHORIZE) || trusted {
            return Ok(AccessStatus::Granted);
        }

        match self.callbacks.authorize(peer, service_id) {
            Decision::Reply(Response::Authorize { remember }) => {
                self.grant(peer, service_id, remember)?;
                Ok(AccessStatus::Granted)
            }
            Decision::Reply(Response::Confirm) => {
                self.grant(peer, service_id, false)?;
                Ok(AccessStatus::Granted)
            }
            Decision::Reply(other) => {
                warn!("{}: {:?} is not an authorization answer", peer, other);
                Ok(AccessStatus::Denied(AccessDenial::NotAuthorized))
            }
            Decision::Reject => Ok(AccessStatus::Denied(AccessDenial::NotAuthorized)),
            Decision::Pending => Ok(AccessStatus::Pending),
        }
    }

    /// Deliver a deferred answer from the authorize callback
    pub fn authorize_reply(
        &self,
        peer: &PeerIdentity,
        service_id: u16,
        granted: bool,
        remember: bool,
    ) -> SecurityResult<AccessStatus> {
        if granted {
            self.grant(peer, service_id, remember)?;
            Ok(AccessStatus::Granted)
        } else {
            // Validate the id even when nothing changes
            self.is_trusted(peer, service_id)?;
            Ok(AccessStatus::Denied(AccessDenial::NotAuthorized))
        }
    }

    fn grant(&self, peer: &PeerIdentity, service_id: u16, remember: bool) -> SecurityResult<()> {
        let mut table = self.table();
        if remember {
            table.trust.set(peer, service_id)?;
        } else {
            table.trust.is_trusted(peer, service_id)?;
        }
        table.link_mut(peer).authorized = true;
        Ok(())
    }

    /// Forget every stored key; returns how many were removed
    pub fn delete_all_keys(&self) -> SecurityResult<usize> {
        let removed = self.key_store.delete_all()?;
        info!("Deleted {} stored key(s)", removed);
        Ok(removed)
    }

    /// Forget `peer`'s keys and trusted services
    pub fn remove_bond(&self, peer: &PeerIdentity) -> SecurityResult<usize> {
        let mut table = self.table();
        let removed = self.key_store.delete_peer(peer)?;
        table.trust.clear_all(peer);
        info!("Removed bond with {} ({} key(s))", peer, removed);
        Ok(removed)
    }

    /// Snapshot of what is persisted for `peer`
    pub fn export_bond(&self, peer: &PeerIdentity) -> SecurityResult<Option<BondRecord>> {
        let table = self.table();
        let trusted = table.trust.mask(peer);
        let keys = self.key_store.bond(peer)?.unwrap_or_default();
        if keys.is_empty() && trusted.is_empty() {
            return Ok(None);
        }
        Ok(Some(BondRecord::new(keys, trusted)))
    }

    /// Replace whatever is stored for `peer` with `record`
    pub fn import_bond(&self, peer: &PeerIdentity, record: BondRecord) -> SecurityResult<()> {
        let mut table = self.table();
        let keys: Vec<StoredKey> = KeyKind::ALL
            .iter()
            .filter_map(|kind| record.keys.get(*kind))
            .collect();
        self.key_store.delete_peer(peer)?;
        self.key_store.put_all(peer, keys)?;
        table.trust.restore(peer, record.trusted);
        debug!("Restored bond with {} at level {}", peer, record.security_level);
        Ok(())
    }

    fn submit(&self, input: Input) {
        {
            let mut inbox = self.inbox();
            inbox.queue.push_back(input);
            if inbox.draining {
                return;
            }
            inbox.draining = true;
        }
        self.drain();
    }

    /// Queue callback answers ahead of anything already waiting
    fn submit_urgent(&self, inputs: Vec<Input>) {
        if inputs.is_empty() {
            return;
        }
        {
            let mut inbox = self.inbox();
            for input in inputs.into_iter().rev() {
                inbox.queue.push_front(input);
            }
            if inbox.draining {
                return;
            }
            inbox.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        let _guard = DrainGuard(&self.inbox);
        loop {
            let input = {
                let mut inbox = self.inbox();
                match inbox.queue.pop_front() {
                    Some(input) => input,
                    None => {
                        inbox.draining = false;
                        return;
                    }
                }
            };
            self.process(input);
        }
    }

    fn process(&self, input: Input) {
        let mut fx = Effects::default();
        {
            let mut table = self.table();
            match input {
                Input::Classic(event) => self.on_classic_event(&mut table, event, &mut fx),
                Input::Le(event) => self.on_le_event(&mut table, event, &mut fx),
                Input::Reply { peer, reply } => match table.get_mut(&peer) {
                    Some(session) => {
                        let step = session.reply(reply, &mut fx);
                        self.finish_step(&mut table, &peer, step, &mut fx);
                    }
                    None => debug!("Dropping reply for {}: no pairing session", peer),
                },
                Input::TransportFailure(peer) => {
                    self.abort_session(
                        &mut table,
                        &peer,
                        SecurityError::Aborted(AbortReason::TransportFailure),
                        false,
                        &mut fx,
                    );
                }
            }
        }
        self.run_effects(fx);
    }

    /// Open a session for a peer that started pairing on its own
    fn accept_session(
        &self,
        table: &mut SessionTable,
        peer: PeerIdentity,
        direction: PairingDirection,
        transport: Transport,
    ) -> bool {
        if !self.callbacks.is_installed() {
            warn!("{} started {} pairing but no callbacks are installed", peer, transport);
            return false;
        }
        let requirement = self.config.requirement(transport);
        match table.insert(self.new_session(peer, direction, requirement)) {
            Ok(_) => {
                info!("{} started {} pairing", peer, transport);
                true
            }
            Err(error) => {
                warn!("{}", error);
                false
            }
        }
    }

    fn on_classic_event(&self, table: &mut SessionTable, event: ClassicEvent, fx: &mut Effects) {
        let Some(peer) = event.peer() else {
            if let ClassicEvent::LocalOobDataReady { data } = event {
                fx.push(Effect::AskSimplePairing(SimplePairingRequest::LocalOobReady { data }));
            }
            return;
        };

        if table.get(&peer).is_none() {
            if !event.opens_session() {
                debug!("Ignoring {:?}: no pairing session with {}", event, peer);
                return;
            }
            if !self.accept_session(table, peer, PairingDirection::Responder, Transport::Classic) {
                return;
            }
        }

        if let Some(session) = table.get_mut(&peer) {
            let step = session.handle_classic(&event, fx);
            self.finish_step(table, &peer, step, fx);
        }
    }

    fn on_le_event(&self, table: &mut SessionTable, event: LeEvent, fx: &mut Effects) {
        let Some(peer) = event.peer() else {
            if let LeEvent::ScLocalOobReady { data } = event {
                fx.push(Effect::NotifyLe(LeRequest::ScLocalOobReady { data }));
            }
            return;
        };

        if table.get(&peer).is_none() {
            if !event.opens_session() {
                debug!("Ignoring {:?}: no pairing session with {}", event, peer);
                return;
            }
            // A security request asks us to start pairing as initiator
            let direction = match event {
                LeEvent::SecurityRequest { .. } => PairingDirection::Initiator,
                _ => PairingDirection::Responder,
            };
            if !self.accept_session(table, peer, direction, Transport::Le) {
                return;
            }
        }

        if let Some(session) = table.get_mut(&peer) {
            let step = session.handle_le(&event, fx);
            self.finish_step(table, &peer, step, fx);
        }
    }

    /// Remove a session that ended and queue its completion
    fn finish_step(
        &self,
        table: &mut SessionTable,
        peer: &PeerIdentity,
        step: Step,
        fx: &mut Effects,
    ) {
        match step {
            Step::Continue => {}
            Step::Abort(error) => {
                if let Some(session) = table.remove(peer) {
                    warn!("Pairing with {} failed: {}", peer, error);
                    fx.push(Effect::AuthComplete(*peer, session.transport(), Err(error)));
                }
            }
            Step::Complete { level, keys } => {
                let Some(session) = table.remove(peer) else {
                    return;
                };
                let transport = session.transport();

                // Stored while the table is locked so a cancel cannot slip in between
                if session.info.requirement.auth.bonding() && !keys.is_empty() {
                    if let Err(error) = self.key_store.put_all(peer, keys.clone()) {
                        warn!("Could not store keys for {}: {}", peer, error);
                        fx.push(Effect::AuthComplete(*peer, transport, Err(error)));
                        return;
                    }
                }
                table.link_mut(peer).authenticated = true;

                for key in keys {
                    match key {
                        StoredKey::Link(link_key) => fx.push(Effect::LinkKey(*peer, link_key)),
                        other => fx.push(Effect::LeKey(*peer, other)),
                    }
                }
                info!("{} pairing with {} complete: {}", transport, peer, level);
                fx.push(Effect::AuthComplete(*peer, transport, Ok(level)));
            }
        }
    }

    /// Abort `peer`'s session, if any, with exactly one completion
    fn abort_session(
        &self,
        table: &mut SessionTable,
        peer: &PeerIdentity,
        error: SecurityError,
        notify_peer: bool,
        fx: &mut Effects,
    ) -> bool {
        let Some(session) = table.remove(peer) else {
            return false;
        };
        let transport = session.transport();
        info!("Aborting {} pairing with {}: {}", transport, peer, error);
        if notify_peer {
            fx.send(*peer, SecurityCommand::CancelPairing { transport });
        }
        fx.push(Effect::AuthComplete(*peer, transport, Err(error)));
        true
    }

    fn decision_input(peer: PeerIdentity, decision: Decision) -> Option<Input> {
        match decision {
            Decision::Reply(response) => Some(Input::Reply {
                peer,
                reply: Some(response),
            }),
            Decision::Reject => Some(Input::Reply { peer, reply: None }),
            Decision::Pending => None,
        }
    }

    fn run_effects(&self, fx: Effects) {
        let mut follow_ups = Vec::new();

        for effect in fx.0 {
            match effect {
                Effect::Send(peer, command) => {
                    trace!("{} <- {:?}", peer, command);
                    if let Err(error) = self.transport.send(&peer, command) {
                        warn!("Transport failed for {}: {}", peer, error);
                        follow_ups.push(Input::TransportFailure(peer));
                    }
                }
                Effect::AskSimplePairing(request) => {
                    let decision = self.callbacks.simple_pairing(&request);
                    if let Some(peer) = request.peer() {
                        follow_ups.extend(Self::decision_input(peer, decision));
                    }
                }
                Effect::AskLe(request) => {
                    let decision = self.callbacks.le_event(&request);
                    if let Some(peer) = request.peer() {
                        follow_ups.extend(Self::decision_input(peer, decision));
                    }
                }
                Effect::NotifyLe(request) => {
                    self.callbacks.le_event(&request);
                }
                Effect::AskPin(peer, min_16_digit) => {
                    let decision = self.callbacks.pin_request(&peer, min_16_digit);
                    follow_ups.extend(Self::decision_input(peer, decision));
                }
                Effect::LinkKey(peer, key) => self.callbacks.link_key(&peer, &key),
                Effect::LeKey(peer, key) => self.callbacks.le_key_update(&peer, &key),
                Effect::AuthComplete(peer, transport, result) => {
                    self.callbacks.auth_complete(&peer, transport, &result)
                }
                Effect::BondCancelComplete(peer, result) => {
                    self.callbacks.bond_cancel_complete(&peer, &result)
                }
            }
        }

        self.submit_urgent(follow_ups);
    }
}
