//! LE Security Manager bridge
//!
//! SMP runs the pairing protocol itself. This module relays its prompts to
//! the application, tracks which keys the two sides agreed to distribute and
//! buffers them until pairing completes, so a bond is stored whole or not at
//! all.

use super::callbacks::{LeRequest, Response};
use super::constants::*;
use super::events::{LePairingStatus, LeEvent};
use super::keys::StoredKey;
use super::session::{Effect, Effects, Prompt, SessionInfo, Step};
use super::transport::SecurityCommand;
use super::types::*;
use crate::error::{AbortReason, SecurityError};
use log::{debug, warn};

/// LE pairing states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeState {
    Idle,
    /// Features exchanged, waiting for SMP to pick a method
    IoReq,
    PasskeyNotify,
    PasskeyRequest,
    NumericCompare,
    OobRequest,
    ScOobRequest,
    KeyDistribution,
    Complete,
    Aborted,
}

impl LeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LeState::Complete | LeState::Aborted)
    }
}

#[derive(Debug)]
pub(crate) struct LePairing {
    state: LeState,
    local: LePairingFeatures,
    /// Refuse peers without Secure Connections
    secure_connections_only: bool,
    peer_features: Option<LePairingFeatures>,
    secure_connections: bool,
    mitm_achieved: bool,
    expected: LeKeyMask,
    delivered: LeKeyMask,
    keys: Vec<StoredKey>,
    prompt: Option<Prompt>,
}

impl LePairing {
    pub(crate) fn new(local: LePairingFeatures, secure_connections_only: bool) -> Self {
        Self {
            state: LeState::Idle,
            local,
            secure_connections_only,
            peer_features: None,
            secure_connections: false,
            mitm_achieved: false,
            expected: LeKeyMask::empty(),
            delivered: LeKeyMask::empty(),
            keys: Vec::new(),
            prompt: None,
        }
    }

    pub(crate) fn state(&self) -> LeState {
        self.state
    }

    pub(crate) fn prompt(&self) -> Option<Prompt> {
        self.prompt
    }

    /// Keys the peer and we agreed to distribute
    #[cfg(test)]
    pub(crate) fn expected_keys(&self) -> LeKeyMask {
        self.expected
    }

    pub(crate) fn start(&mut self, info: &SessionInfo, fx: &mut Effects) {
        if info.direction == PairingDirection::Initiator {
            fx.send(info.peer, SecurityCommand::LePair);
        }
    }

    fn abort(&mut self, error: SecurityError) -> Step {
        self.state = LeState::Aborted;
        self.prompt = None;
        self.keys.clear();
        Step::Abort(error)
    }

    /// Send Pairing Failed and abort
    fn fail(
        &mut self,
        info: &SessionInfo,
        reason: u8,
        error: SecurityError,
        fx: &mut Effects,
    ) -> Step {
        fx.send(info.peer, SecurityCommand::LePairingFailed { reason });
        self.abort(error)
    }

    fn unexpected(&self, info: &SessionInfo, event: &LeEvent) -> Step {
        warn!("Ignoring {:?} for {} in state {:?}", event, info.peer, self.state);
        Step::Continue
    }

    /// Key distribution each side sends, from the initiator/responder masks
    fn set_expected(
        &mut self,
        direction: PairingDirection,
        init: KeyDistribution,
        resp: KeyDistribution,
    ) {
        self.expected = match direction {
            PairingDirection::Initiator => LeKeyMask::expected(resp, init),
            PairingDirection::Responder => LeKeyMask::expected(init, resp),
        };
    }

    fn apply_peer_features(
        &mut self,
        info: &SessionInfo,
        features: LePairingFeatures,
    ) -> Result<(), SecurityError> {
        if self.secure_connections_only && !features.auth_req.secure_connections() {
            return Err(SecurityError::SecureConnectionsRequired);
        }
        self.secure_connections =
            self.local.auth_req.secure_connections() && features.auth_req.secure_connections();
        self.set_expected(
            info.direction,
            self.local.init_keys & features.init_keys,
            self.local.resp_keys & features.resp_keys,
        );
        debug!(
            "{}: peer {} features, expecting keys {:?}",
            info.peer, features.io_capability, self.expected
        );
        self.peer_features = Some(features);
        Ok(())
    }

    /// Enter a user-interaction state; only valid right after the feature exchange
    fn ask(
        &mut self,
        info: &SessionInfo,
        event: &LeEvent,
        state: LeState,
        prompt: Prompt,
        request: LeRequest,
        fx: &mut Effects,
    ) -> Step {
        if self.state != LeState::IoReq {
            return self.unexpected(info, event);
        }
        self.state = state;
        self.prompt = Some(prompt);
        fx.push(Effect::AskLe(request));
        Step::Continue
    }

    pub(crate) fn handle_event(
        &mut self,
        info: &SessionInfo,
        event: &LeEvent,
        fx: &mut Effects,
    ) -> Step {
        if self.state.is_terminal() {
            return self.unexpected(info, event);
        }
        let peer = info.peer;

        match *event {
            LeEvent::SecurityRequest { auth_req, .. } => {
                if self.state != LeState::Idle || self.prompt.is_some() {
                    return self.unexpected(info, event);
                }
                if self.secure_connections_only && !auth_req.secure_connections() {
                    return self.fail(
                        info,
                        SMP_REASON_AUTHENTICATION_REQUIREMENTS,
                        SecurityError::SecureConnectionsRequired,
                        fx,
                    );
                }
                self.prompt = Some(Prompt::SecurityGrant);
                fx.push(Effect::AskLe(LeRequest::SecurityRequest { peer, auth_req }));
                Step::Continue
            }

            LeEvent::IoCapRequest { peer_features, .. } => {
                if self.state != LeState::Idle {
                    return self.unexpected(info, event);
                }
                self.prompt = None;
                self.set_expected(info.direction, self.local.init_keys, self.local.resp_keys);
                if let Some(features) = peer_features {
                    if let Err(error) = self.apply_peer_features(info, features) {
                        let reason = SMP_REASON_AUTHENTICATION_REQUIREMENTS;
                        return self.fail(info, reason, error, fx);
                    }
                }
                self.state = LeState::IoReq;
                fx.send(peer, SecurityCommand::LeIoCapabilityReply { features: self.local });
                Step::Continue
            }

            LeEvent::PeerFeatures { features, .. } => {
                if self.state != LeState::IoReq || self.peer_features.is_some() {
                    return self.unexpected(info, event);
                }
                match self.apply_peer_features(info, features) {
                    Ok(()) => Step::Continue,
                    Err(error) => {
                        self.fail(info, SMP_REASON_AUTHENTICATION_REQUIREMENTS, error, fx)
                    }
                }
            }

            LeEvent::PasskeyNotify { passkey, .. } => {
                if let Err(error) = check_passkey(passkey) {
                    return self.fail(info, SMP_REASON_PASSKEY_ENTRY_FAILED, error, fx);
                }
                let step = self.ask(
                    info,
                    event,
                    LeState::PasskeyNotify,
                    Prompt::Notification,
                    LeRequest::PasskeyNotify { peer, passkey },
                    fx,
                );
                if self.state == LeState::PasskeyNotify {
                    self.mitm_achieved = true;
                }
                step
            }

            LeEvent::PasskeyRequest { .. } => self.ask(
                info,
                event,
                LeState::PasskeyRequest,
                Prompt::Passkey,
                LeRequest::PasskeyRequest { peer },
                fx,
            ),

            LeEvent::NumericCompareRequest { value, .. } => {
                if let Err(error) = check_passkey(value) {
                    return self.fail(info, SMP_REASON_NUMERIC_COMPARISON_FAILED, error, fx);
                }
                let step = self.ask(
                    info,
                    event,
                    LeState::NumericCompare,
                    Prompt::Confirm,
                    LeRequest::NumericCompare { peer, value },
                    fx,
                );
                // Numeric comparison only exists in Secure Connections
                if self.state == LeState::NumericCompare {
                    self.secure_connections = true;
                }
                step
            }

            LeEvent::OobRequest { .. } => self.ask(
                info,
                event,
                LeState::OobRequest,
                Prompt::TemporaryKey,
                LeRequest::OobRequest { peer },
                fx,
            ),

            LeEvent::ScOobRequest { .. } => {
                let step = self.ask(
                    info,
                    event,
                    LeState::ScOobRequest,
                    Prompt::ScOob,
                    LeRequest::ScOobRequest { peer },
                    fx,
                );
                if self.state == LeState::ScOobRequest {
                    self.secure_connections = true;
                }
                step
            }

            LeEvent::KeypressNotify { notification, .. } => {
                fx.push(Effect::NotifyLe(LeRequest::Keypress { peer, notification }));
                Step::Continue
            }

            LeEvent::KeyDistributionUpdate { ref key, .. } => {
                if self.state == LeState::Idle || self.awaiting_reply() {
                    return self.unexpected(info, event);
                }
                match key.kind().le_mask() {
                    Some(bit) if self.expected.contains(bit) && !self.delivered.contains(bit) => {
                        debug!("{}: received {:?}", peer, key.kind());
                        self.delivered |= bit;
                        self.keys.push(key.clone());
                        self.prompt = None;
                        self.state = LeState::KeyDistribution;
                        Step::Continue
                    }
                    _ => {
                        warn!(
                            "{}: {:?} not in expected set {:?} (delivered {:?})",
                            peer,
                            key.kind(),
                            self.expected,
                            self.delivered
                        );
                        self.fail(
                            info,
                            SMP_REASON_INVALID_PARAMETERS,
                            SecurityError::Aborted(AbortReason::UnexpectedKey),
                            fx,
                        )
                    }
                }
            }

            LeEvent::Complete { status, .. } => match status {
                LePairingStatus::Success => {
                    // No feature exchange yet, or a prompt is still unanswered
                    if self.state == LeState::Idle || self.awaiting_reply() {
                        warn!("{}: pairing completed in state {:?}", peer, self.state);
                        return self.abort(SecurityError::Aborted(
                            AbortReason::KeyDistributionIncomplete,
                        ));
                    }
                    if self.secure_connections_only && !self.secure_connections {
                        return self.fail(
                            info,
                            SMP_REASON_AUTHENTICATION_REQUIREMENTS,
                            SecurityError::SecureConnectionsRequired,
                            fx,
                        );
                    }
                    if self.delivered != self.expected {
                        warn!(
                            "{}: pairing completed with keys {:?}, expected {:?}",
                            peer, self.delivered, self.expected
                        );
                        return self.abort(SecurityError::Aborted(
                            AbortReason::KeyDistributionIncomplete,
                        ));
                    }
                    let level =
                        SecurityLevel::from_le_pairing(self.mitm_achieved, self.secure_connections);
                    let mut keys = std::mem::take(&mut self.keys);
                    for key in &mut keys {
                        key.set_security_level(level);
                    }
                    self.state = LeState::Complete;
                    self.prompt = None;
                    Step::Complete { level, keys }
                }
                LePairingStatus::Failed(reason) => {
                    self.abort(SecurityError::RemoteAuthFailure(reason))
                }
                LePairingStatus::Timeout => self.abort(SecurityError::ProtocolTimeout),
            },

            LeEvent::ScLocalOobReady { .. } => self.unexpected(info, event),
        }
    }

    fn awaiting_reply(&self) -> bool {
        matches!(self.prompt, Some(p) if p != Prompt::Notification)
    }

    /// Answer to the outstanding prompt; `None` is a rejection
    pub(crate) fn handle_reply(
        &mut self,
        info: &SessionInfo,
        reply: Option<Response>,
        fx: &mut Effects,
    ) -> Step {
        let Some(prompt) = self.prompt.take() else {
            debug!("{}: no prompt outstanding, dropping reply", info.peer);
            return Step::Continue;
        };
        let peer = info.peer;

        match (prompt, reply) {
            (Prompt::SecurityGrant, Some(Response::Confirm)) => {
                fx.send(peer, SecurityCommand::LeSecurityGrant { granted: true });
                Step::Continue
            }
            (Prompt::Passkey, Some(Response::Passkey(passkey))) => match check_passkey(passkey) {
                Ok(passkey) => {
                    fx.send(peer, SecurityCommand::LePasskeyReply { passkey: Some(passkey) });
                    self.mitm_achieved = true;
                    Step::Continue
                }
                Err(error) => {
                    self.negative_reply(info, prompt, fx);
                    self.abort(error)
                }
            },
            (Prompt::Confirm, Some(Response::Confirm)) => {
                fx.send(peer, SecurityCommand::LeConfirmReply { accept: true });
                self.mitm_achieved = true;
                Step::Continue
            }
            (Prompt::TemporaryKey, Some(Response::TemporaryKey(tk))) => {
                fx.send(peer, SecurityCommand::LeOobReply { tk: Some(tk) });
                self.mitm_achieved = true;
                Step::Continue
            }
            (Prompt::ScOob, Some(Response::Oob(data))) => {
                fx.send(peer, SecurityCommand::LeScOobReply { data: Some(data) });
                self.mitm_achieved = true;
                Step::Continue
            }
            (Prompt::Notification, Some(_)) => Step::Continue,
            (prompt, None) => {
                debug!("{}: {:?} rejected", peer, prompt);
                self.negative_reply(info, prompt, fx);
                self.abort(SecurityError::UserRejected)
            }
            (prompt, Some(other)) => {
                warn!("{}: {:?} is not an answer to {:?}", peer, other, prompt);
                self.negative_reply(info, prompt, fx);
                self.abort(SecurityError::Aborted(AbortReason::InvalidResponse))
            }
        }
    }

    fn negative_reply(&self, info: &SessionInfo, prompt: Prompt, fx: &mut Effects) {
        let command = match prompt {
            Prompt::SecurityGrant => SecurityCommand::LeSecurityGrant { granted: false },
            Prompt::Passkey => SecurityCommand::LePasskeyReply { passkey: None },
            Prompt::Confirm => SecurityCommand::LeConfirmReply { accept: false },
            Prompt::TemporaryKey => SecurityCommand::LeOobReply { tk: None },
            Prompt::ScOob => SecurityCommand::LeScOobReply { data: None },
            Prompt::Notification | Prompt::RemoteOob | Prompt::Pin { .. } => {
                SecurityCommand::LePairingFailed {
                    reason: SMP_REASON_PASSKEY_ENTRY_FAILED,
                }
            }
        };
        fx.send(info.peer, command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::{AddressType, BdAddr, PeerIdentity};
    use crate::security::keys::*;

    fn info(direction: PairingDirection) -> SessionInfo {
        SessionInfo {
            peer: PeerIdentity::public([0xC0, 0, 0, 0, 0, 1]),
            direction,
            local_io: IoCapability::KeyboardDisplay,
            requirement: PairingRequirement::le(AuthRequirement::BONDING),
        }
    }

    fn local_features() -> LePairingFeatures {
        LePairingFeatures {
            io_capability: IoCapability::KeyboardDisplay,
            auth_req: AuthRequirement::BONDING | AuthRequirement::SECURE_CONNECTIONS,
            ..LePairingFeatures::default()
        }
    }

    fn peer_ltk() -> StoredKey {
        StoredKey::PeerEncryption(PeerEncryptionKey {
            ltk: [7; 16],
            rand: [0; 8],
            ediv: 0,
            security_level: SecurityLevel::None,
            key_size: 16,
        })
    }

    fn peer_irk() -> StoredKey {
        StoredKey::PeerIdentity(PeerIdentityKey {
            irk: [8; 16],
            identity_address_type: AddressType::Public,
            identity_address: BdAddr::new([1, 2, 3, 4, 5, 6]),
        })
    }

    fn io_request(info: &SessionInfo, peer_features: Option<LePairingFeatures>) -> LeEvent {
        LeEvent::IoCapRequest {
            peer: info.peer,
            peer_features,
        }
    }

    fn key_update(info: &SessionInfo, key: StoredKey) -> LeEvent {
        LeEvent::KeyDistributionUpdate {
            peer: info.peer,
            key,
        }
    }

    fn complete(info: &SessionInfo) -> LeEvent {
        LeEvent::Complete {
            peer: info.peer,
            status: LePairingStatus::Success,
        }
    }

    #[test]
    fn test_expected_keys_follow_direction() {
        let mut fx = Effects::default();
        let peer = LePairingFeatures {
            auth_req: AuthRequirement::BONDING | AuthRequirement::SECURE_CONNECTIONS,
            init_keys: KeyDistribution::ID,
            resp_keys: KeyDistribution::ENC | KeyDistribution::ID,
            ..LePairingFeatures::default()
        };

        let initiator = info(PairingDirection::Initiator);
        let mut pairing = LePairing::new(local_features(), false);
        pairing.handle_event(&initiator, &io_request(&initiator, None), &mut fx);
        pairing.handle_event(
            &initiator,
            &LeEvent::PeerFeatures {
                peer: initiator.peer,
                features: peer,
            },
            &mut fx,
        );
        assert_eq!(pairing.expected_keys(), LeKeyMask::PENC | LeKeyMask::PID);

        let responder = info(PairingDirection::Responder);
        let mut pairing = LePairing::new(local_features(), false);
        pairing.handle_event(&responder, &io_request(&responder, Some(peer)), &mut fx);
        assert_eq!(pairing.expected_keys(), LeKeyMask::PID | LeKeyMask::LENC);
    }

    #[test]
    fn test_duplicate_key_aborts() {
        let info = info(PairingDirection::Initiator);
        let mut fx = Effects::default();
        let mut pairing = LePairing::new(local_features(), false);
        pairing.handle_event(&info, &io_request(&info, None), &mut fx);

        let first = pairing.handle_event(&info, &key_update(&info, peer_ltk()), &mut fx);
        assert_eq!(first, Step::Continue);
        assert_eq!(pairing.state(), LeState::KeyDistribution);

        let second = pairing.handle_event(&info, &key_update(&info, peer_ltk()), &mut fx);
        assert_eq!(
            second,
            Step::Abort(SecurityError::Aborted(AbortReason::UnexpectedKey))
        );
    }

    #[test]
    fn test_incomplete_distribution_aborts() {
        let info = info(PairingDirection::Initiator);
        let mut fx = Effects::default();
        let mut pairing = LePairing::new(local_features(), false);
        pairing.handle_event(&info, &io_request(&info, None), &mut fx);
        pairing.handle_event(&info, &key_update(&info, peer_irk()), &mut fx);

        let step = pairing.handle_event(&info, &complete(&info), &mut fx);
        assert_eq!(
            step,
            Step::Abort(SecurityError::Aborted(AbortReason::KeyDistributionIncomplete))
        );
    }

    #[test]
    fn test_completion_before_feature_exchange_aborts() {
        let info = info(PairingDirection::Initiator);
        let mut fx = Effects::default();
        let mut pairing = LePairing::new(local_features(), false);
        pairing.start(&info, &mut fx);

        let step = pairing.handle_event(&info, &complete(&info), &mut fx);
        assert_eq!(
            step,
            Step::Abort(SecurityError::Aborted(AbortReason::KeyDistributionIncomplete))
        );
        assert_eq!(pairing.state(), LeState::Aborted);
    }

    #[test]
    fn test_completion_with_unanswered_prompt_aborts() {
        let info = info(PairingDirection::Responder);
        let mut fx = Effects::default();
        let mut local = local_features();
        local.init_keys = KeyDistribution::empty();
        local.resp_keys = KeyDistribution::empty();
        let mut pairing = LePairing::new(local, false);

        pairing.handle_event(&info, &io_request(&info, None), &mut fx);
        pairing.handle_event(&info, &LeEvent::PasskeyRequest { peer: info.peer }, &mut fx);

        let step = pairing.handle_event(&info, &complete(&info), &mut fx);
        assert_eq!(
            step,
            Step::Abort(SecurityError::Aborted(AbortReason::KeyDistributionIncomplete))
        );
    }

    #[test]
    fn test_secure_connections_only_rejects_legacy_completion() {
        let info = info(PairingDirection::Initiator);
        let mut fx = Effects::default();
        let mut local = local_features();
        local.init_keys = KeyDistribution::empty();
        local.resp_keys = KeyDistribution::ENC;
        let mut pairing = LePairing::new(local, true);

        pairing.handle_event(&info, &io_request(&info, None), &mut fx);
        pairing.handle_event(&info, &LeEvent::PasskeyRequest { peer: info.peer }, &mut fx);
        pairing.handle_reply(&info, Some(Response::Passkey(123_456)), &mut fx);
        pairing.handle_event(&info, &key_update(&info, peer_ltk()), &mut fx);

        let step = pairing.handle_event(&info, &complete(&info), &mut fx);
        assert_eq!(step, Step::Abort(SecurityError::SecureConnectionsRequired));
        assert!(fx.0.iter().any(|effect| matches!(
            effect,
            Effect::Send(
                _,
                SecurityCommand::LePairingFailed {
                    reason: SMP_REASON_AUTHENTICATION_REQUIREMENTS
                }
            )
        )));
    }

    #[test]
    fn test_numeric_comparison_is_authenticated() {
        let info = info(PairingDirection::Responder);
        let mut fx = Effects::default();
        let mut local = local_features();
        local.init_keys = KeyDistribution::empty();
        local.resp_keys = KeyDistribution::empty();
        let mut pairing = LePairing::new(local, true);

        pairing.handle_event(&info, &io_request(&info, None), &mut fx);
        pairing.handle_event(
            &info,
            &LeEvent::NumericCompareRequest {
                peer: info.peer,
                value: 42,
            },
            &mut fx,
        );
        assert_eq!(pairing.state(), LeState::NumericCompare);
        pairing.handle_reply(&info, Some(Response::Confirm), &mut fx);

        let step = pairing.handle_event(&info, &complete(&info), &mut fx);
        assert_eq!(
            step,
            Step::Complete {
                level: SecurityLevel::Authenticated,
                keys: Vec::new()
            }
        );
    }

    #[test]
    fn test_timeout_maps_to_protocol_timeout() {
        let info = info(PairingDirection::Initiator);
        let mut fx = Effects::default();
        let mut pairing = LePairing::new(local_features(), false);
        let step = pairing.handle_event(
            &info,
            &LeEvent::Complete {
                peer: info.peer,
                status: LePairingStatus::Timeout,
            },
            &mut fx,
        );
        assert_eq!(step, Step::Abort(SecurityError::ProtocolTimeout));
        assert_eq!(pairing.state(), LeState::Aborted);
    }
}
