//! BR/EDR Secure Simple Pairing state machine
//!
//! The controller runs the cryptography; this module decides the association
//! model, relays prompts to the application and answers the controller.

use super::callbacks::{Response, SimplePairingRequest};
use super::constants::*;
use super::events::ClassicEvent;
use super::keys::{LinkKey, StoredKey};
use super::session::{Effect, Effects, Prompt, SessionInfo, Step};
use super::transport::SecurityCommand;
use super::types::*;
use crate::error::{AbortReason, SecurityError, SecurityResult};
use log::{debug, warn};

/// Pick the association model for a pairing.
///
/// MITM protection is required when either side asks for it. OOB data takes
/// precedence over the IO capabilities when present on either side.
pub fn select_association_model(
    local_io: IoCapability,
    remote_io: IoCapability,
    local_mitm: bool,
    remote_mitm: bool,
    oob_present: bool,
) -> SecurityResult<AssociationModel> {
    use IoCapability::*;

    if oob_present {
        return Ok(AssociationModel::OutOfBand);
    }
    if !(local_mitm || remote_mitm) {
        return Ok(AssociationModel::JustWorks);
    }

    match (local_io, remote_io) {
        (NoInputNoOutput | Unknown, _) | (_, NoInputNoOutput | Unknown) => {
            Err(SecurityError::InsufficientIoCapability)
        }
        (DisplayYesNo | KeyboardDisplay, DisplayYesNo | KeyboardDisplay) => {
            Ok(AssociationModel::NumericComparison)
        }
        (KeyboardOnly, _) | (_, KeyboardOnly) => Ok(AssociationModel::PasskeyEntry),
        (DisplayOnly, KeyboardDisplay) | (KeyboardDisplay, DisplayOnly) => {
            Ok(AssociationModel::PasskeyEntry)
        }
        // Neither side can enter a value and at most one can confirm one
        (DisplayOnly, DisplayOnly | DisplayYesNo) | (DisplayYesNo, DisplayOnly) => {
            Err(SecurityError::InsufficientIoCapability)
        }
    }
}

/// Map a failed HCI status onto the error reported to the application
pub(crate) fn hci_status_error(status: u8) -> SecurityError {
    match status {
        HCI_ERR_CONNECTION_TIMEOUT | HCI_ERR_LMP_RESPONSE_TIMEOUT => SecurityError::ProtocolTimeout,
        other => SecurityError::RemoteAuthFailure(other),
    }
}

/// Classic pairing states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassicState {
    Idle,
    IoCapExchange,
    /// Legacy pairing waiting for a PIN
    PinEntry,
    NumericConfirm,
    PasskeyEntry,
    OobExchange,
    JustWorks,
    KeyExchange,
    Complete,
    Aborted,
}

impl ClassicState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClassicState::Complete | ClassicState::Aborted)
    }

    fn for_model(model: AssociationModel) -> Self {
        match model {
            AssociationModel::JustWorks => ClassicState::JustWorks,
            AssociationModel::NumericComparison => ClassicState::NumericConfirm,
            AssociationModel::PasskeyEntry => ClassicState::PasskeyEntry,
            AssociationModel::OutOfBand => ClassicState::OobExchange,
        }
    }
}

/// What the peer told us in its IO capability response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RemoteIo {
    io_capability: IoCapability,
    oob_data_present: bool,
    auth: AuthRequirement,
}

#[derive(Debug)]
pub(crate) struct ClassicPairing {
    state: ClassicState,
    remote: Option<RemoteIo>,
    model: Option<AssociationModel>,
    prompt: Option<Prompt>,
    io_reply_sent: bool,
}

impl ClassicPairing {
    pub(crate) fn new() -> Self {
        Self {
            state: ClassicState::Idle,
            remote: None,
            model: None,
            prompt: None,
            io_reply_sent: false,
        }
    }

    pub(crate) fn state(&self) -> ClassicState {
        self.state
    }

    pub(crate) fn prompt(&self) -> Option<Prompt> {
        self.prompt
    }

    #[cfg(test)]
    pub(crate) fn model(&self) -> Option<AssociationModel> {
        self.model
    }

    pub(crate) fn start(&mut self, info: &SessionInfo, fx: &mut Effects) {
        if info.direction == PairingDirection::Initiator {
            fx.send(info.peer, SecurityCommand::AuthenticationRequested);
        }
    }

    fn abort(&mut self, error: SecurityError) -> Step {
        self.state = ClassicState::Aborted;
        self.prompt = None;
        Step::Abort(error)
    }

    fn unexpected(&self, info: &SessionInfo, event: &ClassicEvent) -> Step {
        warn!(
            "Ignoring {:?} for {} in state {:?}",
            event, info.peer, self.state
        );
        Step::Continue
    }

    /// Waiting on the application to answer a prompt
    fn awaiting_reply(&self) -> bool {
        matches!(self.prompt, Some(p) if p != Prompt::Notification)
    }

    pub(crate) fn handle_event(
        &mut self,
        info: &SessionInfo,
        event: &ClassicEvent,
        fx: &mut Effects,
    ) -> Step {
        if self.state.is_terminal() {
            return self.unexpected(info, event);
        }

        match *event {
            ClassicEvent::IoCapRequest { .. } => {
                if self.io_reply_sent || self.state == ClassicState::KeyExchange {
                    return self.unexpected(info, event);
                }
                fx.send(
                    info.peer,
                    SecurityCommand::IoCapabilityReply {
                        io_capability: info.local_io,
                        oob_data_present: info.requirement.oob_data_present,
                        auth_req: info
                            .requirement
                            .auth
                            .to_classic(info.direction == PairingDirection::Initiator),
                    },
                );
                self.io_reply_sent = true;
                if self.state == ClassicState::Idle {
                    self.state = ClassicState::IoCapExchange;
                }
                Step::Continue
            }

            ClassicEvent::IoCapResponse {
                io_capability,
                oob_data_present,
                auth_req,
                ..
            } => {
                if self.remote.is_some()
                    || !matches!(self.state, ClassicState::Idle | ClassicState::IoCapExchange)
                {
                    return self.unexpected(info, event);
                }
                let remote = RemoteIo {
                    io_capability,
                    oob_data_present,
                    auth: auth_req,
                };
                self.remote = Some(remote);

                let model = select_association_model(
                    info.local_io,
                    remote.io_capability,
                    info.requirement.auth.mitm(),
                    remote.auth.mitm(),
                    info.requirement.oob_data_present || remote.oob_data_present,
                );
                match model {
                    Ok(model) => {
                        debug!(
                            "{}: {} (local {}, remote {})",
                            info.peer, model, info.local_io, io_capability
                        );
                        self.model = Some(model);
                        self.state = ClassicState::for_model(model);
                        Step::Continue
                    }
                    Err(error) => self.abort(error),
                }
            }

            ClassicEvent::UserConfirmationRequest { numeric_value, .. } => {
                if !matches!(self.state, ClassicState::NumericConfirm | ClassicState::JustWorks)
                    || self.awaiting_reply()
                {
                    return self.unexpected(info, event);
                }
                if let Err(error) = check_passkey(numeric_value) {
                    fx.send(info.peer, SecurityCommand::UserConfirmationReply { accept: false });
                    return self.abort(error);
                }
                self.prompt = Some(Prompt::Confirm);
                fx.push(Effect::AskSimplePairing(SimplePairingRequest::Confirm {
                    peer: info.peer,
                    numeric_value,
                    just_works: self.model == Some(AssociationModel::JustWorks),
                    local_io: info.local_io,
                    remote_io: self
                        .remote
                        .map_or(IoCapability::Unknown, |remote| remote.io_capability),
                }));
                Step::Continue
            }

            ClassicEvent::UserPasskeyNotify { passkey, .. } => {
                if self.state != ClassicState::PasskeyEntry || self.awaiting_reply() {
                    return self.unexpected(info, event);
                }
                if let Err(error) = check_passkey(passkey) {
                    let transport = Transport::Classic;
                    fx.send(info.peer, SecurityCommand::CancelPairing { transport });
                    return self.abort(error);
                }
                self.prompt = Some(Prompt::Notification);
                self.state = ClassicState::KeyExchange;
                fx.push(Effect::AskSimplePairing(SimplePairingRequest::PasskeyNotify {
                    peer: info.peer,
                    passkey,
                }));
                Step::Continue
            }

            ClassicEvent::UserPasskeyRequest { .. } => {
                if self.state != ClassicState::PasskeyEntry || self.awaiting_reply() {
                    return self.unexpected(info, event);
                }
                self.prompt = Some(Prompt::Passkey);
                fx.push(Effect::AskSimplePairing(SimplePairingRequest::PasskeyRequest {
                    peer: info.peer,
                }));
                Step::Continue
            }

            ClassicEvent::RemoteOobDataRequest { .. } => {
                if self.state != ClassicState::OobExchange || self.awaiting_reply() {
                    return self.unexpected(info, event);
                }
                self.prompt = Some(Prompt::RemoteOob);
                fx.push(Effect::AskSimplePairing(SimplePairingRequest::RemoteOobRequest {
                    peer: info.peer,
                }));
                Step::Continue
            }

            ClassicEvent::PinCodeRequest { min_16_digit, .. } => {
                if !matches!(self.state, ClassicState::Idle | ClassicState::IoCapExchange) {
                    return self.unexpected(info, event);
                }
                self.state = ClassicState::PinEntry;
                self.prompt = Some(Prompt::Pin { min_16_digit });
                fx.push(Effect::AskPin(info.peer, min_16_digit));
                Step::Continue
            }

            ClassicEvent::LinkKeyNotification { ref key, .. } => {
                let ready = match self.state {
                    ClassicState::KeyExchange => true,
                    // Controllers may skip the confirmation for Just Works
                    ClassicState::JustWorks => self.prompt.is_none(),
                    _ => false,
                };
                if !ready {
                    return self.unexpected(info, event);
                }

                let key_type = if self.model == Some(AssociationModel::JustWorks) {
                    key.key_type.unauthenticated()
                } else {
                    key.key_type
                };
                let key = LinkKey::new(key.key, key_type);
                let level = key.security_level();

                self.state = ClassicState::Complete;
                self.prompt = None;
                Step::Complete {
                    level,
                    keys: vec![StoredKey::Link(key)],
                }
            }

            ClassicEvent::SimplePairingComplete { status, .. } => {
                if status != HCI_SUCCESS {
                    return self.abort(hci_status_error(status));
                }
                if matches!(
                    self.state,
                    ClassicState::NumericConfirm
                        | ClassicState::PasskeyEntry
                        | ClassicState::OobExchange
                        | ClassicState::JustWorks
                ) && !self.awaiting_reply()
                {
                    self.state = ClassicState::KeyExchange;
                }
                Step::Continue
            }

            ClassicEvent::AuthenticationComplete { status, .. } => {
                if status != HCI_SUCCESS {
                    return self.abort(hci_status_error(status));
                }
                debug!("{}: authentication complete, waiting for link key", info.peer);
                Step::Continue
            }

            ClassicEvent::LocalOobDataReady { .. } => self.unexpected(info, event),
        }
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

        match (prompt, reply) {
            (Prompt::Confirm, Some(Response::Confirm)) => {
                fx.send(info.peer, SecurityCommand::UserConfirmationReply { accept: true });
                self.state = ClassicState::KeyExchange;
                Step::Continue
            }
            (Prompt::Passkey, Some(Response::Passkey(passkey))) => match check_passkey(passkey) {
                Ok(passkey) => {
                    fx.send(
                        info.peer,
                        SecurityCommand::UserPasskeyReply {
                            passkey: Some(passkey),
                        },
                    );
                    self.state = ClassicState::KeyExchange;
                    Step::Continue
                }
                Err(error) => {
                    self.negative_reply(info, prompt, fx);
                    self.abort(error)
                }
            },
            (Prompt::RemoteOob, Some(Response::Oob(data))) => {
                fx.send(info.peer, SecurityCommand::RemoteOobDataReply { data: Some(data) });
                self.state = ClassicState::KeyExchange;
                Step::Continue
            }
            (Prompt::Pin { min_16_digit }, Some(Response::Pin(pin))) => {
                if min_16_digit && pin.len() < PIN_CODE_MAX_LEN {
                    warn!("{}: 16 digit PIN required, got {}", info.peer, pin.len());
                    self.negative_reply(info, prompt, fx);
                    return self.abort(SecurityError::Aborted(AbortReason::InvalidResponse));
                }
                fx.send(info.peer, SecurityCommand::PinCodeReply { pin: Some(pin) });
                self.state = ClassicState::KeyExchange;
                Step::Continue
            }
            (Prompt::Notification, Some(_)) => Step::Continue,
            (prompt, None) => {
                debug!("{}: {:?} rejected", info.peer, prompt);
                self.negative_reply(info, prompt, fx);
                self.abort(SecurityError::UserRejected)
            }
            (prompt, Some(other)) => {
                warn!("{}: {:?} is not an answer to {:?}", info.peer, other, prompt);
                self.negative_reply(info, prompt, fx);
                self.abort(SecurityError::Aborted(AbortReason::InvalidResponse))
            }
        }
    }

    fn negative_reply(&self, info: &SessionInfo, prompt: Prompt, fx: &mut Effects) {
        let command = match prompt {
            Prompt::Confirm => SecurityCommand::UserConfirmationReply { accept: false },
            Prompt::Passkey => SecurityCommand::UserPasskeyReply { passkey: None },
            Prompt::RemoteOob => SecurityCommand::RemoteOobDataReply { data: None },
            Prompt::Pin { .. } => SecurityCommand::PinCodeReply { pin: None },
            Prompt::Notification
            | Prompt::SecurityGrant
            | Prompt::TemporaryKey
            | Prompt::ScOob => SecurityCommand::CancelPairing {
                transport: Transport::Classic,
            },
        };
        fx.send(info.peer, command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::PeerIdentity;
    use crate::security::keys::LinkKeyType;

    fn info(local_io: IoCapability, auth: AuthRequirement) -> SessionInfo {
        SessionInfo {
            peer: PeerIdentity::public([1, 2, 3, 4, 5, 6]),
            direction: PairingDirection::Responder,
            local_io,
            requirement: PairingRequirement::classic(auth),
        }
    }

    fn io_response(
        info: &SessionInfo,
        io_capability: IoCapability,
        auth_req: AuthRequirement,
    ) -> ClassicEvent {
        ClassicEvent::IoCapResponse {
            peer: info.peer,
            io_capability,
            oob_data_present: false,
            auth_req,
        }
    }

    #[test]
    fn test_hci_status_mapping() {
        assert_eq!(hci_status_error(HCI_ERR_CONNECTION_TIMEOUT), SecurityError::ProtocolTimeout);
        assert_eq!(hci_status_error(HCI_ERR_LMP_RESPONSE_TIMEOUT), SecurityError::ProtocolTimeout);
        assert_eq!(
            hci_status_error(HCI_ERR_AUTH_FAILURE),
            SecurityError::RemoteAuthFailure(HCI_ERR_AUTH_FAILURE)
        );
    }

    #[test]
    fn test_numeric_comparison_flow() {
        let auth = AuthRequirement::MITM | AuthRequirement::BONDING;
        let info = info(IoCapability::DisplayYesNo, auth);
        let mut pairing = ClassicPairing::new();
        let mut fx = Effects::default();

        let request = ClassicEvent::IoCapRequest { peer: info.peer };
        let step = pairing.handle_event(&info, &request, &mut fx);
        assert_eq!(step, Step::Continue);
        assert_eq!(pairing.state(), ClassicState::IoCapExchange);

        let response = io_response(&info, IoCapability::KeyboardDisplay, AuthRequirement::MITM);
        pairing.handle_event(&info, &response, &mut fx);
        assert_eq!(pairing.state(), ClassicState::NumericConfirm);
        assert_eq!(pairing.model(), Some(AssociationModel::NumericComparison));

        pairing.handle_event(
            &info,
            &ClassicEvent::UserConfirmationRequest {
                peer: info.peer,
                numeric_value: 123_456,
            },
            &mut fx,
        );
        assert_eq!(pairing.prompt(), Some(Prompt::Confirm));

        pairing.handle_reply(&info, Some(Response::Confirm), &mut fx);
        assert_eq!(pairing.state(), ClassicState::KeyExchange);

        let step = pairing.handle_event(
            &info,
            &ClassicEvent::LinkKeyNotification {
                peer: info.peer,
                key: LinkKey::new([9; 16], LinkKeyType::AuthenticatedP256),
            },
            &mut fx,
        );
        match step {
            Step::Complete { level, keys } => {
                assert_eq!(level, SecurityLevel::Authenticated);
                assert_eq!(keys.len(), 1);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(pairing.state(), ClassicState::Complete);
    }

    #[test]
    fn test_just_works_key_is_downgraded() {
        let info = info(IoCapability::NoInputNoOutput, AuthRequirement::BONDING);
        let mut pairing = ClassicPairing::new();
        let mut fx = Effects::default();

        let response = io_response(&info, IoCapability::NoInputNoOutput, AuthRequirement::empty());
        pairing.handle_event(&info, &response, &mut fx);
        assert_eq!(pairing.state(), ClassicState::JustWorks);

        let step = pairing.handle_event(
            &info,
            &ClassicEvent::LinkKeyNotification {
                peer: info.peer,
                key: LinkKey::new([1; 16], LinkKeyType::AuthenticatedCombination),
            },
            &mut fx,
        );
        match step {
            Step::Complete { level, keys } => {
                assert_eq!(level, SecurityLevel::Unauthenticated);
                assert_eq!(
                    keys,
                    vec![StoredKey::Link(LinkKey::new(
                        [1; 16],
                        LinkKeyType::UnauthenticatedCombination
                    ))]
                );
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_passkey_reply_aborts() {
        let info = info(IoCapability::KeyboardOnly, AuthRequirement::MITM);
        let mut pairing = ClassicPairing::new();
        let mut fx = Effects::default();

        let response = io_response(&info, IoCapability::DisplayOnly, AuthRequirement::empty());
        pairing.handle_event(&info, &response, &mut fx);
        assert_eq!(pairing.state(), ClassicState::PasskeyEntry);
        pairing.handle_event(&info, &ClassicEvent::UserPasskeyRequest { peer: info.peer }, &mut fx);

        let step = pairing.handle_reply(&info, Some(Response::Passkey(1_000_000)), &mut fx);
        assert_eq!(step, Step::Abort(SecurityError::InvalidPasskey(1_000_000)));
        assert!(fx.0.iter().any(|effect| matches!(
            effect,
            Effect::Send(_, SecurityCommand::UserPasskeyReply { passkey: None })
        )));
    }

    #[test]
    fn test_short_pin_rejected_when_sixteen_digits_required() {
        let info = info(IoCapability::DisplayYesNo, AuthRequirement::BONDING);
        let mut pairing = ClassicPairing::new();
        let mut fx = Effects::default();

        pairing.handle_event(
            &info,
            &ClassicEvent::PinCodeRequest {
                peer: info.peer,
                min_16_digit: true,
            },
            &mut fx,
        );
        assert_eq!(pairing.state(), ClassicState::PinEntry);

        let pin = PinCode::new(b"0000").unwrap();
        let step = pairing.handle_reply(&info, Some(Response::Pin(pin)), &mut fx);
        assert_eq!(step, Step::Abort(SecurityError::Aborted(AbortReason::InvalidResponse)));
    }

    #[test]
    fn test_failed_simple_pairing_aborts() {
        let info = info(IoCapability::DisplayYesNo, AuthRequirement::empty());
        let mut pairing = ClassicPairing::new();
        let mut fx = Effects::default();

        let response = io_response(&info, IoCapability::DisplayYesNo, AuthRequirement::empty());
        pairing.handle_event(&info, &response, &mut fx);
        let step = pairing.handle_event(
            &info,
            &ClassicEvent::SimplePairingComplete {
                peer: info.peer,
                status: HCI_ERR_AUTH_FAILURE,
            },
            &mut fx,
        );
        assert_eq!(step, Step::Abort(SecurityError::RemoteAuthFailure(HCI_ERR_AUTH_FAILURE)));
        assert_eq!(pairing.state(), ClassicState::Aborted);
    }
}
