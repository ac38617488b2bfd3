//! Registration state machine
//!
//! [`RegistrationController`] owns the single in-flight registration and the
//! single in-flight unregistration. It performs no I/O: every input returns a
//! list of [`Effect`]s that the event loop carries out. That keeps the
//! exactly-once guarantee checkable without threads, timers or mocks.
//!
//! ```text
//! Idle --register--> Pending(AwaitingDeviceToken)
//! Pending(AwaitingDeviceToken) --device token--> Pending(CompletingWithHub)
//! Pending(AwaitingDeviceToken) --OS failure--> Idle           (Error: OsRegistrationFailed)
//! Pending(CompletingWithHub) --hub ok--> Idle                  (Success)
//! Pending(CompletingWithHub) --hub error--> Idle               (Error: BackendRegistrationFailed)
//! Pending(_) --timeout--> Idle                                 (Error: Timeout)
//! Pending(_) --register, RejectBusy--> unchanged               (new caller: Busy)
//! Pending(_) --register, Supersede--> Pending(new caller)      (old caller: Superseded)
//! ```

use std::time::{Duration, Instant};

use hub_transport::{CallerId, ErrorKind, OutboundMessage, Outcome, RegistrationInfo, RequestKind};
use tracing::{debug, info, warn};

use crate::backend::BackendError;
use crate::config::{BridgeConfig, ConcurrencyPolicy, ConnectionConfig};
use crate::event::AttemptId;
use crate::os::{DeviceToken, OsError};

/// Where a pending registration is waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingPhase {
    /// The OS has been asked for a device token
    AwaitingDeviceToken,
    /// The token is with the hub backend
    CompletingWithHub,
}

/// Observable state of the registration slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    Pending {
        caller_id: CallerId,
        phase: PendingPhase,
    },
}

impl RegistrationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RegistrationState::Idle)
    }

    /// Caller currently holding the slot
    pub fn caller_id(&self) -> Option<&CallerId> {
        match self {
            RegistrationState::Idle => None,
            RegistrationState::Pending { caller_id, .. } => Some(caller_id),
        }
    }
}

/// Work the event loop must carry out on the controller's behalf
#[derive(Debug)]
pub enum Effect {
    /// Hand a message to the host transport
    Deliver(OutboundMessage),
    /// Ask the OS for a device token
    RequestDeviceToken,
    /// Register the token with the hub backend
    CompleteRegistration {
        attempt: AttemptId,
        device_token: DeviceToken,
        connection: ConnectionConfig,
    },
    /// Remove the registration from the hub backend
    Unregister {
        attempt: AttemptId,
        connection: ConnectionConfig,
    },
}

#[derive(Debug)]
struct PendingRegistration {
    attempt: AttemptId,
    caller_id: CallerId,
    connection: ConnectionConfig,
    requested_at: Instant,
    phase: PendingPhase,
}

#[derive(Debug)]
struct PendingUnregistration {
    attempt: AttemptId,
    caller_id: CallerId,
    connection: ConnectionConfig,
    requested_at: Instant,
}

/// Single-slot registration state machine
#[derive(Debug)]
pub struct RegistrationController {
    policy: ConcurrencyPolicy,
    pending_timeout: Option<Duration>,
    registration: Option<PendingRegistration>,
    unregistration: Option<PendingUnregistration>,
    /// Connection of the last successful registration, used to unregister
    registered_connection: Option<ConnectionConfig>,
    next_attempt: u64,
    unmatched_callbacks: u64,
}

impl RegistrationController {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            policy: config.concurrency_policy,
            pending_timeout: config.pending_timeout,
            registration: None,
            unregistration: None,
            registered_connection: None,
            next_attempt: 1,
            unmatched_callbacks: 0,
        }
    }

    /// Start a registration for `caller_id`, or resolve the conflict with a
    /// pending one according to the concurrency policy.
    pub fn register_application(
        &mut self,
        caller_id: CallerId,
        connection: ConnectionConfig,
        now: Instant,
    ) -> Vec<Effect> {
        let Some(pending) = self.registration.take() else {
            let attempt = self.next_attempt_id();
            debug!(
                "Registration {} for {} on hub {}: requesting device token",
                attempt,
                caller_id,
                connection.hub_path()
            );
            self.registration = Some(PendingRegistration {
                attempt,
                caller_id,
                connection,
                requested_at: now,
                phase: PendingPhase::AwaitingDeviceToken,
            });
            return vec![Effect::RequestDeviceToken];
        };

        match self.policy {
            ConcurrencyPolicy::RejectBusy => {
                debug!(
                    "Registration for {} rejected: {} is still pending",
                    caller_id, pending.caller_id
                );
                self.registration = Some(pending);
                vec![register_result(caller_id, Outcome::Busy)]
            }
            ConcurrencyPolicy::Supersede => {
                let attempt = self.next_attempt_id();
                debug!(
                    "Registration {} for {} supersedes {} ({:?})",
                    attempt, caller_id, pending.caller_id, pending.phase
                );

                let mut effects = vec![register_result(pending.caller_id, Outcome::Superseded)];
                // A token already handed to the hub belongs to the old attempt.
                if pending.phase == PendingPhase::CompletingWithHub {
                    effects.push(Effect::RequestDeviceToken);
                }

                self.registration = Some(PendingRegistration {
                    attempt,
                    caller_id,
                    connection,
                    requested_at: now,
                    phase: PendingPhase::AwaitingDeviceToken,
                });
                effects
            }
        }
    }

    /// The OS produced a device token.
    pub fn on_registration_succeeded(&mut self, device_token: DeviceToken) -> Vec<Effect> {
        match self.registration.as_mut() {
            Some(pending) if pending.phase == PendingPhase::AwaitingDeviceToken => {
                debug!(
                    "Registration {} for {}: device token received, completing with hub",
                    pending.attempt, pending.caller_id
                );
                pending.phase = PendingPhase::CompletingWithHub;
                vec![Effect::CompleteRegistration {
                    attempt: pending.attempt,
                    device_token,
                    connection: pending.connection.clone(),
                }]
            }
            Some(pending) => {
                let what = format!(
                    "device token while {} is already completing with hub",
                    pending.attempt
                );
                self.record_unmatched(&what);
                Vec::new()
            }
            None => {
                self.record_unmatched("device token with no pending registration");
                Vec::new()
            }
        }
    }

    /// The OS failed to register for remote notifications.
    pub fn on_registration_failed(&mut self, error: OsError) -> Vec<Effect> {
        let awaiting = matches!(
            &self.registration,
            Some(pending) if pending.phase == PendingPhase::AwaitingDeviceToken
        );
        if !awaiting {
            self.record_unmatched(&format!("registration failure ({error})"));
            return Vec::new();
        }

        let Some(pending) = self.registration.take() else {
            return Vec::new();
        };

        let message = match error.code {
            Some(code) => format!("{} (code {})", error.message, code),
            None => error.message,
        };
        info!(
            "Registration {} for {} failed in the OS: {}",
            pending.attempt, pending.caller_id, message
        );
        vec![register_result(
            pending.caller_id,
            Outcome::error(ErrorKind::OsRegistrationFailed, message),
        )]
    }

    /// The hub backend finished a registration call.
    pub fn on_registration_completed(
        &mut self,
        attempt: AttemptId,
        result: Result<RegistrationInfo, BackendError>,
    ) -> Vec<Effect> {
        let current = matches!(
            &self.registration,
            Some(pending)
                if pending.attempt == attempt && pending.phase == PendingPhase::CompletingWithHub
        );
        if !current {
            self.record_unmatched(&format!("hub completion for stale {attempt}"));
            return Vec::new();
        }

        let Some(pending) = self.registration.take() else {
            return Vec::new();
        };

        let outcome = match result {
            Ok(info) => {
                info!(
                    "Registration {} for {} succeeded: {}",
                    attempt, pending.caller_id, info.registration_id
                );
                self.registered_connection = Some(pending.connection);
                Outcome::Success(Some(info))
            }
            Err(e) => {
                info!(
                    "Registration {} for {} rejected by hub: {}",
                    attempt, pending.caller_id, e
                );
                Outcome::error(ErrorKind::BackendRegistrationFailed, e.to_string())
            }
        };
        vec![register_result(pending.caller_id, outcome)]
    }

    /// Start an unregistration against `connection`, or against the last
    /// registered connection when the caller passes none.
    pub fn unregister_application(
        &mut self,
        caller_id: CallerId,
        connection: Option<ConnectionConfig>,
        now: Instant,
    ) -> Vec<Effect> {
        if let Some(pending) = self.unregistration.as_ref() {
            match self.policy {
                ConcurrencyPolicy::RejectBusy => {
                    debug!(
                        "Unregistration for {} rejected: {} is still pending",
                        caller_id, pending.caller_id
                    );
                    return vec![unregister_result(caller_id, Outcome::Busy)];
                }
                ConcurrencyPolicy::Supersede => {
                    let same_target = connection
                        .as_ref()
                        .map_or(true, |c| *c == pending.connection);
                    if same_target {
                        // The hub call in flight answers the newest caller.
                        return self.take_over_unregistration(caller_id, now);
                    }
                }
            }
        }

        let Some(connection) = connection.or_else(|| self.registered_connection.clone()) else {
            debug!("Unregistration for {} rejected: nothing registered", caller_id);
            return vec![unregister_result(
                caller_id,
                Outcome::error(ErrorKind::NotRegistered, "no hub registration to unregister"),
            )];
        };

        let attempt = self.next_attempt_id();
        debug!(
            "Unregistration {} for {} on hub {}",
            attempt,
            caller_id,
            connection.hub_path()
        );

        let mut effects = Vec::new();
        if let Some(previous) = self.unregistration.take() {
            debug!(
                "Unregistration for {} supersedes {} on another hub",
                caller_id, previous.caller_id
            );
            effects.push(unregister_result(previous.caller_id, Outcome::Superseded));
        }

        self.unregistration = Some(PendingUnregistration {
            attempt,
            caller_id,
            connection: connection.clone(),
            requested_at: now,
        });
        effects.push(Effect::Unregister {
            attempt,
            connection,
        });
        effects
    }

    fn take_over_unregistration(&mut self, caller_id: CallerId, now: Instant) -> Vec<Effect> {
        let Some(pending) = self.unregistration.as_mut() else {
            return Vec::new();
        };
        debug!(
            "Unregistration for {} supersedes {}",
            caller_id, pending.caller_id
        );
        let previous = std::mem::replace(&mut pending.caller_id, caller_id);
        pending.requested_at = now;
        vec![unregister_result(previous, Outcome::Superseded)]
    }

    /// The hub backend finished an unregistration call.
    pub fn on_unregistration_completed(
        &mut self,
        attempt: AttemptId,
        result: Result<(), BackendError>,
    ) -> Vec<Effect> {
        let current = matches!(&self.unregistration, Some(pending) if pending.attempt == attempt);
        if !current {
            self.record_unmatched(&format!("hub unregistration for stale {attempt}"));
            return Vec::new();
        }

        let Some(pending) = self.unregistration.take() else {
            return Vec::new();
        };

        let outcome = match result {
            Ok(()) => {
                info!("Unregistration {} for {} succeeded", attempt, pending.caller_id);
                if self.registered_connection.as_ref() == Some(&pending.connection) {
                    self.registered_connection = None;
                }
                Outcome::Success(None)
            }
            Err(e) => {
                info!(
                    "Unregistration {} for {} failed: {}",
                    attempt, pending.caller_id, e
                );
                Outcome::error(ErrorKind::BackendUnregistrationFailed, e.to_string())
            }
        };
        vec![unregister_result(pending.caller_id, outcome)]
    }

    /// Fail every pending request older than the pending timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<Effect> {
        let Some(timeout) = self.pending_timeout else {
            return Vec::new();
        };
        let expired = |requested_at: Instant| now.saturating_duration_since(requested_at) >= timeout;

        let mut effects = Vec::new();

        if matches!(&self.registration, Some(pending) if expired(pending.requested_at)) {
            if let Some(pending) = self.registration.take() {
                warn!(
                    "Registration {} for {} timed out in {:?}",
                    pending.attempt, pending.caller_id, pending.phase
                );
                effects.push(register_result(
                    pending.caller_id,
                    Outcome::error(
                        ErrorKind::Timeout,
                        format!("no registration result within {timeout:?}"),
                    ),
                ));
            }
        }

        if matches!(&self.unregistration, Some(pending) if expired(pending.requested_at)) {
            if let Some(pending) = self.unregistration.take() {
                warn!(
                    "Unregistration {} for {} timed out",
                    pending.attempt, pending.caller_id
                );
                effects.push(unregister_result(
                    pending.caller_id,
                    Outcome::error(
                        ErrorKind::Timeout,
                        format!("no unregistration result within {timeout:?}"),
                    ),
                ));
            }
        }

        effects
    }

    /// Earliest instant at which [`expire`](Self::expire) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let timeout = self.pending_timeout?;
        let registration = self.registration.as_ref().map(|p| p.requested_at + timeout);
        let unregistration = self.unregistration.as_ref().map(|p| p.requested_at + timeout);

        match (registration, unregistration) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn state(&self) -> RegistrationState {
        match &self.registration {
            None => RegistrationState::Idle,
            Some(pending) => RegistrationState::Pending {
                caller_id: pending.caller_id.clone(),
                phase: pending.phase,
            },
        }
    }

    /// Caller waiting on an unregistration, if any
    pub fn pending_unregistration(&self) -> Option<&CallerId> {
        self.unregistration.as_ref().map(|p| &p.caller_id)
    }

    /// Hub path of the last successful registration
    pub fn registered_hub_path(&self) -> Option<&str> {
        self.registered_connection.as_ref().map(|c| c.hub_path())
    }

    /// OS or hub callbacks that matched no pending request
    pub fn unmatched_callbacks(&self) -> u64 {
        self.unmatched_callbacks
    }

    fn next_attempt_id(&mut self) -> AttemptId {
        let attempt = AttemptId::new(self.next_attempt);
        self.next_attempt += 1;
        attempt
    }

    fn record_unmatched(&mut self, what: &str) {
        self.unmatched_callbacks += 1;
        warn!("Dropping unmatched callback: {}", what);
    }
}

fn register_result(caller_id: CallerId, outcome: Outcome) -> Effect {
    Effect::Deliver(OutboundMessage::result(
        caller_id,
        RequestKind::RegisterApplication,
        outcome,
    ))
}

fn unregister_result(caller_id: CallerId, outcome: Outcome) -> Effect {
    Effect::Deliver(OutboundMessage::result(
        caller_id,
        RequestKind::UnregisterApplication,
        outcome,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionConfig {
        ConnectionConfig::new("my-hub", "Endpoint=sb://ns/;SharedAccessKey=k").unwrap()
    }

    fn token() -> DeviceToken {
        DeviceToken::from_bytes(vec![0xde, 0xad, 0xbe, 0xef])
    }

    fn info() -> RegistrationInfo {
        RegistrationInfo {
            registration_id: "reg-1".to_string(),
            channel_uri: token().to_hex(),
            notification_hub_path: "my-hub".to_string(),
        }
    }

    fn delivered(effects: &[Effect]) -> Vec<(CallerId, RequestKind, Outcome)> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Deliver(OutboundMessage::Result {
                    caller_id,
                    request,
                    outcome,
                }) => Some((caller_id.clone(), *request, outcome.clone())),
                _ => None,
            })
            .collect()
    }

    fn completion_attempt(effects: &[Effect]) -> AttemptId {
        effects
            .iter()
            .find_map(|effect| match effect {
                Effect::CompleteRegistration { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .expect("expected a CompleteRegistration effect")
    }

    fn unregister_attempt(effects: &[Effect]) -> AttemptId {
        effects
            .iter()
            .find_map(|effect| match effect {
                Effect::Unregister { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .expect("expected an Unregister effect")
    }

    fn registered(controller: &mut RegistrationController, now: Instant) {
        controller.register_application(CallerId::new("setup"), connection(), now);
        let effects = controller.on_registration_succeeded(token());
        let attempt = completion_attempt(&effects);
        controller.on_registration_completed(attempt, Ok(info()));
    }

    #[test]
    fn test_register_requests_device_token() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        let effects =
            controller.register_application(CallerId::new("cb-1"), connection(), Instant::now());

        assert!(matches!(effects.as_slice(), [Effect::RequestDeviceToken]));
        assert_eq!(
            controller.state(),
            RegistrationState::Pending {
                caller_id: CallerId::new("cb-1"),
                phase: PendingPhase::AwaitingDeviceToken,
            }
        );
    }

    #[test]
    fn test_full_success_path() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        controller.register_application(CallerId::new("cb-1"), connection(), Instant::now());

        let effects = controller.on_registration_succeeded(token());
        match effects.as_slice() {
            [Effect::CompleteRegistration {
                device_token,
                connection,
                ..
            }] => {
                assert_eq!(device_token, &token());
                assert_eq!(connection.hub_path(), "my-hub");
            }
            other => panic!("unexpected effects: {:?}", other),
        }
        assert!(matches!(
            controller.state(),
            RegistrationState::Pending {
                phase: PendingPhase::CompletingWithHub,
                ..
            }
        ));

        let attempt = completion_attempt(&effects);
        let effects = controller.on_registration_completed(attempt, Ok(info()));
        assert_eq!(
            delivered(&effects),
            vec![(
                CallerId::new("cb-1"),
                RequestKind::RegisterApplication,
                Outcome::Success(Some(info()))
            )]
        );
        assert!(controller.state().is_idle());
        assert_eq!(controller.registered_hub_path(), Some("my-hub"));
    }

    #[test]
    fn test_os_success_then_backend_failure_reports_failure() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        controller.register_application(CallerId::new("cb-1"), connection(), Instant::now());
        let attempt = completion_attempt(&controller.on_registration_succeeded(token()));

        let effects = controller.on_registration_completed(
            attempt,
            Err(BackendError::Rejected("401 Unauthorized".to_string())),
        );

        let results = delivered(&effects);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, CallerId::new("cb-1"));
        assert_eq!(
            results[0].2.error_kind(),
            Some(ErrorKind::BackendRegistrationFailed)
        );
        assert!(controller.state().is_idle());
        assert!(controller.registered_hub_path().is_none());
    }

    #[test]
    fn test_os_failure_reports_and_returns_to_idle() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        controller.register_application(CallerId::new("cb-1"), connection(), Instant::now());

        let effects = controller.on_registration_failed(OsError::with_code(3000, "no entitlement"));

        let results = delivered(&effects);
        assert_eq!(results.len(), 1);
        match &results[0].2 {
            Outcome::Error { kind, message } => {
                assert_eq!(*kind, ErrorKind::OsRegistrationFailed);
                assert_eq!(message, "no entitlement (code 3000)");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(controller.state().is_idle());
    }

    #[test]
    fn test_busy_policy_keeps_first_caller() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        let now = Instant::now();
        controller.register_application(CallerId::new("cb-1"), connection(), now);

        let effects = controller.register_application(CallerId::new("cb-2"), connection(), now);
        assert_eq!(
            delivered(&effects),
            vec![(
                CallerId::new("cb-2"),
                RequestKind::RegisterApplication,
                Outcome::Busy
            )]
        );
        assert_eq!(controller.state().caller_id(), Some(&CallerId::new("cb-1")));

        // The first caller still gets its result
        let attempt = completion_attempt(&controller.on_registration_succeeded(token()));
        let effects = controller.on_registration_completed(attempt, Ok(info()));
        assert_eq!(delivered(&effects)[0].0, CallerId::new("cb-1"));
    }

    #[test]
    fn test_supersede_policy_while_awaiting_token() {
        let mut controller = RegistrationController::new(&BridgeConfig::superseding());
        let now = Instant::now();
        controller.register_application(CallerId::new("cb-1"), connection(), now);

        let effects = controller.register_application(CallerId::new("cb-2"), connection(), now);
        assert_eq!(
            delivered(&effects),
            vec![(
                CallerId::new("cb-1"),
                RequestKind::RegisterApplication,
                Outcome::Superseded
            )]
        );
        // The outstanding OS request is reused
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::RequestDeviceToken)));
        assert_eq!(controller.state().caller_id(), Some(&CallerId::new("cb-2")));

        let attempt = completion_attempt(&controller.on_registration_succeeded(token()));
        let effects = controller.on_registration_completed(attempt, Ok(info()));
        assert_eq!(delivered(&effects)[0].0, CallerId::new("cb-2"));
    }

    #[test]
    fn test_supersede_while_completing_drops_stale_hub_result() {
        let mut controller = RegistrationController::new(&BridgeConfig::superseding());
        let now = Instant::now();
        controller.register_application(CallerId::new("cb-1"), connection(), now);
        let stale = completion_attempt(&controller.on_registration_succeeded(token()));

        let effects = controller.register_application(CallerId::new("cb-2"), connection(), now);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::RequestDeviceToken)));

        // The old hub call finishing must not resolve the new caller
        let effects = controller.on_registration_completed(stale, Ok(info()));
        assert!(effects.is_empty());
        assert_eq!(controller.unmatched_callbacks(), 1);
        assert_eq!(controller.state().caller_id(), Some(&CallerId::new("cb-2")));

        let fresh = completion_attempt(&controller.on_registration_succeeded(token()));
        assert_ne!(fresh, stale);
        let effects = controller.on_registration_completed(fresh, Ok(info()));
        assert_eq!(delivered(&effects)[0].0, CallerId::new("cb-2"));
    }

    #[test]
    fn test_unmatched_os_events_are_dropped() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());

        assert!(controller.on_registration_succeeded(token()).is_empty());
        assert!(controller
            .on_registration_failed(OsError::new("late"))
            .is_empty());
        assert!(controller
            .on_registration_completed(AttemptId::new(99), Ok(info()))
            .is_empty());

        assert_eq!(controller.unmatched_callbacks(), 3);
        assert!(controller.state().is_idle());
    }

    #[test]
    fn test_duplicate_device_token_is_dropped() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        controller.register_application(CallerId::new("cb-1"), connection(), Instant::now());
        controller.on_registration_succeeded(token());

        assert!(controller.on_registration_succeeded(token()).is_empty());
        assert!(controller
            .on_registration_failed(OsError::new("late"))
            .is_empty());
        assert_eq!(controller.unmatched_callbacks(), 2);
    }

    #[test]
    fn test_pending_timeout() {
        let config = BridgeConfig::new().with_pending_timeout(Some(Duration::from_secs(10)));
        let mut controller = RegistrationController::new(&config);
        let start = Instant::now();
        controller.register_application(CallerId::new("cb-1"), connection(), start);

        assert_eq!(
            controller.next_deadline(),
            Some(start + Duration::from_secs(10))
        );
        assert!(controller.expire(start + Duration::from_secs(9)).is_empty());

        let effects = controller.expire(start + Duration::from_secs(10));
        let results = delivered(&effects);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].2.error_kind(), Some(ErrorKind::Timeout));
        assert!(controller.state().is_idle());
        assert!(controller.next_deadline().is_none());

        // A token arriving after the timeout is stale
        assert!(controller.on_registration_succeeded(token()).is_empty());
        assert_eq!(controller.unmatched_callbacks(), 1);
    }

    #[test]
    fn test_no_timeout_configured() {
        let mut controller = RegistrationController::new(&BridgeConfig::without_timeout());
        let start = Instant::now();
        controller.register_application(CallerId::new("cb-1"), connection(), start);

        assert!(controller.next_deadline().is_none());
        assert!(controller
            .expire(start + Duration::from_secs(3600))
            .is_empty());
        assert!(!controller.state().is_idle());
    }

    #[test]
    fn test_unregister_without_registration() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        let effects =
            controller.unregister_application(CallerId::new("cb-1"), None, Instant::now());

        let results = delivered(&effects);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, RequestKind::UnregisterApplication);
        assert_eq!(results[0].2.error_kind(), Some(ErrorKind::NotRegistered));
        assert!(controller.pending_unregistration().is_none());
    }

    #[test]
    fn test_unregister_with_explicit_connection_and_no_registration() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        let now = Instant::now();

        let effects =
            controller.unregister_application(CallerId::new("cb-1"), Some(connection()), now);
        match effects.as_slice() {
            [Effect::Unregister { connection, .. }] => {
                assert_eq!(connection.hub_path(), "my-hub");
            }
            other => panic!("unexpected effects: {:?}", other),
        }

        let attempt = unregister_attempt(&effects);
        let effects = controller.on_unregistration_completed(attempt, Ok(()));
        assert_eq!(
            delivered(&effects),
            vec![(
                CallerId::new("cb-1"),
                RequestKind::UnregisterApplication,
                Outcome::Success(None)
            )]
        );
        assert!(controller.registered_hub_path().is_none());
    }

    #[test]
    fn test_explicit_connection_overrides_cached_one() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        let now = Instant::now();
        registered(&mut controller, now);

        let other =
            ConnectionConfig::new("other-hub", "Endpoint=sb://ns/;SharedAccessKey=k").unwrap();
        let effects = controller.unregister_application(CallerId::new("cb-2"), Some(other), now);
        let attempt = match effects.as_slice() {
            [Effect::Unregister { attempt, connection }] => {
                assert_eq!(connection.hub_path(), "other-hub");
                *attempt
            }
            other => panic!("unexpected effects: {:?}", other),
        };

        // Removing another hub's registration leaves ours cached
        controller.on_unregistration_completed(attempt, Ok(()));
        assert_eq!(controller.registered_hub_path(), Some("my-hub"));
    }

    #[test]
    fn test_supersede_onto_another_hub_issues_new_call() {
        let mut controller = RegistrationController::new(&BridgeConfig::superseding());
        let now = Instant::now();

        let first = unregister_attempt(&controller.unregister_application(
            CallerId::new("u-1"),
            Some(connection()),
            now,
        ));
        let other =
            ConnectionConfig::new("other-hub", "Endpoint=sb://ns/;SharedAccessKey=k").unwrap();
        let effects = controller.unregister_application(CallerId::new("u-2"), Some(other), now);

        assert_eq!(
            delivered(&effects),
            vec![(
                CallerId::new("u-1"),
                RequestKind::UnregisterApplication,
                Outcome::Superseded
            )]
        );
        let second = unregister_attempt(&effects);
        assert_ne!(first, second);

        // The first hub call is stale now
        assert!(controller.on_unregistration_completed(first, Ok(())).is_empty());
        assert_eq!(controller.unmatched_callbacks(), 1);
        let effects = controller.on_unregistration_completed(second, Ok(()));
        assert_eq!(delivered(&effects)[0].0, CallerId::new("u-2"));
    }

    #[test]
    fn test_unregister_uses_registered_connection() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        let now = Instant::now();
        registered(&mut controller, now);

        let effects = controller.unregister_application(CallerId::new("cb-9"), None, now);
        match effects.as_slice() {
            [Effect::Unregister { connection, .. }] => {
                assert_eq!(connection.hub_path(), "my-hub");
            }
            other => panic!("unexpected effects: {:?}", other),
        }
        assert_eq!(
            controller.pending_unregistration(),
            Some(&CallerId::new("cb-9"))
        );

        let attempt = unregister_attempt(&effects);
        let effects = controller.on_unregistration_completed(attempt, Ok(()));
        assert_eq!(
            delivered(&effects),
            vec![(
                CallerId::new("cb-9"),
                RequestKind::UnregisterApplication,
                Outcome::Success(None)
            )]
        );
        assert!(controller.registered_hub_path().is_none());
    }

    #[test]
    fn test_unregister_failure_keeps_registration() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        let now = Instant::now();
        registered(&mut controller, now);

        let attempt = unregister_attempt(
            &controller.unregister_application(CallerId::new("cb-9"), None, now),
        );
        let effects = controller.on_unregistration_completed(
            attempt,
            Err(BackendError::Unavailable("timeout".to_string())),
        );

        assert_eq!(
            delivered(&effects)[0].2.error_kind(),
            Some(ErrorKind::BackendUnregistrationFailed)
        );
        assert_eq!(controller.registered_hub_path(), Some("my-hub"));
    }

    #[test]
    fn test_unregister_busy_and_supersede() {
        let now = Instant::now();

        let mut busy = RegistrationController::new(&BridgeConfig::default());
        registered(&mut busy, now);
        busy.unregister_application(CallerId::new("u-1"), None, now);
        let effects = busy.unregister_application(CallerId::new("u-2"), None, now);
        assert_eq!(
            delivered(&effects),
            vec![(
                CallerId::new("u-2"),
                RequestKind::UnregisterApplication,
                Outcome::Busy
            )]
        );
        assert_eq!(busy.pending_unregistration(), Some(&CallerId::new("u-1")));

        let mut superseding = RegistrationController::new(&BridgeConfig::superseding());
        registered(&mut superseding, now);
        let attempt = unregister_attempt(
            &superseding.unregister_application(CallerId::new("u-1"), None, now),
        );
        let effects = superseding.unregister_application(CallerId::new("u-2"), None, now);
        assert_eq!(
            delivered(&effects),
            vec![(
                CallerId::new("u-1"),
                RequestKind::UnregisterApplication,
                Outcome::Superseded
            )]
        );

        let effects = superseding.on_unregistration_completed(attempt, Ok(()));
        assert_eq!(delivered(&effects)[0].0, CallerId::new("u-2"));
    }

    #[test]
    fn test_unregistration_is_independent_of_registration_slot() {
        let mut controller = RegistrationController::new(&BridgeConfig::default());
        let now = Instant::now();
        registered(&mut controller, now);

        controller.register_application(CallerId::new("cb-1"), connection(), now);
        let effects = controller.unregister_application(CallerId::new("u-1"), None, now);

        assert!(matches!(effects.as_slice(), [Effect::Unregister { .. }]));
        assert_eq!(controller.state().caller_id(), Some(&CallerId::new("cb-1")));
    }
}
