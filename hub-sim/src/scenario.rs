//! Named scenarios run against a real bridge
//!
//! Each scenario builds a fresh bridge wired to a [`ChannelRegistrar`] and an
//! [`InMemoryHub`], plays the OS side, and returns every message the host
//! received. A scenario fails if the host does not get what it should.

use std::sync::{mpsc, Arc};
use std::time::Duration;

use hub_bridge::{
    BridgeConfig, BridgeError, CallerId, ChannelTransport, ErrorKind, NotificationHubBridge,
    NotificationPayload, OsError, OsEventSink, OutboundMessage, OutboundReceiver, Outcome,
    Submission,
};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::SimConfig;
use crate::hub::InMemoryHub;
use crate::registrar::{ChannelRegistrar, TokenRequest};

/// Scenarios the simulator can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Register, OS issues a token, hub accepts
    HappyPath,
    /// OS refuses to register for remote notifications
    OsFailure,
    /// OS issues a token, hub rejects the credentials
    BackendFailure,
    /// Second registration while the first is pending
    Busy,
    /// Second registration takes over the first one's slot
    Supersede,
    /// OS never answers
    Timeout,
    /// Push payload arrives with no request outstanding
    Notification,
    /// Register, then remove the registration with explicit credentials
    Unregister,
    /// Every scenario above, in order
    All,
}

impl Scenario {
    const EACH: [Scenario; 8] = [
        Scenario::HappyPath,
        Scenario::OsFailure,
        Scenario::BackendFailure,
        Scenario::Busy,
        Scenario::Supersede,
        Scenario::Timeout,
        Scenario::Notification,
        Scenario::Unregister,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::HappyPath => "happy-path",
            Scenario::OsFailure => "os-failure",
            Scenario::BackendFailure => "backend-failure",
            Scenario::Busy => "busy",
            Scenario::Supersede => "supersede",
            Scenario::Timeout => "timeout",
            Scenario::Notification => "notification",
            Scenario::Unregister => "unregister",
            Scenario::All => "all",
        }
    }

    /// The concrete scenarios to run for this selection
    pub fn expand(self) -> Vec<Scenario> {
        match self {
            Scenario::All => Self::EACH.to_vec(),
            single => vec![single],
        }
    }
}

/// Errors that stop a scenario
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Bridge never asked the OS for a device token within {0:?}")]
    OsNotAsked(Duration),

    #[error("Expected {expected} message(s) for the host, received {received}")]
    MissingMessages { expected: usize, received: usize },

    #[error("Unexpected result for {caller}: expected {expected}, got {actual}")]
    UnexpectedOutcome {
        caller: String,
        expected: String,
        actual: String,
    },

    #[error("Request for {0} was rejected up front")]
    Rejected(CallerId),
}

/// One bridge under test and the pieces the driver plays
struct Simulation {
    bridge: NotificationHubBridge,
    os: OsEventSink,
    outbound: OutboundReceiver,
    token_requests: mpsc::Receiver<TokenRequest>,
    hub: Arc<InMemoryHub>,
    hub_path: String,
    connection_string: String,
    wait: Duration,
}

impl Simulation {
    fn start(config: &SimConfig, bridge_config: BridgeConfig) -> Result<Self, SimError> {
        let (registrar, token_requests) = ChannelRegistrar::new();
        let (transport, outbound) = ChannelTransport::new();
        let hub = Arc::new(InMemoryHub::new(config.hub_latency));

        let bridge = NotificationHubBridge::new(
            bridge_config,
            Arc::new(registrar),
            hub.clone(),
            Arc::new(transport),
        )?;
        let os = bridge.os_events();

        Ok(Self {
            bridge,
            os,
            outbound,
            token_requests,
            hub,
            hub_path: config.hub_path.clone(),
            connection_string: config.connection_string.clone(),
            wait: config.wait,
        })
    }

    fn register(&self, caller: &str) -> Result<(), SimError> {
        self.register_with(caller, &self.connection_string)
    }

    fn register_with(&self, caller: &str, connection_string: &str) -> Result<(), SimError> {
        let caller_id = CallerId::new(caller);
        match self
            .bridge
            .register_application(caller_id.clone(), &self.hub_path, connection_string)?
        {
            Submission::Queued => Ok(()),
            Submission::Rejected => Err(SimError::Rejected(caller_id)),
        }
    }

    /// Wait for the bridge to ask the OS for a token
    fn next_token_request(&self) -> Result<TokenRequest, SimError> {
        self.token_requests
            .recv_timeout(self.wait)
            .map_err(|_| SimError::OsNotAsked(self.wait))
    }

    /// Play the OS issuing a token for the next request
    fn issue_token(&self) -> Result<(), SimError> {
        let request = self.next_token_request()?;
        info!("Simulated OS: issuing token for request #{}", request.sequence);
        self.os.device_token_received(request.device_token())?;
        Ok(())
    }

    fn collect(&self, expected: usize) -> Result<Vec<OutboundMessage>, SimError> {
        let mut messages = Vec::with_capacity(expected);
        while messages.len() < expected {
            match self.outbound.recv_timeout(self.wait) {
                Some(message) => messages.push(message),
                None => {
                    return Err(SimError::MissingMessages {
                        expected,
                        received: messages.len(),
                    })
                }
            }
        }
        Ok(messages)
    }
}

/// Check that `message` answers `caller` and that `check` holds for its outcome
fn expect_outcome(
    message: &OutboundMessage,
    caller: &str,
    expected: &str,
    check: impl Fn(&Outcome) -> bool,
) -> Result<(), SimError> {
    let matches = message.caller_id().map(CallerId::as_str) == Some(caller)
        && message.outcome().map_or(false, check);

    if matches {
        Ok(())
    } else {
        Err(SimError::UnexpectedOutcome {
            caller: caller.to_string(),
            expected: expected.to_string(),
            actual: message.to_host_json().to_string(),
        })
    }
}

fn is_error(kind: ErrorKind) -> impl Fn(&Outcome) -> bool {
    move |outcome: &Outcome| outcome.error_kind() == Some(kind)
}

/// Run one concrete scenario and return what the host received
pub fn run(scenario: Scenario, config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    match scenario {
        Scenario::HappyPath => happy_path(config),
        Scenario::OsFailure => os_failure(config),
        Scenario::BackendFailure => backend_failure(config),
        Scenario::Busy => busy(config),
        Scenario::Supersede => supersede(config),
        Scenario::Timeout => timeout(config),
        Scenario::Notification => notification(config),
        Scenario::Unregister => unregister(config),
        Scenario::All => {
            let mut messages = Vec::new();
            for single in scenario.expand() {
                messages.extend(run(single, config)?);
            }
            Ok(messages)
        }
    }
}

fn happy_path(config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    let sim = Simulation::start(config, BridgeConfig::default())?;

    sim.register("callback-1")?;
    sim.issue_token()?;

    let messages = sim.collect(1)?;
    expect_outcome(&messages[0], "callback-1", "success", Outcome::is_success)?;
    info!(
        "Hub '{}' now holds {} registration(s)",
        sim.hub_path,
        sim.hub.registrations(&sim.hub_path).len()
    );
    Ok(messages)
}

fn os_failure(config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    let sim = Simulation::start(config, BridgeConfig::default())?;

    sim.register("callback-1")?;
    sim.next_token_request()?;
    sim.os.registration_failed(OsError::with_code(
        3000,
        "no valid aps-environment entitlement string found for application",
    ))?;

    let messages = sim.collect(1)?;
    expect_outcome(
        &messages[0],
        "callback-1",
        "OS registration failure",
        is_error(ErrorKind::OsRegistrationFailed),
    )?;
    Ok(messages)
}

fn backend_failure(config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    let sim = Simulation::start(config, BridgeConfig::default())?;

    // Listen-only endpoint with the key stripped
    let keyless = sim
        .connection_string
        .split(';')
        .filter(|part| !part.starts_with("SharedAccessKey="))
        .collect::<Vec<_>>()
        .join(";");

    sim.register_with("callback-1", &keyless)?;
    sim.issue_token()?;

    let messages = sim.collect(1)?;
    expect_outcome(
        &messages[0],
        "callback-1",
        "hub registration failure",
        is_error(ErrorKind::BackendRegistrationFailed),
    )?;
    Ok(messages)
}

fn busy(config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    let sim = Simulation::start(config, BridgeConfig::default())?;

    sim.register("callback-1")?;
    sim.register("callback-2")?;
    sim.issue_token()?;

    let messages = sim.collect(2)?;
    expect_outcome(&messages[0], "callback-2", "busy", |o| *o == Outcome::Busy)?;
    expect_outcome(&messages[1], "callback-1", "success", Outcome::is_success)?;
    Ok(messages)
}

fn supersede(config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    let sim = Simulation::start(config, BridgeConfig::superseding())?;

    sim.register("callback-1")?;
    sim.register("callback-2")?;
    sim.issue_token()?;

    let messages = sim.collect(2)?;
    expect_outcome(&messages[0], "callback-1", "superseded", |o| {
        *o == Outcome::Superseded
    })?;
    expect_outcome(&messages[1], "callback-2", "success", Outcome::is_success)?;
    Ok(messages)
}

fn timeout(config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    let sim = Simulation::start(
        config,
        BridgeConfig::new().with_pending_timeout(Some(config.pending_timeout)),
    )?;

    sim.register("callback-1")?;
    // The OS is asked but never answers
    sim.next_token_request()?;

    let messages = sim.collect(1)?;
    expect_outcome(
        &messages[0],
        "callback-1",
        "timeout",
        is_error(ErrorKind::Timeout),
    )?;
    Ok(messages)
}

fn notification(config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    let sim = Simulation::start(config, BridgeConfig::default())?;

    let payload: NotificationPayload = [
        ("title".to_string(), json!("Hello")),
        ("body".to_string(), json!("Sent through the simulated hub")),
        ("badge".to_string(), json!(1)),
    ]
    .into_iter()
    .collect();
    sim.os.notification_received(payload.clone())?;

    let messages = sim.collect(1)?;
    if messages[0] != OutboundMessage::NotificationReceived(payload) {
        return Err(SimError::UnexpectedOutcome {
            caller: "host".to_string(),
            expected: "the payload, unmodified".to_string(),
            actual: messages[0].to_host_json().to_string(),
        });
    }
    Ok(messages)
}

fn unregister(config: &SimConfig) -> Result<Vec<OutboundMessage>, SimError> {
    let sim = Simulation::start(config, BridgeConfig::default())?;

    sim.register("callback-1")?;
    sim.issue_token()?;
    let mut messages = sim.collect(1)?;
    expect_outcome(&messages[0], "callback-1", "success", Outcome::is_success)?;

    // Credentials passed the way a restarted host would pass them
    let caller_id = CallerId::new("callback-2");
    match sim.bridge.unregister_application_from(
        caller_id.clone(),
        &sim.hub_path,
        &sim.connection_string,
    )? {
        Submission::Queued => {}
        Submission::Rejected => return Err(SimError::Rejected(caller_id)),
    }
    messages.extend(sim.collect(1)?);
    expect_outcome(&messages[1], "callback-2", "success", |o| {
        *o == Outcome::Success(None)
    })?;

    // The cached registration went with it
    sim.bridge
        .unregister_application(CallerId::new("callback-3"))?;
    messages.extend(sim.collect(1)?);
    expect_outcome(
        &messages[2],
        "callback-3",
        "notRegistered",
        is_error(ErrorKind::NotRegistered),
    )?;

    info!(
        "Hub '{}' now holds {} registration(s)",
        sim.hub_path,
        sim.hub.registrations(&sim.hub_path).len()
    );
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn test_config() -> SimConfig {
        SimConfig {
            scenario: Scenario::All,
            hub_path: "sim-hub".to_string(),
            connection_string:
                "Endpoint=sb://sim-ns.servicebus.windows.net/;SharedAccessKeyName=Listen;SharedAccessKey=c2lt"
                    .to_string(),
            pending_timeout: Duration::from_millis(50),
            hub_latency: Duration::ZERO,
            wait: Duration::from_secs(2),
            pretty: false,
            log_level: "warn".to_string(),
        }
    }

    #[rstest]
    #[case(Scenario::HappyPath, 1)]
    #[case(Scenario::OsFailure, 1)]
    #[case(Scenario::BackendFailure, 1)]
    #[case(Scenario::Busy, 2)]
    #[case(Scenario::Supersede, 2)]
    #[case(Scenario::Timeout, 1)]
    #[case(Scenario::Notification, 1)]
    #[case(Scenario::Unregister, 3)]
    fn test_scenario_passes(#[case] scenario: Scenario, #[case] expected: usize) {
        let messages = run(scenario, &test_config()).unwrap();
        assert_eq!(messages.len(), expected);
    }

    #[test]
    fn test_all_runs_every_scenario() {
        let messages = run(Scenario::All, &test_config()).unwrap();
        assert_eq!(messages.len(), 12);
    }

    #[rstest]
    #[case(Scenario::All, 8)]
    #[case(Scenario::Busy, 1)]
    fn test_expand(#[case] scenario: Scenario, #[case] count: usize) {
        assert_eq!(scenario.expand().len(), count);
        assert!(!scenario.expand().contains(&Scenario::All));
    }

    #[test]
    fn test_names_match_cli_values() {
        use clap::ValueEnum;

        for scenario in Scenario::value_variants() {
            let value = scenario.to_possible_value().unwrap();
            assert_eq!(value.get_name(), scenario.name());
        }
    }

    #[test]
    fn test_happy_path_envelope() {
        let messages = run(Scenario::HappyPath, &test_config()).unwrap();
        let json = messages[0].to_host_json();

        assert_eq!(json["callbackId"], "callback-1");
        assert_eq!(json["event"], "registerApplication");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["keepCallback"], false);
        assert_eq!(json["result"]["notificationHubPath"], "sim-hub");
    }
}
