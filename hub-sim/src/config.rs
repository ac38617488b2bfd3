//! Command line arguments and simulator configuration

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing::info;

use crate::scenario::Scenario;

const DEFAULT_CONNECTION_STRING: &str = "Endpoint=sb://sim-ns.servicebus.windows.net/;SharedAccessKeyName=DefaultListenSharedAccessSignature;SharedAccessKey=c2ltdWxhdGVkLWtleQ==";

/// Notification hub bridge simulator
///
/// Runs the registration bridge against a simulated OS push subsystem and an
/// in-memory notification hub, and prints every message the host would
/// receive as one JSON document per line.
#[derive(Parser, Debug)]
#[command(name = "hub-sim")]
#[command(about = "Notification hub bridge simulator - scenario playback")]
#[command(version)]
pub struct Args {
    /// Scenario to run
    #[arg(short, long, value_enum, default_value = "all")]
    pub scenario: Scenario,

    /// Notification hub path to register against
    #[arg(long, default_value = "sim-hub")]
    pub hub_path: String,

    /// Hub connection string (must carry a SharedAccessKey to be accepted)
    #[arg(long, default_value = DEFAULT_CONNECTION_STRING)]
    pub connection_string: String,

    /// Pending timeout used by the timeout scenario, in milliseconds
    #[arg(short = 't', long, default_value = "250")]
    pub timeout_ms: u64,

    /// Simulated hub round trip, in milliseconds
    #[arg(long, default_value = "20")]
    pub hub_latency_ms: u64,

    /// How long to wait for each expected message, in milliseconds
    #[arg(short = 'w', long, default_value = "2000")]
    pub wait_ms: u64,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Args {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        if self.hub_path.trim().is_empty() {
            return Err(anyhow::anyhow!("Hub path must not be empty"));
        }

        if self.connection_string.trim().is_empty() {
            return Err(anyhow::anyhow!("Connection string must not be empty"));
        }

        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("Timeout must be positive"));
        }

        if self.wait_ms <= self.timeout_ms {
            return Err(anyhow::anyhow!(
                "Wait ({}ms) must be longer than the pending timeout ({}ms)",
                self.wait_ms,
                self.timeout_ms
            ));
        }

        if self.wait_ms <= self.hub_latency_ms {
            return Err(anyhow::anyhow!(
                "Wait ({}ms) must be longer than the hub latency ({}ms)",
                self.wait_ms,
                self.hub_latency_ms
            ));
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                    self.log_level
                ));
            }
        }

        Ok(())
    }

    /// Apply `HUB_SIM_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(scenario) = var("HUB_SIM_SCENARIO") {
            self.scenario = Scenario::from_str(&scenario, true)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Invalid HUB_SIM_SCENARIO environment variable")?;
        }

        if let Some(hub_path) = var("HUB_SIM_HUB_PATH") {
            self.hub_path = hub_path;
        }

        if let Some(connection_string) = var("HUB_SIM_CONNECTION_STRING") {
            self.connection_string = connection_string;
        }

        if let Some(timeout) = var("HUB_SIM_TIMEOUT_MS") {
            self.timeout_ms = timeout
                .parse()
                .context("Invalid HUB_SIM_TIMEOUT_MS environment variable")?;
        }

        if let Some(latency) = var("HUB_SIM_HUB_LATENCY_MS") {
            self.hub_latency_ms = latency
                .parse()
                .context("Invalid HUB_SIM_HUB_LATENCY_MS environment variable")?;
        }

        if let Some(wait) = var("HUB_SIM_WAIT_MS") {
            self.wait_ms = wait
                .parse()
                .context("Invalid HUB_SIM_WAIT_MS environment variable")?;
        }

        if let Some(log_level) = var("HUB_SIM_LOG_LEVEL") {
            self.log_level = log_level;
        }

        if var("HUB_SIM_PRETTY").is_some() {
            self.pretty = true;
        }

        Ok(())
    }
}

/// Configuration derived from command line arguments and environment variables
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub scenario: Scenario,
    pub hub_path: String,
    pub connection_string: String,
    pub pending_timeout: Duration,
    pub hub_latency: Duration,
    pub wait: Duration,
    pub pretty: bool,
    pub log_level: String,
}

impl From<Args> for SimConfig {
    fn from(args: Args) -> Self {
        Self {
            scenario: args.scenario,
            hub_path: args.hub_path,
            connection_string: args.connection_string,
            pending_timeout: Duration::from_millis(args.timeout_ms),
            hub_latency: Duration::from_millis(args.hub_latency_ms),
            wait: Duration::from_millis(args.wait_ms),
            pretty: args.pretty,
            log_level: args.log_level,
        }
    }
}

impl SimConfig {
    /// Create configuration from command line arguments and environment variables
    pub fn from_env() -> Result<Self> {
        let mut args = Args::parse();
        args.apply_env_overrides()?;
        args.validate()?;

        Ok(SimConfig::from(args))
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        info!("Configuration:");
        info!("  Scenario: {}", self.scenario.name());
        info!("  Hub path: {}", self.hub_path);
        info!("  Pending timeout: {}ms", self.pending_timeout.as_millis());
        info!("  Hub latency: {}ms", self.hub_latency.as_millis());
        info!("  Wait per message: {}ms", self.wait.as_millis());
        info!("  Pretty output: {}", self.pretty);
        info!("  Log level: {}", self.log_level);
    }
}
