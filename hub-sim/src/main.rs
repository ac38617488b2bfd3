use anyhow::{Context, Result};
use tracing::{error, info};

pub mod config;
pub mod hub;
pub mod registrar;
pub mod scenario;

use config::SimConfig;

/// Initialize tracing/logging with the specified log level
///
/// Logs go to stderr so stdout carries only the host messages.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = match log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "warn",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn render(message: &hub_transport::OutboundMessage, pretty: bool) -> Result<String> {
    let envelope = message.to_host_json();
    if pretty {
        serde_json::to_string_pretty(&envelope).context("Failed to render host message")
    } else {
        Ok(envelope.to_string())
    }
}

fn main() -> Result<()> {
    let config = SimConfig::from_env().context("Failed to load configuration")?;

    init_tracing(&config.log_level)?;
    config.print_summary();

    for scenario in config.scenario.expand() {
        info!("Running scenario '{}'", scenario.name());

        let messages = match scenario::run(scenario, &config) {
            Ok(messages) => messages,
            Err(e) => {
                error!("Scenario '{}' failed: {}", scenario.name(), e);
                return Err(e).with_context(|| format!("Scenario '{}' failed", scenario.name()));
            }
        };

        for message in &messages {
            println!("{}", render(message, config.pretty)?);
        }
        info!(
            "Scenario '{}' passed with {} host message(s)",
            scenario.name(),
            messages.len()
        );
    }

    Ok(())
}
