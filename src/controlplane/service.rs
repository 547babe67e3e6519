//! Serving Process Control
//!
//! Validation, reload and stop of the web server that consumes the generated
//! routing units.

use crate::domain::ports::{SystemCommand, SystemExecutorRef};
use crate::error::{Error, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Configuration for the serving process
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// systemd unit name
    pub name: String,
    /// Binary that checks the configuration with `-t`
    pub binary: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "nginx".to_string(),
            binary: "nginx".to_string(),
        }
    }
}

/// How new configuration was put into effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Reloaded,
    Started,
}

pub struct ServiceManager {
    executor: SystemExecutorRef,
    config: ServiceConfig,
}

impl ServiceManager {
    pub fn new(executor: SystemExecutorRef, config: ServiceConfig) -> Self {
        Self { executor, config }
    }

    /// Check the full configuration, including every routing unit
    pub async fn validate(&self) -> Result<()> {
        let output = self
            .executor
            .run(&SystemCommand::new(&self.config.binary).arg("-t"))
            .await?;
        if !output.is_success() {
            // nginx -t reports on stderr; fall back to stdout for other checkers
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim()
            } else {
                output.stderr.trim()
            };
            return Err(Error::ServiceConfigInvalid {
                service: self.config.name.clone(),
                reason: detail.to_string(),
            });
        }
        info!("{} configuration is valid", self.config.name);
        Ok(())
    }

    /// Graceful reload; running workers finish their requests
    pub async fn reload(&self) -> Result<()> {
        self.executor
            .run_checked(&self.systemctl("reload"))
            .await?;
        info!("Reloaded {}", self.config.name);
        Ok(())
    }

    /// Whether the unit is currently running
    pub async fn is_active(&self) -> Result<bool> {
        let output = self
            .executor
            .run(
                &SystemCommand::new("systemctl")
                    .args(["is-active", "--quiet"])
                    .arg(&self.config.name),
            )
            .await?;
        Ok(output.is_success())
    }

    pub async fn start(&self) -> Result<()> {
        self.executor.run_checked(&self.systemctl("start")).await?;
        info!("Started {}", self.config.name);
        Ok(())
    }

    /// Put validated configuration into effect: reload a running service,
    /// start a stopped one
    pub async fn activate(&self) -> Result<ServiceAction> {
        if self.is_active().await? {
            self.reload().await?;
            Ok(ServiceAction::Reloaded)
        } else {
            self.start().await?;
            Ok(ServiceAction::Started)
        }
    }

    /// Stop the service, tolerating failure. Returns whether it stopped.
    pub async fn stop(&self) -> bool {
        match self.executor.run_checked(&self.systemctl("stop")).await {
            Ok(_) => {
                info!("Stopped {}", self.config.name);
                true
            }
            Err(e) => {
                warn!("Could not stop {} (continuing): {}", self.config.name, e);
                false
            }
        }
    }

    fn systemctl(&self, verb: &str) -> SystemCommand {
        SystemCommand::new("systemctl").arg(verb).arg(&self.config.name)
    }
}
