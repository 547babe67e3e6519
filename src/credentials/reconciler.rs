//! Credential Reconciler
//!
//! Brings the credential store up to the desired user set. The pass is
//! additive: missing users are appended with the default secret, present
//! users keep whatever hash they have, and nobody is ever removed.

use crate::credentials::store::{redacted_preview, CredentialStore};
use crate::domain::desired::{DesiredState, Secret};
use crate::domain::ports::{SystemCommand, SystemExecutorRef, User};
use crate::error::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the credential reconciler
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// htpasswd file read by the serving process
    pub path: PathBuf,
    /// Group the serving process runs as; gets read access to the store
    pub service_group: String,
    /// htpasswd binary
    pub tool: String,
    /// Hash algorithm flag passed to the tool
    pub hash_flag: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/nginx/webdav.htpasswd"),
            service_group: "www-data".to_string(),
            tool: "htpasswd".to_string(),
            hash_flag: "-B".to_string(),
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// What a reconciliation pass did to the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredentialOutcome {
    /// Users appended with the default secret
    pub added: Vec<User>,
    /// Users already present, left untouched
    pub kept: Vec<User>,
    /// Whether the store file was created by this pass
    pub created: bool,
}

// =============================================================================
// Credential Reconciler
// =============================================================================

pub struct CredentialReconciler {
    executor: SystemExecutorRef,
    config: CredentialConfig,
}

impl CredentialReconciler {
    pub fn new(executor: SystemExecutorRef, config: CredentialConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Ensure every desired user has an entry
    ///
    /// Any failing write aborts the pass; entries written before the failure
    /// stay in the file.
    pub async fn reconcile(&self, desired: &DesiredState) -> Result<CredentialOutcome> {
        let secret = desired.default_secret();
        let mut outcome = CredentialOutcome::default();

        match CredentialStore::load(&self.config.path).await? {
            None => {
                info!(
                    "Credential store {} not found, creating it",
                    self.config.path.display()
                );
                if let Some(parent) = self.config.path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                for (idx, user) in desired.users().iter().enumerate() {
                    self.write_entry(user, secret, idx == 0).await?;
                    outcome.added.push(user.clone());
                }
                outcome.created = true;
            }
            Some(store) => {
                debug!(
                    "Credential store {} has {} entries",
                    store.path().display(),
                    store.len()
                );
                for user in desired.users() {
                    match store.hash_of(user) {
                        Some(hash) => {
                            info!(
                                "User {} already present ({}), keeping existing secret",
                                user,
                                redacted_preview(hash)
                            );
                            outcome.kept.push(user.clone());
                        }
                        None => {
                            self.write_entry(user, secret, false).await?;
                            outcome.added.push(user.clone());
                        }
                    }
                }
            }
        }

        self.secure_store().await?;

        info!(
            "Credentials reconciled: {} added, {} kept",
            outcome.added.len(),
            outcome.kept.len()
        );
        Ok(outcome)
    }

    /// Write one entry; `create` truncates the file first
    async fn write_entry(&self, user: &User, secret: &Secret, create: bool) -> Result<()> {
        let mut cmd = SystemCommand::new(&self.config.tool);
        if create {
            cmd = cmd.arg("-c");
        }
        let cmd = cmd
            .arg("-b")
            .arg(&self.config.hash_flag)
            .path_arg(&self.config.path)
            .arg(user.name())
            .secret_arg(secret);

        self.executor.run_checked(&cmd).await?;
        info!("Added user {} to credential store", user);
        Ok(())
    }

    /// Root-owned, readable by the service group, hidden from others
    async fn secure_store(&self) -> Result<()> {
        let owner = format!("root:{}", self.config.service_group);
        self.executor
            .run_checked(
                &SystemCommand::new("chown")
                    .arg(owner)
                    .path_arg(&self.config.path),
            )
            .await?;
        self.executor
            .run_checked(
                &SystemCommand::new("chmod")
                    .arg("0640")
                    .path_arg(&self.config.path),
            )
            .await?;
        Ok(())
    }
}
