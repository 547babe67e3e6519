//! Location Provisioner
//!
//! Creates each location's root and one subdirectory per ordinary user, then
//! re-asserts ownership and permissions across the whole tree. Before any
//! tree is created, data under a previously served root can be carried over
//! to its replacement with the operator's consent.

use crate::domain::desired::DesiredState;
use crate::domain::ports::{Prompter, SystemExecutorRef};
use crate::error::Result;
use crate::provisioning::migration::{
    detect_migrations, relocate, MigrationDecision, MigrationIntent,
};
use crate::provisioning::policy::PermissionPolicy;
use crate::routing::PriorUnit;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Configuration for the location provisioner
#[derive(Debug, Clone, Default)]
pub struct ProvisionerConfig {
    pub policy: PermissionPolicy,
}

/// What provisioning changed on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionOutcome {
    /// Directories that did not exist before this pass
    pub created: Vec<PathBuf>,
    /// Roots whose ownership and permissions were re-applied
    pub secured: Vec<PathBuf>,
}

pub struct LocationProvisioner {
    executor: SystemExecutorRef,
    config: ProvisionerConfig,
}

impl LocationProvisioner {
    pub fn new(executor: SystemExecutorRef, config: ProvisionerConfig) -> Self {
        Self { executor, config }
    }

    /// Offer each detected migration to the operator and perform the
    /// confirmed ones. Declining leaves the old root untouched.
    pub async fn resolve_migrations(
        &self,
        prior: &[PriorUnit],
        desired: &DesiredState,
        prompter: &mut dyn Prompter,
    ) -> Result<Vec<MigrationDecision>> {
        let intents = detect_migrations(prior, desired).await;
        let mut decisions = Vec::with_capacity(intents.len());

        for intent in intents {
            decisions.push(self.offer(intent, prompter).await?);
        }
        Ok(decisions)
    }

    async fn offer(
        &self,
        intent: MigrationIntent,
        prompter: &mut dyn Prompter,
    ) -> Result<MigrationDecision> {
        prompter.note(&format!(
            "Existing data found at {}, which is no longer a configured location.",
            intent.old_root.display()
        ));
        let question = format!(
            "Move its contents to {}?",
            intent.new_root.display()
        );
        if !prompter.confirm(&question, false)? {
            info!(
                "Migration from {} declined; old data left in place",
                intent.old_root.display()
            );
            return Ok(MigrationDecision::Declined(intent));
        }
        let report = relocate(&intent).await?;
        Ok(MigrationDecision::Migrated(report))
    }

    /// Create every location tree and apply the permission policy
    pub async fn provision(&self, desired: &DesiredState) -> Result<ProvisionOutcome> {
        let mut outcome = ProvisionOutcome::default();

        for location in desired.locations() {
            let mut dirs = vec![location.root.clone()];
            dirs.extend(desired.ordinary_users().map(|u| location.user_dir(u)));

            for dir in dirs {
                if tokio::fs::symlink_metadata(&dir).await.is_err() {
                    tokio::fs::create_dir_all(&dir).await?;
                    debug!("Created {}", dir.display());
                    outcome.created.push(dir);
                }
            }

            let policy = &self.config.policy;
            self.executor
                .run_checked(&policy.chown_command(&location.root))
                .await?;
            self.executor
                .run_checked(&policy.chmod_command(&location.root))
                .await?;
            info!(
                "Location {} ready ({}:{} {})",
                location, policy.owner, policy.group, policy.mode
            );
            outcome.secured.push(location.root.clone());
        }

        Ok(outcome)
    }
}
