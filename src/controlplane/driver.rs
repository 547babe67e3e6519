//! Reconciliation Driver
//!
//! Coordinates one provisioning pass:
//! - Migration of data from retired roots (operator confirmed)
//! - Location trees and their ownership
//! - Credential store entries
//! - Routing units
//! - Service validation, then reload (or start when stopped)
//!
//! Each stage runs to completion before the next starts. A failure stops the
//! pass where it is; nothing already done is rolled back, and the running
//! service keeps its previous configuration unless validation passed.

use crate::controlplane::service::{ServiceAction, ServiceConfig, ServiceManager};
use crate::credentials::{CredentialConfig, CredentialReconciler};
use crate::domain::desired::DesiredState;
use crate::domain::ports::{Prompter, StorageLocation, SystemExecutorRef, User};
use crate::error::Result;
use crate::provisioning::{LocationProvisioner, MigrationDecision, ProvisionerConfig};
use crate::routing::{LocationRouter, RouterSettings};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// =============================================================================
// Driver Configuration
// =============================================================================

/// Configuration for every stage of a pass
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    pub provisioner: ProvisionerConfig,
    pub credentials: CredentialConfig,
    pub router: RouterSettings,
    pub service: ServiceConfig,
}

impl DriverConfig {
    /// Point both the credential reconciler and the routing units at one store
    pub fn with_credential_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.router.credential_file = path.clone();
        self.credentials.path = path;
        self
    }

    /// Identity the serving process runs as
    pub fn with_service_identity(mut self, user: &str, group: &str) -> Self {
        self.provisioner.policy.owner = user.to_string();
        self.provisioner.policy.group = group.to_string();
        self.credentials.service_group = group.to_string();
        self
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub locations: Vec<StorageLocation>,
    pub users_added: Vec<User>,
    pub users_kept: Vec<User>,
    pub directories_created: Vec<PathBuf>,
    pub units_written: Vec<PathBuf>,
    pub units_retired: Vec<PathBuf>,
    pub migrations: Vec<MigrationDecision>,
    pub service: ServiceAction,
}

/// What a cleanup removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub service_stopped: bool,
    pub units_removed: Vec<PathBuf>,
    pub credential_store_removed: bool,
}

/// Cleanup followed by a reconciliation from scratch
#[derive(Debug, Clone, Serialize)]
pub struct FreshReport {
    pub cleanup: CleanupReport,
    pub reconcile: ReconcileReport,
}

// =============================================================================
// Reconciliation Driver
// =============================================================================

pub struct ReconciliationDriver {
    provisioner: LocationProvisioner,
    credentials: CredentialReconciler,
    router: LocationRouter,
    service: ServiceManager,
}

impl ReconciliationDriver {
    pub fn new(executor: SystemExecutorRef, config: DriverConfig) -> Self {
        Self {
            provisioner: LocationProvisioner::new(executor.clone(), config.provisioner),
            credentials: CredentialReconciler::new(executor.clone(), config.credentials),
            router: LocationRouter::new(config.router),
            service: ServiceManager::new(executor, config.service),
        }
    }

    pub fn router(&self) -> &LocationRouter {
        &self.router
    }

    /// Bring the host in line with `desired`
    pub async fn reconcile(
        &self,
        desired: &DesiredState,
        prompter: &mut dyn Prompter,
    ) -> Result<ReconcileReport> {
        let started_at = Utc::now();
        info!(
            "Reconciling {} locations for {} users",
            desired.locations().len(),
            desired.users().len()
        );

        let prior = self.router.prior_units().await?;
        let migrations = self
            .provisioner
            .resolve_migrations(&prior, desired, prompter)
            .await?;
        let provisioned = self.provisioner.provision(desired).await?;

        let credentials = self.credentials.reconcile(desired).await?;

        let routing = self.router.apply(desired).await?;

        self.service.validate().await?;
        let service = self.service.activate().await?;

        let report = ReconcileReport {
            started_at,
            finished_at: Utc::now(),
            locations: desired.locations().to_vec(),
            users_added: credentials.added,
            users_kept: credentials.kept,
            directories_created: provisioned.created,
            units_written: routing.written,
            units_retired: routing.retired,
            migrations,
            service,
        };
        info!(
            "Reconciled: {} users added, {} kept, {} units written, {} retired, {} migrations",
            report.users_added.len(),
            report.users_kept.len(),
            report.units_written.len(),
            report.units_retired.len(),
            report.migrations.len()
        );
        Ok(report)
    }

    /// Remove generated configuration; data directories are left alone
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let service_stopped = self.service.stop().await;
        let units_removed = self.router.remove_managed_units().await?;
        let credential_store_removed =
            remove_if_present(&self.credentials.config().path).await?;

        info!(
            "Cleanup removed {} units{}",
            units_removed.len(),
            if credential_store_removed {
                " and the credential store"
            } else {
                ""
            }
        );
        Ok(CleanupReport {
            service_stopped,
            units_removed,
            credential_store_removed,
        })
    }

    /// Remove generated configuration, then reconcile. The service stopped
    /// by the cleanup is started again once the new configuration validates.
    pub async fn fresh(
        &self,
        desired: &DesiredState,
        prompter: &mut dyn Prompter,
    ) -> Result<FreshReport> {
        let cleanup = self.cleanup().await?;
        let reconcile = self.reconcile(desired, prompter).await?;
        Ok(FreshReport { cleanup, reconcile })
    }
}

async fn remove_if_present(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} not present; nothing to remove", path.display());
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
