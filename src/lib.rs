//! WebDAV Provisioner
//!
//! Converges a host serving multi-tenant WebDAV through nginx to a declared
//! set of storage locations and users, and optionally builds the mdadm array
//! those locations live on.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Reconciliation Driver                          │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐ │
//! │  │   Location     │  │   Credential   │  │   Location Router      │ │
//! │  │  Provisioner   │─▶│   Reconciler   │─▶│  (nginx server blocks) │ │
//! │  │ (+ migration)  │  │  (htpasswd)    │  │                        │ │
//! │  └────────────────┘  └────────────────┘  └───────────┬────────────┘ │
//! │                                                      │              │
//! │                                          ┌───────────┴────────────┐ │
//! │                                          │ Service Manager        │ │
//! │                                          │ (nginx -t, activate)   │ │
//! │                                          └────────────────────────┘ │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                    Storage Array Planner (standalone)               │
//! │  Disk Scanner ─▶ Planner state machine ─▶ Array Committer (mdadm)   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │           Ports: SystemExecutor (processes), Prompter (operator)    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Desired-state gathering, the reconciliation driver and
//!   service control
//! - [`credentials`]: Credential store reading and additive reconciliation
//! - [`provisioning`]: Location trees, permission policy, data migration
//! - [`routing`]: Routing unit naming, rendering and replacement
//! - [`hardware`]: Disk discovery and the RAID planner
//! - [`domain`]: Core domain types and ports
//! - [`system`] / [`interactive`]: Port adapters
//! - [`error`]: Error types and handling

pub mod controlplane;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod interactive;
pub mod provisioning;
pub mod routing;
pub mod system;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use controlplane::{
    configure_interactively, load_desired_state, CleanupReport, DriverConfig, FreshReport,
    ReconcileReport, ReconciliationDriver, ServiceAction, ServiceConfig, ServiceManager,
};

pub use credentials::{CredentialConfig, CredentialReconciler, CredentialStore};

pub use domain::desired::{DesiredState, DesiredStateSpec, Secret};
pub use domain::ports::{
    CommandOutput, DiskCandidate, DriveType, Prompter, StorageLocation, SystemCommand,
    SystemExecutor, SystemExecutorRef, User,
};

pub use error::{Error, ErrorCategory, Result};

pub use hardware::{
    ArrayCommitter, DiskInventory, DiskScanner, RaidConfig, RaidLevel, RaidOutcome, RaidPlanner,
    RaidWizard, ScannerConfig, ValidatedRaidPlan,
};

pub use interactive::{ScriptedPrompter, TerminalPrompter};

pub use provisioning::{LocationProvisioner, MigrationDecision, PermissionPolicy, ProvisionerConfig};

pub use routing::{LocationRouter, RouterSettings};

pub use system::{ProcessExecutor, ScriptedExecutor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
