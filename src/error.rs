//! Error types for the WebDAV provisioner
//!
//! Provides structured error types for every provisioning component including
//! desired-state validation, credential reconciliation, location provisioning,
//! routing generation, disk discovery and array commit.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Input Validation Errors
    // =========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage location root must be an absolute path: {}", .path.display())]
    RelativeRoot { path: PathBuf },

    #[error("Port {port} is configured for more than one storage location")]
    DuplicatePort { port: u16 },

    #[error("Root {} is configured for more than one storage location", .path.display())]
    DuplicateRoot { path: PathBuf },

    #[error("Invalid user name: {name:?}")]
    InvalidUserName { name: String },

    #[error("Invalid RAID level: {0} (expected 0, 1 or 5)")]
    InvalidRaidLevel(String),

    #[error("RAID {level} requires at least {required} disks, {selected} selected")]
    InsufficientDisks {
        level: String,
        required: usize,
        selected: usize,
    },

    #[error("Disk {disk} is not in the eligible inventory")]
    IneligibleDisk { disk: String },

    // =========================================================================
    // Precondition Errors
    // =========================================================================
    #[error("No eligible disks found; skip RAID and provision a single-disk location instead")]
    NoEligibleDisks,

    #[error("Root filesystem source could not be determined: {0}")]
    RootDeviceUnknown(String),

    // =========================================================================
    // External Process Errors
    // =========================================================================
    #[error("Failed to spawn {program}: {reason}")]
    CommandSpawn { program: String, reason: String },

    #[error("Command {program} exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("Service configuration rejected by {service}: {reason}")]
    ServiceConfigInvalid { service: String, reason: String },

    #[error("Unexpected output from {program}: {reason}")]
    UnexpectedOutput { program: String, reason: String },

    // =========================================================================
    // Provisioning Errors
    // =========================================================================
    #[error("Migration from {} to {} failed: {reason}", .from.display(), .to.display())]
    MigrationFailed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error(
        "Array commit for {} stopped at step '{failed_step}' after completing [{}]: {reason}; \
         manual inspection required",
        .device.display(),
        .completed.join(", ")
    )]
    ArrayCommitIncomplete {
        device: PathBuf,
        completed: Vec<String>,
        failed_step: String,
        reason: String,
    },

    // =========================================================================
    // Prompt Errors
    // =========================================================================
    #[error("Prompt failed: {0}")]
    Prompt(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad classification used to decide how a failed run exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad operator input, reported before any side effect
    InputValidation,
    /// The host is not in a state the operation can start from
    Precondition,
    /// A shelled-out command failed
    ExternalProcess,
    /// The destructive array sequence stopped after the point of no return
    CommitIncomplete,
    /// Everything else
    Internal,
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidInput(_)
            | Error::RelativeRoot { .. }
            | Error::DuplicatePort { .. }
            | Error::DuplicateRoot { .. }
            | Error::InvalidUserName { .. }
            | Error::InvalidRaidLevel(_)
            | Error::InsufficientDisks { .. }
            | Error::IneligibleDisk { .. }
            | Error::Configuration(_)
            | Error::YamlParse(_) => ErrorCategory::InputValidation,

            Error::NoEligibleDisks | Error::RootDeviceUnknown(_) => ErrorCategory::Precondition,

            Error::CommandSpawn { .. }
            | Error::CommandFailed { .. }
            | Error::ServiceConfigInvalid { .. }
            | Error::UnexpectedOutput { .. } => ErrorCategory::ExternalProcess,

            Error::ArrayCommitIncomplete { .. } => ErrorCategory::CommitIncomplete,

            _ => ErrorCategory::Internal,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::InputValidation | ErrorCategory::Precondition => 1,
            ErrorCategory::ExternalProcess
            | ErrorCategory::CommitIncomplete
            | ErrorCategory::Internal => 2,
        }
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;
