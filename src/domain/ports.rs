//! Domain Ports - Core trait definitions for the provisioner
//!
//! These traits define the boundaries between the reconciliation logic and
//! the host it runs on. Adapters implement them to provide process execution
//! and operator interaction; tests swap in scripted implementations.

use crate::domain::desired::Secret;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// Storage Location
// =============================================================================

/// One provisioned root directory and the port it is served on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    /// Absolute root of the served tree
    pub root: PathBuf,
    /// Listening port for the routing unit
    pub port: u16,
}

impl StorageLocation {
    pub fn new(root: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            root: root.into(),
            port,
        }
    }

    /// Directory an ordinary user is confined to
    pub fn user_dir(&self, user: &User) -> PathBuf {
        self.root.join(user.name())
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.root.display(), self.port)
    }
}

// =============================================================================
// User
// =============================================================================

/// Characters that would break out of a quoted nginx string or a directive
pub const CONFIG_UNSAFE_CHARS: &[char] = &['"', '\'', '\\', '$', ';', '{', '}', '#'];

/// An account that authenticates against the credential store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct User(String);

impl User {
    /// Create a user, rejecting names that cannot be a credential key or a
    /// single path component
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name
                .chars()
                .any(|c| {
                    c == ':'
                        || c == '/'
                        || c.is_whitespace()
                        || c.is_control()
                        || CONFIG_UNSAFE_CHARS.contains(&c)
                });
        if !valid {
            return Err(Error::InvalidUserName { name });
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Disk Inventory Types
// =============================================================================

/// Drive type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveType {
    Nvme,
    Ssd,
    Hdd,
    Unknown,
}

impl fmt::Display for DriveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveType::Nvme => write!(f, "nvme"),
            DriveType::Ssd => write!(f, "ssd"),
            DriveType::Hdd => write!(f, "hdd"),
            DriveType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A whole disk that may become an array member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiskCandidate {
    /// Kernel name (e.g., sdb)
    pub name: String,
    /// Device path (e.g., /dev/sdb)
    pub path: PathBuf,
    /// Capacity in bytes
    pub size_bytes: u64,
    /// Model string, if reported
    pub model: Option<String>,
    /// Drive type
    pub drive_type: DriveType,
}

impl DiskCandidate {
    /// Whether an operator-typed identifier refers to this disk
    pub fn matches(&self, ident: &str) -> bool {
        let ident = ident.trim();
        ident == self.name || Path::new(ident) == self.path
    }
}

impl fmt::Display for DiskCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {:.1} GB, {})",
            self.path.display(),
            self.drive_type,
            self.size_bytes as f64 / 1_000_000_000.0,
            self.model.as_deref().unwrap_or("unknown model")
        )
    }
}

// =============================================================================
// System Executor Port
// =============================================================================

/// A command to run on the host
#[derive(Clone, PartialEq, Eq)]
pub struct SystemCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Indices into `args` that must never be printed
    redacted: Vec<usize>,
}

impl SystemCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redacted: Vec::new(),
        }
    }

    /// Append an argument that is masked in logs and errors
    pub fn secret_arg(mut self, secret: &Secret) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(secret.expose().to_string());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for SystemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if self.redacted.contains(&idx) {
                f.write_str(" ***")?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SystemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemCommand({})", self)
    }
}

/// Exit status and captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal)
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Port for running external programs
///
/// Every call blocks the caller until the process exits.
#[async_trait]
pub trait SystemExecutor: Send + Sync {
    /// Run a command and capture its output regardless of exit status
    async fn run(&self, command: &SystemCommand) -> Result<CommandOutput>;

    /// Run a command and turn a non-zero exit into [`Error::CommandFailed`]
    async fn run_checked(&self, command: &SystemCommand) -> Result<CommandOutput> {
        let output = self.run(command).await?;
        if !output.is_success() {
            return Err(Error::CommandFailed {
                program: command.program.clone(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

// =============================================================================
// Prompter Port
// =============================================================================

/// Port for operator interaction
pub trait Prompter: Send {
    /// Show an informational line to the operator
    fn note(&mut self, message: &str);

    /// Ask a free-form question, returning the default on empty input
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String>;

    /// Ask for a secret without echoing it; terminal implementations have
    /// the operator type it twice
    fn ask_secret(&mut self, question: &str) -> Result<String>;

    /// Ask a yes/no question
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type SystemExecutorRef = Arc<dyn SystemExecutor>;
