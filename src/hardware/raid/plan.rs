//! RAID Plan Types
//!
//! A [`RaidPlan`] is the operator's draft. It only becomes a
//! [`ValidatedRaidPlan`] once it has passed [`RaidPlan::validate`], and only a
//! validated plan can be handed to the committer.

use crate::domain::ports::DiskCandidate;
use crate::error::{Error, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// RAID Level
// =============================================================================

/// Supported array layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaidLevel {
    Raid0,
    Raid1,
    Raid5,
}

impl RaidLevel {
    /// Fewest members the layout can be built from
    pub fn min_disks(&self) -> usize {
        match self {
            RaidLevel::Raid0 | RaidLevel::Raid1 => 2,
            RaidLevel::Raid5 => 3,
        }
    }

    /// Value for `mdadm --level=`
    pub fn mdadm_level(&self) -> &'static str {
        match self {
            RaidLevel::Raid0 => "0",
            RaidLevel::Raid1 => "1",
            RaidLevel::Raid5 => "5",
        }
    }

    /// Short description shown next to the choice
    pub fn describe(&self) -> &'static str {
        match self {
            RaidLevel::Raid0 => "striping, no redundancy",
            RaidLevel::Raid1 => "mirroring",
            RaidLevel::Raid5 => "striping with distributed parity",
        }
    }
}

impl FromStr for RaidLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let digits = normalized.strip_prefix("raid").unwrap_or(&normalized);
        match digits {
            "0" => Ok(RaidLevel::Raid0),
            "1" => Ok(RaidLevel::Raid1),
            "5" => Ok(RaidLevel::Raid5),
            _ => Err(Error::InvalidRaidLevel(s.trim().to_string())),
        }
    }
}

impl fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RAID {}", self.mdadm_level())
    }
}

// =============================================================================
// RAID Configuration
// =============================================================================

/// Host-side settings for building and persisting an array
#[derive(Debug, Clone)]
pub struct RaidConfig {
    /// md device to create
    pub device: PathBuf,
    /// Mountpoint offered to the operator
    pub default_mountpoint: PathBuf,
    /// Filesystem type for `mkfs.<fstype>`
    pub fstype: String,
    /// Wait after array creation before formatting
    pub settle: Duration,
    /// Mount table the array is persisted to
    pub fstab: PathBuf,
    /// Array definition file the scan output is appended to
    pub mdadm_conf: PathBuf,
    /// Exact answer that authorises the destructive sequence
    pub confirmation_token: String,
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/md0"),
            default_mountpoint: PathBuf::from("/mnt/raid"),
            fstype: "ext4".to_string(),
            settle: Duration::from_secs(5),
            fstab: PathBuf::from("/etc/fstab"),
            mdadm_conf: PathBuf::from("/etc/mdadm/mdadm.conf"),
            confirmation_token: "YES".to_string(),
        }
    }
}

// =============================================================================
// Draft Plan
// =============================================================================

/// An array being assembled by the operator
#[derive(Debug, Clone, Default)]
pub struct RaidPlan {
    level: Option<RaidLevel>,
    disks: IndexSet<DiskCandidate>,
}

impl RaidPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> Option<RaidLevel> {
        self.level
    }

    pub fn set_level(&mut self, level: RaidLevel) {
        self.level = Some(level);
    }

    /// Add a disk; false if it was already selected
    pub fn add_disk(&mut self, disk: DiskCandidate) -> bool {
        self.disks.insert(disk)
    }

    /// Selected disks in selection order
    pub fn disks(&self) -> impl Iterator<Item = &DiskCandidate> {
        self.disks.iter()
    }

    pub fn disk_count(&self) -> usize {
        self.disks.len()
    }

    /// Check the draft against the layout's minimum and the inventory
    pub fn validate(
        &self,
        eligible: &[DiskCandidate],
        device: &Path,
        mountpoint: &Path,
        fstype: &str,
    ) -> Result<ValidatedRaidPlan> {
        let level = self
            .level
            .ok_or_else(|| Error::InvalidInput("no RAID level chosen".to_string()))?;

        if self.disks.len() < level.min_disks() {
            return Err(Error::InsufficientDisks {
                level: level.mdadm_level().to_string(),
                required: level.min_disks(),
                selected: self.disks.len(),
            });
        }

        if let Some(disk) = self.disks.iter().find(|d| !eligible.contains(d)) {
            return Err(Error::IneligibleDisk {
                disk: disk.path.display().to_string(),
            });
        }

        check_mountpoint(mountpoint)?;

        Ok(ValidatedRaidPlan {
            level,
            disks: self.disks.iter().cloned().collect(),
            device: device.to_path_buf(),
            mountpoint: mountpoint.to_path_buf(),
            fstype: fstype.to_string(),
        })
    }
}

// =============================================================================
// Validated Plan
// =============================================================================

/// A plan that satisfies every constraint; the only input the committer takes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedRaidPlan {
    level: RaidLevel,
    disks: Vec<DiskCandidate>,
    device: PathBuf,
    mountpoint: PathBuf,
    fstype: String,
}

impl ValidatedRaidPlan {
    pub fn level(&self) -> RaidLevel {
        self.level
    }

    pub fn disks(&self) -> &[DiskCandidate] {
        &self.disks
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn fstype(&self) -> &str {
        &self.fstype
    }

    /// Replace the mountpoint, keeping the plan valid
    pub fn with_mountpoint(mut self, mountpoint: PathBuf) -> Result<Self> {
        check_mountpoint(&mountpoint)?;
        self.mountpoint = mountpoint;
        Ok(self)
    }
}

/// The mountpoint becomes one whitespace-separated field of an fstab line
fn check_mountpoint(mountpoint: &Path) -> Result<()> {
    if !mountpoint.is_absolute() {
        return Err(Error::InvalidInput(format!(
            "mountpoint must be an absolute path: {}",
            mountpoint.display()
        )));
    }
    if mountpoint
        .to_string_lossy()
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(Error::InvalidInput(format!(
            "mountpoint must not contain whitespace or control characters: {:?}",
            mountpoint
        )));
    }
    Ok(())
}
