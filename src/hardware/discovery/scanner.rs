//! Block Device Scanner
//!
//! Enumerates whole disks with `lsblk` and removes every disk backing the
//! root filesystem, leaving the disks an array may safely be built from.
//! Roots on LVM, dm-crypt or md are traced back through `lsblk -s` to all of
//! the physical disks underneath.

use crate::domain::ports::{DiskCandidate, DriveType, SystemCommand, SystemExecutorRef};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// =============================================================================
// Scanner Configuration
// =============================================================================

/// Configuration for the disk scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Minimum device size to include (bytes)
    pub min_size_bytes: u64,
    /// Mount point whose backing disks are never offered
    pub root_mount: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_size_bytes: 1_000_000_000, // 1GB minimum
            root_mount: PathBuf::from("/"),
        }
    }
}

// =============================================================================
// Disk Inventory
// =============================================================================

/// Result of one scan
#[derive(Debug, Clone, Serialize)]
pub struct DiskInventory {
    /// Kernel names of the disks hosting the root filesystem
    pub root_disks: Vec<String>,
    /// Disks eligible for an array, in `lsblk` order
    pub eligible: Vec<DiskCandidate>,
    /// Whole disks skipped, with the reason
    pub excluded: Vec<(String, String)>,
    pub scanned_at: DateTime<Utc>,
}

// =============================================================================
// Disk Scanner
// =============================================================================

pub struct DiskScanner {
    executor: SystemExecutorRef,
    config: ScannerConfig,
}

impl DiskScanner {
    pub fn new(executor: SystemExecutorRef, config: ScannerConfig) -> Self {
        Self { executor, config }
    }

    /// Enumerate eligible disks
    pub async fn scan(&self) -> Result<DiskInventory> {
        let root_disks = self.root_disks().await?;
        info!("Root filesystem lives on {}", root_disks.join(", "));

        let output = self
            .executor
            .run_checked(&SystemCommand::new("lsblk").args([
                "-J",
                "-b",
                "-d",
                "-o",
                "NAME,PATH,SIZE,TYPE,MODEL,ROTA",
            ]))
            .await?;
        let json: serde_json::Value = serde_json::from_str(&output.stdout)?;
        let devices = json["blockdevices"]
            .as_array()
            .ok_or_else(|| Error::UnexpectedOutput {
                program: "lsblk".into(),
                reason: "missing blockdevices array".into(),
            })?;

        let mut eligible = Vec::new();
        let mut excluded = Vec::new();

        for dev in devices {
            let Some(name) = dev["name"].as_str() else {
                continue;
            };
            let name = name.to_string();

            if dev["type"].as_str() != Some("disk") {
                debug!("Skipping {} (type {:?})", name, dev["type"]);
                continue;
            }
            if is_virtual_device(&name) {
                excluded.push((name, "virtual device".to_string()));
                continue;
            }
            if root_disks.contains(&name) {
                excluded.push((name, "hosts the root filesystem".to_string()));
                continue;
            }

            let size_bytes = json_u64(&dev["size"]).unwrap_or(0);
            if size_bytes < self.config.min_size_bytes {
                excluded.push((name, format!("too small ({} bytes)", size_bytes)));
                continue;
            }

            let path = dev["path"]
                .as_str()
                .map(PathBuf::from)
                .unwrap_or_else(|| Path::new("/dev").join(&name));
            let model = dev["model"]
                .as_str()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty());
            let drive_type = detect_drive_type(&name, &dev["rota"]);

            eligible.push(DiskCandidate {
                name,
                path,
                size_bytes,
                model,
                drive_type,
            });
        }

        info!(
            "Found {} eligible disks ({} excluded)",
            eligible.len(),
            excluded.len()
        );

        Ok(DiskInventory {
            root_disks,
            eligible,
            excluded,
            scanned_at: Utc::now(),
        })
    }

    /// Kernel names of every disk behind the root mount
    async fn root_disks(&self) -> Result<Vec<String>> {
        let output = self
            .executor
            .run_checked(
                &SystemCommand::new("findmnt")
                    .args(["-n", "-o", "SOURCE"])
                    .path_arg(&self.config.root_mount),
            )
            .await?;
        let source = output.stdout.lines().next().unwrap_or("").trim();
        // btrfs subvolumes are reported as /dev/sda2[/@]
        let source = source.split('[').next().unwrap_or("").trim();
        let name = Path::new(source)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::RootDeviceUnknown(output.stdout.trim().to_string()))?;

        if source.starts_with("/dev/") {
            match self.backing_disks(source).await {
                Ok(disks) if !disks.is_empty() => return Ok(disks),
                Ok(_) => warn!("No disk found beneath {}; guessing from its name", source),
                Err(e) => warn!(
                    "Could not trace {} to its disks ({}); guessing from its name",
                    source, e
                ),
            }
        }
        Ok(vec![strip_partition_suffix(name).to_string()])
    }

    /// Walk the inverse dependency tree of `source` up to its physical disks
    async fn backing_disks(&self, source: &str) -> Result<Vec<String>> {
        let output = self
            .executor
            .run_checked(
                &SystemCommand::new("lsblk")
                    .args(["-J", "-s", "-o", "NAME,TYPE"])
                    .arg(source),
            )
            .await?;
        let json: serde_json::Value = serde_json::from_str(&output.stdout)?;
        let mut disks = Vec::new();
        if let Some(nodes) = json["blockdevices"].as_array() {
            for node in nodes {
                collect_disks(node, &mut disks);
            }
        }
        debug!("{} sits on {:?}", source, disks);
        Ok(disks)
    }
}

/// With `lsblk -s` the children of a node are the devices it is built on
fn collect_disks(node: &serde_json::Value, out: &mut Vec<String>) {
    if node["type"].as_str() == Some("disk") {
        if let Some(name) = node["name"].as_str() {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
    }
    if let Some(children) = node["children"].as_array() {
        for child in children {
            collect_disks(child, out);
        }
    }
}

/// Kernel-managed devices that never back an array member
fn is_virtual_device(name: &str) -> bool {
    const VIRTUAL: &[&str] = &["loop", "ram", "dm-", "md", "zram"];
    VIRTUAL.iter().any(|p| name.starts_with(p))
}

/// Whole-disk name for a partition name
///
/// `sda2 -> sda`, `nvme0n1p2 -> nvme0n1`, `mmcblk0p1 -> mmcblk0`. Names that
/// are already whole disks come back unchanged.
pub fn strip_partition_suffix(name: &str) -> &str {
    let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if base.len() == name.len() {
        return name;
    }

    // <disk ending in a digit>p<N>
    if let Some(disk) = base.strip_suffix('p') {
        if disk.ends_with(|c: char| c.is_ascii_digit()) {
            return disk;
        }
    }

    // Names whose whole-disk form already ends in a digit
    const NUMBERED: &[&str] = &["nvme", "mmcblk", "nbd", "loop", "md", "zram", "ram"];
    if NUMBERED.iter().any(|p| name.starts_with(p)) {
        return name;
    }

    base
}

fn json_u64(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Classify from the kernel name and the rotational flag (bool or "0"/"1")
fn detect_drive_type(name: &str, rota: &serde_json::Value) -> DriveType {
    if name.starts_with("nvme") {
        return DriveType::Nvme;
    }
    let rotational = rota
        .as_bool()
        .or_else(|| match rota.as_str().map(str::trim) {
            Some("0") => Some(false),
            Some("1") => Some(true),
            _ => None,
        });
    match rotational {
        Some(false) => DriveType::Ssd,
        Some(true) => DriveType::Hdd,
        None => DriveType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CommandOutput;
    use crate::system::ScriptedExecutor;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    const SDA2_TREE: &str = r#"{"blockdevices": [
        {"name":"sda2", "type":"part", "children": [{"name":"sda", "type":"disk"}]}
    ]}"#;

    const LSBLK: &str = r#"{
   "blockdevices": [
      {"name":"sda", "path":"/dev/sda", "size":500107862016, "type":"disk", "model":"Samsung SSD 870", "rota":false},
      {"name":"sdb", "path":"/dev/sdb", "size":4000787030016, "type":"disk", "model":"WDC WD40EFRX  ", "rota":true},
      {"name":"sdc", "path":"/dev/sdc", "size":"4000787030016", "type":"disk", "model":null, "rota":"1"},
      {"name":"nvme0n1", "path":"/dev/nvme0n1", "size":1000204886016, "type":"disk", "model":"WD SN850", "rota":false},
      {"name":"loop0", "path":"/dev/loop0", "size":65011712, "type":"loop", "model":null, "rota":false},
      {"name":"sr0", "path":"/dev/sr0", "size":1073741312, "type":"rom", "model":"DVD", "rota":true},
      {"name":"sdd", "path":"/dev/sdd", "size":8388608, "type":"disk", "model":"USB", "rota":false}
   ]
}"#;

    /// Scanner seeing `LSBLK`, with root on `root_source`. `inverse` answers
    /// `lsblk -s` for that source; `None` makes the trace fail.
    fn scanner(root_source: &'static str, inverse: Option<&'static str>) -> DiskScanner {
        let traced = match inverse {
            Some(json) => CommandOutput::success(json),
            None => CommandOutput::failure(32, "lsblk: not a block device"),
        };
        let exec = ScriptedExecutor::new()
            .respond("findmnt", CommandOutput::success(root_source))
            .on_args("lsblk", &["-J", "-b", "-d"], |_| CommandOutput::success(LSBLK))
            .on_args("lsblk", &["-J", "-s"], move |_| traced.clone());
        DiskScanner::new(Arc::new(exec), ScannerConfig::default())
    }

    #[test]
    fn test_strip_partition_suffix() {
        assert_eq!(strip_partition_suffix("sda2"), "sda");
        assert_eq!(strip_partition_suffix("sda"), "sda");
        assert_eq!(strip_partition_suffix("vda15"), "vda");
        assert_eq!(strip_partition_suffix("xvda1"), "xvda");
        assert_eq!(strip_partition_suffix("nvme0n1p2"), "nvme0n1");
        assert_eq!(strip_partition_suffix("nvme0n1"), "nvme0n1");
        assert_eq!(strip_partition_suffix("mmcblk0p1"), "mmcblk0");
        assert_eq!(strip_partition_suffix("mmcblk0"), "mmcblk0");
    }

    #[tokio::test]
    async fn test_root_disk_is_never_eligible() {
        let inventory = scanner("/dev/sda2\n", Some(SDA2_TREE)).scan().await.unwrap();
        assert_eq!(inventory.root_disks, vec!["sda"]);

        let names: Vec<_> = inventory.eligible.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sdb", "sdc", "nvme0n1"]);
        assert!(inventory
            .excluded
            .iter()
            .any(|(n, why)| n == "sda" && why.contains("root")));
        assert!(inventory.excluded.iter().any(|(n, _)| n == "sdd"));
    }

    #[tokio::test]
    async fn test_nvme_root_with_subvolume() {
        // trace unavailable; the partition name is stripped instead
        let inventory = scanner("/dev/nvme0n1p3[/@]\n", None).scan().await.unwrap();
        assert_eq!(inventory.root_disks, vec!["nvme0n1"]);
        assert!(inventory.eligible.iter().all(|d| d.name != "nvme0n1"));
        assert!(inventory.eligible.iter().any(|d| d.name == "sda"));
    }

    #[tokio::test]
    async fn test_drive_details() {
        let inventory = scanner("/dev/sda2", Some(SDA2_TREE)).scan().await.unwrap();
        let sdb = &inventory.eligible[0];
        assert_eq!(sdb.drive_type, DriveType::Hdd);
        assert_eq!(sdb.model.as_deref(), Some("WDC WD40EFRX"));
        let sdc = &inventory.eligible[1];
        assert_eq!(sdc.size_bytes, 4_000_787_030_016);
        assert_eq!(sdc.drive_type, DriveType::Hdd);
        assert_eq!(sdc.model, None);
        assert_eq!(inventory.eligible[2].drive_type, DriveType::Nvme);
    }

    #[tokio::test]
    async fn test_unknown_root_source() {
        let err = scanner("\n", None).scan().await.unwrap_err();
        assert_matches!(err, Error::RootDeviceUnknown(_));
    }

    #[tokio::test]
    async fn test_lvm_root_excludes_physical_volumes() {
        // ubuntu-vg spans sda3 and a whole sdb
        let tree = r#"{"blockdevices": [
            {"name":"ubuntu--vg-ubuntu--lv", "type":"lvm", "children": [
                {"name":"sda3", "type":"part", "children": [{"name":"sda", "type":"disk"}]},
                {"name":"sdb", "type":"disk"}
            ]}
        ]}"#;
        let inventory = scanner("/dev/mapper/ubuntu--vg-ubuntu--lv\n", Some(tree))
            .scan()
            .await
            .unwrap();

        assert_eq!(inventory.root_disks, vec!["sda", "sdb"]);
        let names: Vec<_> = inventory.eligible.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sdc", "nvme0n1"]);
    }

    #[tokio::test]
    async fn test_md_root_excludes_every_member() {
        // root on a mirror of sdb1 and sdc1
        let tree = r#"{"blockdevices": [
            {"name":"md0", "type":"raid1", "children": [
                {"name":"sdb1", "type":"part", "children": [{"name":"sdb", "type":"disk"}]},
                {"name":"sdc1", "type":"part", "children": [{"name":"sdc", "type":"disk"}]}
            ]}
        ]}"#;
        let inventory = scanner("/dev/md0", Some(tree)).scan().await.unwrap();

        assert_eq!(inventory.root_disks, vec!["sdb", "sdc"]);
        let names: Vec<_> = inventory.eligible.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sda", "nvme0n1"]);
        assert_eq!(
            inventory
                .excluded
                .iter()
                .filter(|(_, why)| why.contains("root"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_empty_trace_falls_back_to_name() {
        let inventory = scanner("/dev/sda2", Some(r#"{"blockdevices": []}"#))
            .scan()
            .await
            .unwrap();
        assert_eq!(inventory.root_disks, vec!["sda"]);
    }

    #[test]
    fn test_virtual_devices() {
        assert!(!is_virtual_device("sda"));
        assert!(!is_virtual_device("nvme0n1"));
        assert!(is_virtual_device("loop0"));
        assert!(is_virtual_device("ram0"));
        assert!(is_virtual_device("dm-0"));
        assert!(is_virtual_device("md0"));
        assert!(is_virtual_device("zram0"));
    }
}
