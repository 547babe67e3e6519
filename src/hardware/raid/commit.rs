//! Array Committer
//!
//! Runs the destructive sequence for a confirmed plan: create the md array,
//! format it, persist it to the mount table and the array definition file,
//! then mount. Nothing is undone on failure. Once `mdadm --create` has run, any
//! later failure is reported with the list of steps that did complete.

use crate::domain::ports::{SystemCommand, SystemExecutorRef};
use crate::error::{Error, Result};
use crate::hardware::raid::plan::{RaidConfig, RaidLevel, ValidatedRaidPlan};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// A formatted, persisted and mounted array
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedArray {
    pub device: PathBuf,
    pub uuid: String,
    pub mountpoint: PathBuf,
    pub level: RaidLevel,
    pub members: Vec<PathBuf>,
    /// False when the mount table already carried this UUID
    pub fstab_updated: bool,
}

/// Steps completed so far, and the one in flight
struct CommitProgress {
    completed: Vec<String>,
    current: &'static str,
}

impl CommitProgress {
    fn begin(&mut self, step: &'static str) {
        info!("Array commit: {}", step);
        self.current = step;
    }

    fn done(&mut self) {
        self.completed.push(self.current.to_string());
    }
}

pub struct ArrayCommitter {
    executor: SystemExecutorRef,
    config: RaidConfig,
}

impl ArrayCommitter {
    pub fn new(executor: SystemExecutorRef, config: RaidConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &RaidConfig {
        &self.config
    }

    /// Build the array described by `plan`
    pub async fn commit(&self, plan: &ValidatedRaidPlan) -> Result<MountedArray> {
        let create = create_command(plan);
        warn!("Destroying existing data: {}", create);
        self.executor.run_checked(&create).await?;

        let mut progress = CommitProgress {
            completed: vec!["create-array".to_string()],
            current: "create-array",
        };

        match self.finish(plan, &mut progress).await {
            Ok(mounted) => {
                info!(
                    "{} {} mounted at {} (UUID {})",
                    mounted.level,
                    mounted.device.display(),
                    mounted.mountpoint.display(),
                    mounted.uuid
                );
                Ok(mounted)
            }
            Err(e) => Err(Error::ArrayCommitIncomplete {
                device: plan.device().to_path_buf(),
                completed: progress.completed,
                failed_step: progress.current.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn finish(
        &self,
        plan: &ValidatedRaidPlan,
        progress: &mut CommitProgress,
    ) -> Result<MountedArray> {
        let device = plan.device();

        progress.begin("settle");
        tokio::time::sleep(self.config.settle).await;
        progress.done();

        progress.begin("make-filesystem");
        self.executor.run_checked(&mkfs_command(plan)).await?;
        progress.done();

        progress.begin("create-mountpoint");
        tokio::fs::create_dir_all(plan.mountpoint()).await?;
        progress.done();

        progress.begin("read-uuid");
        let output = self
            .executor
            .run_checked(
                &SystemCommand::new("blkid")
                    .args(["-s", "UUID", "-o", "value"])
                    .path_arg(device),
            )
            .await?;
        let uuid = output.stdout.trim().to_string();
        if uuid.is_empty() || uuid.contains(char::is_whitespace) {
            return Err(Error::UnexpectedOutput {
                program: "blkid".into(),
                reason: format!("no filesystem UUID for {}", device.display()),
            });
        }
        progress.done();

        progress.begin("persist-mount");
        let fstab_updated = persist_mount(&self.config.fstab, &uuid, plan).await?;
        progress.done();

        progress.begin("persist-array");
        let scan = self
            .executor
            .run_checked(&SystemCommand::new("mdadm").args(["--detail", "--scan"]))
            .await?;
        persist_array(&self.config.mdadm_conf, &scan.stdout).await?;
        progress.done();

        progress.begin("mount");
        self.executor
            .run_checked(&SystemCommand::new("mount").arg("-a"))
            .await?;
        progress.done();

        Ok(MountedArray {
            device: device.to_path_buf(),
            uuid,
            mountpoint: plan.mountpoint().to_path_buf(),
            level: plan.level(),
            members: plan.disks().iter().map(|d| d.path.clone()).collect(),
            fstab_updated,
        })
    }
}

/// `mdadm --create <dev> --level=<n> --raid-devices=<k> --run <disks>`
pub fn create_command(plan: &ValidatedRaidPlan) -> SystemCommand {
    let mut cmd = SystemCommand::new("mdadm")
        .arg("--create")
        .path_arg(plan.device())
        .arg(format!("--level={}", plan.level().mdadm_level()))
        .arg(format!("--raid-devices={}", plan.disks().len()))
        .arg("--run");
    for disk in plan.disks() {
        cmd = cmd.path_arg(&disk.path);
    }
    cmd
}

fn mkfs_command(plan: &ValidatedRaidPlan) -> SystemCommand {
    let cmd = SystemCommand::new(format!("mkfs.{}", plan.fstype()));
    // ext* force with -F, xfs with -f
    let cmd = match plan.fstype() {
        fs if fs.starts_with("ext") => cmd.arg("-F"),
        "xfs" => cmd.arg("-f"),
        _ => cmd,
    };
    cmd.path_arg(plan.device())
}

/// Mount table line for the array
pub fn fstab_entry(uuid: &str, mountpoint: &Path, fstype: &str) -> String {
    format!(
        "UUID={} {} {} defaults,nofail 0 2",
        uuid,
        mountpoint.display(),
        fstype
    )
}

/// Append the array's mount line unless its UUID is already listed
async fn persist_mount(fstab: &Path, uuid: &str, plan: &ValidatedRaidPlan) -> Result<bool> {
    let existing = read_optional(fstab).await?;
    let needle = format!("UUID={}", uuid);
    let present = existing
        .lines()
        .any(|l| l.split_whitespace().next() == Some(needle.as_str()));
    if present {
        info!("{} already lists {}; leaving it unchanged", fstab.display(), needle);
        return Ok(false);
    }

    let line = fstab_entry(uuid, plan.mountpoint(), plan.fstype());
    append_lines(fstab, &existing, std::iter::once(line.as_str())).await?;
    Ok(true)
}

/// Append scan output lines not already in the array definition file
async fn persist_array(conf: &Path, scan: &str) -> Result<()> {
    if let Some(parent) = conf.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let existing = read_optional(conf).await?;
    let new_lines: Vec<&str> = scan
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !existing.lines().any(|e| e.trim() == *l))
        .collect();
    if new_lines.is_empty() {
        return Ok(());
    }
    append_lines(conf, &existing, new_lines.into_iter()).await
}

async fn read_optional(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

async fn append_lines<'a>(
    path: &Path,
    existing: &str,
    lines: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut buf = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        buf.push('\n');
    }
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(buf.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
