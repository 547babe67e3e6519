//! RAID Wizard
//!
//! Walks the operator through the planner: scan, pick disks, pick a level,
//! confirm, commit. All questions go through the [`Prompter`] port and all
//! host commands through the executor held by the scanner and committer.

use crate::domain::ports::Prompter;
use crate::error::{Error, Result};
use crate::hardware::discovery::DiskScanner;
use crate::hardware::raid::commit::{create_command, ArrayCommitter, MountedArray};
use crate::hardware::raid::planner::{Feedback, PlannerEvent, PlannerState, RaidPlanner};
use crate::hardware::raid::plan::RaidLevel;
use std::path::PathBuf;
use tracing::info;

/// How a wizard run ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaidOutcome {
    Mounted(MountedArray),
    /// The operator did not type the confirmation token
    Cancelled,
}

pub struct RaidWizard {
    scanner: DiskScanner,
    committer: ArrayCommitter,
}

impl RaidWizard {
    pub fn new(scanner: DiskScanner, committer: ArrayCommitter) -> Self {
        Self { scanner, committer }
    }

    pub async fn run(&self, prompter: &mut dyn Prompter) -> Result<RaidOutcome> {
        let config = self.committer.config().clone();
        let mut planner = RaidPlanner::new(config.clone());

        // ScanningDisks
        let inventory = self.scanner.scan().await?;
        for (name, reason) in &inventory.excluded {
            prompter.note(&format!("  skipping {}: {}", name, reason));
        }
        planner.handle(PlannerEvent::InventoryScanned(inventory.eligible))?;

        // SelectingDisks
        prompter.note("Eligible disks:");
        for disk in planner.eligible() {
            prompter.note(&format!("  {}", disk));
        }
        while planner.state() == PlannerState::SelectingDisks {
            let answer = prompter.ask("Disk to add (or 'done')", None)?;
            let event = if answer.trim().eq_ignore_ascii_case("done") {
                PlannerEvent::SelectionDone
            } else {
                PlannerEvent::DiskSelected(answer)
            };
            if let Feedback::Rejected(reason) = planner.handle(event)? {
                prompter.note(&reason);
            }
        }

        // SelectingLevel
        for level in [RaidLevel::Raid0, RaidLevel::Raid1, RaidLevel::Raid5] {
            prompter.note(&format!(
                "  {}: {} (min {} disks)",
                level.mdadm_level(),
                level.describe(),
                level.min_disks()
            ));
        }
        while planner.state() == PlannerState::SelectingLevel {
            let answer = prompter.ask("RAID level", None)?;
            if let Feedback::Rejected(reason) = planner.handle(PlannerEvent::LevelChosen(answer))? {
                prompter.note(&reason);
            }
        }

        // ValidatingConstraints
        planner.handle(PlannerEvent::Validate)?;

        // ConfirmingDestruction
        let default_mountpoint = config.default_mountpoint.display().to_string();
        loop {
            let answer = prompter.ask("Mountpoint", Some(&default_mountpoint))?;
            match planner.handle(PlannerEvent::MountpointChosen(PathBuf::from(answer.trim())))? {
                Feedback::Rejected(reason) => prompter.note(&reason),
                _ => break,
            }
        }

        let plan = planner
            .validated()
            .cloned()
            .ok_or_else(|| Error::Internal("constraints passed without a plan".into()))?;
        prompter.note(&format!(
            "WARNING: all data on {} will be destroyed.",
            plan.disks()
                .iter()
                .map(|d| d.path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        prompter.note(&format!("About to run: {}", create_command(&plan)));
        let answer = prompter.ask(
            &format!("Type {} to continue", config.confirmation_token),
            None,
        )?;
        if planner.handle(PlannerEvent::ConfirmationEntered(answer))?
            == Feedback::Advanced(PlannerState::Cancelled)
        {
            info!("Array creation cancelled by operator");
            prompter.note("Cancelled; no changes were made.");
            return Ok(RaidOutcome::Cancelled);
        }

        // Committing
        let plan = planner
            .committable()
            .cloned()
            .ok_or_else(|| Error::Internal("confirmation accepted without a plan".into()))?;
        match self.committer.commit(&plan).await {
            Ok(mounted) => {
                planner.handle(PlannerEvent::CommitSucceeded)?;
                prompter.note(&format!(
                    "{} mounted at {}; use it as a storage location root.",
                    mounted.device.display(),
                    mounted.mountpoint.display()
                ));
                Ok(RaidOutcome::Mounted(mounted))
            }
            Err(e) => {
                planner.handle(PlannerEvent::CommitFailed)?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CommandOutput;
    use crate::hardware::discovery::ScannerConfig;
    use crate::hardware::raid::plan::RaidConfig;
    use crate::interactive::ScriptedPrompter;
    use crate::system::ScriptedExecutor;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const LSBLK: &str = r#"{"blockdevices":[
        {"name":"sda","path":"/dev/sda","size":500107862016,"type":"disk","model":"Root SSD","rota":false},
        {"name":"sdb","path":"/dev/sdb","size":4000787030016,"type":"disk","model":"Data","rota":true},
        {"name":"sdc","path":"/dev/sdc","size":4000787030016,"type":"disk","model":"Data","rota":true},
        {"name":"sdd","path":"/dev/sdd","size":4000787030016,"type":"disk","model":"Data","rota":true}
    ]}"#;

    fn host(lsblk: &'static str) -> Arc<ScriptedExecutor> {
        Arc::new(
            ScriptedExecutor::new()
                .respond("findmnt", CommandOutput::success("/dev/sda2\n"))
                .respond("lsblk", CommandOutput::success(lsblk))
                .on_args("lsblk", &["-J", "-s"], |_| {
                    CommandOutput::success(
                        r#"{"blockdevices":[{"name":"sda2","type":"part","children":[{"name":"sda","type":"disk"}]}]}"#,
                    )
                })
                .respond("blkid", CommandOutput::success("0d6c7e4a-1111-4222-8333-944455556666\n"))
                .on_args("mdadm", &["--detail"], |_| {
                    CommandOutput::success("ARRAY /dev/md0 metadata=1.2 UUID=aa:bb:cc:dd\n")
                }),
        )
    }

    fn wizard(exec: Arc<ScriptedExecutor>, tmp: &TempDir) -> RaidWizard {
        let config = RaidConfig {
            settle: Duration::ZERO,
            fstab: tmp.path().join("fstab"),
            mdadm_conf: tmp.path().join("mdadm.conf"),
            ..RaidConfig::default()
        };
        RaidWizard::new(
            DiskScanner::new(exec.clone(), ScannerConfig::default()),
            ArrayCommitter::new(exec, config),
        )
    }

    #[tokio::test]
    async fn test_raid5_with_two_disks_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let exec = host(LSBLK);
        let mut prompter = ScriptedPrompter::new(["sdb", "sdc", "done", "5"]);

        let err = wizard(exec.clone(), &tmp).run(&mut prompter).await.unwrap_err();
        assert_matches!(err, Error::InsufficientDisks { required: 3, selected: 2, .. });
        assert_eq!(err.exit_code(), 1);
        assert!(!exec.was_called("mdadm"));
        assert!(!exec.was_called("mkfs.ext4"));
    }

    #[tokio::test]
    async fn test_lowercase_yes_cancels() {
        let tmp = TempDir::new().unwrap();
        let exec = host(LSBLK);
        let mut prompter = ScriptedPrompter::new(["sdb", "sdc", "done", "1", "", "yes"]);

        let outcome = wizard(exec.clone(), &tmp).run(&mut prompter).await.unwrap();
        assert_eq!(outcome, RaidOutcome::Cancelled);
        assert!(!exec.was_called("mdadm"));
        assert!(!exec.was_called("mkfs.ext4"));
        assert!(!tmp.path().join("fstab").exists());
    }

    #[tokio::test]
    async fn test_root_disk_rejected_then_array_built() {
        let tmp = TempDir::new().unwrap();
        let exec = host(LSBLK);
        let mountpoint = tmp.path().join("array");
        let mut prompter = ScriptedPrompter::new(vec![
            "sda".to_string(),
            "sdb".to_string(),
            "/dev/sdb".to_string(),
            "sdc".to_string(),
            "/dev/sdd".to_string(),
            "done".to_string(),
            "6".to_string(),
            "5".to_string(),
            "/mnt/my raid".to_string(),
            mountpoint.display().to_string(),
            "YES".to_string(),
        ]);

        let outcome = wizard(exec.clone(), &tmp).run(&mut prompter).await.unwrap();
        let mounted = assert_matches!(outcome, RaidOutcome::Mounted(m) => m);
        assert_eq!(mounted.level, RaidLevel::Raid5);
        assert_eq!(
            mounted.members,
            vec![
                PathBuf::from("/dev/sdb"),
                PathBuf::from("/dev/sdc"),
                PathBuf::from("/dev/sdd")
            ]
        );
        assert_eq!(mounted.mountpoint, mountpoint);
        assert_eq!(prompter.remaining(), 0);
        assert!(prompter
            .transcript
            .iter()
            .any(|line| line.contains("whitespace")));

        let create = &exec.calls_to("mdadm")[0];
        assert!(!create.args.contains(&"/dev/sda".to_string()));
        assert!(exec.was_called("mount"));
    }

    #[tokio::test]
    async fn test_only_root_disk_means_no_eligible_disks() {
        let tmp = TempDir::new().unwrap();
        let exec = host(
            r#"{"blockdevices":[{"name":"sda","path":"/dev/sda","size":500107862016,"type":"disk","model":null,"rota":false}]}"#,
        );
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());

        let err = wizard(exec, &tmp).run(&mut prompter).await.unwrap_err();
        assert_matches!(err, Error::NoEligibleDisks);
        assert_eq!(err.exit_code(), 1);
    }
}
