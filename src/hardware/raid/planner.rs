//! RAID Planner State Machine
//!
//! Pure transition logic for building an array. The planner never touches the
//! host: it consumes [`PlannerEvent`]s produced by whoever is talking to the
//! operator and reports how each one was received. Rejected input leaves the
//! state unchanged so the caller can ask again; terminal failures move the
//! planner to [`PlannerState::Failed`] and surface as an [`Error`].
//!
//! ```text
//! ScanningDisks -> SelectingDisks -> SelectingLevel -> ValidatingConstraints
//!     -> ConfirmingDestruction -> Committing -> Mounted
//!                              \-> Cancelled
//! ```

use crate::domain::ports::DiskCandidate;
use crate::error::{Error, Result};
use crate::hardware::raid::plan::{RaidConfig, RaidLevel, RaidPlan, ValidatedRaidPlan};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

// =============================================================================
// States and Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlannerState {
    ScanningDisks,
    SelectingDisks,
    SelectingLevel,
    ValidatingConstraints,
    ConfirmingDestruction,
    Committing,
    Mounted,
    Cancelled,
    Failed,
}

impl PlannerState {
    /// No further events are accepted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlannerState::Mounted | PlannerState::Cancelled | PlannerState::Failed
        )
    }
}

impl fmt::Display for PlannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Operator input and host results fed to the planner
#[derive(Debug, Clone)]
pub enum PlannerEvent {
    /// Eligible disks from the scanner
    InventoryScanned(Vec<DiskCandidate>),
    /// A disk identifier as typed (`sdb` or `/dev/sdb`)
    DiskSelected(String),
    /// The operator finished choosing disks
    SelectionDone,
    /// A RAID level as typed
    LevelChosen(String),
    /// Run the constraint check
    Validate,
    /// Mountpoint for the new filesystem
    MountpointChosen(PathBuf),
    /// The operator's answer to the destruction warning
    ConfirmationEntered(String),
    CommitSucceeded,
    CommitFailed,
}

/// How an event was received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    /// The planner moved to a new state
    Advanced(PlannerState),
    /// Input recorded without changing state
    Accepted,
    /// Input refused; state unchanged, ask again
    Rejected(String),
}

// =============================================================================
// Planner
// =============================================================================

pub struct RaidPlanner {
    config: RaidConfig,
    state: PlannerState,
    eligible: Vec<DiskCandidate>,
    draft: RaidPlan,
    validated: Option<ValidatedRaidPlan>,
}

impl RaidPlanner {
    pub fn new(config: RaidConfig) -> Self {
        Self {
            config,
            state: PlannerState::ScanningDisks,
            eligible: Vec::new(),
            draft: RaidPlan::new(),
            validated: None,
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn eligible(&self) -> &[DiskCandidate] {
        &self.eligible
    }

    pub fn draft(&self) -> &RaidPlan {
        &self.draft
    }

    /// The validated plan, once constraints have passed
    pub fn validated(&self) -> Option<&ValidatedRaidPlan> {
        self.validated.as_ref()
    }

    /// The plan the committer may act on; only available after confirmation
    pub fn committable(&self) -> Option<&ValidatedRaidPlan> {
        match self.state {
            PlannerState::Committing => self.validated.as_ref(),
            _ => None,
        }
    }

    /// Feed one event
    pub fn handle(&mut self, event: PlannerEvent) -> Result<Feedback> {
        debug!("Planner in {} received {:?}", self.state, event);

        match (self.state, event) {
            (PlannerState::ScanningDisks, PlannerEvent::InventoryScanned(disks)) => {
                if disks.is_empty() {
                    return self.fail(Error::NoEligibleDisks);
                }
                self.eligible = disks;
                Ok(self.advance(PlannerState::SelectingDisks))
            }

            (PlannerState::SelectingDisks, PlannerEvent::DiskSelected(ident)) => {
                Ok(self.select_disk(&ident))
            }

            (PlannerState::SelectingDisks, PlannerEvent::SelectionDone) => {
                if self.draft.disk_count() < 2 {
                    return self.fail(Error::InsufficientDisks {
                        level: "any".to_string(),
                        required: 2,
                        selected: self.draft.disk_count(),
                    });
                }
                Ok(self.advance(PlannerState::SelectingLevel))
            }

            (PlannerState::SelectingLevel, PlannerEvent::LevelChosen(answer)) => {
                match answer.parse::<RaidLevel>() {
                    Ok(level) => {
                        self.draft.set_level(level);
                        Ok(self.advance(PlannerState::ValidatingConstraints))
                    }
                    Err(e) => Ok(Feedback::Rejected(e.to_string())),
                }
            }

            (PlannerState::ValidatingConstraints, PlannerEvent::Validate) => {
                let result = self.draft.validate(
                    &self.eligible,
                    &self.config.device,
                    &self.config.default_mountpoint,
                    &self.config.fstype,
                );
                match result {
                    Ok(plan) => {
                        self.validated = Some(plan);
                        Ok(self.advance(PlannerState::ConfirmingDestruction))
                    }
                    Err(e) => self.fail(e),
                }
            }

            (PlannerState::ConfirmingDestruction, PlannerEvent::MountpointChosen(path)) => {
                let Some(plan) = self.validated.take() else {
                    return self.fail(Error::Internal("no validated plan to update".into()));
                };
                match plan.clone().with_mountpoint(path) {
                    Ok(updated) => {
                        self.validated = Some(updated);
                        Ok(Feedback::Accepted)
                    }
                    Err(e) => {
                        self.validated = Some(plan);
                        Ok(Feedback::Rejected(e.to_string()))
                    }
                }
            }

            (PlannerState::ConfirmingDestruction, PlannerEvent::ConfirmationEntered(answer)) => {
                // Exact match only; "yes" or "YES " cancel
                if answer == self.config.confirmation_token {
                    Ok(self.advance(PlannerState::Committing))
                } else {
                    Ok(self.advance(PlannerState::Cancelled))
                }
            }

            (PlannerState::Committing, PlannerEvent::CommitSucceeded) => {
                Ok(self.advance(PlannerState::Mounted))
            }

            (PlannerState::Committing, PlannerEvent::CommitFailed) => {
                Ok(self.advance(PlannerState::Failed))
            }

            (state, event) => {
                let message = format!("event {:?} is not valid in state {}", event, state);
                if state.is_terminal() {
                    return Err(Error::Internal(message));
                }
                self.fail(Error::Internal(message))
            }
        }
    }

    fn select_disk(&mut self, ident: &str) -> Feedback {
        let Some(disk) = self.eligible.iter().find(|d| d.matches(ident)) else {
            return Feedback::Rejected(format!("{} is not an eligible disk", ident.trim()));
        };
        if !self.draft.add_disk(disk.clone()) {
            return Feedback::Rejected(format!("{} is already selected", disk.path.display()));
        }
        Feedback::Accepted
    }

    fn advance(&mut self, next: PlannerState) -> Feedback {
        debug!("Planner {} -> {}", self.state, next);
        self.state = next;
        Feedback::Advanced(next)
    }

    fn fail(&mut self, error: Error) -> Result<Feedback> {
        warn!("Planner failed in {}: {}", self.state, error);
        self.state = PlannerState::Failed;
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::DriveType;
    use assert_matches::assert_matches;
    use std::path::Path;

    fn disk(name: &str) -> DiskCandidate {
        DiskCandidate {
            name: name.to_string(),
            path: PathBuf::from(format!("/dev/{}", name)),
            size_bytes: 2_000_000_000_000,
            model: None,
            drive_type: DriveType::Ssd,
        }
    }

    fn planner_with(disks: &[&str]) -> RaidPlanner {
        let mut planner = RaidPlanner::new(RaidConfig::default());
        planner
            .handle(PlannerEvent::InventoryScanned(
                disks.iter().map(|d| disk(d)).collect(),
            ))
            .unwrap();
        planner
    }

    fn select(planner: &mut RaidPlanner, idents: &[&str]) {
        for ident in idents {
            assert_eq!(
                planner
                    .handle(PlannerEvent::DiskSelected(ident.to_string()))
                    .unwrap(),
                Feedback::Accepted
            );
        }
    }

    #[test]
    fn test_no_eligible_disks_fails() {
        let mut planner = RaidPlanner::new(RaidConfig::default());
        let err = planner
            .handle(PlannerEvent::InventoryScanned(vec![]))
            .unwrap_err();
        assert_matches!(err, Error::NoEligibleDisks);
        assert_eq!(planner.state(), PlannerState::Failed);
    }

    #[test]
    fn test_invalid_and_duplicate_selection_keep_state() {
        let mut planner = planner_with(&["sdb", "sdc"]);
        select(&mut planner, &["sdb"]);

        let fb = planner
            .handle(PlannerEvent::DiskSelected("/dev/sdb".into()))
            .unwrap();
        assert_matches!(fb, Feedback::Rejected(msg) if msg.contains("already selected"));

        let fb = planner
            .handle(PlannerEvent::DiskSelected("sda".into()))
            .unwrap();
        assert_matches!(fb, Feedback::Rejected(msg) if msg.contains("not an eligible"));

        assert_eq!(planner.state(), PlannerState::SelectingDisks);
        assert_eq!(planner.draft().disk_count(), 1);
    }

    #[test]
    fn test_done_with_one_disk_fails() {
        let mut planner = planner_with(&["sdb", "sdc"]);
        select(&mut planner, &["sdb"]);
        let err = planner.handle(PlannerEvent::SelectionDone).unwrap_err();
        assert_matches!(err, Error::InsufficientDisks { required: 2, selected: 1, .. });
        assert_eq!(planner.state(), PlannerState::Failed);
    }

    #[test]
    fn test_bad_level_is_reprompted() {
        let mut planner = planner_with(&["sdb", "sdc"]);
        select(&mut planner, &["sdb", "sdc"]);
        planner.handle(PlannerEvent::SelectionDone).unwrap();

        let fb = planner.handle(PlannerEvent::LevelChosen("10".into())).unwrap();
        assert_matches!(fb, Feedback::Rejected(_));
        assert_eq!(planner.state(), PlannerState::SelectingLevel);

        let fb = planner.handle(PlannerEvent::LevelChosen("1".into())).unwrap();
        assert_eq!(fb, Feedback::Advanced(PlannerState::ValidatingConstraints));
    }

    #[test]
    fn test_raid5_with_two_disks_fails_validation() {
        let mut planner = planner_with(&["sdb", "sdc", "sdd"]);
        select(&mut planner, &["sdb", "sdc"]);
        planner.handle(PlannerEvent::SelectionDone).unwrap();
        planner.handle(PlannerEvent::LevelChosen("5".into())).unwrap();

        let err = planner.handle(PlannerEvent::Validate).unwrap_err();
        assert_matches!(err, Error::InsufficientDisks { required: 3, selected: 2, .. });
        assert_eq!(planner.state(), PlannerState::Failed);
        assert!(planner.committable().is_none());
    }

    fn confirming(planner: &mut RaidPlanner) {
        select(planner, &["sdb", "/dev/sdc"]);
        planner.handle(PlannerEvent::SelectionDone).unwrap();
        planner.handle(PlannerEvent::LevelChosen("1".into())).unwrap();
        assert_eq!(
            planner.handle(PlannerEvent::Validate).unwrap(),
            Feedback::Advanced(PlannerState::ConfirmingDestruction)
        );
    }

    #[test]
    fn test_lowercase_confirmation_cancels() {
        let mut planner = planner_with(&["sdb", "sdc"]);
        confirming(&mut planner);
        assert!(planner.committable().is_none());

        let fb = planner
            .handle(PlannerEvent::ConfirmationEntered("yes".into()))
            .unwrap();
        assert_eq!(fb, Feedback::Advanced(PlannerState::Cancelled));
        assert!(planner.committable().is_none());
        assert!(planner.handle(PlannerEvent::CommitSucceeded).is_err());
    }

    #[test]
    fn test_full_path_to_mounted() {
        let mut planner = planner_with(&["sdb", "sdc"]);
        confirming(&mut planner);

        assert_matches!(
            planner
                .handle(PlannerEvent::MountpointChosen(PathBuf::from("relative")))
                .unwrap(),
            Feedback::Rejected(_)
        );
        assert_eq!(
            planner
                .handle(PlannerEvent::MountpointChosen(PathBuf::from("/srv/raid")))
                .unwrap(),
            Feedback::Accepted
        );
        planner
            .handle(PlannerEvent::ConfirmationEntered("YES".into()))
            .unwrap();

        let plan = planner.committable().unwrap();
        assert_eq!(plan.mountpoint(), Path::new("/srv/raid"));
        assert_eq!(plan.device(), Path::new("/dev/md0"));
        assert_eq!(plan.disks().len(), 2);

        assert_eq!(
            planner.handle(PlannerEvent::CommitSucceeded).unwrap(),
            Feedback::Advanced(PlannerState::Mounted)
        );
        assert!(planner.state().is_terminal());
    }

    #[test]
    fn test_out_of_order_event_fails() {
        let mut planner = RaidPlanner::new(RaidConfig::default());
        let err = planner.handle(PlannerEvent::SelectionDone).unwrap_err();
        assert_matches!(err, Error::Internal(_));
        assert_eq!(planner.state(), PlannerState::Failed);
    }
}
