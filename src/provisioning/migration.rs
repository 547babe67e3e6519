//! Root Migration
//!
//! When a previous run served a root that is no longer desired, its data can
//! be carried over to the new root. Detection compares the roots recorded in
//! previously generated units against the desired locations. The move itself
//! is content-preserving: each top-level entry is renamed into place, and
//! where a rename cannot cross filesystems the entry is copied, the copy is
//! verified, and only then is the source removed.

use crate::domain::desired::DesiredState;
use crate::error::{Error, Result};
use crate::routing::PriorUnit;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// `EXDEV` on Linux: rename across mount points
const CROSS_DEVICE_ERRNO: i32 = 18;

// =============================================================================
// Migration Intent
// =============================================================================

/// A prior root whose data may move to a new root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationIntent {
    pub old_root: PathBuf,
    pub new_root: PathBuf,
}

/// Result of moving one root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub old_root: PathBuf,
    pub new_root: PathBuf,
    /// Top-level entries now living under the new root
    pub moved: Vec<String>,
    /// Entries left at the old root because the name was already taken
    pub skipped: Vec<String>,
}

/// Operator decision on one intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MigrationDecision {
    Migrated(MigrationReport),
    Declined(MigrationIntent),
}

/// Whether `path` is a directory and not a symlink to one
async fn is_real_dir(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Derive migration intents from previously generated units
///
/// A prior root produces an intent only when it still exists as a real
/// directory and is not one of the desired roots. The target is the desired
/// location on the same port, else the first desired location. Roots nested
/// inside each other are never migrated.
pub async fn detect_migrations(
    prior: &[PriorUnit],
    desired: &DesiredState,
) -> Vec<MigrationIntent> {
    let mut intents: Vec<MigrationIntent> = Vec::new();
    let locations = desired.locations();

    for unit in prior {
        let Some(old_root) = unit.root.as_ref() else {
            continue;
        };
        if locations.iter().any(|l| &l.root == old_root) {
            debug!("Prior root {} is still desired", old_root.display());
            continue;
        }
        if intents.iter().any(|i| &i.old_root == old_root) {
            continue;
        }
        if !is_real_dir(old_root).await {
            debug!("Prior root {} no longer exists", old_root.display());
            continue;
        }

        let target = unit
            .port
            .and_then(|port| locations.iter().find(|l| l.port == port))
            .or_else(|| locations.first());
        let Some(target) = target else {
            continue;
        };

        if target.root.starts_with(old_root) || old_root.starts_with(&target.root) {
            warn!(
                "Not offering migration from {} to {}: one root contains the other",
                old_root.display(),
                target.root.display()
            );
            continue;
        }

        intents.push(MigrationIntent {
            old_root: old_root.clone(),
            new_root: target.root.clone(),
        });
    }

    intents
}

// =============================================================================
// Relocation
// =============================================================================

/// Move every top-level entry of `intent.old_root` into `intent.new_root`
pub async fn relocate(intent: &MigrationIntent) -> Result<MigrationReport> {
    let fail = |reason: String| Error::MigrationFailed {
        from: intent.old_root.clone(),
        to: intent.new_root.clone(),
        reason,
    };

    tokio::fs::create_dir_all(&intent.new_root)
        .await
        .map_err(|e| fail(format!("cannot create target: {}", e)))?;

    let mut report = MigrationReport {
        old_root: intent.old_root.clone(),
        new_root: intent.new_root.clone(),
        ..Default::default()
    };

    let mut entries = tokio::fs::read_dir(&intent.old_root)
        .await
        .map_err(|e| fail(format!("cannot read source: {}", e)))?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| fail(e.to_string()))?
    {
        names.push(entry.file_name());
    }
    names.sort();

    for name in names {
        let display = name.to_string_lossy().into_owned();
        let src = intent.old_root.join(&name);
        let dst = intent.new_root.join(&name);

        if tokio::fs::symlink_metadata(&dst).await.is_ok() {
            warn!(
                "{} already exists, leaving {} in place",
                dst.display(),
                src.display()
            );
            report.skipped.push(display);
            continue;
        }

        match tokio::fs::rename(&src, &dst).await {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
                debug!("{} crosses filesystems, copying", src.display());
                let (s, d) = (src.clone(), dst.clone());
                tokio::task::spawn_blocking(move || copy_verify_remove(&s, &d))
                    .await
                    .map_err(|e| fail(format!("copy task failed: {}", e)))?
                    .map_err(|e| fail(format!("{}: {}", src.display(), e)))?;
            }
            Err(e) => return Err(fail(format!("{}: {}", src.display(), e))),
        }
        report.moved.push(display);
    }

    info!(
        "Migrated {} entries from {} to {} ({} left in place)",
        report.moved.len(),
        intent.old_root.display(),
        intent.new_root.display(),
        report.skipped.len()
    );
    Ok(report)
}

/// File count and byte total of a tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub files: u64,
    pub bytes: u64,
}

/// Walk a tree without following symlinks
pub fn tree_stats(path: &Path) -> io::Result<TreeStats> {
    let meta = fs::symlink_metadata(path)?;
    let mut stats = TreeStats::default();
    if meta.is_dir() {
        for entry in fs::read_dir(path)? {
            let child = tree_stats(&entry?.path())?;
            stats.files += child.files;
            stats.bytes += child.bytes;
        }
    } else {
        stats.files = 1;
        stats.bytes = if meta.file_type().is_symlink() { 0 } else { meta.len() };
    }
    Ok(stats)
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    let file_type = meta.file_type();
    if file_type.is_dir() {
        fs::create_dir(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
        fs::set_permissions(dst, meta.permissions())?;
    } else if file_type.is_symlink() {
        std::os::unix::fs::symlink(fs::read_link(src)?, dst)?;
    } else {
        fs::copy(src, dst)?;
    }
    Ok(())
}

/// Copy `src` to `dst`, verify the copy, then remove `src`
///
/// `dst` must not exist. On a verification mismatch the partial copy is
/// removed and the source is left untouched.
pub fn copy_verify_remove(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::symlink_metadata(dst).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", dst.display()),
        ));
    }
    let expected = tree_stats(src)?;
    if let Err(e) = copy_tree(src, dst) {
        let _ = remove_tree(dst);
        return Err(e);
    }
    let actual = tree_stats(dst)?;
    if actual != expected {
        let _ = remove_tree(dst);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "copy verification failed: expected {:?}, found {:?}",
                expected, actual
            ),
        ));
    }
    remove_tree(src)
}

fn remove_tree(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
