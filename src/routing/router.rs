//! Location Router
//!
//! Owns the set of generated units in the serving process's include
//! directory. Every apply replaces the whole managed set, so locations
//! dropped from the desired state are retired automatically.

use crate::domain::desired::DesiredState;
use crate::error::Result;
use crate::routing::naming::{decode_root, unit_file_name, UNIT_EXTENSION};
use crate::routing::unit::{parse_unit_header, render_unit, RouterSettings};
use glob::Pattern;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A managed unit found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorUnit {
    pub path: PathBuf,
    pub root: Option<PathBuf>,
    pub port: Option<u16>,
}

/// What one apply changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingOutcome {
    /// Units written this pass
    pub written: Vec<PathBuf>,
    /// Previously managed units with no counterpart in this pass
    pub retired: Vec<PathBuf>,
}

pub struct LocationRouter {
    settings: RouterSettings,
}

impl LocationRouter {
    pub fn new(settings: RouterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Path of the unit that serves `root`
    pub fn unit_path(&self, root: &Path) -> PathBuf {
        self.settings
            .units_dir
            .join(unit_file_name(&self.settings.unit_prefix, root))
    }

    /// Managed unit files currently on disk, sorted by path
    pub fn managed_unit_paths(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/{}*.{}",
            Pattern::escape(&self.settings.units_dir.to_string_lossy()),
            Pattern::escape(&self.settings.unit_prefix),
            UNIT_EXTENSION
        );
        let mut paths = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| e.into_error())?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Read back the root and port of every managed unit
    pub async fn prior_units(&self) -> Result<Vec<PriorUnit>> {
        let mut units = Vec::new();
        for path in self.managed_unit_paths()? {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Cannot read prior unit {}: {}", path.display(), e);
                    continue;
                }
            };
            let header = parse_unit_header(&text);
            let root = header.root.or_else(|| self.root_from_file_name(&path));
            debug!("Prior unit {} -> root {:?}, port {:?}", path.display(), root, header.port);
            units.push(PriorUnit {
                path,
                root,
                port: header.port,
            });
        }
        Ok(units)
    }

    fn root_from_file_name(&self, path: &Path) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let token = stem.strip_prefix(&self.settings.unit_prefix)?;
        let bytes = decode_root(token)?;
        String::from_utf8(bytes).ok().map(PathBuf::from)
    }

    /// Delete every managed unit; returns what was removed
    pub async fn remove_managed_units(&self) -> Result<Vec<PathBuf>> {
        let paths = self.managed_unit_paths()?;
        for path in &paths {
            tokio::fs::remove_file(path).await?;
            debug!("Removed unit {}", path.display());
        }
        Ok(paths)
    }

    /// Replace the managed set with one unit per desired location
    pub async fn apply(&self, desired: &DesiredState) -> Result<RoutingOutcome> {
        tokio::fs::create_dir_all(&self.settings.units_dir).await?;
        tokio::fs::create_dir_all(&self.settings.log_dir).await?;

        let removed = self.remove_managed_units().await?;

        let mut written = Vec::with_capacity(desired.locations().len());
        for location in desired.locations() {
            let path = self.unit_path(&location.root);
            let unit = render_unit(location, desired.admin(), &self.settings);
            tokio::fs::write(&path, unit).await?;
            info!("Wrote routing unit {} for {}", path.display(), location);
            written.push(path);
        }

        let current: BTreeSet<&PathBuf> = written.iter().collect();
        let retired: Vec<PathBuf> = removed
            .into_iter()
            .filter(|p| !current.contains(p))
            .collect();
        for path in &retired {
            info!("Retired stale routing unit {}", path.display());
        }

        Ok(RoutingOutcome { written, retired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::desired::Secret;
    use crate::domain::ports::{StorageLocation, User};
    use tempfile::TempDir;

    fn router(tmp: &TempDir) -> LocationRouter {
        LocationRouter::new(RouterSettings {
            units_dir: tmp.path().join("conf.d"),
            log_dir: tmp.path().join("log"),
            ..Default::default()
        })
    }

    fn desired(locations: Vec<StorageLocation>) -> DesiredState {
        DesiredState::new(
            User::new("admin").unwrap(),
            vec![User::new("alice").unwrap()],
            locations,
            Secret::new("pw"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_apply_writes_one_unit_per_location() {
        let tmp = TempDir::new().unwrap();
        let router = router(&tmp);
        let state = desired(vec![
            StorageLocation::new("/srv/webdav", 8080),
            StorageLocation::new("/mnt/raid/dav", 8081),
        ]);

        let outcome = router.apply(&state).await.unwrap();
        assert_eq!(outcome.written.len(), 2);
        assert!(outcome.retired.is_empty());
        assert_eq!(router.managed_unit_paths().unwrap().len(), 2);

        let text = tokio::fs::read_to_string(router.unit_path(std::path::Path::new("/srv/webdav")))
            .await
            .unwrap();
        assert!(text.contains("listen 8080;"));
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let router = router(&tmp);
        let state = desired(vec![StorageLocation::new("/srv/webdav", 8080)]);

        router.apply(&state).await.unwrap();
        let first = tokio::fs::read(router.unit_path(std::path::Path::new("/srv/webdav")))
            .await
            .unwrap();
        let outcome = router.apply(&state).await.unwrap();
        let second = tokio::fs::read(router.unit_path(std::path::Path::new("/srv/webdav")))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(outcome.retired.is_empty());
    }

    #[tokio::test]
    async fn test_stale_units_are_retired_and_foreign_files_kept() {
        let tmp = TempDir::new().unwrap();
        let router = router(&tmp);

        router
            .apply(&desired(vec![StorageLocation::new("/srv/old", 8080)]))
            .await
            .unwrap();
        let foreign = router.settings().units_dir.join("default.conf");
        tokio::fs::write(&foreign, "server {}\n").await.unwrap();

        let outcome = router
            .apply(&desired(vec![StorageLocation::new("/srv/new", 8080)]))
            .await
            .unwrap();

        assert_eq!(outcome.retired, vec![router.unit_path(std::path::Path::new("/srv/old"))]);
        assert!(foreign.exists());
        let managed = router.managed_unit_paths().unwrap();
        assert_eq!(managed, vec![router.unit_path(std::path::Path::new("/srv/new"))]);
    }

    #[tokio::test]
    async fn test_prior_units_read_back_roots() {
        let tmp = TempDir::new().unwrap();
        let router = router(&tmp);
        router
            .apply(&desired(vec![StorageLocation::new("/srv/webdav", 8080)]))
            .await
            .unwrap();

        // a unit with its header stripped still yields a root via its name
        let bare = router.unit_path(std::path::Path::new("/data/legacy"));
        tokio::fs::write(&bare, "server {\n    listen 9090;\n}\n").await.unwrap();

        let prior = router.prior_units().await.unwrap();
        assert_eq!(prior.len(), 2);
        let legacy = prior.iter().find(|u| u.path == bare).unwrap();
        assert_eq!(legacy.root, Some(PathBuf::from("/data/legacy")));
        assert_eq!(legacy.port, Some(9090));
        let current = prior.iter().find(|u| u.path != bare).unwrap();
        assert_eq!(current.root, Some(PathBuf::from("/srv/webdav")));
        assert_eq!(current.port, Some(8080));
    }
}
