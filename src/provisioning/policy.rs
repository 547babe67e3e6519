//! Ownership and Permission Policy
//!
//! One policy covers both the provisioned trees and the resources the serving
//! process creates later (`dav_access user:rw group:r`): owned by the service
//! identity, owner read/write, group read, others nothing. Directories keep
//! their search bit so the tree stays traversable.

use crate::domain::ports::SystemCommand;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ownership and mode applied recursively to every location tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPolicy {
    /// Owning user (the serving process identity)
    pub owner: String,
    /// Owning group
    pub group: String,
    /// Symbolic mode for `chmod -R`
    pub mode: String,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::for_service("www-data", "www-data")
    }
}

impl PermissionPolicy {
    /// Owner rw, group r, others none; `X` keeps directories searchable
    pub fn for_service(owner: &str, group: &str) -> Self {
        Self {
            owner: owner.to_string(),
            group: group.to_string(),
            mode: "u=rwX,g=rX,o=".to_string(),
        }
    }

    /// `chown -R owner:group <path>`
    pub fn chown_command(&self, path: &Path) -> SystemCommand {
        SystemCommand::new("chown")
            .arg("-R")
            .arg(format!("{}:{}", self.owner, self.group))
            .path_arg(path)
    }

    /// `chmod -R <mode> <path>`
    pub fn chmod_command(&self, path: &Path) -> SystemCommand {
        SystemCommand::new("chmod")
            .arg("-R")
            .arg(&self.mode)
            .path_arg(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        let policy = PermissionPolicy::default();
        let path = Path::new("/srv/webdav");
        assert_eq!(
            policy.chown_command(path).to_string(),
            "chown -R www-data:www-data /srv/webdav"
        );
        assert_eq!(
            policy.chmod_command(path).to_string(),
            "chmod -R u=rwX,g=rX,o= /srv/webdav"
        );
    }
}
