//! Desired State
//!
//! The immutable description of what a reconciliation pass should converge
//! the host to. Built once from operator input, validated once, then passed
//! by reference to every component.

use crate::domain::ports::{StorageLocation, User, CONFIG_UNSAFE_CHARS};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Default admin identity
pub const DEFAULT_ADMIN_USER: &str = "admin";

// =============================================================================
// Secret
// =============================================================================

/// Plain-text secret handed to the credential tool; never printed
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// =============================================================================
// Desired State File
// =============================================================================

/// On-disk (YAML) form of the desired state
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DesiredStateSpec {
    #[serde(default = "default_admin")]
    pub admin_user: String,

    #[serde(default)]
    pub users: Vec<String>,

    pub locations: Vec<StorageLocation>,

    #[serde(default)]
    pub default_secret: Option<Secret>,
}

fn default_admin() -> String {
    DEFAULT_ADMIN_USER.to_string()
}

impl DesiredStateSpec {
    /// Parse a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a YAML file
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Validate into a [`DesiredState`]; `secret_override` wins over the file
    pub fn into_desired(self, secret_override: Option<Secret>) -> Result<DesiredState> {
        let secret = secret_override.or(self.default_secret).ok_or_else(|| {
            Error::Configuration("no default secret configured for new users".into())
        })?;
        let users = self
            .users
            .into_iter()
            .map(User::new)
            .collect::<Result<Vec<_>>>()?;
        DesiredState::new(User::new(self.admin_user)?, users, self.locations, secret)
    }
}

// =============================================================================
// Desired State
// =============================================================================

/// Check that a root can be served: absolute, and free of characters that
/// would break out of a routing unit directive
pub fn validate_root(root: &Path) -> Result<()> {
    if !root.is_absolute() {
        return Err(Error::RelativeRoot {
            path: root.to_path_buf(),
        });
    }
    let text = root.to_string_lossy();
    if text
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || CONFIG_UNSAFE_CHARS.contains(&c))
    {
        return Err(Error::InvalidInput(format!(
            "root {} contains characters that cannot appear in a routing unit",
            text
        )));
    }
    Ok(())
}

/// Validated desired state for one reconciliation pass
#[derive(Debug, Clone)]
pub struct DesiredState {
    admin: User,
    users: Vec<User>,
    locations: Vec<StorageLocation>,
    default_secret: Secret,
}

impl DesiredState {
    /// Validate and build. The admin is always part of the user set and is
    /// placed first when the caller did not list it; duplicate users are
    /// collapsed keeping first occurrence.
    pub fn new(
        admin: User,
        users: Vec<User>,
        locations: Vec<StorageLocation>,
        default_secret: Secret,
    ) -> Result<Self> {
        if locations.is_empty() {
            return Err(Error::InvalidInput(
                "at least one storage location is required".into(),
            ));
        }
        if default_secret.is_empty() {
            return Err(Error::InvalidInput("default secret must not be empty".into()));
        }

        let mut ports = HashSet::new();
        let mut roots = HashSet::new();
        for location in &locations {
            validate_root(&location.root)?;
            if location.port == 0 {
                return Err(Error::InvalidInput("port 0 is not a valid listening port".into()));
            }
            if !ports.insert(location.port) {
                return Err(Error::DuplicatePort {
                    port: location.port,
                });
            }
            if !roots.insert(location.root.clone()) {
                return Err(Error::DuplicateRoot {
                    path: location.root.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        let mut ordered = Vec::with_capacity(users.len() + 1);
        if !users.contains(&admin) {
            seen.insert(admin.clone());
            ordered.push(admin.clone());
        }
        for user in users {
            if seen.insert(user.clone()) {
                ordered.push(user);
            }
        }

        Ok(Self {
            admin,
            users: ordered,
            locations,
            default_secret,
        })
    }

    pub fn admin(&self) -> &User {
        &self.admin
    }

    /// Every desired user, admin included, in declaration order
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Users routed to their own subtree
    pub fn ordinary_users(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(move |u| *u != &self.admin)
    }

    pub fn locations(&self) -> &[StorageLocation] {
        &self.locations
    }

    pub fn default_secret(&self) -> &Secret {
        &self.default_secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn users(names: &[&str]) -> Vec<User> {
        names.iter().map(|n| User::new(*n).unwrap()).collect()
    }

    #[test]
    fn test_admin_inserted_first() {
        let state = DesiredState::new(
            User::new("admin").unwrap(),
            users(&["alice", "bob"]),
            vec![StorageLocation::new("/srv/webdav", 8080)],
            Secret::new("pw"),
        )
        .unwrap();

        let names: Vec<_> = state.users().iter().map(|u| u.name()).collect();
        assert_eq!(names, vec!["admin", "alice", "bob"]);
        let ordinary: Vec<_> = state.ordinary_users().map(|u| u.name()).collect();
        assert_eq!(ordinary, vec!["alice", "bob"]);
    }

    #[test]
    fn test_admin_position_kept_when_listed() {
        let state = DesiredState::new(
            User::new("admin").unwrap(),
            users(&["alice", "admin", "alice"]),
            vec![StorageLocation::new("/srv/webdav", 8080)],
            Secret::new("pw"),
        )
        .unwrap();

        let names: Vec<_> = state.users().iter().map(|u| u.name()).collect();
        assert_eq!(names, vec!["alice", "admin"]);
    }

    #[test]
    fn test_location_validation() {
        let admin = User::new("admin").unwrap();

        let err = DesiredState::new(
            admin.clone(),
            vec![],
            vec![
                StorageLocation::new("/srv/a", 8080),
                StorageLocation::new("/srv/b", 8080),
            ],
            Secret::new("pw"),
        )
        .unwrap_err();
        assert_matches!(err, Error::DuplicatePort { port: 8080 });

        let err = DesiredState::new(
            admin.clone(),
            vec![],
            vec![StorageLocation::new("srv/a", 8080)],
            Secret::new("pw"),
        )
        .unwrap_err();
        assert_matches!(err, Error::RelativeRoot { .. });

        let err = DesiredState::new(
            admin.clone(),
            vec![],
            vec![
                StorageLocation::new("/srv/a", 8080),
                StorageLocation::new("/srv/a", 8081),
            ],
            Secret::new("pw"),
        )
        .unwrap_err();
        assert_matches!(err, Error::DuplicateRoot { .. });

        let err = DesiredState::new(
            admin.clone(),
            vec![],
            vec![StorageLocation::new("/srv/my files", 8080)],
            Secret::new("pw"),
        )
        .unwrap_err();
        assert_matches!(err, Error::InvalidInput(_));

        let err = DesiredState::new(admin, vec![], vec![], Secret::new("pw")).unwrap_err();
        assert_matches!(err, Error::InvalidInput(_));
    }

    #[test]
    fn test_yaml_document() {
        let yaml = r#"
admin_user: root-admin
users: [alice, bob]
locations:
  - root: /srv/webdav
    port: 8080
  - root: /mnt/raid/dav
    port: 8081
default_secret: changeme
"#;
        let state = DesiredStateSpec::from_yaml(yaml)
            .unwrap()
            .into_desired(None)
            .unwrap();
        assert_eq!(state.admin().name(), "root-admin");
        assert_eq!(state.locations().len(), 2);
        assert_eq!(state.default_secret().expose(), "changeme");
        assert_eq!(state.users().len(), 3);
    }

    #[test]
    fn test_yaml_secret_override_and_missing() {
        let yaml = "locations:\n  - root: /srv/webdav\n    port: 8080\n";
        let doc = DesiredStateSpec::from_yaml(yaml).unwrap();
        assert_matches!(doc.clone().into_desired(None), Err(Error::Configuration(_)));

        let state = doc.into_desired(Some(Secret::new("pw"))).unwrap();
        assert_eq!(state.admin().name(), DEFAULT_ADMIN_USER);
        assert_eq!(state.users().len(), 1);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
    }
}
