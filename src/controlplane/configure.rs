//! Desired State Configurator
//!
//! Produces the [`DesiredState`] for a pass, either from a YAML file or by
//! asking the operator. Each answer is checked as it is given and asked again
//! when it is unusable; the assembled state is then validated once more as a
//! whole.

use crate::domain::desired::{
    validate_root, DesiredState, DesiredStateSpec, Secret, DEFAULT_ADMIN_USER,
};
use crate::domain::ports::{Prompter, StorageLocation, User};
use crate::error::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Upper bound on locations gathered interactively
const MAX_LOCATIONS: usize = 64;

const DEFAULT_ROOT: &str = "/srv/webdav";
const DEFAULT_PORT: u16 = 8080;

/// Load the desired state from a YAML file
pub async fn load_desired_state(path: &Path, secret_override: Option<Secret>) -> Result<DesiredState> {
    let file = DesiredStateSpec::load(path).await?;
    let desired = file.into_desired(secret_override)?;
    info!(
        "Loaded {} locations and {} users from {}",
        desired.locations().len(),
        desired.users().len(),
        path.display()
    );
    Ok(desired)
}

/// Gather the desired state from the operator. A `secret` supplied up front
/// is used as the default password instead of asking for one.
pub fn configure_interactively(
    prompter: &mut dyn Prompter,
    secret: Option<Secret>,
) -> Result<DesiredState> {
    let count = ask_location_count(prompter)?;

    let mut locations: Vec<StorageLocation> = Vec::with_capacity(count);
    for index in 0..count {
        let root = ask_root(prompter, index, &locations)?;
        let port = ask_port(prompter, &root, index, &locations)?;
        locations.push(StorageLocation::new(root, port));
    }

    let admin = loop {
        let answer = prompter.ask("Admin user (sees every user's files)", Some(DEFAULT_ADMIN_USER))?;
        match User::new(answer.trim()) {
            Ok(user) => break user,
            Err(e) => prompter.note(&e.to_string()),
        }
    };

    let users = loop {
        let answer = prompter.ask("Users (comma separated)", Some(""))?;
        match parse_user_list(&answer) {
            Ok(users) => break users,
            Err(e) => prompter.note(&e.to_string()),
        }
    };

    let secret = match secret {
        Some(secret) => secret,
        None => ask_default_secret(prompter)?,
    };

    DesiredState::new(admin, users, locations, secret)
}

fn ask_default_secret(prompter: &mut dyn Prompter) -> Result<Secret> {
    loop {
        let answer = prompter.ask_secret("Default password for new users")?;
        if answer.is_empty() {
            prompter.note("The default password must not be empty.");
            continue;
        }
        return Ok(Secret::new(answer));
    }
}

fn ask_location_count(prompter: &mut dyn Prompter) -> Result<usize> {
    loop {
        let answer = prompter.ask("Number of storage locations", Some("1"))?;
        match answer.trim().parse::<usize>() {
            Ok(n) if (1..=MAX_LOCATIONS).contains(&n) => return Ok(n),
            _ => prompter.note(&format!(
                "Enter a whole number between 1 and {}.",
                MAX_LOCATIONS
            )),
        }
    }
}

fn ask_root(
    prompter: &mut dyn Prompter,
    index: usize,
    taken: &[StorageLocation],
) -> Result<PathBuf> {
    let default = (index == 0).then_some(DEFAULT_ROOT);
    loop {
        let answer = prompter.ask(&format!("Root directory for location {}", index + 1), default)?;
        let root = PathBuf::from(answer.trim());
        if let Err(e) = validate_root(&root) {
            prompter.note(&e.to_string());
            continue;
        }
        if taken.iter().any(|l| l.root == root) {
            prompter.note(&format!("{} is already used by another location.", root.display()));
            continue;
        }
        return Ok(root);
    }
}

fn ask_port(
    prompter: &mut dyn Prompter,
    root: &Path,
    index: usize,
    taken: &[StorageLocation],
) -> Result<u16> {
    let suggested = (DEFAULT_PORT..=u16::MAX)
        .skip(index)
        .find(|p| !taken.iter().any(|l| l.port == *p))
        .map(|p| p.to_string());
    loop {
        let answer = prompter.ask(
            &format!("Port for {}", root.display()),
            suggested.as_deref(),
        )?;
        let port = match answer.trim().parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => {
                prompter.note("Enter a port between 1 and 65535.");
                continue;
            }
        };
        if taken.iter().any(|l| l.port == port) {
            prompter.note(&format!("Port {} is already used by another location.", port));
            continue;
        }
        return Ok(port);
    }
}

/// Split a comma-separated list into distinct users, keeping order
pub fn parse_user_list(input: &str) -> Result<Vec<User>> {
    let mut seen = HashSet::new();
    let mut users = Vec::new();
    for name in input.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let user = User::new(name)?;
        if seen.insert(user.clone()) {
            users.push(user);
        }
    }
    Ok(users)
}
