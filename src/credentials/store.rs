//! Credential Store
//!
//! Read-side model of the htpasswd file the serving process authenticates
//! against. One `username:hash` entry per line. Writes go through the
//! `htpasswd` tool so the hash format stays whatever that tool produces.

use crate::domain::ports::User;
use crate::error::Result;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Parsed snapshot of a credential file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStore {
    path: PathBuf,
    entries: IndexMap<String, String>,
}

impl CredentialStore {
    /// Load the store at `path`; `Ok(None)` when the file does not exist
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(Self::parse(path, &text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse file contents. Blank lines and `#` comments are ignored; lines
    /// without a separator are skipped. A repeated name keeps its first hash,
    /// which is the one the serving process matches.
    pub fn parse(path: &Path, text: &str) -> Self {
        let mut entries = IndexMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            match line.split_once(':') {
                Some((name, hash)) if !name.is_empty() => {
                    entries
                        .entry(name.to_string())
                        .or_insert_with(|| hash.to_string());
                }
                _ => warn!(
                    "Skipping malformed line {} in {}",
                    lineno + 1,
                    path.display()
                ),
            }
        }
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exact-name membership
    pub fn contains(&self, user: &User) -> bool {
        self.entries.contains_key(user.name())
    }

    pub fn hash_of(&self, user: &User) -> Option<&str> {
        self.entries.get(user.name()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in file order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// First character of a hash followed by one `*` per remaining character
pub fn redacted_preview(hash: &str) -> String {
    let mut chars = hash.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(hash.len());
            out.push(first);
            out.extend(chars.map(|_| '*'));
            out
        }
        None => String::new(),
    }
}
