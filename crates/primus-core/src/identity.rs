//! Application identity: which application, for which user session, in which
//! process.
//!
//! Two identities are the same application instance when `name`, `user` and
//! `display` match. The process id is informational only and takes no part in
//! equality, hashing or ordering, so a relaunch of the same application in the
//! same session maps onto the same registry key.

use crate::{PrimusError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Environment variables consulted for the session user, in order.
const USER_VARS: &[&str] = &["USER", "USERNAME", "LOGNAME"];

/// Environment variables consulted for the display/session token, in order.
const DISPLAY_VARS: &[&str] = &["DISPLAY", "WAYLAND_DISPLAY", "XDG_SESSION_ID", "SESSIONNAME"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppIdentity {
    pub name: String,
    pub user: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub pid: u32,
}

impl AppIdentity {
    /// Identity for `name` in the current user session and process.
    pub fn current(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user: first_env(USER_VARS),
            display: first_env(DISPLAY_VARS),
            pid: std::process::id(),
        }
    }

    /// Identity with every field given explicitly.
    pub fn new(
        name: impl Into<String>,
        user: impl Into<String>,
        display: impl Into<String>,
        pid: u32,
    ) -> Self {
        Self {
            name: name.into(),
            user: user.into(),
            display: display.into(),
            pid,
        }
    }

    /// An identity is valid when both `name` and `user` are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.user.is_empty()
    }

    /// Return `self` if valid, otherwise `PrimusError::InvalidIdentity`.
    pub fn validated(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(PrimusError::InvalidIdentity {
                name: self.name,
                user: self.user,
            })
        }
    }

    /// `user@display` session token.
    pub fn session(&self) -> String {
        format!("{}@{}", self.user, self.display)
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.name, &self.user, &self.display)
    }
}

fn first_env(vars: &[&str]) -> String {
    vars.iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

impl PartialEq for AppIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AppIdentity {}

impl Hash for AppIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for AppIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AppIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for AppIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, pid {})", self.name, self.session(), self.pid)
    }
}
