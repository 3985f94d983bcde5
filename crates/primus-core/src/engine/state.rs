//! Lifecycle state of this instance.

use crate::command::CommandKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `AwaitingReply` → `Alive` | `Dead`. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// `Request` sent, waiting for `Accepted`/`Denied` or the reply timeout.
    AwaitingReply,
    /// This process owns its identity and keeps running.
    Alive,
    /// Another instance handled this launch; the application should exit.
    Dead,
}

impl InstanceState {
    /// State after receiving a command of `kind` addressed to this instance's
    /// own identity, or `None` if the command causes no transition.
    pub fn on_command(self, kind: CommandKind) -> Option<InstanceState> {
        match (self, kind) {
            (InstanceState::AwaitingReply, CommandKind::Accepted) => Some(InstanceState::Alive),
            (InstanceState::AwaitingReply, CommandKind::Denied) => Some(InstanceState::Dead),
            (InstanceState::Alive, CommandKind::Abort) => Some(InstanceState::Dead),
            _ => None,
        }
    }

    /// State after the reply timeout fires.
    pub fn on_timeout(self) -> Option<InstanceState> {
        match self {
            InstanceState::AwaitingReply => Some(InstanceState::Alive),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == InstanceState::Dead
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::AwaitingReply => "awaiting_reply",
            InstanceState::Alive => "alive",
            InstanceState::Dead => "dead",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_resolve_awaiting() {
        let state = InstanceState::AwaitingReply;
        assert_eq!(state.on_command(CommandKind::Accepted), Some(InstanceState::Alive));
        assert_eq!(state.on_command(CommandKind::Denied), Some(InstanceState::Dead));
        assert_eq!(state.on_timeout(), Some(InstanceState::Alive));
    }

    #[test]
    fn test_alive_ignores_late_replies() {
        let state = InstanceState::Alive;
        assert_eq!(state.on_command(CommandKind::Accepted), None);
        assert_eq!(state.on_command(CommandKind::Denied), None);
        assert_eq!(state.on_timeout(), None);
        assert_eq!(state.on_command(CommandKind::Raise), None);
        assert_eq!(state.on_command(CommandKind::Abort), Some(InstanceState::Dead));
    }

    #[test]
    fn test_abort_only_applies_when_alive() {
        assert_eq!(InstanceState::AwaitingReply.on_command(CommandKind::Abort), None);
    }

    #[test]
    fn test_dead_is_terminal() {
        for kind in CommandKind::ALL {
            assert_eq!(InstanceState::Dead.on_command(kind), None);
        }
        assert_eq!(InstanceState::Dead.on_timeout(), None);
        assert!(InstanceState::Dead.is_terminal());
        assert!(!InstanceState::Alive.is_terminal());
    }
}
