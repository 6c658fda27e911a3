//! # Client File Entry State Machine
//!
//! Tracks one file in the admin client's file list, independent of any
//! UI toolkit.
//!
//! ## States
//!
//! ```text
//! Pending ──▶ Committing ──▶ Committed ──▶ Reverting ──▶ Reverted (terminal)
//!    ▲            │              ▲              │
//!    │            ▼              └──────────────┘ (revert failed)
//!    └────────  Failed
//!     (retryable only)
//! ```
//!
//! Entries seeded from the reconciliation list start in `Committed` with
//! [`EntryOrigin::Limbo`].
//!
//! An entry removed while `Committing` is flagged `removed`; when the
//! upload resolves, the caller checks [`FileEntry::needs_orphan_revert`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cif_core::AssetId;

// ─── Entry State ─────────────────────────────────────────────────────

/// The lifecycle state of a client-side file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryState {
    /// Added locally, upload not yet started.
    Pending,
    /// `process` in flight.
    Committing,
    /// Bound to a server identifier.
    Committed,
    /// `revert` in flight.
    Reverting,
    /// Server asset removed (terminal).
    Reverted,
    /// Upload rejected or failed.
    Failed,
}

impl EntryState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reverted)
    }

    /// Whether a server call is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Committing | Self::Reverting)
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Committing => "COMMITTING",
            Self::Committed => "COMMITTED",
            Self::Reverting => "REVERTING",
            Self::Reverted => "REVERTED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Where an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryOrigin {
    /// Already persisted when the controller booted.
    Limbo,
    /// Added in this session.
    Fresh,
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("invalid entry transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("entry is in terminal state {state}")]
    TerminalState { state: String },

    /// Only failures caused by the network may be retried.
    #[error("entry failure is not retryable")]
    NotRetryable,
}

/// Record of an entry state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryTransitionRecord {
    pub from_state: EntryState,
    pub to_state: EntryState,
    pub timestamp: DateTime<Utc>,
}

/// Why an upload did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub message: String,
    /// True for network failures the user may retry.
    pub retryable: bool,
}

// ─── File Entry ──────────────────────────────────────────────────────

/// One file in the client's list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub origin: EntryOrigin,
    pub state: EntryState,
    pub identifier: Option<AssetId>,
    /// Local file name, for display.
    pub file_name: Option<String>,
    pub rejection: Option<Rejection>,
    /// Removed by the user while an upload was in flight.
    pub removed: bool,
    pub transitions: Vec<EntryTransitionRecord>,
}

impl FileEntry {
    /// A freshly added file.
    pub fn fresh(file_name: impl Into<String>) -> Self {
        Self {
            origin: EntryOrigin::Fresh,
            state: EntryState::Pending,
            identifier: None,
            file_name: Some(file_name.into()),
            rejection: None,
            removed: false,
            transitions: Vec::new(),
        }
    }

    /// An asset that was already persisted at boot.
    pub fn limbo(identifier: AssetId) -> Self {
        Self {
            origin: EntryOrigin::Limbo,
            state: EntryState::Committed,
            identifier: Some(identifier),
            file_name: None,
            rejection: None,
            removed: false,
            transitions: Vec::new(),
        }
    }

    /// PENDING → COMMITTING.
    pub fn begin_commit(&mut self) -> Result<(), EntryError> {
        self.require_state(EntryState::Pending, "COMMITTING")?;
        self.rejection = None;
        self.do_transition(EntryState::Committing);
        Ok(())
    }

    /// COMMITTING → COMMITTED.
    pub fn committed(&mut self, identifier: AssetId) -> Result<(), EntryError> {
        self.require_state(EntryState::Committing, "COMMITTED")?;
        self.identifier = Some(identifier);
        self.do_transition(EntryState::Committed);
        Ok(())
    }

    /// COMMITTING → FAILED. The entry stays in the list unresolved.
    pub fn rejected(&mut self, rejection: Rejection) -> Result<(), EntryError> {
        self.require_state(EntryState::Committing, "FAILED")?;
        self.rejection = Some(rejection);
        self.do_transition(EntryState::Failed);
        Ok(())
    }

    /// FAILED → PENDING, only after a retryable failure.
    pub fn retry(&mut self) -> Result<(), EntryError> {
        self.require_state(EntryState::Failed, "PENDING")?;
        if !self.rejection.as_ref().is_some_and(|r| r.retryable) {
            return Err(EntryError::NotRetryable);
        }
        self.do_transition(EntryState::Pending);
        Ok(())
    }

    /// COMMITTED → REVERTING.
    pub fn begin_revert(&mut self) -> Result<(), EntryError> {
        self.require_state(EntryState::Committed, "REVERTING")?;
        self.do_transition(EntryState::Reverting);
        Ok(())
    }

    /// REVERTING → REVERTED.
    pub fn reverted(&mut self) -> Result<(), EntryError> {
        self.require_state(EntryState::Reverting, "REVERTED")?;
        self.do_transition(EntryState::Reverted);
        Ok(())
    }

    /// REVERTING → COMMITTED, after a revert that did not reach the server.
    pub fn revert_failed(&mut self, rejection: Rejection) -> Result<(), EntryError> {
        self.require_state(EntryState::Reverting, "COMMITTED")?;
        self.rejection = Some(rejection);
        self.do_transition(EntryState::Committed);
        Ok(())
    }

    /// Flag the entry as removed by the user.
    pub fn mark_removed(&mut self) {
        self.removed = true;
    }

    /// A removed entry whose upload committed anyway and must be reverted.
    pub fn needs_orphan_revert(&self) -> bool {
        self.removed && self.state == EntryState::Committed
    }

    fn require_state(&self, expected: EntryState, target: &str) -> Result<(), EntryError> {
        if self.state.is_terminal() {
            return Err(EntryError::TerminalState {
                state: self.state.to_string(),
            });
        }
        if self.state != expected {
            return Err(EntryError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: EntryState) {
        self.transitions.push(EntryTransitionRecord {
            from_state: self.state,
            to_state: to,
            timestamp: Utc::now(),
        });
        self.state = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
