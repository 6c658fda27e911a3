//! # Upload Session State Machine
//!
//! One session is opened per `process` call and tracks the upload until
//! it is either committed into the asset store or discarded.
//!
//! ## States
//!
//! ```text
//! Staged ──▶ Committed ──▶ Reverted (terminal)
//!   │
//!   └──▶ Failed (terminal)
//! ```
//!
//! A committed session is destroyed once confirmed on save. Reverted and
//! failed sessions are destroyed immediately by the session manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use cif_core::{AssetContext, AssetId, ContentDigest};

// ─── Session State ───────────────────────────────────────────────────

/// The lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Bytes received and validated, not yet durable.
    Staged,
    /// Bytes durably persisted under an identifier.
    Committed,
    /// Asset deleted by an explicit revert (terminal).
    Reverted,
    /// Upload rejected or the store write failed (terminal).
    Failed,
}

impl SessionState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reverted | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Staged => "STAGED",
            Self::Committed => "COMMITTED",
            Self::Reverted => "REVERTED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors that can occur during upload session transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Attempted transition is not valid from the current state.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Session is in a terminal state.
    #[error("session is in terminal state {state}")]
    TerminalState {
        /// The terminal state.
        state: String,
    },
}

/// Record of a session state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransitionRecord {
    pub from_state: SessionState,
    pub to_state: SessionState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

// ─── Upload Session ──────────────────────────────────────────────────

/// Server-side record of a single upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub session_id: Uuid,
    pub context: AssetContext,
    pub state: SessionState,
    /// Digest of the staged bytes.
    pub digest: ContentDigest,
    /// Identifier the bytes were committed under. Set on commit.
    pub content_ref: Option<AssetId>,
    /// Set when the owning form was saved.
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub transitions: Vec<SessionTransitionRecord>,
}

impl UploadSession {
    /// Open a session for bytes that passed validation.
    pub fn staged(context: AssetContext, digest: ContentDigest) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            context,
            state: SessionState::Staged,
            digest,
            content_ref: None,
            confirmed_at: None,
            created_at: Utc::now(),
            transitions: Vec::new(),
        }
    }

    /// The store persisted the bytes (STAGED → COMMITTED).
    pub fn commit(&mut self, identifier: AssetId) -> Result<(), SessionError> {
        self.require_state(SessionState::Staged, "COMMITTED")?;
        self.content_ref = Some(identifier);
        self.do_transition(SessionState::Committed, "persisted");
        Ok(())
    }

    /// Validation or persistence failed (STAGED → FAILED).
    pub fn fail(&mut self, reason: &str) -> Result<(), SessionError> {
        self.require_state(SessionState::Staged, "FAILED")?;
        self.do_transition(SessionState::Failed, reason);
        Ok(())
    }

    /// Explicit revert of a committed upload (COMMITTED → REVERTED).
    pub fn revert(&mut self) -> Result<(), SessionError> {
        self.require_state(SessionState::Committed, "REVERTED")?;
        self.do_transition(SessionState::Reverted, "reverted");
        Ok(())
    }

    /// Mark a committed upload as kept by a saved form.
    ///
    /// Does not change state; the manager destroys confirmed sessions.
    pub fn confirm(&mut self) -> Result<(), SessionError> {
        self.require_state(SessionState::Committed, "CONFIRMED")?;
        self.confirmed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn require_state(&self, expected: SessionState, target: &str) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::TerminalState {
                state: self.state.to_string(),
            });
        }
        if self.state != expected {
            return Err(SessionError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: SessionState, reason: &str) {
        self.transitions.push(SessionTransitionRecord {
            from_state: self.state,
            to_state: to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.state = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
