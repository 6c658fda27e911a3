//! # cif-state — Lifecycle State Machines
//!
//! Runtime-checked state machines for the upload protocol. Each machine
//! keeps its current state plus an ordered transition log, and rejects
//! invalid transitions with a structured error.
//!
//! ## State Machines
//!
//! - **Upload session** (`session.rs`): server side,
//!   `Staged → Committed → Reverted` with a `Failed` branch.
//!
//! - **File entry** (`entry.rs`): client side,
//!   `Pending → Committing → Committed → Reverting → Reverted` with `Failed`.
//!
//! - **Submission guard** (`guard.rs`): one-shot flag for form saves.

pub mod entry;
pub mod guard;
pub mod session;

// ─── Session re-exports ─────────────────────────────────────────────

pub use session::{SessionError, SessionState, SessionTransitionRecord, UploadSession};

// ─── Entry re-exports ───────────────────────────────────────────────

pub use entry::{
    EntryError, EntryOrigin, EntryState, EntryTransitionRecord, FileEntry, Rejection,
};

// ─── Guard re-exports ───────────────────────────────────────────────

pub use guard::{GuardError, SubmissionGuard};
