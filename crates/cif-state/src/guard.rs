//! # Submission Guard
//!
//! One-shot flag owned by a form. The first submission claims it; later
//! submissions are refused until the form is reloaded (a new guard) or the
//! server confirms the submission failed.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardError {
    #[error("form has already been submitted")]
    AlreadySubmitted,
}

#[derive(Debug, Default)]
pub struct SubmissionGuard {
    submitted: AtomicBool,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard. Exactly one caller succeeds.
    pub fn try_begin(&self) -> Result<(), GuardError> {
        self.submitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| GuardError::AlreadySubmitted)
    }

    /// Release the guard after the server reported a failure.
    pub fn reset_on_failure(&self) {
        self.submitted.store(false, Ordering::Release);
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_submission_is_refused() {
        let g = SubmissionGuard::new();
        assert!(g.try_begin().is_ok());
        assert_eq!(g.try_begin(), Err(GuardError::AlreadySubmitted));
        assert!(g.is_submitted());
    }

    #[test]
    fn reset_after_failure_allows_resubmission() {
        let g = SubmissionGuard::new();
        g.try_begin().unwrap();
        g.reset_on_failure();
        assert!(!g.is_submitted());
        assert!(g.try_begin().is_ok());
    }

    #[test]
    fn only_one_thread_wins() {
        let g = Arc::new(SubmissionGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let g = Arc::clone(&g);
                std::thread::spawn(move || g.try_begin().is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }
}
