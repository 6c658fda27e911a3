//! Guarded form submission.
//!
//! A [`FormSubmitter`] stands for one loaded admin form. Its first
//! submission claims the [`SubmissionGuard`]; repeat submissions are
//! refused locally until the server reports a failure. A lost response, or
//! a success whose body cannot be read, keeps the guard claimed.

use cif_core::PageKind;
use cif_state::{GuardError, SubmissionGuard};
use thiserror::Error;

use crate::assets::{AssetClient, CsrfToken, SaveResult};
use crate::error::ClientError;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug)]
pub struct FormSubmitter {
    client: AssetClient,
    token: CsrfToken,
    guard: SubmissionGuard,
}

impl FormSubmitter {
    /// A freshly loaded form with an unclaimed guard.
    pub fn new(client: AssetClient, token: CsrfToken) -> Self {
        Self {
            client,
            token,
            guard: SubmissionGuard::new(),
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.guard.is_submitted()
    }

    /// Save a markdown page.
    pub async fn save_page(&self, page: PageKind, md_text: &str) -> Result<SaveResult, SubmitError> {
        self.guard.try_begin()?;
        let result = self.client.save_page(&self.token, page, md_text).await;
        self.settle(result)
    }

    /// Keep every committed upload of the client's context.
    pub async fn confirm_uploads(&self) -> Result<usize, SubmitError> {
        self.guard.try_begin()?;
        let result = self.client.confirm(&self.token).await;
        self.settle(result)
    }

    fn settle<T>(&self, result: Result<T, ClientError>) -> Result<T, SubmitError> {
        if let Err(err) = &result {
            if err.is_rejection() {
                self.guard.reset_on_failure();
            } else {
                tracing::warn!(error = %err, "submission outcome unknown; form stays locked");
            }
        }
        Ok(result?)
    }
}
