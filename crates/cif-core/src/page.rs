//! # Editable Pages
//!
//! Markdown pages an administrator can edit from the admin area.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A participant-facing page whose text is stored as markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Introduction,
    Ethics,
    ThankYou,
    SitePolicies,
}

impl PageKind {
    pub const ALL: [PageKind; 4] = [
        Self::Introduction,
        Self::Ethics,
        Self::ThankYou,
        Self::SitePolicies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Introduction => "introduction",
            Self::Ethics => "ethics",
            Self::ThankYou => "thank_you",
            Self::SitePolicies => "site_policies",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownPage(s.to_string()))
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PageKind {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Reject page text that is empty or whitespace only.
pub fn validate_page_text(md_text: &str) -> Result<(), ValidationError> {
    if md_text.trim().is_empty() {
        Err(ValidationError::EmptyPageText)
    } else {
        Ok(())
    }
}
