//! Lead capture.
//!
//! Capturing the same email twice returns the first lead unchanged.

use serde::Deserialize;
use tracing::instrument;

use shelf_core::Email;

use crate::db::{RepositoryError, Storage};
use crate::error::ValidationErrors;
use crate::models::{DEFAULT_LEAD_SOURCE, Lead, NewLead};

const MAX_FIRST_NAME_LENGTH: usize = 100;
const MAX_SOURCE_LENGTH: usize = 50;

/// Sign-up form for the landing page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCapture {
    pub first_name: String,
    pub email: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Errors from lead operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadError {
    #[error("invalid lead: {0}")]
    Validation(ValidationErrors),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct LeadService<'a> {
    storage: &'a dyn Storage,
}

impl<'a> LeadService<'a> {
    #[must_use]
    pub const fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Record a prospect, or return the existing lead for that email.
    ///
    /// # Errors
    ///
    /// Returns `LeadError::Validation` for a blank name or malformed email.
    #[instrument(skip(self, capture), fields(source = ?capture.source))]
    pub async fn capture_lead(&self, capture: LeadCapture) -> Result<Lead, LeadError> {
        let new = validate(capture).map_err(LeadError::Validation)?;

        if let Some(existing) = self.storage.find_lead_by_email(&new.email).await? {
            return Ok(existing);
        }

        let email = new.email.clone();
        match self.storage.create_lead(new).await {
            Ok(lead) => {
                tracing::info!(lead_id = %lead.id, "Lead captured");
                Ok(lead)
            }
            // Lost a race with a concurrent capture of the same email.
            Err(RepositoryError::Conflict(_)) => self
                .storage
                .find_lead_by_email(&email)
                .await?
                .ok_or(LeadError::Repository(RepositoryError::NotFound)),
            Err(e) => Err(e.into()),
        }
    }

    /// Every lead, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LeadError::Repository` if storage fails.
    pub async fn list_leads(&self) -> Result<Vec<Lead>, LeadError> {
        Ok(self.storage.list_leads().await?)
    }

    /// Mark the lead with this email as converted. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `LeadError::Repository` if storage fails.
    pub async fn convert_lead(&self, email: &Email) -> Result<bool, LeadError> {
        Ok(self.storage.mark_lead_converted(email).await?)
    }
}

fn validate(capture: LeadCapture) -> Result<NewLead, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let first_name = capture.first_name.trim().to_owned();
    if first_name.is_empty() {
        errors.add("firstName", "First name is required");
    } else if first_name.chars().count() > MAX_FIRST_NAME_LENGTH {
        errors.add(
            "firstName",
            format!("First name must be at most {MAX_FIRST_NAME_LENGTH} characters"),
        );
    }

    let email = Email::parse(&capture.email)
        .map_err(|e| errors.add("email", format!("Invalid email address: {e}")))
        .ok();

    let source = capture
        .source
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_LEAD_SOURCE.to_owned());
    if source.chars().count() > MAX_SOURCE_LENGTH {
        errors.add(
            "source",
            format!("Source must be at most {MAX_SOURCE_LENGTH} characters"),
        );
    }

    errors.into_result()?;
    email
        .map(|email| NewLead {
            first_name,
            email,
            source,
        })
        .ok_or_else(|| ValidationErrors::single("email", "Invalid email address"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;

    fn capture(first_name: &str, email: &str) -> LeadCapture {
        LeadCapture {
            first_name: first_name.to_string(),
            email: email.to_string(),
            source: None,
        }
    }

    #[tokio::test]
    async fn test_capture_is_idempotent() {
        let storage = MemoryStorage::new();
        let leads = LeadService::new(&storage);

        let first = leads.capture_lead(capture("Ada", "ada@x.com")).await.unwrap();
        let second = leads
            .capture_lead(capture("Someone Else", "ADA@x.com"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.first_name, "Ada");
        assert_eq!(second.source, DEFAULT_LEAD_SOURCE);
        assert_eq!(leads.list_leads().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_rejects_bad_input() {
        let storage = MemoryStorage::new();
        let leads = LeadService::new(&storage);

        let Err(LeadError::Validation(errors)) =
            leads.capture_lead(capture(" ", "not-an-email")).await
        else {
            panic!("expected validation error");
        };
        assert!(errors.field("firstName").is_some());
        assert!(errors.field("email").is_some());
    }

    #[tokio::test]
    async fn test_convert_lead() {
        let storage = MemoryStorage::new();
        let leads = LeadService::new(&storage);
        leads.capture_lead(capture("Ada", "ada@x.com")).await.unwrap();

        let email = Email::parse("ada@x.com").unwrap();
        assert!(leads.convert_lead(&email).await.unwrap());
        assert!(
            leads
                .list_leads()
                .await
                .unwrap()
                .first()
                .unwrap()
                .is_converted
        );

        let stranger = Email::parse("nobody@x.com").unwrap();
        assert!(!leads.convert_lead(&stranger).await.unwrap());
    }
}
