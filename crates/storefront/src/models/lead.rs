//! Marketing lead types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelf_core::{Email, LeadId};

/// Source tag used when the capture form does not send one.
pub const DEFAULT_LEAD_SOURCE: &str = "landing_page";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: LeadId,
    pub first_name: String,
    pub email: Email,
    pub source: String,
    /// Set once the same email completes a purchase.
    pub is_converted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub first_name: String,
    pub email: Email,
    pub source: String,
}
