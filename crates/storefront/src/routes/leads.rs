//! Lead capture route.

use axum::extract::State;
use tracing::instrument;

use super::ApiJson;
use crate::error::Result;
use crate::models::Lead;
use crate::services::{LeadCapture, LeadService};
use crate::state::AppState;

/// Capture a landing-page sign-up. Repeat sign-ups return the existing lead.
#[instrument(skip_all)]
pub async fn capture(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<LeadCapture>,
) -> Result<ApiJson<Lead>> {
    Ok(ApiJson(
        LeadService::new(state.storage()).capture_lead(form).await?,
    ))
}
