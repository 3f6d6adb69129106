use axum::{extract::State, http::StatusCode};

use crate::{ProvisionError, router::ProvisionState};

/// PUT /schema -> replace the base schema used for new databases.
pub async fn save_schema_handler(
    State(state): State<ProvisionState>,
    sql: String,
) -> Result<StatusCode, ProvisionError> {
    state.handle.save_schema(sql).await?;
    Ok(StatusCode::NO_CONTENT)
}
