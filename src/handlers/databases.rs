use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::provisioning::ProvisionRequest;
use crate::types::DatabaseName;
use crate::types::api::{CreateDatabaseBody, DatabaseList};
use crate::{ProvisionError, router::ProvisionState};

/// GET /databases
pub async fn list_databases_handler(
    State(state): State<ProvisionState>,
) -> Result<Json<DatabaseList>, ProvisionError> {
    let databases = state.handle.list_databases().await?;
    Ok(Json(DatabaseList { databases }))
}

/// POST /databases -> create, lay out schema, then the optional extras.
pub async fn create_database_handler(
    State(state): State<ProvisionState>,
    Json(body): Json<CreateDatabaseBody>,
) -> Result<Response, ProvisionError> {
    let report = state
        .handle
        .provision(ProvisionRequest {
            name: DatabaseName::parse(body.name)?,
            demo_user: body.demo_user,
            fuzzymatch: body.fuzzymatch,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(report)).into_response())
}

/// DELETE /databases/{name}
pub async fn drop_database_handler(
    State(state): State<ProvisionState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ProvisionError> {
    state.handle.drop_database(DatabaseName::parse(name)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /databases/{name}/schema -> re-apply the schema template.
pub async fn apply_schema_handler(
    State(state): State<ProvisionState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ProvisionError> {
    state.handle.apply_schema(DatabaseName::parse(name)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /databases/{name}/fuzzymatch
pub async fn fuzzymatch_handler(
    State(state): State<ProvisionState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ProvisionError> {
    state
        .handle
        .install_fuzzy_match(DatabaseName::parse(name)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /databases/{name}/demo-user
pub async fn demo_user_handler(
    State(state): State<ProvisionState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ProvisionError> {
    state
        .handle
        .create_demo_user(DatabaseName::parse(name)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
