use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::db::credential::Secret;
use crate::types::{DatabaseName, RoleName};
use crate::types::api::{CreateUserBody, CreatedUserResponse, GrantBody, GrantResponse};
use crate::{ProvisionError, router::ProvisionState};

/// POST /users -> create a login role; the password is generated when omitted.
pub async fn create_user_handler(
    State(state): State<ProvisionState>,
    Json(body): Json<CreateUserBody>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), ProvisionError> {
    let created = state
        .handle
        .create_user(
            RoleName::parse(body.username)?,
            body.password.map(Secret::new),
        )
        .await?;
    let response = CreatedUserResponse {
        username: created.username.to_string(),
        generated_password: created
            .generated_password
            .map(|p| p.expose().to_string()),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /users/{name}/grants
pub async fn grant_permissions_handler(
    State(state): State<ProvisionState>,
    Path(name): Path<String>,
    Json(body): Json<GrantBody>,
) -> Result<Json<GrantResponse>, ProvisionError> {
    let grants = state
        .handle
        .grant_permissions(
            RoleName::parse(name)?,
            DatabaseName::parse(body.database)?,
            body.admin,
            body.client,
        )
        .await?;
    Ok(Json(GrantResponse { grants }))
}
