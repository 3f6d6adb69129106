use crate::db::credential::Secret;
use crate::service::provisioning_actor::ProvisioningHandle;
use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct ProvisionState {
    pub handle: ProvisioningHandle,
    pub admin_key: Arc<Secret>,
}

impl ProvisionState {
    pub fn new(handle: ProvisioningHandle, admin_key: Secret) -> Self {
        Self {
            handle,
            admin_key: Arc::new(admin_key),
        }
    }
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

pub fn provision_router(state: ProvisionState) -> Router {
    use crate::handlers::databases::{
        apply_schema_handler, create_database_handler, demo_user_handler, drop_database_handler,
        fuzzymatch_handler, list_databases_handler,
    };
    use crate::handlers::schema::save_schema_handler;
    use crate::handlers::users::{create_user_handler, grant_permissions_handler};
    use crate::middleware::auth::RequireKeyAuth;

    let databases = Router::new()
        .route(
            "/databases",
            get(list_databases_handler).post(create_database_handler),
        )
        .route("/databases/{name}", delete(drop_database_handler))
        .route("/databases/{name}/schema", post(apply_schema_handler))
        .route("/databases/{name}/fuzzymatch", post(fuzzymatch_handler))
        .route("/databases/{name}/demo-user", post(demo_user_handler));

    let users = Router::new()
        .route("/users", post(create_user_handler))
        .route("/users/{name}/grants", post(grant_permissions_handler));

    let schema = Router::new().route("/schema", put(save_schema_handler));

    Router::new()
        .merge(databases)
        .merge(users)
        .merge(schema)
        .layer(middleware::from_extractor_with_state::<RequireKeyAuth, _>(
            state.clone(),
        ))
        .fallback(not_found_handler)
        .with_state(state)
}
