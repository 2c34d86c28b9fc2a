pub mod ws;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use lapak_domain::error::DomainError;
use lapak_domain::history::{ConversationMessage, InboxListing};

use crate::error::ApiError;
use crate::middleware::{
    self, AuthContext, auth_middleware, metrics_layer, propagate_request_id_layer,
    require_auth_middleware, set_request_id_layer, timeout_layer, trace_layer,
};
use crate::observability;
use crate::state::AppState;
use crate::validation::validate;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/chat/inbox", get(seller_inbox))
        .route(
            "/v1/chat/listings/:listing_id/messages",
            get(conversation_messages),
        )
        .route("/v1/chat/ws", get(ws::chat_socket))
        .route_layer(from_fn(require_auth_middleware));

    let public = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics));

    let mut router = protected
        .merge(public)
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn(metrics_layer))
        .layer(trace_layer())
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
        .layer(timeout_layer());

    if state.config.app_env != "test" {
        router = router.layer(middleware::rate_limit_layer());
    }

    router.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> String {
    observability::render_metrics().unwrap_or_default()
}

#[derive(Debug, Deserialize, Validate)]
struct ConversationQuery {
    #[validate(length(min = 1, message = "buyer_id must not be empty"))]
    buyer_id: Option<String>,
}

async fn conversation_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(listing_id): Path<String>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<ConversationMessage>>, ApiError> {
    validate(&query)?;
    let actor = middleware::actor_identity(&auth)?;
    let messages = state
        .history_service()
        .get_conversation(&actor, &listing_id, query.buyer_id.as_deref())
        .await
        .map_err(map_domain_error)?;
    Ok(Json(messages))
}

async fn seller_inbox(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<InboxListing>>, ApiError> {
    let actor = middleware::actor_identity(&auth)?;
    let inbox = state
        .history_service()
        .seller_inbox(&actor)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(inbox))
}

pub(crate) fn map_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(message) => ApiError::Validation(message),
        DomainError::NotFound => ApiError::NotFound,
        DomainError::Unauthorized => ApiError::Unauthorized,
        DomainError::Storage(message) => {
            tracing::error!(error = %message, "storage failure");
            ApiError::Unavailable
        }
    }
}
