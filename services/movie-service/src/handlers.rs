use axum::extract::State;
use axum::Json;
use common_audit::SecurityEventKind;
use common_http_errors::ApiError;
use common_security::{ensure_any_role, GatewayIdentity, Role};
use serde_json::{json, Value};
use tracing::info;

use crate::catalog::{Movie, NewMovie};
use crate::AppState;

const EDITOR_ROLES: [Role; 2] = [Role::Admin, Role::Moderator];

pub async fn health() -> &'static str {
    "ok"
}

pub async fn list_movies(
    GatewayIdentity(ctx): GatewayIdentity,
    State(state): State<AppState>,
) -> Json<Value> {
    let movies = state.catalog.list().await;
    info!(username = %ctx.username, count = movies.len(), "movies listed");
    Json(json!({
        "movies": movies,
        "requestedBy": ctx.username,
        "roles": ctx.roles.to_claim(),
    }))
}

pub async fn create_movie(
    GatewayIdentity(ctx): GatewayIdentity,
    State(state): State<AppState>,
    Json(movie): Json<NewMovie>,
) -> Result<Json<Movie>, ApiError> {
    ensure_any_role(&ctx, &EDITOR_ROLES)?;
    if movie.title.trim().is_empty() {
        return Err(ApiError::bad_request("INVALID_TITLE", "Movie title must not be empty"));
    }

    let created = state.catalog.add(movie, &ctx.username).await;
    let reason = format!("movie:{}", created.id);
    state
        .audit
        .record(
            SecurityEventKind::ResourceCreated,
            ctx.actor.clone(),
            Some("POST"),
            Some("/movies"),
            Some(&reason),
        )
        .await;
    info!(username = %ctx.username, movie_id = created.id, "movie created");
    Ok(Json(created))
}
