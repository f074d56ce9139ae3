//! Read-only profile lookup, served through the memoized read path.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use profile_core::Profile;
use tracing::error;

use super::AppState;

/// `GET /profiles/{user_uuid}`: the user's profile, or 404.
pub async fn profile_by_user_handler(
    State(state): State<AppState>,
    Path(user_uuid): Path<String>,
) -> Result<Json<Profile>, StatusCode> {
    match state.profiles.get_by_user_uuid(&user_uuid).await {
        Ok(Some(profile)) => Ok(Json(profile)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(user_uuid = %user_uuid, error = %format!("{e:#}"), "profile lookup failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
