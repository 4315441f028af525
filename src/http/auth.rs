//! Authenticated-identity extractor.
//!
//! Authentication proper (tokens, OAuth) terminates at the upstream
//! gateway, which forwards the resolved identity in the `x-user-id`
//! header. This extractor resolves that identity against the user
//! directory; handlers never see an unauthenticated request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::models::user::UserAccount;

use super::AppState;

/// Header carrying the gateway-resolved user identity.
const USER_ID_HEADER: &str = "x-user-id";

/// The resolved, directory-backed identity of the caller.
pub struct AuthedUser(pub UserAccount);

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": message })),
    )
        .into_response()
}

impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(user_id) = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        else {
            return Err(unauthorized("authentication required"));
        };

        match state.users.get_by_id(user_id).await {
            Ok(Some(user)) => Ok(Self(user)),
            Ok(None) => Err(unauthorized("unknown identity")),
            Err(err) => Err(err.into_response()),
        }
    }
}
