// Dev-mode endpoints: short-lived room tokens and the demo page.
//
// Only mounted with --dev. Production deployments issue tokens out of
// band and never expose these routes.

use axum::extract::Query;
use axum::response::{Html, IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use agrelay_sfu::{auth, RoomId};

use super::{token_key, AppError, AppResult};

const DEV_TOKEN_TTL_MINUTES: i64 = 2;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(rename = "roomId")]
    room_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// `GET /get.token?roomId=<id>`
pub async fn get_token(Query(query): Query<TokenQuery>) -> AppResult<Json<TokenResponse>> {
    if query.room_id.is_empty() {
        return Err(AppError::bad_request("roomId must not be empty"));
    }

    let key = token_key("")?;
    let token = auth::sign_room_token(
        &RoomId::from(query.room_id),
        &key,
        chrono::Duration::minutes(DEV_TOKEN_TTL_MINUTES),
    )?;

    Ok(Json(TokenResponse { token }))
}

/// `GET /` — serve the demo page from the working directory on every
/// request, so edits take effect without a restart.
pub async fn index() -> Response {
    match tokio::fs::read_to_string("index.html").await {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            tracing::debug!(error = %err, "demo page not available");
            AppError::not_found("index.html not found").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_validate_for_the_requested_room() {
        let key = "dev-secret";
        let token = auth::sign_room_token(
            &RoomId::from("R1"),
            key,
            chrono::Duration::minutes(DEV_TOKEN_TTL_MINUTES),
        )
        .unwrap();

        let room_id =
            auth::room_id_from_token(&token, "", |_| Ok(key.to_string())).unwrap();
        assert_eq!(room_id, RoomId::from("R1"));
    }

    #[test]
    fn token_response_serializes_token_field() {
        let response = TokenResponse {
            token: "abc".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"token":"abc"}"#
        );
    }
}
