use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::config::settings::ServerConfig;
use crate::helpers::time::get_instant;
use crate::provider::TokenProvider;
use crate::server::server::AppState;

#[derive(Clone)]
pub struct TokenState {
    provider: Option<TokenProvider>,
}

#[derive(Debug, Serialize)]
struct TokenBody<'a> {
    access_token: &'a str,
    token_type: &'a str,
    expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

impl TokenState {
    pub fn new(provider: Option<TokenProvider>) -> Self {
        Self { provider }
    }

    /// Serves the token only when credentials exist.
    pub fn router(&self, server_config: &ServerConfig) -> Router<AppState> {
        let mut router = Router::new();
        if self.provider.is_some() {
            info!("served path: {}", server_config.token_path);
            router = router.route(server_config.token_path.as_str(), get(get_token));
        }
        router
    }
}

async fn get_token(State(state): State<AppState>) -> Response {
    let Some(provider) = state.token_state.provider.as_ref() else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let start = get_instant();
    match provider.current().await {
        Ok(token) => {
            debug!(
                endpoint = provider.token_endpoint(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "token served"
            );
            Json(TokenBody {
                access_token: &token.access_token,
                token_type: &token.token_type,
                expires_at: token.expires_at,
                scope: token.scope.as_deref(),
            })
            .into_response()
        }
        Err(e) => {
            error!(endpoint = provider.token_endpoint(), error = %e, "cannot serve token");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.reason(), "message": e.to_string() })),
            )
                .into_response()
        }
    }
}
