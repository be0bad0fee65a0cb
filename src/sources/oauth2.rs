use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::token::CachedToken;
use crate::error::{AuthError, AuthResult};
use crate::helpers::time::{get_instant, now_utc};
use crate::observability::metrics::get_metrics;
use crate::sources::signing::ClientAuthentication;
use crate::utils::constants::{
    AUTH_METHOD_CLIENT_SECRET_BASIC, AUTH_METHOD_CLIENT_SECRET_POST, AUTH_METHOD_PRIVATE_KEY_JWT,
    DEFAULT_TOKEN_TYPE, GRANT_TYPE_CLIENT_CREDENTIALS,
};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<Value>,
    scope: Option<String>,
}

/// Performs the client-credentials exchange against a token endpoint.
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    client: Client,
}

impl TokenExchangeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// POSTs `grant_type=client_credentials` and turns the answer into a cache entry.
    pub async fn exchange(
        &self,
        token_endpoint: &str,
        auth: &ClientAuthentication,
        scope: Option<&str>,
        tolerance: Duration,
    ) -> AuthResult<CachedToken> {
        let metrics = get_metrics().await;
        let auth_method = auth_method_label(auth);
        metrics
            .token_requests
            .with_label_values(&[token_endpoint, auth_method])
            .inc();

        let started = get_instant();
        let result = self.send(token_endpoint, auth, scope, tolerance).await;
        metrics
            .token_request_duration
            .with_label_values(&[token_endpoint])
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(token) => debug!(endpoint = token_endpoint, expires_at = %token.expires_at, "token issued"),
            Err(e) => {
                metrics
                    .token_request_failures
                    .with_label_values(&[token_endpoint, e.reason()])
                    .inc();
                warn!(endpoint = token_endpoint, error = %e, "token exchange failed");
            }
        }
        result
    }

    async fn send(
        &self,
        token_endpoint: &str,
        auth: &ClientAuthentication,
        scope: Option<&str>,
        tolerance: Duration,
    ) -> AuthResult<CachedToken> {
        let mut form: Vec<(&str, &str)> = vec![("grant_type", GRANT_TYPE_CLIENT_CREDENTIALS)];
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }
        form.extend(auth.form.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut request = self
            .client
            .post(token_endpoint)
            .header(ACCEPT, "application/json")
            .form(&form);
        if let Some(authorization) = &auth.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let issued_at = now_utc();
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::token_request(format!("cannot reach '{}': {}", token_endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::token_request(format!("cannot read token response: {}", e)))?;

        if !status.is_success() {
            return Err(AuthError::token_request_status(status.as_u16(), &body));
        }
        parse_token_response(&body, issued_at, tolerance)
    }
}

fn auth_method_label(auth: &ClientAuthentication) -> &'static str {
    if auth.authorization.is_some() {
        AUTH_METHOD_CLIENT_SECRET_BASIC
    } else if auth.form.iter().any(|(k, _)| k == "client_assertion") {
        AUTH_METHOD_PRIVATE_KEY_JWT
    } else {
        AUTH_METHOD_CLIENT_SECRET_POST
    }
}

/// Turns a successful token endpoint body into a cache entry.
///
/// `expires_in` is mandatory here: a token without a lifetime cannot be
/// cached safely. Servers that send it as a numeric string are accepted.
pub fn parse_token_response(
    body: &str,
    issued_at: DateTime<Utc>,
    tolerance: Duration,
) -> AuthResult<CachedToken> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::token_request(format!("token response is not valid JSON: {}", e)))?;

    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::token_request("token response has no access_token"))?;

    let expires_in = match response.expires_in {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => return Err(AuthError::token_request("token response has no expires_in")),
    }
    .filter(|seconds| *seconds > 0)
    .ok_or_else(|| AuthError::token_request("token response has an invalid expires_in"))?;

    let token_type = response
        .token_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());

    Ok(CachedToken::from_lifetime(
        access_token,
        token_type,
        issued_at,
        expires_in,
        tolerance,
        response.scope,
    ))
}
