// private_key_jwt against an axum token endpoint that verifies the signed
// assertion with the public half of the configured JWK.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::routing::post;
use axum::{Form, Json};
use http::StatusCode;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{json, Value};

use crate::config::auth::AuthSettings;
use crate::provider::CredentialFactory;
use crate::sources::signing::{ASSERTION_LIFETIME_SECONDS, CLIENT_ASSERTION_TYPE};
use crate::tests::common::{build_reqwest_client, ec_jwk, rsa_jwk, spawn_axum, token_body, Router};

type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Token endpoint recording every form it receives.
fn recording_token_router(seen: Seen) -> Router {
    Router::new().route(
        "/token",
        post(move |Form(form): Form<HashMap<String, String>>| {
            let seen = seen.clone();
            async move {
                let accepted = form.get("client_assertion_type").map(String::as_str) == Some(CLIENT_ASSERTION_TYPE)
                    && form.contains_key("client_assertion");
                seen.lock().unwrap().push(form);
                if accepted {
                    (StatusCode::OK, Json(token_body("jwt-token", 300)))
                } else {
                    (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_client" })))
                }
            }
        }),
    )
}

fn claims(assertion: &str, key: &DecodingKey, alg: Algorithm, audience: &str) -> Value {
    let mut validation = Validation::new(alg);
    validation.set_audience(&[audience]);
    validation.set_issuer(&["svc"]);
    decode::<Value>(assertion, key, &validation).expect("valid assertion").claims
}

#[tokio::test]
async fn rsa_assertion_is_accepted_by_token_endpoint() {
    let seen: Seen = Arc::default();
    let (handle, addr) = spawn_axum(recording_token_router(seen.clone())).await;
    let token_endpoint = format!("http://{}/token", addr);

    let jwk = rsa_jwk(Some("rsa-key"), None);
    let settings = AuthSettings::private_key("svc", jwk.to_string())
        .with_token_endpoint(&token_endpoint)
        .with_scope("system/Observation.read");
    let provider = CredentialFactory::new(build_reqwest_client())
        .create_credentials("https://fhir.example.com/r4", &settings)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(provider.current_token().await.unwrap(), "jwt-token");

    let forms = seen.lock().unwrap().clone();
    assert_eq!(forms.len(), 1);
    let form = &forms[0];
    assert_eq!(form["grant_type"], "client_credentials");
    assert_eq!(form["scope"], "system/Observation.read");
    assert_eq!(form["client_id"], "svc");
    assert!(!form.contains_key("client_secret"));

    let assertion = &form["client_assertion"];
    let header = decode_header(assertion).unwrap();
    assert_eq!(header.alg, Algorithm::RS384);
    assert_eq!(header.kid.as_deref(), Some("rsa-key"));

    let key = DecodingKey::from_rsa_components(jwk["n"].as_str().unwrap(), jwk["e"].as_str().unwrap()).unwrap();
    let claims = claims(assertion, &key, Algorithm::RS384, &token_endpoint);
    assert_eq!(claims["sub"], "svc");
    let lifetime = claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap();
    assert!(lifetime > 0 && lifetime <= ASSERTION_LIFETIME_SECONDS);

    handle.abort();
}

#[tokio::test]
async fn ec_assertion_uses_es_family_and_fresh_jti() {
    let seen: Seen = Arc::default();
    let (handle, addr) = spawn_axum(recording_token_router(seen.clone())).await;
    let token_endpoint = format!("http://{}/token", addr);

    let jwk = ec_jwk("P-256", None);
    let settings = AuthSettings::private_key("svc", jwk.to_string()).with_token_endpoint(&token_endpoint);
    let provider = CredentialFactory::new(build_reqwest_client())
        .create_credentials("https://fhir.example.com/r4", &settings)
        .await
        .unwrap()
        .unwrap();

    provider.current_token().await.unwrap();
    provider.invalidate().await;
    provider.current_token().await.unwrap();

    let forms = seen.lock().unwrap().clone();
    assert_eq!(forms.len(), 2);

    let key = DecodingKey::from_ec_components(jwk["x"].as_str().unwrap(), jwk["y"].as_str().unwrap()).unwrap();
    let jtis: Vec<String> = forms
        .iter()
        .map(|form| {
            let assertion = &form["client_assertion"];
            assert_eq!(decode_header(assertion).unwrap().alg, Algorithm::ES256);
            claims(assertion, &key, Algorithm::ES256, &token_endpoint)["jti"]
                .as_str()
                .unwrap()
                .to_owned()
        })
        .collect();
    assert_ne!(jtis[0], jtis[1]);

    handle.abort();
}
