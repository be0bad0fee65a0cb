// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use reqwest::Client;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::RsaPrivateKey;
use serde_json::Value;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

fn b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One RSA key per test binary; generating them is slow.
fn rsa_base_jwk() -> &'static Value {
    static KEY: OnceLock<Value> = OnceLock::new();
    KEY.get_or_init(|| {
        let key = RsaPrivateKey::new(&mut OsRng, 2048).expect("rsa keygen");
        let primes = key.primes();
        json!({
            "kty": "RSA",
            "n": b64(&key.n().to_bytes_be()),
            "e": b64(&key.e().to_bytes_be()),
            "d": b64(&key.d().to_bytes_be()),
            "p": b64(&primes[0].to_bytes_be()),
            "q": b64(&primes[1].to_bytes_be()),
        })
    })
}

/// Private RSA JWK with optional `kid` and `alg` members.
pub fn rsa_jwk(kid: Option<&str>, alg: Option<&str>) -> Value {
    let mut jwk = rsa_base_jwk().clone();
    if let Some(kid) = kid {
        jwk["kid"] = json!(kid);
    }
    if let Some(alg) = alg {
        jwk["alg"] = json!(alg);
    }
    jwk
}

/// Fresh private EC JWK on `curve` (`P-256`, `P-384` or `P-521`).
pub fn ec_jwk(curve: &str, kid: Option<&str>) -> Value {
    let (d, x, y) = match curve {
        "P-256" => {
            let secret = p256::SecretKey::random(&mut OsRng);
            let point = secret.public_key().to_encoded_point(false);
            (secret.to_bytes().to_vec(), point.x().unwrap().to_vec(), point.y().unwrap().to_vec())
        }
        "P-384" => {
            let secret = p384::SecretKey::random(&mut OsRng);
            let point = secret.public_key().to_encoded_point(false);
            (secret.to_bytes().to_vec(), point.x().unwrap().to_vec(), point.y().unwrap().to_vec())
        }
        "P-521" => {
            let secret = p521::SecretKey::random(&mut OsRng);
            let point = secret.public_key().to_encoded_point(false);
            (secret.to_bytes().to_vec(), point.x().unwrap().to_vec(), point.y().unwrap().to_vec())
        }
        other => panic!("unsupported test curve {}", other),
    };

    let mut jwk = json!({
        "kty": "EC",
        "crv": curve,
        "x": b64(&x),
        "y": b64(&y),
        "d": b64(&d),
    });
    if let Some(kid) = kid {
        jwk["kid"] = json!(kid);
    }
    jwk
}

/// Token endpoint response body.
pub fn token_body(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
    })
}
