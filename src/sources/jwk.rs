//! Private keys in JWK form and the JWS signing built on them.
//!
//! RSA and EC P-256/P-384 keys are converted to DER and signed through
//! `jsonwebtoken`. P-521 (ES512) is not covered by `jsonwebtoken`, so those
//! assertions are assembled and signed with `p521` directly.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p521::ecdsa::signature::Signer;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::{BigUint, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    fn from_name(crv: &str) -> AuthResult<Self> {
        match crv {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            other => Err(AuthError::key_material(format!("unsupported EC curve '{}'", other))),
        }
    }

    fn algorithm(self) -> SigningAlgorithm {
        match self {
            Self::P256 => SigningAlgorithm::ES256,
            Self::P384 => SigningAlgorithm::ES384,
            Self::P521 => SigningAlgorithm::ES512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec(EcCurve),
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    RS256,
    RS384,
    RS512,
    ES256,
    ES384,
    ES512,
}

impl SigningAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            "RS512" => Some(Self::RS512),
            "ES256" => Some(Self::ES256),
            "ES384" => Some(Self::ES384),
            "ES512" => Some(Self::ES512),
            _ => None,
        }
    }

    /// Algorithm for a key family when the JWK does not name one.
    pub fn default_for(family: KeyFamily) -> Self {
        match family {
            KeyFamily::Rsa => Self::RS384,
            KeyFamily::Ec(curve) => curve.algorithm(),
        }
    }

    pub fn is_compatible_with(&self, family: KeyFamily) -> bool {
        match family {
            KeyFamily::Rsa => matches!(self, Self::RS256 | Self::RS384 | Self::RS512),
            KeyFamily::Ec(curve) => *self == curve.algorithm(),
        }
    }

    fn jsonwebtoken_algorithm(&self) -> Option<Algorithm> {
        match self {
            Self::RS256 => Some(Algorithm::RS256),
            Self::RS384 => Some(Algorithm::RS384),
            Self::RS512 => Some(Algorithm::RS512),
            Self::ES256 => Some(Algorithm::ES256),
            Self::ES384 => Some(Algorithm::ES384),
            Self::ES512 => None,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWK members this crate reads; anything else is ignored.
#[derive(Deserialize)]
struct RawJwk {
    kty: Option<String>,
    kid: Option<String>,
    alg: Option<String>,
    // RSA
    n: Option<String>,
    e: Option<String>,
    p: Option<String>,
    q: Option<String>,
    // EC
    crv: Option<String>,
    x: Option<String>,
    y: Option<String>,
    // private part, shared by both
    d: Option<String>,
}

enum KeyMaterial {
    JsonWebToken(EncodingKey),
    P521(Box<p521::ecdsa::SigningKey>),
}

/// A parsed private key ready to sign assertions.
pub struct PrivateKey {
    kid: Option<String>,
    family: KeyFamily,
    algorithm: SigningAlgorithm,
    signer: KeyMaterial,
}

impl PrivateKey {
    /// Parses a private JWK (RFC 7517) holding an RSA or EC key.
    pub fn from_jwk(jwk: &str) -> AuthResult<Self> {
        let raw: RawJwk = serde_json::from_str(jwk)
            .map_err(|e| AuthError::key_material(format!("private key is not a valid JWK: {}", e)))?;

        let kty = required(&raw.kty, "kty")?;
        let family = match kty {
            "RSA" => KeyFamily::Rsa,
            "EC" => KeyFamily::Ec(EcCurve::from_name(required(&raw.crv, "crv")?)?),
            other => return Err(AuthError::key_material(format!("unsupported key type '{}'", other))),
        };
        if raw.d.is_none() {
            return Err(AuthError::key_material("JWK has no private part ('d'); a public key cannot sign"));
        }

        let algorithm = match raw.alg.as_deref() {
            None => SigningAlgorithm::default_for(family),
            Some(name) => SigningAlgorithm::from_name(name)
                .filter(|alg| alg.is_compatible_with(family))
                .ok_or_else(|| {
                    AuthError::key_material(format!("algorithm '{}' cannot be used with a {} key", name, kty))
                })?,
        };

        let signer = match family {
            KeyFamily::Rsa => KeyMaterial::JsonWebToken(rsa_encoding_key(&raw)?),
            KeyFamily::Ec(EcCurve::P256) => KeyMaterial::JsonWebToken(p256_encoding_key(&raw)?),
            KeyFamily::Ec(EcCurve::P384) => KeyMaterial::JsonWebToken(p384_encoding_key(&raw)?),
            KeyFamily::Ec(EcCurve::P521) => KeyMaterial::P521(Box::new(p521_signing_key(&raw)?)),
        };

        Ok(Self {
            kid: raw.kid,
            family,
            algorithm,
            signer,
        })
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Produces a compact JWS over `claims`.
    pub fn sign<T: Serialize>(&self, claims: &T) -> AuthResult<String> {
        match &self.signer {
            KeyMaterial::JsonWebToken(key) => {
                let alg = self.algorithm.jsonwebtoken_algorithm().ok_or_else(|| {
                    AuthError::key_material(format!("{} is not signed with DER keys", self.algorithm))
                })?;
                let mut header = Header::new(alg);
                header.kid = self.kid.clone();
                jsonwebtoken::encode(&header, claims, key)
                    .map_err(|e| AuthError::key_material(format!("failed to sign assertion: {}", e)))
            }
            KeyMaterial::P521(key) => {
                let mut header = json!({ "typ": "JWT", "alg": self.algorithm.as_str() });
                if let Some(kid) = &self.kid {
                    header["kid"] = json!(kid);
                }
                let header = serde_json::to_vec(&header)
                    .map_err(|e| AuthError::key_material(format!("failed to encode JWT header: {}", e)))?;
                let claims = serde_json::to_vec(claims)
                    .map_err(|e| AuthError::key_material(format!("failed to encode JWT claims: {}", e)))?;

                let signing_input = format!(
                    "{}.{}",
                    URL_SAFE_NO_PAD.encode(header),
                    URL_SAFE_NO_PAD.encode(claims)
                );
                let signature: p521::ecdsa::Signature = key.sign(signing_input.as_bytes());
                Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature.to_bytes())))
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn required<'a>(value: &'a Option<String>, member: &str) -> AuthResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::key_material(format!("JWK is missing required member '{}'", member)))
}

fn decode_member(value: &Option<String>, member: &str) -> AuthResult<Vec<u8>> {
    let encoded = required(value, member)?;
    URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| AuthError::key_material(format!("JWK member '{}' is not base64url: {}", member, e)))
}

fn rsa_encoding_key(raw: &RawJwk) -> AuthResult<EncodingKey> {
    let n = BigUint::from_bytes_be(&decode_member(&raw.n, "n")?);
    let e = BigUint::from_bytes_be(&decode_member(&raw.e, "e")?);
    let d = BigUint::from_bytes_be(&decode_member(&raw.d, "d")?);
    let primes = match (&raw.p, &raw.q) {
        (Some(_), Some(_)) => vec![
            BigUint::from_bytes_be(&decode_member(&raw.p, "p")?),
            BigUint::from_bytes_be(&decode_member(&raw.q, "q")?),
        ],
        _ => Vec::new(),
    };

    let key = RsaPrivateKey::from_components(n, e, d, primes)
        .map_err(|e| AuthError::key_material(format!("invalid RSA key: {}", e)))?;
    key.validate()
        .map_err(|e| AuthError::key_material(format!("invalid RSA key: {}", e)))?;
    let der = key
        .to_pkcs1_der()
        .map_err(|e| AuthError::key_material(format!("cannot encode RSA key: {}", e)))?;
    Ok(EncodingKey::from_rsa_der(der.as_bytes()))
}

/// Checks optional `x`/`y` members against the point derived from `d`.
fn check_public_coordinates(raw: &RawJwk, derived_x: Option<&[u8]>, derived_y: Option<&[u8]>) -> AuthResult<()> {
    if let (Some(_), Some(_)) = (&raw.x, &raw.y) {
        let x = decode_member(&raw.x, "x")?;
        let y = decode_member(&raw.y, "y")?;
        if Some(x.as_slice()) != derived_x || Some(y.as_slice()) != derived_y {
            return Err(AuthError::key_material("JWK public coordinates do not match its private key"));
        }
    }
    Ok(())
}

/// Secret key of `$curve` decoded from `d`, checked against `x`/`y`.
macro_rules! ec_secret_key {
    ($curve:ident, $raw:expr, $name:literal) => {{
        use $curve::elliptic_curve::sec1::ToEncodedPoint;

        let secret = $curve::SecretKey::from_slice(&decode_member(&$raw.d, "d")?)
            .map_err(|e| AuthError::key_material(format!("invalid {} private key: {}", $name, e)))?;
        let point = secret.public_key().to_encoded_point(false);
        check_public_coordinates($raw, point.x().map(|c| c.as_slice()), point.y().map(|c| c.as_slice()))?;
        secret
    }};
}

fn p256_encoding_key(raw: &RawJwk) -> AuthResult<EncodingKey> {
    use p256::pkcs8::EncodePrivateKey;

    let der = ec_secret_key!(p256, raw, "P-256")
        .to_pkcs8_der()
        .map_err(|e| AuthError::key_material(format!("cannot encode P-256 key: {}", e)))?;
    Ok(EncodingKey::from_ec_der(der.as_bytes()))
}

fn p384_encoding_key(raw: &RawJwk) -> AuthResult<EncodingKey> {
    use p384::pkcs8::EncodePrivateKey;

    let der = ec_secret_key!(p384, raw, "P-384")
        .to_pkcs8_der()
        .map_err(|e| AuthError::key_material(format!("cannot encode P-384 key: {}", e)))?;
    Ok(EncodingKey::from_ec_der(der.as_bytes()))
}

fn p521_signing_key(raw: &RawJwk) -> AuthResult<p521::ecdsa::SigningKey> {
    let secret = ec_secret_key!(p521, raw, "P-521");
    p521::ecdsa::SigningKey::from_slice(&secret.to_bytes())
        .map_err(|e| AuthError::key_material(format!("invalid P-521 private key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::common::{ec_jwk, rsa_jwk};

    #[test]
    fn rsa_key_defaults_to_rs384() {
        let key = PrivateKey::from_jwk(&rsa_jwk(Some("rsa-1"), None).to_string()).unwrap();
        assert_eq!(key.family(), KeyFamily::Rsa);
        assert_eq!(key.algorithm(), SigningAlgorithm::RS384);
        assert_eq!(key.kid(), Some("rsa-1"));
    }

    #[test]
    fn jwk_alg_selects_within_family() {
        let key = PrivateKey::from_jwk(&rsa_jwk(None, Some("RS256")).to_string()).unwrap();
        assert_eq!(key.algorithm(), SigningAlgorithm::RS256);

        let err = PrivateKey::from_jwk(&rsa_jwk(None, Some("ES256")).to_string()).unwrap_err();
        assert!(matches!(err, AuthError::KeyMaterial(msg) if msg.contains("ES256")));
    }

    #[test]
    fn ec_curve_picks_matching_algorithm() {
        for (curve, alg) in [
            ("P-256", SigningAlgorithm::ES256),
            ("P-384", SigningAlgorithm::ES384),
            ("P-521", SigningAlgorithm::ES512),
        ] {
            let key = PrivateKey::from_jwk(&ec_jwk(curve, None).to_string()).unwrap();
            assert_eq!(key.algorithm(), alg, "curve {}", curve);
        }
    }

    #[test]
    fn es512_signature_has_fixed_width() {
        let key = PrivateKey::from_jwk(&ec_jwk("P-521", Some("ec-521")).to_string()).unwrap();
        let jwt = key.sign(&json!({ "iss": "svc" })).unwrap();

        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "ES512");
        assert_eq!(header["kid"], "ec-521");
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[2]).unwrap().len(), 132);
    }

    #[test]
    fn rejects_unusable_keys() {
        let cases = [
            ("not json", "not a valid JWK"),
            (r#"{"kty":"oct","k":"abc"}"#, "unsupported key type"),
            (r#"{"kty":"EC","crv":"secp256k1","d":"AQ"}"#, "unsupported EC curve"),
            (r#"{"kty":"EC","crv":"P-256","x":"AQ","y":"AQ"}"#, "no private part"),
            (r#"{"kty":"RSA","e":"AQAB","d":"AQ"}"#, "'n'"),
            (r#"{"crv":"P-256","d":"AQ"}"#, "'kty'"),
        ];
        for (jwk, expected) in cases {
            match PrivateKey::from_jwk(jwk) {
                Err(AuthError::KeyMaterial(msg)) => assert!(msg.contains(expected), "{}: {}", jwk, msg),
                other => panic!("{} should be rejected, got {:?}", jwk, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn mismatched_public_coordinates_are_rejected() {
        for curve in ["P-256", "P-384", "P-521"] {
            let mut jwk = ec_jwk(curve, None);
            let other = ec_jwk(curve, None);
            jwk["x"] = other["x"].clone();
            let err = PrivateKey::from_jwk(&jwk.to_string()).unwrap_err();
            assert!(
                matches!(&err, AuthError::KeyMaterial(msg) if msg.contains("do not match")),
                "curve {}: {:?}",
                curve,
                err
            );
        }
    }
}
