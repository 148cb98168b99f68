//! Auth middleware (spec SPEC_FULL §4.8): HTTP Basic against `OSB_USERNAME`/`OSB_PASSWORD`, or a
//! JWT bearer token decoded with `jsonwebtoken`. Either scheme resolves a [`Principal`] and stores
//! it as a request extension for downstream handlers to read.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use broker_core::Principal;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

/// Decoding key plus the claim name to read the principal from, loaded once at startup.
pub struct JwtVerifier {
    key: DecodingKey,
    algorithm: Algorithm,
    username_claim: String,
}

impl JwtVerifier {
    pub fn from_pem(pem_path: &str, username_claim: &str) -> Result<Self, String> {
        let pem = std::fs::read(pem_path).map_err(|e| format!("reading {pem_path}: {e}"))?;
        let key = DecodingKey::from_rsa_pem(&pem).map_err(|e| format!("parsing {pem_path} as an RSA public key: {e}"))?;
        Ok(Self { key, algorithm: Algorithm::RS256, username_claim: username_claim.to_string() })
    }

    pub fn from_jwk(jwk_path: &str, username_claim: &str) -> Result<Self, String> {
        let raw = std::fs::read_to_string(jwk_path).map_err(|e| format!("reading {jwk_path}: {e}"))?;
        let jwk_set: jsonwebtoken::jwk::JwkSet =
            serde_json::from_str(&raw).map_err(|e| format!("parsing {jwk_path} as a JWK set: {e}"))?;
        let jwk = jwk_set.keys.first().ok_or_else(|| format!("{jwk_path} contains no keys"))?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| format!("building a decoding key from {jwk_path}: {e}"))?;
        Ok(Self { key, algorithm: Algorithm::RS256, username_claim: username_claim.to_string() })
    }

    fn verify(&self, token: &str) -> Option<Principal> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.key, &validation).ok()?;
        data.claims.rest.get(&self.username_claim).and_then(|v| v.as_str()).map(Principal::new)
    }
}

/// `axum::middleware::from_fn_with_state` layer: rejects unauthenticated requests with `401`,
/// otherwise inserts a `Principal` extension for handlers to read.
pub async fn require_auth(State(state): State<Arc<AppState>>, mut request: Request<Body>, next: Next) -> Response {
    if let Some(principal) = authenticate(&state, &request) {
        request.extensions_mut().insert(principal);
        return next.run(request).await;
    }

    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(header::WWW_AUTHENTICATE, "Basic realm=\"osb\"")
        .body(Body::from(r#"{"error":"Unauthorized","description":"missing or invalid credentials"}"#))
        .expect("static unauthorized response is well-formed")
}

fn authenticate(state: &AppState, request: &Request<Body>) -> Option<Principal> {
    let header = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;

    if let Some(encoded) = header.strip_prefix("Basic ") {
        return authenticate_basic(state, encoded);
    }
    if let Some(token) = header.strip_prefix("Bearer ") {
        return state.jwt.as_ref().and_then(|v| v.verify(token));
    }
    None
}

fn authenticate_basic(state: &AppState, encoded: &str) -> Option<Principal> {
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    if username == state.config.username && password == state.config.password {
        Some(Principal::new(username))
    } else {
        None
    }
}
