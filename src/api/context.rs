//! Request context extraction.
//!
//! In debug mode the business, user and role are supplied via headers for local
//! development. Otherwise they are taken from a verified HS256 JWT.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::domain::model::{Actor, Role};
use crate::utils::error::MarktError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: Actor,
    pub request_id: String,
}

impl RequestContext {
    /// 轉換領域錯誤並附上 request id
    pub fn error(&self, err: MarktError) -> ApiError {
        ApiError::from(err).with_request_id(self.request_id.clone())
    }

    pub fn business_id(&self) -> Uuid {
        self.actor.business_id
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }

        let headers = &parts.headers;
        let request_id = header_string(headers, REQUEST_ID_HEADER)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let actor = if state.config.server.debug {
            actor_from_debug_headers(headers)
        } else {
            actor_from_jwt(headers, state)
        }
        .map_err(|err| err.with_request_id(request_id.clone()))?;

        let ctx = Self { actor, request_id };
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

fn actor_from_debug_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let business = header_string(headers, "X-Business-Id")
        .ok_or_else(|| ApiError::unauthorized("missing X-Business-Id header (debug mode)"))?;
    let business_id = Uuid::parse_str(&business)
        .map_err(|_| ApiError::unauthorized("X-Business-Id is not a valid id"))?;
    let role = match header_string(headers, "X-Role") {
        Some(role) => role.parse::<Role>().map_err(ApiError::unauthorized)?,
        None => Role::Owner,
    };
    Ok(Actor::new(
        business_id,
        header_string(headers, "X-User-Id"),
        role,
    ))
}

fn actor_from_jwt(headers: &HeaderMap, state: &AppState) -> Result<Actor, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::missing_auth)?;
    let auth = &state.config.auth;
    let secret = auth.jwt_secret.as_deref().ok_or_else(|| {
        tracing::error!("JWT auth is enabled but no signing secret is configured");
        ApiError::internal("authentication is not configured")
    })?;

    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(issuer) = auth.issuer.as_deref() {
        validation.set_issuer(&[issuer]);
    }

    let claims = decode::<Value>(&token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|err| {
            tracing::debug!(error = %err, "JWT validation failed");
            ApiError::invalid_token()
        })?
        .claims;
    let obj = claims.as_object().ok_or_else(ApiError::invalid_token)?;

    let business_id = obj
        .get(&auth.business_claim)
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(ApiError::invalid_token)?;
    let user_id = obj
        .get("sub")
        .and_then(Value::as_str)
        .filter(|sub| !sub.is_empty())
        .map(str::to_string)
        .ok_or_else(ApiError::invalid_token)?;
    // 沒有角色宣告時以權限最小的收銀員處理
    let role = obj
        .get(&auth.role_claim)
        .and_then(Value::as_str)
        .map(|raw| raw.parse::<Role>().map_err(|_| ApiError::invalid_token()))
        .transpose()?
        .unwrap_or(Role::Cashier);

    Ok(Actor::new(business_id, Some(user_id), role))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_string(headers, "Authorization")?;
    let token = raw.strip_prefix("Bearer ")?;
    Some(token.to_string())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_debug_headers_default_to_owner() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("X-Business-Id", HeaderValue::from_str(&id.to_string()).unwrap());

        let actor = actor_from_debug_headers(&headers).unwrap();
        assert_eq!(actor.business_id, id);
        assert_eq!(actor.role, Role::Owner);
        assert!(actor.user_id.is_none());
    }

    #[test]
    fn test_debug_headers_reject_bad_ids_and_roles() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Business-Id", HeaderValue::from_static("shop-1"));
        assert!(actor_from_debug_headers(&headers).is_err());

        headers.insert(
            "X-Business-Id",
            HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
        );
        headers.insert("X-Role", HeaderValue::from_static("janitor"));
        assert!(actor_from_debug_headers(&headers).is_err());
    }

    #[test]
    fn test_bearer_token_requires_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Token abc"));
        assert!(bearer_token(&headers).is_none());
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));
    }
}
