/*!
 * # Authentication
 *
 * Bearer-token identity for the storefront API. Tokens are HS256 JWTs carrying the
 * user id and roles; handlers receive the caller as an explicit
 * [`AuthenticatedContext`] and pass it on to the services they call.
 */

use async_trait::async_trait;
use axum::{
    extract::FromRef,
    http::{header, request::Parts},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{config::AppConfig, errors::ServiceError};

pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // Subject (user ID)
    pub roles: Vec<String>, // User's roles
    pub jti: String,        // JWT ID
    pub iat: i64,           // Issued at time
    pub exp: i64,           // Expiration time
    pub iss: String,        // Issuer
    pub aud: String,        // Audience
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        access_token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            access_token_expiration,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
        )
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

/// Issues and verifies access tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Signs an access token for `user_id` with the given roles.
    pub fn issue_token(&self, user_id: Uuid, roles: &[&str]) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::TokenCreation("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validates signature, expiry, issuer and audience.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Turns a bearer token into the caller's identity.
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedContext, AuthError> {
        let claims = self.verify(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthenticatedContext {
            user_id,
            roles: claims.roles,
            token_id: claims.jti,
        })
    }
}

/// Identity of the caller, extracted once per request and passed explicitly to
/// every service operation that depends on who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedContext {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub token_id: String,
}

impl AuthenticatedContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Admin access required".to_string()))
        }
    }

    /// Owners see their own resources; admins see everything.
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.user_id == owner_id || self.is_admin()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedContext
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let ctx = auth.authenticate(token)?;
        debug!(user_id = %ctx.user_id, "Authenticated request");
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(expiration: Duration) -> AuthService {
        AuthService::new(AuthConfig::new(
            "k7Qw2Zr9Lm4Xp8Vt1Ns6Hd3Jf0Gb5Yc7Ue2Ri9Oa4Sq8Wl1Tm6Pn3Kz0Xv5By7Cj2".into(),
            "storefront".into(),
            "storefront-api".into(),
            expiration,
        ))
    }

    #[test]
    fn issued_token_round_trips_identity() {
        let auth = service(Duration::from_secs(600));
        let user_id = Uuid::new_v4();
        let token = auth.issue_token(user_id, &[ADMIN_ROLE]).unwrap();

        let ctx = auth.authenticate(&token).unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert!(ctx.is_admin());
        assert!(ctx.require_admin().is_ok());
    }

    #[test]
    fn each_token_carries_its_own_id() {
        let auth = service(Duration::from_secs(600));
        let user_id = Uuid::new_v4();
        let first = auth
            .authenticate(&auth.issue_token(user_id, &["customer"]).unwrap())
            .unwrap();
        let second = auth
            .authenticate(&auth.issue_token(user_id, &["customer"]).unwrap())
            .unwrap();

        assert!(!first.token_id.is_empty());
        assert_ne!(first.token_id, second.token_id);
    }

    #[test]
    fn token_from_other_issuer_is_rejected() {
        let auth = service(Duration::from_secs(600));
        let other = AuthService::new(AuthConfig::new(
            "k7Qw2Zr9Lm4Xp8Vt1Ns6Hd3Jf0Gb5Yc7Ue2Ri9Oa4Sq8Wl1Tm6Pn3Kz0Xv5By7Cj2".into(),
            "storefront".into(),
            "someone-else".into(),
            Duration::from_secs(600),
        ));
        let token = other.issue_token(Uuid::new_v4(), &[]).unwrap();
        assert!(matches!(auth.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = service(Duration::from_secs(600));
        let mut token = auth.issue_token(Uuid::new_v4(), &[]).unwrap();
        token.push('x');
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn non_admin_is_forbidden_from_admin_operations() {
        let ctx = AuthenticatedContext {
            user_id: Uuid::new_v4(),
            roles: vec!["customer".into()],
            token_id: "t".into(),
        };
        assert!(matches!(
            ctx.require_admin(),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(ctx.can_access(ctx.user_id));
        assert!(!ctx.can_access(Uuid::new_v4()));
    }
}
