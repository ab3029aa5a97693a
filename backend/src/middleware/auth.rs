//! Authentication middleware
//!
//! Bearer JWT verification and role checks. Tokens are issued elsewhere;
//! this service only verifies them.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Access level carried in the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Catalog changes, stock-in, corrections, imports and rebuilds
    Admin,
    /// Stock-out and read access
    User,
}

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Guard for admin-only operations
    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            tracing::warn!(user_id = %self.user_id, "Admin operation refused");
            Err(AppError::InsufficientPermissions)
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return AppError::Unauthorized("Missing or invalid Authorization header".to_string()).into_response();
        }
    };

    let auth_user = match authenticate(token, &state.config.jwt.secret) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// Verify a token and build the user it describes
pub fn authenticate(token: &str, secret: &str) -> AppResult<AuthUser> {
    let claims = decode_jwt(token, secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;

    Ok(AuthUser {
        user_id,
        role: claims.role,
    })
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, role: Role, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            role,
            exp: now + exp_offset,
            iat: now,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn test_authenticate_valid_token() {
        let id = Uuid::new_v4();
        let user = authenticate(&token(&id.to_string(), Role::Admin, 3600), SECRET).unwrap();
        assert_eq!(user.user_id, id);
        assert!(user.require_admin().is_ok());
    }

    #[test]
    fn test_user_role_cannot_act_as_admin() {
        let user = authenticate(&token(&Uuid::new_v4().to_string(), Role::User, 3600), SECRET).unwrap();
        assert!(matches!(user.require_admin(), Err(AppError::InsufficientPermissions)));
    }

    #[test]
    fn test_rejects_expired_and_foreign_tokens() {
        let id = Uuid::new_v4().to_string();
        assert!(authenticate(&token(&id, Role::User, -3600), SECRET).is_err());
        assert!(authenticate(&token(&id, Role::User, 3600), "other-secret").is_err());
        assert!(authenticate(&token("not-a-uuid", Role::User, 3600), SECRET).is_err());
    }
}
