/*!
 * # Authentication and Authorization Module
 *
 * JWT authentication for the warehouse API:
 *
 * - Passwords are verified by an external auth proxy (see [`proxy`])
 * - Local user records decide whether a verified login may proceed and with which role
 * - Access/refresh token pairs are HS256 JWTs; revoked tokens sit in an in-memory blacklist
 *
 * Route gating goes through [`AuthRouterExt`]; role to permission mapping lives in [`rbac`].
 */

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::user::{self, UserRole},
    metrics::{self, LOGINS, LOGIN_FAILURES},
    services::users::UserService,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

mod permissions;
pub mod proxy;
mod rbac;

// Re-exports
pub use permissions::*;
pub use proxy::{hash_password, AuthProxyClient, ProxyIdentity};
pub use rbac::*;

const ACCESS_TOKEN: &str = "access";
const REFRESH_TOKEN: &str = "refresh";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,              // Subject (user ID)
    pub username: String,         // Login name
    pub name: Option<String>,     // Display name
    pub role: UserRole,           // Staff role
    pub permissions: Vec<String>, // Permissions granted by the role
    pub jti: String,              // JWT ID (unique identifier for this token)
    pub iat: i64,                 // Issued at time
    pub exp: i64,                 // Expiration time
    pub nbf: i64,                 // Not valid before time
    pub iss: String,              // Issuer
    pub aud: String,              // Audience
    pub token_use: String,        // "access" or "refresh"
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub permissions: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: UserRole) -> bool {
        self.role == role
    }

    /// Check if the user has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Check if the user is an admin
    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin)
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?,
            username: claims.username,
            name: claims.name,
            role: claims.role,
            permissions: claims.permissions,
            token_id: claims.jti,
        })
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
    pub refresh_token_expiration: Duration,
    pub proxy_url: Option<String>,
    pub proxy_timeout: Duration,
}

impl From<&AppConfig> for AuthConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            jwt_audience: config.auth_audience.clone(),
            jwt_issuer: config.auth_issuer.clone(),
            access_token_expiration: Duration::from_secs(config.jwt_expiration as u64),
            refresh_token_expiration: Duration::from_secs(config.refresh_token_expiration as u64),
            proxy_url: config.auth_proxy_url.clone(),
            proxy_timeout: config.auth_proxy_timeout(),
        }
    }
}

/// Authentication service that handles login, token issuance and validation
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    db: Arc<DbPool>,
    proxy: Option<AuthProxyClient>,
    blacklisted_tokens: Arc<RwLock<Vec<BlacklistedToken>>>,
    refresh_tokens: Arc<DashMap<String, IssuedRefreshToken>>,
}

/// Token blacklist entry
#[derive(Clone, Debug)]
struct BlacklistedToken {
    jti: String,
    expiry: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct IssuedRefreshToken {
    user_id: Uuid,
    expiry: DateTime<Utc>,
}

impl AuthService {
    /// Create a new authentication service. Login is disabled when no
    /// proxy URL is configured; token validation still works.
    pub fn new(config: AuthConfig, db: Arc<DbPool>) -> Result<Self, AuthError> {
        let proxy = config
            .proxy_url
            .as_deref()
            .map(|url| AuthProxyClient::new(url, config.proxy_timeout))
            .transpose()?;
        Ok(Self {
            config,
            db,
            proxy,
            blacklisted_tokens: Arc::new(RwLock::new(Vec::new())),
            refresh_tokens: Arc::new(DashMap::new()),
        })
    }

    /// Verify credentials with the proxy and issue tokens for the matching local user.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let result = self.authenticate(username, password).await;
        match &result {
            Ok(response) => {
                metrics::increment_counter(LOGINS);
                info!(user_id = %response.user.id, role = %response.user.role, "User logged in");
            }
            Err(e) => {
                metrics::increment_counter(LOGIN_FAILURES);
                warn!(username, error = %e, "Login failed");
            }
        }
        result
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let proxy = self.proxy.as_ref().ok_or(AuthError::LoginDisabled)?;
        let identity = proxy.verify(username, password).await?;

        let user = UserService::new(self.db.clone())
            .find_for_login(identity.employee_id.as_deref(), &identity.username)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        let tokens = self.generate_token(&user).await?;
        Ok(LoginResponse { tokens, user })
    }

    /// Generate an access/refresh token pair for a user
    pub async fn generate_token(&self, user: &user::Model) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let refresh_exp = now
            + ChronoDuration::from_std(self.config.refresh_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = |jti: String, exp: DateTime<Utc>, token_use: &str, permissions: Vec<String>| Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            name: Some(user.display_name.clone()),
            role: user.role,
            permissions,
            jti,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            token_use: token_use.to_string(),
        };

        let refresh_jti = Uuid::new_v4().to_string();
        let access_token = self.encode(&claims(
            Uuid::new_v4().to_string(),
            access_exp,
            ACCESS_TOKEN,
            permissions_for(user.role),
        ))?;
        // Refresh tokens carry no permissions
        let refresh_token = self.encode(&claims(refresh_jti.clone(), refresh_exp, REFRESH_TOKEN, vec![]))?;

        self.prune_refresh_tokens();
        self.refresh_tokens.insert(
            refresh_jti,
            IssuedRefreshToken {
                user_id: user.id,
                expiry: refresh_exp,
            },
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            refresh_expires_in: self.config.refresh_token_expiration.as_secs() as i64,
        })
    }

    fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if self.is_token_blacklisted(&claims.jti).await {
            return Err(AuthError::RevokedToken);
        }

        Ok(claims)
    }

    /// Validate an access token and turn it into the request's user
    pub async fn authenticate_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token).await?;
        if claims.token_use != ACCESS_TOKEN {
            return Err(AuthError::InvalidToken);
        }
        AuthUser::try_from(claims)
    }

    /// Exchange a refresh token for a new pair. Each refresh token works once.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.validate_token(refresh_token).await?;
        if claims.token_use != REFRESH_TOKEN {
            return Err(AuthError::InvalidToken);
        }

        let (_, issued) = self
            .refresh_tokens
            .remove(&claims.jti)
            .ok_or(AuthError::InvalidToken)?;
        if issued.expiry <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        // Role changes and deactivation take effect on refresh
        let user = UserService::new(self.db.clone())
            .get_user(issued.user_id)
            .await
            .map_err(|_| AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        debug!(user_id = %user.id, "Refreshing token pair");
        self.generate_token(&user).await
    }

    /// Revoke a token (add it to the blacklist)
    pub async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.validate_token(token).await?;
        self.refresh_tokens.remove(&claims.jti);

        let expiry = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
        let mut blacklist = self.blacklisted_tokens.write().await;
        blacklist.push(BlacklistedToken {
            jti: claims.jti,
            expiry,
        });

        self.clean_blacklist(&mut blacklist);
        Ok(())
    }

    async fn is_token_blacklisted(&self, token_id: &str) -> bool {
        let blacklist = self.blacklisted_tokens.read().await;
        blacklist.iter().any(|t| t.jti == token_id)
    }

    /// Drop blacklist entries and refresh tokens that expired on their own
    fn clean_blacklist(&self, blacklist: &mut Vec<BlacklistedToken>) {
        blacklist.retain(|t| t.expiry > Utc::now());
        self.prune_refresh_tokens();
    }

    /// Forget refresh tokens that were never used before expiring
    fn prune_refresh_tokens(&self) {
        let now = Utc::now();
        self.refresh_tokens.retain(|_, t| t.expiry > now);
    }
}

/// Token pair response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// Login credentials
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: user::Model,
}

/// Refresh token request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("User is inactive")]
    UserInactive,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Login is not configured")]
    LoginDisabled,

    #[error("Auth proxy error: {0}")]
    ProxyError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuth
            | Self::InvalidCredentials
            | Self::MissingToken
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::RevokedToken => StatusCode::UNAUTHORIZED,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::UserInactive | Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::LoginDisabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProxyError(_) => StatusCode::BAD_GATEWAY,
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingAuth => "AUTH_MISSING",
            Self::InvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::MissingToken => "AUTH_MISSING_TOKEN",
            Self::InvalidToken => "AUTH_INVALID_TOKEN",
            Self::TokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::RevokedToken => "AUTH_REVOKED_TOKEN",
            Self::TokenCreation(_) => "AUTH_TOKEN_CREATION_FAILED",
            Self::UserNotFound => "AUTH_USER_NOT_FOUND",
            Self::UserInactive => "AUTH_USER_INACTIVE",
            Self::InsufficientPermissions => "AUTH_INSUFFICIENT_PERMISSIONS",
            Self::LoginDisabled => "AUTH_LOGIN_DISABLED",
            Self::ProxyError(_) => "AUTH_PROXY_ERROR",
            Self::DatabaseError(_) => "AUTH_DATABASE_ERROR",
            Self::InternalError(_) => "AUTH_INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::MissingAuth => "Authentication required".to_string(),
            Self::MissingToken => "No authentication token provided".to_string(),
            Self::InvalidToken => "Invalid authentication token".to_string(),
            Self::RevokedToken => "Authentication token has been revoked".to_string(),
            Self::ProxyError(_) => "Authentication service unavailable".to_string(),
            Self::DatabaseError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        (self.status_code(), body).into_response()
    }
}

/// Bearer token from the `Authorization` header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Permission middleware to check if a user has the required permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    // Admins have all permissions
    if !user.is_admin() && !user.has_permission(&required_permission) {
        debug!(user_id = %user.user_id, permission = %required_permission, "Permission denied");
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<UserRole>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(required_role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("Authentication service not available".to_string())
                .into_response();
        }
    };

    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        return AuthError::MissingAuth.into_response();
    };

    match auth_service.authenticate_token(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
    fn with_role(self, role: UserRole) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }

    fn with_role(self, role: UserRole) -> Self {
        self.layer(axum::middleware::from_fn_with_state(role, role_middleware))
            .with_auth()
    }
}
