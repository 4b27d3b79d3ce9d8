//! ABOUTME: Authentication middleware and extractor for JWT bearer tokens
//! ABOUTME: Accepts the Authorization header or the auth_token cookie

use crate::{
    auth::{JwtAuth, AUTH_COOKIE},
    error::ApiError,
    models::Claims,
    AppState,
};
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION, COOKIE},
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use pm_core::Role;
use pm_db::UserRepository;
use std::rc::Rc;
use tracing::{debug, warn};

/// Authentication middleware that rejects requests without a valid token
pub struct RequireAuth;

impl RequireAuth {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RequireAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequireAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .cloned()
                .ok_or_else(|| ApiError::internal_server_error("Application state missing"))?;

            let user = resolve_user(&state, req.headers()).await?;
            debug!(user_id = %user.id, role = %user.role, "Request authenticated");

            req.extensions_mut().insert(user);
            service.call(req).await
        })
    }
}

/// Authenticated user information
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    fn from_claims(claims: Claims) -> Result<Self, ApiError> {
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|_| ApiError::unauthorized("Token carries an unknown role"))?;

        Ok(Self {
            id: claims.sub,
            email: claims.email,
            role,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail with 403 unless the user holds one of `roles`
    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            warn!(user_id = %self.id, role = %self.role, "Role check failed");
            Err(ApiError::forbidden("Insufficient permissions"))
        }
    }
}

/// Token from `Authorization: Bearer` or, failing that, the session cookie
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(COOKIE)
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Resolve the caller from request headers
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthUser, ApiError> {
    let token = extract_token(headers)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let claims = JwtAuth::verify_token(&token, secret).map_err(|e| {
        warn!("JWT verification failed: {}", e);
        ApiError::unauthorized("Invalid or expired token")
    })?;

    AuthUser::from_claims(claims)
}

/// Verify the token, then check the account still exists and is active
///
/// Role and email come from the stored user, so changes apply before the token expires.
pub async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    let claimed = authenticate(headers, &state.security_config.jwt_secret)?;

    let user = UserRepository::new(state.db.pool())
        .find_by_id(&claimed.id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claimed.id, "Token for unknown user");
            ApiError::unauthorized("Invalid or expired token")
        })?;

    if !user.is_active {
        warn!(user_id = %user.id, "Token for deactivated user");
        return Err(ApiError::unauthorized("Account is deactivated"));
    }

    let role = user
        .role
        .parse::<Role>()
        .map_err(|_| ApiError::unauthorized("Account carries an unknown role"))?;

    Ok(AuthUser {
        id: user.id,
        email: user.email,
        role,
    })
}

/// Helper function to extract authenticated user from HTTP request
pub fn get_http_auth_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

/// Handlers take `AuthUser` directly; outside `RequireAuth` scopes the token is checked here
impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(user) = get_http_auth_user(req) {
            return Box::pin(ready(Ok(user)));
        }

        let state = req.app_data::<web::Data<AppState>>().cloned();
        let headers = req.headers().clone();
        Box::pin(async move {
            let state = state
                .ok_or_else(|| ApiError::internal_server_error("Application state missing"))?;
            resolve_user(&state, &headers).await
        })
    }
}
