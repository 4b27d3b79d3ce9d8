//! ABOUTME: Authentication endpoints for registration, login and the current user
//! ABOUTME: Issues JWTs in the response body and as an HTTP-only cookie

use crate::{
    auth::{JwtAuth, PasswordAuth, AUTH_COOKIE},
    error::{validate, ApiError, ApiResult},
    middleware::auth::AuthUser,
    models::{LoginRequest, LoginResponse, RegisterRequest, UserInfo},
    AppState,
};
use actix_web::{
    cookie::{time::Duration, Cookie, SameSite},
    get,
    http::StatusCode,
    post, web, HttpResponse,
};
use pm_core::Role;
use pm_db::{CreateUserRequest, User, UserRepository};
use tracing::{debug, info, warn};

fn session_response(state: &AppState, user: User, status: StatusCode) -> ApiResult<HttpResponse> {
    let role = user
        .role
        .parse::<Role>()
        .map_err(|_| ApiError::internal_server_error("User has an unknown role"))?;
    let token = JwtAuth::create_token(&user.id, &user.email, role, &state.security_config.jwt_secret)?;

    let cookie = Cookie::build(AUTH_COOKIE, token.clone())
        .path("/")
        .max_age(Duration::seconds(JwtAuth::token_expiration_secs() as i64))
        .http_only(true)
        .secure(state.security_config.secure_cookies)
        .same_site(SameSite::Lax)
        .finish();

    let response = LoginResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: JwtAuth::token_expiration_secs(),
        user: UserInfo::from(user),
    };

    Ok(HttpResponse::build(status).cookie(cookie).json(response))
}

/// Create a buyer or seller account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = LoginResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
    )
)]
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    validate(&payload)?;

    let role = match payload.role.as_deref() {
        None => Role::Buyer,
        Some(raw) => match raw.parse::<Role>() {
            Ok(Role::Admin) => {
                warn!("Self-registration as admin refused");
                return Err(ApiError::forbidden("Admin accounts cannot be self-registered"));
            }
            Ok(role) => role,
            Err(_) => return Err(ApiError::bad_request("Role must be buyer or seller")),
        },
    };

    let password_hash = PasswordAuth::hash_password(&payload.password)?;
    let user = UserRepository::new(state.db.pool())
        .create(CreateUserRequest {
            username: payload.username.trim().to_string(),
            email: payload.email,
            password_hash,
            role: role.as_str().to_string(),
        })
        .await?;

    info!(user_id = %user.id, role = %role, "Account registered");
    session_response(&state, user, StatusCode::CREATED)
}

/// User login endpoint
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    debug!("Login attempt for email: {}", payload.email);
    validate(&payload.0)?;

    let user = UserRepository::new(state.db.pool())
        .find_by_email(&payload.email)
        .await?
        .ok_or_else(|| {
            warn!("Login attempt for unknown email");
            ApiError::unauthorized("Invalid email or password")
        })?;

    if !user.is_active {
        warn!("Login attempt for inactive user: {}", user.id);
        return Err(ApiError::unauthorized("Account is disabled"));
    }

    if !PasswordAuth::verify_password(&payload.password, &user.password_hash)? {
        warn!("Invalid password for user: {}", user.id);
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    debug!("Password verification successful for user: {}", user.id);
    session_response(&state, user, StatusCode::OK)
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not authenticated"),
    )
)]
#[get("/me")]
pub async fn me(state: web::Data<AppState>, user: AuthUser) -> ApiResult<HttpResponse> {
    let user = UserRepository::new(state.db.pool())
        .find_by_id(&user.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    Ok(HttpResponse::Ok().json(UserInfo::from(user)))
}
