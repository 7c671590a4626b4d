//! Request authorization.
//!
//! A principal may use the API only while both halves of its account exist:
//! the identity provider's user record, which validates the bearer token, and
//! the application's profile row with the same id. Deleting either one
//! revokes access on the next request; nothing is cached between requests.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::{IdentityError, IdentityUser, Session};
use crate::models::{Profile, Role};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

/// A token the identity provider accepted.
#[derive(Debug, Clone)]
pub struct AuthenticatedToken {
    pub user: IdentityUser,
    pub token: String,
}

/// A validated token whose owner still has a profile row.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub profile: Profile,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
}

impl From<&Profile> for UserView {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id,
            email: profile.email.clone(),
            full_name: Some(profile.full_name.clone()),
            role: profile.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserView,
    pub session: Option<Session>,
}

/// Extracts `<token>` from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthenticated("Authorization header missing".to_string()))?;
    let value = header.to_str().map_err(|_| {
        ApiError::Unauthenticated("Invalid authorization header format".to_string())
    })?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) => {
            if scheme.eq_ignore_ascii_case("bearer") {
                Ok(token)
            } else {
                Err(ApiError::Unauthenticated(
                    "Invalid authentication scheme".to_string(),
                ))
            }
        }
        _ => Err(ApiError::Unauthenticated(
            "Invalid authorization header format".to_string(),
        )),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthenticatedToken, ApiError> {
    let token = bearer_token(headers)?;

    match state.identity.get_user(token).await {
        Ok(user) => Ok(AuthenticatedToken {
            user,
            token: token.to_string(),
        }),
        Err(IdentityError::Rejected { status, message }) => {
            warn!(status, "token rejected by identity provider: {message}");
            Err(ApiError::Unauthenticated("Invalid or expired token".to_string()))
        }
        Err(err) => {
            error!("token verification failed: {err}");
            Err(ApiError::Unauthenticated("Invalid or expired token".to_string()))
        }
    }
}

/// Token-only gate.
pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authenticated = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(authenticated);
    Ok(next.run(request).await)
}

/// Full gate: token check, then profile existence.
pub async fn require_profile(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authenticated = authenticate(&state, request.headers()).await?;

    let profile = state
        .store
        .get_profile(authenticated.user.id)
        .await
        .map_err(|e| {
            error!(user_id = %authenticated.user.id, "profile lookup failed: {e}");
            ApiError::Internal(anyhow::anyhow!("Error verifying user profile"))
        })?
        .ok_or_else(|| {
            warn!(user_id = %authenticated.user.id, "valid token without a profile");
            ApiError::Forbidden(
                "Your profile has been deleted or access denied. Please contact administrator."
                    .to_string(),
            )
        })?;

    request.extensions_mut().insert(authenticated);
    request.extensions_mut().insert(CurrentUser { profile });
    Ok(next.run(request).await)
}

/// Layered inside [`require_profile`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let role = request
        .extensions()
        .get::<CurrentUser>()
        .map(|current| current.profile.role)
        .ok_or_else(|| ApiError::Unauthenticated("Authentication required".to_string()))?;

    if role != Role::Admin {
        return Err(ApiError::Forbidden(format!(
            "This action requires admin role. You have {role} role."
        )));
    }
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthenticated("Authentication required".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedToken>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthenticated("Authentication required".to_string()))
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(ApiError::BadRequest(format!("Invalid email address: {email}")));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Creates the identity record, then the profile row that grants access.
pub async fn register(state: &AppState, request: RegisterRequest) -> Result<AuthResponse, ApiError> {
    let email = request.email.trim().to_lowercase();
    let full_name = request.full_name.trim();
    validate_credentials(&email, &request.password)?;
    if full_name.is_empty() {
        return Err(ApiError::BadRequest("full_name must not be empty".to_string()));
    }

    let outcome = state.identity.sign_up(&email, &request.password).await?;
    let profile = Profile::new(outcome.user.id, &email, full_name, Role::Teacher);

    let profile = state.store.create_profile(&profile).await.map_err(|e| {
        error!(user_id = %outcome.user.id, "account created but profile insert failed: {e}");
        ApiError::Internal(anyhow::anyhow!("failed to create teacher profile: {e}"))
    })?;

    info!(user_id = %profile.id, "registered");
    Ok(AuthResponse {
        user: UserView::from(&profile),
        session: outcome.session,
    })
}

/// Password sign-in that refuses principals whose profile is gone.
pub async fn login(state: &AppState, request: LoginRequest) -> Result<AuthResponse, ApiError> {
    let email = request.email.trim().to_lowercase();

    let outcome = match state
        .identity
        .sign_in_with_password(&email, &request.password)
        .await
    {
        Ok(outcome) => outcome,
        Err(IdentityError::Rejected { message, .. }) => {
            warn!("sign-in rejected: {message}");
            return Err(ApiError::Unauthenticated("Invalid email or password".to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    let profile = state
        .store
        .get_profile(outcome.user.id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %outcome.user.id, "sign-in without a profile");
            ApiError::Forbidden("Teacher profile not found. Please contact support.".to_string())
        })?;

    Ok(AuthResponse {
        user: UserView::from(&profile),
        session: Some(outcome.session),
    })
}

pub async fn refresh(state: &AppState, request: RefreshRequest) -> Result<Session, ApiError> {
    state
        .identity
        .refresh_session(&request.refresh_token)
        .await
        .map_err(|e| match e {
            IdentityError::Rejected { message, .. } => {
                warn!("refresh rejected: {message}");
                ApiError::Unauthenticated("Invalid or expired refresh token".to_string())
            }
            other => other.into(),
        })
}
