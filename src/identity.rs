use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The provider answered with a 4xx.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("request to identity provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected identity provider response: {0}")]
    Unexpected(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// A principal as known to the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: IdentityUser,
    /// Absent when the provider requires email confirmation first.
    pub session: Option<Session>,
}

#[derive(Debug, Clone)]
pub struct SignInOutcome {
    pub user: IdentityUser,
    pub session: Session,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<SignUpOutcome>;
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> IdentityResult<SignInOutcome>;
    /// Validates an access token and returns its owner.
    async fn get_user(&self, access_token: &str) -> IdentityResult<IdentityUser>;
    async fn refresh_session(&self, refresh_token: &str) -> IdentityResult<Session>;
    async fn sign_out(&self, access_token: &str) -> IdentityResult<()>;
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
}

/// Client for a Supabase (GoTrue) auth endpoint.
pub struct SupabaseAuth {
    config: SupabaseConfig,
    client: Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<u64>,
    user: Option<IdentityUser>,
}

impl From<&TokenResponse> for Session {
    fn from(token: &TokenResponse) -> Self {
        Session {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_in: token.expires_in,
        }
    }
}

/// Sign-up answers with a session when auto-confirm is on, and with the bare
/// user object otherwise.
#[derive(Deserialize)]
struct SignUpResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    user: Option<IdentityUser>,
    id: Option<Uuid>,
    email: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl SupabaseAuth {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            config: SupabaseConfig {
                url: config.url.trim_end_matches('/').to_string(),
                api_key: config.api_key,
            },
            client: Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url, path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.endpoint(path))
            .header("apikey", &self.config.api_key)
    }

    async fn check(response: Response) -> IdentityResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body
            .error_description
            .or(body.msg)
            .or(body.message)
            .or(body.error)
            .unwrap_or_else(|| status.to_string());

        if status.is_client_error() {
            Err(IdentityError::Rejected {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(IdentityError::Unexpected(format!("{status}: {message}")))
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<SignUpOutcome> {
        let response = self
            .post("signup")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: SignUpResponse = Self::check(response).await?.json().await?;

        let user = match (body.user, body.id) {
            (Some(user), _) => user,
            (None, Some(id)) => IdentityUser {
                id,
                email: body.email,
            },
            (None, None) => {
                return Err(IdentityError::Unexpected(
                    "sign-up response carried no user".to_string(),
                ))
            }
        };
        let session = match (body.access_token, body.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Some(Session {
                access_token,
                refresh_token,
                expires_in: body.expires_in,
            }),
            _ => None,
        };

        debug!(user_id = %user.id, confirmed = session.is_some(), "signed up");
        Ok(SignUpOutcome { user, session })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> IdentityResult<SignInOutcome> {
        let response = self
            .post("token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;

        let session = Session::from(&token);
        let user = token.user.ok_or_else(|| {
            IdentityError::Unexpected("token response carried no user".to_string())
        })?;
        Ok(SignInOutcome { user, session })
    }

    async fn get_user(&self, access_token: &str) -> IdentityResult<IdentityUser> {
        let response = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn refresh_session(&self, refresh_token: &str) -> IdentityResult<Session> {
        let response = self
            .post("token")
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;
        Ok(Session::from(&token))
    }

    async fn sign_out(&self, access_token: &str) -> IdentityResult<()> {
        let response = self
            .post("logout")
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
