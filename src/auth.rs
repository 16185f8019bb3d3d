//! OAuth token exchange and session lifecycle.
//!
//! A flow starts `Idle`, moves to `Requesting` while talking to the provider
//! and ends in `Authenticated` or one of the failure states. The failure state
//! tells the caller how to recover: authorize again, give up, or back off.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::Utc;

use crate::config::RetryPolicy;
use crate::error::{ErrorKind, SpotifyError};
use crate::models::{Session, User};
use crate::retry::retry_rate_limited;
use crate::spotify::{SpotifyClient, TokenResponse, UserProfile};
use crate::store::{SessionCache, StoreError, UserRepository};

/// Bytes of randomness in the anti-forgery `state` parameter.
const STATE_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Requesting,
    Authenticated,
    AuthFailed,
    RateLimited,
    InternalFailed,
}

impl ExchangeState {
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Auth => ExchangeState::AuthFailed,
            ErrorKind::RateLimit => ExchangeState::RateLimited,
            ErrorKind::Application | ErrorKind::Internal => ExchangeState::InternalFailed,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ExchangeState::Idle | ExchangeState::Requesting)
    }
}

/// Why an authorization-code flow did not end `Authenticated`.
#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    /// The provider refused to trade the code for tokens.
    #[error("token exchange failed: {0}")]
    Exchange(SpotifyError),
    /// Tokens were issued but the profile could not be read with them.
    #[error("profile fetch failed: {0}")]
    Profile(SpotifyError),
    #[error("session store failed: {0}")]
    Store(#[from] StoreError),
    #[error("authorization flow exceeded {0:?}")]
    TimedOut(Duration),
}

impl AuthFlowError {
    pub fn state(&self) -> ExchangeState {
        match self {
            AuthFlowError::Exchange(e) | AuthFlowError::Profile(e) => {
                ExchangeState::from_error_kind(e.kind)
            }
            AuthFlowError::Store(_) | AuthFlowError::TimedOut(_) => ExchangeState::InternalFailed,
        }
    }
}

/// Result of a successful authorization-code flow.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: User,
    pub session: Session,
    /// Whether this was the user's first authentication.
    pub created: bool,
}

/// Drives the OAuth flows and keeps users and cached sessions current.
#[derive(Clone)]
pub struct AuthService {
    spotify: SpotifyClient,
    users: Arc<dyn UserRepository>,
    cache: Arc<dyn SessionCache>,
    retry: RetryPolicy,
    deadline: Duration,
}

impl AuthService {
    pub fn new(
        spotify: SpotifyClient,
        users: Arc<dyn UserRepository>,
        cache: Arc<dyn SessionCache>,
        retry: RetryPolicy,
        deadline: Duration,
    ) -> Self {
        Self {
            spotify,
            users,
            cache,
            retry,
            deadline,
        }
    }

    /// A fresh authorization URL with its own random state.
    pub fn authorization_url(&self) -> String {
        self.spotify.authorize_url(&generate_state())
    }

    /// Client Credentials flow. The session is handed back, never stored.
    pub async fn client_credentials(&self) -> Result<Session, SpotifyError> {
        tracing::debug!(state = ?ExchangeState::Requesting, "client credentials exchange");
        let token = self.spotify.exchange_client_credentials().await.map_err(|e| {
            tracing::error!(state = ?ExchangeState::from_error_kind(e.kind), error = %e, "client credentials exchange failed");
            e
        })?;
        tracing::debug!(state = ?ExchangeState::Authenticated, "client credentials exchange");
        Ok(session_from_token(token))
    }

    /// Authorization Code flow: exchange the code, read the profile, upsert the
    /// user and cache the session. Bounded by the configured deadline.
    pub async fn authenticate(&self, code: &str) -> Result<Authenticated, AuthFlowError> {
        let result = match tokio::time::timeout(self.deadline, self.run_code_flow(code)).await {
            Ok(result) => result,
            Err(_) => Err(AuthFlowError::TimedOut(self.deadline)),
        };

        match &result {
            Ok(done) => tracing::info!(
                state = ?ExchangeState::Authenticated,
                user_id = %done.user.id,
                created = done.created,
                "authorization code flow finished"
            ),
            Err(e) => tracing::error!(state = ?e.state(), error = %e, "authorization code flow failed"),
        }
        result
    }

    async fn run_code_flow(&self, code: &str) -> Result<Authenticated, AuthFlowError> {
        tracing::debug!(state = ?ExchangeState::Requesting, "exchanging authorization code");
        let token = self
            .spotify
            .exchange_authorization_code(code)
            .await
            .map_err(AuthFlowError::Exchange)?;
        let session = session_from_token(token);

        let profile = retry_rate_limited(self.retry, "profile fetch", || {
            self.spotify.get_user_profile(&session.access_token)
        })
        .await
        .map_err(AuthFlowError::Profile)?;

        let (user, created) = self.upsert_user(profile, session.clone()).await?;

        self.cache.set(&user.id, &session).await?;
        tracing::debug!(user_id = %user.id, "session cached");

        Ok(Authenticated {
            user,
            session,
            created,
        })
    }

    /// Inserts a first-time user; otherwise replaces only the stored session.
    async fn upsert_user(
        &self,
        profile: UserProfile,
        session: Session,
    ) -> Result<(User, bool), StoreError> {
        match self.users.find(&profile.id).await? {
            Some(mut existing) => {
                self.users
                    .update_session(&existing.id, session.clone())
                    .await?;
                existing.session = session;
                Ok((existing, false))
            }
            None => {
                let user = User {
                    display_name: profile.display_name.unwrap_or_else(|| profile.id.clone()),
                    id: profile.id,
                    country: profile.country.unwrap_or_default(),
                    plan: profile.product.unwrap_or_default(),
                    email: profile.email.unwrap_or_default(),
                    session,
                };
                self.users.insert(user.clone()).await?;
                tracing::info!(user_id = %user.id, "new user registered");
                Ok((user, true))
            }
        }
    }
}

fn session_from_token(token: TokenResponse) -> Session {
    Session {
        access_token: token.access_token,
        token_type: token.token_type,
        scope: token.scope,
        refresh_token: token.refresh_token,
        expires_in: token.expires_in,
        issued_at: Utc::now(),
    }
}

/// Random URL-safe anti-forgery string for the authorization request.
pub fn generate_state() -> String {
    let bytes: [u8; STATE_BYTES] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
