//! Interactive login state machine.
//!
//! `Anonymous → AwaitingCredentials → (AwaitingTwoFactor) → Authenticated`.
//! A failed attempt returns the caller to the credentials prompt; cancelling
//! a pending second factor logs the partial auth cookie out best-effort.

use crate::client::ApiClient;
use crate::cookies::CookieJar;
use crate::models::{LoginResponse, TwoFactorKind, User};
use crate::ApiError;

/// An authenticated session: the user record plus the cookie pair that
/// authenticates every subsequent call.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub jar: CookieJar,
}

/// Where a login attempt landed.
pub enum LoginFlow<'a> {
    /// No second factor needed.
    LoggedIn(Session),
    /// Credentials accepted; a code must be verified to proceed.
    TwoFactor(PendingTwoFactor<'a>),
    /// The service rejected the credentials.
    BadCredentials,
}

/// Starts a session from username and password.
pub async fn begin_login<'a>(
    client: &'a ApiClient,
    username: &str,
    password: &str,
) -> Result<LoginFlow<'a>, ApiError> {
    match client
        .get_user(Some((username, password)), &CookieJar::default())
        .await?
    {
        LoginResponse::Success { user, auth_cookie } => {
            tracing::info!(user = %user.id, "logged in");
            Ok(LoginFlow::LoggedIn(Session {
                user,
                jar: CookieJar::new(auth_cookie.unwrap_or_default(), String::new()),
            }))
        }
        LoginResponse::TwoFactorRequired { kinds, auth_cookie } => {
            tracing::info!(?kinds, "two-factor verification required");
            Ok(LoginFlow::TwoFactor(PendingTwoFactor {
                client,
                kinds,
                auth_cookie,
            }))
        }
        LoginResponse::InvalidCredentials => Ok(LoginFlow::BadCredentials),
    }
}

/// Re-establishes a session from a stored cookie pair.
///
/// Revalidates against `GET /auth` first; stale cookies surface as
/// [`ApiError::SessionExpired`] so the caller can fall back to the
/// credentials prompt.
pub async fn resume_session(client: &ApiClient, jar: &CookieJar) -> Result<Session, ApiError> {
    if !client.check_auth(jar).await? {
        return Err(ApiError::SessionExpired);
    }
    match client.get_user(None, jar).await? {
        LoginResponse::Success { user, auth_cookie } => Ok(Session {
            user,
            jar: CookieJar::new(
                auth_cookie.unwrap_or_else(|| jar.auth.clone()),
                jar.two_factor.clone(),
            ),
        }),
        _ => Err(ApiError::SessionExpired),
    }
}

/// A login paused on the second factor.
pub struct PendingTwoFactor<'a> {
    client: &'a ApiClient,
    /// Methods the service will accept, in its preference order.
    pub kinds: Vec<TwoFactorKind>,
    auth_cookie: String,
}

impl PendingTwoFactor<'_> {
    /// Verifies the code and completes the session.
    pub async fn verify(self, kind: TwoFactorKind, code: &str) -> Result<Session, ApiError> {
        let two_factor = self
            .client
            .verify_two_factor(&self.auth_cookie, kind, code)
            .await?;
        let jar = CookieJar::new(self.auth_cookie, two_factor);

        match self.client.get_user(None, &jar).await? {
            LoginResponse::Success { user, auth_cookie } => {
                let jar = match auth_cookie {
                    Some(auth) => CookieJar::new(auth, jar.two_factor),
                    None => jar,
                };
                tracing::info!(user = %user.id, "logged in with two-factor");
                Ok(Session { user, jar })
            }
            _ => Err(ApiError::TwoFactorFailed),
        }
    }

    /// Abandons the half-established login, dropping the partial auth cookie
    /// server-side best-effort.
    pub async fn cancel(self) {
        self.client
            .logout(&CookieJar::new(self.auth_cookie, String::new()))
            .await;
    }
}
