use argon2::{
    password_hash::{
        rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher,
        PasswordVerifier, SaltString,
    },
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{session::Session, user::User},
    state::AppState,
};

pub const SESSION_COOKIE: &str = "viajes_session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

/// The caller of an operation. Anonymous callers can read nothing and write
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.cookie_key.clone());
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Self::anonymous());
        };
        let user = resolve_session(state, cookie.value()).await?;
        Ok(Self(user))
    }
}

impl CurrentUser {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn signed_in(user: AuthenticatedUser) -> Self {
        Self(Some(user))
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        self.0.as_ref()
    }

    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthenticated)
    }
}

/// Sign-up input. The email is trimmed and lowercased before it is checked.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Registration {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "does not match password"))]
    pub password_confirm: String,
}

impl Registration {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        password_confirm: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            password_confirm: password_confirm.into(),
        }
    }
}

pub async fn register_user(
    state: &AppState,
    registration: Registration,
) -> Result<AuthenticatedUser, AppError> {
    let registration = Registration {
        email: registration.email.trim().to_lowercase(),
        ..registration
    };
    registration.validate()?;
    let Registration { email, password, .. } = registration;

    let taken: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if taken.is_some() {
        return Err(AppError::BadRequest("email is already registered".into()));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash: hash_password(&password)?,
        created_at: Utc::now(),
        last_login_at: None,
    };
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, created_at, last_login_at) \
         VALUES (?, ?, ?, ?, NULL)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .execute(&state.db)
    .await?;

    info!(user_id = %user.id, "user registered");
    Ok(user.into())
}

/// Checks email and password. Unknown emails and wrong passwords are
/// indistinguishable to the caller.
pub async fn authenticate_user(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let user: Option<User> = sqlx::query_as(
        "SELECT id, email, password_hash, created_at, last_login_at FROM users WHERE email = ?",
    )
    .bind(email.trim().to_lowercase())
    .fetch_optional(&state.db)
    .await?;
    let Some(user) = user else {
        return Err(AppError::Unauthenticated);
    };
    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login rejected");
        return Err(AppError::Unauthenticated);
    }

    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(&user.id)
        .execute(&state.db)
        .await?;
    Ok(user.into())
}

pub async fn create_session(state: &AppState, user_id: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        created_at: now,
        last_seen_at: now,
        expires_at: now + state.config.session_ttl(),
    };
    sqlx::query(
        "INSERT INTO sessions (id, user_id, created_at, last_seen_at, expires_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(session.created_at)
    .bind(session.last_seen_at)
    .bind(session.expires_at)
    .execute(&state.db)
    .await?;
    debug!(user_id = %user_id, "session created");
    Ok(session.id)
}

/// Maps a session id to its user. Expired sessions are deleted and resolve
/// to `None`.
pub async fn resolve_session(
    state: &AppState,
    session_id: &str,
) -> Result<Option<AuthenticatedUser>, AppError> {
    let session: Option<Session> = sqlx::query_as(
        "SELECT id, user_id, created_at, last_seen_at, expires_at FROM sessions WHERE id = ?",
    )
    .bind(session_id)
    .fetch_optional(&state.db)
    .await?;
    let Some(session) = session else {
        return Ok(None);
    };

    let now = Utc::now();
    if session.is_expired(now) {
        destroy_session(state, &session.id).await?;
        return Ok(None);
    }

    sqlx::query("UPDATE sessions SET last_seen_at = ? WHERE id = ?")
        .bind(now)
        .bind(&session.id)
        .execute(&state.db)
        .await?;

    let user: Option<User> = sqlx::query_as(
        "SELECT id, email, password_hash, created_at, last_login_at FROM users WHERE id = ?",
    )
    .bind(&session.user_id)
    .fetch_optional(&state.db)
    .await?;
    Ok(user.map(AuthenticatedUser::from))
}

pub async fn destroy_session(state: &AppState, session_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(&state.db)
        .await?;
    Ok(())
}

pub fn apply_session_cookie(jar: PrivateCookieJar, session_id: &str) -> PrivateCookieJar {
    jar.add(
        Cookie::build((SESSION_COOKIE, session_id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Other(anyhow::anyhow!("password hashing failed: {err}")))
}

pub fn verify_password(password: &str, stored: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|err| AppError::Other(anyhow::anyhow!("stored password hash is invalid: {err}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(err) => Err(AppError::Other(anyhow::anyhow!(
            "password verification failed: {err}"
        ))),
    }
}
