//! Sign-up, log-in and cookie sessions.
//!
//! Passwords are stored as argon2 PHC strings. Session tokens are 32 random
//! bytes handed to the browser; only their SHA-256 digest reaches storage.

use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use crate::application::forms::{FormErrors, NON_FIELD};
use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::UserRecord;
use crate::domain::users::{
    validate_email, validate_name, validate_new_password, validate_username,
};

pub const SESSION_COOKIE: &str = "yatube_session";
const TOKEN_BYTES: usize = 32;
const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const USERNAME_TAKEN: &str = "A user with that username already exists.";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid form: {0}")]
    Invalid(FormErrors),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: i64,
    pub username: String,
}

impl From<&UserRecord> for Viewer {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

/// A freshly issued session: the raw cookie value and when it lapses.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct SignupInput {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn signup(
        &self,
        input: SignupInput,
    ) -> Result<(UserRecord, IssuedSession), AuthError> {
        let mut errors = FormErrors::new();
        let first_name = errors.check(validate_name("first_name", &input.first_name));
        let last_name = errors.check(validate_name("last_name", &input.last_name));
        let username = errors.check(validate_username(&input.username));
        let email = errors.check(validate_email(&input.email));
        errors.check(validate_new_password(&input.password1, &input.password2));

        if let Some(username) = username.as_deref() {
            if self.users.find_by_username(username).await?.is_some() {
                errors.add("username", USERNAME_TAKEN);
            }
        }

        let (Some(first_name), Some(last_name), Some(username), Some(email), true) =
            (first_name, last_name, username, email, errors.is_empty())
        else {
            return Err(AuthError::Invalid(errors));
        };

        let password_hash = hash_password(&input.password1)?;
        let user = self
            .users
            .create_user(CreateUserParams {
                username,
                first_name,
                last_name,
                email,
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => {
                    AuthError::Invalid(FormErrors::single("username", USERNAME_TAKEN))
                }
                other => AuthError::Repo(other),
            })?;

        info!(
            target = "yatube::application::auth",
            user_id = user.id,
            username = %user.username,
            "user signed up"
        );
        let session = self.start_session(user.id).await?;
        Ok((user, session))
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserRecord, IssuedSession), AuthError> {
        let invalid = || AuthError::Invalid(FormErrors::single(NON_FIELD, INVALID_LOGIN));

        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(invalid());
        }

        let Some(user) = self.users.find_by_username(username).await? else {
            return Err(invalid());
        };
        if !verify_password(password, &user.password_hash) {
            return Err(invalid());
        }

        let purged = self.sessions.delete_expired(OffsetDateTime::now_utc()).await?;
        if purged > 0 {
            debug!(target = "yatube::application::auth", purged, "expired sessions removed");
        }

        let session = self.start_session(user.id).await?;
        info!(
            target = "yatube::application::auth",
            user_id = user.id,
            "user logged in"
        );
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions
            .delete_by_token_hash(&hash_token(token))
            .await?;
        Ok(())
    }

    /// Resolve a cookie value to its user. Unknown and expired sessions are
    /// anonymous.
    pub async fn resolve(&self, token: &str) -> Result<Option<UserRecord>, AuthError> {
        let Some(session) = self
            .sessions
            .find_by_token_hash(&hash_token(token))
            .await?
        else {
            return Ok(None);
        };

        if session.is_expired_at(OffsetDateTime::now_utc()) {
            return Ok(None);
        }

        Ok(self.users.find_by_id(session.user_id).await?)
    }

    async fn start_session(&self, user_id: i64) -> Result<IssuedSession, AuthError> {
        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + self.session_ttl;
        self.sessions
            .create_session(CreateSessionParams {
                user_id,
                token_hash: hash_token(&token),
                expires_at,
            })
            .await?;
        Ok(IssuedSession { token, expires_at })
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize().to_vec())
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
