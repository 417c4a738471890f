//! Accounts and sessions.
//!
//! Passwords are stored as SHA-256 over a per-user random salt plus the
//! password. Session cookies carry `<session id>.<secret>`; only the secret's
//! SHA-256 digest is persisted, and verification compares digests in
//! constant time.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, SessionsRepo, UsersRepo};
use crate::domain::entities::{SessionRecord, UserRecord};
use crate::domain::forms::FieldErrors;
use crate::domain::users::validate_signup;

/// Sessions live for two weeks from issue; there is no sliding renewal.
pub const SESSION_TTL: Duration = Duration::days(14);

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("form validation failed")]
    Validation(FieldErrors),
    #[error("username is already taken")]
    UsernameTaken,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A freshly issued session: the value to set as the cookie plus its expiry.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub cookie_value: String,
    pub expires_at: OffsetDateTime,
    pub user: UserRecord,
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UsersRepo>, sessions: Arc<dyn SessionsRepo>) -> Self {
        Self { users, sessions }
    }

    /// Create an account and log it in.
    pub async fn signup(&self, username: &str, password: &str) -> Result<IssuedSession, AccountError> {
        let draft = match validate_signup(username, password) {
            Ok(draft) => draft,
            Err(errors) => return Err(AccountError::Validation(errors)),
        };

        let salt = Uuid::new_v4().into_bytes().to_vec();
        let digest = password_digest(&salt, &draft.password);

        let user = match self
            .users
            .create_user(CreateUserParams {
                username: draft.username,
                password_salt: salt,
                password_digest: digest,
            })
            .await
        {
            Ok(user) => user,
            Err(RepoError::Duplicate { .. }) => return Err(AccountError::UsernameTaken),
            Err(err) => return Err(err.into()),
        };

        self.issue_session(user).await
    }

    /// Verify credentials and issue a session.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AccountError> {
        let Some(stored) = self.users.find_credentials(username.trim()).await? else {
            return Err(AccountError::InvalidCredentials);
        };

        let candidate = password_digest(&stored.password_salt, password);
        if candidate.ct_eq(&stored.password_digest).unwrap_u8() != 1 {
            return Err(AccountError::InvalidCredentials);
        }

        self.issue_session(stored.user).await
    }

    /// Revoke the session named by the cookie. Malformed or unknown cookies
    /// are a no-op: logout always succeeds.
    pub async fn logout(&self, cookie_value: &str) -> Result<(), AccountError> {
        if let Some((session_id, _)) = parse_cookie(cookie_value) {
            self.sessions.delete_session(session_id).await?;
        }
        Ok(())
    }

    /// Resolve a session cookie to its user, if the session exists, the
    /// secret matches, and the session has not expired.
    pub async fn resolve(&self, cookie_value: &str) -> Result<Option<UserRecord>, AccountError> {
        let Some((session_id, secret)) = parse_cookie(cookie_value) else {
            return Ok(None);
        };

        let Some(session) = self.sessions.find_session(session_id).await? else {
            return Ok(None);
        };

        let candidate = secret_digest(&secret);
        if candidate.ct_eq(&session.token_digest).unwrap_u8() != 1 {
            debug!(target = "cortile::accounts", %session_id, "session secret mismatch");
            return Ok(None);
        }

        if session.expires_at <= OffsetDateTime::now_utc() {
            self.sessions.delete_session(session_id).await?;
            return Ok(None);
        }

        Ok(self.users.find_by_id(session.user_id).await?)
    }

    /// Drop sessions past their expiry. Invoked opportunistically at startup.
    pub async fn prune_expired(&self) -> Result<u64, AccountError> {
        Ok(self
            .sessions
            .delete_expired(OffsetDateTime::now_utc())
            .await?)
    }

    async fn issue_session(&self, user: UserRecord) -> Result<IssuedSession, AccountError> {
        let session_id = Uuid::new_v4();
        let secret = Uuid::new_v4().simple().to_string();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + SESSION_TTL;

        self.sessions
            .insert_session(SessionRecord {
                id: session_id,
                user_id: user.id,
                token_digest: secret_digest(&secret),
                created_at: now,
                expires_at,
            })
            .await?;

        Ok(IssuedSession {
            cookie_value: format!("{}.{secret}", session_id.simple()),
            expires_at,
            user,
        })
    }
}

fn parse_cookie(value: &str) -> Option<(Uuid, String)> {
    let (id, secret) = value.split_once('.')?;
    if secret.is_empty() {
        return None;
    }
    let session_id = Uuid::try_parse(id).ok()?;
    Some((session_id, secret.to_string()))
}

fn password_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn secret_digest(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_round_trip_parses() {
        let id = Uuid::new_v4();
        let value = format!("{}.abcdef0123456789", id.simple());
        let (parsed_id, secret) = parse_cookie(&value).expect("cookie parses");
        assert_eq!(parsed_id, id);
        assert_eq!(secret, "abcdef0123456789");
    }

    #[test]
    fn malformed_cookies_are_rejected() {
        assert!(parse_cookie("").is_none());
        assert!(parse_cookie("no-separator").is_none());
        assert!(parse_cookie("not-a-uuid.secret").is_none());
        assert!(parse_cookie(&format!("{}.", Uuid::new_v4().simple())).is_none());
    }

    #[test]
    fn password_digest_depends_on_salt() {
        let a = password_digest(b"salt-a", "hunter22");
        let b = password_digest(b"salt-b", "hunter22");
        assert_ne!(a, b);
        assert_eq!(a, password_digest(b"salt-a", "hunter22"));
    }
}
