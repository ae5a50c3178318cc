//! In-memory index of user accounts plus the sessions issued against them.
//!
//! Locking discipline: records are copied out under the shared lock and the
//! lock is released before any bcrypt work. The running server mutates
//! lockout counters and last-login only in memory; the on-disk fields belong
//! to the offline admin surface, so a file reload (e.g. `enable-user`)
//! replaces them wholesale. Sessions survive user-file reloads and are
//! checked against the live user set at validation time.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::AuthError;
use crate::models::principal::Principal;
use crate::models::session::{session_ttl, Session};
use crate::models::user::{UserFile, UserRecord};
use crate::utils::password::{dummy_hash, hash_password, verify_password};
use crate::utils::token::{generate_secret, sha256_hex};

/// A freshly issued session. `token` is handed to the caller exactly once
/// and exists nowhere else in plaintext.
#[derive(Debug)]
pub struct SessionGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct UserStore {
    users: RwLock<HashMap<String, UserRecord>>,
    /// session hash -> session
    sessions: RwLock<HashMap<String, Session>>,
    /// 0 disables lockout.
    lockout_threshold: u32,
}

impl UserStore {
    pub fn new(lockout_threshold: u32) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            lockout_threshold,
        }
    }

    pub fn from_file(file: UserFile, lockout_threshold: u32) -> Self {
        let store = Self::new(lockout_threshold);
        store.reload(file);
        store
    }

    /// Atomically replaces the user set. Sessions are retained; sessions of
    /// users no longer present die at their next validation.
    pub fn reload(&self, file: UserFile) {
        let map: HashMap<String, UserRecord> = file
            .users
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect();
        *self.write_users() = map;
    }

    /// Verifies a username/password pair and issues a session on success.
    ///
    /// Unknown and disabled users are verified against a fixed dummy hash so
    /// all failure paths cost one bcrypt comparison.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionGrant, AuthError> {
        let record = self.read_users().get(username).cloned();

        let (hash, gate) = match &record {
            None => (dummy_hash(), Some(AuthError::UnknownUser)),
            Some(user) if !user.enabled => (dummy_hash(), Some(AuthError::UserDisabled)),
            Some(user) => (user.password_hash.as_str(), None),
        };

        let matched = verify_password(password, hash).map_err(AuthError::Internal)?;
        if let Some(err) = gate {
            return Err(err);
        }
        if !matched {
            self.note_password_failure(username);
            return Err(AuthError::WrongPassword);
        }

        let token = generate_secret().map_err(AuthError::Internal)?;
        let session = Session {
            hash: sha256_hex(&token),
            username: username.to_string(),
            issued_at: now,
            expires_at: now + session_ttl(),
        };

        {
            let mut users = self.write_users();
            if let Some(user) = users.get_mut(username) {
                user.last_login_at = Some(now);
                user.failed_attempts = 0;
            }
        }
        let expires_at = session.expires_at;
        self.write_sessions().insert(session.hash.clone(), session);

        Ok(SessionGrant { token, expires_at })
    }

    /// Resolves a bearer secret to a session principal. Rejects expired
    /// sessions and sessions whose user has been disabled or deleted since.
    pub fn validate_session(
        &self,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let hash = sha256_hex(secret);
        let session = self
            .read_sessions()
            .get(&hash)
            .cloned()
            .ok_or(AuthError::UnknownToken)?;

        if session.is_expired(now) {
            self.write_sessions().remove(&hash);
            return Err(AuthError::SessionExpired);
        }

        match self.read_users().get(&session.username) {
            Some(user) if user.enabled => {}
            Some(_) => return Err(AuthError::UserDisabled),
            None => return Err(AuthError::UnknownUser),
        }

        Ok(Principal::user_session(hash, session.expires_at))
    }

    /// Whether a live session owns this identity key and its user still
    /// exists and is enabled. Used by the connection broker.
    pub fn contains_identity(&self, hash: &str) -> bool {
        let username = match self.read_sessions().get(hash) {
            Some(session) => session.username.clone(),
            None => return false,
        };
        self.read_users()
            .get(&username)
            .map(|u| u.enabled)
            .unwrap_or(false)
    }

    fn note_password_failure(&self, username: &str) {
        let mut users = self.write_users();
        if let Some(user) = users.get_mut(username) {
            user.failed_attempts = user.failed_attempts.saturating_add(1);
            if self.lockout_threshold > 0
                && user.failed_attempts >= self.lockout_threshold
                && user.enabled
            {
                user.enabled = false;
                tracing::warn!(
                    username,
                    attempts = user.failed_attempts,
                    "account locked after repeated password failures"
                );
            }
        }
    }

    /// Deletes expired sessions. Returns how many were removed.
    pub fn sweep_expired_sessions(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.write_sessions();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }

    pub fn update_password(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let hash = hash_password(password).map_err(AuthError::Internal)?;
        let mut users = self.write_users();
        let user = users.get_mut(username).ok_or(AuthError::UnknownUser)?;
        user.password_hash = hash;
        Ok(())
    }

    pub fn set_enabled(&self, username: &str, enabled: bool) -> Result<(), AuthError> {
        let mut users = self.write_users();
        let user = users.get_mut(username).ok_or(AuthError::UnknownUser)?;
        user.enabled = enabled;
        if enabled {
            user.failed_attempts = 0;
        }
        Ok(())
    }

    /// Removes the user. Their sessions die at next validation.
    pub fn delete(&self, username: &str) -> Result<(), AuthError> {
        self.write_users()
            .remove(username)
            .map(|_| ())
            .ok_or(AuthError::UnknownUser)
    }

    pub fn get(&self, username: &str) -> Option<UserRecord> {
        self.read_users().get(username).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.read_users().len()
    }

    pub fn session_count(&self) -> usize {
        self.read_sessions().len()
    }

    fn read_users(&self) -> RwLockReadGuard<'_, HashMap<String, UserRecord>> {
        self.users.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_users(&self) -> RwLockWriteGuard<'_, HashMap<String, UserRecord>> {
        self.users.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}
