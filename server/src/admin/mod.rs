//! Offline operator surface. Every operation takes the sibling `.lock`,
//! rewrites the credential file through the codec's atomic path, and thereby
//! triggers the watcher of any running server instance. Nothing here is
//! reachable over the network.

use std::path::Path;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::codec;
use crate::auth::token_store::remove_by_prefix;
use crate::error::CodecError;
use crate::models::token::{TokenFile, TokenRecord};
use crate::models::user::{UserFile, UserRecord};
use crate::utils::password::hash_password;
use crate::utils::token::{generate_secret, sha256_hex};

/// Result of [`add_token`]. `secret` is shown to the operator once and never
/// touches disk.
#[derive(Debug)]
pub struct NewToken {
    pub secret: String,
    pub record: TokenRecord,
}

/// Redacted view of a token for listings.
#[derive(Debug)]
pub struct TokenListing {
    pub id: String,
    pub hash_prefix: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub valid: bool,
}

/// Redacted view of a user for listings.
#[derive(Debug)]
pub struct UserListing {
    pub username: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub failed_attempts: u32,
}

pub fn add_token(
    path: &Path,
    note: &str,
    expires_at: Option<DateTime<Utc>>,
    database: Option<String>,
    now: DateTime<Utc>,
) -> anyhow::Result<NewToken> {
    let _lock = codec::lock_sibling(path)?;
    let mut file = load_tokens_or_empty(path)?;

    let secret = generate_secret()?;
    let record = TokenRecord {
        id: format!("token-{}", Uuid::new_v4()),
        hash: sha256_hex(&secret),
        note: note.to_string(),
        created_at: now,
        expires_at,
        database,
    };

    if file.tokens.iter().any(|t| t.hash == record.hash) {
        return Err(anyhow!("token hash collision, retry"));
    }
    file.tokens.push(record.clone());
    codec::save_token_file(path, &file)?;

    Ok(NewToken { secret, record })
}

pub fn remove_token(path: &Path, needle: &str) -> anyhow::Result<TokenRecord> {
    let _lock = codec::lock_sibling(path)?;
    let mut file =
        codec::load_token_file(path).with_context(|| "failed to read the token file")?;
    let removed = remove_by_prefix(&mut file.tokens, needle)?;
    codec::save_token_file(path, &file)?;
    Ok(removed)
}

pub fn list_tokens(path: &Path, now: DateTime<Utc>) -> anyhow::Result<Vec<TokenListing>> {
    let file = load_tokens_or_empty(path)?;
    Ok(file
        .tokens
        .into_iter()
        .map(|t| TokenListing {
            hash_prefix: t.hash.chars().take(8).collect(),
            valid: !t.is_expired(now),
            id: t.id,
            note: t.note,
            created_at: t.created_at,
            expires_at: t.expires_at,
        })
        .collect())
}

pub fn add_user(
    path: &Path,
    username: &str,
    password: &str,
    note: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let _lock = codec::lock_sibling(path)?;
    let mut file = load_users_or_empty(path)?;

    if file.users.iter().any(|u| u.username == username) {
        return Err(anyhow!("user '{}' already exists", username));
    }
    file.users.push(UserRecord {
        username: username.to_string(),
        password_hash: hash_password(password)?,
        note: note.to_string(),
        created_at: now,
        last_login_at: None,
        enabled: true,
        failed_attempts: 0,
    });
    codec::save_user_file(path, &file)?;
    Ok(())
}

/// Updates password and/or note of an existing user.
pub fn update_user(
    path: &Path,
    username: &str,
    password: Option<&str>,
    note: Option<&str>,
) -> anyhow::Result<()> {
    mutate_user(path, username, |user| {
        if let Some(password) = password {
            user.password_hash = hash_password(password)?;
        }
        if let Some(note) = note {
            user.note = note.to_string();
        }
        Ok(())
    })
}

pub fn delete_user(path: &Path, username: &str) -> anyhow::Result<()> {
    let _lock = codec::lock_sibling(path)?;
    let mut file = codec::load_user_file(path)?;
    let before = file.users.len();
    file.users.retain(|u| u.username != username);
    if file.users.len() == before {
        return Err(anyhow!("no user named '{}'", username));
    }
    codec::save_user_file(path, &file)?;
    Ok(())
}

/// Enabling also clears the failure counter, undoing a lockout.
pub fn set_user_enabled(path: &Path, username: &str, enabled: bool) -> anyhow::Result<()> {
    mutate_user(path, username, |user| {
        user.enabled = enabled;
        if enabled {
            user.failed_attempts = 0;
        }
        Ok(())
    })
}

pub fn list_users(path: &Path) -> anyhow::Result<Vec<UserListing>> {
    let file = load_users_or_empty(path)?;
    Ok(file
        .users
        .into_iter()
        .map(|u| UserListing {
            username: u.username,
            note: u.note,
            created_at: u.created_at,
            last_login_at: u.last_login_at,
            enabled: u.enabled,
            failed_attempts: u.failed_attempts,
        })
        .collect())
}

fn mutate_user(
    path: &Path,
    username: &str,
    apply: impl FnOnce(&mut UserRecord) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let _lock = codec::lock_sibling(path)?;
    let mut file = codec::load_user_file(path)?;
    let user = file
        .users
        .iter_mut()
        .find(|u| u.username == username)
        .ok_or_else(|| anyhow!("no user named '{}'", username))?;
    apply(user)?;
    codec::save_user_file(path, &file)?;
    Ok(())
}

/// A missing file is an empty store for additive operations; any other read
/// failure (permissions, parse) still aborts.
fn load_tokens_or_empty(path: &Path) -> anyhow::Result<TokenFile> {
    match codec::load_token_file(path) {
        Ok(file) => Ok(file),
        Err(CodecError::Io { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(TokenFile::default())
        }
        Err(err) => Err(err.into()),
    }
}

fn load_users_or_empty(path: &Path) -> anyhow::Result<UserFile> {
    match codec::load_user_file(path) {
        Ok(file) => Ok(file),
        Err(CodecError::Io { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(UserFile::default())
        }
        Err(err) => Err(err.into()),
    }
}
