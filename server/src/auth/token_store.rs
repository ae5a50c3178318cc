//! In-memory index of API tokens, keyed by secret hash and by id. Reads take
//! the shared side of the lock; reloads swap the whole index under the
//! exclusive side so concurrent authentications never observe a partial view.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::models::token::{TokenFile, TokenRecord};
use crate::utils::token::sha256_hex;

/// Minimum length for removal by hash prefix.
pub const MIN_HASH_PREFIX: usize = 8;

#[derive(Default)]
struct TokenIndex {
    by_hash: HashMap<String, TokenRecord>,
    /// id -> hash
    by_id: HashMap<String, String>,
}

#[derive(Default)]
pub struct TokenStore {
    index: RwLock<TokenIndex>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(file: TokenFile, now: DateTime<Utc>) -> Self {
        let store = Self::new();
        store.reload(file, now);
        store
    }

    /// Atomically replaces the store contents with the given file. Tokens
    /// already expired at `now` are dropped on the way in.
    pub fn reload(&self, file: TokenFile, now: DateTime<Utc>) {
        let total = file.tokens.len();
        let mut index = TokenIndex::default();
        for record in file.tokens {
            if record.is_expired(now) {
                continue;
            }
            index.by_id.insert(record.id.clone(), record.hash.clone());
            index.by_hash.insert(record.hash.clone(), record);
        }
        let removed = total - index.by_hash.len();
        if removed > 0 {
            tracing::info!("removed {} expired tokens", removed);
        }
        *self.write() = index;
    }

    /// Hashes the presented secret and looks it up. Expiry is the caller's
    /// decision; the record is copied out so no lock is held afterwards.
    pub fn lookup_by_secret(&self, secret: &str) -> Option<TokenRecord> {
        let hash = sha256_hex(secret);
        self.read().by_hash.get(&hash).cloned()
    }

    /// Whether a live (loaded, unexpired-at-last-sweep) token owns this
    /// identity key. Used by the connection broker during reconciliation.
    pub fn contains_identity(&self, hash: &str) -> bool {
        self.read().by_hash.contains_key(hash)
    }

    /// Drops tokens that have expired since the last load. Returns how many
    /// were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut index = self.write();
        let expired: Vec<(String, String)> = index
            .by_hash
            .values()
            .filter(|t| t.is_expired(now))
            .map(|t| (t.hash.clone(), t.id.clone()))
            .collect();
        for (hash, id) in &expired {
            index.by_hash.remove(hash);
            index.by_id.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!("removed {} expired tokens", expired.len());
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, TokenIndex> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TokenIndex> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RemoveError {
    #[error("no token matches '{0}'")]
    NotFound(String),
    #[error("'{0}' matches more than one token, use a longer prefix or the id")]
    Ambiguous(String),
    #[error("hash prefix must be at least {MIN_HASH_PREFIX} characters")]
    PrefixTooShort,
}

/// Removes the token whose `id` equals `needle` exactly, or whose hash starts
/// with `needle` (at least [`MIN_HASH_PREFIX`] characters). Exactly one match
/// is required. Operates on the decoded file so the admin surface and tests
/// share it.
pub fn remove_by_prefix(
    tokens: &mut Vec<TokenRecord>,
    needle: &str,
) -> Result<TokenRecord, RemoveError> {
    let by_id: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.id == needle)
        .map(|(i, _)| i)
        .collect();
    if by_id.len() == 1 {
        return Ok(tokens.remove(by_id[0]));
    }
    if by_id.len() > 1 {
        // ids are unique by invariant; a duplicate file is still ambiguous
        return Err(RemoveError::Ambiguous(needle.to_string()));
    }

    if needle.len() < MIN_HASH_PREFIX {
        return Err(RemoveError::PrefixTooShort);
    }
    let by_hash: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| hash_has_prefix(&t.hash, needle))
        .map(|(i, _)| i)
        .collect();
    match by_hash.len() {
        0 => Err(RemoveError::NotFound(needle.to_string())),
        1 => Ok(tokens.remove(by_hash[0])),
        _ => Err(RemoveError::Ambiguous(needle.to_string())),
    }
}

/// Constant-time prefix comparison so removal probes cannot time-scan hashes.
fn hash_has_prefix(hash: &str, prefix: &str) -> bool {
    use subtle::ConstantTimeEq;

    if prefix.len() > hash.len() {
        return false;
    }
    hash.as_bytes()[..prefix.len()]
        .ct_eq(prefix.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, secret: &str, expires_at: Option<DateTime<Utc>>) -> TokenRecord {
        TokenRecord {
            id: id.into(),
            hash: sha256_hex(secret),
            note: String::new(),
            created_at: Utc::now(),
            expires_at,
            database: None,
        }
    }

    fn store_with(tokens: Vec<TokenRecord>) -> TokenStore {
        TokenStore::from_file(TokenFile { tokens }, Utc::now())
    }

    #[test]
    fn lookup_hashes_the_secret() {
        let store = store_with(vec![record("token-a", "hello", None)]);
        assert!(store.lookup_by_secret("hello").is_some());
        assert!(store.lookup_by_secret("HELLO").is_none());
        assert!(store.lookup_by_secret("").is_none());
    }

    #[test]
    fn expired_tokens_are_dropped_on_load() {
        let past = Utc::now() - Duration::hours(1);
        let store = store_with(vec![
            record("token-a", "live", None),
            record("token-b", "dead", Some(past)),
        ]);
        assert_eq!(store.len(), 1);
        assert!(store.lookup_by_secret("dead").is_none());
    }

    #[test]
    fn sweep_removes_tokens_expiring_after_load() {
        let soon = Utc::now() + Duration::minutes(5);
        let store = store_with(vec![record("token-a", "shortlived", Some(soon))]);
        assert_eq!(store.sweep_expired(Utc::now()), 0);
        assert_eq!(store.sweep_expired(Utc::now() + Duration::minutes(6)), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn reload_replaces_previous_contents() {
        let store = store_with(vec![record("token-a", "old", None)]);
        store.reload(
            TokenFile {
                tokens: vec![record("token-b", "new", None)],
            },
            Utc::now(),
        );
        assert!(store.lookup_by_secret("old").is_none());
        assert!(store.lookup_by_secret("new").is_some());
        assert!(store.contains_identity(&sha256_hex("new")));
    }

    #[test]
    fn remove_matches_id_exactly() {
        let mut tokens = vec![record("token-a", "one", None), record("token-b", "two", None)];
        let removed = remove_by_prefix(&mut tokens, "token-a").expect("remove");
        assert_eq!(removed.id, "token-a");
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn remove_matches_hash_prefix() {
        let mut tokens = vec![record("token-a", "one", None)];
        let prefix = tokens[0].hash[..12].to_string();
        let removed = remove_by_prefix(&mut tokens, &prefix).expect("remove");
        assert_eq!(removed.id, "token-a");
    }

    #[test]
    fn short_hash_prefix_is_rejected() {
        let mut tokens = vec![record("token-a", "one", None)];
        let prefix = tokens[0].hash[..7].to_string();
        assert_eq!(
            remove_by_prefix(&mut tokens, &prefix),
            Err(RemoveError::PrefixTooShort)
        );
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn ambiguous_prefix_is_rejected() {
        let mut a = record("token-a", "one", None);
        let mut b = record("token-b", "two", None);
        a.hash = format!("deadbeef{}", &a.hash[8..]);
        b.hash = format!("deadbeef{}", &b.hash[8..]);
        let mut tokens = vec![a, b];
        assert_eq!(
            remove_by_prefix(&mut tokens, "deadbeef"),
            Err(RemoveError::Ambiguous("deadbeef".into()))
        );
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn unknown_needle_is_not_found() {
        let mut tokens = vec![record("token-a", "one", None)];
        assert_eq!(
            remove_by_prefix(&mut tokens, "ffffffffffff"),
            Err(RemoveError::NotFound("ffffffffffff".into()))
        );
    }
}
