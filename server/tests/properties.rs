//! Property suites over the credential codec and stores.

use chrono::{DateTime, TimeZone, Utc};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;

use pgmcp_server::{
    admin,
    auth::{codec, token_store::TokenStore},
    models::token::{TokenFile, TokenRecord},
    models::user::{UserFile, UserRecord},
    utils::expiry::parse_expiry,
    utils::token::sha256_hex,
};

fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    // whole-second timestamps between 2001 and 2033; RFC 3339 round-trips
    (1_000_000_000i64..2_000_000_000i64).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

fn label() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ._-]{0,24}"
}

fn token_record() -> impl Strategy<Value = TokenRecord> {
    (
        "[a-z0-9-]{1,24}",
        "[0-9a-f]{64}",
        label(),
        timestamp(),
        option::of(timestamp()),
        option::of("[a-z_]{1,16}"),
    )
        .prop_map(|(id, hash, note, created_at, expires_at, database)| TokenRecord {
            id,
            hash,
            note,
            created_at,
            expires_at,
            database,
        })
}

fn user_record() -> impl Strategy<Value = UserRecord> {
    (
        "[a-zA-Z][a-zA-Z0-9_]{0,15}",
        "[!-~]{10,60}",
        label(),
        timestamp(),
        option::of(timestamp()),
        any::<bool>(),
        0u32..10,
    )
        .prop_map(
            |(username, password_hash, note, created_at, last_login_at, enabled, failed)| {
                UserRecord {
                    username,
                    password_hash,
                    note,
                    created_at,
                    last_login_at,
                    enabled,
                    failed_attempts: failed,
                }
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// load(save(state)) == state, and saving is idempotent.
    #[test]
    fn token_file_round_trips(records in vec(token_record(), 0..8)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        let file = TokenFile { tokens: records };

        codec::save_token_file(&path, &file).unwrap();
        let first = std::fs::read(&path).unwrap();
        let loaded = codec::load_token_file(&path).unwrap();
        prop_assert_eq!(&loaded, &file);

        codec::save_token_file(&path, &loaded).unwrap();
        let second = std::fs::read(&path).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn user_file_round_trips(records in vec(user_record(), 0..8)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.yaml");
        let mut records = records;
        records.dedup_by(|a, b| a.username == b.username);
        let file = UserFile { users: records };

        codec::save_user_file(&path, &file).unwrap();
        let loaded = codec::load_user_file(&path).unwrap();
        prop_assert_eq!(loaded, file);
    }

    /// lookup_by_secret(s) succeeds iff the store holds sha256_hex(s).
    #[test]
    fn hashing_stability(secrets in vec("[!-~]{1,32}", 1..6), probe in "[!-~]{1,32}") {
        let now = Utc::now();
        let tokens: Vec<TokenRecord> = secrets
            .iter()
            .enumerate()
            .map(|(i, secret)| TokenRecord {
                id: format!("token-{}", i),
                hash: sha256_hex(secret),
                note: String::new(),
                created_at: now,
                expires_at: None,
                database: None,
            })
            .collect();
        let store = TokenStore::from_file(TokenFile { tokens }, now);

        for secret in &secrets {
            prop_assert!(store.lookup_by_secret(secret).is_some());
        }
        let expected = secrets.iter().any(|s| sha256_hex(s) == sha256_hex(&probe));
        prop_assert_eq!(store.lookup_by_secret(&probe).is_some(), expected);
    }

    /// No admin mutation ever puts a returned secret on disk.
    #[test]
    fn secrets_never_reach_disk(notes in vec(label(), 1..4)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        let now = Utc::now();

        let mut secrets = Vec::new();
        for note in &notes {
            let new = admin::add_token(&path, note, None, None, now).unwrap();
            secrets.push(new.secret);
        }
        // remove one to exercise the rewrite path as well
        let listing = admin::list_tokens(&path, now).unwrap();
        admin::remove_token(&path, &listing[0].id).unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        for secret in &secrets {
            prop_assert!(!on_disk.contains(secret.as_str()));
        }
    }

    /// An expired token never authenticates, before or after the sweep.
    #[test]
    fn expiry_is_monotonic(minutes_past in 1i64..10_000) {
        let now = Utc::now();
        let expired_at = now - chrono::Duration::minutes(minutes_past);
        let store = TokenStore::from_file(
            TokenFile {
                tokens: vec![TokenRecord {
                    id: "token-x".into(),
                    hash: sha256_hex("secret"),
                    note: String::new(),
                    created_at: now - chrono::Duration::days(365),
                    expires_at: Some(expired_at),
                    database: None,
                }],
            },
            // loaded before expiry, so the record is resident
            expired_at - chrono::Duration::minutes(1),
        );

        let resident = store.lookup_by_secret("secret");
        prop_assert!(resident.map(|t| t.is_expired(now)).unwrap_or(false));
        store.sweep_expired(now);
        prop_assert!(store.lookup_by_secret("secret").is_none());
    }

    /// Shorthand parsing lands on the exact offset.
    #[test]
    fn expiry_shorthand_offsets(n in 1i64..1000) {
        let now = Utc::now();
        prop_assert_eq!(
            parse_expiry(&format!("{}h", n), now).unwrap(),
            Some(now + chrono::Duration::hours(n))
        );
        prop_assert_eq!(
            parse_expiry(&format!("{}d", n), now).unwrap(),
            Some(now + chrono::Duration::days(n))
        );
        prop_assert_eq!(
            parse_expiry(&format!("{}w", n), now).unwrap(),
            Some(now + chrono::Duration::weeks(n))
        );
        prop_assert_eq!(
            parse_expiry(&format!("{}y", n), now).unwrap(),
            Some(now + chrono::Duration::days(n * 365))
        );
    }
}
