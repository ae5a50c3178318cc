//! The front gate. Classifies a bearer secret against the two credential
//! stores, applies the rate limiter, and produces the [`Principal`] handed to
//! downstream code. Callers never learn which path matched (or why one did
//! not); the distinction lives in the log.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::rate_limit::RateLimiter;
use crate::auth::token_store::TokenStore;
use crate::auth::user_store::{SessionGrant, UserStore};
use crate::error::AuthError;
use crate::models::principal::Principal;

pub struct Authenticator {
    enabled: bool,
    tokens: Arc<TokenStore>,
    users: Arc<UserStore>,
    limiter: Arc<RateLimiter>,
}

impl Authenticator {
    pub fn new(
        enabled: bool,
        tokens: Arc<TokenStore>,
        users: Arc<UserStore>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            enabled,
            tokens,
            users,
            limiter,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn user_store(&self) -> &Arc<UserStore> {
        &self.users
    }

    /// Authenticates the `Authorization` header value of a request.
    ///
    /// Token lookup is a hash probe and runs first; the same secret is then
    /// tried as a session token. Misses and expiries count against the
    /// caller's address.
    pub fn authenticate_bearer(
        &self,
        header: Option<&str>,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        if !self.enabled {
            return Ok(Principal::synthetic());
        }

        let secret = parse_bearer(header)?;
        self.limiter.check(ip, now)?;

        let mut token_expired = false;
        if let Some(token) = self.tokens.lookup_by_secret(secret) {
            if !token.is_expired(now) {
                return Ok(Principal::from_token(&token));
            }
            token_expired = true;
        }

        match self.users.validate_session(secret, now) {
            Ok(principal) => Ok(principal),
            Err(err) => {
                self.limiter.record_failure(ip, now);
                if token_expired {
                    Err(AuthError::ExpiredToken)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Interactive username/password authentication; issues a session token
    /// on success. Failures count against both the caller's address and the
    /// account's lockout counter (inside the user store).
    pub fn authenticate_user(
        &self,
        username: &str,
        password: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<SessionGrant, AuthError> {
        self.limiter.check(ip, now)?;

        match self.users.authenticate(username, password, now) {
            Ok(grant) => Ok(grant),
            Err(err) => {
                if !matches!(err, AuthError::Internal(_)) {
                    self.limiter.record_failure(ip, now);
                }
                Err(err)
            }
        }
    }
}

fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingAuthorization)?;
    let secret = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedAuthorization)?;
    if secret.is_empty() {
        return Err(AuthError::MalformedAuthorization);
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::principal::PrincipalKind;
    use crate::models::token::{TokenFile, TokenRecord};
    use crate::models::user::{UserFile, UserRecord};
    use crate::utils::token::sha256_hex;
    use chrono::Duration;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn token(id: &str, secret: &str, expires_at: Option<DateTime<Utc>>) -> TokenRecord {
        TokenRecord {
            id: id.into(),
            hash: sha256_hex(secret),
            note: String::new(),
            created_at: Utc::now(),
            expires_at,
            database: Some("staging".into()),
        }
    }

    fn authenticator(
        tokens: Vec<TokenRecord>,
        users: Vec<UserRecord>,
        max_attempts: u32,
    ) -> Authenticator {
        Authenticator::new(
            true,
            Arc::new(TokenStore::from_file(TokenFile { tokens }, Utc::now())),
            Arc::new(UserStore::from_file(UserFile { users }, 0)),
            Arc::new(RateLimiter::new(15, max_attempts)),
        )
    }

    #[test]
    fn valid_token_yields_an_api_principal() {
        let auth = authenticator(vec![token("token-a", "hello", None)], vec![], 10);
        let principal = auth
            .authenticate_bearer(Some("Bearer hello"), ip(1), Utc::now())
            .expect("authorised");
        assert_eq!(principal.kind, PrincipalKind::ApiToken);
        assert_eq!(principal.identity_key, sha256_hex("hello"));
        assert_eq!(principal.database_binding.as_deref(), Some("staging"));
    }

    #[test]
    fn case_differences_do_not_match() {
        let auth = authenticator(vec![token("token-a", "hello", None)], vec![], 10);
        let err = auth
            .authenticate_bearer(Some("Bearer HELLO"), ip(1), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), "unknown_token");
    }

    #[test]
    fn missing_and_malformed_headers_are_rejected() {
        let auth = authenticator(vec![], vec![], 10);
        assert_eq!(
            auth.authenticate_bearer(None, ip(1), Utc::now())
                .unwrap_err()
                .kind(),
            "missing_authorization"
        );
        assert_eq!(
            auth.authenticate_bearer(Some("Basic zzz"), ip(1), Utc::now())
                .unwrap_err()
                .kind(),
            "malformed_authorization"
        );
        assert_eq!(
            auth.authenticate_bearer(Some("Bearer "), ip(1), Utc::now())
                .unwrap_err()
                .kind(),
            "malformed_authorization"
        );
    }

    #[test]
    fn expired_token_is_rejected_before_and_after_sweep() {
        let live_until = Utc::now() + Duration::minutes(5);
        let auth = authenticator(vec![token("token-a", "soon", Some(live_until))], vec![], 10);

        let now = live_until + Duration::seconds(1);
        let err = auth
            .authenticate_bearer(Some("Bearer soon"), ip(1), now)
            .unwrap_err();
        assert_eq!(err.kind(), "expired_token");

        auth.token_store().sweep_expired(now);
        let err = auth
            .authenticate_bearer(Some("Bearer soon"), ip(1), now)
            .unwrap_err();
        assert_eq!(err.kind(), "unknown_token");
    }

    #[test]
    fn failures_accumulate_into_a_block_even_for_valid_credentials() {
        let auth = authenticator(vec![token("token-a", "valid", None)], vec![], 2);
        let now = Utc::now();

        for _ in 0..2 {
            auth.authenticate_bearer(Some("Bearer wrong"), ip(9), now)
                .unwrap_err();
        }
        let err = auth
            .authenticate_bearer(Some("Bearer valid"), ip(9), now)
            .unwrap_err();
        assert_eq!(err.kind(), "rate_limited");

        // a different address is untouched
        auth.authenticate_bearer(Some("Bearer valid"), ip(10), now)
            .expect("clean address authorised");
    }

    #[test]
    fn session_secret_authenticates_as_user_session() {
        let user = UserRecord {
            username: "alice".into(),
            password_hash: bcrypt::hash("S3cret!", 4).unwrap(),
            note: String::new(),
            created_at: Utc::now(),
            last_login_at: None,
            enabled: true,
            failed_attempts: 0,
        };
        let auth = authenticator(vec![], vec![user], 10);
        let now = Utc::now();

        let grant = auth
            .authenticate_user("alice", "S3cret!", ip(1), now)
            .expect("session issued");
        let principal = auth
            .authenticate_bearer(Some(&format!("Bearer {}", grant.token)), ip(1), now)
            .expect("session accepted");
        assert_eq!(principal.kind, PrincipalKind::UserSession);
    }

    #[test]
    fn disabled_authenticator_returns_a_synthetic_principal() {
        let auth = Authenticator::new(
            false,
            Arc::new(TokenStore::new()),
            Arc::new(UserStore::new(0)),
            Arc::new(RateLimiter::new(15, 10)),
        );
        let principal = auth
            .authenticate_bearer(None, ip(1), Utc::now())
            .expect("always authorised");
        assert_eq!(principal.kind, PrincipalKind::Anonymous);
    }
}
