//! Password hashing. The credential format mandates bcrypt at cost >= 12.

use std::sync::OnceLock;

pub const BCRYPT_COST: u32 = 12;

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let hash = bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    bcrypt::verify(password, hash)
        .map_err(|e| anyhow::anyhow!("Password verification error: {}", e))
}

/// Fixed hash compared against when the username is unknown or the account is
/// disabled, so that those paths cost the same as a real verification.
pub fn dummy_hash() -> &'static str {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();

    DUMMY_HASH.get_or_init(|| match bcrypt::hash("dummy", BCRYPT_COST) {
        Ok(hash) => hash,
        Err(err) => {
            tracing::error!("Failed to generate dummy hash: {}", err);
            "$2b$12$eImiTXuWVxfM37uY4JANjQPzMzXZjQDzqzQpMv0xoGrTplPPNaE3W".to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let pw = "S3cret!";
        let hash = hash_password(pw).expect("hash should succeed");
        assert!(hash.starts_with("$2"));
        assert!(verify_password(pw, &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn dummy_hash_never_matches_real_input() {
        assert!(!verify_password("S3cret!", dummy_hash()).unwrap());
    }
}
