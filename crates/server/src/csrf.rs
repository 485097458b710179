//! CSRF token generation and verification.
//!
//! Tokens are random, session-bound, single-use, and time-limited. Every
//! state-changing form embeds one and every POST handler verifies it before
//! touching storage.

use anyhow::{Result, bail};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tower_sessions::Session;

/// Session key for storing CSRF tokens.
const CSRF_SESSION_KEY: &str = "csrf_tokens";

/// Maximum number of outstanding tokens per session.
const MAX_TOKENS: usize = 10;

/// Token validity period in seconds (1 hour).
const TOKEN_VALIDITY_SECS: i64 = 3600;

/// One issued token with its issue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssuedToken {
    token: String,
    issued_at: i64,
}

impl IssuedToken {
    fn is_current(&self, now: i64) -> bool {
        now - self.issued_at <= TOKEN_VALIDITY_SECS
    }
}

/// Generate a CSRF token and store it in the session.
pub async fn generate_csrf_token(session: &Session) -> Result<String> {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);

    let issued_at = chrono::Utc::now().timestamp();

    let mut hasher = Sha256::new();
    hasher.update(random_bytes);
    hasher.update(issued_at.to_le_bytes());
    let token = hex::encode(hasher.finalize());

    let mut tokens: Vec<IssuedToken> = session
        .get(CSRF_SESSION_KEY)
        .await
        .unwrap_or(None)
        .unwrap_or_default();

    tokens.push(IssuedToken {
        token: token.clone(),
        issued_at,
    });

    // Oldest tokens fall off once the cap is reached
    if tokens.len() > MAX_TOKENS {
        let skip = tokens.len() - MAX_TOKENS;
        tokens = tokens.into_iter().skip(skip).collect();
    }

    session
        .insert(CSRF_SESSION_KEY, tokens)
        .await
        .map_err(|e| anyhow::anyhow!("failed to store CSRF token: {}", e))?;

    Ok(token)
}

/// Verify a CSRF token against the session.
///
/// Tokens are single-use: a successful verification consumes the token.
pub async fn verify_csrf_token(session: &Session, submitted: &str) -> Result<bool> {
    if submitted.is_empty() {
        bail!("empty CSRF token");
    }

    let mut tokens: Vec<IssuedToken> = session
        .get(CSRF_SESSION_KEY)
        .await
        .unwrap_or(None)
        .unwrap_or_default();

    if tokens.is_empty() {
        return Ok(false);
    }

    let now = chrono::Utc::now().timestamp();

    let found = tokens.iter().position(|issued| {
        let matches: bool = issued.token.as_bytes().ct_eq(submitted.as_bytes()).into();
        matches && issued.is_current(now)
    });

    if let Some(index) = found {
        tokens.remove(index);
        tokens.retain(|issued| issued.is_current(now));

        session
            .insert(CSRF_SESSION_KEY, tokens)
            .await
            .map_err(|e| anyhow::anyhow!("failed to update CSRF tokens: {}", e))?;

        return Ok(true);
    }

    Ok(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_format() {
        // Tokens are hex encoded SHA256 (64 chars)
        let token = hex::encode(Sha256::digest(b"test"));
        assert_eq!(token.len(), 64);
    }

    #[test]
    fn test_token_expiry_window() {
        let issued = IssuedToken {
            token: "abc".to_string(),
            issued_at: 1_000,
        };

        assert!(issued.is_current(1_000 + TOKEN_VALIDITY_SECS));
        assert!(!issued.is_current(1_000 + TOKEN_VALIDITY_SECS + 1));
    }
}
