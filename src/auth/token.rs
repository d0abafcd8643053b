// Session token issuing and decoding
//
// Tokens are `header.payload.signature`, each segment base64url without
// padding. The header carries `iat`/`exp`, the payload carries the username,
// and the signature is HMAC-SHA256 over `header.payload`.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use sha2::Sha256;

use super::types::{AuthFailure, SharedSecret, TokenDecode, TokenHeader, TokenPayload};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_ALGORITHM: &str = "HS256";

/// Default token lifetime in seconds
pub const DEFAULT_TOKEN_TTL: u64 = 600;

/// Issues and decodes signed, time-limited session tokens
#[derive(Debug, Clone)]
pub struct TokenSigner {
    secret: SharedSecret,
}

impl TokenSigner {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    /// Issue a token for `username` valid for `ttl_seconds` from now
    pub fn issue(&self, username: &str, ttl_seconds: u64) -> Result<String> {
        self.issue_at(username, ttl_seconds, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(&self, username: &str, ttl_seconds: u64, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        let header = TokenHeader {
            alg: TOKEN_ALGORITHM.to_string(),
            iat,
            exp: iat.saturating_add(ttl),
        };
        let payload = TokenPayload {
            username: username.to_string(),
        };

        let header_json = serde_json::to_vec(&header).context("Failed to encode token header")?;
        let payload_json =
            serde_json::to_vec(&payload).context("Failed to encode token payload")?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(payload_json)
        );

        let mut mac = self
            .mac()
            .map_err(|e| anyhow::anyhow!("Failed to initialize token signer: {}", e))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Try to read `token` as a session token at the current time
    pub fn decode(&self, token: &str) -> TokenDecode {
        self.decode_at(token, Utc::now())
    }

    /// Try to read `token` as a session token as if the current time were `now`
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> TokenDecode {
        match self.try_decode(token, now) {
            Ok(username) => TokenDecode::Decoded(username),
            Err(reason) => TokenDecode::NotAToken(reason),
        }
    }

    fn try_decode(&self, token: &str, now: DateTime<Utc>) -> Result<String, AuthFailure> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthFailure::MalformedCredential);
        };
        if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(AuthFailure::MalformedCredential);
        }

        // Signature first: an expired token with a bad signature is malformed, not expired
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64.as_bytes())
            .map_err(|_| AuthFailure::MalformedCredential)?;
        let mut mac = self.mac().map_err(|_| AuthFailure::MalformedCredential)?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthFailure::MalformedCredential)?;

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(AuthFailure::MalformedCredential);
        }
        let payload: TokenPayload = decode_segment(payload_b64)?;

        if now.timestamp() > header.exp {
            return Err(AuthFailure::ExpiredCredential);
        }

        Ok(payload.username)
    }

    fn mac(&self) -> Result<HmacSha256, hmac::digest::InvalidLength> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, AuthFailure> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment.as_bytes())
        .map_err(|_| AuthFailure::MalformedCredential)?;
    serde_json::from_slice(&raw).map_err(|_| AuthFailure::MalformedCredential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(SharedSecret::new(secret).unwrap())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_issue_then_decode() {
        let signer = signer("top-secret");
        let token = signer.issue_at("alice", 600, t0()).unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(
            signer.decode_at(&token, t0()),
            TokenDecode::Decoded("alice".to_string())
        );
    }

    #[test]
    fn test_issue_uses_current_time() {
        let signer = signer("top-secret");
        let token = signer.issue("alice", DEFAULT_TOKEN_TTL).unwrap();
        assert_eq!(
            signer.decode(&token),
            TokenDecode::Decoded("alice".to_string())
        );
    }

    #[test]
    fn test_token_valid_until_expiry_inclusive() {
        let signer = signer("top-secret");
        let token = signer.issue_at("alice", 600, t0()).unwrap();

        for offset in [1, 300, 599, 600] {
            assert_eq!(
                signer.decode_at(&token, t0() + Duration::seconds(offset)),
                TokenDecode::Decoded("alice".to_string()),
                "token should still be valid at t+{}s",
                offset
            );
        }
    }

    #[test]
    fn test_token_expires_after_ttl() {
        let signer = signer("top-secret");
        let token = signer.issue_at("alice", 600, t0()).unwrap();

        assert_eq!(
            signer.decode_at(&token, t0() + Duration::seconds(601)),
            TokenDecode::NotAToken(AuthFailure::ExpiredCredential)
        );
    }

    #[test]
    fn test_wrong_secret_is_malformed() {
        let token = signer("secret-a").issue_at("alice", 600, t0()).unwrap();
        assert_eq!(
            signer("secret-b").decode_at(&token, t0()),
            TokenDecode::NotAToken(AuthFailure::MalformedCredential)
        );
    }

    #[test]
    fn test_expired_token_with_bad_signature_is_malformed() {
        let token = signer("secret-a").issue_at("alice", 10, t0()).unwrap();
        assert_eq!(
            signer("secret-b").decode_at(&token, t0() + Duration::hours(1)),
            TokenDecode::NotAToken(AuthFailure::MalformedCredential)
        );
    }

    #[test]
    fn test_plain_username_is_not_a_token() {
        let signer = signer("top-secret");
        for input in ["alice", "", ".", "..", "a.b.c", "a.b.c.d"] {
            assert_eq!(
                signer.decode_at(input, t0()),
                TokenDecode::NotAToken(AuthFailure::MalformedCredential),
                "input {:?}",
                input
            );
        }
    }

    #[test]
    fn test_swapped_payload_is_rejected() {
        let signer = signer("top-secret");
        let alice = signer.issue_at("alice", 600, t0()).unwrap();
        let mallory = signer.issue_at("mallory", 600, t0()).unwrap();

        // alice's header and signature with mallory's payload
        let alice_parts: Vec<&str> = alice.split('.').collect();
        let mallory_parts: Vec<&str> = mallory.split('.').collect();
        let forged = format!("{}.{}.{}", alice_parts[0], mallory_parts[1], alice_parts[2]);

        assert_eq!(
            signer.decode_at(&forged, t0()),
            TokenDecode::NotAToken(AuthFailure::MalformedCredential)
        );
    }

    #[test]
    fn test_extended_expiry_is_rejected() {
        let signer = signer("top-secret");
        let token = signer.issue_at("alice", 600, t0()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_header = TokenHeader {
            alg: TOKEN_ALGORITHM.to_string(),
            iat: t0().timestamp(),
            exp: t0().timestamp() + 86_400,
        };
        let forged = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_header).unwrap()),
            parts[1],
            parts[2]
        );

        assert_eq!(
            signer.decode_at(&forged, t0() + Duration::seconds(601)),
            TokenDecode::NotAToken(AuthFailure::MalformedCredential)
        );
    }

    #[test]
    fn test_reissue_does_not_invalidate_previous_token() {
        let signer = signer("top-secret");
        let first = signer.issue_at("alice", 600, t0()).unwrap();
        let second = signer
            .issue_at("alice", 600, t0() + Duration::seconds(30))
            .unwrap();

        let at = t0() + Duration::seconds(60);
        assert_eq!(
            signer.decode_at(&first, at),
            TokenDecode::Decoded("alice".to_string())
        );
        assert_eq!(
            signer.decode_at(&second, at),
            TokenDecode::Decoded("alice".to_string())
        );
    }

    const B64URL: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

    proptest! {
        #[test]
        fn prop_signature_tampering_is_malformed(index in 0usize..64, replacement in 0usize..64) {
            let signer = signer("top-secret");
            let token = signer.issue_at("alice", 600, t0()).unwrap();
            let sig_start = token.rfind('.').unwrap() + 1;
            let mut bytes = token.into_bytes();
            let pos = sig_start + index % (bytes.len() - sig_start);

            let mut new_byte = B64URL[replacement];
            if new_byte == bytes[pos] {
                new_byte = B64URL[(replacement + 1) % B64URL.len()];
            }
            bytes[pos] = new_byte;
            let tampered = String::from_utf8(bytes).unwrap();

            prop_assert_eq!(
                signer.decode_at(&tampered, t0()),
                TokenDecode::NotAToken(AuthFailure::MalformedCredential)
            );
        }

        #[test]
        fn prop_arbitrary_input_never_decodes(input in ".{0,256}") {
            let signer = signer("top-secret");
            prop_assert!(matches!(signer.decode_at(&input, t0()), TokenDecode::NotAToken(_)));
        }

        #[test]
        fn prop_round_trip_before_expiry(
            username in "[A-Za-z0-9_.-]{1,15}",
            ttl in 1u64..100_000,
            elapsed in 0u64..100_000,
        ) {
            let signer = signer("top-secret");
            let token = signer.issue_at(&username, ttl, t0()).unwrap();
            let at = t0() + Duration::seconds(elapsed as i64);
            let decoded = signer.decode_at(&token, at);

            if elapsed <= ttl {
                prop_assert_eq!(decoded, TokenDecode::Decoded(username));
            } else {
                prop_assert_eq!(decoded, TokenDecode::NotAToken(AuthFailure::ExpiredCredential));
            }
        }
    }
}
