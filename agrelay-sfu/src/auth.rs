//! Room token validation and signing
//!
//! Tokens are compact JWTs signed with HMAC-SHA256. The `sub` claim
//! carries the room id; `exp` is required. The symmetric key is looked
//! up through a caller-supplied fetcher so deployments can key rooms off
//! the client-provided hint.

use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, RoomId};

/// Claims carried by a room token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomClaims {
    /// Room id.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Not-before time (Unix timestamp), validated when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Issued at (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Verify `token` and return the room id from its subject claim.
///
/// The signing key is obtained through `fetch_key(hint)`. Any algorithm
/// other than HS256 is rejected before the key is fetched.
pub fn room_id_from_token<F>(token: &str, hint: &str, fetch_key: F) -> Result<RoomId>
where
    F: FnOnce(&str) -> Result<String>,
{
    let header = decode_header(token)
        .map_err(|err| Error::Authentication(format!("malformed token: {err}")))?;
    if header.alg != Algorithm::HS256 {
        return Err(Error::Authentication(format!(
            "unexpected signing algorithm: {:?}",
            header.alg
        )));
    }

    let key = fetch_key(hint)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 60; // clock skew

    let data = decode::<RoomClaims>(token, &DecodingKey::from_secret(key.as_bytes()), &validation)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                Error::Authentication("token expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => {
                Error::Authentication("token not yet valid".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                Error::Authentication("invalid token signature".to_string())
            }
            _ => Error::Authentication(format!("token verification failed: {err}")),
        })?;

    Ok(RoomId::from(data.claims.sub))
}

/// Sign a room token valid for `ttl`. Used by the dev-mode token
/// endpoint; production deployments issue tokens out of band.
pub fn sign_room_token(room_id: &RoomId, key: &str, ttl: chrono::Duration) -> Result<String> {
    if key.is_empty() {
        return Err(Error::Internal("signing key cannot be empty".to_string()));
    }

    let now = Utc::now();
    let claims = RoomClaims {
        sub: room_id.to_string(),
        exp: (now + ttl).timestamp(),
        nbf: None,
        iat: Some(now.timestamp()),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )
    .map_err(|err| Error::Internal(format!("failed to sign token: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-secret-key";

    fn fetch_test_key(_hint: &str) -> Result<String> {
        Ok(KEY.to_string())
    }

    #[test]
    fn sign_and_verify_round_trips() {
        let room_id = RoomId::from("R1");
        let token = sign_room_token(&room_id, KEY, chrono::Duration::minutes(2)).unwrap();
        let got = room_id_from_token(&token, "", fetch_test_key).unwrap();
        assert_eq!(got, room_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = RoomClaims {
            sub: "R1".to_string(),
            exp: Utc::now().timestamp() - 3600,
            nbf: None,
            iat: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(KEY.as_bytes()),
        )
        .unwrap();

        let err = room_id_from_token(&token, "", fetch_test_key).unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn non_hs256_algorithm_is_rejected_before_key_fetch() {
        let claims = RoomClaims {
            sub: "R1".to_string(),
            exp: Utc::now().timestamp() + 120,
            nbf: None,
            iat: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(KEY.as_bytes()),
        )
        .unwrap();

        let err = room_id_from_token(&token, "", |_| {
            panic!("key fetcher must not run for a rejected algorithm")
        })
        .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let room_id = RoomId::from("R1");
        let token = sign_room_token(&room_id, "other-key", chrono::Duration::minutes(2)).unwrap();
        let err = room_id_from_token(&token, "", fetch_test_key).unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn key_fetch_failure_propagates() {
        let room_id = RoomId::from("R1");
        let token = sign_room_token(&room_id, KEY, chrono::Duration::minutes(2)).unwrap();
        let err = room_id_from_token(&token, "hint", |_| {
            Err(Error::Authentication("no key for hint".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let room_id = RoomId::from("R1");
        let token = sign_room_token(&room_id, KEY, chrono::Duration::minutes(2)).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = "dGFtcGVyZWQ";
        let tampered = parts.join(".");
        assert!(room_id_from_token(&tampered, "", fetch_test_key).is_err());
    }

    #[test]
    fn empty_signing_key_is_refused() {
        let room_id = RoomId::from("R1");
        assert!(sign_room_token(&room_id, "", chrono::Duration::minutes(2)).is_err());
    }
}
