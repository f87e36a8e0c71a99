//! Bearer token validation
//!
//! Token issuance belongs to the auth collaborator; this module only
//! validates HS256 tokens it issued, for the realtime handshake and the
//! operator-facing surfaces.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Operator user id.
    pub sub: Uuid,
    /// Tenant the operator belongs to.
    pub org: Uuid,
    pub exp: usize,
}

pub fn validate_bearer(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[test]
    fn round_trip_and_reject_wrong_secret() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            org: Uuid::new_v4(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret-1"),
        )
        .unwrap();

        let validated = validate_bearer(&token, "secret-1").unwrap();
        assert_eq!(validated.org, claims.org);
        assert!(validate_bearer(&token, "secret-2").is_none());
    }
}
