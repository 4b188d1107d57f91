//! HS256 bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Turns a raw bearer string into trusted claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// Shared-secret (HMAC-SHA256) validator.
///
/// `jsonwebtoken`'s own `exp`/`nbf` checks are disabled because our claims use
/// RFC 3339 `issued_at`/`expires_at`; [`validate_claims`] enforces the window instead.
pub struct Hs256JwtValidator {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign claims with the same secret. Used by dev tooling and tests.
    pub fn issue(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenValidationError::InvalidSignature,
                _ => TokenValidationError::Malformed(e.to_string()),
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ironbooks_core::TenantId;

    use crate::{PrincipalId, Role};

    fn sample_claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("ap_clerk")],
            issued_at: now - Duration::seconds(5),
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn issued_tokens_round_trip() {
        let v = Hs256JwtValidator::new(b"test-secret");
        let now = Utc::now();
        let claims = sample_claims(now);

        let token = v.issue(&claims).unwrap();
        let decoded = v.validate(&token, now).unwrap();

        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.tenant_id, claims.tenant_id);
        assert_eq!(decoded.roles, claims.roles);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let token = Hs256JwtValidator::new(b"one").issue(&sample_claims(now)).unwrap();

        let err = Hs256JwtValidator::new(b"two").validate(&token, now).unwrap_err();
        assert_eq!(err, TokenValidationError::InvalidSignature);
    }

    #[test]
    fn expired_token_is_rejected_after_signature_check() {
        let v = Hs256JwtValidator::new(b"test-secret");
        let now = Utc::now();
        let token = v.issue(&sample_claims(now)).unwrap();

        let err = v.validate(&token, now + Duration::hours(1)).unwrap_err();
        assert_eq!(err, TokenValidationError::Expired);
    }

    #[test]
    fn garbage_is_malformed() {
        let v = Hs256JwtValidator::new(b"test-secret");
        assert!(matches!(
            v.validate("not.a.jwt", Utc::now()),
            Err(TokenValidationError::Malformed(_))
        ));
    }
}
