//! Access-token issuance and verification (RS256).
//!
//! One RSA keypair is generated when the service is constructed and lives as
//! long as the process. Nothing here performs I/O: verification depends only on
//! the token, the public key and the clock, so it is safe on every request.
//!
//! A restart generates a new keypair, which invalidates all outstanding access
//! tokens but leaves durable refresh sessions untouched.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::EncodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use huachuca_core::AuthError;

use crate::claims::{validate_claims, AccessClaims, TokenValidationError};
use crate::Principal;

pub const KEY_BITS: usize = 2048;
pub const KEY_ID: &str = "default-key";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token signature or algorithm")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("malformed token")]
    Malformed,

    #[error("signing key error: {0}")]
    Key(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidSignature
            | TokenError::Expired
            | TokenError::NotYetValid
            | TokenError::Malformed => AuthError::Unauthenticated,
            TokenError::Key(msg) | TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<TokenValidationError> for TokenError {
    fn from(err: TokenValidationError) -> Self {
        match err {
            TokenValidationError::Expired => TokenError::Expired,
            TokenValidationError::NotYetValid => TokenError::NotYetValid,
            TokenValidationError::InvalidTimeWindow => TokenError::Malformed,
        }
    }
}

/// JSON Web Key for the service's RSA public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kid: String,
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_field: String,
    pub n: String,
    pub e: String,
    pub x5c: Vec<String>,
}

/// JSON Web Key Set served at the discovery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Signs and verifies access tokens.
///
/// Construct once per process and share behind an `Arc`.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    public_key: RsaPublicKey,
    validation: Validation,
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("kid", &KEY_ID)
            .field("bits", &(self.public_key.size() * 8))
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Generate a fresh RSA-2048 keypair.
    pub fn generate() -> Result<Self, TokenError> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
            .map_err(|e| TokenError::Key(e.to_string()))?;
        Self::from_private_key(key)
    }

    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, TokenError> {
        let public_key = RsaPublicKey::from(&private_key);

        let private_der = private_key
            .to_pkcs1_der()
            .map_err(|e| TokenError::Key(e.to_string()))?;
        let public_der = public_key
            .to_pkcs1_der()
            .map_err(|e| TokenError::Key(e.to_string()))?;

        // Temporal claims are checked by `validate_claims` against an explicit
        // clock, so the library's own exp/nbf checks are disabled.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf", "iat"]);

        Ok(Self {
            encoding: EncodingKey::from_rsa_der(private_der.as_bytes()),
            decoding: DecodingKey::from_rsa_der(public_der.as_bytes()),
            public_key,
            validation,
        })
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, TokenError> {
        self.issue_at(principal, Utc::now())
    }

    pub fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.sign(&AccessClaims::for_principal(principal, now))
    }

    /// Sign an arbitrary claim set.
    pub fn sign(&self, claims: &AccessClaims) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(KEY_ID.to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map_err(classify)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// The public key as a single-entry JWK set.
    pub fn jwks(&self) -> Result<JwkSet, TokenError> {
        let spki = self
            .public_key
            .to_public_key_der()
            .map_err(|e| TokenError::Key(e.to_string()))?;

        Ok(JwkSet {
            keys: vec![Jwk {
                kid: KEY_ID.to_string(),
                kty: "RSA".to_string(),
                alg: "RS256".to_string(),
                use_field: "sig".to_string(),
                n: URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
                e: URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
                x5c: vec![STANDARD.encode(spki.as_bytes())],
            }],
        })
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidRsaKey(_) => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        _ => TokenError::Malformed,
    }
}
