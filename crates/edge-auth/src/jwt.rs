//! JWT verification against the user pool JWKS.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::IdpClient;
use crate::error::VerificationFailure;
use crate::jwks::KeySetCache;
use crate::{Error, Result};

/// The `token_use` claim of a Cognito token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    /// Id token.
    Id,
    /// Access token.
    Access,
}

/// Decoded claims of a verified token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Claims {
    /// Token kind.
    pub token_use: TokenUse,

    /// Subject.
    pub sub: String,

    /// Username claim of id tokens.
    #[serde(rename = "cognito:username", default)]
    pub cognito_username: Option<String>,

    /// Username claim of access tokens.
    #[serde(default)]
    pub username: Option<String>,

    /// Expiry, seconds since the epoch.
    pub exp: u64,

    /// Issuer.
    pub iss: String,

    /// Audience (id tokens).
    #[serde(default)]
    pub aud: Option<String>,

    /// Client id (access tokens).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Key id from the token header.
    #[serde(skip)]
    pub kid: String,

    /// Every other claim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// The user's name, whichever token kind carried it.
    pub fn user_name(&self) -> Option<&str> {
        self.cognito_username
            .as_deref()
            .or(self.username.as_deref())
    }

    /// Get an additional claim by key.
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Options for token verification.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Expected issuer (`iss`).
    pub issuer: Option<String>,

    /// Expected app client id, checked against `aud` or `client_id`.
    pub client_id: Option<String>,

    /// Allowed algorithms.
    pub allowed_algs: Vec<Algorithm>,

    /// Clock skew/leeway in seconds.
    pub leeway_seconds: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            issuer: None,
            client_id: None,
            allowed_algs: vec![Algorithm::RS256],
            leeway_seconds: 0,
        }
    }
}

/// Verifies user pool tokens.
pub struct JwtVerifier<C> {
    keys: Arc<KeySetCache<C>>,
    opts: VerifyOptions,
}

impl<C: IdpClient> JwtVerifier<C> {
    /// Verifier reading keys from `keys`.
    pub fn new(keys: Arc<KeySetCache<C>>, opts: VerifyOptions) -> Self {
        Self { keys, opts }
    }

    /// The key cache backing this verifier.
    pub fn key_cache(&self) -> &Arc<KeySetCache<C>> {
        &self.keys
    }

    /// Verify signature, expiry, issuer and audience of `token`.
    pub async fn verify(&self, token: &str) -> Result<Claims> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| Error::Verification(VerificationFailure::Malformed))?;

        if !self.opts.allowed_algs.contains(&header.alg) {
            return Err(Error::Verification(VerificationFailure::UnsupportedAlgorithm));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(Error::Verification(VerificationFailure::Malformed))?;

        let cached = self.keys.get_key(&kid).await.map_err(|e| {
            let failure = match &e {
                Error::KeyNotFound(_) => VerificationFailure::UnknownKey,
                _ => VerificationFailure::KeySetUnavailable,
            };
            tracing::debug!(kid = %kid, error = %e, "no key for token");
            Error::Verification(failure)
        })?;

        if cached.alg != header.alg {
            return Err(Error::Verification(VerificationFailure::UnsupportedAlgorithm));
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.opts.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Audience lives in `aud` or `client_id` depending on token use; checked below.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = jsonwebtoken::decode::<Claims>(token, &cached.key, &validation)
            .map_err(|e| Error::Verification(classify(e.kind())))?;

        let mut claims = data.claims;
        claims.kid = kid;
        self.validate_issuer_audience(&claims)?;
        Ok(claims)
    }

    fn validate_issuer_audience(&self, claims: &Claims) -> Result<()> {
        if let Some(expected_iss) = &self.opts.issuer {
            if &claims.iss != expected_iss {
                tracing::debug!(iss = %claims.iss, "issuer mismatch");
                return Err(Error::Verification(VerificationFailure::ClaimMismatch));
            }
        }

        if let Some(expected) = &self.opts.client_id {
            let audience = match claims.token_use {
                TokenUse::Id => claims.aud.as_deref(),
                TokenUse::Access => claims.client_id.as_deref(),
            };
            if audience != Some(expected.as_str()) {
                tracing::debug!(?audience, "audience mismatch");
                return Err(Error::Verification(VerificationFailure::ClaimMismatch));
            }
        }

        Ok(())
    }
}

fn classify(kind: &ErrorKind) -> VerificationFailure {
    match kind {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => VerificationFailure::Expired,
        ErrorKind::InvalidSignature => VerificationFailure::InvalidSignature,
        ErrorKind::InvalidAlgorithm => VerificationFailure::UnsupportedAlgorithm,
        ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience | ErrorKind::InvalidSubject => {
            VerificationFailure::ClaimMismatch
        }
        _ => VerificationFailure::Malformed,
    }
}
