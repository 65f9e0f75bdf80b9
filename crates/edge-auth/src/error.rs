//! Error types.

use std::fmt;

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration was rejected; every violated field is listed.
    #[error("Expected params to be valid: {0}")]
    Configuration(ConfigErrors),

    /// The request carried no `Cookie` header at all.
    #[error("Cookies weren't present in the request")]
    MissingCookies,

    /// Cookies were present but none of them is this app's idToken.
    #[error("idToken cookie isn't present in the request")]
    MissingIdToken,

    /// Token verification failed.
    #[error("token verification failed: {0}")]
    Verification(VerificationFailure),

    /// The JWKS does not contain the requested key id, even after a refetch.
    #[error("no key with kid {0:?} in the user pool JWKS")]
    KeyNotFound(String),

    /// Unable to fetch or parse the user pool JWKS.
    #[error("JWKS unavailable: {0}")]
    KeySetUnavailable(String),

    /// The authorization code could not be traded for tokens.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The inbound edge request is missing something the handler needs.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The IdP answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Http {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// An error occurred while performing HTTP requests.
    #[cfg(feature = "fetch-reqwest")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// I/O error while reading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that only mean "this caller is not signed in".
    ///
    /// The authenticator turns these into a login or logout redirect instead of
    /// surfacing them.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Error::MissingCookies
                | Error::MissingIdToken
                | Error::Verification(_)
                | Error::KeyNotFound(_)
                | Error::KeySetUnavailable(_)
        )
    }
}

/// Why a token failed verification. Only logged, never shown to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFailure {
    /// Header or payload could not be decoded.
    Malformed,
    /// Algorithm is not in the allow-list or does not match the key.
    UnsupportedAlgorithm,
    /// The key id is not published by the user pool.
    UnknownKey,
    /// The key set could not be fetched.
    KeySetUnavailable,
    /// Signature did not verify.
    InvalidSignature,
    /// `exp` is in the past.
    Expired,
    /// Issuer, audience or token use did not match.
    ClaimMismatch,
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerificationFailure::Malformed => "malformed token",
            VerificationFailure::UnsupportedAlgorithm => "unsupported algorithm",
            VerificationFailure::UnknownKey => "unknown key id",
            VerificationFailure::KeySetUnavailable => "key set unavailable",
            VerificationFailure::InvalidSignature => "invalid signature",
            VerificationFailure::Expired => "token expired",
            VerificationFailure::ClaimMismatch => "claim mismatch",
        };
        f.write_str(s)
    }
}

/// One rejected configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// Configuration key, as written in the config file.
    pub field: &'static str,
    /// What is wrong with it.
    pub problem: String,
}

/// Every violation found while validating a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigErrors(pub Vec<ConfigViolation>);

impl ConfigErrors {
    pub(crate) fn push(&mut self, field: &'static str, problem: impl Into<String>) {
        self.0.push(ConfigViolation {
            field,
            problem: problem.into(),
        });
    }

    /// True when no violation was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the violated fields, in validation order.
    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|v| v.field).collect()
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} {}", v.field, v.problem)?;
        }
        Ok(())
    }
}
