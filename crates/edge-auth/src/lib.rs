//! edge-auth
//!
//! Cognito hosted-UI authentication for a CDN viewer-request hook.
//! For every request it decides whether the caller holds a valid session and
//! either forwards the request, redirects to the hosted login or logout page,
//! or completes an authorization-code exchange and sets the session cookies.
//!
//! - **Verifying id tokens** against the user pool JWKS (cached per kid, fetched on miss)
//! - **Reading and writing session cookies** named the way Cognito's client libraries name them
//! - **Exchanging authorization codes** at the hosted UI token endpoint
//!
//! The entry point is [`Authenticator`], generic over the [`IdpClient`] used to
//! reach the identity provider.
//!
//! ## Quick start
//! ```no_run
//! use edge_auth::{AuthConfig, Authenticator, CloudFrontEvent, ReqwestIdpClient};
//!
//! # async fn demo(event: CloudFrontEvent) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::from_toml_str(r#"
//!     region = "us-east-1"
//!     user_pool_id = "us-east-1_abcdef123"
//!     user_pool_app_id = "123456789qwertyuiop987abcd"
//!     user_pool_domain = "my-cognito-domain.auth.us-east-1.amazoncognito.com"
//!     enable_logout = true
//! "#)?;
//! let authenticator = Authenticator::new(config, ReqwestIdpClient::new()?);
//!
//! let outcome = authenticator.handle_event(event).await?;
//! println!("{}", serde_json::to_string(&outcome)?);
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod authenticator;
mod client;
mod config;
mod cookie;
mod edge;
mod error;
mod exchange;
mod jwks;
mod jwt;

pub use authenticator::{Authenticator, Decision, SessionState, decide};
#[cfg(feature = "fetch-reqwest")]
pub use client::ReqwestIdpClient;
pub use client::{BasicAuth, IdpClient};
pub use config::{
    AuthConfig, DEFAULT_COOKIE_EXPIRATION_DAYS, DEFAULT_LOGOUT_PATH, MAX_COOKIE_EXPIRATION_DAYS,
};
pub use cookie::{
    COOKIE_PREFIX, CookieSettings, IdTokenCookie, SameSite, TOKEN_SCOPES,
    build_expired_session_cookies, build_session_cookies, extract_id_token, find_id_token_cookie,
    format_set_cookie, parse_cookie_header,
};
pub use edge::{
    CfPayload, CloudFrontEvent, EdgeRequest, EdgeResponse, EventRecord, HandlerOutcome,
    HeaderEntry, Headers,
};
pub use error::{ConfigErrors, ConfigViolation, Error, Result, VerificationFailure};
pub use exchange::{TokenExchangeClient, TokenSet};
pub use jwks::{CachedKey, Jwk, JwksSet, KeySetCache};
pub use jwt::{Claims, JwtVerifier, TokenUse, VerifyOptions};
