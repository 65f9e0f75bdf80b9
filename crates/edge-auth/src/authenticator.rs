//! Request disposition: forward, log in, log out, or finish a code exchange.
//!
//! [`decide`] is a pure function of the session check and the request line;
//! [`Authenticator::handle`] runs the session check, asks [`decide`], and only
//! then performs the token exchange or builds cookies.

use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;

use crate::client::IdpClient;
use crate::config::AuthConfig;
use crate::cookie::{
    CookieSettings, IdTokenCookie, build_expired_session_cookies, build_session_cookies,
    find_id_token_cookie,
};
use crate::edge::{CloudFrontEvent, EdgeRequest, EdgeResponse, HandlerOutcome};
use crate::error::VerificationFailure;
use crate::exchange::TokenExchangeClient;
use crate::jwks::KeySetCache;
use crate::jwt::{Claims, JwtVerifier, TokenUse, VerifyOptions};
use crate::{Error, Result};

/// Outcome of checking the request's session cookies.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// A verified id token was presented.
    Authenticated {
        /// Verified claims.
        claims: Box<Claims>,
        /// The cookie carrying the token.
        cookie: IdTokenCookie,
    },
    /// No usable session. `cookie` is set when an idToken cookie was present
    /// but did not verify.
    Unauthenticated {
        /// The rejected cookie, if any.
        cookie: Option<IdTokenCookie>,
    },
}

impl SessionState {
    /// Best-known username: verified claims first, then the cookie name.
    pub fn username(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { claims, cookie } => {
                claims.user_name().or(Some(cookie.username.as_str()))
            }
            SessionState::Unauthenticated { cookie } => cookie.as_ref().map(|c| c.username.as_str()),
        }
    }

    fn id_token(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { cookie, .. } => Some(cookie.value.as_str()),
            SessionState::Unauthenticated { cookie } => cookie.as_ref().map(|c| c.value.as_str()),
        }
    }
}

/// What to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Pass the request through.
    Forward,
    /// Clear the session and send the viewer to the hosted logout page.
    RedirectLogout {
        /// Whose cookies to clear; `None` sends the viewer to the bare host.
        username: Option<String>,
        /// Id token presented by the request, echoed into the expired cookie.
        id_token: Option<String>,
    },
    /// Exchange `code` for tokens, then send the viewer to `state`.
    RedirectAfterExchange {
        /// Authorization code.
        code: String,
        /// Decoded path to land on.
        state: String,
    },
    /// Send the viewer to the hosted login page.
    RedirectLogin,
}

impl Decision {
    /// Short name for logs; never includes codes or tokens.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Forward => "forward",
            Decision::RedirectLogout { .. } => "redirect_logout",
            Decision::RedirectAfterExchange { .. } => "redirect_after_exchange",
            Decision::RedirectLogin => "redirect_login",
        }
    }
}

/// Pick the disposition of a request.
///
/// Priority: logout (when enabled) beats forwarding, so a signed-in user can
/// always sign out; then forward; then code exchange; then login.
pub fn decide(session: &SessionState, uri: &str, querystring: &str, config: &AuthConfig) -> Decision {
    if config.enable_logout() && uri == config.logout_path() {
        return Decision::RedirectLogout {
            username: session.username().map(str::to_string),
            id_token: session.id_token().map(str::to_string),
        };
    }

    if matches!(session, SessionState::Authenticated { .. }) {
        return Decision::Forward;
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url::form_urlencoded::parse(querystring.trim_start_matches('?').as_bytes()) {
        match key.as_ref() {
            "code" if code.is_none() && !value.is_empty() => code = Some(value.into_owned()),
            "state" if state.is_none() => state = Some(value.into_owned()),
            _ => {}
        }
    }

    match code {
        Some(code) => Decision::RedirectAfterExchange {
            code,
            state: landing_path(state.as_deref()),
        },
        None => Decision::RedirectLogin,
    }
}

// Only same-origin paths are followed after login.
fn landing_path(state: Option<&str>) -> String {
    match state {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\") => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

/// The edge authenticator for one user pool app client.
pub struct Authenticator<C> {
    config: AuthConfig,
    cookie_settings: CookieSettings,
    verifier: JwtVerifier<C>,
    exchange: TokenExchangeClient<C>,
}

impl<C: IdpClient> Authenticator<C> {
    /// Build an authenticator; the key cache starts empty.
    pub fn new(config: AuthConfig, client: C) -> Self {
        Self::with_client(config, Arc::new(client))
    }

    /// Like [`new`](Self::new), sharing an existing client.
    pub fn with_client(config: AuthConfig, client: Arc<C>) -> Self {
        let keys = Arc::new(KeySetCache::new(client.clone(), config.jwks_url()));
        let verifier = JwtVerifier::new(
            keys,
            VerifyOptions {
                issuer: Some(config.issuer()),
                client_id: Some(config.user_pool_app_id().to_string()),
                ..VerifyOptions::default()
            },
        );
        let exchange = TokenExchangeClient::new(
            client,
            config.token_endpoint(),
            config.user_pool_app_id(),
            config.user_pool_app_secret().map(str::to_string),
        );

        Self {
            cookie_settings: config.cookie_settings(),
            config,
            verifier,
            exchange,
        }
    }

    /// Validate `params` and build an authenticator.
    pub fn from_value(params: &Value, client: C) -> Result<Self> {
        Ok(Self::new(AuthConfig::from_value(params)?, client))
    }

    /// The validated configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The token verifier, e.g. to pre-load keys with `key_cache().cache_jwks`.
    pub fn verifier(&self) -> &JwtVerifier<C> {
        &self.verifier
    }

    /// Handle a Lambda@Edge viewer-request event.
    pub async fn handle_event(&self, event: CloudFrontEvent) -> Result<HandlerOutcome> {
        self.handle(event.into_request()?).await
    }

    /// Handle one viewer request.
    ///
    /// Authentication failures become redirects. Only a failed code exchange
    /// or a malformed request is returned as an error.
    pub async fn handle(&self, request: EdgeRequest) -> Result<HandlerOutcome> {
        let session = self.check_session(&request).await;
        let decision = decide(&session, &request.uri, request.querystring(), &self.config);
        tracing::debug!(uri = %request.uri, decision = decision.label(), "request decision");

        let response = match decision {
            Decision::Forward => return Ok(HandlerOutcome::Forward(request)),
            Decision::RedirectLogout { username, id_token } => {
                let host = request.host()?;
                match username {
                    Some(username) => {
                        tracing::info!(%username, "logging out");
                        EdgeResponse::redirect(self.logout_url(host)).with_cookies(
                            build_expired_session_cookies(
                                id_token.as_deref(),
                                &username,
                                host,
                                &self.cookie_settings,
                            ),
                        )
                    }
                    None => EdgeResponse::redirect(host),
                }
            }
            Decision::RedirectAfterExchange { code, state } => {
                let host = request.host()?;
                let redirect_uri = format!("https://{host}");
                let tokens = self.exchange.exchange(&redirect_uri, &code).await?;
                let claims = self.verifier.verify(&tokens.id_token).await?;
                if claims.token_use != TokenUse::Id {
                    return Err(Error::Verification(VerificationFailure::ClaimMismatch));
                }
                let username = claims
                    .user_name()
                    .ok_or(Error::Verification(VerificationFailure::ClaimMismatch))?;
                tracing::info!(%username, "session established");

                EdgeResponse::redirect(state).with_cookies(build_session_cookies(
                    &tokens,
                    username,
                    host,
                    &self.cookie_settings,
                    SystemTime::now(),
                ))
            }
            Decision::RedirectLogin => {
                let host = request.host()?;
                EdgeResponse::redirect(self.authorize_url(host, &request.uri, request.querystring()))
            }
        };

        Ok(HandlerOutcome::Respond(response))
    }

    /// Hosted UI login URL that returns the viewer to `uri?querystring`.
    pub fn authorize_url(&self, host: &str, uri: &str, querystring: &str) -> String {
        let mut state = uri.to_string();
        if !querystring.is_empty() {
            state.push_str(&urlencoding::encode(&format!("?{querystring}")));
        }
        format!(
            "https://{}/authorize?redirect_uri=https://{host}&response_type=code&client_id={}&state={state}",
            self.config.user_pool_domain(),
            self.config.user_pool_app_id(),
        )
    }

    /// Hosted UI logout URL that returns the viewer to `host`.
    pub fn logout_url(&self, host: &str) -> String {
        format!(
            "https://{}/logout?logout_uri=https://{host}&client_id={}",
            self.config.user_pool_domain(),
            self.config.user_pool_app_id(),
        )
    }

    async fn check_session(&self, request: &EdgeRequest) -> SessionState {
        let cookie = match find_id_token_cookie(request.header_values("cookie"), &self.cookie_settings) {
            Ok(cookie) => cookie,
            Err(e) => {
                tracing::debug!(reason = %e, "no session cookie");
                return SessionState::Unauthenticated { cookie: None };
            }
        };

        match self.verifier.verify(&cookie.value).await {
            Ok(claims) if claims.token_use == TokenUse::Id => SessionState::Authenticated {
                claims: Box::new(claims),
                cookie,
            },
            Ok(_) => {
                tracing::debug!("session cookie holds a non-id token");
                SessionState::Unauthenticated { cookie: Some(cookie) }
            }
            Err(e) => {
                if e.is_unauthenticated() {
                    tracing::debug!(reason = %e, "session cookie rejected");
                } else {
                    tracing::warn!(error = %e, "session check failed");
                }
                SessionState::Unauthenticated { cookie: Some(cookie) }
            }
        }
    }
}
