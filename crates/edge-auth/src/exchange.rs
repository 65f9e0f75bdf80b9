//! Authorization-code exchange against the hosted UI token endpoint.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::{BasicAuth, IdpClient};
use crate::{Error, Result};

/// Tokens returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenSet {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Id token.
    pub id_token: String,
    /// Usually `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Granted scopes, when the endpoint reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Trades authorization codes for tokens. Never retries.
pub struct TokenExchangeClient<C> {
    client: Arc<C>,
    token_endpoint: String,
    client_id: String,
    client_secret: Option<String>,
}

impl<C: IdpClient> TokenExchangeClient<C> {
    /// Client for `token_endpoint`, authenticating as `client_id`.
    pub fn new(
        client: Arc<C>,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// `POST grant_type=authorization_code` and decode the token set.
    pub async fn exchange(&self, redirect_uri: &str, code: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        let basic_auth = self.client_secret.as_deref().map(|secret| BasicAuth {
            username: &self.client_id,
            password: secret,
        });

        let body = self
            .client
            .post_form(&self.token_endpoint, &form, basic_auth)
            .await
            .map_err(|e| Error::TokenExchange(e.to_string()))?;

        serde_json::from_value(body)
            .map_err(|e| Error::TokenExchange(format!("unexpected token response: {e}")))
    }
}
