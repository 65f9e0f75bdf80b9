//! HTTP access to the identity provider.

use std::future::Future;

use serde_json::Value;

use crate::Result;

/// Basic credentials for confidential app clients.
#[derive(Debug, Clone, Copy)]
pub struct BasicAuth<'a> {
    /// App client id.
    pub username: &'a str,
    /// App client secret.
    pub password: &'a str,
}

/// The two calls the authenticator makes to the identity provider.
///
/// Implementations return the decoded JSON body of a 2xx response and an error
/// for anything else. They must not retry.
pub trait IdpClient: Send + Sync {
    /// `GET url`, expecting JSON.
    fn get_json(&self, url: &str) -> impl Future<Output = Result<Value>> + Send;

    /// `POST url` with a form-encoded body, expecting JSON.
    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        basic_auth: Option<BasicAuth<'_>>,
    ) -> impl Future<Output = Result<Value>> + Send;
}

#[cfg(feature = "fetch-reqwest")]
pub use self::reqwest_client::ReqwestIdpClient;

#[cfg(feature = "fetch-reqwest")]
mod reqwest_client {
    use std::time::Duration;

    use serde_json::Value;

    use super::{BasicAuth, IdpClient};
    use crate::{Error, Result};

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// [`IdpClient`] backed by a shared `reqwest::Client`.
    #[derive(Debug, Clone)]
    pub struct ReqwestIdpClient {
        client: reqwest::Client,
    }

    impl ReqwestIdpClient {
        /// Build a client with the default request timeout.
        pub fn new() -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?;
            Ok(Self { client })
        }

        /// Wrap an already configured `reqwest::Client`.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl IdpClient for ReqwestIdpClient {
        async fn get_json(&self, url: &str) -> Result<Value> {
            let resp = self.client.get(url).send().await?;
            if !resp.status().is_success() {
                return Err(Error::Http {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                });
            }
            Ok(resp.json().await?)
        }

        async fn post_form(
            &self,
            url: &str,
            form: &[(&str, &str)],
            basic_auth: Option<BasicAuth<'_>>,
        ) -> Result<Value> {
            let mut req = self.client.post(url).form(form);
            if let Some(auth) = basic_auth {
                req = req.basic_auth(auth.username, Some(auth.password));
            }

            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(Error::Http {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                });
            }
            Ok(resp.json().await?)
        }
    }
}
