#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use edge_auth::{AuthConfig, BasicAuth, EdgeRequest, Error, IdpClient, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const ROTATED_KEY_PEM: &str = include_str!("../fixtures/rotated_key.pem");

pub const SIGNING_KID: &str = "1234example=";
pub const ROTATED_KID: &str = "5678example=";

const SIGNING_N: &str = "wsO5rqxMEmeSY-I35D6fQ8ZoYa1dPsur6OSf8I_GNSf5N46rBq94PwG9Bd_QpY1RJvEG87nGBcZwj7PDyxqGBtKXS0kY2Ln1GqTo_JXd6JT7lnhJCcLb92e5YplVC6TgQCh09glx0r5lCp7oz-HWVX0YcGlDnHm24NUIVGDhDYggB-Zl9XuTKc33sLuhnR3ASDBoNpsPTjo0FwBVxBA9szKM3Ajl0STJQbx9codjcMAB4sqgWLoGrt1mpRxfE2aXDyv9ZiZuykb24l0TYm5BBR_VZUUSJaRQimJt8g2uH1MXd-Tw3OtUOUVe16jiHGNE-jiA05T9Gknr3Aqqs291hw";
const ROTATED_N: &str = "o-tcuLCEx80VrixnBxmMaQ2fkhR4pYMjoECXo-TL8FmxBnP9L3NCg0uL2J65ruJLJILyJuB9zK4XZls59cD3NQE6n_qv-XVPcgrVAlRo6qawOIc5wyrbvim7Fi20QNSNhzEdcD8LhpdlpkrryA6tC3HYHhf86aRHNCwFSHEWFx-_knigNAWnONnpp2A_gmdExFCoqDrULGbABdjtpalWXUrXewu6OueVFOG0pfgAlipfcJNY7BlUvV3Kfpm3ipgENloalSsczqP9ftr0azdjVfFoB8eU83Wu_lKBwnSHYAOKLIZmdQLUd9OONHkuNwNOCd0u0w01VlgKjsSK1mYfRw";

pub const REGION: &str = "us-east-1";
pub const USER_POOL_ID: &str = "us-east-1_abcdef123";
pub const APP_ID: &str = "123456789qwertyuiop987abcd";
pub const DOMAIN: &str = "my-cognito-domain.auth.us-east-1.amazoncognito.com";
pub const HOST: &str = "d111111abcdef8.cloudfront.net";

pub fn issuer() -> String {
    format!("https://cognito-idp.{REGION}.amazonaws.com/{USER_POOL_ID}")
}

pub fn params(app_id: &str) -> Value {
    json!({
        "region": REGION,
        "user_pool_id": USER_POOL_ID,
        "user_pool_app_id": app_id,
        "user_pool_domain": DOMAIN,
        "cookie_expiration_days": 365,
        "enable_logout": true,
    })
}

pub fn config() -> AuthConfig {
    AuthConfig::from_value(&params(APP_ID)).expect("valid config")
}

pub fn jwk(kid: &str, n: &str) -> Value {
    json!({ "kid": kid, "alg": "RS256", "kty": "RSA", "e": "AQAB", "n": n, "use": "sig" })
}

pub fn jwks_with_signing_key() -> Value {
    json!({ "keys": [jwk(SIGNING_KID, SIGNING_N)] })
}

pub fn jwks_with_both_keys() -> Value {
    json!({ "keys": [jwk(SIGNING_KID, SIGNING_N), jwk(ROTATED_KID, ROTATED_N)] })
}

pub fn now_secs() -> i64 {
    i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs(),
    )
    .expect("seconds fit in i64")
}

/// Claims of a fresh id token for `username` issued to `app_id`.
pub fn id_claims(username: &str, app_id: &str) -> Value {
    let now = now_secs();
    json!({
        "sub": "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
        "aud": app_id,
        "token_use": "id",
        "auth_time": now,
        "iss": issuer(),
        "cognito:username": username,
        "exp": now + 300,
        "iat": now,
        "email": format!("{username}@example.com"),
    })
}

pub fn sign(claims: &Value, kid: &str, pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key"),
    )
    .expect("token")
}

pub fn id_token(username: &str) -> String {
    sign(&id_claims(username, APP_ID), SIGNING_KID, SIGNING_KEY_PEM)
}

/// Recorded token endpoint call.
#[derive(Debug, Clone)]
pub struct PostCall {
    pub url: String,
    pub form: Vec<(String, String)>,
}

/// In-memory identity provider.
pub struct FakeIdp {
    pub jwks: Mutex<Option<Value>>,
    pub token_response: Mutex<Option<Value>>,
    pub jwks_fetches: AtomicUsize,
    pub posts: Mutex<Vec<PostCall>>,
}

impl FakeIdp {
    pub fn new(jwks: Option<Value>) -> Self {
        Self {
            jwks: Mutex::new(jwks),
            token_response: Mutex::new(None),
            jwks_fetches: AtomicUsize::new(0),
            posts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_token_response(self, body: Value) -> Self {
        *self.token_response.lock().unwrap() = Some(body);
        self
    }

    pub fn fetches(&self) -> usize {
        self.jwks_fetches.load(Ordering::SeqCst)
    }
}

impl IdpClient for FakeIdp {
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.jwks_fetches.fetch_add(1, Ordering::SeqCst);
        assert!(url.ends_with("/.well-known/jwks.json"), "unexpected GET {url}");
        self.jwks.lock().unwrap().clone().ok_or(Error::Http {
            url: url.to_string(),
            status: 500,
        })
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        _basic_auth: Option<BasicAuth<'_>>,
    ) -> Result<Value> {
        self.posts.lock().unwrap().push(PostCall {
            url: url.to_string(),
            form: form
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        });
        self.token_response.lock().unwrap().clone().ok_or(Error::Http {
            url: url.to_string(),
            status: 400,
        })
    }
}

/// A viewer request for `uri?querystring` carrying `cookies` as one header entry.
pub fn request(uri: &str, querystring: &str, cookies: Option<&str>) -> EdgeRequest {
    let mut headers = json!({
        "host": [{ "key": "Host", "value": HOST }],
        "user-agent": [{ "key": "User-Agent", "value": "curl/7.51.0" }],
    });
    if let Some(cookies) = cookies {
        headers["cookie"] = json!([{ "key": "cookie", "value": cookies }]);
    }
    serde_json::from_value(json!({
        "clientIp": "2001:0db8:85a3:0:0:8a2e:0370:7334",
        "querystring": querystring,
        "uri": uri,
        "method": "GET",
        "headers": headers,
        "origin": {
            "custom": {
                "domainName": "example.com",
                "path": "/custom_path",
                "port": 443,
                "protocol": "https"
            }
        }
    }))
    .expect("request")
}

pub fn id_token_cookie(app_id: &str, username: &str, token: &str) -> String {
    format!("CognitoIdentityServiceProvider.{app_id}.{username}.idToken={token}")
}
