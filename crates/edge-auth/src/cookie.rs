//! Session cookie helpers.
//!
//! A session is five cookies named the way the Cognito client libraries name
//! them, so a browser app using those libraries sees the same session:
//!
//! ```text
//! CognitoIdentityServiceProvider.<appClientId>.<username>.accessToken
//! CognitoIdentityServiceProvider.<appClientId>.<username>.idToken
//! CognitoIdentityServiceProvider.<appClientId>.<username>.refreshToken
//! CognitoIdentityServiceProvider.<appClientId>.<username>.tokenScopesString
//! CognitoIdentityServiceProvider.<appClientId>.LastAuthUser
//! ```

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use httpdate::fmt_http_date;

use crate::exchange::TokenSet;
use crate::{Error, Result};

/// Prefix shared by every session cookie.
pub const COOKIE_PREFIX: &str = "CognitoIdentityServiceProvider";

/// Value of the `tokenScopesString` cookie, already URL-encoded.
pub const TOKEN_SCOPES: &str = "phone%20email%20profile%20openid%20aws.cognito.signin.user.admin";

const EXPIRED_PLACEHOLDER: &str = "0";

const SECONDS_PER_DAY: u64 = 86_400;

// 9999-12-31T23:59:59Z, the last instant an HTTP date can express.
const LATEST_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// SameSite=Strict
    Strict,
    /// SameSite=Lax
    Lax,
    /// SameSite=None
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "Strict" => Ok(SameSite::Strict),
            "Lax" => Ok(SameSite::Lax),
            "None" => Ok(SameSite::None),
            _ => Err(()),
        }
    }
}

/// Options used to build session cookies.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// App client id embedded in every cookie name.
    pub app_client_id: String,

    /// Lifetime of a freshly issued session.
    pub expiration_days: u64,

    /// Leave out the `Domain=` attribute.
    pub disable_domain: bool,

    /// Not accessible to JS.
    pub http_only: bool,

    /// SameSite attribute, omitted when unset.
    pub same_site: Option<SameSite>,
}

/// The idToken cookie found in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTokenCookie {
    /// Username segment of the cookie name.
    pub username: String,
    /// Raw cookie value (the id token).
    pub value: String,
}

/// Split one `Cookie` header value into `(name, value)` pairs, in order.
pub fn parse_cookie_header(header: &str) -> Vec<(&str, &str)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name, value.trim()))
        })
        .collect()
}

/// Find this app's idToken cookie across every `Cookie` header entry.
///
/// `cookie_headers` is `None` when the request carries no `Cookie` header at all.
/// Cookies of other app clients sharing the prefix are ignored.
pub fn find_id_token_cookie<'a, I>(
    cookie_headers: Option<I>,
    settings: &CookieSettings,
) -> Result<IdTokenCookie>
where
    I: IntoIterator<Item = &'a str>,
{
    let headers = cookie_headers.ok_or(Error::MissingCookies)?;
    let app_prefix = format!("{COOKIE_PREFIX}.{}.", settings.app_client_id);

    headers
        .into_iter()
        .flat_map(parse_cookie_header)
        .find_map(|(name, value)| {
            let username = name.strip_prefix(&app_prefix)?.strip_suffix(".idToken")?;
            if username.is_empty() {
                return None;
            }
            Some(IdTokenCookie {
                username: username.to_string(),
                value: value.to_string(),
            })
        })
        .ok_or(Error::MissingIdToken)
}

/// Like [`find_id_token_cookie`], returning only the token.
pub fn extract_id_token<'a, I>(cookie_headers: Option<I>, settings: &CookieSettings) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    find_id_token_cookie(cookie_headers, settings).map(|c| c.value)
}

/// Build one `Set-Cookie` header value.
///
/// Attribute order is fixed: `Domain`, `Expires`, `Secure`, `HttpOnly`, `SameSite`.
pub fn format_set_cookie(
    name: &str,
    value: &str,
    domain: &str,
    expires: SystemTime,
    settings: &CookieSettings,
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(6);
    parts.push(format!("{name}={value}"));

    if !settings.disable_domain {
        parts.push(format!("Domain={domain}"));
    }

    parts.push(format!("Expires={}", fmt_http_date(expires)));
    parts.push("Secure".to_string());

    if settings.http_only {
        parts.push("HttpOnly".to_string());
    }
    if let Some(same_site) = settings.same_site {
        parts.push(format!("SameSite={}", same_site.as_str()));
    }

    parts.join("; ")
}

/// Build the five `Set-Cookie` values that establish a session for `username`.
pub fn build_session_cookies(
    tokens: &TokenSet,
    username: &str,
    domain: &str,
    settings: &CookieSettings,
    now: SystemTime,
) -> Vec<String> {
    let expires = session_expiry(now, settings.expiration_days);
    session_cookie_values(
        &settings.app_client_id,
        &tokens.access_token,
        &tokens.id_token,
        &tokens.refresh_token,
        username,
    )
    .into_iter()
    .map(|(name, value)| format_set_cookie(&name, value, domain, expires, settings))
    .collect()
}

/// `now + days`, clamped to the latest date an `Expires` attribute can carry.
fn session_expiry(now: SystemTime, days: u64) -> SystemTime {
    let latest = UNIX_EPOCH + Duration::from_secs(LATEST_HTTP_DATE_SECS);
    days.checked_mul(SECONDS_PER_DAY)
        .and_then(|secs| now.checked_add(Duration::from_secs(secs)))
        .map_or(latest, |expires| expires.min(latest))
}

/// Build the five `Set-Cookie` values that clear the session of `username`.
///
/// Every cookie expires at the Unix epoch. Access and refresh tokens are
/// replaced with `0`; the id token keeps the value the request presented.
pub fn build_expired_session_cookies(
    id_token: Option<&str>,
    username: &str,
    domain: &str,
    settings: &CookieSettings,
) -> Vec<String> {
    session_cookie_values(
        &settings.app_client_id,
        EXPIRED_PLACEHOLDER,
        id_token.unwrap_or(EXPIRED_PLACEHOLDER),
        EXPIRED_PLACEHOLDER,
        username,
    )
    .into_iter()
    .map(|(name, value)| format_set_cookie(&name, value, domain, UNIX_EPOCH, settings))
    .collect()
}

fn session_cookie_values<'a>(
    app_client_id: &str,
    access_token: &'a str,
    id_token: &'a str,
    refresh_token: &'a str,
    username: &'a str,
) -> [(String, &'a str); 5] {
    let user_prefix = format!("{COOKIE_PREFIX}.{app_client_id}.{username}");
    [
        (format!("{user_prefix}.accessToken"), access_token),
        (format!("{user_prefix}.idToken"), id_token),
        (format!("{user_prefix}.refreshToken"), refresh_token),
        (format!("{user_prefix}.tokenScopesString"), TOKEN_SCOPES),
        (format!("{COOKIE_PREFIX}.{app_client_id}.LastAuthUser"), username),
    ]
}
