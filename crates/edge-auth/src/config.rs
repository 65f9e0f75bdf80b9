//! Authenticator configuration.
//!
//! All fields are validated in one pass by [`AuthConfig::from_value`]; a rejected
//! configuration reports every bad field at once and never yields a partial value.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::cookie::{CookieSettings, SameSite};
use crate::error::{ConfigErrors, Error, Result};

/// Default session cookie lifetime.
pub const DEFAULT_COOKIE_EXPIRATION_DAYS: u64 = 365;

/// Longest accepted session cookie lifetime, one hundred years.
pub const MAX_COOKIE_EXPIRATION_DAYS: u64 = 36_500;

/// Default path that triggers the logout flow.
pub const DEFAULT_LOGOUT_PATH: &str = "/logout";

/// Validated authenticator configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    region: String,
    user_pool_id: String,
    user_pool_app_id: String,
    user_pool_app_secret: Option<String>,
    user_pool_domain: String,
    cookie_expiration_days: u64,
    disable_cookie_domain: bool,
    http_only: bool,
    same_site: Option<SameSite>,
    enable_logout: bool,
    logout_path: String,
    log_level: String,
}

impl AuthConfig {
    /// Validate a configuration object with snake_case keys.
    pub fn from_value(params: &Value) -> Result<Self> {
        let mut errs = ConfigErrors::default();

        let Some(obj) = params.as_object() else {
            errs.push("params", "must be an object");
            return Err(Error::Configuration(errs));
        };

        let region = required_str(obj, "region", &mut errs, is_region);
        let user_pool_id = required_str(obj, "user_pool_id", &mut errs, is_user_pool_id);
        let user_pool_app_id =
            required_str(obj, "user_pool_app_id", &mut errs, is_app_client_id);
        let user_pool_domain =
            required_str(obj, "user_pool_domain", &mut errs, is_hosted_domain);
        let user_pool_app_secret = optional_str(obj, "user_pool_app_secret", &mut errs);

        let cookie_expiration_days = match obj.get("cookie_expiration_days") {
            None | Some(Value::Null) => Some(DEFAULT_COOKIE_EXPIRATION_DAYS),
            Some(v) => match v.as_u64() {
                Some(days) if (1..=MAX_COOKIE_EXPIRATION_DAYS).contains(&days) => Some(days),
                _ => {
                    errs.push(
                        "cookie_expiration_days",
                        format!("must be an integer between 1 and {MAX_COOKIE_EXPIRATION_DAYS}"),
                    );
                    None
                }
            },
        };

        let disable_cookie_domain = optional_bool(obj, "disable_cookie_domain", &mut errs);
        let http_only = optional_bool(obj, "http_only", &mut errs);
        let enable_logout = optional_bool(obj, "enable_logout", &mut errs);

        let same_site = match obj.get("same_site") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => match s.parse::<SameSite>() {
                Ok(policy) => Some(policy),
                Err(()) => {
                    errs.push("same_site", "must be one of Lax, Strict, None");
                    None
                }
            },
            Some(_) => {
                errs.push("same_site", "must be one of Lax, Strict, None");
                None
            }
        };

        let logout_path = match optional_str(obj, "logout_path", &mut errs) {
            Some(p) if !p.starts_with('/') => {
                errs.push("logout_path", "must start with '/'");
                None
            }
            other => other,
        };

        let log_level = optional_str(obj, "log_level", &mut errs);

        if !errs.is_empty() {
            return Err(Error::Configuration(errs));
        }

        // Every required value is Some once no violation was recorded.
        match (
            region,
            user_pool_id,
            user_pool_app_id,
            user_pool_domain,
            cookie_expiration_days,
        ) {
            (
                Some(region),
                Some(user_pool_id),
                Some(user_pool_app_id),
                Some(user_pool_domain),
                Some(cookie_expiration_days),
            ) => Ok(Self {
                region,
                user_pool_id,
                user_pool_app_id,
                user_pool_app_secret,
                user_pool_domain,
                cookie_expiration_days,
                disable_cookie_domain: disable_cookie_domain.unwrap_or(false),
                http_only: http_only.unwrap_or(false),
                same_site,
                enable_logout: enable_logout.unwrap_or(false),
                logout_path: logout_path.unwrap_or_else(|| DEFAULT_LOGOUT_PATH.to_string()),
                log_level: log_level.unwrap_or_else(|| "info".to_string()),
            }),
            _ => Err(Error::Configuration(errs)),
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_value(&value)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let value: Value = toml::from_str(s)?;
        Self::from_value(&value)
    }

    /// Load a configuration file. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// AWS region of the user pool.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// User pool id, e.g. `us-east-1_abcdef123`.
    pub fn user_pool_id(&self) -> &str {
        &self.user_pool_id
    }

    /// App client id.
    pub fn user_pool_app_id(&self) -> &str {
        &self.user_pool_app_id
    }

    /// App client secret, for confidential clients.
    pub fn user_pool_app_secret(&self) -> Option<&str> {
        self.user_pool_app_secret.as_deref()
    }

    /// Hosted UI domain, without scheme.
    pub fn user_pool_domain(&self) -> &str {
        &self.user_pool_domain
    }

    /// Session cookie lifetime in days.
    pub fn cookie_expiration_days(&self) -> u64 {
        self.cookie_expiration_days
    }

    /// Whether `Domain=` is left out of session cookies.
    pub fn disable_cookie_domain(&self) -> bool {
        self.disable_cookie_domain
    }

    /// Whether session cookies are `HttpOnly`.
    pub fn http_only(&self) -> bool {
        self.http_only
    }

    /// SameSite policy for session cookies.
    pub fn same_site(&self) -> Option<SameSite> {
        self.same_site
    }

    /// Whether requests to [`logout_path`](Self::logout_path) sign the user out.
    pub fn enable_logout(&self) -> bool {
        self.enable_logout
    }

    /// Path handled as logout.
    pub fn logout_path(&self) -> &str {
        &self.logout_path
    }

    /// Log filter directive for the process subscriber.
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Token issuer for this user pool.
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    /// Well-known JWKS endpoint for this user pool.
    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer())
    }

    /// Hosted UI token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!("https://{}/oauth2/token", self.user_pool_domain)
    }

    /// Cookie settings derived from this configuration.
    pub fn cookie_settings(&self) -> CookieSettings {
        CookieSettings {
            app_client_id: self.user_pool_app_id.clone(),
            expiration_days: self.cookie_expiration_days,
            disable_domain: self.disable_cookie_domain,
            http_only: self.http_only,
            same_site: self.same_site,
        }
    }
}

fn required_str(
    obj: &Map<String, Value>,
    field: &'static str,
    errs: &mut ConfigErrors,
    shape: fn(&str) -> bool,
) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            errs.push(field, "is required");
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errs.push(field, "must not be empty");
            None
        }
        Some(Value::String(s)) if !shape(s) => {
            errs.push(field, format!("has an unexpected format: {s:?}"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errs.push(field, "must be a string");
            None
        }
    }
}

fn optional_str(
    obj: &Map<String, Value>,
    field: &'static str,
    errs: &mut ConfigErrors,
) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            errs.push(field, "must not be empty");
            None
        }
        Some(_) => {
            errs.push(field, "must be a string");
            None
        }
    }
}

fn optional_bool(
    obj: &Map<String, Value>,
    field: &'static str,
    errs: &mut ConfigErrors,
) -> Option<bool> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => {
            errs.push(field, "must be a boolean");
            None
        }
    }
}

// e.g. us-east-1, us-gov-west-1, ap-southeast-2
fn is_region(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() >= 3
        && parts
            .iter()
            .take(parts.len() - 1)
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
        && parts
            .last()
            .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_user_pool_id(s: &str) -> bool {
    match s.split_once('_') {
        Some((region, id)) => is_region(region) && !id.is_empty() && id.chars().all(char::is_alphanumeric),
        None => false,
    }
}

fn is_app_client_id(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_hosted_domain(s: &str) -> bool {
    !s.contains("://")
        && !s.contains('/')
        && !s.chars().any(char::is_whitespace)
        && s.contains('.')
}
