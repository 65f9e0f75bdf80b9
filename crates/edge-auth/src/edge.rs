//! CloudFront viewer-request envelope.
//!
//! Only the fields the authenticator reads are typed; everything else is kept
//! verbatim so a forwarded request serializes back unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Headers keyed by lowercase name, each with one or more entries.
pub type Headers = BTreeMap<String, Vec<HeaderEntry>>;

/// One header entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeaderEntry {
    /// Header name as sent, when the entry carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Header value.
    pub value: String,
}

impl HeaderEntry {
    /// Entry with the given display name and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
        }
    }
}

/// Lambda@Edge event: `{ "Records": [ { "cf": { "request": ... } } ] }`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudFrontEvent {
    /// Event records; viewer-request events carry exactly one.
    #[serde(rename = "Records")]
    pub records: Vec<EventRecord>,
}

impl CloudFrontEvent {
    /// Take the request out of the first record.
    pub fn into_request(self) -> Result<EdgeRequest> {
        self.records
            .into_iter()
            .next()
            .map(|r| r.cf.request)
            .ok_or_else(|| Error::InvalidRequest("event has no records".to_string()))
    }
}

/// One event record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventRecord {
    /// CloudFront payload.
    pub cf: CfPayload,
}

/// CloudFront payload of a record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CfPayload {
    /// Distribution config, passed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// The viewer request.
    pub request: EdgeRequest,
}

/// A viewer request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EdgeRequest {
    /// Path, e.g. `/dashboard`.
    pub uri: String,

    /// Raw query string without the leading `?`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub querystring: Option<String>,

    /// HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,

    /// Untouched fields (`body`, `clientIp`, `origin`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EdgeRequest {
    /// The query string, empty when absent.
    pub fn querystring(&self) -> &str {
        self.querystring.as_deref().unwrap_or_default()
    }

    /// The HTTP method, empty when absent.
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or_default()
    }

    /// Values of every entry of header `name` (lowercase), or `None` if absent.
    pub fn header_values(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        self.headers
            .as_ref()?
            .get(name)
            .map(|entries| entries.iter().map(|e| e.value.as_str()))
    }

    /// Value of the first `Host` entry.
    pub fn host(&self) -> Result<&str> {
        self.headers
            .as_ref()
            .and_then(|headers| headers.get("host"))
            .and_then(|entries| entries.first())
            .map(|e| e.value.as_str())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidRequest("missing Host header".to_string()))
    }
}

/// A generated response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EdgeResponse {
    /// Status code as a string, as CloudFront expects.
    pub status: String,
    /// Response headers.
    pub headers: Headers,
}

impl EdgeResponse {
    /// `302 Found` to `location`, with caching disabled.
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert("location".to_string(), vec![HeaderEntry::new("Location", location)]);
        headers.insert(
            "cache-control".to_string(),
            vec![HeaderEntry::new(
                "Cache-Control",
                "no-cache, no-store, max-age=0, must-revalidate",
            )],
        );
        headers.insert("pragma".to_string(), vec![HeaderEntry::new("Pragma", "no-cache")]);
        Self {
            status: "302".to_string(),
            headers,
        }
    }

    /// Attach `Set-Cookie` entries.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<String>) -> Self {
        if !cookies.is_empty() {
            let entries = cookies
                .into_iter()
                .map(|c| HeaderEntry::new("Set-Cookie", c))
                .collect();
            self.headers.insert("set-cookie".to_string(), entries);
        }
        self
    }

    /// The `Location` header value.
    pub fn location(&self) -> Option<&str> {
        self.first_header("location")
    }

    /// Every `Set-Cookie` value, in order.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .get("set-cookie")
            .map(|entries| entries.iter().map(|e| e.value.as_str()).collect())
            .unwrap_or_default()
    }

    fn first_header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|entries| entries.first())
            .map(|e| e.value.as_str())
    }
}

/// What the edge should do with the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HandlerOutcome {
    /// Pass the request to the origin unchanged.
    Forward(EdgeRequest),
    /// Answer the viewer directly.
    Respond(EdgeResponse),
}
