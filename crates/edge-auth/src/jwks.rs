//! User pool signing keys.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::IdpClient;
use crate::{Error, Result};

/// A JWKS (JSON Web Key Set).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JwksSet {
    /// Keys.
    pub keys: Vec<Jwk>,
}

/// Minimal JWK structure for RSA/EC.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC").
    pub kty: String,

    /// Key id.
    pub kid: Option<String>,

    /// Public key use.
    #[serde(rename = "use")]
    pub use_: Option<String>,

    /// Algorithm (optional).
    pub alg: Option<String>,

    // RSA
    /// RSA modulus.
    pub n: Option<String>,
    /// RSA exponent.
    pub e: Option<String>,

    // EC
    /// Curve name.
    pub crv: Option<String>,
    /// EC x coordinate.
    pub x: Option<String>,
    /// EC y coordinate.
    pub y: Option<String>,
}

/// A decoded public key ready for signature checks.
#[derive(Clone)]
pub struct CachedKey {
    /// Algorithm the key is published for.
    pub alg: Algorithm,
    /// Decoding key.
    pub key: Arc<DecodingKey>,
}

impl std::fmt::Debug for CachedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedKey").field("alg", &self.alg).finish_non_exhaustive()
    }
}

/// Lazily populated kid → key map for one user pool.
///
/// Entries are never evicted or replaced: a kid maps to the first key seen for
/// it for the life of the process. A miss triggers exactly one JWKS fetch.
pub struct KeySetCache<C> {
    client: Arc<C>,
    jwks_url: String,
    keys: DashMap<String, CachedKey>,
}

impl<C: IdpClient> KeySetCache<C> {
    /// Create an empty cache for `jwks_url`.
    pub fn new(client: Arc<C>, jwks_url: impl Into<String>) -> Self {
        Self {
            client,
            jwks_url: jwks_url.into(),
            keys: DashMap::new(),
        }
    }

    /// JWKS endpoint this cache reads from.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True when `kid` is cached.
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Look up `kid`, fetching the JWKS once on a miss.
    pub async fn get_key(&self, kid: &str) -> Result<CachedKey> {
        let hit = self.keys.get(kid).map(|key| key.clone());
        if let Some(key) = hit {
            tracing::debug!(kid, "jwks cache hit");
            return Ok(key);
        }

        let set = self.fetch().await?;
        let added = self.cache_jwks(&set);
        tracing::info!(jwks_url = %self.jwks_url, added, "fetched user pool jwks");

        self.keys
            .get(kid)
            .map(|key| key.clone())
            .ok_or_else(|| Error::KeyNotFound(kid.to_string()))
    }

    /// Add every usable key of `set`. Returns how many new kids were inserted.
    pub fn cache_jwks(&self, set: &JwksSet) -> usize {
        let mut added = 0;
        for jwk in &set.keys {
            let Some(kid) = jwk.kid.as_deref() else {
                tracing::warn!(kty = %jwk.kty, "skipping jwk without kid");
                continue;
            };
            if self.keys.contains_key(kid) {
                continue;
            }
            match cached_key_from_jwk(jwk) {
                Ok(key) => {
                    self.keys.entry(kid.to_string()).or_insert_with(|| {
                        added += 1;
                        key
                    });
                }
                Err(e) => tracing::warn!(kid, error = %e, "skipping unusable jwk"),
            }
        }
        added
    }

    async fn fetch(&self) -> Result<JwksSet> {
        let body: Value = match self.client.get_json(&self.jwks_url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(jwks_url = %self.jwks_url, error = %e, "jwks fetch failed");
                return Err(Error::KeySetUnavailable(e.to_string()));
            }
        };
        serde_json::from_value(body).map_err(|e| Error::KeySetUnavailable(format!("invalid JWKS: {e}")))
    }
}

fn cached_key_from_jwk(jwk: &Jwk) -> Result<CachedKey> {
    let alg = match jwk.alg.as_deref() {
        Some(alg) => Algorithm::from_str(alg)
            .map_err(|_| Error::KeySetUnavailable(format!("unsupported alg: {alg}")))?,
        None if jwk.kty == "RSA" => Algorithm::RS256,
        None if jwk.kty == "EC" => Algorithm::ES256,
        None => return Err(Error::KeySetUnavailable(format!("unsupported kty: {}", jwk.kty))),
    };
    let key = decoding_key_from_jwk(jwk)?;
    Ok(CachedKey {
        alg,
        key: Arc::new(key),
    })
}

fn decoding_key_from_jwk(jwk: &Jwk) -> Result<DecodingKey> {
    let missing = |what: &str| Error::KeySetUnavailable(format!("{} JWK missing {what}", jwk.kty));
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
            let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
            DecodingKey::from_rsa_components(n, e)
                .map_err(|e| Error::KeySetUnavailable(format!("invalid RSA JWK: {e}")))
        }
        "EC" => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
            DecodingKey::from_ec_components(x, y)
                .map_err(|e| Error::KeySetUnavailable(format!("invalid EC JWK: {e}")))
        }
        other => Err(Error::KeySetUnavailable(format!("unsupported kty: {other}"))),
    }
}
