//! Identity token acquisition and caching
//!
//! Tokens come from a password grant against `<identity>/auth/tokens` and are
//! cached in a small JSON file (`{"token": ..., "expires_at": ...}`) so that
//! repeated runs do not re-authenticate. A cached token is reused only while
//! its expiry is strictly in the future.

use crate::error::{CloudError, Result};
use crate::log::{LogSink, LogTag};
use crate::persist::{read_json_lenient, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackdeck_config::Credentials;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// An issued token and its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// On-disk shape of the token cache
#[derive(Debug, Serialize, Deserialize)]
struct TokenRecord {
    token: String,
    expires_at: String,
}

/// Parse an identity-service expiry such as `2026-10-16T12:00:00.000000Z`.
///
/// A trailing `Z` is normalized to `+00:00`; strings without an explicit
/// offset are rejected.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let normalized = match raw.strip_suffix('Z') {
        Some(stem) => format!("{}+00:00", stem),
        None => raw.to_string(),
    };
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Obtains, caches and refreshes the identity token.
///
/// The cache file is authoritative; the in-memory copy is only a convenience
/// for callers that want to inspect the most recent token.
pub struct TokenManager {
    http: reqwest::Client,
    identity_url: String,
    credentials: Credentials,
    cache_path: PathBuf,
    current: RwLock<Option<Token>>,
    log: LogSink,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        identity_url: impl Into<String>,
        credentials: Credentials,
        cache_path: impl AsRef<Path>,
        log: LogSink,
    ) -> Self {
        Self {
            http,
            identity_url: identity_url.into(),
            credentials,
            cache_path: cache_path.as_ref().to_path_buf(),
            current: RwLock::new(None),
            log,
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn project_id(&self) -> &str {
        &self.credentials.project_id
    }

    /// Most recently obtained token, if any
    pub fn current(&self) -> Option<Token> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    /// Return a usable token value, authenticating only when the cache has none.
    pub async fn get_token(&self) -> Result<String> {
        Ok(self.get().await?.value)
    }

    /// Like [`get_token`](Self::get_token) but returns the expiry too.
    pub async fn get(&self) -> Result<Token> {
        if let Some(record) = read_json_lenient::<TokenRecord>(&self.cache_path).await {
            let cached = parse_expiry(&record.expires_at).map(|expires_at| Token {
                value: record.token,
                expires_at,
            });
            match cached {
                Some(token) if token.is_valid() => {
                    tracing::debug!("Using cached token (expires {})", token.expires_at);
                    self.set_current(token.clone());
                    return Ok(token);
                }
                _ => self
                    .log
                    .tagged(LogTag::Auth, "Cached token expired, requesting new one..."),
            }
        }

        self.log
            .tagged(LogTag::Auth, "Requesting new OpenStack token...");
        let token = self.authenticate().await?;
        self.persist(&token).await?;
        self.set_current(token.clone());
        Ok(token)
    }

    fn set_current(&self, token: Token) {
        if let Ok(mut guard) = self.current.write() {
            *guard = Some(token);
        }
    }

    fn auth_url(&self) -> String {
        format!("{}/auth/tokens", self.identity_url.trim_end_matches('/'))
    }

    async fn authenticate(&self) -> Result<Token> {
        let url = self.auth_url();
        let payload = serde_json::json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "id": self.credentials.account_id,
                            "password": self.credentials.password,
                        }
                    }
                },
                "scope": {
                    "project": { "id": self.credentials.project_id }
                }
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| CloudError::Network {
                endpoint: url.clone(),
                source,
            })?;

        let status = response.status().as_u16();
        let header_token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|source| CloudError::Network {
            endpoint: url.clone(),
            source,
        })?;

        if status != 201 {
            return Err(CloudError::AuthFailed(format!("({}): {}", status, body)));
        }

        let expires_at = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("token")
                    .and_then(|t| t.get("expires_at"))
                    .and_then(|e| e.as_str())
                    .map(str::to_string)
            });

        let (Some(value), Some(expires_raw)) = (header_token.filter(|t| !t.is_empty()), expires_at)
        else {
            return Err(CloudError::AuthFailed(
                "Invalid identity response: missing token or expires_at".to_string(),
            ));
        };

        let expires_at = parse_expiry(&expires_raw).ok_or_else(|| {
            CloudError::AuthFailed(format!("Unparsable token expiry: {}", expires_raw))
        })?;

        tracing::debug!("Obtained token expiring at {}", expires_at);
        Ok(Token { value, expires_at })
    }

    async fn persist(&self, token: &Token) -> Result<()> {
        let record = TokenRecord {
            token: token.value.clone(),
            expires_at: token.expires_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        };
        write_json_atomic(&self.cache_path, &record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(server: &MockServer, cache_path: &Path) -> TokenManager {
        TokenManager::new(
            reqwest::Client::new(),
            format!("{}/identity", server.uri()),
            Credentials::new("user-1", "hunter2", "proj-1"),
            cache_path,
            LogSink::tracing_only(),
        )
    }

    fn write_cache(path: &Path, token: &str, expires_at: &str) {
        std::fs::write(
            path,
            serde_json::json!({"token": token, "expires_at": expires_at}).to_string(),
        )
        .unwrap();
    }

    fn rfc3339_z(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    }

    async fn mount_issue(server: &MockServer, token: &str, expires_at: &str) {
        Mock::given(method("POST"))
            .and(path("/identity/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", token)
                    .set_body_json(serde_json::json!({"token": {"expires_at": expires_at}})),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_expiry_normalizes_z() {
        let parsed = parse_expiry("2030-01-02T03:04:05.000000Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2030-01-02T03:04:05+00:00");
        assert!(parse_expiry("2030-01-02T03:04:05+02:00").is_some());
        assert!(parse_expiry("2030-01-02T03:04:05").is_none());
        assert!(parse_expiry("").is_none());
    }

    #[test]
    fn test_token_expires_at_boundary() {
        let expires_at = parse_expiry("2030-01-02T03:04:05Z").unwrap();
        let token = Token {
            value: "tok".to_string(),
            expires_at,
        };
        assert!(token.is_valid_at(expires_at - Duration::seconds(1)));
        assert!(!token.is_valid_at(expires_at));
    }

    #[tokio::test]
    async fn test_future_cached_token_makes_no_request() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();
        let cache = dir.path().join("token_cache.json");
        write_cache(&cache, "cached-token", &rfc3339_z(Utc::now() + Duration::hours(1)));
        let before = std::fs::read_to_string(&cache).unwrap();

        let tokens = manager(&server, &cache);
        assert_eq!(tokens.get_token().await.unwrap(), "cached-token");
        assert_eq!(tokens.current().unwrap().value, "cached-token");

        let requests = server.received_requests().await.unwrap();
        assert!(requests.is_empty());
        // cache hit never rewrites the file
        assert_eq!(std::fs::read_to_string(&cache).unwrap(), before);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_overwritten() {
        let server = MockServer::start().await;
        let fresh_expiry = rfc3339_z(Utc::now() + Duration::hours(2));
        mount_issue(&server, "fresh-token", &fresh_expiry).await;

        let dir = tempdir().unwrap();
        let cache = dir.path().join("token_cache.json");
        write_cache(&cache, "stale-token", &rfc3339_z(Utc::now() - Duration::minutes(1)));

        let tokens = manager(&server, &cache);
        assert_eq!(tokens.get_token().await.unwrap(), "fresh-token");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);

        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&cache).unwrap()).unwrap();
        assert_eq!(record["token"], "fresh-token");
        assert_eq!(
            parse_expiry(record["expires_at"].as_str().unwrap()),
            parse_expiry(&fresh_expiry)
        );
    }

    #[tokio::test]
    async fn test_password_grant_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/auth/tokens"))
            .and(body_partial_json(serde_json::json!({
                "auth": {
                    "identity": {
                        "methods": ["password"],
                        "password": {"user": {"id": "user-1", "password": "hunter2"}}
                    },
                    "scope": {"project": {"id": "proj-1"}}
                }
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "tok")
                    .set_body_json(serde_json::json!({"token": {"expires_at": "2099-01-01T00:00:00.000000Z"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let tokens = manager(&server, &dir.path().join("token_cache.json"));
        assert_eq!(tokens.get_token().await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_corrupt_cache_triggers_authentication() {
        let server = MockServer::start().await;
        mount_issue(&server, "fresh-token", "2099-01-01T00:00:00Z").await;

        let dir = tempdir().unwrap();
        let cache = dir.path().join("token_cache.json");
        std::fs::write(&cache, "{{{").unwrap();

        let tokens = manager(&server, &cache);
        assert_eq!(tokens.get_token().await.unwrap(), "fresh-token");
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/auth/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_string("The request you have made requires authentication."))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let cache = dir.path().join("token_cache.json");
        let tokens = manager(&server, &cache);

        let err = tokens.get_token().await.unwrap_err();
        assert!(matches!(err, CloudError::AuthFailed(ref msg) if msg.contains("401")));
        assert!(!cache.exists());
        assert!(tokens.current().is_none());
    }

    #[tokio::test]
    async fn test_missing_subject_header_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"token": {"expires_at": "2099-01-01T00:00:00Z"}})),
            )
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let tokens = manager(&server, &dir.path().join("token_cache.json"));
        assert!(matches!(
            tokens.get_token().await.unwrap_err(),
            CloudError::AuthFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_expiry_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "tok")
                    .set_body_json(serde_json::json!({"token": {}})),
            )
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let tokens = manager(&server, &dir.path().join("token_cache.json"));
        assert!(matches!(
            tokens.get_token().await.unwrap_err(),
            CloudError::AuthFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_identity_is_network_error() {
        let dir = tempdir().unwrap();
        let tokens = TokenManager::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Credentials::new("user-1", "hunter2", "proj-1"),
            dir.path().join("token_cache.json"),
            LogSink::tracing_only(),
        );
        assert!(tokens.get_token().await.unwrap_err().is_network());
    }
}
