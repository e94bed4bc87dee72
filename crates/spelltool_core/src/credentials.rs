use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cache::parse_timestamp;
use crate::error::SpellError;
use crate::http::HttpClient;

pub const CLIENT_ID_VAR: &str = "BLIZZARD_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "BLIZZARD_CLIENT_SECRET";
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
/// A cached token this close to expiry is treated as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 300;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Environment first; the dotfile only fills in what the environment lacks.
pub fn resolve_credentials(dotfile: &Path) -> Result<Credentials> {
    resolve_credentials_with_lookup(|key| env::var(key).ok(), dotfile)
}

fn resolve_credentials_with_lookup<F>(lookup_env: F, dotfile: &Path) -> Result<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: Option<String>| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let mut client_id = non_empty(lookup_env(CLIENT_ID_VAR));
    let mut client_secret = non_empty(lookup_env(CLIENT_SECRET_VAR));

    if (client_id.is_none() || client_secret.is_none()) && dotfile.exists() {
        let values = read_dotfile(dotfile)?;
        if client_id.is_none() {
            client_id = non_empty(values.get(CLIENT_ID_VAR).cloned());
        }
        if client_secret.is_none() {
            client_secret = non_empty(values.get(CLIENT_SECRET_VAR).cloned());
        }
    }

    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(Credentials {
            client_id,
            client_secret,
        }),
        (id, _) => {
            let missing = if id.is_none() {
                CLIENT_ID_VAR
            } else {
                CLIENT_SECRET_VAR
            };
            Err(SpellError::MissingCredentials {
                missing: missing.to_string(),
            }
            .into())
        }
    }
}

fn read_dotfile(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    for entry in entries {
        let (key, value) = entry.with_context(|| format!("failed to parse {}", path.display()))?;
        values.insert(key, value);
    }
    Ok(values)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(deserialize_with = "deserialize_expiry")]
    pub expires_at: DateTime<Utc>,
}

/// Token files from older tooling carry `2024-05-01 10:00:00 -0500` rather
/// than RFC 3339.
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid expires_at: {raw}")))
}

impl Token {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.trim().is_empty()
            && self.expires_at > now + Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// What the OAuth endpoint hands back before it is pinned to a clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
}

pub trait TokenStore {
    /// `None` for a missing or unreadable cache; a bad cache is never fatal.
    fn load(&self) -> Option<Token>;
    fn save(&mut self, token: &Token) -> Result<()>;
}

pub trait TokenExchange {
    fn exchange(&mut self, credentials: &Credentials) -> Result<TokenGrant>;
}

/// Capability handed to anything that needs a bearer token.
pub trait TokenProvider {
    fn access_token(&mut self, force_refresh: bool) -> Result<Token>;
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<Token> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Token>(&content) {
            Ok(token) => Some(token),
            Err(error) => {
                log::debug!("ignoring unreadable token cache {}: {error}", self.path.display());
                None
            }
        }
    }

    fn save(&mut self, token: &Token) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered =
            serde_json::to_string_pretty(token).context("failed to serialize token cache")?;
        fs::write(&self.path, rendered)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// Client-credentials grant against the Battle.net OAuth endpoint.
pub struct OAuthExchange {
    http: HttpClient,
    oauth_url: String,
}

impl OAuthExchange {
    pub fn new(http: HttpClient, oauth_url: String) -> Self {
        Self { http, oauth_url }
    }
}

impl TokenExchange for OAuthExchange {
    fn exchange(&mut self, credentials: &Credentials) -> Result<TokenGrant> {
        let response = self.http.post_form_basic_auth(
            &self.oauth_url,
            &credentials.client_id,
            &credentials.client_secret,
            &[("grant_type", "client_credentials")],
        )?;
        if !response.is_ok() {
            return Err(SpellError::AuthFailed {
                status: response.status,
                body: response.body,
            }
            .into());
        }
        parse_token_grant(&response.body)
    }
}

pub fn parse_token_grant(body: &str) -> Result<TokenGrant> {
    let payload: Value = serde_json::from_str(body).context("failed to decode token response")?;
    let access_token = payload
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("token response has no access_token"))?
        .to_string();
    let expires_in = payload
        .get("expires_in")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Ok(TokenGrant {
        access_token,
        expires_in,
    })
}

/// Reuses the stored token while it is comfortably valid, otherwise runs the
/// exchange and persists the result.
pub struct CachedTokenProvider<E, S> {
    credentials: Credentials,
    exchange: E,
    store: S,
}

impl<E: TokenExchange, S: TokenStore> CachedTokenProvider<E, S> {
    pub fn new(credentials: Credentials, exchange: E, store: S) -> Self {
        Self {
            credentials,
            exchange,
            store,
        }
    }

    fn access_token_at(&mut self, force_refresh: bool, now: DateTime<Utc>) -> Result<Token> {
        if !force_refresh
            && let Some(token) = self.store.load()
            && token.is_usable(now)
        {
            log::debug!("using cached access token (expires {})", token.expires_at);
            return Ok(token);
        }

        log::info!("Fetching Blizzard API access token...");
        let grant = self.exchange.exchange(&self.credentials)?;
        let expires_at = Duration::try_seconds(grant.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or_else(|| {
                log::warn!(
                    "token lifetime {}s is out of range, assuming {DEFAULT_EXPIRES_IN_SECS}s",
                    grant.expires_in
                );
                now + Duration::seconds(DEFAULT_EXPIRES_IN_SECS)
            });
        let token = Token {
            access_token: grant.access_token,
            expires_at,
        };
        self.store.save(&token)?;
        log::info!("Token obtained (expires in {} seconds)", grant.expires_in);
        Ok(token)
    }
}

impl<E: TokenExchange, S: TokenStore> TokenProvider for CachedTokenProvider<E, S> {
    fn access_token(&mut self, force_refresh: bool) -> Result<Token> {
        self.access_token_at(force_refresh, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MemoryStore {
        token: Option<Token>,
        saves: usize,
    }

    impl TokenStore for MemoryStore {
        fn load(&self) -> Option<Token> {
            self.token.clone()
        }

        fn save(&mut self, token: &Token) -> Result<()> {
            self.token = Some(token.clone());
            self.saves += 1;
            Ok(())
        }
    }

    struct CountingExchange {
        calls: usize,
        status: u16,
        expires_in: i64,
    }

    impl TokenExchange for CountingExchange {
        fn exchange(&mut self, _credentials: &Credentials) -> Result<TokenGrant> {
            self.calls += 1;
            if self.status != 200 {
                return Err(SpellError::AuthFailed {
                    status: self.status,
                    body: "{\"error\":\"invalid_client\"}".to_string(),
                }
                .into());
            }
            Ok(TokenGrant {
                access_token: format!("token-{}", self.calls),
                expires_in: self.expires_in,
            })
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    fn provider(
        stored: Option<Token>,
        status: u16,
    ) -> CachedTokenProvider<CountingExchange, MemoryStore> {
        CachedTokenProvider::new(
            credentials(),
            CountingExchange {
                calls: 0,
                status,
                expires_in: 86_399,
            },
            MemoryStore {
                token: stored,
                saves: 0,
            },
        )
    }

    #[test]
    fn valid_cached_token_is_reused() {
        let now = Utc::now();
        let stored = Token {
            access_token: "cached".to_string(),
            expires_at: now + Duration::hours(1),
        };
        let mut provider = provider(Some(stored), 200);
        let token = provider.access_token_at(false, now).expect("token");
        assert_eq!(token.access_token, "cached");
        assert_eq!(provider.exchange.calls, 0);
    }

    #[test]
    fn token_near_expiry_is_refreshed_and_persisted() {
        let now = Utc::now();
        let stored = Token {
            access_token: "cached".to_string(),
            expires_at: now + Duration::seconds(EXPIRY_MARGIN_SECS - 1),
        };
        let mut provider = provider(Some(stored), 200);
        let token = provider.access_token_at(false, now).expect("token");
        assert_eq!(token.access_token, "token-1");
        assert_eq!(token.expires_at, now + Duration::seconds(86_399));
        assert_eq!(provider.store.saves, 1);
    }

    #[test]
    fn oversized_token_lifetime_uses_default() {
        let now = Utc::now();
        let grant = parse_token_grant(r#"{"access_token":"x","expires_in":9223372036854775807}"#)
            .expect("grant");
        let mut provider = provider(None, 200);
        provider.exchange.expires_in = grant.expires_in;

        let token = provider.access_token_at(false, now).expect("token");
        assert_eq!(token.expires_at, now + Duration::seconds(DEFAULT_EXPIRES_IN_SECS));
        assert_eq!(provider.store.saves, 1);
    }

    #[test]
    fn legacy_token_file_is_reused() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("blizzard_token.json");
        fs::write(
            &path,
            r#"{"access_token":"legacy","expires_at":"2099-05-01 10:00:00 -0500"}"#,
        )
        .expect("write token");

        let token = FileTokenStore::new(path.clone()).load().expect("token");
        assert_eq!(token.access_token, "legacy");
        assert_eq!(
            token.expires_at,
            Utc.with_ymd_and_hms(2099, 5, 1, 15, 0, 0).single().expect("time")
        );

        fs::write(&path, r#"{"access_token":"x","expires_at":"soon"}"#).expect("write token");
        assert!(FileTokenStore::new(path).load().is_none());
    }

    #[test]
    fn force_refresh_skips_cache() {
        let now = Utc::now();
        let stored = Token {
            access_token: "cached".to_string(),
            expires_at: now + Duration::hours(10),
        };
        let mut provider = provider(Some(stored), 200);
        let token = provider.access_token_at(true, now).expect("token");
        assert_eq!(token.access_token, "token-1");
    }

    #[test]
    fn failed_exchange_surfaces_auth_error() {
        let mut provider = provider(None, 401);
        let error = provider.access_token_at(false, Utc::now()).expect_err("must fail");
        match error.downcast_ref::<SpellError>() {
            Some(SpellError::AuthFailed { status, body }) => {
                assert_eq!(*status, 401);
                assert!(body.contains("invalid_client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.store.saves, 0);
    }

    #[test]
    fn env_values_win_and_dotfile_fills_gaps() {
        let temp = tempdir().expect("tempdir");
        let dotfile = temp.path().join(".env");
        fs::write(
            &dotfile,
            "# local credentials\nBLIZZARD_CLIENT_ID=from-file\nBLIZZARD_CLIENT_SECRET=file-secret\n",
        )
        .expect("write dotfile");

        let resolved = resolve_credentials_with_lookup(
            |key| (key == CLIENT_ID_VAR).then(|| "from-env".to_string()),
            &dotfile,
        )
        .expect("resolve");
        assert_eq!(resolved.client_id, "from-env");
        assert_eq!(resolved.client_secret, "file-secret");
        assert!(!format!("{resolved:?}").contains("file-secret"));
    }

    #[test]
    fn missing_credentials_name_the_variable() {
        let temp = tempdir().expect("tempdir");
        let error = resolve_credentials_with_lookup(
            |key| (key == CLIENT_ID_VAR).then(|| "id".to_string()),
            &temp.path().join(".env"),
        )
        .expect_err("must fail");
        match error.downcast_ref::<SpellError>() {
            Some(SpellError::MissingCredentials { missing }) => {
                assert_eq!(missing, CLIENT_SECRET_VAR);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(error.to_string().contains("develop.battle.net"));
    }

    #[test]
    fn file_store_round_trips_and_ignores_garbage() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(".spelltool").join("blizzard_token.json");
        let mut store = FileTokenStore::new(path.clone());
        assert!(store.load().is_none());

        let token = Token {
            access_token: "abc".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        store.save(&token).expect("save");
        assert_eq!(store.load(), Some(token));

        fs::write(&path, "not json").expect("corrupt");
        assert!(store.load().is_none());
    }

    #[test]
    fn token_grant_defaults_expiry() {
        let grant = parse_token_grant(r#"{"access_token":"xyz","token_type":"bearer"}"#)
            .expect("grant");
        assert_eq!(grant.access_token, "xyz");
        assert_eq!(grant.expires_in, DEFAULT_EXPIRES_IN_SECS);
        assert!(parse_token_grant(r#"{"token_type":"bearer"}"#).is_err());
    }
}
