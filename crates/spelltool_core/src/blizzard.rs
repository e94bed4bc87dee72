use anyhow::{Context, Result};
use reqwest::Url;
use serde_json::Value;

use crate::cache::{CacheRecord, SOURCE_BLIZZARD};
use crate::config::ToolConfig;
use crate::fetch::{AbilitySource, FetchOutcome};
use crate::http::HttpGet;
use crate::keybinds::SpellId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlizzardConfig {
    pub api_base: String,
    pub namespace: String,
    pub locale: String,
}

impl BlizzardConfig {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            api_base: config.api_base(),
            namespace: config.namespace(),
            locale: config.locale(),
        }
    }
}

/// Fields of a spell document the cache cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpellPayload {
    pub name: String,
    pub description: String,
    pub media_href: Option<String>,
}

/// Official Game Data API source. Holds an already-issued bearer token; a
/// token that dies mid-run shows up as per-spell failures.
pub struct BlizzardSource<H> {
    http: H,
    access_token: String,
    config: BlizzardConfig,
}

impl<H: HttpGet> BlizzardSource<H> {
    pub fn new(http: H, access_token: String, config: BlizzardConfig) -> Self {
        Self {
            http,
            access_token,
            config,
        }
    }

    pub fn request_count(&self) -> usize {
        self.http.request_count()
    }

    pub fn spell_url(&self, id: SpellId) -> Result<String> {
        let url = Url::parse_with_params(
            &format!("{}/data/wow/spell/{id}", self.config.api_base),
            &[
                ("namespace", self.config.namespace.as_str()),
                ("locale", self.config.locale.as_str()),
            ],
        )
        .with_context(|| format!("invalid API base: {}", self.config.api_base))?;
        Ok(url.to_string())
    }

    fn fetch_spell(&mut self, id: SpellId) -> Result<FetchOutcome> {
        let url = self.spell_url(id)?;
        let response = self
            .http
            .get(&url, "application/json", Some(&self.access_token))?;
        match response.status {
            200 => {}
            404 => {
                log::warn!("  spell {id} not found (may be deprecated or invalid)");
                return Ok(FetchOutcome::NotFound);
            }
            status => {
                log::warn!("  failed to fetch spell {id} (HTTP {status})");
                return Ok(FetchOutcome::Failed(format!("HTTP {status}")));
            }
        }

        let payload = parse_spell(id, &response.body)?;
        let icon = match payload.media_href.as_deref() {
            Some(href) => self.fetch_icon(id, href),
            None => None,
        };
        Ok(FetchOutcome::Found(CacheRecord::new(
            id,
            payload.name,
            icon,
            payload.description,
            SOURCE_BLIZZARD,
        )))
    }

    /// A missing icon never fails the spell.
    fn fetch_icon(&mut self, id: SpellId, href: &str) -> Option<String> {
        let url = match media_url(href, &self.config) {
            Ok(url) => url,
            Err(error) => {
                log::debug!("  spell {id}: {error:#}");
                return None;
            }
        };
        let response = match self.http.get(&url, "application/json", Some(&self.access_token)) {
            Ok(response) if response.is_ok() => response,
            Ok(response) => {
                log::debug!("  spell {id}: media lookup returned HTTP {}", response.status);
                return None;
            }
            Err(error) => {
                log::debug!("  spell {id}: {error:#}");
                return None;
            }
        };
        parse_icon_asset(&response.body).unwrap_or_else(|error| {
            log::debug!("  spell {id}: {error:#}");
            None
        })
    }
}

impl<H: HttpGet> AbilitySource for BlizzardSource<H> {
    fn source_name(&self) -> &'static str {
        "blizzard"
    }

    fn fetch(&mut self, id: SpellId) -> FetchOutcome {
        match self.fetch_spell(id) {
            Ok(outcome) => outcome,
            Err(error) => {
                log::warn!("  error fetching spell {id}: {error:#}");
                FetchOutcome::Failed(format!("{error:#}"))
            }
        }
    }
}

pub fn parse_spell(id: SpellId, body: &str) -> Result<SpellPayload> {
    let data: Value =
        serde_json::from_str(body).with_context(|| format!("failed to decode spell {id}"))?;
    let name = data
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Spell {id}"));
    let description = data
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let media = data.get("media");
    let media_href = media
        .and_then(|media| media.pointer("/key/href"))
        .or_else(|| media.and_then(|media| media.get("href")))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(SpellPayload {
        name,
        description,
        media_href,
    })
}

/// The media link carries a versioned namespace that the static endpoint
/// rejects, so namespace and locale are written back over it.
pub fn media_url(href: &str, config: &BlizzardConfig) -> Result<String> {
    let mut url = match Url::parse(href) {
        Ok(url) => url,
        Err(_) => Url::parse(&config.api_base)
            .and_then(|base| base.join(href))
            .with_context(|| format!("invalid media href: {href}"))?,
    };

    let mut pairs = url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();
    for (key, value) in [
        ("namespace", config.namespace.as_str()),
        ("locale", config.locale.as_str()),
    ] {
        match pairs.iter_mut().find(|(existing, _)| existing == key) {
            Some(pair) => pair.1 = value.to_string(),
            None => pairs.push((key.to_string(), value.to_string())),
        }
    }
    url.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(url.to_string())
}

pub fn parse_icon_asset(body: &str) -> Result<Option<String>> {
    let data: Value = serde_json::from_str(body).context("failed to decode spell media")?;
    Ok(data
        .get("assets")
        .and_then(Value::as_array)
        .and_then(|assets| {
            assets
                .iter()
                .find(|asset| asset.get("key").and_then(Value::as_str) == Some("icon"))
        })
        .and_then(|asset| asset.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockHttp;

    const SPELL_URL: &str =
        "https://us.api.blizzard.com/data/wow/spell/23922?namespace=static-us&locale=en_US";
    const MEDIA_URL: &str =
        "https://us.api.blizzard.com/data/wow/media/spell/23922?namespace=static-us&locale=en_US";

    fn config() -> BlizzardConfig {
        BlizzardConfig {
            api_base: "https://us.api.blizzard.com".to_string(),
            namespace: "static-us".to_string(),
            locale: "en_US".to_string(),
        }
    }

    fn id(value: u32) -> SpellId {
        SpellId::new(value).expect("spell id")
    }

    #[test]
    fn found_spell_resolves_icon_through_media() {
        let http = MockHttp::new()
            .with(
                SPELL_URL,
                200,
                r#"{"id":23922,"name":"Shield Slam","description":"Slams the target with your shield.","media":{"key":{"href":"https://us.api.blizzard.com/data/wow/media/spell/23922?namespace=static-11.0.2_56313-us"},"id":23922}}"#,
            )
            .with(
                MEDIA_URL,
                200,
                r#"{"assets":[{"key":"icon","value":"https://render.worldofwarcraft.com/us/icons/56/inv_shield_05.jpg","file_data_id":134951}]}"#,
            );
        let mut source = BlizzardSource::new(http, "tok".to_string(), config());

        match source.fetch(id(23922)) {
            FetchOutcome::Found(record) => {
                assert_eq!(record.name, "Shield Slam");
                assert_eq!(record.tooltip, "Slams the target with your shield.");
                assert_eq!(
                    record.icon.as_deref(),
                    Some("https://render.worldofwarcraft.com/us/icons/56/inv_shield_05.jpg")
                );
                assert_eq!(record.wowhead_id, "23922");
                assert_eq!(record.source.as_deref(), Some(SOURCE_BLIZZARD));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(source.http.requests, vec![SPELL_URL.to_string(), MEDIA_URL.to_string()]);
        assert!(source.http.bearers.iter().all(|b| b.as_deref() == Some("tok")));
    }

    #[test]
    fn missing_media_leaves_icon_empty() {
        let http = MockHttp::new().with(SPELL_URL, 200, r#"{"id":23922}"#);
        let mut source = BlizzardSource::new(http, "tok".to_string(), config());
        match source.fetch(id(23922)) {
            FetchOutcome::Found(record) => {
                assert_eq!(record.name, "Spell 23922");
                assert_eq!(record.icon, None);
                assert_eq!(record.tooltip, "");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn status_codes_map_to_outcomes() {
        let http = MockHttp::new().with(SPELL_URL, 503, "unavailable");
        let mut source = BlizzardSource::new(http, "tok".to_string(), config());
        assert_eq!(source.fetch(id(23922)), FetchOutcome::Failed("HTTP 503".to_string()));
        assert_eq!(source.fetch(id(1)), FetchOutcome::NotFound);

        let broken = MockHttp::new().with_transport_error(SPELL_URL);
        let mut source = BlizzardSource::new(broken, "tok".to_string(), config());
        assert!(matches!(source.fetch(id(23922)), FetchOutcome::Failed(_)));
    }

    #[test]
    fn media_url_overrides_versioned_namespace() {
        let url = media_url(
            "https://us.api.blizzard.com/data/wow/media/spell/871?namespace=static-10.2.0_51825-us",
            &config(),
        )
        .expect("url");
        assert_eq!(
            url,
            "https://us.api.blizzard.com/data/wow/media/spell/871?namespace=static-us&locale=en_US"
        );

        let relative = media_url("/data/wow/media/spell/871", &config()).expect("relative");
        assert_eq!(
            relative,
            "https://us.api.blizzard.com/data/wow/media/spell/871?namespace=static-us&locale=en_US"
        );
    }

    #[test]
    fn icon_asset_requires_icon_key() {
        assert_eq!(
            parse_icon_asset(r#"{"assets":[{"key":"zoom","value":"z.jpg"}]}"#).expect("parse"),
            None
        );
        assert!(parse_icon_asset("<html>").is_err());
        let payload = parse_spell(id(5), r#"{"name":"","media":{"href":"/x"}}"#).expect("parse");
        assert_eq!(payload.name, "Spell 5");
        assert_eq!(payload.media_href.as_deref(), Some("/x"));
    }
}
