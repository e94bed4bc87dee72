use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use reqwest::Url;
use serde_json::Value;

use crate::cache::{CacheRecord, SOURCE_WOWHEAD};
use crate::fetch::{AbilitySource, FetchOutcome};
use crate::http::HttpGet;
use crate::keybinds::SpellId;
use crate::reconcile::SpellSearch;

pub const TOOLTIP_URL_TEMPLATES: [&str; 3] = [
    "https://www.wowhead.com/tooltip/spell/{id}?dataEnv=1",
    "https://www.wowhead.com/tooltip/spell/{id}",
    "https://wowhead.com/data=spell;id={id}",
];
pub const ICON_URL_TEMPLATE: &str = "https://wow.zamimg.com/images/wow/icons/large/{icon}.jpg";
const SEARCH_URL: &str = "https://www.wowhead.com/search";
const ACCEPT_ANY: &str = "application/json, text/html, */*";

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static ANCHOR_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a[^>]*>([^<]+)</a>").expect("anchor pattern"));
static QUALITY_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]*class="q[^"]*"[^>]*>([^<]+)</a>"#).expect("quality anchor pattern")
});
static QUALITY_DIV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div[^>]*class="q[^"]*"[^>]*>([^<]+)"#).expect("quality div pattern")
});
static ICON_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"iconId['"]?\s*[:=]\s*['"]?(\d+)"#).expect("icon id pattern")
});
static ICON_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/icons/large/(\d+)\.jpg").expect("icon path pattern"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<h1[^>]*>([^<]+)</h1>").expect("heading pattern"));
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>([^<]+)</title>").expect("title pattern"));
static SITE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i) - wowhead").expect("site suffix pattern"));
static SPELL_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/spell=(\d+)").expect("spell link pattern"));

pub fn tooltip_urls(id: SpellId) -> Vec<String> {
    TOOLTIP_URL_TEMPLATES
        .iter()
        .map(|template| template.replace("{id}", &id.to_string()))
        .collect()
}

pub fn spell_page_url(id: SpellId) -> String {
    format!("https://www.wowhead.com/spell={id}")
}

pub fn icon_url(icon: &str) -> String {
    ICON_URL_TEMPLATE.replace("{icon}", icon)
}

/// Display fields scraped from one response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedSpell {
    pub name: String,
    pub icon: Option<String>,
    pub tooltip: String,
}

impl ScrapedSpell {
    fn into_record(self, id: SpellId) -> CacheRecord {
        CacheRecord::new(id, self.name, self.icon, self.tooltip, SOURCE_WOWHEAD)
    }
}

/// Tooltip endpoint body: JSON when the endpoint cooperates, markup otherwise.
pub fn parse_tooltip_body(id: SpellId, body: &str) -> ScrapedSpell {
    match serde_json::from_str::<Value>(body) {
        Ok(data) if data.is_object() => parse_tooltip_json(id, &data),
        _ => parse_tooltip_markup(id, body),
    }
}

fn parse_tooltip_json(id: SpellId, data: &Value) -> ScrapedSpell {
    let tooltip_html = ["tooltip", "description"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .unwrap_or_default();
    let name = data
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            data.get("tooltip")
                .and_then(Value::as_str)
                .and_then(|tooltip| first_capture(&ANCHOR_TEXT, tooltip))
        })
        .unwrap_or_else(|| fallback_name(id));
    let icon = ["icon", "iconId", "iconid"]
        .iter()
        .find_map(|key| data.get(*key).and_then(scalar_text))
        .map(|icon| icon_url(&icon));
    ScrapedSpell {
        name,
        icon,
        tooltip: strip_markup(tooltip_html),
    }
}

fn parse_tooltip_markup(id: SpellId, html: &str) -> ScrapedSpell {
    ScrapedSpell {
        name: first_capture(&QUALITY_ANCHOR, html).unwrap_or_else(|| fallback_name(id)),
        icon: first_capture(&ICON_ID, html).map(|icon| icon_url(&icon)),
        tooltip: first_capture(&QUALITY_DIV, html)
            .map(|text| text.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Full spell page, the last resort. It has no usable tooltip text.
pub fn parse_spell_page(id: SpellId, html: &str) -> ScrapedSpell {
    let name = first_capture(&HEADING, html)
        .or_else(|| first_capture(&TITLE, html))
        .map(|name| SITE_SUFFIX.replace_all(&name, "").trim().to_string())
        .unwrap_or_else(|| fallback_name(id));
    let icon = first_capture(&ICON_ID, html)
        .or_else(|| first_capture(&ICON_PATH, html))
        .map(|icon| icon_url(&icon));
    ScrapedSpell {
        name,
        icon,
        tooltip: String::new(),
    }
}

pub fn strip_markup(html: &str) -> String {
    let without_tags = TAG.replace_all(html, " ");
    WHITESPACE.replace_all(&without_tags, " ").trim().to_string()
}

/// Spell identifiers linked from a page, first occurrence first.
pub fn extract_spell_ids(html: &str) -> Vec<SpellId> {
    let mut seen = HashSet::new();
    SPELL_LINK
        .captures_iter(html)
        .filter_map(|captures| captures.get(1)?.as_str().parse::<SpellId>().ok())
        .filter(|id| seen.insert(*id))
        .collect()
}

/// "Shield Block / Spell Reflect" searches as "Shield Block";
/// "Charge (alt)" as "Charge".
pub fn clean_ability_name(name: &str) -> String {
    let first = name.split(" / ").next().unwrap_or(name);
    first.split(" (alt)").next().unwrap_or(first).trim().to_string()
}

pub fn search_url(clean_name: &str) -> Result<String> {
    let url = Url::parse_with_params(SEARCH_URL, &[("q", clean_name)])
        .context("failed to build search URL")?;
    Ok(url.to_string())
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().to_string())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn fallback_name(id: SpellId) -> String {
    format!("Spell {id}")
}

/// Unofficial tooltip endpoints, then the public spell page.
pub struct WowheadSource<H> {
    http: H,
}

impl<H: HttpGet> WowheadSource<H> {
    pub fn new(http: H) -> Self {
        Self { http }
    }

    pub fn request_count(&self) -> usize {
        self.http.request_count()
    }

    fn fetch_tooltip(&mut self, id: SpellId) -> Option<ScrapedSpell> {
        for url in tooltip_urls(id) {
            match self.http.get(&url, ACCEPT_ANY, None) {
                Ok(response) if response.is_ok() => {
                    return Some(parse_tooltip_body(id, &response.body));
                }
                Ok(response) => log::debug!("  {url} returned HTTP {}", response.status),
                Err(error) => log::debug!("  {url}: {error:#}"),
            }
        }
        None
    }

    fn fetch_page(&mut self, id: SpellId) -> Option<ScrapedSpell> {
        let url = spell_page_url(id);
        match self.http.get(&url, "text/html", None) {
            Ok(response) if response.is_ok() => Some(parse_spell_page(id, &response.body)),
            Ok(response) => {
                log::debug!("  {url} returned HTTP {}", response.status);
                None
            }
            Err(error) => {
                log::debug!("  {url}: {error:#}");
                None
            }
        }
    }
}

impl<H: HttpGet> AbilitySource for WowheadSource<H> {
    fn source_name(&self) -> &'static str {
        "wowhead"
    }

    fn fetch(&mut self, id: SpellId) -> FetchOutcome {
        match self.fetch_tooltip(id).or_else(|| self.fetch_page(id)) {
            Some(scraped) => FetchOutcome::Found(scraped.into_record(id)),
            None => {
                log::warn!("  could not fetch data for spell {id}");
                FetchOutcome::NotFound
            }
        }
    }
}

/// Name lookup against the public search page.
pub struct WowheadSearch<H> {
    http: H,
}

impl<H: HttpGet> WowheadSearch<H> {
    pub fn new(http: H) -> Self {
        Self { http }
    }
}

impl<H: HttpGet> SpellSearch for WowheadSearch<H> {
    fn search(&mut self, ability_name: &str) -> Result<Vec<SpellId>> {
        let clean = clean_ability_name(ability_name);
        if clean.is_empty() {
            return Ok(Vec::new());
        }
        let url = search_url(&clean)?;
        log::debug!("searching for '{clean}'");
        let response = self.http.get(&url, "text/html", None)?;
        if !response.is_ok() {
            bail!("search failed (HTTP {})", response.status);
        }
        Ok(extract_spell_ids(&response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockHttp;

    fn id(value: u32) -> SpellId {
        SpellId::new(value).expect("spell id")
    }

    #[test]
    fn json_tooltip_is_stripped_and_icon_templated() {
        let scraped = parse_tooltip_body(
            id(23922),
            r#"{"name":"Shield Slam","icon":"inv_shield_05","tooltip":"<table><tr><td><b class=\"q\">Shield Slam</b><br/>Slams the\n   target.</td></tr></table>"}"#,
        );
        assert_eq!(scraped.name, "Shield Slam");
        assert_eq!(
            scraped.icon.as_deref(),
            Some("https://wow.zamimg.com/images/wow/icons/large/inv_shield_05.jpg")
        );
        assert_eq!(scraped.tooltip, "Shield Slam Slams the target.");
    }

    #[test]
    fn json_name_falls_back_to_anchor_text() {
        let scraped = parse_tooltip_body(
            id(6572),
            r#"{"tooltip":"<a href=\"/spell=6572\">Revenge</a> swings","iconId":132353}"#,
        );
        assert_eq!(scraped.name, "Revenge");
        assert_eq!(
            scraped.icon.as_deref(),
            Some("https://wow.zamimg.com/images/wow/icons/large/132353.jpg")
        );
    }

    #[test]
    fn markup_body_uses_regex_extraction() {
        let scraped = parse_tooltip_body(
            id(871),
            r#"<div class="q0">Reduces all damage taken</div><a class="q1" href="/spell=871">Shield Wall</a><script>var iconId = "132362";</script>"#,
        );
        assert_eq!(scraped.name, "Shield Wall");
        assert_eq!(scraped.tooltip, "Reduces all damage taken");
        assert!(scraped.icon.as_deref().is_some_and(|url| url.ends_with("/132362.jpg")));

        let bare = parse_tooltip_body(id(871), "nothing useful");
        assert_eq!(bare.name, "Spell 871");
        assert_eq!(bare.icon, None);
    }

    #[test]
    fn spell_page_strips_site_suffix() {
        let scraped = parse_spell_page(
            id(2565),
            r#"<html><head><title>Shield Block - WoWHead</title></head><img src="https://wow.zamimg.com/images/wow/icons/large/132110.jpg"></html>"#,
        );
        assert_eq!(scraped.name, "Shield Block");
        assert!(scraped.icon.as_deref().is_some_and(|url| url.ends_with("/132110.jpg")));
        assert_eq!(scraped.tooltip, "");
    }

    #[test]
    fn source_tries_templates_in_order_then_page() {
        let urls = tooltip_urls(id(23922));
        let http = MockHttp::new()
            .with_transport_error(&urls[0])
            .with(&urls[2], 200, r#"{"name":"Shield Slam"}"#);
        let mut source = WowheadSource::new(http);
        match source.fetch(id(23922)) {
            FetchOutcome::Found(record) => {
                assert_eq!(record.name, "Shield Slam");
                assert_eq!(record.source.as_deref(), Some(SOURCE_WOWHEAD));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(source.http.requests, urls);

        let http = MockHttp::new().with_html(&spell_page_url(id(23922)), "<h1>Shield Slam</h1>");
        let mut source = WowheadSource::new(http);
        assert!(matches!(source.fetch(id(23922)), FetchOutcome::Found(_)));
        assert_eq!(source.request_count(), 4);

        let mut source = WowheadSource::new(MockHttp::new());
        assert_eq!(source.fetch(id(23922)), FetchOutcome::NotFound);
    }

    #[test]
    fn search_helpers() {
        assert_eq!(clean_ability_name("Shield Block / Spell Reflect"), "Shield Block");
        assert_eq!(clean_ability_name(" Charge (alt) "), "Charge");
        assert_eq!(
            search_url("Shield Slam").expect("url"),
            "https://www.wowhead.com/search?q=Shield+Slam"
        );
        assert_eq!(
            extract_spell_ids(r#"<a href="/spell=23922">x</a><a href="/spell=1160"></a><a href="/spell=23922"></a>"#),
            vec![id(23922), id(1160)]
        );
    }

    #[test]
    fn search_returns_candidates_in_page_order() {
        let url = search_url("Ignore Pain").expect("url");
        let http = MockHttp::new().with_html(&url, r#"<a href="/spell=190456">Ignore Pain</a>"#);
        let mut search = WowheadSearch::new(http);
        assert_eq!(
            search.search("Ignore Pain / Shield Block").expect("search"),
            vec![id(190456)]
        );
        assert!(search.search("Unknown Spell").is_err());
    }
}
