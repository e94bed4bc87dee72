use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::keybinds::{SpellId, deserialize_scalar_keyed};

pub const DEFAULT_CACHE_FILE: &str = "_data/abilities_cache.yml";
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 7;

pub const SOURCE_BLIZZARD: &str = "blizzard_api";
pub const SOURCE_WOWHEAD: &str = "wowhead";

/// Display metadata for one spell, as fetched from a remote source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub tooltip: String,
    #[serde(default)]
    pub wowhead_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<String>,
}

impl CacheRecord {
    pub fn new(id: SpellId, name: String, icon: Option<String>, tooltip: String, source: &str) -> Self {
        Self {
            name,
            icon,
            tooltip,
            wowhead_id: id.to_string(),
            source: Some(source.to_string()),
            cached_at: None,
        }
    }

    pub fn stamped(mut self, now: DateTime<Utc>) -> Self {
        self.cached_at = Some(now.to_rfc3339());
        self
    }

    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        self.cached_at.as_deref().and_then(parse_timestamp)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Some(cached_at) = self.cached_at() else {
            return false;
        };
        now.checked_sub_signed(max_age)
            .is_none_or(|cutoff| cached_at > cutoff)
    }
}

/// The cache document, keyed by canonical spell id. Legacy files that mixed
/// integer and string keys collapse to one entry per id on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbilityCache {
    records: BTreeMap<SpellId, CacheRecord>,
}

impl AbilityCache {
    pub fn get(&self, id: SpellId) -> Option<&CacheRecord> {
        self.records.get(&id)
    }

    pub fn insert(&mut self, id: SpellId, record: CacheRecord) -> Option<CacheRecord> {
        self.records.insert(id, record)
    }

    pub fn contains(&self, id: SpellId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpellId, &CacheRecord)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }
}

impl FromIterator<(SpellId, CacheRecord)> for AbilityCache {
    fn from_iter<I: IntoIterator<Item = (SpellId, CacheRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

pub fn parse_cache(content: &str) -> Result<AbilityCache> {
    if content.trim().is_empty() {
        return Ok(AbilityCache::default());
    }
    let raw: BTreeMap<String, CacheRecord> =
        deserialize_scalar_keyed(serde_yaml::Deserializer::from_str(content))
            .context("failed to parse cache YAML")?;
    let mut records = BTreeMap::new();
    for (key, record) in raw {
        let id = key
            .parse::<SpellId>()
            .with_context(|| format!("invalid cache key '{key}'"))?;
        if let Some(previous) = records.insert(id, record) {
            log::debug!("cache key {id} appeared twice; keeping the later entry ({})", previous.name);
        }
    }
    Ok(AbilityCache { records })
}

pub fn render_cache(cache: &AbilityCache) -> Result<String> {
    let keyed = cache
        .records
        .iter()
        .map(|(id, record)| (id.to_string(), record))
        .collect::<BTreeMap<_, _>>();
    serde_yaml::to_string(&keyed).context("failed to serialize cache YAML")
}

/// Missing file means an empty cache.
pub fn load_cache(path: &Path) -> Result<AbilityCache> {
    if !path.exists() {
        return Ok(AbilityCache::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_cache(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_cache(path: &Path, cache: &AbilityCache) -> Result<()> {
    let rendered = render_cache(cache)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

/// Accepts RFC 3339 and the `2024-05-01 10:00:00 -0500` form older cache
/// files were written with.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    DateTime::<FixedOffset>::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
