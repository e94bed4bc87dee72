use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::{Mapping, Value};

use crate::error::SpellError;

pub const DEFAULT_KEYBINDS_FILE: &str = "_data/keybinds.yml";

/// External spell identifier. Always a positive integer; "unset" is
/// `Option::None` at every use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpellId(u32);

impl SpellId {
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Parse a loosely written identifier. Sentinels (`""`, `"null"`, `"~"`)
    /// come back as `Ok(None)`.
    pub fn parse_optional(raw: &str) -> Result<Option<Self>> {
        let trimmed = raw.trim();
        if is_unset_sentinel(trimmed) {
            return Ok(None);
        }
        trimmed.parse::<Self>().map(Some)
    }

    /// Documents also write "unset" as `0`, so a stored zero is not an error.
    fn from_yaml(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::String(text) if text.trim() == "0" => Ok(None),
            Value::String(text) => Self::parse_optional(text),
            Value::Number(number) => match number.as_u64() {
                Some(0) => Ok(None),
                Some(raw) => u32::try_from(raw)
                    .ok()
                    .and_then(Self::new)
                    .map(Some)
                    .ok_or_else(|| anyhow::anyhow!("spell id out of range: {raw}")),
                None => bail!("spell id must be a positive integer, got {number}"),
            },
            Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
            other => bail!("spell id must be a positive integer, got {other:?}"),
        }
    }
}

impl FromStr for SpellId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let raw = trimmed
            .parse::<u32>()
            .with_context(|| format!("spell id must be a positive integer, got '{trimmed}'"))?;
        Self::new(raw).ok_or_else(|| anyhow::anyhow!("spell id must be a positive integer, got 0"))
    }
}

impl fmt::Display for SpellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SpellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for SpellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        SpellId::from_yaml(&value)
            .map_err(D::Error::custom)?
            .ok_or_else(|| D::Error::custom("spell id is unset"))
    }
}

pub fn is_unset_sentinel(value: &str) -> bool {
    value.is_empty() || value == "~" || value.eq_ignore_ascii_case("null")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeybindsDocument {
    #[serde(default, deserialize_with = "deserialize_scalar_keyed")]
    pub classes: BTreeMap<String, ClassEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_scalar_keyed")]
    pub abilities: BTreeMap<String, Ability>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ClassEntry {
    pub fn display_name<'a>(&'a self, class_key: &'a str) -> &'a str {
        if self.name.trim().is_empty() {
            class_key
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ability {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keybind: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_spell_id")]
    pub wowhead_id: Option<SpellId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_name: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Ability {
    pub fn keybind_label<'a>(&'a self, key_id: &'a str) -> &'a str {
        self.keybind.as_deref().unwrap_or(key_id)
    }
}

/// One ability together with where it lives in the document.
#[derive(Debug, Clone, Copy)]
pub struct AbilityRef<'a> {
    pub class_key: &'a str,
    pub class: &'a ClassEntry,
    pub key_id: &'a str,
    pub ability: &'a Ability,
}

impl KeybindsDocument {
    pub fn abilities(&self) -> impl Iterator<Item = AbilityRef<'_>> {
        self.classes.iter().flat_map(|(class_key, class)| {
            class
                .abilities
                .iter()
                .map(move |(key_id, ability)| AbilityRef {
                    class_key,
                    class,
                    key_id,
                    ability,
                })
        })
    }

    pub fn abilities_mut(&mut self) -> impl Iterator<Item = &mut Ability> {
        self.classes
            .values_mut()
            .flat_map(|class| class.abilities.values_mut())
    }

    /// Resolve `(class, key)` or name which half is missing.
    pub fn ability_mut(&mut self, class_key: &str, key_id: &str) -> Result<&mut Ability, SpellError> {
        let available = self.classes.keys().cloned().collect::<Vec<_>>();
        let class = self
            .classes
            .get_mut(class_key)
            .ok_or_else(|| SpellError::UnknownClass {
                class: class_key.to_string(),
                available,
            })?;
        class
            .abilities
            .get_mut(key_id)
            .ok_or_else(|| SpellError::UnknownKey {
                class: class_key.to_string(),
                key: key_id.to_string(),
            })
    }

    pub fn ability_count(&self) -> usize {
        self.classes.values().map(|class| class.abilities.len()).sum()
    }
}

pub fn parse_keybinds(content: &str) -> Result<KeybindsDocument> {
    if content.trim().is_empty() {
        return Ok(KeybindsDocument::default());
    }
    let mut raw: Value = serde_yaml::from_str(content).context("failed to parse keybinds YAML")?;
    clear_malformed_spell_ids(&mut raw);
    serde_yaml::from_value(raw).context("failed to parse keybinds YAML")
}

/// Drop unparseable identifiers to unset, one warning each. Returns how many
/// were cleared.
fn clear_malformed_spell_ids(document: &mut Value) -> usize {
    let Some(classes) = document.get_mut("classes").and_then(Value::as_mapping_mut) else {
        return 0;
    };
    let mut cleared = 0;
    for (class_key, class) in classes.iter_mut() {
        let Some(abilities) = class.get_mut("abilities").and_then(Value::as_mapping_mut) else {
            continue;
        };
        for (key_id, ability) in abilities.iter_mut() {
            let Some(id) = ability.get_mut("wowhead_id") else {
                continue;
            };
            if let Err(error) = SpellId::from_yaml(id) {
                log::warn!(
                    "{}: {}: {error:#}; treating it as unset",
                    scalar_key(class_key).unwrap_or_default(),
                    scalar_key(key_id).unwrap_or_default()
                );
                *id = Value::Null;
                cleared += 1;
            }
        }
    }
    cleared
}

pub fn render_keybinds(document: &KeybindsDocument) -> Result<String> {
    serde_yaml::to_string(document).context("failed to serialize keybinds YAML")
}

pub fn load_keybinds(path: &Path) -> Result<KeybindsDocument> {
    if !path.exists() {
        return Err(SpellError::MissingConfigFile {
            path: path.to_path_buf(),
        }
        .into());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_keybinds(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_keybinds(path: &Path, document: &KeybindsDocument) -> Result<()> {
    let rendered = render_keybinds(document)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

fn deserialize_optional_spell_id<'de, D>(deserializer: D) -> Result<Option<SpellId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    SpellId::from_yaml(&value).map_err(D::Error::custom)
}

/// YAML keys such as `1:` or `23922:` arrive as integers; the documents key
/// everything by string.
pub(crate) fn deserialize_scalar_keyed<'de, D, T>(
    deserializer: D,
) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let mapping = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
    let mut output = BTreeMap::new();
    for (key, value) in mapping {
        let key = scalar_key(&key)
            .ok_or_else(|| D::Error::custom(format!("unsupported mapping key: {key:?}")))?;
        let value = serde_yaml::from_value(value)
            .map_err(|error| D::Error::custom(format!("{key}: {error}")))?;
        output.insert(key, value);
    }
    Ok(output)
}

pub(crate) fn scalar_key(key: &Value) -> Option<String> {
    match key {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
