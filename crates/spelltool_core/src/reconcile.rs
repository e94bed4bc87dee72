use std::collections::BTreeMap;

use anyhow::{Result, bail};

use crate::error::SpellError;
use crate::keybinds::{KeybindsDocument, SpellId};
use crate::prompt::{Decision, Prompt, ask_decision};
use crate::wowhead::{clean_ability_name, search_url, spell_page_url};

/// An ability that still has no identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingEntry<'a> {
    pub class_key: &'a str,
    pub class_name: &'a str,
    pub key_id: &'a str,
    pub keybind: &'a str,
    pub ability_name: &'a str,
}

impl MissingEntry<'_> {
    pub fn label(&self) -> String {
        format!(
            "{} - {}: {}",
            self.class_name,
            self.keybind.to_uppercase(),
            self.ability_name
        )
    }
}

/// Lazily walks the document; nothing is collected until the caller asks.
pub fn missing_ids(document: &KeybindsDocument) -> impl Iterator<Item = MissingEntry<'_>> {
    document
        .abilities()
        .filter(|entry| entry.ability.wowhead_id.is_none())
        .map(|entry| MissingEntry {
            class_key: entry.class_key,
            class_name: entry.class.display_name(entry.class_key),
            key_id: entry.key_id,
            keybind: entry.ability.keybind_label(entry.key_id),
            ability_name: &entry.ability.name,
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdUpdate {
    pub class_key: String,
    pub class_name: String,
    pub key_id: String,
    pub ability_name: String,
    pub previous: Option<SpellId>,
    pub new: SpellId,
}

impl IdUpdate {
    pub fn previous_label(&self) -> String {
        self.previous
            .map(|id| id.to_string())
            .unwrap_or_else(|| "null".to_string())
    }
}

/// Point one ability at `id`. The document is untouched when the class or
/// key does not exist.
pub fn set_spell_id(
    document: &mut KeybindsDocument,
    class_key: &str,
    key_id: &str,
    id: SpellId,
) -> Result<IdUpdate, SpellError> {
    let class_name = document
        .classes
        .get(class_key)
        .map(|class| class.display_name(class_key).to_string())
        .unwrap_or_default();
    let ability = document.ability_mut(class_key, key_id)?;
    let previous = ability.wowhead_id.replace(id);
    Ok(IdUpdate {
        class_key: class_key.to_string(),
        class_name,
        key_id: key_id.to_string(),
        ability_name: ability.name.clone(),
        previous,
        new: id,
    })
}

/// Curated identifiers for the tank specialisations, by class and key.
pub const KNOWN_SPELL_IDS: &[(&str, &[(&str, u32)])] = &[
    (
        "warrior",
        &[
            ("e", 6572),
            ("r", 6343),
            ("f", 107574),
            ("1", 1160),
            ("2", 190456),
            ("3", 2565),
            ("4", 23920),
            ("z", 12975),
            ("x", 152277),
            ("c", 871),
            ("v", 97462),
        ],
    ),
    (
        "paladin",
        &[
            ("q", 53600),
            ("e", 53595),
            ("r", 20271),
            ("f", 31884),
            ("1", 31935),
            ("2", 209202),
            ("3", 304971),
            ("4", 85673),
            ("z", 86659),
            ("x", 26573),
            ("c", 31850),
            ("v", 204150),
        ],
    ),
    (
        "deathknight",
        &[
            ("q", 45470),
            ("e", 206930),
            ("r", 50842),
            ("f", 49028),
            ("1", 195182),
            ("2", 48707),
            ("3", 194679),
            ("4", 51052),
            ("z", 48792),
            ("x", 43265),
            ("c", 55233),
            ("v", 274156),
        ],
    ),
    (
        "demonhunter",
        &[
            ("q", 203720),
            ("e", 263642),
            ("r", 213241),
            ("f", 228477),
            ("1", 395428),
            ("2", 204596),
            ("3", 204021),
            ("4", 207407),
            ("z", 187827),
            ("x", 204021),
            ("c", 203720),
            ("v", 202137),
        ],
    ),
    (
        "druid",
        &[
            ("q", 33917),
            ("e", 77758),
            ("r", 213771),
            ("f", 102558),
            ("1", 8921),
            ("2", 192081),
            ("3", 22842),
            ("4", 158298),
            ("z", 61336),
            ("x", 213771),
            ("c", 22812),
            ("v", 124974),
        ],
    ),
    (
        "monk",
        &[
            ("q", 121253),
            ("e", 205523),
            ("r", 100780),
            ("f", 115181),
            ("1", 101546),
            ("2", 107428),
            ("3", 214326),
            ("4", 322109),
            ("z", 115203),
            ("x", 116847),
            ("c", 119582),
            ("v", 325153),
        ],
    ),
];

/// Fill unset identifiers from [`KNOWN_SPELL_IDS`]. Set identifiers are
/// never overwritten; classes or keys absent from the document are ignored.
pub fn seed_known_ids(document: &mut KeybindsDocument) -> Vec<IdUpdate> {
    let mut updates = Vec::new();
    for (class_key, entries) in KNOWN_SPELL_IDS {
        for (key_id, raw) in entries.iter() {
            let Some(id) = SpellId::new(*raw) else {
                continue;
            };
            let unset = document
                .classes
                .get(*class_key)
                .and_then(|class| class.abilities.get(*key_id))
                .is_some_and(|ability| ability.wowhead_id.is_none());
            if !unset {
                continue;
            }
            if let Ok(update) = set_spell_id(document, class_key, key_id, id) {
                updates.push(update);
            }
        }
    }
    updates
}

pub const CSV_COLUMNS: [&str; 4] = ["class", "key", "spell_id", "ability_name"];

#[derive(Debug, Default)]
pub struct CsvImportReport {
    pub updates: Vec<IdUpdate>,
    pub errors: Vec<SpellError>,
    /// Rows with no spell id yet, as produced by the template.
    pub blank: usize,
}

/// Apply `class,key,spell_id,ability_name` rows. Valid rows land in the
/// document even when other rows fail; every failure is reported with its
/// line number.
pub fn import_csv(document: &mut KeybindsDocument, content: &str) -> Result<CsvImportReport> {
    let rows = parse_csv_rows(strip_bom(content), ',');
    let Some(header) = rows.first() else {
        return Ok(CsvImportReport::default());
    };
    let headers = header
        .iter()
        .map(|value| value.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();
    let column = |name: &str| headers.iter().position(|header| header == name);
    let (Some(class_col), Some(key_col), Some(id_col)) =
        (column("class"), column("key"), column("spell_id"))
    else {
        bail!(
            "CSV header must contain class, key and spell_id (expected: {})",
            CSV_COLUMNS.join(",")
        );
    };

    let mut report = CsvImportReport::default();
    for (index, row) in rows.iter().enumerate().skip(1) {
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        let line = index + 1;
        let field = |col: usize| {
            row.get(col)
                .map(|value| value.trim().to_ascii_lowercase())
                .unwrap_or_default()
        };
        let class_key = field(class_col);
        let key_id = field(key_col);
        let raw_id = row.get(id_col).map(|value| value.trim()).unwrap_or_default();

        if class_key.is_empty() || key_id.is_empty() {
            report.errors.push(SpellError::InvalidRow {
                row: line,
                message: "class and key are required".to_string(),
            });
            continue;
        }
        let id = match SpellId::parse_optional(raw_id) {
            Ok(Some(id)) => id,
            Ok(None) => {
                report.blank += 1;
                continue;
            }
            Err(error) => {
                report.errors.push(SpellError::InvalidRow {
                    row: line,
                    message: error.to_string(),
                });
                continue;
            }
        };
        match set_spell_id(document, &class_key, &key_id, id) {
            Ok(update) => report.updates.push(update),
            Err(error) => report.errors.push(SpellError::InvalidRow {
                row: line,
                message: error.to_string(),
            }),
        }
    }
    Ok(report)
}

/// One row per ability, current identifier or empty, ready to fill in.
pub fn render_csv_template(document: &KeybindsDocument) -> String {
    let mut output = CSV_COLUMNS.join(",");
    output.push('\n');
    for entry in document.abilities() {
        let id = entry
            .ability
            .wowhead_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let fields = [
            csv_field(entry.class_key),
            csv_field(entry.key_id),
            id,
            csv_field(&entry.ability.name),
        ];
        output.push_str(&fields.join(","));
        output.push('\n');
    }
    output
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}

fn parse_csv_rows(content: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            '\n' | '\r' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ if ch == delimiter => row.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }

    row.push(field);
    if row.len() > 1 || row.first().is_some_and(|value| !value.trim().is_empty()) {
        rows.push(row);
    }
    rows
}

/// Name lookup that returns candidate identifiers, best first.
pub trait SpellSearch {
    fn search(&mut self, ability_name: &str) -> Result<Vec<SpellId>>;
}

/// First candidate for `ability_name`. Lookup failures are logged and read
/// as "nothing found".
pub fn suggest_spell_id<S: SpellSearch + ?Sized>(search: &mut S, ability_name: &str) -> Option<SpellId> {
    match search.search(ability_name) {
        Ok(candidates) => {
            if candidates.len() > 1 {
                let preview = candidates
                    .iter()
                    .take(5)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                log::debug!(
                    "{} candidate(s) for '{}': {}",
                    candidates.len(),
                    clean_ability_name(ability_name),
                    preview.join(", ")
                );
            }
            candidates.first().copied()
        }
        Err(error) => {
            log::warn!("search for '{ability_name}' failed: {error:#}");
            None
        }
    }
}

/// Owned copy of a [`MissingEntry`], for use while the document changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub class_key: String,
    pub key_id: String,
    pub ability_name: String,
    pub label: String,
}

impl From<MissingEntry<'_>> for Target {
    fn from(entry: MissingEntry<'_>) -> Self {
        Self {
            class_key: entry.class_key.to_string(),
            key_id: entry.key_id.to_string(),
            ability_name: entry.ability_name.to_string(),
            label: entry.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub target: Target,
    pub id: SpellId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionReport {
    pub suggestions: Vec<Suggestion>,
    pub not_found: Vec<Target>,
}

/// Look up every missing ability without touching the document.
pub fn collect_suggestions<S: SpellSearch + ?Sized>(
    document: &KeybindsDocument,
    search: &mut S,
) -> SuggestionReport {
    let targets = missing_ids(document).map(Target::from).collect::<Vec<_>>();
    let mut report = SuggestionReport::default();
    for (index, target) in targets.into_iter().enumerate() {
        log::info!("[{}] {}", index + 1, target.label);
        match suggest_spell_id(search, &target.ability_name) {
            Some(id) => report.suggestions.push(Suggestion { target, id }),
            None => report.not_found.push(target),
        }
    }
    report
}

pub fn apply_suggestions(
    document: &mut KeybindsDocument,
    suggestions: &[Suggestion],
) -> Result<Vec<IdUpdate>> {
    suggestions
        .iter()
        .map(|suggestion| {
            set_spell_id(
                document,
                &suggestion.target.class_key,
                &suggestion.target.key_id,
                suggestion.id,
            )
            .map_err(anyhow::Error::from)
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewReport {
    pub accepted: Vec<IdUpdate>,
    pub skipped: usize,
    pub not_found: usize,
    pub quit_early: bool,
}

/// Search each missing ability in turn and ask before applying the hit.
pub fn review_suggestions_interactive<S, P>(
    document: &mut KeybindsDocument,
    search: &mut S,
    prompt: &mut P,
) -> Result<ReviewReport>
where
    S: SpellSearch + ?Sized,
    P: Prompt + ?Sized,
{
    let targets = missing_ids(document).map(Target::from).collect::<Vec<_>>();
    let total = targets.len();
    let mut report = ReviewReport::default();

    for (index, target) in targets.into_iter().enumerate() {
        let Some(id) = suggest_spell_id(search, &target.ability_name) else {
            log::info!("[{}/{total}] {}: no spell id found", index + 1, target.label);
            report.not_found += 1;
            continue;
        };
        let question = format!(
            "[{}/{total}] {} -> {id} ({}). Update?",
            index + 1,
            target.label,
            spell_page_url(id)
        );
        match ask_decision(prompt, &question)? {
            Decision::Accept => {
                report
                    .accepted
                    .push(set_spell_id(document, &target.class_key, &target.key_id, id)?);
            }
            Decision::Skip => report.skipped += 1,
            Decision::Quit => {
                report.quit_early = true;
                break;
            }
        }
    }
    Ok(report)
}

/// Markdown worklist of missing abilities, grouped by class.
pub fn render_search_list(document: &KeybindsDocument) -> Result<String> {
    let mut by_class: BTreeMap<&str, Vec<MissingEntry<'_>>> = BTreeMap::new();
    let mut total = 0usize;
    for entry in missing_ids(document) {
        by_class.entry(entry.class_key).or_default().push(entry);
        total += 1;
    }

    let mut output = vec![
        "# Missing Spell IDs Search List".to_string(),
        String::new(),
        format!("Total missing: {total}"),
        String::new(),
        "## Instructions".to_string(),
        "1. Open each Wowhead search link to find the spell".to_string(),
        "2. The spell ID is in the URL: `https://www.wowhead.com/spell=12345` (12345 is the ID)"
            .to_string(),
        "3. Run `spelltool set-id <class> <key> <spell_id>` for each one".to_string(),
        "   Example: `spelltool set-id warrior e 6572`".to_string(),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    for entries in by_class.values() {
        let Some(first) = entries.first() else {
            continue;
        };
        output.push(format!("## {}", first.class_name));
        output.push(String::new());
        for entry in entries {
            let url = search_url(&clean_ability_name(entry.ability_name))?;
            output.push(format!("- **{}**: {}", entry.keybind, entry.ability_name));
            output.push(format!("  - [Wowhead Search]({url})"));
            output.push(format!(
                "  - Command: `spelltool set-id {} {} <ID>`",
                entry.class_key, entry.key_id
            ));
            output.push(String::new());
        }
    }
    Ok(output.join("\n"))
}
