use std::path::Path;

use anyhow::Result;

use crate::cache::{AbilityCache, load_cache};
use crate::keybinds::{KeybindsDocument, load_keybinds, save_keybinds};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: usize,
    pub missing: usize,
    pub without_id: usize,
}

/// Copy cached display fields into every ability that has an identifier.
///
/// `icon`, `tooltip` and `cached_name` are overwritten together, so running
/// twice against the same cache changes nothing the second time. Abilities
/// whose identifier has no cache record are left exactly as they were.
pub fn merge(mut document: KeybindsDocument, cache: &AbilityCache) -> (KeybindsDocument, MergeReport) {
    let mut report = MergeReport::default();
    for ability in document.abilities_mut() {
        let Some(id) = ability.wowhead_id else {
            report.without_id += 1;
            continue;
        };
        match cache.get(id) {
            Some(record) => {
                ability.icon = record.icon.clone();
                ability.tooltip = Some(record.tooltip.clone());
                ability.cached_name = Some(record.name.clone());
                report.merged += 1;
            }
            None => {
                log::debug!("spell {id} ({}) has no cache record", ability.name);
                report.missing += 1;
            }
        }
    }
    (document, report)
}

/// Load both documents, merge, and save the keybinds file. An empty or
/// missing cache only warns; the document is written back unchanged.
pub fn merge_files(keybinds_path: &Path, cache_path: &Path) -> Result<MergeReport> {
    let document = load_keybinds(keybinds_path)?;
    let cache = load_cache(cache_path)?;
    if cache.is_empty() {
        log::warn!(
            "ability cache {} is empty; run `spelltool fetch` first",
            cache_path.display()
        );
    }
    let (document, report) = merge(document, &cache);
    save_keybinds(keybinds_path, &document)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheRecord, SOURCE_BLIZZARD, parse_cache};
    use crate::fetch::{AbilitySource, FetchOutcome, RefreshPolicy, refresh_cache};
    use crate::keybinds::{SpellId, load_keybinds, parse_keybinds, save_keybinds};
    use crate::reconcile::set_spell_id;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    const DOCUMENT: &str = r#"
classes:
  warrior:
    name: Warrior
    abilities:
      q:
        name: Shield Slam
        keybind: Q
        wowhead_id: 23922
      e:
        name: Revenge
        keybind: E
        wowhead_id: 6572
        icon: hand-picked.png
      t:
        name: Taunt
        keybind: T
        wowhead_id: null
"#;

    const CACHE: &str = r#"
"23922":
  name: Shield Slam
  icon: https://render.worldofwarcraft.com/us/icons/56/inv_shield_05.jpg
  tooltip: Slams the target with your shield.
  wowhead_id: "23922"
  source: blizzard_api
  cached_at: "2026-04-01T00:00:00+00:00"
"#;

    #[test]
    fn merges_known_ids_and_leaves_the_rest() {
        let document = parse_keybinds(DOCUMENT).expect("parse");
        let cache = parse_cache(CACHE).expect("cache");

        let (merged, report) = merge(document, &cache);
        assert_eq!(
            report,
            MergeReport {
                merged: 1,
                missing: 1,
                without_id: 1,
            }
        );

        let warrior = &merged.classes["warrior"];
        let slam = &warrior.abilities["q"];
        assert_eq!(slam.cached_name.as_deref(), Some("Shield Slam"));
        assert_eq!(slam.tooltip.as_deref(), Some("Slams the target with your shield."));
        assert_eq!(
            slam.icon.as_deref(),
            Some("https://render.worldofwarcraft.com/us/icons/56/inv_shield_05.jpg")
        );

        let revenge = &warrior.abilities["e"];
        assert_eq!(revenge.icon.as_deref(), Some("hand-picked.png"));
        assert_eq!(revenge.cached_name, None);
        assert_eq!(warrior.abilities["t"].tooltip, None);
    }

    #[test]
    fn merge_is_idempotent() {
        let cache = parse_cache(CACHE).expect("cache");
        let (once, _) = merge(parse_keybinds(DOCUMENT).expect("parse"), &cache);
        let (twice, _) = merge(once.clone(), &cache);
        assert_eq!(once, twice);
    }

    #[test]
    fn record_without_icon_clears_stale_icon() {
        let id = SpellId::new(6572).expect("id");
        let cache = [(
            id,
            CacheRecord::new(id, "Revenge".to_string(), None, "Swing.".to_string(), SOURCE_BLIZZARD),
        )]
        .into_iter()
        .collect::<AbilityCache>();

        let (merged, report) = merge(parse_keybinds(DOCUMENT).expect("parse"), &cache);
        assert_eq!(report.merged, 1);
        assert_eq!(merged.classes["warrior"].abilities["e"].icon, None);
    }

    struct OneSpell(CacheRecord);

    impl AbilitySource for OneSpell {
        fn source_name(&self) -> &'static str {
            "scripted"
        }

        fn fetch(&mut self, id: SpellId) -> FetchOutcome {
            if self.0.wowhead_id == id.to_string() {
                FetchOutcome::Found(self.0.clone())
            } else {
                FetchOutcome::NotFound
            }
        }
    }

    #[test]
    fn set_fetch_merge_pipeline_embeds_display_fields() {
        let mut document = parse_keybinds(
            "classes:\n  warrior:\n    name: Warrior\n    abilities:\n      q:\n        name: Shield Slam\n        keybind: Q\n",
        )
        .expect("parse");
        let id = SpellId::new(23922).expect("id");
        let update = set_spell_id(&mut document, "warrior", "q", id).expect("set");
        assert_eq!(update.previous, None);

        let mut source = OneSpell(CacheRecord::new(
            id,
            "Shield Slam".to_string(),
            Some("https://render.worldofwarcraft.com/us/icons/56/inv_shield_05.jpg".to_string()),
            "Slams the target with your shield.".to_string(),
            SOURCE_BLIZZARD,
        ));
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).single().expect("time");
        let (cache, fetched) = refresh_cache(
            &document,
            AbilityCache::default(),
            &mut source,
            RefreshPolicy::default(),
            now,
        );
        assert_eq!(fetched.new, 1);

        let (merged, report) = merge(document, &cache);
        assert_eq!(report.merged, 1);
        let ability = &merged.classes["warrior"].abilities["q"];
        assert_eq!(ability.wowhead_id, Some(id));
        assert_eq!(ability.cached_name.as_deref(), Some("Shield Slam"));
        assert_eq!(
            ability.tooltip.as_deref(),
            Some("Slams the target with your shield.")
        );
        assert_eq!(
            ability.icon.as_deref(),
            Some("https://render.worldofwarcraft.com/us/icons/56/inv_shield_05.jpg")
        );
    }

    #[test]
    fn merge_files_with_empty_cache_keeps_document() {
        let temp = tempdir().expect("tempdir");
        let keybinds = temp.path().join("_data").join("keybinds.yml");
        let cache = temp.path().join("_data").join("abilities_cache.yml");
        let original = parse_keybinds(DOCUMENT).expect("parse");
        save_keybinds(&keybinds, &original).expect("save");

        let report = merge_files(&keybinds, &cache).expect("merge");
        assert_eq!(
            report,
            MergeReport {
                merged: 0,
                missing: 2,
                without_id: 1,
            }
        );
        assert_eq!(load_keybinds(&keybinds).expect("load"), original);
    }

    #[test]
    fn merge_files_writes_cached_fields() {
        let temp = tempdir().expect("tempdir");
        let keybinds = temp.path().join("keybinds.yml");
        let cache = temp.path().join("abilities_cache.yml");
        std::fs::write(&keybinds, DOCUMENT).expect("write keybinds");
        std::fs::write(&cache, CACHE).expect("write cache");

        assert_eq!(merge_files(&keybinds, &cache).expect("merge").merged, 1);
        let reloaded = load_keybinds(&keybinds).expect("load");
        assert_eq!(
            reloaded.classes["warrior"].abilities["q"].cached_name.as_deref(),
            Some("Shield Slam")
        );
    }

    #[test]
    fn merged_document_round_trips_through_disk() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("_data").join("keybinds.yml");
        let (merged, _) = merge(
            parse_keybinds(DOCUMENT).expect("parse"),
            &parse_cache(CACHE).expect("cache"),
        );
        save_keybinds(&path, &merged).expect("save");

        let reloaded = load_keybinds(&path).expect("load");
        assert_eq!(reloaded, merged);
        let ability = &reloaded.classes["warrior"].abilities["q"];
        assert_eq!(ability.cached_name.as_deref(), Some("Shield Slam"));
        assert_eq!(ability.wowhead_id, SpellId::new(23922));
    }
}
