use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::cache::{AbilityCache, CacheRecord, DEFAULT_STALE_AFTER_DAYS};
use crate::keybinds::{KeybindsDocument, SpellId};

/// Result of asking one source about one spell. Never an `Err`: a batch
/// keeps going whatever a single lookup does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(CacheRecord),
    NotFound,
    Failed(String),
}

pub trait AbilitySource {
    fn source_name(&self) -> &'static str;
    fn fetch(&mut self, id: SpellId) -> FetchOutcome;
}

/// Asks `primary` first and only consults `secondary` when it comes back
/// without a record.
pub struct FallbackSource<A, B> {
    primary: A,
    secondary: B,
}

impl<A: AbilitySource, B: AbilitySource> FallbackSource<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: AbilitySource, B: AbilitySource> AbilitySource for FallbackSource<A, B> {
    fn source_name(&self) -> &'static str {
        "auto"
    }

    fn fetch(&mut self, id: SpellId) -> FetchOutcome {
        match self.primary.fetch(id) {
            FetchOutcome::Found(record) => FetchOutcome::Found(record),
            outcome => {
                log::info!(
                    "  {} had nothing for {id} ({}), trying {}",
                    self.primary.source_name(),
                    describe(&outcome),
                    self.secondary.source_name()
                );
                self.secondary.fetch(id)
            }
        }
    }
}

fn describe(outcome: &FetchOutcome) -> &str {
    match outcome {
        FetchOutcome::Found(_) => "found",
        FetchOutcome::NotFound => "not found",
        FetchOutcome::Failed(reason) => reason,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub max_age: Duration,
    pub force: bool,
}

impl RefreshPolicy {
    /// Day counts too large for a `Duration` fall back to the default window.
    pub fn new(stale_after_days: i64, force: bool) -> Self {
        let max_age = Duration::try_days(stale_after_days).unwrap_or_else(|| {
            log::warn!(
                "stale_after_days {stale_after_days} is out of range, using {DEFAULT_STALE_AFTER_DAYS}"
            );
            Duration::days(DEFAULT_STALE_AFTER_DAYS)
        });
        Self { max_age, force }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_DAYS, false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl FetchReport {
    pub fn fetched(&self) -> usize {
        self.new + self.updated
    }
}

/// Unique set identifiers, in document order.
pub fn collect_spell_ids(document: &KeybindsDocument) -> Vec<SpellId> {
    let mut seen = HashSet::new();
    document
        .abilities()
        .filter_map(|entry| entry.ability.wowhead_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Fetch every referenced spell whose cached record is missing or stale.
/// The returned cache still has to be saved by the caller.
pub fn refresh_cache<S>(
    document: &KeybindsDocument,
    mut cache: AbilityCache,
    source: &mut S,
    policy: RefreshPolicy,
    now: DateTime<Utc>,
) -> (AbilityCache, FetchReport)
where
    S: AbilitySource + ?Sized,
{
    let ids = collect_spell_ids(document);
    let mut report = FetchReport {
        total: ids.len(),
        ..FetchReport::default()
    };

    for (index, id) in ids.iter().copied().enumerate() {
        let position = format!("[{}/{}]", index + 1, ids.len());
        if !policy.force
            && cache
                .get(id)
                .is_some_and(|record| record.is_fresh(now, policy.max_age))
        {
            log::info!("{position} Skipping {id} (already cached)");
            report.skipped += 1;
            continue;
        }

        log::info!("{position} Fetching spell {id} from {}...", source.source_name());
        match source.fetch(id) {
            FetchOutcome::Found(record) => {
                let name = record.name.clone();
                if cache.insert(id, record.stamped(now)).is_some() {
                    report.updated += 1;
                    log::info!("  updated: {name}");
                } else {
                    report.new += 1;
                    log::info!("  fetched: {name}");
                }
            }
            FetchOutcome::NotFound => {
                report.not_found += 1;
            }
            FetchOutcome::Failed(reason) => {
                log::debug!("  spell {id} failed: {reason}");
                report.failed += 1;
            }
        }
    }

    (cache, report)
}
