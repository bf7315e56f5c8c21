use crate::normalize::alias_key;
use crate::report::Issue;
use crate::store;
use log::{debug, info};
use riot_api::{Match, RiotId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

/// Minimum normalized Levenshtein similarity for a fuzzy alias match.
pub const FUZZY_THRESHOLD: f64 = 0.75;

/// Shortest alias key allowed to match by substring.
const MIN_SUBSTRING_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Manual,
    Opgg,
    Observed,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub riot_id: RiotId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puuid: Option<String>,
    pub source: MappingSource,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub observed_count: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl MappingEntry {
    pub fn new(riot_id: RiotId, source: MappingSource) -> Self {
        Self { riot_id, puuid: None, source, observed_count: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MappingError {
    Conflict { alias: String, existing: RiotId, incoming: RiotId },
    EmptyAlias(String),
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::Conflict { alias, existing, incoming } => write!(
                f,
                "alias {alias:?} maps to both {existing} and {incoming}"
            ),
            MappingError::EmptyAlias(raw) => write!(f, "alias {raw:?} is empty once normalized"),
        }
    }
}

impl std::error::Error for MappingError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(RiotId),
    Unresolved(String),
}

impl Resolution {
    pub fn riot_id(&self) -> Option<&RiotId> {
        match self {
            Resolution::Resolved(id) => Some(id),
            Resolution::Unresolved(_) => None,
        }
    }
}

/// Alias → canonical Riot ID table, `processed/pseudonym_mapping.json`.
///
/// Aliases are stored as typed; two aliases with the same normalized key must
/// agree on the Riot ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PseudonymMapping {
    #[serde(default)]
    entries: BTreeMap<String, MappingEntry>,
    #[serde(default)]
    unmatched: BTreeSet<String>,
    #[serde(skip)]
    index: HashMap<String, String>,
}

impl PseudonymMapping {
    /// Missing file → empty mapping. A file with conflicting aliases is refused.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut mapping: Self = store::read_json_opt(path)?.unwrap_or_default();
        mapping.reindex()?;
        debug!("loaded {} mapping entries from {}", mapping.entries.len(), path.display());
        Ok(mapping)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        store::write_json_atomic(path, self)
    }

    fn reindex(&mut self) -> Result<(), MappingError> {
        self.index.clear();
        for (alias, entry) in &self.entries {
            let key = alias_key(alias);
            if key.is_empty() {
                return Err(MappingError::EmptyAlias(alias.clone()));
            }
            if let Some(other) = self.index.get(&key) {
                let existing = &self.entries[other].riot_id;
                if existing.key() != entry.riot_id.key() {
                    return Err(MappingError::Conflict {
                        alias: alias.clone(),
                        existing: existing.clone(),
                        incoming: entry.riot_id.clone(),
                    });
                }
                continue;
            }
            self.index.insert(key, alias.clone());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &String> {
        self.unmatched.iter()
    }

    pub fn lookup(&self, alias: &str) -> Option<&MappingEntry> {
        self.index.get(&alias_key(alias)).and_then(|a| self.entries.get(a))
    }

    /// Add an entry. Agreeing entries are merged (PUUID filled in, counts
    /// kept, manual source sticks); a different Riot ID for the same alias
    /// key is refused.
    pub fn insert(&mut self, alias: &str, entry: MappingEntry) -> Result<(), MappingError> {
        let alias = alias.trim();
        let key = alias_key(alias);
        if key.is_empty() {
            return Err(MappingError::EmptyAlias(alias.to_owned()));
        }

        if let Some(stored) = self.index.get(&key).and_then(|a| self.entries.get_mut(a)) {
            if stored.riot_id.key() != entry.riot_id.key() {
                return Err(MappingError::Conflict {
                    alias: alias.to_owned(),
                    existing: stored.riot_id.clone(),
                    incoming: entry.riot_id,
                });
            }
            if stored.puuid.is_none() {
                stored.puuid = entry.puuid;
            }
            stored.observed_count = stored.observed_count.max(entry.observed_count);
            stored.source = stored.source.min(entry.source);
        } else {
            self.index.insert(key, alias.to_owned());
            self.entries.insert(alias.to_owned(), entry);
        }
        self.unmatched.retain(|u| alias_key(u) != alias_key(alias));
        Ok(())
    }

    pub fn mark_unmatched(&mut self, alias: &str) {
        if self.lookup(alias).is_none() {
            self.unmatched.insert(alias.trim().to_owned());
        }
    }

    /// Resolve a player known by `pseudo`, optionally with a Riot name/tag
    /// taken from a link or a sheet.
    ///
    /// Manual corrections win, then an explicit tag, then any other mapping
    /// entry. Anything left is returned unresolved for the run report.
    pub fn resolve_player(&self, pseudo: &str, riot_name: &str, tag: Option<&str>) -> Resolution {
        let names = [pseudo, riot_name];
        let manual = names
            .iter()
            .filter_map(|n| self.lookup(n))
            .find(|e| e.source == MappingSource::Manual);
        if let Some(entry) = manual {
            return Resolution::Resolved(entry.riot_id.clone());
        }

        let tag = tag.map(str::trim).filter(|t| !t.is_empty());
        if let Some(tag) = tag {
            let name = if riot_name.trim().is_empty() { pseudo } else { riot_name };
            if !name.trim().is_empty() {
                return Resolution::Resolved(RiotId::new(name, tag));
            }
        }
        for name in names {
            if let Ok(id) = name.parse::<RiotId>() {
                return Resolution::Resolved(id);
            }
        }

        if let Some(entry) = names.iter().find_map(|n| self.lookup(n)) {
            return Resolution::Resolved(entry.riot_id.clone());
        }

        let alias = if pseudo.trim().is_empty() { riot_name } else { pseudo };
        Resolution::Unresolved(alias.trim().to_owned())
    }

    pub fn resolve(&self, name: &str, tag: Option<&str>) -> Resolution {
        self.resolve_player(name, name, tag)
    }
}

// ---------------------------------------------------------------------------
// Mapping builder: propose aliases from names seen in cached matches
// ---------------------------------------------------------------------------

/// A Riot account as seen across cached matches.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedName {
    pub riot_id: RiotId,
    pub display_name: String,
    pub puuid: Option<String>,
    pub count: u32,
}

/// Distinct accounts in `matches`, most seen first, ties by Riot ID.
pub fn observe<'a>(matches: impl IntoIterator<Item = &'a Match>) -> Vec<ObservedName> {
    let mut seen: BTreeMap<String, ObservedName> = BTreeMap::new();
    for m in matches {
        for p in &m.participants {
            let Some(riot_id) = &p.riot_id else {
                continue;
            };
            let observed = seen.entry(riot_id.key()).or_insert_with(|| ObservedName {
                riot_id: riot_id.clone(),
                display_name: p.display_name.clone(),
                puuid: p.puuid.clone(),
                count: 0,
            });
            observed.count += 1;
        }
    }
    let mut names: Vec<ObservedName> = seen.into_values().collect();
    names.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.riot_id.key().cmp(&b.riot_id.key())));
    names
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
    Exact,
    Substring,
    Fuzzy,
}

fn best_candidate<'a>(alias: &str, observed: &'a [ObservedName]) -> Option<(&'a ObservedName, MatchKind)> {
    let key = alias_key(alias);
    if key.is_empty() {
        return None;
    }
    let keys: Vec<(String, String)> = observed
        .iter()
        .map(|o| (alias_key(&o.riot_id.game_name), alias_key(&o.display_name)))
        .collect();
    if let Some(i) = keys.iter().position(|(game, display)| *game == key || *display == key) {
        return Some((&observed[i], MatchKind::Exact));
    }
    let overlaps = |k: &str| {
        k.len() >= MIN_SUBSTRING_LEN && (k.contains(key.as_str()) || key.contains(k))
    };
    if key.len() >= MIN_SUBSTRING_LEN
        && let Some(i) = keys.iter().position(|(game, display)| overlaps(game) || overlaps(display))
    {
        return Some((&observed[i], MatchKind::Substring));
    }

    // Observed is sorted by count, so the first best score wins ties.
    let mut best: Option<(usize, f64)> = None;
    for (i, (game, display)) in keys.iter().enumerate() {
        let score = strsim::normalized_levenshtein(&key, game)
            .max(strsim::normalized_levenshtein(&key, display));
        if score >= FUZZY_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| (&observed[i], MatchKind::Fuzzy))
}

/// Propose mapping entries for `aliases` from `observed` accounts.
///
/// Aliases that already carry a manual entry are left alone. Aliases with no
/// candidate go to `unmatched` and are reported.
pub fn build_mapping(
    mapping: &mut PseudonymMapping,
    aliases: &[String],
    observed: &[ObservedName],
) -> Vec<Issue> {
    let mut issues = Vec::new();
    let unique: BTreeSet<&str> = aliases.iter().map(|a| a.trim()).filter(|a| !a.is_empty()).collect();

    let mut proposed = 0;
    for alias in unique {
        if mapping.lookup(alias).is_some_and(|e| e.source == MappingSource::Manual) {
            continue;
        }
        let Some((hit, kind)) = best_candidate(alias, observed) else {
            if mapping.lookup(alias).is_none() {
                mapping.mark_unmatched(alias);
                issues.push(Issue::unresolved(alias, "no matching name in cached matches"));
            }
            continue;
        };

        let entry = MappingEntry {
            riot_id: hit.riot_id.clone(),
            puuid: hit.puuid.clone(),
            source: if kind == MatchKind::Fuzzy { MappingSource::Fuzzy } else { MappingSource::Observed },
            observed_count: hit.count,
        };
        debug!("{alias} → {} ({kind:?})", hit.riot_id);
        match mapping.insert(alias, entry) {
            Ok(()) => proposed += 1,
            Err(e) => issues.push(Issue::unresolved(alias, e.to_string())),
        }
    }

    info!("mapping: {proposed} aliases matched, {} unmatched", mapping.unmatched.len());
    issues
}
