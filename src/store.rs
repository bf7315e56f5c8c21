//! On-disk artifact store: atomic JSON writes, the raw match cache and the
//! per-edition match id list.

use crate::report::{Issue, RunReport};
use anyhow::Context;
use log::{debug, warn};
use riot_api::Match;
use riot_api::client::parse_match;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes)
}

/// Write into a temp file next to `path`, then rename it over `path`.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("writing {}", tmp.path().display()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replacing {}", path.display()))?;
    debug!("wrote {}", path.display());
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Like `read_json`, but a missing file is `None` rather than an error.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

// ---------------------------------------------------------------------------
// Raw match cache: one file per match id, never rewritten once present
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MatchCache {
    dir: PathBuf,
}

impl MatchCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, match_id: &str) -> PathBuf {
        let file: String = match_id
            .trim()
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    pub fn contains(&self, match_id: &str) -> bool {
        self.path_for(match_id).is_file()
    }

    pub fn store(&self, match_id: &str, raw: &serde_json::Value) -> anyhow::Result<()> {
        write_json_atomic(&self.path_for(match_id), raw)
    }

    /// Decode the cached payloads for `ids`, in order. Missing and
    /// undecodable matches are reported and skipped; I/O errors are fatal.
    pub fn load_matches(&self, ids: &[String], report: &mut RunReport) -> anyhow::Result<Vec<Match>> {
        let mut matches = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(raw) = self.load_raw_lenient(id, report)? else {
                continue;
            };
            match parse_match(&raw) {
                Ok(mut m) => {
                    if m.id.is_empty() {
                        m.id = id.clone();
                    }
                    matches.push(m);
                }
                Err(e) => {
                    warn!("cached match {id} does not decode: {e}");
                    report.push(Issue::MalformedMatch { match_id: id.clone(), error: e.to_string() });
                }
            }
        }
        Ok(matches)
    }

    fn load_raw_lenient(
        &self,
        id: &str,
        report: &mut RunReport,
    ) -> anyhow::Result<Option<serde_json::Value>> {
        let path = self.path_for(id);
        if !path.is_file() {
            report.push(Issue::MissingMatch { match_id: id.to_owned() });
            return Ok(None);
        }
        let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str(&text) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) => {
                report.push(Issue::MalformedMatch { match_id: id.to_owned(), error: e.to_string() });
                Ok(None)
            }
        }
    }

    /// Every cached match id, sorted.
    pub fn ids(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| format!("listing {}", self.dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// tournament_matches.json: `edition_{N}` → ordered match ids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TournamentMatches {
    editions: BTreeMap<String, Vec<String>>,
}

impl TournamentMatches {
    pub fn edition_key(edition: u32) -> String {
        format!("edition_{edition}")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let editions = read_json_opt(path)?.unwrap_or_default();
        Ok(Self { editions })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        write_json_atomic(path, &self.editions)
    }

    pub fn ids(&self, edition: u32) -> &[String] {
        self.editions
            .get(&Self::edition_key(edition))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append ids not yet listed for the edition. Returns how many were new.
    pub fn merge(&mut self, edition: u32, ids: impl IntoIterator<Item = String>) -> usize {
        let list = self.editions.entry(Self::edition_key(edition)).or_default();
        let mut seen: HashSet<String> = list.iter().cloned().collect();
        let before = list.len();
        for id in ids {
            if seen.insert(id.clone()) {
                list.push(id);
            }
        }
        list.len() - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn atomic_write_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_json_atomic(&path, &json!({"b": 1, "a": 2})).unwrap();
        write_json_atomic(&path, &json!({"a": 3})).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\n  \"a\": 3\n}\n");
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn read_json_opt_is_none_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<serde_json::Value> =
            read_json_opt(&dir.path().join("nope.json")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn match_cache_lists_sorted_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatchCache::new(dir.path());
        cache.store("EUW1_2", &json!({"metadata": {"matchId": "EUW1_2"}})).unwrap();
        cache.store("EUW1_1", &json!({"metadata": {"matchId": "EUW1_1"}})).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert!(cache.contains("EUW1_1"));
        assert!(!cache.contains("EUW1_3"));
        assert_eq!(cache.ids().unwrap(), vec!["EUW1_1", "EUW1_2"]);
    }

    #[test]
    fn load_matches_reports_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatchCache::new(dir.path());
        cache
            .store("EUW1_1", &json!({"metadata": {"matchId": "EUW1_1"}, "info": {"participants": []}}))
            .unwrap();
        fs::write(dir.path().join("EUW1_2.json"), "{not json").unwrap();
        fs::write(dir.path().join("EUW1_3.json"), r#"{"info": {"participants": "nope"}}"#).unwrap();

        let mut report = RunReport::default();
        let ids: Vec<String> = ["EUW1_1", "EUW1_2", "EUW1_3", "EUW1_4"].map(String::from).to_vec();
        let matches = cache.load_matches(&ids, &mut report).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "EUW1_1");
        let kinds: Vec<&str> = report.issues().iter().map(Issue::kind).collect();
        assert_eq!(kinds, ["malformed matches", "malformed matches", "missing matches"]);
    }

    #[test]
    fn cache_paths_cannot_escape_the_directory() {
        let cache = MatchCache::new("/tmp/cache");
        assert_eq!(cache.path_for("../x"), PathBuf::from("/tmp/cache/.._x.json"));
    }

    #[test]
    fn tournament_matches_merge_dedups_and_keeps_order() {
        let mut tm = TournamentMatches::default();
        assert_eq!(tm.merge(6, vec!["b".to_owned(), "a".to_owned(), "b".to_owned()]), 2);
        assert_eq!(tm.merge(6, vec!["a".to_owned(), "c".to_owned()]), 1);
        assert_eq!(tm.ids(6), ["b", "a", "c"]);
        assert!(tm.ids(7).is_empty());
    }

    #[test]
    fn tournament_matches_round_trip_by_edition_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tournament_matches.json");
        fs::write(&path, r#"{"edition_5": ["EUW1_9"]}"#).unwrap();

        let mut tm = TournamentMatches::load(&path).unwrap();
        assert_eq!(tm.ids(5), ["EUW1_9"]);
        tm.merge(6, vec!["EUW1_10".to_owned()]);
        tm.save(&path).unwrap();

        let again = TournamentMatches::load(&path).unwrap();
        assert_eq!(again, tm);
    }
}
