//! Processed per-edition JSON, shared by the API processor and the Excel importer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type StatMap = BTreeMap<String, Value>;

/// Team name used when a player has none.
pub const NO_TEAM: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Api,
    Excel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditionStats {
    pub edition: u32,
    pub source: Source,
    pub teams: BTreeMap<String, TeamRecord>,
    pub players: Vec<PlayerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<MatchSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg: Option<Aggregate>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub puuid_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    /// Canonical ids (or names, when unresolved) in roster order.
    pub roster: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: StatMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Canonical `name#tag`; `null` marks an identity still to be mapped.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub tag: String,
    pub team: String,
    pub role: String,
    #[serde(default)]
    pub stats: StatMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    /// Edition team on the winning side, when the index can tell.
    pub winning_team: Option<String>,
    /// Edition teams seen in the match, sorted.
    #[serde(default)]
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionCount {
    pub champion: String,
    pub count: u32,
    /// Percent, one decimal.
    pub winrate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanCount {
    pub champion_id: i64,
    pub count: u32,
}

/// Best single-game value for one stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub player: String,
    pub value: Value,
    pub champion: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub games: u32,
    pub most_played: Option<ChampionCount>,
    pub least_played: Option<ChampionCount>,
    /// Stat name → player holding the single-game best in this role.
    pub leaders: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub games: u32,
    pub most_played_champion: Option<ChampionCount>,
    pub least_played_champion: Option<ChampionCount>,
    pub most_banned_champion: Option<BanCount>,
    pub highlights: BTreeMap<String, Highlight>,
    pub per_role: BTreeMap<String, RoleSummary>,
    pub champion_counts: BTreeMap<String, u32>,
    pub ban_counts: BTreeMap<i64, u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn excel_shape_omits_api_only_sections() {
        let stats = EditionStats {
            edition: 6,
            source: Source::Excel,
            teams: BTreeMap::new(),
            players: vec![],
            matches: None,
            agg: None,
            puuid_map: BTreeMap::new(),
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value, json!({"edition": 6, "source": "excel", "teams": {}, "players": []}));
    }

    #[test]
    fn ban_counts_use_string_keys_in_json() {
        let agg = Aggregate { ban_counts: BTreeMap::from([(157, 2)]), ..Default::default() };
        let value = serde_json::to_value(&agg).unwrap();
        assert_eq!(value["ban_counts"], json!({"157": 2}));
        let back: Aggregate = serde_json::from_value(value).unwrap();
        assert_eq!(back, agg);
    }
}
