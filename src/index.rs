use crate::model::NO_TEAM;
use crate::report::Issue;
use log::info;
use riot_api::RiotId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// Input: teams_with_puuid_edition{N}.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedVia {
    Cache,
    Mapping,
    AccountV1,
    SummonerV4,
}

/// A roster slot after identity resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPlayer {
    /// Pseudonym as the organisers typed it.
    pub name: String,
    #[serde(default)]
    pub role: String,
    pub riot_id: Option<RiotId>,
    pub puuid: Option<String>,
    pub resolved_via: Option<ResolvedVia>,
}

/// Team → roster slots, in sheet order.
pub type TeamAssignments = BTreeMap<String, Vec<ResolvedPlayer>>;

// ---------------------------------------------------------------------------
// Output: team_index_edition{N}.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub riot_id: RiotId,
    pub name: String,
    pub team: String,
    pub role: String,
    pub puuid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamIndex {
    pub edition: u32,
    /// Team → canonical ids, roster order.
    pub teams: BTreeMap<String, Vec<String>>,
    pub players: BTreeMap<String, PlayerEntry>,
    pub player_team: BTreeMap<String, String>,
    pub puuid_player: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexError {
    DuplicatePlayer { player: String, first_team: String, second_team: String },
    DuplicatePuuid { puuid: String, first: String, second: String },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::DuplicatePlayer { player, first_team, second_team } => write!(
                f,
                "{player} is on two rosters: {first_team} and {second_team}"
            ),
            IndexError::DuplicatePuuid { first, second, .. } => {
                write!(f, "{first} and {second} share one PUUID")
            }
        }
    }
}

impl std::error::Error for IndexError {}

impl TeamIndex {
    /// Build the edition index. Rosters must be disjoint; players without a
    /// Riot ID are left out and reported.
    pub fn build(edition: u32, assignments: &TeamAssignments) -> Result<(Self, Vec<Issue>), IndexError> {
        let mut index = TeamIndex { edition, ..Default::default() };
        let mut issues = Vec::new();
        // Riot ID key → canonical id, for case-insensitive duplicate checks.
        let mut seen: HashMap<String, String> = HashMap::new();

        for (team, players) in assignments {
            let team = if team.trim().is_empty() { NO_TEAM.to_owned() } else { team.trim().to_owned() };
            let roster = index.teams.entry(team.clone()).or_default();

            for player in players {
                let Some(riot_id) = &player.riot_id else {
                    issues.push(Issue::unresolved(&player.name, format!("no Riot ID for {team}")));
                    continue;
                };

                if let Some(existing) = seen.get(&riot_id.key()) {
                    let first_team = &index.player_team[existing];
                    if *first_team == team {
                        continue;
                    }
                    return Err(IndexError::DuplicatePlayer {
                        player: riot_id.to_string(),
                        first_team: first_team.clone(),
                        second_team: team,
                    });
                }

                let id = riot_id.to_string();
                if let Some(puuid) = &player.puuid {
                    if let Some(other) = index.puuid_player.get(puuid) {
                        return Err(IndexError::DuplicatePuuid {
                            puuid: puuid.clone(),
                            first: other.clone(),
                            second: id,
                        });
                    }
                    index.puuid_player.insert(puuid.clone(), id.clone());
                }

                seen.insert(riot_id.key(), id.clone());
                roster.push(id.clone());
                index.player_team.insert(id.clone(), team.clone());
                index.players.insert(
                    id,
                    PlayerEntry {
                        riot_id: riot_id.clone(),
                        name: player.name.clone(),
                        team: team.clone(),
                        role: player.role.clone(),
                        puuid: player.puuid.clone(),
                    },
                );
            }
        }

        info!(
            "edition {edition}: {} teams, {} players indexed",
            index.teams.len(),
            index.players.len()
        );
        Ok((index, issues))
    }

    pub fn player_by_puuid(&self, puuid: &str) -> Option<&PlayerEntry> {
        self.puuid_player.get(puuid).and_then(|id| self.players.get(id))
    }

    pub fn player_by_riot_id(&self, riot_id: &RiotId) -> Option<&PlayerEntry> {
        let key = riot_id.key();
        self.players.values().find(|p| p.riot_id.key() == key)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str, riot: Option<&str>, puuid: Option<&str>) -> ResolvedPlayer {
        ResolvedPlayer {
            name: name.into(),
            role: "Top".into(),
            riot_id: riot.map(|r| r.parse().unwrap()),
            puuid: puuid.map(Into::into),
            resolved_via: puuid.map(|_| ResolvedVia::Cache),
        }
    }

    #[test]
    fn builds_both_directions_of_the_index() {
        let assignments = TeamAssignments::from([
            ("Les Loups".into(), vec![player("Alpha", Some("Alpha#EUW"), Some("p-a")), player("Zeta", None, None)]),
            ("".into(), vec![player("Solo", Some("Solo#FR"), None)]),
        ]);
        let (index, issues) = TeamIndex::build(6, &assignments).unwrap();

        assert_eq!(index.teams["Les Loups"], ["Alpha#EUW"]);
        assert_eq!(index.teams[NO_TEAM], ["Solo#FR"]);
        assert_eq!(index.player_team["Solo#FR"], NO_TEAM);
        assert_eq!(index.player_by_puuid("p-a").map(|p| p.name.as_str()), Some("Alpha"));
        assert_eq!(
            index.player_by_riot_id(&RiotId::new("alpha", "euw")).map(|p| p.team.as_str()),
            Some("Les Loups")
        );
        assert_eq!(issues, vec![Issue::unresolved("Zeta", "no Riot ID for Les Loups")]);
    }

    #[test]
    fn player_on_two_rosters_fails_the_build() {
        let assignments = TeamAssignments::from([
            ("A".into(), vec![player("Alpha", Some("Alpha#EUW"), None)]),
            ("B".into(), vec![player("alpha", Some("ALPHA#euw"), None)]),
        ]);
        let err = TeamIndex::build(6, &assignments).unwrap_err();
        assert_eq!(
            err,
            IndexError::DuplicatePlayer {
                player: "ALPHA#euw".into(),
                first_team: "A".into(),
                second_team: "B".into(),
            }
        );
        assert!(err.to_string().contains("A and B"));
    }

    #[test]
    fn repeated_slot_within_a_team_is_kept_once() {
        let assignments = TeamAssignments::from([(
            "A".into(),
            vec![player("Alpha", Some("Alpha#EUW"), None), player("Alpha sub", Some("alpha#EUW"), None)],
        )]);
        let (index, _) = TeamIndex::build(6, &assignments).unwrap();
        assert_eq!(index.teams["A"].len(), 1);
    }

    #[test]
    fn shared_puuid_fails_the_build() {
        let assignments = TeamAssignments::from([(
            "A".into(),
            vec![player("One", Some("One#EUW"), Some("p-1")), player("Two", Some("Two#EUW"), Some("p-1"))],
        )]);
        assert!(matches!(
            TeamIndex::build(6, &assignments),
            Err(IndexError::DuplicatePuuid { .. })
        ));
    }
}
