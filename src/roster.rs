//! Organisers' "OPGG Adversaires" sheet export and the roster table built from it.
//!
//! The export is a column of blocks, one per team:
//!
//! ```text
//! Equipe,     <team name>
//! Lien multi, <op.gg multi-search link>
//! Role,       Top, Jungle, Mid, Adc, Supp
//! Pseudo,     <five pseudonyms>
//! Elo,        <five ranks>
//! Main champ, <five champions>
//! ```
//!
//! Merged cells come out empty and a substitute pair is typed as `A / B` in
//! every slot the pair covers.

use crate::normalize::{alias_key, compact_key, label_slug};
use crate::report::Issue;
use crate::store;
use anyhow::{Context, anyhow};
use log::debug;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

const SLOTS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpggPlayer {
    pub role: String,
    pub pseudo: String,
    pub elo_raw: String,
    pub elo: String,
    pub main_champion: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpggTeam {
    pub name: String,
    pub multi_link: String,
    pub players: Vec<OpggPlayer>,
}

/// One row of `team_riot_ids_edition{N}.csv`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterRow {
    #[serde(rename = "Equipe")]
    pub team: String,
    #[serde(rename = "Position", default)]
    pub position: String,
    #[serde(rename = "Pseudo", default)]
    pub pseudo: String,
    #[serde(rename = "RiotName")]
    pub riot_name: String,
    #[serde(rename = "RiotTag", default)]
    pub riot_tag: String,
    #[serde(rename = "Elo", default)]
    pub elo: String,
    #[serde(rename = "EloRaw", default)]
    pub elo_raw: String,
    #[serde(rename = "MainChamp", default)]
    pub main_champion: String,
}

impl RosterRow {
    /// Name the organisers know this player by.
    pub fn alias(&self) -> &str {
        if self.pseudo.trim().is_empty() { &self.riot_name } else { &self.pseudo }
    }
}

/// An account listed in a multi-search link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAccount {
    pub name: String,
    pub tag: String,
}

#[derive(Default)]
struct Block {
    team: String,
    link: String,
    roles: Vec<String>,
    pseudos: Vec<String>,
    elos: Vec<String>,
    mains: Vec<String>,
}

impl Block {
    fn finish(mut self, split: bool) -> OpggTeam {
        for list in [&mut self.roles, &mut self.pseudos, &mut self.elos, &mut self.mains] {
            list.resize(SLOTS, String::new());
        }
        if split {
            split_alternates(&mut self.pseudos);
        }

        let players = (0..SLOTS)
            .filter(|&i| !self.pseudos[i].is_empty())
            .map(|i| OpggPlayer {
                role: self.roles[i].clone(),
                pseudo: self.pseudos[i].clone(),
                elo_raw: self.elos[i].clone(),
                elo: normalize_elo(&self.elos[i]),
                main_champion: self.mains[i].clone(),
            })
            .collect();

        OpggTeam { name: self.team, multi_link: self.link, players }
    }
}

pub fn parse_opgg_csv<R: Read>(reader: R, split: bool) -> anyhow::Result<Vec<OpggTeam>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut teams = Vec::new();
    let mut current: Option<Block> = None;

    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("reading roster CSV line {}", line + 1))?;
        let row: Vec<String> = record.iter().map(|c| c.trim().to_owned()).collect();
        let label = row.first().map(|c| label_slug(c)).unwrap_or_default();
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        let slots = || (1..=SLOTS).map(cell).collect::<Vec<_>>();

        if label.starts_with("equipe") {
            if let Some(block) = current.take() {
                teams.push(block.finish(split));
            }
            current = Some(Block { team: cell(1), ..Default::default() });
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };
        if label.starts_with("lien") {
            block.link = cell(1);
        } else if label.starts_with("role") {
            block.roles = slots();
        } else if label.starts_with("pseudo") {
            block.pseudos = slots();
        } else if label.starts_with("elo") {
            block.elos = slots();
        } else if label.starts_with("main") {
            block.mains = slots();
        }
    }
    if let Some(block) = current.take() {
        teams.push(block.finish(split));
    }

    debug!("parsed {} team blocks", teams.len());
    Ok(teams)
}

/// Spread `A / B` entries over the slots they were typed into: the first
/// occurrence gets `A`, the second `B`. A lone `A / B` keeps `A`.
pub fn split_alternates(pseudos: &mut [String]) {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, value) in pseudos.iter().enumerate() {
        if !value.contains('/') {
            continue;
        }
        match groups.iter_mut().find(|(v, _)| v == value) {
            Some((_, slots)) => slots.push(i),
            None => groups.push((value.clone(), vec![i])),
        }
    }

    for (value, slots) in groups {
        let parts: Vec<&str> = value.split('/').map(str::trim).filter(|p| !p.is_empty()).collect();
        let Some(first) = parts.first().copied() else {
            continue;
        };
        for (k, &slot) in slots.iter().enumerate() {
            pseudos[slot] = parts.get(k).copied().unwrap_or(first).to_owned();
        }
    }
}

/// Coarse rank bucket from a hand-typed rank ("Gold 2", "d1", "Platine", …).
pub fn normalize_elo(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let s = raw.to_lowercase();
    let bucket = if s.contains("challenger") {
        "Challenger"
    } else if s.contains("grandmaster") {
        "Grandmaster"
    } else if s.contains("master") {
        "Master"
    } else if s.contains("diamond") || s.contains("diamant") || (s.starts_with('d') && s.len() <= 3) {
        "Diamond"
    } else if s.contains("emerald") || s.contains("emeraude") || (s.starts_with('e') && s.len() <= 3) {
        "Emerald"
    } else if s.contains("plat") || s.starts_with('p') {
        "Platinum"
    } else if s.contains("gold") {
        "Gold"
    } else if s.contains("silver") || s.contains("argent") {
        "Silver"
    } else if s.contains("bronze") || s == "b" {
        "Bronze"
    } else if s.contains("iron") || s.contains("fer") {
        "Iron"
    } else if s.contains("or") {
        "Gold"
    } else {
        return raw.to_owned();
    };
    bucket.to_owned()
}

/// Accounts listed in an op.gg multi-search link, deduplicated in order.
pub fn parse_multi_link(link: &str) -> Vec<LinkedAccount> {
    let link = link.trim();
    if link.is_empty() {
        return Vec::new();
    }
    let url = Url::parse(link).or_else(|_| Url::parse(&format!("https://{link}")));
    let Ok(url) = url else {
        return Vec::new();
    };

    let mut blobs = summoner_params(&url);
    if blobs.is_empty()
        && let Some(fragment) = url.fragment()
        && let Some(at) = fragment.find("summoners=")
    {
        let mut scratch = url.clone();
        scratch.set_fragment(None);
        scratch.set_query(Some(&fragment[at..]));
        blobs = summoner_params(&scratch);
    }

    let mut seen = HashSet::new();
    let mut accounts = Vec::new();
    for blob in blobs {
        for token in blob.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (name, tag) = token.split_once('#').unwrap_or((token, ""));
            let name = strip_region_suffix(name.trim());
            let tag = tag.trim();
            if name.is_empty() {
                continue;
            }
            if seen.insert((name.to_lowercase(), tag.to_lowercase())) {
                accounts.push(LinkedAccount { name: name.to_owned(), tag: tag.to_owned() });
            }
        }
    }
    accounts
}

fn summoner_params(url: &Url) -> Vec<String> {
    url.query_pairs()
        .filter(|(k, _)| k == "summoners" || k == "summoner")
        .map(|(_, v)| v.into_owned())
        .collect()
}

/// Old op.gg links append `-EUW` to names without a tag.
fn strip_region_suffix(name: &str) -> &str {
    let trimmed = name.trim_end();
    let cut = trimmed.len().saturating_sub(4);
    match trimmed.get(cut..) {
        Some(suffix) if suffix.eq_ignore_ascii_case("-euw") => trimmed[..cut].trim_end(),
        _ => trimmed,
    }
}

/// Match each pseudonym against its team's multi-search link.
///
/// Exact alias key first, then ignoring spaces, then substring either way.
/// Pseudonyms with no account in the link keep their name, get no tag, and
/// are reported.
pub fn build_roster(teams: &[OpggTeam]) -> (Vec<RosterRow>, Vec<Issue>) {
    let mut rows = Vec::new();
    let mut issues = Vec::new();

    for team in teams {
        let accounts: Vec<(String, LinkedAccount)> = parse_multi_link(&team.multi_link)
            .into_iter()
            .map(|a| (alias_key(&a.name), a))
            .collect();

        for player in &team.players {
            let key = alias_key(&player.pseudo);
            let compact = compact_key(&key);
            let found = accounts
                .iter()
                .find(|(k, _)| *k == key)
                .or_else(|| accounts.iter().find(|(k, _)| compact_key(k) == compact))
                .or_else(|| {
                    accounts.iter().find(|(k, _)| {
                        !key.is_empty() && !k.is_empty() && (k.contains(&key) || key.contains(k.as_str()))
                    })
                })
                .map(|(_, account)| account);

            let (riot_name, riot_tag) = match found {
                Some(account) => (account.name.clone(), account.tag.clone()),
                None => {
                    issues.push(Issue::unresolved(
                        &player.pseudo,
                        format!("not in the multi-search link of {}", team.name),
                    ));
                    (player.pseudo.clone(), String::new())
                }
            };

            rows.push(RosterRow {
                team: team.name.clone(),
                position: player.role.clone(),
                pseudo: player.pseudo.clone(),
                riot_name,
                riot_tag,
                elo: player.elo.clone(),
                elo_raw: player.elo_raw.clone(),
                main_champion: player.main_champion.clone(),
            });
        }
    }
    (rows, issues)
}

pub fn read_roster_csv(path: &Path) -> anyhow::Result<Vec<RosterRow>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, row) in rdr.deserialize::<RosterRow>().enumerate() {
        // +2: one for the header, one for 1-based numbering.
        let row = row.with_context(|| format!("{} line {}", path.display(), i + 2))?;
        if row.riot_name.trim().is_empty() && row.pseudo.trim().is_empty() {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_roster_csv(path: &Path, rows: &[RosterRow]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow!("flushing roster CSV: {}", e.error()))?;
    store::write_bytes_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Equipe,Les Loups,,,,
Lien multi,https://www.op.gg/multisearch/euw?summoners=Alpha%23EUW%2CBeta%20Max%231234%2CGamma%23EUW%2CDelta-EUW%2CEpsi%23FR,,,,
Role,Top,Jungle,Mid,Adc,Supp
Pseudo,Alpha,betamax,Gamma / Zeta,Gamma / Zeta,Epsi
Elo,Gold 2,d1,Platine,argent,
Main champ,Garen,Vi,Ahri,Jinx,Thresh
,,,,,
Équipe,Solo Team
Role,Top
Pseudo,Lonely
";

    #[test]
    fn parses_team_blocks_and_splits_alternates() {
        let teams = parse_opgg_csv(SAMPLE.as_bytes(), true).unwrap();
        assert_eq!(teams.len(), 2);

        let loups = &teams[0];
        assert_eq!(loups.name, "Les Loups");
        let pseudos: Vec<&str> = loups.players.iter().map(|p| p.pseudo.as_str()).collect();
        assert_eq!(pseudos, ["Alpha", "betamax", "Gamma", "Zeta", "Epsi"]);
        let elos: Vec<&str> = loups.players.iter().map(|p| p.elo.as_str()).collect();
        assert_eq!(elos, ["Gold", "Diamond", "Platinum", "Silver", ""]);
        assert_eq!(loups.players[4].main_champion, "Thresh");

        assert_eq!(teams[1].name, "Solo Team");
        assert_eq!(teams[1].players.len(), 1);
        assert_eq!(teams[1].players[0].role, "Top");
    }

    #[test]
    fn alternates_stay_combined_when_splitting_is_off() {
        let teams = parse_opgg_csv(SAMPLE.as_bytes(), false).unwrap();
        assert_eq!(teams[0].players[2].pseudo, "Gamma / Zeta");
    }

    #[test]
    fn lone_alternate_keeps_first_name() {
        let mut pseudos = vec!["A / B".to_owned(), "C".to_owned()];
        split_alternates(&mut pseudos);
        assert_eq!(pseudos, ["A", "C"]);
    }

    #[test]
    fn multi_link_decodes_names_and_tags() {
        let accounts = parse_multi_link(
            "https://www.op.gg/multisearch/euw?summoners=Beta%20Max%231234%2Cbeta+max%231234%2CDelta-EUW",
        );
        assert_eq!(
            accounts,
            vec![
                LinkedAccount { name: "Beta Max".into(), tag: "1234".into() },
                LinkedAccount { name: "Delta".into(), tag: "".into() },
            ]
        );
    }

    #[test]
    fn multi_link_accepts_missing_scheme_and_garbage() {
        assert_eq!(parse_multi_link("op.gg/multisearch/euw?summoners=Solo%23EUW").len(), 1);
        assert!(parse_multi_link("").is_empty());
        assert!(parse_multi_link("https://op.gg/").is_empty());
    }

    #[test]
    fn roster_matches_pseudos_to_link_accounts() {
        let teams = parse_opgg_csv(SAMPLE.as_bytes(), true).unwrap();
        let (rows, issues) = build_roster(&teams);

        let ids: Vec<(String, String)> =
            rows.iter().map(|r| (r.riot_name.clone(), r.riot_tag.clone())).collect();
        assert_eq!(
            ids,
            vec![
                ("Alpha".into(), "EUW".into()),
                ("Beta Max".into(), "1234".into()),
                ("Gamma".into(), "EUW".into()),
                ("Zeta".into(), "".into()),
                ("Epsi".into(), "FR".into()),
                ("Lonely".into(), "".into()),
            ]
        );
        assert_eq!(issues.len(), 2);
        assert!(matches!(&issues[0], Issue::Unresolved { alias, .. } if alias == "Zeta"));
    }

    #[test]
    fn roster_csv_tolerates_missing_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team_riot_ids_edition6.csv");
        std::fs::write(&path, "Equipe,Position,RiotName\nLes Loups,Top,Alpha\n,,\n").unwrap();

        let rows = read_roster_csv(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alias(), "Alpha");
        assert_eq!(rows[0].riot_tag, "");

        write_roster_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Equipe,Position,Pseudo,RiotName,RiotTag,Elo,EloRaw,MainChamp\nLes Loups,Top,,Alpha,,,,\n"
        );
    }

    #[test]
    fn roster_keeps_rank_and_main_champion() {
        let teams = parse_opgg_csv(SAMPLE.as_bytes(), true).unwrap();
        let (rows, _) = build_roster(&teams);
        assert_eq!(rows[1].elo, "Diamond");
        assert_eq!(rows[1].elo_raw, "d1");
        assert_eq!(rows[1].main_champion, "Vi");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team_riot_ids_edition6.csv");
        write_roster_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Les Loups,Jungle,betamax,Beta Max,1234,Diamond,d1,Vi\n"));
        assert_eq!(read_roster_csv(&path).unwrap(), rows);
    }
}
