//! Cached match-v5 payloads → `match_stats_edition{N}.json`.

use crate::index::{PlayerEntry, TeamIndex};
use crate::model::{
    Aggregate, BanCount, ChampionCount, EditionStats, Highlight, MatchSummary, NO_TEAM, PlayerRecord,
    RoleSummary, Source, StatMap, TeamRecord,
};
use crate::resolver::PseudonymMapping;
use log::{debug, info};
use riot_api::{Match, Participant, Role, round_to};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Single-game stats tracked for highlights and per-role leaders, in output order.
const HIGHLIGHT_STATS: &[&str] = &["kills", "deaths", "assists", "cs", "kda", "cs_per_min", "vision"];


fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 { 0.0 } else { round_to(100.0 * part as f64 / whole as f64, 1) }
}

fn per_game(total: u32, games: u32) -> f64 {
    round_to(total as f64 / games.max(1) as f64, 2)
}

fn stat_value(p: &Participant, duration_secs: u64, stat: &str) -> f64 {
    match stat {
        "kills" => p.kills as f64,
        "deaths" => p.deaths as f64,
        "assists" => p.assists as f64,
        "cs" => p.cs as f64,
        "kda" => p.kda(2),
        "cs_per_min" => p.cs_per_min(duration_secs, 2),
        "vision" => p.vision_score as f64,
        _ => 0.0,
    }
}

fn json_number(stat: &str, value: f64) -> Value {
    if matches!(stat, "kda" | "cs_per_min") { Value::from(value) } else { Value::from(value as u64) }
}

// ---------------------------------------------------------------------------
// Participant identity
// ---------------------------------------------------------------------------

/// Who a participant is for this edition.
#[derive(Debug, Clone)]
struct Who {
    /// Canonical `name#tag` when known.
    id: Option<String>,
    name: String,
    tag: String,
    team: String,
    roster_role: String,
}

impl Who {
    fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    fn from_entry(entry: &PlayerEntry) -> Self {
        Who {
            id: Some(entry.riot_id.to_string()),
            name: entry.name.clone(),
            tag: entry.riot_id.tag_line.clone(),
            team: entry.team.clone(),
            roster_role: entry.role.clone(),
        }
    }
}

/// Match participants to edition players: PUUID first, then Riot ID, then the
/// pseudonym mapping. Strangers keep their own Riot ID and no team.
fn identify(p: &Participant, index: Option<&TeamIndex>, mapping: &PseudonymMapping) -> Who {
    if let Some(index) = index {
        if let Some(entry) = p.puuid.as_deref().and_then(|puuid| index.player_by_puuid(puuid)) {
            return Who::from_entry(entry);
        }
        if let Some(entry) = p.riot_id.as_ref().and_then(|r| index.player_by_riot_id(r)) {
            return Who::from_entry(entry);
        }
    }

    let mapped = mapping.lookup(&p.display_name).map(|e| e.riot_id.clone());
    if let (Some(index), Some(riot_id)) = (index, &mapped)
        && let Some(entry) = index.player_by_riot_id(riot_id)
    {
        return Who::from_entry(entry);
    }

    let riot_id = p.riot_id.clone().or(mapped);
    Who {
        id: riot_id.as_ref().map(ToString::to_string),
        name: riot_id.as_ref().map_or_else(|| p.display_name.clone(), |r| r.game_name.clone()),
        tag: riot_id.map(|r| r.tag_line).unwrap_or_default(),
        team: NO_TEAM.to_owned(),
        roster_role: String::new(),
    }
}

// ---------------------------------------------------------------------------
// Rollups
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PlayerTally {
    who: Option<Who>,
    games: u32,
    wins: u32,
    kills: u32,
    deaths: u32,
    assists: u32,
    cs: u32,
    vision: u32,
    seconds: u64,
    champions: BTreeMap<String, u32>,
    roles: BTreeMap<Role, u32>,
}

impl PlayerTally {
    fn add(&mut self, p: &Participant, duration_secs: u64) {
        self.games += 1;
        self.wins += u32::from(p.win);
        self.kills += p.kills;
        self.deaths += p.deaths;
        self.assists += p.assists;
        self.cs += p.cs;
        self.vision += p.vision_score;
        self.seconds += duration_secs;
        if let Some(champion) = &p.champion {
            *self.champions.entry(champion.clone()).or_default() += 1;
        }
        if let Some(role) = p.role {
            *self.roles.entry(role).or_default() += 1;
        }
    }

    fn stats(&self) -> StatMap {
        let minutes = (self.seconds as f64 / 60.0).max(1.0 / 60.0);
        let kda = (self.kills + self.assists) as f64 / self.deaths.max(1) as f64;
        let champions: serde_json::Map<String, Value> =
            self.champions.iter().map(|(c, n)| (c.clone(), Value::from(*n))).collect();

        StatMap::from([
            ("games".to_owned(), Value::from(self.games)),
            ("wins".to_owned(), Value::from(self.wins)),
            ("losses".to_owned(), Value::from(self.games - self.wins)),
            ("winrate".to_owned(), Value::from(percent(self.wins, self.games))),
            ("kills".to_owned(), Value::from(self.kills)),
            ("deaths".to_owned(), Value::from(self.deaths)),
            ("assists".to_owned(), Value::from(self.assists)),
            ("kills_per_game".to_owned(), Value::from(per_game(self.kills, self.games))),
            ("deaths_per_game".to_owned(), Value::from(per_game(self.deaths, self.games))),
            ("assists_per_game".to_owned(), Value::from(per_game(self.assists, self.games))),
            ("kda".to_owned(), Value::from(round_to(kda, 2))),
            ("cs_per_min".to_owned(), Value::from(round_to(self.cs as f64 / minutes, 2))),
            ("vision_per_game".to_owned(), Value::from(per_game(self.vision, self.games))),
            ("champions".to_owned(), Value::Object(champions)),
        ])
    }

    /// Roster role when the index has one, else the role played most.
    fn role(&self, who: &Who) -> String {
        if !who.roster_role.is_empty() {
            return who.roster_role.clone();
        }
        let most = self.roles.iter().max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)));
        most.map(|(role, _)| role.label().to_owned()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct TeamTally {
    matches: u32,
    wins: u32,
    kills: u32,
    deaths: u32,
    assists: u32,
    durations: Vec<u64>,
}

impl TeamTally {
    fn stats(&self) -> StatMap {
        let mut stats = StatMap::from([
            ("matches".to_owned(), Value::from(self.matches)),
            ("wins".to_owned(), Value::from(self.wins)),
            ("losses".to_owned(), Value::from(self.matches - self.wins)),
            ("winrate".to_owned(), Value::from(percent(self.wins, self.matches))),
            ("kills".to_owned(), Value::from(self.kills)),
            ("deaths".to_owned(), Value::from(self.deaths)),
            ("assists".to_owned(), Value::from(self.assists)),
        ]);
        if let (Some(min), Some(max)) = (self.durations.iter().min(), self.durations.iter().max()) {
            let avg = self.durations.iter().sum::<u64>() as f64 / self.durations.len() as f64;
            stats.insert("avg_duration".to_owned(), Value::from(avg.round() as u64));
            stats.insert("min_duration".to_owned(), Value::from(*min));
            stats.insert("max_duration".to_owned(), Value::from(*max));
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ChampionTally {
    counts: BTreeMap<String, u32>,
    wins: BTreeMap<String, u32>,
}

impl ChampionTally {
    fn add(&mut self, p: &Participant) {
        if let Some(champion) = &p.champion {
            *self.counts.entry(champion.clone()).or_default() += 1;
            *self.wins.entry(champion.clone()).or_default() += u32::from(p.win);
        }
    }

    fn entry(&self, champion: &str, count: u32) -> ChampionCount {
        let wins = self.wins.get(champion).copied().unwrap_or(0);
        ChampionCount { champion: champion.to_owned(), count, winrate: percent(wins, count) }
    }

    /// Highest count; alphabetical on ties.
    fn most_played(&self) -> Option<ChampionCount> {
        let mut best: Option<(&String, u32)> = None;
        for (champion, &count) in &self.counts {
            if best.is_none_or(|(_, n)| count > n) {
                best = Some((champion, count));
            }
        }
        best.map(|(c, n)| self.entry(c, n))
    }

    /// Lowest count; alphabetical on ties.
    fn least_played(&self) -> Option<ChampionCount> {
        let mut best: Option<(&String, u32)> = None;
        for (champion, &count) in &self.counts {
            if best.is_none_or(|(_, n)| count < n) {
                best = Some((champion, count));
            }
        }
        best.map(|(c, n)| self.entry(c, n))
    }
}

/// Running single-game best per stat. The first game to reach a value keeps it.
#[derive(Debug, Default)]
struct Bests {
    best: BTreeMap<&'static str, (f64, Highlight)>,
}

impl Bests {
    fn consider(&mut self, stats: &[&'static str], who: &Who, p: &Participant, duration_secs: u64) {
        for &stat in stats {
            let value = stat_value(p, duration_secs, stat);
            if self.best.get(stat).is_some_and(|(best, _)| value <= *best) {
                continue;
            }
            let highlight = Highlight {
                player: who.key().to_owned(),
                value: json_number(stat, value),
                champion: p.champion.clone(),
                role: p.role.map(|r| r.label().to_owned()),
            };
            self.best.insert(stat, (value, highlight));
        }
    }

    fn into_highlights(self) -> BTreeMap<String, Highlight> {
        self.best.into_iter().map(|(stat, (_, h))| (stat.to_owned(), h)).collect()
    }

    fn into_leaders(self) -> BTreeMap<String, String> {
        self.best.into_iter().map(|(stat, (_, h))| (stat.to_owned(), h.player)).collect()
    }
}

#[derive(Debug, Default)]
struct RoleTally {
    games: u32,
    champions: ChampionTally,
    leaders: Bests,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Fold an edition's matches into its processed stats. The result depends
/// only on the inputs, so a rerun over the same cache is byte-identical.
pub fn process_edition(
    edition: u32,
    mut matches: Vec<Match>,
    index: Option<&TeamIndex>,
    mapping: &PseudonymMapping,
) -> EditionStats {
    matches.sort_by(|a, b| (a.started_at, &a.id).cmp(&(b.started_at, &b.id)));

    let mut players: BTreeMap<String, PlayerTally> = BTreeMap::new();
    let mut teams: BTreeMap<String, TeamTally> = BTreeMap::new();
    let mut champions = ChampionTally::default();
    let mut ban_counts: BTreeMap<i64, u32> = BTreeMap::new();
    let mut bests = Bests::default();
    let mut roles: BTreeMap<Role, RoleTally> = Role::ALL.into_iter().map(|r| (r, RoleTally::default())).collect();
    let mut puuid_map = BTreeMap::new();
    let mut summaries = Vec::with_capacity(matches.len());

    for m in &matches {
        let mut match_teams: BTreeMap<String, TeamTally> = BTreeMap::new();
        let mut winners = BTreeSet::new();

        for p in &m.participants {
            let who = identify(p, index, mapping);
            if let Some(puuid) = &p.puuid {
                puuid_map.insert(puuid.clone(), p.display_name.clone());
            }

            let tally = players.entry(who.key().to_owned()).or_default();
            tally.add(p, m.duration_secs);
            champions.add(p);
            bests.consider(HIGHLIGHT_STATS, &who, p, m.duration_secs);
            if let Some(role) = p.role.and_then(|r| roles.get_mut(&r)) {
                role.games += 1;
                role.champions.add(p);
                role.leaders.consider(HIGHLIGHT_STATS, &who, p, m.duration_secs);
            }

            if who.team != NO_TEAM {
                let team = match_teams.entry(who.team.clone()).or_default();
                team.kills += p.kills;
                team.deaths += p.deaths;
                team.assists += p.assists;
                if p.win {
                    team.wins = 1;
                    winners.insert(who.team.clone());
                }
            }
            tally.who.get_or_insert(who);
        }

        for ban in m.bans.iter().filter(|&&b| b >= 0) {
            *ban_counts.entry(*ban).or_default() += 1;
        }

        for (name, game) in &match_teams {
            let team = teams.entry(name.clone()).or_default();
            team.matches += 1;
            team.wins += game.wins;
            team.kills += game.kills;
            team.deaths += game.deaths;
            team.assists += game.assists;
            team.durations.push(m.duration_secs);
        }

        let winning_team = if winners.len() == 1 { winners.pop_first() } else { None };
        if winning_team.is_none() && !match_teams.is_empty() {
            debug!("match {}: winner not attributable to one edition team", m.id);
        }
        summaries.push(MatchSummary {
            id: m.id.clone(),
            started_at: m.started_at,
            duration_secs: m.duration_secs,
            winning_team,
            teams: match_teams.into_keys().collect(),
        });
    }

    let most_banned_champion = ban_counts
        .iter()
        .fold(None::<BanCount>, |best, (&champion_id, &count)| match best {
            Some(b) if b.count >= count => Some(b),
            _ => Some(BanCount { champion_id, count }),
        });

    let agg = Aggregate {
        games: matches.len() as u32,
        most_played_champion: champions.most_played(),
        least_played_champion: champions.least_played(),
        most_banned_champion,
        highlights: bests.into_highlights(),
        per_role: roles
            .into_iter()
            .map(|(role, t)| {
                let summary = RoleSummary {
                    games: t.games,
                    most_played: t.champions.most_played(),
                    least_played: t.champions.least_played(),
                    leaders: t.leaders.into_leaders(),
                };
                (role.label().to_owned(), summary)
            })
            .collect(),
        champion_counts: champions.counts,
        ban_counts,
    };

    let mut records: Vec<PlayerRecord> = players
        .values()
        .filter_map(|tally| {
            let who = tally.who.as_ref()?;
            Some(PlayerRecord {
                id: who.id.clone(),
                name: who.name.clone(),
                tag: who.tag.clone(),
                team: who.team.clone(),
                role: tally.role(who),
                stats: tally.stats(),
            })
        })
        .collect();
    let sort_key = |r: &PlayerRecord| (r.team.clone(), r.id.clone().unwrap_or_else(|| r.name.clone()));
    records.sort_by_key(sort_key);

    let mut team_records: BTreeMap<String, TeamRecord> = BTreeMap::new();
    if let Some(index) = index {
        for (team, roster) in &index.teams {
            team_records.entry(team.clone()).or_default().roster = roster.clone();
        }
    }
    for record in records.iter().filter(|r| r.team != NO_TEAM) {
        let key = record.id.clone().unwrap_or_else(|| record.name.clone());
        let roster = &mut team_records.entry(record.team.clone()).or_default().roster;
        if !roster.contains(&key) {
            roster.push(key);
        }
    }
    for (team, tally) in &teams {
        team_records.entry(team.clone()).or_default().stats = tally.stats();
    }

    info!(
        "edition {edition}: {} matches, {} players, {} teams",
        summaries.len(),
        records.len(),
        team_records.len()
    );

    EditionStats {
        edition,
        source: Source::Api,
        teams: team_records,
        players: records,
        matches: Some(summaries),
        agg: Some(agg),
        puuid_map,
    }
}
