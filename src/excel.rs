//! Organiser spreadsheets → `excel_stats_edition{N}.json`.
//!
//! Two layouts are understood. A flat sheet with one row per player and
//! team/position/name(/tag) columns, every other column kept as a stat. And,
//! when no sheet is flat, one sheet per team holding a summary block above a
//! `Joueur` table.

use crate::model::{EditionStats, NO_TEAM, PlayerRecord, Source, StatMap, TeamRecord};
use crate::normalize::{alias_key, header_slug, label_slug};
use crate::report::Issue;
use crate::resolver::{PseudonymMapping, Resolution};
use anyhow::Context;
use calamine::{Data, Range, Reader, open_workbook_auto};
use log::{debug, info};
use riot_api::Role;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

const TEAM_HEADERS: &[&str] = &[
    "equipe", "equipes", "equipee", "equipe1", "team", "teams", "eqp", "equipejoueur",
    "equipejoueurs", "equipejoueuse", "club", "clubname", "teamname", "nomequipe",
    "nomdeequipe", "nomdelequipe", "equipenom", "equipesnom",
];
const POSITION_HEADERS: &[&str] = &["position", "poste", "role", "lane", "pos"];
const NAME_HEADERS: &[&str] = &[
    "riotname", "name", "player", "pseudo", "summoner", "summonername", "riotid", "gamename",
    "riotgamename", "riotidgamename",
];
const TAG_HEADERS: &[&str] = &["riottag", "tag", "tagline", "riottagline", "hashtag"];

/// Sheets that summarise the whole event rather than one team.
const SUMMARY_SHEETS: &[&str] = &["records", "recap", "sommaire", "summary"];
/// How far down a team sheet the `Joueur` header may sit.
const HEADER_SCAN_ROWS: usize = 60;
/// How many rows above the header hold the team summary.
const SUMMARY_SCAN_ROWS: usize = 20;

#[derive(Debug)]
pub enum ExcelError {
    NoStatsSheet { sheets: Vec<String> },
}

impl fmt::Display for ExcelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExcelError::NoStatsSheet { sheets } => write!(
                f,
                "no sheet has team/position/name columns or a \"Joueur\" table (sheets: {})",
                sheets.join(", ")
            ),
        }
    }
}

impl std::error::Error for ExcelError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Team,
    Position,
    Name,
    Tag,
}

fn classify(header: &str) -> Option<Column> {
    let slug = header_slug(header);
    if TEAM_HEADERS.contains(&slug.as_str()) {
        Some(Column::Team)
    } else if POSITION_HEADERS.contains(&slug.as_str()) {
        Some(Column::Position)
    } else if NAME_HEADERS.contains(&slug.as_str()) {
        Some(Column::Name)
    } else if TAG_HEADERS.contains(&slug.as_str()) {
        Some(Column::Tag)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Cell helpers
// ---------------------------------------------------------------------------

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        None | Some(Data::Empty) | Some(Data::Error(_)) => String::new(),
        Some(Data::String(s)) => s.trim().to_owned(),
        Some(Data::Float(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Some(other) => other.to_string().trim().to_owned(),
    }
}

/// JSON value for a stat cell. Whole floats become integers; blanks and
/// spreadsheet errors are skipped.
fn cell_value(cell: Option<&Data>) -> Option<Value> {
    match cell? {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| Value::String(s.to_owned()))
        }
        Data::Int(i) => Some(Value::from(*i)),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(Value::from(*f as i64)),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
        Data::Bool(b) => Some(Value::Bool(*b)),
        other => Some(Value::String(other.to_string())),
    }
}

fn is_blank_row(row: &[Data]) -> bool {
    row.iter().all(|c| cell_text(Some(c)).is_empty())
}

/// 0-based row of the range's first line within the sheet.
fn first_row(range: &Range<Data>) -> usize {
    range.start().map(|(row, _)| row as usize).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Import every sheet of the workbook at `path`.
pub fn import_workbook(
    path: &Path,
    edition: u32,
    mapping: &PseudonymMapping,
) -> anyhow::Result<(EditionStats, Vec<Issue>)> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("opening workbook {}", path.display()))?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .with_context(|| format!("reading sheet {name:?} of {}", path.display()))?;
        sheets.push((name, range));
    }
    Ok(import_sheets(edition, &sheets, mapping)?)
}

pub fn import_sheets(
    edition: u32,
    sheets: &[(String, Range<Data>)],
    mapping: &PseudonymMapping,
) -> Result<(EditionStats, Vec<Issue>), ExcelError> {
    for (name, range) in sheets {
        if let Some(layout) = FlatLayout::detect(range) {
            debug!("sheet {name:?} is a flat player table");
            return Ok(import_flat(edition, name, range, &layout, mapping));
        }
    }

    let mut builder = EditionBuilder::new(edition);
    for (name, range) in sheets {
        if SUMMARY_SHEETS.contains(&label_slug(name).as_str()) {
            continue;
        }
        let Some(sheet) = parse_team_sheet(range) else {
            debug!("sheet {name:?} has no player table");
            continue;
        };
        let team = name.trim();
        builder.set_team_stats(team, sheet.team_stats);
        for player in sheet.players {
            builder.add(team, &player.name, "", &player.role, player.stats, mapping, name, player.row);
        }
    }

    if builder.is_empty() {
        return Err(ExcelError::NoStatsSheet { sheets: sheets.iter().map(|(n, _)| n.clone()).collect() });
    }
    Ok(builder.finish())
}

// ---------------------------------------------------------------------------
// Shared output assembly
// ---------------------------------------------------------------------------

struct EditionBuilder {
    edition: u32,
    teams: BTreeMap<String, TeamRecord>,
    players: Vec<PlayerRecord>,
    issues: Vec<Issue>,
    /// First (team, sheet row) of every player listed so far.
    seen: HashMap<RosterKey, (String, usize)>,
}

/// A player is the same across rows by Riot ID, or by alias key when the
/// name resolves to none.
#[derive(Debug, PartialEq, Eq, Hash)]
enum RosterKey {
    Id(String),
    Alias(String),
}

impl EditionBuilder {
    fn new(edition: u32) -> Self {
        Self { edition, teams: BTreeMap::new(), players: Vec::new(), issues: Vec::new(), seen: HashMap::new() }
    }

    fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn set_team_stats(&mut self, team: &str, stats: StatMap) {
        self.teams.entry(team.to_owned()).or_default().stats = stats;
    }

    #[allow(clippy::too_many_arguments)]
    fn add(
        &mut self,
        team: &str,
        name: &str,
        tag: &str,
        position: &str,
        stats: StatMap,
        mapping: &PseudonymMapping,
        sheet: &str,
        row: usize,
    ) {
        let team = if team.is_empty() { NO_TEAM } else { team };
        let role = Role::from_label(position).map_or_else(|| position.to_owned(), |r| r.label().to_owned());

        let resolution = mapping.resolve(name, Some(tag));
        let (key, shown) = match &resolution {
            Resolution::Resolved(riot_id) => (RosterKey::Id(riot_id.key()), riot_id.to_string()),
            Resolution::Unresolved(_) => (RosterKey::Alias(alias_key(name)), name.to_owned()),
        };
        if let Some((first_team, first_row)) = self.seen.get(&key) {
            self.issues.push(Issue::RejectedRow {
                sheet: sheet.to_owned(),
                row,
                reason: format!("{shown} already listed for {first_team} row {first_row}"),
            });
            return;
        }
        self.seen.insert(key, (team.to_owned(), row));

        let id = match resolution {
            Resolution::Resolved(riot_id) => Some(riot_id.to_string()),
            Resolution::Unresolved(alias) => {
                self.issues.push(Issue::unresolved(alias, format!("{sheet} row {row}: no tag and no mapping entry")));
                None
            }
        };

        let roster_name = id.clone().unwrap_or_else(|| name.to_owned());
        self.teams.entry(team.to_owned()).or_default().roster.push(roster_name);
        self.players.push(PlayerRecord {
            id,
            name: name.to_owned(),
            tag: tag.to_owned(),
            team: team.to_owned(),
            role,
            stats,
        });
    }

    fn finish(self) -> (EditionStats, Vec<Issue>) {
        info!("excel import: {} teams, {} players", self.teams.len(), self.players.len());
        let stats = EditionStats {
            edition: self.edition,
            source: Source::Excel,
            teams: self.teams,
            players: self.players,
            matches: None,
            agg: None,
            puuid_map: BTreeMap::new(),
        };
        (stats, self.issues)
    }
}

// ---------------------------------------------------------------------------
// Flat layout
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FlatLayout {
    header_row: usize,
    team: usize,
    position: usize,
    name: usize,
    tag: Option<usize>,
    /// Column index → stat key, for every other column.
    extras: Vec<(usize, String)>,
}

impl FlatLayout {
    /// The first non-blank row is the header. The sheet is flat when it names
    /// a team, a position and a player column.
    fn detect(range: &Range<Data>) -> Option<Self> {
        let (header_row, header) = range.rows().enumerate().find(|(_, row)| !is_blank_row(row))?;

        let mut found: HashMap<Column, usize> = HashMap::new();
        let mut extras = Vec::new();
        for (col, cell) in header.iter().enumerate() {
            let text = cell_text(Some(cell));
            match classify(&text) {
                Some(kind) if !found.contains_key(&kind) => {
                    found.insert(kind, col);
                }
                _ => {
                    let key = if text.is_empty() { format!("column_{}", col + 1) } else { text };
                    extras.push((col, key));
                }
            }
        }

        Some(FlatLayout {
            header_row,
            team: *found.get(&Column::Team)?,
            position: *found.get(&Column::Position)?,
            name: *found.get(&Column::Name)?,
            tag: found.get(&Column::Tag).copied(),
            extras,
        })
    }
}

fn import_flat(
    edition: u32,
    sheet: &str,
    range: &Range<Data>,
    layout: &FlatLayout,
    mapping: &PseudonymMapping,
) -> (EditionStats, Vec<Issue>) {
    let mut builder = EditionBuilder::new(edition);
    let offset = first_row(range);

    for (i, row) in range.rows().enumerate().skip(layout.header_row + 1) {
        if is_blank_row(row) {
            continue;
        }
        let sheet_row = offset + i + 1;
        let name = cell_text(row.get(layout.name));
        if name.is_empty() {
            builder.issues.push(Issue::RejectedRow {
                sheet: sheet.to_owned(),
                row: sheet_row,
                reason: "missing player name".to_owned(),
            });
            continue;
        }

        let team = cell_text(row.get(layout.team));
        let position = cell_text(row.get(layout.position));
        let tag = layout.tag.map(|c| cell_text(row.get(c))).unwrap_or_default();
        let stats: StatMap = layout
            .extras
            .iter()
            .filter_map(|(col, key)| cell_value(row.get(*col)).map(|v| (key.clone(), v)))
            .collect();

        builder.add(&team, &name, &tag, &position, stats, mapping, sheet, sheet_row);
    }
    builder.finish()
}

// ---------------------------------------------------------------------------
// Per-team sheets
// ---------------------------------------------------------------------------

struct TeamSheet {
    team_stats: StatMap,
    players: Vec<TeamSheetPlayer>,
}

struct TeamSheetPlayer {
    name: String,
    /// 1-based row in the sheet.
    row: usize,
    role: String,
    stats: StatMap,
}

/// Output key and accepted header slugs for each player column.
const PLAYER_COLUMNS: &[(&str, &[&str])] = &[
    ("KDA", &["kda"]),
    ("Kills/G", &["killsg", "killspargame", "killsparmatch"]),
    ("Deaths/G", &["deathsg", "mortsg", "deathspargame"]),
    ("Assists/G", &["assistsg", "assistg"]),
    ("CS/min", &["csmin", "csparmin"]),
    ("Vision/G", &["visiong", "visionpargame"]),
    ("Champions", &["champions"]),
];

fn summary_key(label: &str) -> Option<&'static str> {
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| label.starts_with(p));
    if starts(&["matchsjoues", "matchjoues", "matchesjoues", "matchesplayed"]) {
        Some("matches")
    } else if starts(&["victoires"]) || label == "wins" {
        Some("wins")
    } else if starts(&["defaites"]) || label == "losses" {
        Some("losses")
    } else if starts(&["winrate"]) {
        Some("winrate")
    } else if starts(&["dureemoy"]) {
        Some("avg_duration")
    } else if starts(&["pluscourt"]) {
        Some("min_duration")
    } else if starts(&["pluslong"]) {
        Some("max_duration")
    } else {
        None
    }
}

fn as_count(value: Value) -> Value {
    if let Some(text) = value.as_str()
        && let Ok(n) = text.trim().parse::<f64>()
        && n.fract() == 0.0
    {
        return Value::from(n as i64);
    }
    value
}

fn parse_team_sheet(range: &Range<Data>) -> Option<TeamSheet> {
    let rows: Vec<&[Data]> = range.rows().collect();
    let header_idx = rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| row.iter().any(|c| label_slug(&cell_text(Some(c))) == "joueur"))?;

    let mut columns: HashMap<String, usize> = HashMap::new();
    for (col, cell) in rows[header_idx].iter().enumerate() {
        columns.entry(label_slug(&cell_text(Some(cell)))).or_insert(col);
    }
    let name_col = *columns.get("joueur")?;

    let mut team_stats = StatMap::new();
    for row in &rows[header_idx.saturating_sub(SUMMARY_SCAN_ROWS)..header_idx] {
        let label = label_slug(&cell_text(row.first()));
        let Some(key) = summary_key(&label) else {
            continue;
        };
        let Some(value) = cell_value(row.get(1)) else {
            continue;
        };
        let value = if matches!(key, "matches" | "wins" | "losses") { as_count(value) } else { value };
        team_stats.insert(key.to_owned(), value);
    }

    let stat_columns: Vec<(&str, usize)> = PLAYER_COLUMNS
        .iter()
        .filter_map(|(label, slugs)| {
            slugs.iter().find_map(|s| columns.get(*s)).map(|&col| (*label, col))
        })
        .collect();

    let offset = first_row(range) + header_idx + 1;
    let mut players = Vec::new();
    for (i, row) in rows[header_idx + 1..].iter().enumerate() {
        let name = cell_text(row.get(name_col));
        if name.is_empty() || name.eq_ignore_ascii_case("nan") {
            break;
        }
        let stats = stat_columns
            .iter()
            .filter_map(|(label, col)| cell_value(row.get(*col)).map(|v| ((*label).to_owned(), v)))
            .collect();
        players.push(TeamSheetPlayer { name, row: offset + i + 1, role: String::new(), stats });
    }

    if players.len() == Role::ALL.len() {
        for (player, role) in players.iter_mut().zip(Role::ALL) {
            player.role = role.label().to_owned();
        }
    }

    (!players.is_empty()).then_some(TeamSheet { team_stats, players })
}
