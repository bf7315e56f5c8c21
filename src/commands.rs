//! One function per CLI subcommand. Each reads its inputs from the data
//! directory, writes its artifact atomically and returns the run's issues.

use crate::config::Settings;
use crate::excel;
use crate::fetch::{DetailSummary, Fetcher, PuuidIndex};
use crate::index::{TeamAssignments, TeamIndex};
use crate::processor::process_edition;
use crate::report::{Issue, RunReport};
use crate::resolver::{self, MappingEntry, MappingSource, PseudonymMapping};
use crate::roster::{self, RosterRow};
use crate::store::{self, MatchCache, TournamentMatches};
use anyhow::Context;
use log::info;
use riot_api::{Match, RiotId};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Per-player match id limit when none is given.
pub const DEFAULT_PER_PLAYER: u32 = 50;

fn fetcher(settings: &Settings) -> anyhow::Result<Fetcher> {
    Ok(Fetcher::new(settings.riot_client()?, settings.request_delay))
}

/// Every cached match, in id order.
fn cached_matches(settings: &Settings, report: &mut RunReport) -> anyhow::Result<Vec<Match>> {
    let cache = MatchCache::new(settings.paths().match_cache_dir());
    let ids = cache.ids()?;
    cache.load_matches(&ids, report)
}

fn read_roster(settings: &Settings, edition: u32) -> anyhow::Result<Vec<RosterRow>> {
    let path = settings.paths().roster_csv(edition);
    roster::read_roster_csv(&path).with_context(|| format!("run parse-roster --edition {edition} first"))
}

// ---------------------------------------------------------------------------
// Roster and identities
// ---------------------------------------------------------------------------

pub fn parse_roster(
    settings: &Settings,
    edition: u32,
    input: Option<&Path>,
    split_alternates: bool,
) -> anyhow::Result<RunReport> {
    let paths = settings.paths();
    let input = input.map_or_else(|| paths.opgg_csv(edition), Path::to_path_buf);
    let file = File::open(&input).with_context(|| format!("opening {}", input.display()))?;

    let teams = roster::parse_opgg_csv(file, split_alternates)
        .with_context(|| format!("parsing {}", input.display()))?;
    let (rows, issues) = roster::build_roster(&teams);
    let mut report = RunReport::default();
    report.extend(issues);

    roster::write_roster_csv(&paths.roster_csv(edition), &rows)?;
    info!("edition {edition}: {} teams, {} roster rows", teams.len(), rows.len());

    // Pseudonyms the link resolved become mapping entries.
    let mapping_path = paths.mapping();
    let mut mapping = PseudonymMapping::load(&mapping_path)?;
    let before = mapping.clone();
    for row in rows.iter().filter(|r| !r.riot_tag.trim().is_empty() && !r.pseudo.trim().is_empty()) {
        let entry = MappingEntry::new(RiotId::new(&row.riot_name, &row.riot_tag), MappingSource::Opgg);
        if let Err(e) = mapping.insert(&row.pseudo, entry) {
            report.push(Issue::unresolved(&row.pseudo, e.to_string()));
        }
    }
    if mapping != before {
        mapping.save(&mapping_path)?;
    }
    Ok(report)
}

pub fn build_mapping(settings: &Settings, edition: u32) -> anyhow::Result<RunReport> {
    let mut report = RunReport::default();
    let rows = read_roster(settings, edition)?;
    let matches = cached_matches(settings, &mut report)?;
    let observed = resolver::observe(&matches);

    let path = settings.paths().mapping();
    let mut mapping = PseudonymMapping::load(&path)?;
    let aliases: Vec<String> = rows
        .iter()
        .filter(|r| r.riot_tag.trim().is_empty())
        .map(|r| r.alias().to_owned())
        .collect();
    report.extend(resolver::build_mapping(&mut mapping, &aliases, &observed));
    mapping.save(&path)?;
    info!(
        "mapping: {} entries from {} observed accounts, {} aliases unmatched",
        mapping.len(),
        observed.len(),
        mapping.unmatched().count()
    );
    Ok(report)
}

pub async fn resolve_ids(settings: &Settings, edition: u32, legacy: bool) -> anyhow::Result<RunReport> {
    let fetcher = fetcher(settings)?;
    let mut report = RunReport::default();
    let rows = read_roster(settings, edition)?;
    let mapping = PseudonymMapping::load(&settings.paths().mapping())?;
    let known = PuuidIndex::from_matches(&cached_matches(settings, &mut report)?);
    info!("{} accounts known from cached matches", known.len());

    let assignments = fetcher.resolve_puuids(&rows, &mapping, &known, legacy, &mut report).await;
    store::write_json_atomic(&settings.paths().teams_with_puuid(edition), &assignments)?;
    Ok(report)
}

pub fn build_index(settings: &Settings, edition: u32) -> anyhow::Result<RunReport> {
    let paths = settings.paths();
    let assignments: TeamAssignments = store::read_json(&paths.teams_with_puuid(edition))
        .with_context(|| format!("run resolve-ids --edition {edition} first"))?;

    let (index, issues) = TeamIndex::build(edition, &assignments)
        .with_context(|| format!("building the edition {edition} index"))?;
    store::write_json_atomic(&paths.team_index(edition), &index)?;

    let mut report = RunReport::default();
    report.extend(issues);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

pub async fn fetch_matches(
    settings: &Settings,
    edition: u32,
    per_player: u32,
    start_time: Option<i64>,
) -> anyhow::Result<RunReport> {
    let fetcher = fetcher(settings)?;
    let paths = settings.paths();
    let assignments: TeamAssignments = store::read_json(&paths.teams_with_puuid(edition))
        .with_context(|| format!("run resolve-ids --edition {edition} first"))?;

    let tm_path = paths.tournament_matches();
    let mut matches = TournamentMatches::load(&tm_path)?;
    let mut report = RunReport::default();
    let added = fetcher
        .fetch_match_ids(edition, &assignments, per_player, start_time, &mut matches, &mut report)
        .await;

    if added > 0 {
        matches.save(&tm_path)?;
    } else {
        info!("edition {edition}: no new matches");
    }
    Ok(report)
}

pub async fn fetch_details(settings: &Settings, edition: u32) -> anyhow::Result<RunReport> {
    let (summary, report) = download_details(settings, edition).await?;
    info!(
        "edition {edition} match details: {} fetched, {} already cached, {} failed",
        summary.fetched, summary.cached, summary.failed
    );
    Ok(report)
}

async fn download_details(settings: &Settings, edition: u32) -> anyhow::Result<(DetailSummary, RunReport)> {
    let fetcher = fetcher(settings)?;
    let paths = settings.paths();
    let matches = TournamentMatches::load(&paths.tournament_matches())?;
    let cache = MatchCache::new(paths.match_cache_dir());

    let mut report = RunReport::default();
    let summary = fetcher.fetch_match_details(matches.ids(edition), &cache, &mut report).await?;
    Ok((summary, report))
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

pub fn process(settings: &Settings, edition: u32) -> anyhow::Result<RunReport> {
    let paths = settings.paths();
    let mut report = RunReport::default();

    let listed = TournamentMatches::load(&paths.tournament_matches())?;
    let cache = MatchCache::new(paths.match_cache_dir());
    let matches = cache.load_matches(listed.ids(edition), &mut report)?;
    let index: Option<TeamIndex> = store::read_json_opt(&paths.team_index(edition))?;
    let mapping = PseudonymMapping::load(&paths.mapping())?;

    let stats = process_edition(edition, matches, index.as_ref(), &mapping);
    store::write_json_atomic(&paths.match_stats(edition), &stats)?;
    Ok(report)
}

pub fn import_excel(
    settings: &Settings,
    edition: u32,
    workbook: &Path,
    output: Option<PathBuf>,
) -> anyhow::Result<RunReport> {
    let paths = settings.paths();
    let mapping = PseudonymMapping::load(&paths.mapping())?;
    let (stats, issues) = excel::import_workbook(workbook, edition, &mapping)?;

    let output = output.unwrap_or_else(|| paths.excel_stats(edition));
    store::write_json_atomic(&output, &stats)?;
    info!("wrote {}", output.display());

    let mut report = RunReport::default();
    report.extend(issues);
    Ok(report)
}
