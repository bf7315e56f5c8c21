use crate::index::{ResolvedPlayer, ResolvedVia, TeamAssignments};
use crate::model::NO_TEAM;
use crate::normalize::alias_key;
use crate::report::{Issue, RunReport};
use crate::resolver::{PseudonymMapping, Resolution};
use crate::roster::RosterRow;
use crate::store::{MatchCache, TournamentMatches};
use log::{debug, info, warn};
use riot_api::client::{ApiError, RiotApi};
use riot_api::{Match, RiotId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// PUUIDs already known from cached matches, so resolution can skip the API.
#[derive(Debug, Default)]
pub struct PuuidIndex {
    by_riot_key: HashMap<String, String>,
    by_alias: HashMap<String, String>,
    riot_by_puuid: HashMap<String, RiotId>,
}

impl PuuidIndex {
    /// First sighting wins, so pass matches in a stable order.
    pub fn from_matches<'a>(matches: impl IntoIterator<Item = &'a Match>) -> Self {
        let mut index = PuuidIndex::default();
        for p in matches.into_iter().flat_map(|m| m.participants.iter()) {
            let Some(puuid) = &p.puuid else {
                continue;
            };
            if let Some(riot_id) = &p.riot_id {
                index.by_riot_key.entry(riot_id.key()).or_insert_with(|| puuid.clone());
                index.riot_by_puuid.entry(puuid.clone()).or_insert_with(|| riot_id.clone());
                index.by_alias.entry(alias_key(&riot_id.game_name)).or_insert_with(|| puuid.clone());
            }
            let alias = alias_key(&p.display_name);
            if !alias.is_empty() {
                index.by_alias.entry(alias).or_insert_with(|| puuid.clone());
            }
        }
        index
    }

    pub fn puuid_for(&self, riot_id: &RiotId) -> Option<&str> {
        self.by_riot_key.get(&riot_id.key()).map(String::as_str)
    }

    pub fn puuid_by_alias(&self, alias: &str) -> Option<&str> {
        self.by_alias.get(&alias_key(alias)).map(String::as_str)
    }

    pub fn riot_id_for(&self, puuid: &str) -> Option<&RiotId> {
        self.riot_by_puuid.get(puuid)
    }

    pub fn len(&self) -> usize {
        self.by_riot_key.len()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetailSummary {
    pub fetched: usize,
    pub cached: usize,
    pub failed: usize,
}

/// Sequential Riot API worker with a polite pause between calls.
pub struct Fetcher {
    client: RiotApi,
    request_delay: Duration,
}

impl Fetcher {
    pub fn new(client: RiotApi, request_delay: Duration) -> Self {
        Self { client, request_delay }
    }

    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// Turn roster rows into team assignments with Riot IDs and PUUIDs.
    ///
    /// PUUIDs come from the mapping, then the match cache, then account-v1.
    /// With `legacy`, pseudonyms the mapping cannot place are tried against
    /// summoner-v4 by name.
    pub async fn resolve_puuids(
        &self,
        rows: &[RosterRow],
        mapping: &PseudonymMapping,
        known: &PuuidIndex,
        legacy: bool,
        report: &mut RunReport,
    ) -> TeamAssignments {
        let mut assignments = TeamAssignments::new();

        for row in rows {
            let alias = row.alias().trim().to_owned();
            let mut slot = ResolvedPlayer {
                name: alias.clone(),
                role: row.position.trim().to_owned(),
                riot_id: None,
                puuid: None,
                resolved_via: None,
            };

            match mapping.resolve_player(&row.pseudo, &row.riot_name, Some(&row.riot_tag)) {
                Resolution::Resolved(riot_id) => {
                    self.attach_puuid(&mut slot, riot_id, &alias, mapping, known, report).await;
                }
                Resolution::Unresolved(name) => {
                    if let Some(puuid) = known.puuid_by_alias(&name) {
                        slot.puuid = Some(puuid.to_owned());
                        slot.riot_id = known.riot_id_for(puuid).cloned();
                        slot.resolved_via = Some(ResolvedVia::Cache);
                    } else if legacy {
                        self.legacy_lookup(&mut slot, &name, known, report).await;
                    } else {
                        report.push(Issue::unresolved(&name, "no tag and no mapping entry"));
                    }
                }
            }

            let team = match row.team.trim() {
                "" => NO_TEAM.to_owned(),
                team => team.to_owned(),
            };
            assignments.entry(team).or_default().push(slot);
        }

        let resolved = assignments.values().flatten().filter(|p| p.puuid.is_some()).count();
        info!("{resolved}/{} roster slots have a PUUID", rows.len());
        assignments
    }

    async fn attach_puuid(
        &self,
        slot: &mut ResolvedPlayer,
        riot_id: RiotId,
        alias: &str,
        mapping: &PseudonymMapping,
        known: &PuuidIndex,
        report: &mut RunReport,
    ) {
        let mapped = mapping
            .lookup(alias)
            .filter(|e| e.riot_id.key() == riot_id.key())
            .and_then(|e| e.puuid.clone());

        if let Some(puuid) = mapped {
            slot.puuid = Some(puuid);
            slot.resolved_via = Some(ResolvedVia::Mapping);
        } else if let Some(puuid) = known.puuid_for(&riot_id) {
            slot.puuid = Some(puuid.to_owned());
            slot.resolved_via = Some(ResolvedVia::Cache);
        } else {
            debug!("account-v1 lookup for {riot_id}");
            match self.client.account_by_riot_id(&riot_id).await {
                Ok(account) => {
                    slot.puuid = Some(account.puuid);
                    slot.resolved_via = Some(ResolvedVia::AccountV1);
                    if let Some(canonical) = account.riot_id {
                        slot.riot_id = Some(canonical);
                    }
                }
                Err(ApiError::NotFound(_)) => {
                    report.push(Issue::unresolved(alias, format!("no Riot account named {riot_id}")));
                }
                Err(e) => {
                    warn!("account lookup for {riot_id} failed: {e}");
                    report.push(Issue::FetchFailed { target: riot_id.to_string(), error: e.to_string() });
                }
            }
            self.pause().await;
        }

        if slot.riot_id.is_none() {
            slot.riot_id = Some(riot_id);
        }
    }

    async fn legacy_lookup(&self, slot: &mut ResolvedPlayer, name: &str, known: &PuuidIndex, report: &mut RunReport) {
        match self.client.summoner_puuid_by_name(name).await {
            Ok(puuid) => {
                slot.riot_id = known.riot_id_for(&puuid).cloned();
                if slot.riot_id.is_none() {
                    report.push(Issue::unresolved(name, "summoner found but its Riot ID is unknown"));
                }
                slot.puuid = Some(puuid);
                slot.resolved_via = Some(ResolvedVia::SummonerV4);
            }
            Err(ApiError::NotFound(_)) => {
                report.push(Issue::unresolved(name, "no summoner with this name"));
            }
            Err(e) => {
                report.push(Issue::FetchFailed { target: name.to_owned(), error: e.to_string() });
            }
        }
        self.pause().await;
    }

    /// List match ids for every PUUID of the edition and merge the new ones
    /// into `matches`. Returns how many ids were new.
    pub async fn fetch_match_ids(
        &self,
        edition: u32,
        assignments: &TeamAssignments,
        per_player: u32,
        start_time: Option<i64>,
        matches: &mut TournamentMatches,
        report: &mut RunReport,
    ) -> usize {
        let known: HashSet<String> = matches.ids(edition).iter().cloned().collect();

        let mut targets: BTreeMap<&str, String> = BTreeMap::new();
        for player in assignments.values().flatten() {
            if let Some(puuid) = &player.puuid {
                let label = player.riot_id.as_ref().map_or_else(|| player.name.clone(), |r| r.to_string());
                targets.entry(puuid.as_str()).or_insert(label);
            }
        }

        let mut found = Vec::new();
        for (puuid, label) in &targets {
            match self.client.match_ids(puuid, per_player, start_time, &known).await {
                Ok(ids) => {
                    debug!("{label}: {} match ids", ids.len());
                    found.extend(ids);
                }
                Err(e) => {
                    warn!("match listing for {label} failed: {e}");
                    report.push(Issue::FetchFailed { target: label.clone(), error: e.to_string() });
                }
            }
            self.pause().await;
        }

        let added = matches.merge(edition, found);
        info!("edition {edition}: {added} new match ids from {} accounts", targets.len());
        added
    }

    /// Download every listed match that is not cached yet.
    pub async fn fetch_match_details(
        &self,
        ids: &[String],
        cache: &MatchCache,
        report: &mut RunReport,
    ) -> anyhow::Result<DetailSummary> {
        let mut summary = DetailSummary::default();
        for id in ids {
            if cache.contains(id) {
                summary.cached += 1;
                continue;
            }
            match self.client.match_raw(id).await {
                Ok(raw) => {
                    cache.store(id, &raw)?;
                    summary.fetched += 1;
                }
                Err(ApiError::NotFound(_)) => {
                    summary.failed += 1;
                    report.push(Issue::MissingMatch { match_id: id.clone() });
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("match {id} failed: {e}");
                    report.push(Issue::FetchFailed { target: id.clone(), error: e.to_string() });
                }
            }
            self.pause().await;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{MappingEntry, MappingSource};
    use mockito::Matcher;
    use riot_api::Participant;
    use riot_api::client::RetryPolicy;
    use serde_json::json;

    fn fetcher(server: &mockito::Server) -> Fetcher {
        let client = RiotApi::new("test-key")
            .with_base_url(server.url())
            .with_retry(RetryPolicy { max_attempts: 1, base_delay: Duration::ZERO });
        Fetcher::new(client, Duration::ZERO)
    }

    fn row(team: &str, pseudo: &str, name: &str, tag: &str) -> RosterRow {
        RosterRow {
            team: team.into(),
            position: "Mid".into(),
            pseudo: pseudo.into(),
            riot_name: name.into(),
            riot_tag: tag.into(),
            ..Default::default()
        }
    }

    fn cached_match() -> Match {
        Match {
            id: "EUW1_1".into(),
            participants: vec![Participant {
                puuid: Some("p-cached".into()),
                riot_id: Some(RiotId::new("Cached", "EUW")),
                display_name: "Cached".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn resolve_prefers_cache_then_account_lookup() {
        let mut server = mockito::Server::new_async().await;
        let found = server
            .mock("GET", "/riot/account/v1/accounts/by-riot-id/Fresh/EUW")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"puuid":"p-fresh","gameName":"Fresh","tagLine":"EUW"}"#)
            .expect(1)
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/riot/account/v1/accounts/by-riot-id/Gone/EUW")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let rows = vec![
            row("Les Loups", "Cached", "Cached", "EUW"),
            row("Les Loups", "Fresh", "Fresh", "EUW"),
            row("Les Loups", "Gone", "Gone", "EUW"),
            row("", "Nameless", "Nameless", ""),
        ];
        let known = PuuidIndex::from_matches(&[cached_match()]);
        let mut report = RunReport::default();
        let assignments = fetcher(&server)
            .resolve_puuids(&rows, &PseudonymMapping::default(), &known, false, &mut report)
            .await;

        let loups = &assignments["Les Loups"];
        assert_eq!(loups[0].puuid.as_deref(), Some("p-cached"));
        assert_eq!(loups[0].resolved_via, Some(ResolvedVia::Cache));
        assert_eq!(loups[1].puuid.as_deref(), Some("p-fresh"));
        assert_eq!(loups[1].resolved_via, Some(ResolvedVia::AccountV1));
        assert_eq!(loups[2].puuid, None);
        assert_eq!(loups[2].riot_id, Some(RiotId::new("Gone", "EUW")));
        assert_eq!(assignments[NO_TEAM][0].riot_id, None);

        assert_eq!(report.issues().len(), 2);
        found.assert_async().await;
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn mapping_puuid_skips_the_api() {
        let server = mockito::Server::new_async().await;
        let mut mapping = PseudonymMapping::default();
        let mut entry = MappingEntry::new(RiotId::new("Real", "EUW"), MappingSource::Manual);
        entry.puuid = Some("p-real".into());
        mapping.insert("Nick", entry).unwrap();

        let mut report = RunReport::default();
        let assignments = fetcher(&server)
            .resolve_puuids(&[row("T", "Nick", "Nick", "")], &mapping, &PuuidIndex::default(), false, &mut report)
            .await;

        let slot = &assignments["T"][0];
        assert_eq!(slot.riot_id, Some(RiotId::new("Real", "EUW")));
        assert_eq!(slot.puuid.as_deref(), Some("p-real"));
        assert_eq!(slot.resolved_via, Some(ResolvedVia::Mapping));
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn known_match_ids_add_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lol/match/v5/matches/by-puuid/p-1/ids")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"["EUW1_1"]"#)
            .create_async()
            .await;

        let assignments = TeamAssignments::from([(
            "T".to_owned(),
            vec![ResolvedPlayer {
                name: "One".into(),
                role: String::new(),
                riot_id: Some(RiotId::new("One", "EUW")),
                puuid: Some("p-1".into()),
                resolved_via: Some(ResolvedVia::Cache),
            }],
        )]);
        let mut matches = TournamentMatches::default();
        matches.merge(6, vec!["EUW1_1".to_owned()]);

        let mut report = RunReport::default();
        let added = fetcher(&server)
            .fetch_match_ids(6, &assignments, 20, None, &mut matches, &mut report)
            .await;
        assert_eq!(added, 0);
        assert_eq!(matches.ids(6), ["EUW1_1"]);
        assert!(report.is_clean());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn details_skip_cached_and_report_missing() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let cache = MatchCache::new(dir.path());
        cache.store("EUW1_1", &json!({"metadata": {"matchId": "EUW1_1"}})).unwrap();

        let cached = server
            .mock("GET", "/lol/match/v5/matches/EUW1_1")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/lol/match/v5/matches/EUW1_2")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"metadata":{"matchId":"EUW1_2"},"info":{"participants":[]}}"#)
            .expect(1)
            .create_async()
            .await;
        let gone = server
            .mock("GET", "/lol/match/v5/matches/EUW1_3")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let ids: Vec<String> = ["EUW1_1", "EUW1_2", "EUW1_3"].map(String::from).to_vec();
        let mut report = RunReport::default();
        let summary = fetcher(&server).fetch_match_details(&ids, &cache, &mut report).await.unwrap();

        assert_eq!(summary, DetailSummary { fetched: 1, cached: 1, failed: 1 });
        assert!(cache.contains("EUW1_2"));
        assert_eq!(report.issues(), [Issue::MissingMatch { match_id: "EUW1_3".into() }]);
        cached.assert_async().await;
        fresh.assert_async().await;
        gone.assert_async().await;
    }
}
