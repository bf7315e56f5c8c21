use crate::riot::{AccountDto, MatchDto, ParticipantDto, SummonerDto};
use crate::routing::{RegionalRoute, platform_host};
use crate::{Account, Match, Participant, RiotId, Role};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

pub type ApiResult<T> = Result<T, ApiError>;

const RIOT_HOST_SUFFIX: &str = "api.riotgames.com";
const DEFAULT_REGION: &str = "euw";
/// match-v5 rejects `count` above 100.
pub const MAX_IDS_PER_PAGE: u32 = 100;

/// How often and how patiently a request is retried on 429, 5xx and network errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based). A server-provided
    /// `Retry-After` always wins over the exponential schedule.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.base_delay.saturating_mul(1u32 << retry.min(16)))
    }
}

/// Riot Games API client (account-v1, summoner-v4, match-v5).
#[derive(Debug, Clone)]
pub struct RiotApi {
    client: Client,
    api_key: String,
    region: String,
    timeout: Duration,
    retry: RetryPolicy,
    /// Replaces every `https://{host}.api.riotgames.com` base, for mock servers.
    base_url: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Network(reqwest::Error, String),
    Api(StatusCode, String),
    Parsing(reqwest::Error, String),
    NotFound(String),
    RateLimited(String),
    Other(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(..) | ApiError::RateLimited(_) => true,
            ApiError::Api(status, _) => status.is_server_error(),
            _ => false,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(e, url) => write!(f, "Network error for {url}: {e}"),
            ApiError::Api(status, url) => write!(f, "API error for {url}: HTTP {status}"),
            ApiError::Parsing(e, url) => write!(f, "Parse error for {url}: {e}"),
            ApiError::NotFound(url) => write!(f, "Not found: {url}"),
            ApiError::RateLimited(url) => write!(f, "Rate limited on {url}"),
            ApiError::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// One page of the match-id listing.
#[derive(Debug, Clone, Default)]
pub struct MatchIdQuery {
    pub start: u32,
    pub count: u32,
    /// Epoch seconds; only matches started at or after this instant.
    pub start_time: Option<i64>,
}

impl RiotApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("occistats/0.1 (tournament stats pipeline)")
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            region: DEFAULT_REGION.to_owned(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            base_url: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Resolve a Riot ID to its account (account-v1).
    pub async fn account_by_riot_id(&self, riot_id: &RiotId) -> ApiResult<Account> {
        let url = self.regional_url(&[
            "riot",
            "account",
            "v1",
            "accounts",
            "by-riot-id",
            &riot_id.game_name,
            &riot_id.tag_line,
        ])?;
        let raw: AccountDto = self.get(url).await?;
        let riot_id = match (raw.game_name, raw.tag_line) {
            (Some(name), Some(tag)) if !name.is_empty() && !tag.is_empty() => {
                Some(RiotId::new(name, tag))
            }
            _ => None,
        };
        Ok(Account { puuid: raw.puuid, riot_id })
    }

    /// Legacy summoner-v4 lookup by summoner name. Riot has been retiring
    /// this endpoint; kept for rosters that only list a pseudonym.
    pub async fn summoner_puuid_by_name(&self, name: &str) -> ApiResult<String> {
        let base = self.base_for(&platform_host(&self.region));
        let url = build_url(&base, &["lol", "summoner", "v4", "summoners", "by-name", name.trim()])?;
        let raw: SummonerDto = self.get(url).await?;
        Ok(raw.puuid)
    }

    /// One page of match ids for a PUUID, newest first.
    pub async fn match_ids_page(&self, puuid: &str, query: &MatchIdQuery) -> ApiResult<Vec<String>> {
        let mut url =
            self.regional_url(&["lol", "match", "v5", "matches", "by-puuid", puuid, "ids"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("start", &query.start.to_string());
            pairs.append_pair("count", &query.count.min(MAX_IDS_PER_PAGE).to_string());
            if let Some(start_time) = query.start_time {
                pairs.append_pair("startTime", &start_time.to_string());
            }
        }
        self.get(url).await
    }

    /// Walk the match history of a PUUID page by page.
    ///
    /// Stops after `limit` ids, on a short page, or on a page made only of
    /// ids in `known`. History is newest-first, so a fully known page means
    /// everything older was seen on a previous run.
    pub async fn match_ids(
        &self,
        puuid: &str,
        limit: u32,
        start_time: Option<i64>,
        known: &HashSet<String>,
    ) -> ApiResult<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        let mut start = 0;
        while (ids.len() as u32) < limit {
            let count = (limit - ids.len() as u32).min(MAX_IDS_PER_PAGE);
            let page = self
                .match_ids_page(puuid, &MatchIdQuery { start, count, start_time })
                .await?;
            let page_len = page.len() as u32;
            let all_known = !page.is_empty() && page.iter().all(|id| known.contains(id));
            debug!("match ids page start={start} count={count}: {page_len} ids");
            ids.extend(page);
            if page_len < count || all_known {
                break;
            }
            start += page_len;
        }
        Ok(ids)
    }

    /// Full match-v5 payload, untouched, so the on-disk cache keeps every field.
    pub async fn match_raw(&self, match_id: &str) -> ApiResult<serde_json::Value> {
        let url = self.regional_url(&["lol", "match", "v5", "matches", match_id])?;
        self.get(url).await
    }

    fn regional_url(&self, segments: &[&str]) -> ApiResult<Url> {
        let base = self.base_for(RegionalRoute::for_region(&self.region).host());
        build_url(&base, segments)
    }

    fn base_for(&self, host: &str) -> String {
        match &self.base_url {
            Some(base) => base.clone(),
            None => format!("https://{host}.{RIOT_HOST_SUFFIX}"),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        let response = self.send(&url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Parsing(e, url.to_string()))
    }

    async fn send(&self, url: &Url) -> ApiResult<Response> {
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .get(url.clone())
                .header("X-Riot-Token", &self.api_key)
                .timeout(self.timeout)
                .send()
                .await;

            let (error, retry_after) = match result {
                Err(e) => (ApiError::Network(e, url.to_string()), None),
                Ok(res) => {
                    let status = res.status();
                    if status.is_success() {
                        return Ok(res);
                    }
                    match status {
                        StatusCode::NOT_FOUND => return Err(ApiError::NotFound(url.to_string())),
                        StatusCode::TOO_MANY_REQUESTS => {
                            (ApiError::RateLimited(url.to_string()), retry_after(&res))
                        }
                        _ => (ApiError::Api(status, url.to_string()), None),
                    }
                }
            };

            attempt += 1;
            if !error.is_retryable() || attempt >= self.retry.max_attempts {
                return Err(error);
            }
            let delay = self.retry.delay_for(attempt - 1, retry_after);
            warn!(
                "{error}; retrying in {delay:?} (attempt {attempt}/{})",
                self.retry.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn build_url(base: &str, segments: &[&str]) -> ApiResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| ApiError::Other(format!("invalid base url {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::Other(format!("base url cannot carry a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

// ---------------------------------------------------------------------------
// Mapping: Riot wire types → clean domain types
// ---------------------------------------------------------------------------

/// Decode a cached or freshly fetched match-v5 payload.
pub fn parse_match(raw: &serde_json::Value) -> Result<Match, serde_json::Error> {
    let dto = MatchDto::deserialize(raw)?;
    Ok(map_match(dto))
}

/// The match id a payload carries, without decoding the rest of it.
pub fn match_id_of(raw: &serde_json::Value) -> Option<String> {
    let metadata = raw.get("metadata")?;
    metadata
        .get("matchId")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| metadata.get("gameId").and_then(json_scalar_to_string))
}

fn map_match(dto: MatchDto) -> Match {
    let id = dto
        .metadata
        .match_id
        .clone()
        .or_else(|| dto.metadata.game_id.as_ref().and_then(json_scalar_to_string))
        .unwrap_or_default();

    let info = dto.info;
    let started_at = info
        .game_start_timestamp
        .or(info.game_creation)
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    // Before patch 11.20 gameDuration was milliseconds; the presence of
    // gameEndTimestamp marks the newer seconds-based payloads.
    let raw_duration = info.game_duration.unwrap_or(0).max(0) as u64;
    let duration_secs = if info.game_end_timestamp.is_some() {
        raw_duration
    } else {
        raw_duration / 1000
    };

    let participants = info.participants.iter().map(map_participant).collect();

    // -1 is how match-v5 records a skipped ban.
    let bans = info
        .teams
        .iter()
        .flat_map(|t| t.bans.iter())
        .filter_map(|b| b.champion_id)
        .filter(|&id| id >= 0)
        .collect();

    Match { id, started_at, duration_secs, participants, bans }
}

fn map_participant(p: &ParticipantDto) -> Participant {
    let non_empty = |v: &Option<String>| {
        v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
    };

    let riot_id = match (non_empty(&p.riot_id_game_name), non_empty(&p.riot_id_tagline)) {
        (Some(name), Some(tag)) => Some(RiotId::new(name, tag)),
        _ => None,
    };

    let display_name = non_empty(&p.summoner_name)
        .or_else(|| non_empty(&p.riot_id_game_name))
        .or_else(|| non_empty(&p.summoner_id))
        .or_else(|| non_empty(&p.puuid))
        .unwrap_or_default();

    let position = non_empty(&p.team_position)
        .or_else(|| non_empty(&p.individual_position).filter(|s| s != "Invalid"))
        .unwrap_or_default();
    let lane = p.lane.clone().unwrap_or_default();

    Participant {
        puuid: non_empty(&p.puuid),
        riot_id,
        display_name,
        champion: non_empty(&p.champion_name),
        team_id: p.team_id,
        role: Role::from_team_position(&position, &lane),
        win: p.win,
        kills: p.kills,
        deaths: p.deaths,
        assists: p.assists,
        cs: p.total_minions_killed + p.neutral_minions_killed,
        vision_score: p.vision_score,
    }
}

fn json_scalar_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, base_delay: Duration::ZERO }
    }

    fn api_for(server: &mockito::Server) -> RiotApi {
        RiotApi::new("test-key").with_base_url(server.url()).with_retry(fast_retry(3))
    }

    fn sample_match() -> serde_json::Value {
        json!({
            "metadata": { "matchId": "EUW1_100", "participants": ["p-1", "p-2"] },
            "info": {
                "gameCreation": 1_700_000_000_000i64,
                "gameStartTimestamp": 1_700_000_060_000i64,
                "gameEndTimestamp": 1_700_001_860_000i64,
                "gameDuration": 1800,
                "participants": [
                    {
                        "puuid": "p-1", "summonerName": "", "riotIdGameName": "Player One",
                        "riotIdTagline": "EUW", "championName": "Ahri", "teamId": 100,
                        "teamPosition": "MIDDLE", "kills": 7, "deaths": 2, "assists": 5,
                        "totalMinionsKilled": 250, "neutralMinionsKilled": 20,
                        "visionScore": 31, "win": true
                    },
                    {
                        "puuid": "p-2", "summonerName": "Two", "championName": "Leona",
                        "teamId": 200, "teamPosition": "UTILITY", "kills": 0, "deaths": 6,
                        "assists": 3, "totalMinionsKilled": 30, "visionScore": 70, "win": false
                    }
                ],
                "teams": [
                    { "teamId": 100, "win": true, "bans": [{ "championId": 157, "pickTurn": 1 }, { "championId": -1, "pickTurn": 2 }] },
                    { "teamId": 200, "win": false, "bans": [{ "championId": 238, "pickTurn": 6 }] }
                ]
            }
        })
    }

    #[test]
    fn retry_delay_doubles_unless_server_says_otherwise() {
        let policy = RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(100) };
        assert_eq!(policy.delay_for(0, None), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2, Some(Duration::from_secs(3))), Duration::from_secs(3));
    }

    #[test]
    fn parse_match_maps_participants_and_bans() {
        let m = parse_match(&sample_match()).expect("sample should parse");
        assert_eq!(m.id, "EUW1_100");
        assert_eq!(m.duration_secs, 1800);
        assert_eq!(m.started_at.map(|t| t.timestamp()), Some(1_700_000_060));
        assert_eq!(m.bans, vec![157, 238]);
        assert_eq!(m.winning_side(), Some(100));

        let mid = &m.participants[0];
        assert_eq!(mid.display_name, "Player One", "empty summonerName falls back to Riot name");
        assert_eq!(mid.riot_id.as_ref().map(|r| r.to_string()).as_deref(), Some("Player One#EUW"));
        assert_eq!(mid.role, Some(Role::Mid));
        assert_eq!(mid.cs, 270);
        assert_eq!(mid.kda(2), 6.0);
        assert_eq!(mid.cs_per_min(m.duration_secs, 2), 9.0);

        let supp = &m.participants[1];
        assert_eq!(supp.role, Some(Role::Supp));
        assert!(supp.riot_id.is_none());
    }

    #[test]
    fn legacy_payload_duration_is_milliseconds() {
        let raw = json!({
            "metadata": { "gameId": 6543210 },
            "info": { "gameDuration": 1_500_000, "participants": [] }
        });
        let m = parse_match(&raw).unwrap();
        assert_eq!(m.id, "6543210");
        assert_eq!(m.duration_secs, 1500);
        assert_eq!(match_id_of(&raw).as_deref(), Some("6543210"));
    }

    #[tokio::test]
    async fn account_lookup_encodes_riot_id_and_sends_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/riot/account/v1/accounts/by-riot-id/Player%20One/EUW")
            .match_query(Matcher::Any)
            .match_header("X-Riot-Token", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"puuid":"puuid-1","gameName":"Player One","tagLine":"EUW"}"#)
            .create_async()
            .await;

        let api = api_for(&server);
        let account = api.account_by_riot_id(&RiotId::new("Player One", "EUW")).await.unwrap();
        assert_eq!(account.puuid, "puuid-1");
        assert_eq!(account.riot_id, Some(RiotId::new("Player One", "EUW")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lol/match/v5/matches/EUW1_404")
            .match_query(Matcher::Any)
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let err = api_for(&server).match_raw("EUW1_404").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)), "got {err}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_up_to_max_attempts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lol/match/v5/matches/EUW1_500")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let err = api_for(&server).match_raw("EUW1_500").await.unwrap_err();
        assert!(matches!(err, ApiError::Api(StatusCode::INTERNAL_SERVER_ERROR, _)), "got {err}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_honors_retry_after_and_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lol/match/v5/matches/EUW1_429")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("Retry-After", "0")
            .expect(3)
            .create_async()
            .await;

        let err = api_for(&server).match_raw("EUW1_429").await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited(_)), "got {err}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_fail_fast() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lol/match/v5/matches/EUW1_403")
            .match_query(Matcher::Any)
            .with_status(403)
            .expect(1)
            .create_async()
            .await;

        let err = api_for(&server).match_raw("EUW1_403").await.unwrap_err();
        assert!(!err.is_retryable());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn match_ids_paginate_until_short_page() {
        let mut server = mockito::Server::new_async().await;
        let first: Vec<String> = (0..100).map(|i| format!("EUW1_{i}")).collect();
        let second: Vec<String> = (100..120).map(|i| format!("EUW1_{i}")).collect();

        let page1 = server
            .mock("GET", "/lol/match/v5/matches/by-puuid/puuid-1/ids")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start".into(), "0".into()),
                Matcher::UrlEncoded("count".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(serde_json::to_string(&first).unwrap())
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/lol/match/v5/matches/by-puuid/puuid-1/ids")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start".into(), "100".into()),
                Matcher::UrlEncoded("count".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(serde_json::to_string(&second).unwrap())
            .create_async()
            .await;

        let ids = api_for(&server).match_ids("puuid-1", 250, None, &HashSet::new()).await.unwrap();
        assert_eq!(ids.len(), 120);
        assert_eq!(ids.first().map(String::as_str), Some("EUW1_0"));
        assert_eq!(ids.last().map(String::as_str), Some("EUW1_119"));
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn match_ids_respect_limit_and_start_time() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lol/match/v5/matches/by-puuid/puuid-1/ids")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start".into(), "0".into()),
                Matcher::UrlEncoded("count".into(), "2".into()),
                Matcher::UrlEncoded("startTime".into(), "1700000000".into()),
            ]))
            .with_status(200)
            .with_body(r#"["EUW1_9","EUW1_8"]"#)
            .expect(1)
            .create_async()
            .await;

        let ids = api_for(&server)
            .match_ids("puuid-1", 2, Some(1_700_000_000), &HashSet::new())
            .await
            .unwrap();
        assert_eq!(ids, vec!["EUW1_9", "EUW1_8"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn match_ids_stop_on_fully_known_page() {
        let mut server = mockito::Server::new_async().await;
        let page: Vec<String> = (0..100).map(|i| format!("EUW1_{i}")).collect();
        let known: HashSet<String> = page.iter().cloned().collect();
        let mock = server
            .mock("GET", "/lol/match/v5/matches/by-puuid/puuid-1/ids")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(serde_json::to_string(&page).unwrap())
            .expect(1)
            .create_async()
            .await;

        let ids = api_for(&server).match_ids("puuid-1", 500, None, &known).await.unwrap();
        assert_eq!(ids.len(), 100);
        mock.assert_async().await;
    }
}
