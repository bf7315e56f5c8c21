//! Riot API raw wire types, serde shapes for deserializing Riot responses.
//! These map to the clean domain types via the mapping functions in client.rs.
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Account  (account-v1)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub puuid: String,
    pub game_name: Option<String>,
    pub tag_line: Option<String>,
}

// ---------------------------------------------------------------------------
// Summoner  (summoner-v4, legacy by-name lookup)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SummonerDto {
    pub puuid: String,
    pub name: Option<String>,
    pub summoner_level: Option<u32>,
}

// ---------------------------------------------------------------------------
// Match  (match-v5)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
pub struct MatchDto {
    #[serde(default)]
    pub metadata: MetadataDto,
    #[serde(default)]
    pub info: InfoDto,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDto {
    pub match_id: Option<String>,
    /// Older cached payloads only carry the numeric game id.
    pub game_id: Option<serde_json::Value>,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InfoDto {
    pub game_creation: Option<i64>,
    pub game_start_timestamp: Option<i64>,
    /// Seconds when `game_end_timestamp` is present, milliseconds otherwise.
    pub game_duration: Option<i64>,
    pub game_end_timestamp: Option<i64>,
    pub platform_id: Option<String>,
    pub queue_id: Option<i64>,
    #[serde(default)]
    pub participants: Vec<ParticipantDto>,
    #[serde(default)]
    pub teams: Vec<TeamDto>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantDto {
    pub puuid: Option<String>,
    pub summoner_name: Option<String>,
    pub summoner_id: Option<String>,
    pub riot_id_game_name: Option<String>,
    pub riot_id_tagline: Option<String>,
    pub champion_name: Option<String>,
    pub champion_id: Option<i64>,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub total_minions_killed: u32,
    pub neutral_minions_killed: u32,
    pub vision_score: u32,
    pub win: bool,
    pub team_id: u16,
    pub team_position: Option<String>,
    pub individual_position: Option<String>,
    pub lane: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TeamDto {
    pub team_id: u16,
    #[serde(default)]
    pub win: bool,
    #[serde(default)]
    pub bans: Vec<BanDto>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanDto {
    pub champion_id: Option<i64>,
    pub pick_turn: Option<u32>,
}
