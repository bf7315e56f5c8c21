pub mod client;
pub mod riot;
pub mod routing;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Domain types, independent of the Riot wire format
// ---------------------------------------------------------------------------

/// Canonical player identifier: `gameName#tagLine`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RiotId {
    pub game_name: String,
    pub tag_line: String,
}

impl RiotId {
    pub fn new(game_name: impl Into<String>, tag_line: impl Into<String>) -> Self {
        Self {
            game_name: game_name.into().trim().to_owned(),
            tag_line: tag_line.into().trim().trim_start_matches('#').to_owned(),
        }
    }

    /// Case-insensitive comparison key. Riot treats names and tags without case.
    pub fn key(&self) -> String {
        format!("{}#{}", self.game_name.to_lowercase(), self.tag_line.to_lowercase())
    }
}

impl fmt::Display for RiotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.game_name, self.tag_line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiotIdParseError(pub String);

impl fmt::Display for RiotIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a Riot ID (expected name#tag): {:?}", self.0)
    }
}

impl std::error::Error for RiotIdParseError {}

impl FromStr for RiotId {
    type Err = RiotIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, tag)) = s.split_once('#') else {
            return Err(RiotIdParseError(s.to_owned()));
        };
        let id = RiotId::new(name, tag);
        if id.game_name.is_empty() || id.tag_line.is_empty() {
            return Err(RiotIdParseError(s.to_owned()));
        }
        Ok(id)
    }
}

impl Serialize for RiotId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RiotId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The five lane roles, in draft order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Top,
    Jungle,
    Mid,
    Adc,
    Supp,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Top, Role::Jungle, Role::Mid, Role::Adc, Role::Supp];

    pub fn label(&self) -> &'static str {
        match self {
            Role::Top => "Top",
            Role::Jungle => "Jungle",
            Role::Mid => "Mid",
            Role::Adc => "Adc",
            Role::Supp => "Supp",
        }
    }

    /// Map match-v5 `teamPosition` (TOP, JUNGLE, MIDDLE, BOTTOM, UTILITY) to a role.
    /// `lane` is only consulted to split the bottom lane when the position is ambiguous.
    pub fn from_team_position(team_position: &str, lane: &str) -> Option<Role> {
        match team_position.trim().to_uppercase().as_str() {
            "" => None,
            "TOP" => Some(Role::Top),
            "JUNGLE" => Some(Role::Jungle),
            "MIDDLE" | "MID" => Some(Role::Mid),
            "BOTTOM" | "BOT" => {
                if lane.to_lowercase().contains("support") {
                    Some(Role::Supp)
                } else {
                    Some(Role::Adc)
                }
            }
            "UTILITY" | "SUPPORT" => Some(Role::Supp),
            _ => None,
        }
    }

    /// Map a hand-typed role label ("supp", "Toplane", "JG", "bot / carry", …).
    pub fn from_label(label: &str) -> Option<Role> {
        let cleaned: String = label
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match cleaned.as_str() {
            "support" | "supp" | "sup" | "s" | "utility" => Some(Role::Supp),
            "top" | "toplane" => Some(Role::Top),
            "jungle" | "jg" | "jungler" => Some(Role::Jungle),
            "mid" | "middle" | "midlane" => Some(Role::Mid),
            "adc" | "bot" | "bottom" | "carry" | "botlane" => Some(Role::Adc),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Account {
    pub puuid: String,
    pub riot_id: Option<RiotId>,
}

#[derive(Debug, Clone, Default)]
pub struct Match {
    pub id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    pub participants: Vec<Participant>,
    /// Banned champion ids, both teams.
    pub bans: Vec<i64>,
}

impl Match {
    /// Riot team id (100 / 200) of the winning side, if recorded.
    pub fn winning_side(&self) -> Option<u16> {
        self.participants.iter().find(|p| p.win).map(|p| p.team_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Participant {
    pub puuid: Option<String>,
    pub riot_id: Option<RiotId>,
    /// Best visible name: summoner name, then Riot game name, then ids.
    pub display_name: String,
    pub champion: Option<String>,
    pub team_id: u16,
    pub role: Option<Role>,
    pub win: bool,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    /// Lane minions plus neutral monsters.
    pub cs: u32,
    pub vision_score: u32,
}

impl Participant {
    pub fn kda(&self, precision: i32) -> f64 {
        round_to((self.kills + self.assists) as f64 / self.deaths.max(1) as f64, precision)
    }

    pub fn cs_per_min(&self, duration_secs: u64, precision: i32) -> f64 {
        let minutes = (duration_secs as f64 / 60.0).max(1.0 / 60.0);
        round_to(self.cs as f64 / minutes, precision)
    }
}

pub fn round_to(value: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (value * factor).round() / factor
}
