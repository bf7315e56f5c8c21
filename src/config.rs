use anyhow::{Context, anyhow};
use log::LevelFilter;
use riot_api::client::{RetryPolicy, RiotApi};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_REGION: &str = "euw";
pub const API_KEY_ENV: &str = "OCCILAN_RIOT_API_KEY";

/// Run-wide settings, built once from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub api_key: Option<String>,
    pub region: String,
    pub retry: RetryPolicy,
    pub request_delay: Duration,
    pub log_level: LevelFilter,
    /// Test-only override of the Riot hosts.
    pub api_base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            api_key: None,
            region: DEFAULT_REGION.to_owned(),
            retry: RetryPolicy::default(),
            request_delay: Duration::from_millis(120),
            log_level: LevelFilter::Info,
            api_base_url: None,
        }
    }
}

impl Settings {
    pub fn paths(&self) -> Paths {
        Paths::new(&self.data_dir)
    }

    pub fn api_key(&self) -> anyhow::Result<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("missing Riot API key: set {API_KEY_ENV} or pass --api-key"))
    }

    pub fn riot_client(&self) -> anyhow::Result<RiotApi> {
        let key = self.api_key().context("the Riot API is needed for this step")?;
        let mut client = RiotApi::new(key)
            .with_region(self.region.clone())
            .with_retry(self.retry.clone());
        if let Some(base) = &self.api_base_url {
            client = client.with_base_url(base.clone());
        }
        Ok(client)
    }
}

/// Every artifact location, derived from the data directory.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn match_cache_dir(&self) -> PathBuf {
        self.root.join("cache").join("matches")
    }

    /// Organisers' sheet export, one per edition.
    pub fn opgg_csv(&self, edition: u32) -> PathBuf {
        self.raw_dir().join(format!("Occi'lan #{edition} - OPGG Adversaires.csv"))
    }

    pub fn roster_csv(&self, edition: u32) -> PathBuf {
        self.processed_dir().join(format!("team_riot_ids_edition{edition}.csv"))
    }

    pub fn mapping(&self) -> PathBuf {
        self.processed_dir().join("pseudonym_mapping.json")
    }

    pub fn teams_with_puuid(&self, edition: u32) -> PathBuf {
        self.processed_dir().join(format!("teams_with_puuid_edition{edition}.json"))
    }

    pub fn team_index(&self, edition: u32) -> PathBuf {
        self.processed_dir().join(format!("team_index_edition{edition}.json"))
    }

    pub fn match_stats(&self, edition: u32) -> PathBuf {
        self.processed_dir().join(format!("match_stats_edition{edition}.json"))
    }

    pub fn excel_stats(&self, edition: u32) -> PathBuf {
        self.processed_dir().join(format!("excel_stats_edition{edition}.json"))
    }

    pub fn tournament_matches(&self) -> PathBuf {
        self.root.join("tournament_matches.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_data_layout() {
        let paths = Paths::new("data");
        assert_eq!(
            paths.opgg_csv(6),
            PathBuf::from("data/raw/Occi'lan #6 - OPGG Adversaires.csv")
        );
        assert_eq!(
            paths.team_index(7),
            PathBuf::from("data/processed/team_index_edition7.json")
        );
        assert_eq!(paths.match_cache_dir(), PathBuf::from("data/cache/matches"));
        assert_eq!(paths.tournament_matches(), PathBuf::from("data/tournament_matches.json"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let settings = Settings { api_key: Some("  ".into()), ..Default::default() };
        let err = settings.api_key().unwrap_err();
        assert!(err.to_string().contains(API_KEY_ENV));
        assert!(settings.riot_client().is_err());
    }
}
