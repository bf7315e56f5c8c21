mod commands;
mod config;
mod excel;
mod fetch;
mod index;
mod model;
mod normalize;
mod processor;
mod report;
mod resolver;
mod roster;
mod store;

use crate::config::{API_KEY_ENV, DEFAULT_DATA_DIR, DEFAULT_REGION, Settings};
use crate::report::RunReport;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use riot_api::client::RetryPolicy;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "occistats", version)]
#[command(about = "Occi'lan tournament stats: roster parsing, Riot API fetch, Excel import", long_about = None)]
struct Cli {
    /// Root of the data directory
    #[arg(long, env = "OCCISTATS_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// Riot API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Platform code (euw, na, kr, ...)
    #[arg(long, default_value = DEFAULT_REGION, global = true)]
    region: String,

    /// Attempts per request before giving up
    #[arg(long, default_value_t = 4, global = true)]
    max_attempts: u32,

    /// Pause between consecutive API requests
    #[arg(long, default_value_t = 120, global = true)]
    request_delay_ms: u64,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse the organisers' OPGG sheet export into the roster CSV
    ParseRoster {
        #[arg(long)]
        edition: u32,
        /// Sheet export to read instead of the one under raw/
        #[arg(long)]
        input: Option<PathBuf>,
        /// Keep "A / B" substitute pairs as typed
        #[arg(long)]
        no_split_alternates: bool,
    },
    /// Propose pseudonym mappings from names seen in cached matches
    BuildMapping {
        #[arg(long)]
        edition: u32,
    },
    /// Resolve roster Riot IDs to PUUIDs
    ResolveIds {
        #[arg(long)]
        edition: u32,
        /// Look up untagged pseudonyms with summoner-v4 by name
        #[arg(long)]
        legacy_summoner: bool,
    },
    /// Build the team/player index for an edition
    BuildIndex {
        #[arg(long)]
        edition: u32,
    },
    /// List match ids for every indexed player
    FetchMatches {
        #[arg(long)]
        edition: u32,
        /// Most match ids to list per player
        #[arg(long, default_value_t = commands::DEFAULT_PER_PLAYER)]
        per_player: u32,
        /// Only matches after this epoch second
        #[arg(long)]
        start_time: Option<i64>,
    },
    /// Download listed matches that are not cached yet
    FetchDetails {
        #[arg(long)]
        edition: u32,
    },
    /// Aggregate cached matches into match_stats_edition{N}.json
    Process {
        #[arg(long)]
        edition: u32,
    },
    /// Import an organiser workbook into excel_stats_edition{N}.json
    ImportExcel {
        #[arg(long)]
        edition: u32,
        #[arg(long)]
        excel: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            data_dir: self.data_dir.clone(),
            api_key: self.api_key.clone(),
            region: self.region.clone(),
            retry: RetryPolicy { max_attempts: self.max_attempts.max(1), ..RetryPolicy::default() },
            request_delay: Duration::from_millis(self.request_delay_ms),
            log_level: if self.verbose { LevelFilter::Debug } else { LevelFilter::Info },
            api_base_url: None,
        }
    }
}

async fn run(command: Command, settings: &Settings) -> anyhow::Result<RunReport> {
    match command {
        Command::ParseRoster { edition, input, no_split_alternates } => {
            commands::parse_roster(settings, edition, input.as_deref(), !no_split_alternates)
        }
        Command::BuildMapping { edition } => commands::build_mapping(settings, edition),
        Command::ResolveIds { edition, legacy_summoner } => {
            commands::resolve_ids(settings, edition, legacy_summoner).await
        }
        Command::BuildIndex { edition } => commands::build_index(settings, edition),
        Command::FetchMatches { edition, per_player, start_time } => {
            commands::fetch_matches(settings, edition, per_player, start_time).await
        }
        Command::FetchDetails { edition } => commands::fetch_details(settings, edition).await,
        Command::Process { edition } => commands::process(settings, edition),
        Command::ImportExcel { edition, excel, output } => {
            commands::import_excel(settings, edition, &excel, output)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = cli.settings();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str().to_lowercase()),
    )
    .format_timestamp(None)
    .init();
    better_panic::install();

    match run(cli.command, &settings).await {
        Ok(report) => {
            if !report.is_clean() {
                eprint!("{}", report.render());
            }
            ExitCode::from(report.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
