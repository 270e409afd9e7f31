use crate::error::{AppError, Result};
use crate::ingest::OddsFormat;
use crate::matcher::{BookPolicy, MatchSettings};
use crate::parlay::ParlaySettings;
use crate::pipeline::PipelineSettings;
use crate::pricing::DevigMethod;

/// Channel capacity for finished runs queued for the DB writer.
pub const RUN_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Keep serving the read API after the runs finish (SERVE_API)
    pub serve_api: bool,
    /// Sports to run, upper-cased (SPORTS, comma-separated)
    pub sports: Vec<String>,
    /// Extra or replacement sport profiles (SPORT_PROFILES_PATH)
    pub sport_profiles_path: Option<String>,
    pub odds_format: OddsFormat,
    pub pipeline: PipelineSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let sports: Vec<String> = get("SPORTS", "MLB")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if sports.is_empty() {
            return Err(AppError::Config("SPORTS must name at least one sport".to_string()));
        }

        let max_legs = parse::<usize>(&get("PARLAY_MAX_LEGS", "6"), "PARLAY_MAX_LEGS")?;
        if max_legs < 2 {
            return Err(AppError::Config("PARLAY_MAX_LEGS must be at least 2".to_string()));
        }
        let line_tolerance = parse::<f64>(&get("LINE_TOLERANCE", "0.0"), "LINE_TOLERANCE")?;
        if !line_tolerance.is_finite() || line_tolerance < 0.0 {
            return Err(AppError::Config("LINE_TOLERANCE must be >= 0".to_string()));
        }

        let pipeline = PipelineSettings {
            matching: MatchSettings {
                line_tolerance,
                book_policy: get("BOOK_POLICY", "single_best")
                    .parse::<BookPolicy>()
                    .map_err(AppError::Config)?,
                min_match_rate: get("MIN_MATCH_RATE", "0.25").parse::<f64>().unwrap_or(0.25),
            },
            devig: get("DEVIG_METHOD", "multiplicative")
                .parse::<DevigMethod>()
                .map_err(AppError::Config)?,
            anchors_per_game: get("ANCHORS_PER_GAME", "3").parse::<usize>().unwrap_or(3),
            parlay: ParlaySettings {
                max_legs,
                companion_ev_floor: get("COMPANION_EV_FLOOR", "0.01").parse::<f64>().unwrap_or(0.01),
                min_correlation: get("MIN_CORRELATION", "0.5").parse::<f64>().unwrap_or(0.5),
                linked_games: parse_linked_games(&get("LINKED_GAMES", ""))?,
                max_parlays: None,
            },
        };

        Ok(Self {
            log_level: get("LOG_LEVEL", "info"),
            db_path: get("DB_PATH", "props.db"),
            api_port: get("API_PORT", "3000")
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            serve_api: get("SERVE_API", "true").parse::<bool>().unwrap_or(true),
            sports,
            sport_profiles_path: var("SPORT_PROFILES_PATH").filter(|p| !p.trim().is_empty()),
            odds_format: get("ODDS_FORMAT", "american")
                .parse::<OddsFormat>()
                .map_err(AppError::Config)?,
            pipeline,
        })
    }
}

fn parse<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::Config(format!("{key} has invalid value '{raw}'")))
}

/// `"g1:g2,g3:g4"` -> [("g1","g2"), ("g3","g4")]
fn parse_linked_games(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
                Ok((a.trim().to_string(), b.trim().to_string()))
            }
            _ => Err(AppError::Config(format!("LINKED_GAMES entry '{pair}' is not game:game"))),
        })
        .collect()
}
