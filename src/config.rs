use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::hotness::HotnessWeights;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as number: {source}")]
    ParseFloat {
        name: String,
        #[source]
        source: std::num::ParseFloatError,
    },
}

/// One crawl target: a named board (category or tag listing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub name: String,
    pub url: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Crawl targets
    pub boards: Vec<Board>,
    pub scan_pages: u32,

    // Fetch behavior
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub fetch_timeout: Duration,
    pub success_delay_min: Duration,
    pub success_delay_max: Duration,

    // Concurrency ceilings
    pub max_concurrent_boards: usize,
    pub max_concurrent_pages: usize,
    pub max_concurrent_details: usize,

    // Content filter
    pub min_post_length: usize,

    // Database
    pub database_path: PathBuf,

    // Analysis
    pub hotness: HotnessWeights,
    pub analysis_window_hours: i64,
    pub retention_days: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = HotnessWeights::default();

        Ok(Self {
            boards: parse_targets(&required_env("TARGETS")?)?,
            scan_pages: parse_env_u32("CRAWLER_SCAN_PAGES", 4)?,

            max_retries: parse_env_u32("CRAWLER_MAX_RETRIES", 3)?,
            retry_base_delay: Duration::from_millis(parse_env_u64(
                "CRAWLER_RETRY_BASE_MS",
                1000,
            )?),
            fetch_timeout: Duration::from_secs(parse_env_u64("CRAWLER_TIMEOUT_SECONDS", 30)?),
            success_delay_min: Duration::from_millis(parse_env_u64(
                "CRAWLER_SUCCESS_DELAY_MIN_MS",
                500,
            )?),
            success_delay_max: Duration::from_millis(parse_env_u64(
                "CRAWLER_SUCCESS_DELAY_MAX_MS",
                1500,
            )?),

            max_concurrent_boards: parse_env_usize("CRAWLER_MAX_CONCURRENT_BOARDS", 3)?,
            max_concurrent_pages: parse_env_usize("CRAWLER_MAX_CONCURRENT_PAGES", 5)?,
            max_concurrent_details: parse_env_usize("CRAWLER_MAX_CONCURRENT_DETAILS", 8)?,

            min_post_length: parse_env_usize("FILTER_MIN_POST_CHARS", 15)?,

            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/crawler.sqlite")),

            hotness: HotnessWeights {
                view_weight: parse_env_f64("HOTNESS_VIEW_WEIGHT", defaults.view_weight)?,
                reply_weight: parse_env_f64("HOTNESS_REPLY_WEIGHT", defaults.reply_weight)?,
                like_weight: parse_env_f64("HOTNESS_LIKE_WEIGHT", defaults.like_weight)?,
                decay_window_hours: parse_env_f64(
                    "HOTNESS_DECAY_WINDOW_HOURS",
                    defaults.decay_window_hours,
                )?,
                max_score: parse_env_f64("HOTNESS_MAX_SCORE", defaults.max_score)?,
            },
            analysis_window_hours: parse_env_u64("ANALYSIS_WINDOW_HOURS", 24)? as i64,
            retention_days: optional_env("RETENTION_DAYS")
                .map(|v| {
                    v.parse().map_err(|e| ConfigError::ParseInt {
                        name: "RETENTION_DAYS".to_string(),
                        source: e,
                    })
                })
                .transpose()?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boards.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "TARGETS".to_string(),
                message: "at least one board must be configured".to_string(),
            });
        }
        for board in &self.boards {
            if Url::parse(&board.url).is_err() {
                return Err(ConfigError::InvalidValue {
                    name: "TARGETS".to_string(),
                    message: format!("invalid board URL for '{}': {}", board.name, board.url),
                });
            }
        }
        if self.scan_pages == 0 {
            return Err(ConfigError::InvalidValue {
                name: "CRAWLER_SCAN_PAGES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("CRAWLER_MAX_CONCURRENT_BOARDS", self.max_concurrent_boards),
            ("CRAWLER_MAX_CONCURRENT_PAGES", self.max_concurrent_pages),
            (
                "CRAWLER_MAX_CONCURRENT_DETAILS",
                self.max_concurrent_details,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        if self.success_delay_min > self.success_delay_max {
            return Err(ConfigError::InvalidValue {
                name: "CRAWLER_SUCCESS_DELAY_MIN_MS".to_string(),
                message: "must not exceed CRAWLER_SUCCESS_DELAY_MAX_MS".to_string(),
            });
        }
        if self.hotness.decay_window_hours <= 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "HOTNESS_DECAY_WINDOW_HOURS".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration for tests: one placeholder board, no politeness delay,
    /// millisecond retry backoff.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            boards: vec![Board {
                name: "test".to_string(),
                url: "https://forum.example.com/tag/test".to_string(),
            }],
            scan_pages: 1,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1),
            fetch_timeout: Duration::from_secs(5),
            success_delay_min: Duration::ZERO,
            success_delay_max: Duration::ZERO,
            max_concurrent_boards: 3,
            max_concurrent_pages: 5,
            max_concurrent_details: 8,
            min_post_length: 15,
            database_path: PathBuf::from("./data/test.sqlite"),
            hotness: HotnessWeights::default(),
            analysis_window_hours: 24,
            retention_days: None,
        }
    }
}

/// Parse a `TARGETS` string of the form `name1=url1;name2=url2`.
fn parse_targets(targets: &str) -> Result<Vec<Board>, ConfigError> {
    let trimmed = targets.trim().trim_matches(|c| c == '\'' || c == '"');
    let mut boards = Vec::new();

    for pair in trimmed.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((name, url)) = pair.split_once('=') else {
            return Err(ConfigError::InvalidValue {
                name: "TARGETS".to_string(),
                message: format!("expected 'name=url', got '{pair}'"),
            });
        };
        boards.push(Board {
            name: name.trim().to_string(),
            url: url.trim().to_string(),
        });
    }

    Ok(boards)
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseFloat {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
