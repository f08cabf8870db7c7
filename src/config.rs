//! Application-level configuration loading, including the runtime question pool.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::questions::QuestionCard;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ROULETTE_ARENA_CONFIG_PATH";
/// Round length handed to rooms that do not request their own.
const DEFAULT_ROUND_DURATION_SECS: u64 = 180;
/// Odds that a wrong answer leaves the player alive.
const DEFAULT_SURVIVAL_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    round_duration_secs: u64,
    survival_probability: f64,
    questions: Vec<QuestionCard>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        questions = app_config.questions.len(),
                        duration = app_config.round_duration_secs,
                        "loaded arena configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Round length in seconds assigned to rooms that do not override it.
    pub fn round_duration_secs(&self) -> u64 {
        self.round_duration_secs
    }

    /// Probability that a wrong answer resolves the trigger as `alive`.
    pub fn survival_probability(&self) -> f64 {
        self.survival_probability
    }

    /// Clone of the configured question cards, in pool order.
    pub fn questions(&self) -> Vec<QuestionCard> {
        self.questions.clone()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            round_duration_secs: DEFAULT_ROUND_DURATION_SECS,
            survival_probability: DEFAULT_SURVIVAL_PROBABILITY,
            questions: default_questions(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    round_duration_secs: Option<u64>,
    survival_probability: Option<f64>,
    questions: Option<Vec<RawQuestion>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let survival_probability = match value.survival_probability {
            Some(p) if (0.0..=1.0).contains(&p) => p,
            Some(p) => {
                warn!(
                    probability = p,
                    "survival probability out of range; using default"
                );
                DEFAULT_SURVIVAL_PROBABILITY
            }
            None => DEFAULT_SURVIVAL_PROBABILITY,
        };

        let questions = match value.questions {
            Some(raw) if !raw.is_empty() => raw.into_iter().map(Into::into).collect(),
            Some(_) => {
                warn!("configured question pool is empty; using built-in pool");
                default_questions()
            }
            None => default_questions(),
        };

        Self {
            round_duration_secs: value
                .round_duration_secs
                .unwrap_or(DEFAULT_ROUND_DURATION_SECS),
            survival_probability,
            questions,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single question inside the configuration file.
struct RawQuestion {
    id: String,
    prompt: String,
    answer: String,
}

impl From<RawQuestion> for QuestionCard {
    fn from(value: RawQuestion) -> Self {
        Self {
            id: value.id,
            prompt: value.prompt,
            answer: value.answer,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in question pool shipped with the binary.
fn default_questions() -> Vec<QuestionCard> {
    vec![
        QuestionCard {
            id: "q1".into(),
            prompt: "拼写: 机会".into(),
            answer: "chance".into(),
        },
        QuestionCard {
            id: "q2".into(),
            prompt: "拼写: 危险".into(),
            answer: "danger".into(),
        },
        QuestionCard {
            id: "q3".into(),
            prompt: "拼写: 生存".into(),
            answer: "survival".into(),
        },
    ]
}
