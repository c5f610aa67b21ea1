// PHASEPREDICT CONFIGURATION
// ONE REQUIRED INPUT (MODEL PATH), THREE OPTIONAL COUNTER OVERRIDES.
// ABSENT OR UNREADABLE MODEL IS THE ONLY FATAL ERROR IN THE SYSTEM.

use std::path::PathBuf;

use thiserror::Error;

use crate::features::FeatureEvents;

pub const MODEL_PATH_ENV: &str = "SCOREP_RRL_TMM_PATH";
pub const COMPUTE_EVENT_ENV: &str = "PHASEPREDICT_COMPUTE_EVENT";
pub const CACHE_MISS_EVENT_ENV: &str = "PHASEPREDICT_CACHE_MISS_EVENT";
pub const BRANCH_EVENT_ENV: &str = "PHASEPREDICT_BRANCH_EVENT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("model path not set ({MODEL_PATH_ENV} is unset or empty)")]
    ModelPathUnset,
    #[error("model file {path} unreadable: {source}")]
    ModelUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model malformed: {0}")]
    ModelMalformed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredictorConfig {
    pub model_path: Option<PathBuf>,
    pub events: FeatureEvents,
}

impl PredictorConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: Some(model_path.into()),
            events: FeatureEvents::default(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // EMPTY VALUES COUNT AS UNSET
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut events = FeatureEvents::default();
        if let Some(v) = get(COMPUTE_EVENT_ENV) {
            events.compute = v.trim().to_string();
        }
        if let Some(v) = get(CACHE_MISS_EVENT_ENV) {
            events.cache_miss = v.trim().to_string();
        }
        if let Some(v) = get(BRANCH_EVENT_ENV) {
            events.branch = v.trim().to_string();
        }

        Self {
            model_path: get(MODEL_PATH_ENV).map(|v| PathBuf::from(v.trim())),
            events,
        }
    }

    pub fn require_model_path(&self) -> Result<&PathBuf, ConfigError> {
        self.model_path.as_ref().ok_or(ConfigError::ModelPathUnset)
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.events.metric_names()
    }
}
