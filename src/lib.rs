// PHASEPREDICT LIBRARY
// ONLINE PHASE-CLUSTER PREDICTION FROM HARDWARE PERFORMANCE COUNTERS
//
// ONE CALL PER PHASE BOUNDARY. COUNTERS ACCUMULATE BETWEEN CALLS, THE ENGINE
// CLASSIFIES THE PHASE THAT JUST ENDED AND CORRECTS ITS PROVISIONAL GUESS.
//
// PURE MODULES (features, model, engine, aggregate, event) HAVE ZERO OS
// DEPENDENCIES AND ARE TESTABLE OFFLINE. counters OWNS THE perf_event_open FDS.

// LOGGING FACADE. ALL LIBRARY DIAGNOSTICS GO THROUGH TRACING.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { ::tracing::info!($($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { ::tracing::error!($($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { ::tracing::debug!($($arg)*) };
}

pub mod aggregate;
pub mod collective;
pub mod config;
pub mod counters;
pub mod engine;
pub mod event;
pub mod features;
pub mod ffi;
pub mod model;
pub mod predictor;

pub const LOG_FILTER_ENV: &str = "PHASEPREDICT_LOG";

// INSTALL A FMT SUBSCRIBER UNLESS THE HOST ALREADY HAS ONE.
// PHASEPREDICT_LOG OVERRIDES THE DEFAULT FILTER.
pub fn init_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub use config::{ConfigError, PredictorConfig};
pub use engine::PredictionEngine;
pub use features::{ClusterId, PhaseId, NOISE};
pub use model::PhaseClusterModel;
pub use predictor::ClusterPredictor;
