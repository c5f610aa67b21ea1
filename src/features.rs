// PHASEPREDICT FEATURE MATH
// PURE-RUST MODULE: ZERO COUNTER OR COLLECTIVE DEPENDENCIES
// SHARED BY THE ENGINE, THE PREDICTOR, AND THE OFFLINE TESTS

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

pub type PhaseId = u32;
pub type ClusterId = i32;

// SENTINEL: DOES NOT MATCH ANY KNOWN CLUSTER
pub const NOISE: ClusterId = -2;

// FEATURE NAMES AS THEY APPEAR IN THE MODEL FILE
pub const COMPUTE_INTENSITY: &str = "ComputeIntensity";
pub const BRANCH_INSTRUCTIONS: &str = "BranchInstructions";

// DEFAULT COUNTER SET
// r04C6 IS THE RAW UOPS-RETIRED EVENT THE TRAINING PIPELINE PROFILED WITH
pub const DEFAULT_COMPUTE_EVENT: &str = "perf_raw::r04C6";
pub const DEFAULT_CACHE_MISS_EVENT: &str = "PAPI_L3_TCM";
pub const DEFAULT_BRANCH_EVENT: &str = "PAPI_BR_CN";

// METRIC NAME -> COUNTER TOTAL. REBUILT EVERY PHASE.
pub type MetricTotals = BTreeMap<String, i64>;

// INCLUSIVE [MIN, MAX] BOUND ON ONE DERIVED FEATURE
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(from = "(f64, f64)")]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    // NAN NEVER MATCHES
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn overlaps(&self, other: &FeatureRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    pub fn is_empty(&self) -> bool {
        !(self.min <= self.max)
    }
}

impl From<(f64, f64)> for FeatureRange {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

// WHICH COUNTERS FEED THE TWO RATIOS

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureEvents {
    pub compute: String,
    pub cache_miss: String,
    pub branch: String,
}

impl Default for FeatureEvents {
    fn default() -> Self {
        Self {
            compute: DEFAULT_COMPUTE_EVENT.to_string(),
            cache_miss: DEFAULT_CACHE_MISS_EVENT.to_string(),
            branch: DEFAULT_BRANCH_EVENT.to_string(),
        }
    }
}

impl FeatureEvents {
    // COUNTER SET ORDER: COMPUTE, CACHE MISS, BRANCH
    pub fn metric_names(&self) -> Vec<String> {
        vec![self.compute.clone(), self.cache_miss.clone(), self.branch.clone()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseFeatures {
    pub compute_intensity: f64,
    pub branch_density: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureGap {
    #[error("metric {0} missing from aggregated totals")]
    MissingMetric(String),
    #[error("metric {0} is zero, ratio undefined")]
    ZeroDenominator(String),
}

fn lookup(totals: &MetricTotals, name: &str) -> Result<i64, FeatureGap> {
    totals
        .get(name)
        .copied()
        .ok_or_else(|| FeatureGap::MissingMetric(name.to_string()))
}

// COMPUTE INTENSITY = COMPUTE / CACHE MISSES
// BRANCH DENSITY    = BRANCHES / COMPUTE
// ALL THREE METRICS MUST BE PRESENT. ZERO DENOMINATORS ARE A GAP, NOT INF/NAN.
pub fn compute_features(
    totals: &MetricTotals,
    events: &FeatureEvents,
) -> Result<PhaseFeatures, FeatureGap> {
    let compute = lookup(totals, &events.compute)?;
    let cache_miss = lookup(totals, &events.cache_miss)?;
    let branch = lookup(totals, &events.branch)?;

    if cache_miss == 0 {
        return Err(FeatureGap::ZeroDenominator(events.cache_miss.clone()));
    }
    if compute == 0 {
        return Err(FeatureGap::ZeroDenominator(events.compute.clone()));
    }

    Ok(PhaseFeatures {
        compute_intensity: compute as f64 / cache_miss as f64,
        branch_density: branch as f64 / compute as f64,
    })
}

// PREDICTION REGIME
// DETERMINED ONLY BY THE PHASE INDEX RELATIVE TO THE TRAINING HORIZON.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PredictionRegime {
    Lookup = 0,
    CarryOver = 1,
    Classify = 2,
}

impl PredictionRegime {
    pub fn label(self) -> &'static str {
        match self {
            Self::Lookup => "LOOKUP",
            Self::CarryOver => "CARRY",
            Self::Classify => "CLASSIFY",
        }
    }

    // PHASES BEYOND THE HORIZON GET A HISTORY ENTRY
    pub fn is_predicted(self) -> bool {
        self != Self::Lookup
    }
}

pub fn regime_for(phase: PhaseId, max_known_phase: PhaseId) -> PredictionRegime {
    if phase <= max_known_phase {
        PredictionRegime::Lookup
    } else if phase == max_known_phase + 1 {
        PredictionRegime::CarryOver
    } else {
        PredictionRegime::Classify
    }
}
