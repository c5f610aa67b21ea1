// PHASEPREDICT PREDICTION ENGINE
// ONE CALL PER PHASE. THREE REGIMES, ONE-PHASE LAG CORRECTION.
//
//   LOOKUP    (phase <= horizon):     TRAINING DATA KNOWS THE ANSWER. NO HISTORY.
//   CARRY     (phase == horizon + 1): NO FEATURES YET. REUSE THE HORIZON'S CLUSTER.
//   CLASSIFY  (phase >  horizon + 1): TOTALS DESCRIBE phase - 1, THE PHASE THAT
//                                     JUST ENDED. CLASSIFY IT, CORRECT ITS
//                                     PROVISIONAL ENTRY, AND REUSE THE RESULT AS
//                                     THE PROVISIONAL GUESS FOR phase.
//
// EVERY PHASE BEYOND THE HORIZON GETS A ZERO-LATENCY GUESS WHEN IT STARTS AND
// A FEATURE-DERIVED VALUE ONE CALL LATER.

use std::collections::BTreeMap;

use crate::features::{
    compute_features, regime_for, ClusterId, FeatureEvents, MetricTotals, PhaseFeatures, PhaseId,
    PredictionRegime, NOISE,
};
use crate::model::PhaseClusterModel;

// PHASE -> CLUSTER. ONLY PHASES BEYOND THE HORIZON.
pub type PredictionHistory = BTreeMap<PhaseId, ClusterId>;

// WHAT ONE predict() CALL DID. FEEDS THE PHASE LOG.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Outcome {
    pub phase: PhaseId,
    pub cluster: ClusterId,
    pub regime: PredictionRegime,
    pub features: Option<PhaseFeatures>,
    pub corrected: Option<Correction>,
}

// PROVISIONAL VALUE FOR phase - 1 REPLACED BY THE FEATURE-DERIVED ONE
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Correction {
    pub phase: PhaseId,
    pub provisional: ClusterId,
    pub corrected: ClusterId,
}

pub struct PredictionEngine {
    model: PhaseClusterModel,
    max_known_phase: PhaseId,
    events: FeatureEvents,
    history: PredictionHistory,
    current_guess: ClusterId,
}

impl PredictionEngine {
    pub fn new(model: PhaseClusterModel, events: FeatureEvents) -> Self {
        let max_known_phase = model.max_known_phase();
        Self {
            model,
            max_known_phase,
            events,
            history: PredictionHistory::new(),
            current_guess: NOISE,
        }
    }

    pub fn model(&self) -> &PhaseClusterModel {
        &self.model
    }

    pub fn max_known_phase(&self) -> PhaseId {
        self.max_known_phase
    }

    pub fn history(&self) -> &PredictionHistory {
        &self.history
    }

    pub fn current_guess(&self) -> ClusterId {
        self.current_guess
    }

    pub fn predict(&mut self, phase: PhaseId, totals: &MetricTotals) -> ClusterId {
        self.predict_detailed(phase, totals).cluster
    }

    pub fn predict_detailed(&mut self, phase: PhaseId, totals: &MetricTotals) -> Outcome {
        let regime = regime_for(phase, self.max_known_phase);
        let mut features = None;

        let cluster = match regime {
            PredictionRegime::Lookup => self.lookup(phase),
            PredictionRegime::CarryOver => self.lookup(self.max_known_phase),
            PredictionRegime::Classify => match compute_features(totals, &self.events) {
                Ok(f) => {
                    features = Some(f);
                    log_debug!(
                        "phase {}: compute_intensity={} branch_density={}",
                        phase - 1, f.compute_intensity, f.branch_density
                    );
                    self.model.classify(&f).unwrap_or(NOISE)
                }
                Err(gap) => {
                    log_warn!("phase {}: {}, classifying as NOISE", phase - 1, gap);
                    NOISE
                }
            },
        };

        let mut corrected = None;
        if regime.is_predicted() {
            // LAG CORRECTION: THE VALUE JUST COMPUTED DESCRIBES phase - 1
            if let Some(prev) = self.history.get_mut(&(phase - 1)) {
                corrected = Some(Correction {
                    phase: phase - 1,
                    provisional: *prev,
                    corrected: cluster,
                });
                *prev = cluster;
            }
            // PROVISIONAL UNTIL THE NEXT CALL
            self.history.insert(phase, cluster);
        }

        self.current_guess = cluster;
        Outcome {
            phase,
            cluster,
            regime,
            features,
            corrected,
        }
    }

    // PHASE HOLES IN THE TRAINING DATA (OR AN EMPTY MODEL) RESOLVE TO NOISE
    fn lookup(&self, phase: PhaseId) -> ClusterId {
        match self.model.cluster_of_phase(phase) {
            Some(id) => id,
            None => {
                log_warn!("phase {} not present in any trained cluster", phase);
                NOISE
            }
        }
    }
}
