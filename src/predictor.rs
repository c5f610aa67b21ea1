// PHASEPREDICT LIFECYCLE
// ONE predict_cluster() CALL PER PHASE BOUNDARY, DRIVEN BY THE HOST PROGRAM.
//
// FIRST CALL (BOOTSTRAP):
//   LOAD MODEL -> HORIZON -> PREDICT PHASE 1 -> INIT COUNTERS -> CREATE SET
//   -> BARRIER -> START COUNTING
// EVERY LATER CALL (STEP):
//   READ -> ACCUMULATE -> GLOBALIZE -> PREDICT + CORRECT -> RESET -> BARRIER
//
// SINGLE WRITER: THE HOST SERIALIZES CALLS. NO INTERNAL THREADS.

use anyhow::{Context, Result};

use crate::aggregate::{self, ThreadSamples};
use crate::collective::{self, Collective};
use crate::config::PredictorConfig;
use crate::counters::{current_thread_id, CounterBackend, CounterSet};
use crate::engine::{Outcome, PredictionEngine, PredictionHistory};
use crate::event::PhaseLog;
use crate::features::{ClusterId, MetricTotals, PhaseId};
use crate::model::PhaseClusterModel;

pub struct ClusterPredictor<B: CounterBackend, C: Collective> {
    config: PredictorConfig,
    counters: CounterSet<B>,
    collective: C,
    engine: Option<PredictionEngine>,
    samples: ThreadSamples,
    phase: PhaseId,
    pub log: PhaseLog,
}

impl<B: CounterBackend, C: Collective> ClusterPredictor<B, C> {
    pub fn new(config: PredictorConfig, backend: B, collective: C) -> Self {
        Self {
            config,
            counters: CounterSet::new(backend),
            collective,
            engine: None,
            samples: ThreadSamples::new(),
            phase: 0,
            log: PhaseLog::new(),
        }
    }

    // THE ENTRY POINT. Err ONLY ON THE FIRST CALL, FOR A BAD MODEL PATH.
    pub fn predict_cluster(&mut self) -> Result<ClusterId> {
        if self.engine.is_none() {
            return self.bootstrap();
        }
        Ok(self.step())
    }

    // LOAD THE MODEL NAMED BY THE CONFIG, THEN BOOTSTRAP
    pub fn bootstrap(&mut self) -> Result<ClusterId> {
        let path = self.config.require_model_path()?.clone();
        let model = PhaseClusterModel::load(&path)
            .with_context(|| format!("loading phase-cluster model from {}", path.display()))?;
        Ok(self.bootstrap_with(model))
    }

    // BOOTSTRAP WITH AN ALREADY-LOADED MODEL. ONCE BOOTSTRAPPED THIS IS A PLAIN STEP.
    pub fn bootstrap_with(&mut self, model: PhaseClusterModel) -> ClusterId {
        if self.engine.is_some() {
            log_warn!("predictor already bootstrapped, ignoring second model");
            return self.step();
        }

        model.log_summary();
        let engine = PredictionEngine::new(model, self.config.events.clone());
        log_info!(
            "predictor: {} clusters, training horizon at phase {}",
            engine.model().len(),
            engine.max_known_phase()
        );
        let engine = self.engine.insert(engine);

        self.phase = 1;
        let outcome = engine.predict_detailed(self.phase, &MetricTotals::new());

        self.counters.initialize();
        let names = self.config.metric_names();
        self.counters.create_counter_set(&names);
        collective::synchronize(&mut self.collective);
        self.counters.start();

        self.finish(outcome)
    }

    // ONE PHASE BOUNDARY AFTER BOOTSTRAP
    pub fn step(&mut self) -> ClusterId {
        let Some(engine) = self.engine.as_mut() else {
            log_error!("predictor: step before bootstrap");
            return crate::features::NOISE;
        };
        self.phase += 1;

        // SAMPLE IS CONSUMED AND CLEARED BEFORE THE NEXT ONE STARTS
        self.samples.clear();
        self.samples.record(current_thread_id(), self.counters.read());
        let width = self.counters.names().len();
        let process = aggregate::accumulate(&self.samples, width);
        let global = aggregate::globalize(&mut self.collective, process);
        self.samples.clear();
        let totals = aggregate::to_totals(self.counters.names(), &global, self.counters.active());

        let outcome = engine.predict_detailed(self.phase, &totals);

        self.counters.reset();
        collective::synchronize(&mut self.collective);

        self.finish(outcome)
    }

    fn finish(&mut self, outcome: Outcome) -> ClusterId {
        if let Some(c) = outcome.corrected {
            log_debug!("phase {} corrected {} -> {}", c.phase, c.provisional, c.corrected);
        }
        log_debug!(
            "phase {} [{}]: cluster {}",
            outcome.phase,
            outcome.regime.label(),
            outcome.cluster
        );
        self.log.record(&outcome);
        outcome.cluster
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.engine.is_some()
    }

    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    pub fn engine(&self) -> Option<&PredictionEngine> {
        self.engine.as_ref()
    }

    pub fn history(&self) -> Option<&PredictionHistory> {
        self.engine.as_ref().map(|e| e.history())
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn counters(&self) -> &CounterSet<B> {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut CounterSet<B> {
        &mut self.counters
    }

    pub fn collective(&self) -> &C {
        &self.collective
    }
}
