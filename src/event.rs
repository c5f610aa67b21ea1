// PHASEPREDICT PHASE LOG
// RECORDS ONE ENTRY PER PHASE BOUNDARY
// PRE-ALLOCATED RING BUFFER. NO HEAP ALLOCATION WHILE THE HOST RUNS.
// WRAPS AROUND AT CAPACITY -- OLDEST ENTRIES OVERWRITTEN.

use std::collections::BTreeMap;

use crate::engine::Outcome;
use crate::features::{ClusterId, PhaseId, PredictionRegime, NOISE};

const MAX_RECORDS: usize = 8192;

#[derive(Clone, Copy)]
pub struct PhaseRecord {
    pub ts_ns: u64,
    pub phase: PhaseId,
    pub cluster: ClusterId,
    pub regime: PredictionRegime,
    // FEATURES OF phase - 1. NAN WHEN NOT COMPUTED.
    pub compute_intensity: f64,
    pub branch_density: f64,
    pub corrected: bool,
}

const EMPTY: PhaseRecord = PhaseRecord {
    ts_ns: 0,
    phase: 0,
    cluster: NOISE,
    regime: PredictionRegime::Lookup,
    compute_intensity: f64::NAN,
    branch_density: f64::NAN,
    corrected: false,
};

pub struct PhaseLog {
    records: Vec<PhaseRecord>,
    head: usize,
    len: usize,
}

impl Default for PhaseLog {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseLog {
    pub fn new() -> Self {
        Self {
            records: vec![EMPTY; MAX_RECORDS],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // OVERWRITES OLDEST ENTRY WHEN FULL
    pub fn record(&mut self, outcome: &Outcome) {
        let (ci, br) = match outcome.features {
            Some(f) => (f.compute_intensity, f.branch_density),
            None => (f64::NAN, f64::NAN),
        };
        self.records[self.head] = PhaseRecord {
            ts_ns: now_ns(),
            phase: outcome.phase,
            cluster: outcome.cluster,
            regime: outcome.regime,
            compute_intensity: ci,
            branch_density: br,
            corrected: outcome.corrected.is_some_and(|c| c.provisional != c.corrected),
        };
        self.head = (self.head + 1) % MAX_RECORDS;
        if self.len < MAX_RECORDS {
            self.len += 1;
        }
    }

    // ITERATE RECORDS IN CHRONOLOGICAL ORDER
    pub fn iter_chronological(&self) -> impl Iterator<Item = &PhaseRecord> {
        let start = if self.len < MAX_RECORDS { 0 } else { self.head };
        (0..self.len).map(move |i| &self.records[(start + i) % MAX_RECORDS])
    }

    // DUMP THE PHASE TABLE
    pub fn dump(&self) {
        let mut iter = self.iter_chronological();
        let Some(first) = iter.next() else {
            return;
        };
        let base_ts = first.ts_ns;

        println!("\n{:<10} {:<8} {:<9} {:<8} {:<12} {:<12} {:<6}",
            "TIME_S", "PHASE", "REGIME", "CLUSTER", "CI(P-1)", "BR(P-1)", "FIXED");
        println!("{}", "-".repeat(72));

        for r in std::iter::once(first).chain(iter) {
            let elapsed_s = (r.ts_ns - base_ts) as f64 / 1_000_000_000.0;
            println!("{:<10.3} {:<8} {:<9} {:<8} {:<12.4} {:<12.4} {:<6}",
                elapsed_s, r.phase, r.regime.label(), cluster_label(r.cluster),
                r.compute_intensity, r.branch_density,
                if r.corrected { "yes" } else { "" });
        }

        if self.len == MAX_RECORDS {
            println!("\n(RING BUFFER WRAPPED -- SHOWING MOST RECENT {} PHASES)", MAX_RECORDS);
        }
        println!("TOTAL PHASES: {}", self.len);
    }

    // SUMMARY STATISTICS
    pub fn summary(&self) {
        if self.len == 0 {
            return;
        }

        let mut per_regime = [0u64; 3];
        let mut per_cluster: BTreeMap<ClusterId, u64> = BTreeMap::new();
        let mut corrections = 0u64;
        for r in self.iter_chronological() {
            per_regime[r.regime as usize] += 1;
            *per_cluster.entry(r.cluster).or_insert(0) += 1;
            if r.corrected {
                corrections += 1;
            }
        }
        let noise = per_cluster.get(&NOISE).copied().unwrap_or(0);

        println!("\n{}", "=".repeat(50));
        println!("PHASEPREDICT SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  PHASES:            {}", self.len);
        println!("  REGIMES:           LOOKUP {} / CARRY {} / CLASSIFY {}",
            per_regime[0], per_regime[1], per_regime[2]);
        for (id, count) in &per_cluster {
            println!("  CLUSTER {:<10} {}", cluster_label(*id), count);
        }
        println!("  NOISE RATE:        {:.1}%", noise as f64 / self.len as f64 * 100.0);
        println!("  LAG CORRECTIONS:   {}", corrections);
    }
}

fn cluster_label(id: ClusterId) -> String {
    if id == NOISE {
        "NOISE".to_string()
    } else {
        id.to_string()
    }
}

fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Correction;
    use crate::features::PhaseFeatures;

    fn outcome(phase: PhaseId, cluster: ClusterId) -> Outcome {
        Outcome {
            phase,
            cluster,
            regime: PredictionRegime::Lookup,
            features: None,
            corrected: None,
        }
    }

    #[test]
    fn record_stores_outcome() {
        let mut log = PhaseLog::new();
        assert_eq!(log.len, 0);

        log.record(&Outcome {
            phase: 9,
            cluster: 3,
            regime: PredictionRegime::Classify,
            features: Some(PhaseFeatures { compute_intensity: 1.5, branch_density: 0.25 }),
            corrected: Some(Correction { phase: 8, provisional: 2, corrected: 3 }),
        });
        assert_eq!(log.len, 1);
        let r = &log.records[0];
        assert_eq!(r.phase, 9);
        assert_eq!(r.cluster, 3);
        assert_eq!(r.regime, PredictionRegime::Classify);
        assert_eq!(r.compute_intensity, 1.5);
        assert_eq!(r.branch_density, 0.25);
        assert!(r.corrected);
        assert!(r.ts_ns > 0);
    }

    #[test]
    fn unchanged_correction_not_flagged() {
        let mut log = PhaseLog::new();
        let mut o = outcome(5, 2);
        o.corrected = Some(Correction { phase: 4, provisional: 2, corrected: 2 });
        log.record(&o);
        assert!(!log.records[0].corrected);
        assert!(log.records[0].compute_intensity.is_nan());
    }

    #[test]
    fn ring_buffer_wraps() {
        let mut log = PhaseLog::new();

        // FILL TO CAPACITY
        for i in 0..MAX_RECORDS {
            log.record(&outcome(i as PhaseId + 1, 1));
        }
        assert_eq!(log.len, MAX_RECORDS);
        assert_eq!(log.head, 0); // WRAPPED BACK TO START

        // WRITE ONE MORE -- OVERWRITES OLDEST
        log.record(&outcome(9999, 1));
        assert_eq!(log.len, MAX_RECORDS);
        assert_eq!(log.head, 1);
        assert_eq!(log.records[0].phase, 9999);

        // CHRONOLOGICAL ITERATION STARTS FROM OLDEST (INDEX 1)
        let ordered: Vec<PhaseId> = log.iter_chronological().map(|r| r.phase).collect();
        assert_eq!(ordered[0], 2); // OLDEST SURVIVING ENTRY
        assert_eq!(*ordered.last().unwrap(), 9999); // NEWEST
        assert_eq!(ordered.len(), MAX_RECORDS);
    }

    #[test]
    fn summary_no_panic_empty() {
        let log = PhaseLog::new();
        log.summary(); // SHOULD NOT PANIC WITH 0 RECORDS
    }

    #[test]
    fn dump_no_panic() {
        let mut log = PhaseLog::new();
        log.record(&outcome(1, 1));
        log.record(&outcome(2, NOISE));
        log.dump(); // SHOULD NOT PANIC
        log.summary();
    }
}
