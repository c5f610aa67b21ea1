// PHASEPREDICT METRIC AGGREGATOR
// PER-THREAD SNAPSHOTS -> PER-PROCESS TOTAL -> (OPTIONALLY) GLOBAL TOTAL
//
// VECTORS ARE ALWAYS THE CONFIGURED WIDTH, EVEN WHEN SOME METRICS FAILED TO
// OPEN. EVERY RANK MUST HAND THE SAME LENGTH TO THE ALL-REDUCE.

use std::collections::BTreeMap;

use crate::collective::Collective;
use crate::features::MetricTotals;

// THREAD ID -> RAW COUNTER VALUES SINCE THE LAST RESET
#[derive(Debug, Default, Clone)]
pub struct ThreadSamples {
    per_thread: BTreeMap<u64, Vec<i64>>,
}

impl ThreadSamples {
    pub fn new() -> Self {
        Self::default()
    }

    // A THREAD REPORTING TWICE IN ONE PHASE REPLACES ITS EARLIER SNAPSHOT
    pub fn record(&mut self, thread: u64, values: Vec<i64>) {
        self.per_thread.insert(thread, values);
    }

    pub fn clear(&mut self) {
        self.per_thread.clear();
    }

    pub fn len(&self) -> usize {
        self.per_thread.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_thread.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Vec<i64>)> {
        self.per_thread.iter()
    }
}

// SUM METRIC-WISE ACROSS EVERY THREAD THAT REPORTED.
// SHORT SNAPSHOTS CONTRIBUTE ONLY THE SLOTS THEY HAVE.
pub fn accumulate(samples: &ThreadSamples, width: usize) -> Vec<i64> {
    let mut total = vec![0i64; width];
    for (_, values) in samples.iter() {
        for (slot, v) in total.iter_mut().zip(values.iter()) {
            *slot = slot.wrapping_add(*v);
        }
    }
    total
}

// ALL-REDUCE WHEN A RUNTIME IS UP, IDENTITY OTHERWISE
pub fn globalize<C: Collective + ?Sized>(collective: &mut C, mut totals: Vec<i64>) -> Vec<i64> {
    if collective.is_initialized() {
        collective.all_reduce_sum(&mut totals);
    }
    totals
}

// NAME THE SLOTS. INACTIVE METRICS ARE LEFT OUT SO LOOKUPS SEE THEM AS MISSING.
pub fn to_totals(names: &[String], values: &[i64], active: &[bool]) -> MetricTotals {
    let mut totals = MetricTotals::new();
    for ((name, &v), &on) in names.iter().zip(values.iter()).zip(active.iter()) {
        if on {
            totals.insert(name.clone(), v);
        }
    }
    totals
}
