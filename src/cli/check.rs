use anyhow::Result;

use phasepredict::counters::{CounterSet, PerfBackend};
use phasepredict::{PhaseClusterModel, PredictorConfig};

// -1 ALLOWS EVERYTHING. 2 STILL ALLOWS USER-SPACE SELF-MONITORING.
const MAX_USABLE_PARANOID: i32 = 2;

fn check_paranoid() -> bool {
    match PerfBackend::paranoid_level() {
        Some(level) if level <= MAX_USABLE_PARANOID => {
            println!("  perf_event_paranoid   {} OK", level);
            true
        }
        Some(level) => {
            println!("  perf_event_paranoid   {} TOO HIGH (need <= {})", level, MAX_USABLE_PARANOID);
            false
        }
        None => {
            println!("  perf_event_paranoid   NOT FOUND -- kernel built without perf events?");
            false
        }
    }
}

fn check_counters(config: &PredictorConfig) -> bool {
    let mut set = CounterSet::new(PerfBackend::new());
    set.initialize();
    set.create_counter_set(&config.metric_names());

    let mut ok = true;
    for (name, &on) in set.names().iter().zip(set.active()) {
        if on {
            println!("  {:<24}OK", name);
        } else {
            println!("  {:<24}UNAVAILABLE", name);
            ok = false;
        }
    }
    if ok {
        set.start();
        let values = set.read();
        println!("  FIRST READ            {:?}", values);
    }
    ok
}

fn check_model(config: &PredictorConfig) -> bool {
    let path = match config.require_model_path() {
        Ok(p) => p,
        Err(e) => {
            println!("  MODEL                 {}", e);
            return false;
        }
    };
    match PhaseClusterModel::load(path) {
        Ok(model) => {
            println!("  MODEL                 {} ({} clusters, horizon {})",
                path.display(), model.len(), model.max_known_phase());
            let shared = model.shared_phases().len();
            let overlaps = model.overlapping_boxes().len();
            if shared > 0 || overlaps > 0 {
                println!("  AMBIGUITY             {} shared phases, {} overlapping boxes", shared, overlaps);
            }
            true
        }
        Err(e) => {
            println!("  MODEL                 {}", e);
            false
        }
    }
}

pub fn run_check(config: &PredictorConfig) -> Result<()> {
    println!("PHASEPREDICT ENVIRONMENT CHECK");
    println!();

    let mut ok = true;

    println!("PERF EVENTS:");
    if !check_paranoid() {
        ok = false;
    }
    println!();

    println!("COUNTER SET:");
    if !check_counters(config) {
        ok = false;
    }
    println!();

    println!("MODEL:");
    if !check_model(config) {
        ok = false;
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        if PerfBackend::paranoid_level().is_some_and(|l| l > MAX_USABLE_PARANOID) {
            println!("  Lower the limit: sysctl kernel.perf_event_paranoid=2");
        }
        if config.model_path.is_none() {
            println!("  Point {} at a trained model", phasepredict::config::MODEL_PATH_ENV);
        }
        std::process::exit(1);
    }

    Ok(())
}
