use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use phasepredict::collective::LocalCollective;
use phasepredict::counters::PerfBackend;
use phasepredict::{ClusterPredictor, PredictorConfig, NOISE};

static RUNNING: AtomicBool = AtomicBool::new(true);

// 8 MiB OF u64: WELL PAST MOST LAST-LEVEL CACHES
const STREAM_LEN: usize = 1 << 20;
const STRIDE: usize = 97;

// ARITHMETIC WITH A DATA-DEPENDENT BRANCH: HIGH INSTRUCTIONS PER MISS
fn compute_phase(iters: u64) -> u64 {
    let mut acc = 0x9e37_79b9_7f4a_7c15u64;
    for i in 0..iters {
        acc = acc.rotate_left(5) ^ i.wrapping_mul(0x100_0000_01b3);
        if acc & 1 == 0 {
            acc = acc.wrapping_add(i);
        }
    }
    acc
}

// STRIDED WALK OVER A LARGE BUFFER: CACHE-MISS BOUND
fn memory_phase(buf: &mut [u64], iters: u64) -> u64 {
    let mut idx = 0usize;
    let mut acc = 0u64;
    for _ in 0..iters {
        acc = acc.wrapping_add(buf[idx]);
        buf[idx] = acc;
        idx = (idx + STRIDE * 64) % buf.len();
    }
    acc
}

fn cluster_label(id: i32) -> String {
    if id == NOISE {
        "NOISE".to_string()
    } else {
        id.to_string()
    }
}

pub fn run_probe(config: PredictorConfig, phases: u32, work: u64, dump_log: bool) -> Result<()> {
    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::Relaxed);
    })?;

    let mut predictor = ClusterPredictor::new(config, PerfBackend::new(), LocalCollective);
    let mut buf = vec![1u64; STREAM_LEN];

    println!("PHASEPREDICT PROBE (CTRL+C TO EXIT)");
    println!("{:<8} {:<8} {:<8}", "PHASE", "WORK", "CLUSTER");

    let mut n = 0u32;
    while RUNNING.load(Ordering::Relaxed) {
        // THE CALL MARKS THE START OF THE NEXT PHASE
        let cluster = predictor.predict_cluster()?;
        n += 1;

        // TWO COMPUTE PHASES, ONE MEMORY PHASE
        let kind = if n % 3 == 0 { "memory" } else { "compute" };
        println!("{:<8} {:<8} {:<8}", predictor.phase(), kind, cluster_label(cluster));

        if phases > 0 && n >= phases {
            break;
        }
        if n % 3 == 0 {
            black_box(memory_phase(&mut buf, work));
        } else {
            black_box(compute_phase(work));
        }
    }

    if dump_log {
        predictor.log.dump();
    }
    predictor.log.summary();

    if let Some(history) = predictor.history() {
        let corrected: Vec<String> = history
            .iter()
            .map(|(p, c)| format!("{}:{}", p, cluster_label(*c)))
            .collect();
        if !corrected.is_empty() {
            println!("  CORRECTED HISTORY: {}", corrected.join(" "));
        }
    }

    println!("PHASEPREDICT OUT.");
    Ok(())
}
