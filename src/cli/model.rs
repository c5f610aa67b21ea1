use anyhow::{Context, Result};

use phasepredict::features::{BRANCH_INSTRUCTIONS, COMPUTE_INTENSITY};
use phasepredict::{PhaseClusterModel, PredictorConfig};

fn range_cell(model: &PhaseClusterModel, id: i32, feature: &str) -> String {
    match model.get(id).and_then(|c| c.range(feature)) {
        Some(r) => format!("[{:.4}, {:.4}]", r.min, r.max),
        None => "-".to_string(),
    }
}

pub fn run_model(config: &PredictorConfig) -> Result<()> {
    let path = config.require_model_path()?;
    let model = PhaseClusterModel::load(path)
        .with_context(|| format!("loading phase-cluster model from {}", path.display()))?;

    println!("MODEL:           {}", path.display());
    println!("CLUSTERS:        {}", model.len());
    println!("HORIZON:         phase {}", model.max_known_phase());
    println!();

    println!("{:<9} {:<8} {:<24} {:<24} {}",
        "CLUSTER", "PHASES", COMPUTE_INTENSITY, BRANCH_INSTRUCTIONS, "PHASE IDS");
    println!("{}", "-".repeat(90));
    for (id, info) in model.clusters() {
        let ids: Vec<String> = info.phases.iter().map(|p| p.to_string()).collect();
        println!("{:<9} {:<8} {:<24} {:<24} {}",
            id, info.phases.len(),
            range_cell(&model, *id, COMPUTE_INTENSITY),
            range_cell(&model, *id, BRANCH_INSTRUCTIONS),
            ids.join(","));
    }

    for (phase, first, second) in model.shared_phases() {
        println!("WARNING: phase {} in clusters {} and {}", phase, first, second);
    }
    for (a, b) in model.overlapping_boxes() {
        println!("WARNING: feature boxes of {} and {} overlap", a, b);
    }

    Ok(())
}
