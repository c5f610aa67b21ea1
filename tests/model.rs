// PHASEPREDICT MODEL LOADER TESTS
// JSON AND GZIPPED FILES, HORIZON, AMBIGUITY DETECTION, CONFIGURATION ERRORS

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use phasepredict::config::ConfigError;
use phasepredict::features::{PhaseFeatures, BRANCH_INSTRUCTIONS, COMPUTE_INTENSITY};
use phasepredict::model::{self, PhaseClusterModel};

const TWO_CLUSTERS: &str = r#"{
    "1": {"phases": [1, 2], "features": {"ComputeIntensity": [0.0, 1.0], "BranchInstructions": [0.0, 1.0]}},
    "2": {"phases": [3], "features": {"ComputeIntensity": [1.0, 2.0], "BranchInstructions": [1.0, 2.0]}}
}"#;

fn write_plain(text: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(text.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

fn write_gzip(text: &str) -> NamedTempFile {
    let f = tempfile::Builder::new().suffix(".json.gz").tempfile().unwrap();
    let mut enc = GzEncoder::new(f.reopen().unwrap(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap();
    f
}

#[test]
fn load_plain_json() {
    let f = write_plain(TWO_CLUSTERS);
    let m = model::load(f.path()).unwrap();
    assert_eq!(m.len(), 2);
    assert_eq!(model::max_known_phase(&m), 3);
    assert_eq!(m.cluster_of_phase(2), Some(1));
    assert_eq!(m.cluster_of_phase(3), Some(2));
    assert_eq!(m.cluster_of_phase(4), None);
}

#[test]
fn load_gzipped_json_matches_plain() {
    let plain = model::load(write_plain(TWO_CLUSTERS).path()).unwrap();
    let gz = model::load(write_gzip(TWO_CLUSTERS).path()).unwrap();
    assert_eq!(plain, gz);
}

#[test]
fn ranges_survive_loading() {
    let m = model::load(write_plain(TWO_CLUSTERS).path()).unwrap();
    let c = m.get(2).unwrap();
    let ci = c.range(COMPUTE_INTENSITY).unwrap();
    assert_eq!((ci.min, ci.max), (1.0, 2.0));
    assert!(c.range(BRANCH_INSTRUCTIONS).is_some());
}

#[test]
fn loaded_model_classifies() {
    let m = model::load(write_plain(TWO_CLUSTERS).path()).unwrap();
    let hit = PhaseFeatures { compute_intensity: 1.5, branch_density: 1.5 };
    let miss = PhaseFeatures { compute_intensity: 5.0, branch_density: 5.0 };
    assert_eq!(m.classify(&hit), Some(2));
    assert_eq!(m.classify(&miss), None);
}

#[test]
fn extra_features_are_carried_but_ignored() {
    let text = r#"{"4": {"phases": [1], "features": {
        "ComputeIntensity": [0, 10], "BranchInstructions": [0, 10], "MemoryBandwidth": [3, 4]}}}"#;
    let m = model::load(write_plain(text).path()).unwrap();
    let hit = PhaseFeatures { compute_intensity: 1.0, branch_density: 1.0 };
    assert_eq!(m.classify(&hit), Some(4));
    assert!(m.get(4).unwrap().range("MemoryBandwidth").is_some());
}

#[test]
fn cluster_missing_a_range_never_matches() {
    let text = r#"{"1": {"phases": [1], "features": {"ComputeIntensity": [0, 10]}}}"#;
    let m = model::load(write_plain(text).path()).unwrap();
    let f = PhaseFeatures { compute_intensity: 1.0, branch_density: 1.0 };
    assert_eq!(m.classify(&f), None);
}

#[test]
fn empty_model_has_zero_horizon() {
    let m = model::load(write_plain("{}").path()).unwrap();
    assert!(m.is_empty());
    assert_eq!(m.max_known_phase(), 0);
}

#[test]
fn shared_phase_and_overlap_reported() {
    let text = r#"{
        "3": {"phases": [1, 2], "features": {"ComputeIntensity": [0, 2], "BranchInstructions": [0, 2]}},
        "7": {"phases": [2], "features": {"ComputeIntensity": [1, 3], "BranchInstructions": [1, 3]}}
    }"#;
    let m = model::load(write_plain(text).path()).unwrap();
    assert_eq!(m.shared_phases(), vec![(2, 3, 7)]);
    assert_eq!(m.overlapping_boxes(), vec![(3, 7)]);

    // FIRST MATCH IN ASCENDING ID ORDER
    assert_eq!(m.cluster_of_phase(2), Some(3));
    let f = PhaseFeatures { compute_intensity: 1.5, branch_density: 1.5 };
    assert_eq!(m.classify(&f), Some(3));
}

// === CONFIGURATION ERRORS ===

#[test]
fn missing_file_is_unreadable() {
    let err = PhaseClusterModel::load(Path::new("/nonexistent/phasepredict/model.json")).unwrap_err();
    assert!(matches!(err, ConfigError::ModelUnreadable { .. }));
}

#[test]
fn garbage_is_malformed() {
    let err = model::load(write_plain("not json at all").path()).unwrap_err();
    assert!(matches!(err, ConfigError::ModelMalformed(_)));
}

#[test]
fn non_integer_cluster_id_is_malformed() {
    let text = r#"{"alpha": {"phases": [1], "features": {}}}"#;
    let err = model::load(write_plain(text).path()).unwrap_err();
    assert!(matches!(err, ConfigError::ModelMalformed(_)));
}

#[test]
fn noise_cluster_id_is_malformed() {
    let text = r#"{"-2": {"phases": [1], "features": {}}}"#;
    let err = model::load(write_plain(text).path()).unwrap_err();
    assert!(matches!(err, ConfigError::ModelMalformed(_)));
}

#[test]
fn truncated_gzip_is_unreadable() {
    let mut bytes = Vec::new();
    let mut enc = GzEncoder::new(&mut bytes, Compression::default());
    enc.write_all(TWO_CLUSTERS.as_bytes()).unwrap();
    enc.finish().unwrap();
    bytes.truncate(bytes.len() / 2);

    let mut f = NamedTempFile::new().unwrap();
    f.write_all(&bytes).unwrap();
    f.flush().unwrap();

    let err = model::load(f.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ModelUnreadable { .. }));
}

#[test]
fn duplicate_cluster_id_is_malformed() {
    // "1" AND "01" NAME THE SAME CLUSTER
    let text = r#"{"1": {"phases": [1, 2]}, "01": {"phases": [3, 4, 5]}}"#;
    for _ in 0..16 {
        let err = PhaseClusterModel::from_json(text).unwrap_err();
        assert!(matches!(err, ConfigError::ModelMalformed(ref m) if m.contains("duplicate cluster id 1")));
    }

    let padded = r#"{"2": {"phases": [1]}, " 2": {"phases": [2]}}"#;
    assert!(matches!(PhaseClusterModel::from_json(padded), Err(ConfigError::ModelMalformed(_))));
}

#[test]
fn concatenated_gzip_members_are_all_read() {
    // SPLIT ONE DOCUMENT ACROSS TWO GZIP MEMBERS
    let (head, tail) = TWO_CLUSTERS.split_at(TWO_CLUSTERS.len() / 2);
    let mut bytes = Vec::new();
    for part in [head, tail] {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(part.as_bytes()).unwrap();
        bytes.extend(enc.finish().unwrap());
    }

    let mut f = NamedTempFile::new().unwrap();
    f.write_all(&bytes).unwrap();
    f.flush().unwrap();

    let m = model::load(f.path()).unwrap();
    assert_eq!(m, model::load(write_plain(TWO_CLUSTERS).path()).unwrap());
    assert_eq!(m.max_known_phase(), 3);
}
