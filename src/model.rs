// PHASEPREDICT PHASE-CLUSTER MODEL
// OFFLINE TRAINING PRODUCES IT, WE LOAD IT ONCE AND NEVER MUTATE IT.
//
// FILE FORMAT (JSON, OPTIONALLY GZIPPED):
//   { "<cluster id>": { "phases": [1, 2, ...],
//                       "features": { "ComputeIntensity": [min, max],
//                                     "BranchInstructions": [min, max] } } }
//
// CLUSTERS ARE KEPT IN ASCENDING ID ORDER SO FIRST-MATCH TIE-BREAKS ARE
// DETERMINISTIC ACROSS RUNS AND ACROSS RANKS.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;
use crate::features::{
    ClusterId, FeatureRange, PhaseFeatures, PhaseId, BRANCH_INSTRUCTIONS, COMPUTE_INTENSITY, NOISE,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Deserialize)]
struct RawCluster {
    #[serde(default)]
    phases: Vec<PhaseId>,
    #[serde(default)]
    features: HashMap<String, FeatureRange>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterInfo {
    pub phases: BTreeSet<PhaseId>,
    pub ranges: HashMap<String, FeatureRange>,
}

impl ClusterInfo {
    pub fn new<P, R, S>(phases: P, ranges: R) -> Self
    where
        P: IntoIterator<Item = PhaseId>,
        R: IntoIterator<Item = (S, FeatureRange)>,
        S: Into<String>,
    {
        Self {
            phases: phases.into_iter().collect(),
            ranges: ranges.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn range(&self, feature: &str) -> Option<&FeatureRange> {
        self.ranges.get(feature)
    }

    // BOTH RANGES REQUIRED. A CLUSTER MISSING EITHER CAN NEVER MATCH.
    pub fn matches(&self, f: &PhaseFeatures) -> bool {
        match (self.range(COMPUTE_INTENSITY), self.range(BRANCH_INSTRUCTIONS)) {
            (Some(ci), Some(br)) => ci.contains(f.compute_intensity) && br.contains(f.branch_density),
            _ => false,
        }
    }

    fn box_overlaps(&self, other: &ClusterInfo) -> bool {
        [COMPUTE_INTENSITY, BRANCH_INSTRUCTIONS].iter().all(|name| {
            match (self.range(name), other.range(name)) {
                (Some(a), Some(b)) => a.overlaps(b),
                _ => false,
            }
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhaseClusterModel {
    clusters: BTreeMap<ClusterId, ClusterInfo>,
}

impl PhaseClusterModel {
    pub fn from_clusters<I>(clusters: I) -> Self
    where
        I: IntoIterator<Item = (ClusterId, ClusterInfo)>,
    {
        Self {
            clusters: clusters.into_iter().collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, RawCluster> = serde_json::from_str(text)
            .map_err(|e| ConfigError::ModelMalformed(e.to_string()))?;

        let mut clusters = BTreeMap::new();
        for (key, cluster) in raw {
            let id: ClusterId = key.trim().parse().map_err(|_| {
                ConfigError::ModelMalformed(format!("cluster id {:?} is not an integer", key))
            })?;
            if id == NOISE {
                return Err(ConfigError::ModelMalformed(format!(
                    "cluster id {} collides with the NOISE sentinel", NOISE
                )));
            }
            let info = ClusterInfo {
                phases: cluster.phases.into_iter().collect(),
                ranges: cluster.features,
            };
            // "1", "01" AND " 1" PARSE TO THE SAME ID
            if clusters.insert(id, info).is_some() {
                return Err(ConfigError::ModelMalformed(format!("duplicate cluster id {}", id)));
            }
        }
        Ok(Self { clusters })
    }

    // READ, GUNZIP IF NEEDED, PARSE
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let unreadable = |source| ConfigError::ModelUnreadable {
            path: path.to_path_buf(),
            source,
        };

        let bytes = std::fs::read(path).map_err(unreadable)?;
        let text = if bytes.starts_with(&GZIP_MAGIC) {
            let mut decoder = flate2::read::MultiGzDecoder::new(bytes.as_slice());
            let mut text = String::new();
            decoder.read_to_string(&mut text).map_err(unreadable)?;
            text
        } else {
            String::from_utf8(bytes).map_err(|e| {
                ConfigError::ModelMalformed(format!("{}: {}", path.display(), e))
            })?
        };

        Self::from_json(&text).map_err(|e| match e {
            ConfigError::ModelMalformed(msg) => {
                ConfigError::ModelMalformed(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    // HIGHEST PHASE INDEX ANY CLUSTER CLAIMS. 0 FOR A MODEL WITH NO PHASES.
    pub fn max_known_phase(&self) -> PhaseId {
        self.clusters
            .values()
            .filter_map(|c| c.phases.iter().next_back().copied())
            .max()
            .unwrap_or(0)
    }

    pub fn cluster_of_phase(&self, phase: PhaseId) -> Option<ClusterId> {
        self.clusters
            .iter()
            .find(|(_, c)| c.phases.contains(&phase))
            .map(|(id, _)| *id)
    }

    // FIRST CLUSTER (ASCENDING ID) WHOSE BOX CONTAINS BOTH FEATURES
    pub fn classify(&self, features: &PhaseFeatures) -> Option<ClusterId> {
        self.clusters
            .iter()
            .find(|(_, c)| c.matches(features))
            .map(|(id, _)| *id)
    }

    pub fn get(&self, id: ClusterId) -> Option<&ClusterInfo> {
        self.clusters.get(&id)
    }

    pub fn clusters(&self) -> impl Iterator<Item = (&ClusterId, &ClusterInfo)> {
        self.clusters.iter()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    // (PHASE, FIRST OWNER, SECOND OWNER) FOR EVERY PHASE CLAIMED TWICE
    pub fn shared_phases(&self) -> Vec<(PhaseId, ClusterId, ClusterId)> {
        let mut owner: BTreeMap<PhaseId, ClusterId> = BTreeMap::new();
        let mut shared = Vec::new();
        for (id, c) in &self.clusters {
            for &p in &c.phases {
                match owner.get(&p) {
                    Some(&first) => shared.push((p, first, *id)),
                    None => {
                        owner.insert(p, *id);
                    }
                }
            }
        }
        shared
    }

    pub fn overlapping_boxes(&self) -> Vec<(ClusterId, ClusterId)> {
        let entries: Vec<(&ClusterId, &ClusterInfo)> = self.clusters.iter().collect();
        let mut pairs = Vec::new();
        for (i, (a_id, a)) in entries.iter().enumerate() {
            for (b_id, b) in &entries[i + 1..] {
                if a.box_overlaps(b) {
                    pairs.push((**a_id, **b_id));
                }
            }
        }
        pairs
    }

    // DEBUG DUMP OF EVERY CLUSTER PLUS WARNINGS FOR AMBIGUOUS MODELS
    pub fn log_summary(&self) {
        for (id, c) in &self.clusters {
            log_debug!("cluster {}: phases {:?}", id, c.phases);
            let mut names: Vec<&String> = c.ranges.keys().collect();
            names.sort();
            for name in names {
                let r = c.ranges[name];
                log_debug!("cluster {}: {} min={} max={}", id, name, r.min, r.max);
            }
            for name in [COMPUTE_INTENSITY, BRANCH_INSTRUCTIONS] {
                match c.range(name) {
                    None => log_warn!("cluster {} has no {} range, never matches unseen phases", id, name),
                    Some(r) if r.is_empty() => log_warn!("cluster {} has empty {} range [{}, {}]", id, name, r.min, r.max),
                    Some(_) => {}
                }
            }
        }
        for (phase, first, second) in self.shared_phases() {
            log_warn!("phase {} claimed by clusters {} and {}, using {}", phase, first, second, first);
        }
        for (a, b) in self.overlapping_boxes() {
            log_warn!("feature boxes of clusters {} and {} overlap, {} wins ties", a, b, a);
        }
    }
}

pub fn load(path: &Path) -> Result<PhaseClusterModel, ConfigError> {
    PhaseClusterModel::load(path)
}

pub fn max_known_phase(model: &PhaseClusterModel) -> PhaseId {
    model.max_known_phase()
}
