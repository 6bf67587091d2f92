// Copyright @yucwang 2026

use crate::core::sampler::Sampler;
use crate::guiding::adam::AdamOptimizer;
use crate::guiding::dtree::{ DTree, DTreeError };
use crate::guiding::{ BsdfSamplingFractionLoss, DirectionalFilter };
use crate::math::constants::{ Float, Vector3f };
use crate::math::warp::{ canonical_to_dir, dir_to_canonical };

use std::sync::{ Mutex, MutexGuard };

const L2_REGULARIZATION: Float = 0.01;
const FRACTION_LEARNING_RATE: Float = 0.01;

/// What one path vertex contributes to its voxel's distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DTreeRecord {
    /// Incident direction, world space.
    pub d: Vector3f,
    pub radiance: Float,
    /// Radiance times BSDF times cosine, used by the fraction optimizer.
    pub product: Float,
    /// Pdf the direction was actually sampled with.
    pub wo_pdf: Float,
    pub bsdf_pdf: Float,
    pub dtree_pdf: Float,
    pub statistical_weight: Float,
    pub is_delta: bool,
}

/// Double-buffered directional distribution of one voxel.
///
/// During a pass `record` only touches `building` while `sample` and `pdf`
/// only read `sampling`; the two swap roles at the pass boundary.
pub struct DTreeWrapper {
    building: DTree,
    sampling: DTree,
    bsdf_sampling_fraction_optimizer: Mutex<AdamOptimizer>,
}

impl Default for DTreeWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DTreeWrapper {
    fn clone(&self) -> Self {
        Self {
            building: self.building.clone(),
            sampling: self.sampling.clone(),
            bsdf_sampling_fraction_optimizer: Mutex::new(self.optimizer().clone()),
        }
    }
}

impl std::fmt::Debug for DTreeWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DTreeWrapper")
            .field("building_weight", &self.statistical_weight_building())
            .field("sampling_weight", &self.statistical_weight())
            .field("nodes", &self.num_nodes())
            .field("bsdf_sampling_fraction", &self.bsdf_sampling_fraction())
            .finish()
    }
}

fn logistic(x: Float) -> Float {
    1.0 / (1.0 + (-x).exp())
}

impl DTreeWrapper {
    pub fn new() -> Self {
        Self {
            building: DTree::new(),
            sampling: DTree::new(),
            bsdf_sampling_fraction_optimizer: Mutex::new(AdamOptimizer::new(FRACTION_LEARNING_RATE)),
        }
    }

    fn optimizer(&self) -> MutexGuard<'_, AdamOptimizer> {
        self.bsdf_sampling_fraction_optimizer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self,
                  rec: &DTreeRecord,
                  directional_filter: DirectionalFilter,
                  loss: BsdfSamplingFractionLoss) {
        if !rec.is_delta {
            let irradiance = rec.radiance / rec.wo_pdf;
            self.building.record_irradiance(&dir_to_canonical(&rec.d),
                                            irradiance,
                                            rec.statistical_weight,
                                            directional_filter);
        }

        if let Some(ratio_power) = loss.ratio_power() {
            if rec.product > 0.0 {
                self.optimize_bsdf_sampling_fraction(rec, ratio_power);
            }
        }
    }

    /// Freezes what was recorded this pass into the sampling tree.
    pub fn build(&mut self) {
        self.building.build();
        self.sampling = self.building.clone();
    }

    /// Re-tessellates the building tree after the frozen sampling tree.
    pub fn reset(&mut self, max_depth: usize, subdivision_threshold: Float) -> Result<(), DTreeError> {
        self.building.reset(&self.sampling, max_depth, subdivision_threshold)
    }

    pub fn sample(&self, sampler: &mut dyn Sampler) -> Vector3f {
        canonical_to_dir(&self.sampling.sample(sampler))
    }

    pub fn pdf(&self, dir: &Vector3f) -> Float {
        self.sampling.pdf(&dir_to_canonical(dir))
    }

    pub fn depth(&self) -> usize {
        self.sampling.depth()
    }

    pub fn num_nodes(&self) -> usize {
        self.sampling.num_nodes()
    }

    pub fn mean_radiance(&self) -> Float {
        self.sampling.mean()
    }

    pub fn statistical_weight(&self) -> Float {
        self.sampling.statistical_weight()
    }

    pub fn statistical_weight_building(&self) -> Float {
        self.building.statistical_weight()
    }

    pub fn set_statistical_weight_building(&self, statistical_weight: Float) {
        self.building.set_statistical_weight(statistical_weight);
    }

    pub fn approx_memory_footprint(&self) -> usize {
        self.building.approx_memory_footprint() + self.sampling.approx_memory_footprint()
    }

    /// Learned probability of sampling the BSDF rather than the guide.
    pub fn bsdf_sampling_fraction(&self) -> Float {
        logistic(self.optimizer().variable())
    }

    fn optimize_bsdf_sampling_fraction(&self, rec: &DTreeRecord, ratio_power: Float) {
        let mut optimizer = self.optimizer();

        let variable = optimizer.variable();
        let fraction = logistic(variable);

        let mix_pdf = fraction * rec.bsdf_pdf + (1.0 - fraction) * rec.dtree_pdf;
        if !(mix_pdf > 0.0) {
            return;
        }

        let ratio = (rec.product / mix_pdf).powf(ratio_power);
        let d_loss_d_fraction = -ratio / rec.wo_pdf * (rec.bsdf_pdf - rec.dtree_pdf);
        let d_loss_d_variable = d_loss_d_fraction * fraction * (1.0 - fraction);
        let gradient = d_loss_d_variable + L2_REGULARIZATION * variable;

        if gradient.is_finite() && rec.statistical_weight.is_finite() {
            optimizer.append(gradient, rec.statistical_weight);
        }
    }
}
