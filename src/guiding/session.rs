// Copyright @yucwang 2026

use crate::core::bsdf::BSDF;
use crate::core::sampler::Sampler;
use crate::guiding::config::{ ConfigError, GuidingConfig };
use crate::guiding::stree::STree;
use crate::guiding::wrapper::{ DTreeRecord, DTreeWrapper };
use crate::guiding::BsdfSamplingFractionLoss;
use crate::math::aabb::AABB;
use crate::math::constants::{ Float, Vector3f, FLOAT_MAX };

use std::fmt;
use std::sync::atomic::{ AtomicUsize, Ordering };

#[derive(Debug)]
pub enum GuidingError {
    Config(ConfigError),
    NodeIndexExhausted { wrappers: usize },
}

impl fmt::Display for GuidingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuidingError::Config(e) => write!(f, "invalid guiding configuration: {}", e),
            GuidingError::NodeIndexExhausted { wrappers } =>
                write!(f, "{} directional trees ran out of node indices", wrappers),
        }
    }
}

impl std::error::Error for GuidingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuidingError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for GuidingError {
    fn from(e: ConfigError) -> Self {
        GuidingError::Config(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinAvgMax {
    pub min: Float,
    pub avg: Float,
    pub max: Float,
}

impl Default for MinAvgMax {
    fn default() -> Self {
        Self { min: FLOAT_MAX, avg: 0.0, max: 0.0 }
    }
}

impl MinAvgMax {
    fn add(&mut self, value: Float) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.avg += value;
    }

    fn finish(&mut self, count: usize) {
        if count == 0 {
            *self = MinAvgMax { min: 0.0, avg: 0.0, max: 0.0 };
        } else {
            self.avg /= count as Float;
        }
    }
}

impl fmt::Display for MinAvgMax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "min={} avg={} max={}", self.min, self.avg, self.max)
    }
}

/// Summary of the sampling trees after a build.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DistributionStatistics {
    pub num_voxels: usize,
    pub depth: MinAvgMax,
    pub mean_radiance: MinAvgMax,
    /// Over voxels whose tree was refined past the root.
    pub nodes: MinAvgMax,
    pub statistical_weight: MinAvgMax,
}

impl DistributionStatistics {
    pub fn gather(stree: &STree) -> Self {
        let mut stats = DistributionStatistics::default();
        let mut refined = 0;

        for wrapper in stree.dtree_wrappers() {
            stats.num_voxels += 1;
            stats.depth.add(wrapper.depth() as Float);
            stats.mean_radiance.add(wrapper.mean_radiance());
            stats.statistical_weight.add(wrapper.statistical_weight());

            let nodes = wrapper.num_nodes();
            if nodes > 1 {
                refined += 1;
                stats.nodes.add(nodes as Float);
            }
        }

        stats.depth.finish(stats.num_voxels);
        stats.mean_radiance.finish(stats.num_voxels);
        stats.statistical_weight.finish(stats.num_voxels);
        stats.nodes.finish(refined);
        stats
    }
}

impl fmt::Display for DistributionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Distribution statistics over {} voxels:", self.num_voxels)?;
        writeln!(f, "  Depth         = {}", self.depth)?;
        writeln!(f, "  Mean radiance = {}", self.mean_radiance)?;
        writeln!(f, "  Node count    = {}", self.nodes)?;
        write!(f, "  Stat. weight  = {}", self.statistical_weight)
    }
}

/// Direction drawn from the BSDF/guide mixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidedSample {
    pub wo: Vector3f,
    /// BSDF times cosine over `wo_pdf`.
    pub weight: Float,
    pub wo_pdf: Float,
    pub bsdf_pdf: Float,
    pub dtree_pdf: Float,
    pub is_delta: bool,
}

/// Owns the SD-tree across rendering passes.
///
/// A pass calls `record` from any number of threads; between passes the
/// driver calls `build_distributions` and then `reset_distributions`.
pub struct GuidingSession {
    config: GuidingConfig,
    stree: STree,
    iteration: usize,
    is_built: bool,
}

impl GuidingSession {
    pub fn new(config: GuidingConfig, scene_bounds: &AABB) -> Result<Self, GuidingError> {
        config.validate()?;
        Ok(Self {
            config,
            stree: STree::new(scene_bounds),
            iteration: 0,
            is_built: false,
        })
    }

    pub fn config(&self) -> &GuidingConfig {
        &self.config
    }

    pub fn stree(&self) -> &STree {
        &self.stree
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn is_built(&self) -> bool {
        self.is_built
    }

    pub fn dtree_wrapper(&self, p: &Vector3f) -> (&DTreeWrapper, Vector3f) {
        self.stree.dtree_wrapper_with_size(p)
    }

    /// Building weight above which a voxel is split; grows with the
    /// number of samples a pass contributes.
    pub fn spatial_threshold(&self) -> Float {
        let samples = (2.0 as Float).powi(self.iteration as i32) * self.config.spp_per_pass as Float / 4.0;
        samples.sqrt() * self.config.s_tree_threshold
    }

    pub fn reset_distributions(&mut self) -> Result<(), GuidingError> {
        let threshold = self.spatial_threshold();
        self.stree.refine(threshold, self.config.sd_tree_max_memory_mb);

        let max_depth = self.config.d_tree_max_depth;
        let d_tree_threshold = self.config.d_tree_threshold;
        let failures = AtomicUsize::new(0);
        self.stree.for_each_dtree_wrapper_parallel(|wrapper| {
            if let Err(e) = wrapper.reset(max_depth, d_tree_threshold) {
                log::error!("Failed to reset a directional tree: {}", e);
                failures.fetch_add(1, Ordering::Relaxed);
            }
        });

        match failures.into_inner() {
            0 => Ok(()),
            wrappers => Err(GuidingError::NodeIndexExhausted { wrappers }),
        }
    }

    pub fn build_distributions(&mut self) -> DistributionStatistics {
        self.stree.for_each_dtree_wrapper_parallel(|wrapper| wrapper.build());

        let stats = DistributionStatistics::gather(&self.stree);
        log::info!("Iteration {}: {}", self.iteration, stats);

        self.is_built = true;
        self.iteration += 1;
        stats
    }

    pub fn record(&self,
                  p: &Vector3f,
                  voxel_size: &Vector3f,
                  rec: &DTreeRecord,
                  sampler: &mut dyn Sampler) {
        self.stree.splat(p,
                         voxel_size,
                         rec,
                         self.config.spatial_filter,
                         self.config.directional_filter,
                         self.config.bsdf_sampling_fraction_loss,
                         sampler);
    }

    pub fn bsdf_sampling_fraction(&self, wrapper: &DTreeWrapper) -> Float {
        match self.config.bsdf_sampling_fraction_loss {
            BsdfSamplingFractionLoss::None => self.config.bsdf_sampling_fraction,
            _ => wrapper.bsdf_sampling_fraction(),
        }
    }

    pub fn sample_mixture(&self,
                          wrapper: &DTreeWrapper,
                          bsdf: &dyn BSDF,
                          wi: &Vector3f,
                          sampler: &mut dyn Sampler) -> Option<GuidedSample> {
        if !self.is_built || bsdf.is_delta() {
            let s = bsdf.sample(wi, sampler.get_2d())?;
            if !(s.pdf > 0.0) {
                return None;
            }
            return Some(GuidedSample {
                wo: s.wo,
                weight: s.value / s.pdf,
                wo_pdf: s.pdf,
                bsdf_pdf: s.pdf,
                dtree_pdf: 0.0,
                is_delta: s.is_delta,
            });
        }

        let fraction = self.bsdf_sampling_fraction(wrapper);
        let (wo, value) = if sampler.get_1d() < fraction {
            let s = bsdf.sample(wi, sampler.get_2d())?;
            if !(s.pdf > 0.0) {
                return None;
            }
            if s.is_delta {
                let wo_pdf = s.pdf * fraction;
                return Some(GuidedSample {
                    wo: s.wo,
                    weight: s.value / wo_pdf,
                    wo_pdf,
                    bsdf_pdf: s.pdf,
                    dtree_pdf: 0.0,
                    is_delta: true,
                });
            }
            (s.wo, s.value)
        } else {
            let wo = wrapper.sample(sampler);
            (wo, bsdf.eval(wi, &wo))
        };

        let (wo_pdf, bsdf_pdf, dtree_pdf) = self.pdf_mixture(wrapper, bsdf, wi, &wo);
        if !(wo_pdf > 0.0) {
            return None;
        }

        Some(GuidedSample {
            wo,
            weight: value / wo_pdf,
            wo_pdf,
            bsdf_pdf,
            dtree_pdf,
            is_delta: false,
        })
    }

    /// Returns `(wo_pdf, bsdf_pdf, dtree_pdf)` of `wo` under the mixture.
    pub fn pdf_mixture(&self,
                       wrapper: &DTreeWrapper,
                       bsdf: &dyn BSDF,
                       wi: &Vector3f,
                       wo: &Vector3f) -> (Float, Float, Float) {
        let bsdf_pdf = bsdf.pdf(wi, wo);
        if !bsdf_pdf.is_finite() {
            return (0.0, bsdf_pdf, 0.0);
        }
        if !self.is_built || bsdf.is_delta() {
            return (bsdf_pdf, bsdf_pdf, 0.0);
        }

        let fraction = self.bsdf_sampling_fraction(wrapper);
        let dtree_pdf = wrapper.pdf(wo);
        (fraction * bsdf_pdf + (1.0 - fraction) * dtree_pdf, bsdf_pdf, dtree_pdf)
    }
}
