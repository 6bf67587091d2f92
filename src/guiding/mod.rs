// Copyright @yucwang 2026

//! SD-tree path guiding: a spatial binary tree whose leaves hold directional
//! quadtrees, learned online from path samples between rendering passes.

pub mod adam;
pub mod config;
pub mod dtree;
pub mod quadtree;
pub mod session;
pub mod stree;
pub mod wrapper;

/// How a record is spread over neighbouring voxels of the spatial tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpatialFilter {
    Nearest,
    StochasticBox,
    Box,
}

/// How a record is spread over neighbouring cells of a directional quadtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectionalFilter {
    Nearest,
    Box,
}

/// Loss minimised when learning the BSDF sampling fraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BsdfSamplingFractionLoss {
    None,
    KL,
    Variance,
}

impl BsdfSamplingFractionLoss {
    /// Exponent applied to the `product / mixture_pdf` ratio in the gradient.
    pub fn ratio_power(&self) -> Option<crate::math::constants::Float> {
        match self {
            BsdfSamplingFractionLoss::None => None,
            BsdfSamplingFractionLoss::KL => Some(1.0),
            BsdfSamplingFractionLoss::Variance => Some(2.0),
        }
    }
}
