// Copyright @yucwang 2021

pub mod bsdf;
pub mod rng;
pub mod sampler;
