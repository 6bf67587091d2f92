// Copyright @yucwang 2021

pub mod core;
pub mod guiding;
pub mod materials;
pub mod math;
