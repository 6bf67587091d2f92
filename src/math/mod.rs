// Copyright 2020 @TwoCookingMice

pub mod aabb;
pub mod atomic_float;
pub mod constants;
pub mod frame;
pub mod warp;
