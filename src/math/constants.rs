/* Copyright 2020 @Yuchen Wong */

use nalgebra as na;

pub type Float = f32;

pub type Vector2f = na::Vector2<Float>;
pub type Vector3f = na::Vector3<Float>;

pub const PI: Float = 3.14159265359;
pub const INV_PI: Float = 0.31830988618;
pub const FOUR_PI: Float = 4.0 * PI;
pub const INV_FOUR_PI: Float = 0.07957747155;
pub const FLOAT_MIN: Float = std::f32::MIN;
pub const FLOAT_MAX: Float = std::f32::MAX;
