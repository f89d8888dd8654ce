mod ray;
mod transform;
mod vector;

pub use ray::{Ray, RayFlags};
pub use transform::{rotation, scaling, translation, Matrix3, Transform};
pub use vector::Vec3;

pub const INF: f64 = f64::INFINITY;

/// Signed unit of `x`, with 0 mapping to 0.
pub fn sign_of(x: f64) -> i32 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

pub fn sqr(x: f64) -> f64 {
    x * x
}
