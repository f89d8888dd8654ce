use std::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A three-component double vector, used for points, directions and normals alike.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zeros() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length_sqr(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_sqr().sqrt()
    }

    pub fn normalized(self) -> Self {
        self / self.length()
    }

    pub fn dist(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Flips the vector so that it lies in the hemisphere opposing `dir`.
    pub fn faceforward(self, dir: Self) -> Self {
        if dir.dot(self) < 0.0 {
            self
        } else {
            -self
        }
    }

    /// Mirror reflection of an incoming direction around this (unit) normal.
    pub fn reflect(self, incoming: Self) -> Vec3 {
        (incoming - self * (2.0 * self.dot(incoming))).normalized()
    }

    /// Refracted direction for an incoming direction and a relative index of
    /// refraction. `None` on total internal reflection.
    pub fn refract(self, incoming: Vec3, ior: f64) -> Option<Vec3> {
        let n_dot_i = self.dot(incoming);
        let k = 1.0 - ior * ior * (1.0 - n_dot_i * n_dot_i);
        if k < 0.0 {
            return None;
        }
        Some((incoming * ior - self * (ior * n_dot_i + k.sqrt())).normalized())
    }

    /// Completes `self` (assumed unit) to an orthonormal basis.
    pub fn orthonormal_basis(self) -> (Vec3, Vec3) {
        // Pick the axis least aligned with self to avoid a degenerate cross
        let helper = if self.x.abs() < 0.9 {
            Vec3::new(1.0, 0.0, 0.0)
        } else {
            Vec3::new(0.0, 1.0, 0.0)
        };
        let u = self.cross(helper).normalized();
        let v = self.cross(u);
        (u, v)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Mul<Vec3> for f64 {
    type Output = Vec3;
    fn mul(self, v: Vec3) -> Vec3 {
        v * self
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;
    fn div(self, s: f64) -> Self {
        self * (1.0 / s)
    }
}

impl Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Vec3 index {} out of bounds", i),
        }
    }
}

impl IndexMut<usize> for Vec3 {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Vec3 index {} out of bounds", i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dot_cross() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        assert_abs_diff_eq!(x.dot(y), 0.0);
        assert_eq!(x.cross(y), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn normalized_length() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert_abs_diff_eq!(v.length(), 5.0);
        assert_abs_diff_eq!(v.normalized().length(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn faceforward_flips() {
        let n = Vec3::new(0.0, 1.0, 0.0);
        let down = Vec3::new(0.0, -1.0, 0.0);
        assert_eq!(n.faceforward(down), n);
        assert_eq!(n.faceforward(n), -n);
    }

    #[test]
    fn reflect_mirrors() {
        let n = Vec3::new(0.0, 1.0, 0.0);
        let incoming = Vec3::new(1.0, -1.0, 0.0).normalized();
        let r = n.reflect(incoming);
        assert_abs_diff_eq!(r.x, incoming.x, epsilon = 1e-12);
        assert_abs_diff_eq!(r.y, -incoming.y, epsilon = 1e-12);
    }

    #[test]
    fn refract_total_internal() {
        let n = Vec3::new(0.0, 1.0, 0.0);
        // Shallow grazing exit from a dense medium
        let incoming = Vec3::new(0.99, 0.14, 0.0).normalized();
        assert!(n.refract(incoming, 1.5).is_none());
    }

    #[test]
    fn basis_is_orthonormal() {
        for v in [
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 2.0, -0.5).normalized(),
        ] {
            let (u, w) = v.orthonormal_basis();
            assert_abs_diff_eq!(u.length(), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(w.length(), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(u.dot(v), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(u.dot(w), 0.0, epsilon = 1e-12);
        }
    }
}
