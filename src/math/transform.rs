use super::{Ray, Vec3};

/// Row-major 3x3 matrix.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Matrix3 {
    pub m: [[f64; 3]; 3],
}

impl Matrix3 {
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    pub fn transposed(&self) -> Self {
        let mut t = Self::identity();
        for (i, row) in self.m.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                t.m[j][i] = *v;
            }
        }
        t
    }

    /// Inverse via the adjugate. Callers only invert transforms they built
    /// from non-degenerate scale/rotation factors.
    pub fn inverted(&self) -> Self {
        let m = &self.m;
        let r_det = 1.0 / self.determinant();
        let cofactor = |a: f64, b: f64, c: f64, d: f64| (a * d - b * c) * r_det;
        Self {
            m: [
                [
                    cofactor(m[1][1], m[1][2], m[2][1], m[2][2]),
                    cofactor(m[0][2], m[0][1], m[2][2], m[2][1]),
                    cofactor(m[0][1], m[0][2], m[1][1], m[1][2]),
                ],
                [
                    cofactor(m[1][2], m[1][0], m[2][2], m[2][0]),
                    cofactor(m[0][0], m[0][2], m[2][0], m[2][2]),
                    cofactor(m[0][2], m[0][0], m[1][2], m[1][0]),
                ],
                [
                    cofactor(m[1][0], m[1][1], m[2][0], m[2][1]),
                    cofactor(m[0][1], m[0][0], m[2][1], m[2][0]),
                    cofactor(m[0][0], m[0][1], m[1][0], m[1][1]),
                ],
            ],
        }
    }

    pub fn mul_vec(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.m[0][0] * v.x + self.m[0][1] * v.y + self.m[0][2] * v.z,
            self.m[1][0] * v.x + self.m[1][1] * v.y + self.m[1][2] * v.z,
            self.m[2][0] * v.x + self.m[2][1] * v.y + self.m[2][2] * v.z,
        )
    }

    pub fn mul_mat(&self, other: &Self) -> Self {
        let mut out = Self::identity();
        for i in 0..3 {
            for j in 0..3 {
                out.m[i][j] = (0..3).map(|k| self.m[i][k] * other.m[k][j]).sum();
            }
        }
        out
    }
}

/// An invertible object-to-world transform: a linear part plus an offset.
#[derive(Copy, Clone, Debug)]
pub struct Transform {
    linear: Matrix3,
    inverse: Matrix3,
    offset: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            linear: Matrix3::identity(),
            inverse: Matrix3::identity(),
            offset: Vec3::zeros(),
        }
    }

    pub fn new(linear: Matrix3, offset: Vec3) -> Self {
        Self {
            linear,
            inverse: linear.inverted(),
            offset,
        }
    }

    /// Applies `other` after this transform.
    pub fn then(&self, other: &Transform) -> Self {
        Self::new(
            other.linear.mul_mat(&self.linear),
            other.linear.mul_vec(self.offset) + other.offset,
        )
    }

    pub fn point(&self, p: Vec3) -> Vec3 {
        self.linear.mul_vec(p) + self.offset
    }

    pub fn undo_point(&self, p: Vec3) -> Vec3 {
        self.inverse.mul_vec(p - self.offset)
    }

    pub fn direction(&self, d: Vec3) -> Vec3 {
        self.linear.mul_vec(d)
    }

    pub fn undo_direction(&self, d: Vec3) -> Vec3 {
        self.inverse.mul_vec(d)
    }

    /// Normals transform with the inverse transpose to stay perpendicular
    /// under non-uniform scale.
    pub fn normal(&self, n: Vec3) -> Vec3 {
        self.inverse.transposed().mul_vec(n)
    }

    /// Maps a world-space ray into the local space of this transform. The
    /// returned direction is left unnormalized; callers that need a unit
    /// direction renormalize and recompute distances in world space.
    pub fn undo_ray(&self, ray: &Ray) -> Ray {
        Ray {
            start: self.undo_point(ray.start),
            dir: self.undo_direction(ray.dir),
            ..*ray
        }
    }
}

pub fn translation(offset: Vec3) -> Transform {
    Transform::new(Matrix3::identity(), offset)
}

pub fn scaling(x: f64, y: f64, z: f64) -> Transform {
    Transform::new(
        Matrix3 {
            m: [[x, 0.0, 0.0], [0.0, y, 0.0], [0.0, 0.0, z]],
        },
        Vec3::zeros(),
    )
}

/// Yaw, pitch and roll in radians, applied in that order.
pub fn rotation(yaw: f64, pitch: f64, roll: f64) -> Transform {
    let (sy, cy) = yaw.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sr, cr) = roll.sin_cos();
    let around_y = Matrix3 {
        m: [[cy, 0.0, sy], [0.0, 1.0, 0.0], [-sy, 0.0, cy]],
    };
    let around_x = Matrix3 {
        m: [[1.0, 0.0, 0.0], [0.0, cp, -sp], [0.0, sp, cp]],
    };
    let around_z = Matrix3 {
        m: [[cr, -sr, 0.0], [sr, cr, 0.0], [0.0, 0.0, 1.0]],
    };
    Transform::new(
        around_z.mul_mat(&around_x.mul_mat(&around_y)),
        Vec3::zeros(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
        assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-9);
    }

    #[test]
    fn inverse_round_trips() {
        let t = translation(Vec3::new(1.0, -2.0, 3.0))
            .then(&scaling(2.0, 0.5, 4.0))
            .then(&rotation(0.3, -0.7, 1.1));
        let p = Vec3::new(-5.0, 2.0, 9.0);
        assert_vec_eq(t.undo_point(t.point(p)), p);
        assert_vec_eq(t.undo_direction(t.direction(p)), p);
    }

    #[test]
    fn composition_order() {
        // Scale first, then translate
        let t = scaling(2.0, 2.0, 2.0).then(&translation(Vec3::new(1.0, 0.0, 0.0)));
        assert_vec_eq(t.point(Vec3::new(1.0, 1.0, 1.0)), Vec3::new(3.0, 2.0, 2.0));
    }

    #[test]
    fn normal_stays_perpendicular() {
        let t = scaling(1.0, 4.0, 1.0);
        // A 45 degree surface in xy, its normal and tangent
        let tangent = Vec3::new(1.0, 1.0, 0.0);
        let normal = Vec3::new(-1.0, 1.0, 0.0);
        let world_tangent = t.direction(tangent);
        let world_normal = t.normal(normal);
        assert_abs_diff_eq!(world_tangent.dot(world_normal), 0.0, epsilon = 1e-12);
    }
}
