mod csg;
mod heightfield;
mod kd_tree;
mod mesh;

pub use csg::{CsgOp, CsgKind};
pub use heightfield::Heightfield;
pub use kd_tree::KdNode;
pub use mesh::{Mesh, Triangle};

use std::f64::consts::PI;

use crate::math::{Ray, Vec3, INF};

/// The result of a ray/geometry test. Callers running a closest-hit query
/// initialize `dist = +INF` and every variant only reports hits strictly
/// closer than the incoming distance, so the smaller `dist` always wins.
#[derive(Copy, Clone, Debug)]
pub struct IntersectionInfo {
    /// Hit distance along the ray.
    pub dist: f64,
    /// World-space hit point.
    pub ip: Vec3,
    /// Surface normal at the hit point.
    pub norm: Vec3,
    pub u: f64,
    pub v: f64,
    /// Texture-space differentials, for filtering and bump mapping.
    pub dn_dx: Vec3,
    pub dn_dy: Vec3,
}

impl IntersectionInfo {
    pub fn new() -> Self {
        Self {
            dist: INF,
            ip: Vec3::zeros(),
            norm: Vec3::zeros(),
            u: 0.0,
            v: 0.0,
            dn_dx: Vec3::zeros(),
            dn_dy: Vec3::zeros(),
        }
    }
}

impl Default for IntersectionInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// The capability every geometry variant provides.
pub trait Intersectable: Send + Sync {
    /// Intersects the ray with this geometry. Returns true and fills `info`
    /// if a hit closer than the incoming `info.dist` exists.
    fn intersect(&self, ray: &Ray, info: &mut IntersectionInfo) -> bool;
}

/// An infinite horizontal plane at a given height, optionally limited to a
/// square footprint around the vertical axis.
pub struct Plane {
    pub y: f64,
    pub limit: Option<f64>,
}

impl Plane {
    pub fn new(y: f64) -> Self {
        Self { y, limit: None }
    }

    pub fn with_limit(y: f64, limit: f64) -> Self {
        Self {
            y,
            limit: Some(limit),
        }
    }
}

impl Intersectable for Plane {
    fn intersect(&self, ray: &Ray, info: &mut IntersectionInfo) -> bool {
        // The ray has to be able to cross the plane at all
        if ray.start.y > self.y && ray.dir.y >= 0.0 {
            return false;
        }
        if ray.start.y < self.y && ray.dir.y <= 0.0 {
            return false;
        }
        // Written so a NaN dist (start exactly on the plane, dir.y == 0)
        // is rejected
        let dist = (self.y - ray.start.y) / ray.dir.y;
        if !(dist < info.dist) {
            return false;
        }
        let ip = ray.point(dist);
        if let Some(limit) = self.limit {
            if ip.x.abs() > limit || ip.z.abs() > limit {
                return false;
            }
        }
        info.dist = dist;
        info.ip = ip;
        info.norm = Vec3::new(0.0, if ray.start.y > self.y { 1.0 } else { -1.0 }, 0.0);
        info.u = ip.x;
        info.v = ip.z;
        info.dn_dx = Vec3::new(1.0, 0.0, 0.0);
        info.dn_dy = Vec3::new(0.0, 0.0, 1.0);
        true
    }
}

/// A sphere, intersected with the closed-form quadratic solve.
pub struct Sphere {
    pub center: Vec3,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }
}

impl Intersectable for Sphere {
    fn intersect(&self, ray: &Ray, info: &mut IntersectionInfo) -> bool {
        // |start + t*dir - center|^2 = R^2, a quadratic in t
        let h = ray.start - self.center;
        let a = ray.dir.length_sqr();
        let b = 2.0 * h.dot(ray.dir);
        let c = h.length_sqr() - self.radius * self.radius;
        let discr = b * b - 4.0 * a * c;
        if discr < 0.0 {
            return false;
        }
        let sqrt_discr = discr.sqrt();
        let near = (-b - sqrt_discr) / (2.0 * a);
        let far = (-b + sqrt_discr) / (2.0 * a);
        // Prefer the entering hit; a negative near root means the ray
        // starts inside the sphere and exits through the far one
        let sol = if near >= 0.0 { near } else { far };
        if sol < 0.0 || sol >= info.dist {
            return false;
        }
        info.dist = sol;
        info.ip = ray.point(sol);
        info.norm = (info.ip - self.center).normalized();
        let rel = info.ip - self.center;
        info.u = (PI + rel.z.atan2(rel.x)) / (2.0 * PI);
        info.v = 1.0 - (PI / 2.0 + (rel.y / self.radius).clamp(-1.0, 1.0).asin()) / PI;
        info.dn_dx = Vec3::new(0.0, 1.0, 0.0).cross(info.norm).normalized();
        info.dn_dy = info.norm.cross(info.dn_dx);
        true
    }
}

/// An axis-aligned cube given by its center and half side length.
pub struct Cube {
    pub center: Vec3,
    pub half_side: f64,
}

impl Cube {
    pub fn new(center: Vec3, side: f64) -> Self {
        Self {
            center,
            half_side: side * 0.5,
        }
    }

    fn intersect_side(
        &self,
        axis: usize,
        level: f64,
        normal: Vec3,
        ray: &Ray,
        info: &mut IntersectionInfo,
    ) -> bool {
        if ray.start[axis] > level && ray.dir[axis] >= 0.0 {
            return false;
        }
        if ray.start[axis] < level && ray.dir[axis] <= 0.0 {
            return false;
        }
        // Rejects NaN from a start exactly on the face level with a zero
        // direction component
        let dist = (level - ray.start[axis]) / ray.dir[axis];
        if !(dist < info.dist) {
            return false;
        }
        let ip = ray.point(dist);
        // The candidate must lie within the footprint of the other two axes
        for other in 0..3 {
            if other == axis {
                continue;
            }
            if ip[other] > self.center[other] + self.half_side + 1e-6
                || ip[other] < self.center[other] - self.half_side - 1e-6
            {
                return false;
            }
        }
        info.dist = dist;
        info.ip = ip;
        info.norm = normal;
        let rel = ip - self.center;
        // Project the two in-plane axes to uv
        let (u_axis, v_axis) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        info.u = rel[u_axis];
        info.v = rel[v_axis];
        info.dn_dx = Vec3::zeros();
        info.dn_dy = Vec3::zeros();
        true
    }
}

impl Intersectable for Cube {
    fn intersect(&self, ray: &Ray, info: &mut IntersectionInfo) -> bool {
        let mut found = false;
        for axis in 0..3 {
            let mut low_normal = Vec3::zeros();
            low_normal[axis] = -1.0;
            let mut high_normal = Vec3::zeros();
            high_normal[axis] = 1.0;
            found |= self.intersect_side(
                axis,
                self.center[axis] - self.half_side,
                low_normal,
                ray,
                info,
            );
            found |= self.intersect_side(
                axis,
                self.center[axis] + self.half_side,
                high_normal,
                ray,
                info,
            );
        }
        found
    }
}
