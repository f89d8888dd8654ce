use crate::math::{sign_of, Ray, Vec3, INF};

pub const AXIS_COUNT: usize = 3;

/// An axis-aligned bounding box. A point p is inside when
/// `vmin[i] <= p[i] <= vmax[i]` holds on every axis. An empty box has
/// `vmin = +INF, vmax = -INF` and contains nothing.
#[derive(Copy, Clone, Debug)]
pub struct BBox {
    pub vmin: Vec3,
    pub vmax: Vec3,
}

impl BBox {
    pub fn new_empty() -> Self {
        Self {
            vmin: Vec3::new(INF, INF, INF),
            vmax: Vec3::new(-INF, -INF, -INF),
        }
    }

    /// Grows the box just enough to contain `p`.
    pub fn add(&mut self, p: Vec3) {
        for axis in 0..AXIS_COUNT {
            self.vmin[axis] = self.vmin[axis].min(p[axis]);
            self.vmax[axis] = self.vmax[axis].max(p[axis]);
        }
    }

    /// Grows the box to contain `other` entirely.
    pub fn extend(&mut self, other: &BBox) {
        self.add(other.vmin);
        self.add(other.vmax);
    }

    /// Borders-inclusive containment check, slightly inflated to absorb
    /// floating point drift of hit points computed elsewhere.
    pub fn inside(&self, p: Vec3) -> bool {
        (0..AXIS_COUNT).all(|axis| {
            self.vmin[axis] - 1e-6 <= p[axis] && p[axis] <= self.vmax[axis] + 1e-6
        })
    }

    /// Tests whether the ray intersects the box at all. Cheaper than
    /// [`BBox::closest_intersection`] since any wall hit suffices.
    pub fn test_intersect(&self, ray: &Ray) -> bool {
        if self.inside(ray.start) {
            return true;
        }
        for dim in 0..AXIS_COUNT {
            if (ray.dir[dim] < 0.0 && ray.start[dim] < self.vmin[dim])
                || (ray.dir[dim] > 0.0 && ray.start[dim] > self.vmax[dim])
            {
                return false;
            }
            if ray.dir[dim].abs() < 1e-9 {
                continue;
            }
            let mul = 1.0 / ray.dir[dim];
            let (u, v) = other_axes(dim);
            // If the near wall of this axis pair is behind the ray, any hit
            // on the far wall would be preceded by a hit on another axis'
            // wall, so the whole axis can be skipped. Only valid because
            // the start is known to be outside the box at this point.
            let dist = (self.vmin[dim] - ray.start[dim]) * mul;
            if dist < 0.0 {
                continue;
            }
            if self.wall_hit_in_bounds(ray, dist, u, v) {
                return true;
            }
            let dist = (self.vmax[dim] - ray.start[dim]) * mul;
            if dist >= 0.0 && self.wall_hit_in_bounds(ray, dist, u, v) {
                return true;
            }
        }
        false
    }

    fn wall_hit_in_bounds(&self, ray: &Ray, dist: f64, u: usize, v: usize) -> bool {
        let x = ray.start[u] + ray.dir[u] * dist;
        if self.vmin[u] <= x && x <= self.vmax[u] {
            let y = ray.start[v] + ray.dir[v] * dist;
            self.vmin[v] <= y && y <= self.vmax[v]
        } else {
            false
        }
    }

    /// Distance to the closest intersection with the box, or +INF when the
    /// ray misses. A ray starting inside reports 0.
    pub fn closest_intersection(&self, ray: &Ray) -> f64 {
        if self.inside(ray.start) {
            return 0.0;
        }
        let mut min_dist = INF;
        for dim in 0..AXIS_COUNT {
            if (ray.dir[dim] < 0.0 && ray.start[dim] < self.vmin[dim])
                || (ray.dir[dim] > 0.0 && ray.start[dim] > self.vmax[dim])
            {
                return INF;
            }
            if ray.dir[dim].abs() < 1e-9 {
                continue;
            }
            let mul = 1.0 / ray.dir[dim];
            let (u, v) = other_axes(dim);
            for wall in [self.vmin[dim], self.vmax[dim]] {
                let dist = (wall - ray.start[dim]) * mul;
                if dist >= 0.0 && self.wall_hit_in_bounds(ray, dist, u, v) {
                    min_dist = min_dist.min(dist);
                }
            }
        }
        min_dist
    }

    /// Conservative box/triangle overlap. Three cases, in order:
    /// 1) a triangle vertex lies inside the box;
    /// 2) a triangle edge segment crosses a box wall;
    /// 3) the triangle plane separates two endpoints of a box edge and the
    ///    crossing point lies within the triangle.
    /// Case 3 catches triangles that pierce the box interior without any
    /// vertex or edge touching a wall in isolation.
    pub fn intersect_triangle(&self, a: Vec3, b: Vec3, c: Vec3) -> bool {
        if self.inside(a) || self.inside(b) || self.inside(c) {
            return true;
        }
        let verts = [a, b, c];
        for i in 0..3 {
            for j in (i + 1)..3 {
                let fwd = Ray::new(verts[i], verts[j] - verts[i]);
                if self.test_intersect(&fwd) {
                    let back = Ray::new(verts[j], verts[i] - verts[j]);
                    if self.test_intersect(&back) {
                        return true;
                    }
                }
            }
        }
        let ab = b - a;
        let ac = c - a;
        let ab_cross_ac = ab.cross(ac);
        let plane_d = a.dot(ab_cross_ac);
        // Walk the twelve box edges as (corner mask, extended axis) pairs
        for mask in 0..7u32 {
            for axis in 0..3 {
                if mask & (1 << axis) != 0 {
                    continue;
                }
                let start = Vec3::new(
                    if mask & 1 != 0 { self.vmax.x } else { self.vmin.x },
                    if mask & 2 != 0 { self.vmax.y } else { self.vmin.y },
                    if mask & 4 != 0 { self.vmax.z } else { self.vmin.z },
                );
                let mut end = start;
                end[axis] = self.vmax[axis];
                if sign_of(start.dot(ab_cross_ac) - plane_d)
                    != sign_of(end.dot(ab_cross_ac) - plane_d)
                {
                    let ray = Ray::new(start, end - start);
                    // Edge length is 1 in ray units, leave a little slack
                    let mut gamma = 1.000_000_1;
                    if intersect_triangle_dist(&ray, a, b, c, &mut gamma) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Splits the box into two halves at `pos` along `axis`.
    pub fn split(&self, axis: usize, pos: f64) -> (BBox, BBox) {
        let mut left = *self;
        let mut right = *self;
        left.vmax[axis] = pos;
        right.vmin[axis] = pos;
        (left, right)
    }

}

fn other_axes(dim: usize) -> (usize, usize) {
    let u = usize::from(dim == 0);
    let v = if dim == 2 { 1 } else { 2 };
    (u, v)
}

/// Bare ray/triangle test tracking only the hit distance; used by the
/// box/triangle overlap and anywhere the full hit record is not needed.
/// On a hit closer than the incoming `dist`, updates it and returns true.
pub fn intersect_triangle_dist(ray: &Ray, a: Vec3, b: Vec3, c: Vec3, dist: &mut f64) -> bool {
    let ab = b - a;
    let ac = c - a;
    let d = -ray.dir;
    let h = ray.start - a;

    let ab_cross_ac = ab.cross(ac);
    let dcr = ab_cross_ac.dot(d);
    if dcr.abs() < 1e-12 {
        // Ray parallel to the triangle plane
        return false;
    }

    let lambda2 = h.cross(ac).dot(d) / dcr;
    let lambda3 = ab.cross(h).dot(d) / dcr;
    let gamma = ab_cross_ac.dot(h) / dcr;

    if gamma < 0.0 || gamma > *dist {
        return false;
    }
    if !(0.0..=1.0).contains(&lambda2) || !(0.0..=1.0).contains(&lambda3) || lambda2 + lambda3 > 1.0
    {
        return false;
    }

    *dist = gamma;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_box() -> BBox {
        let mut bbox = BBox::new_empty();
        bbox.add(Vec3::new(-1.0, -1.0, -1.0));
        bbox.add(Vec3::new(1.0, 1.0, 1.0));
        bbox
    }

    #[test]
    fn empty_box_contains_nothing() {
        let bbox = BBox::new_empty();
        assert!(!bbox.inside(Vec3::zeros()));
        assert!(!bbox.test_intersect(&Ray::new(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0))));
    }

    #[test]
    fn ray_from_inside_always_hits() {
        let bbox = unit_box();
        for dir in [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.3, 0.5, -0.8).normalized(),
        ] {
            let ray = Ray::new(Vec3::new(0.2, -0.4, 0.1), dir);
            assert!(bbox.test_intersect(&ray));
            assert_abs_diff_eq!(bbox.closest_intersection(&ray), 0.0);
        }
    }

    #[test]
    fn ray_from_outside() {
        let bbox = unit_box();
        let toward = Ray::new(Vec3::new(-3.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(bbox.test_intersect(&toward));
        assert_abs_diff_eq!(bbox.closest_intersection(&toward), 2.0, epsilon = 1e-12);

        let away = Ray::new(Vec3::new(-3.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        assert!(!away.dir.x.is_nan());
        assert!(!bbox.test_intersect(&away));
        assert_eq!(bbox.closest_intersection(&away), INF);

        let miss = Ray::new(Vec3::new(-3.0, 5.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(!bbox.test_intersect(&miss));
    }

    #[test]
    fn triangle_overlap_is_conservative_under_split() {
        // Any triangle overlapping the parent must overlap at least one half,
        // regardless of split axis and position.
        let bbox = unit_box();
        let tris = [
            // Fully inside
            (
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0),
                Vec3::new(0.0, 0.5, 0.0),
            ),
            // Pierces the box with all vertices outside
            (
                Vec3::new(-5.0, 0.2, 0.1),
                Vec3::new(5.0, 0.2, 0.1),
                Vec3::new(0.0, 0.3, 5.0),
            ),
            // Clips a corner
            (
                Vec3::new(0.9, 0.9, 2.0),
                Vec3::new(2.0, 0.9, 0.9),
                Vec3::new(0.9, 2.0, 0.9),
            ),
        ];
        for (a, b, c) in tris {
            assert!(bbox.intersect_triangle(a, b, c));
            for axis in 0..AXIS_COUNT {
                for frac in [0.25, 0.5, 0.75] {
                    let pos = bbox.vmin[axis] + (bbox.vmax[axis] - bbox.vmin[axis]) * frac;
                    let (left, right) = bbox.split(axis, pos);
                    assert!(
                        left.intersect_triangle(a, b, c) || right.intersect_triangle(a, b, c),
                        "split axis {} at {} lost a triangle",
                        axis,
                        pos
                    );
                }
            }
        }
    }

    #[test]
    fn triangle_far_away_does_not_overlap() {
        let bbox = unit_box();
        assert!(!bbox.intersect_triangle(
            Vec3::new(10.0, 10.0, 10.0),
            Vec3::new(11.0, 10.0, 10.0),
            Vec3::new(10.0, 11.0, 10.0),
        ));
    }
}
